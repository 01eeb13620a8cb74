//! Two-tier assignment: EO grouping, then SF grouping, then UNIQUEID
//!
//! Each tier walks observations in row-key order. Per observation the tier
//! state moves `Unvisited -> Clustering -> Reconciled -> Assigned`; an
//! observation that already held an identity starts (and stays) `Assigned`
//! and is skipped as a seed, which is what makes re-runs idempotent.
//!
//! Species partitions are independent, so they are clustered in parallel.
//! New-cluster tokens are handed out only after every partition has settled,
//! in species order and then seed order: the outcome does not depend on the
//! order observations were supplied in or on thread scheduling. UNIQUEID
//! numbering runs last, over the complete pool.

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EoError, ObservationError, Result};
use crate::expand::ClusterExpander;
use crate::geometry::GeometryEngine;
use crate::ident::{TokenSource, UniqueIdTable};
use crate::index::SpatialIndex;
use crate::model::{Identity, Observation, ReferenceRecord, RowKey, Tier};
use crate::normalize::Normalizer;
use crate::policy::SeparationPolicy;
use crate::reconcile::ReferenceSet;
use crate::settings::EngineSettings;

/// Per-observation progress through one tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierState {
    Unvisited,
    Clustering,
    Reconciled,
    Assigned(Identity),
    /// Cluster could not be given a single identity
    Rejected,
}

impl TierState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TierState::Assigned(_) | TierState::Rejected)
    }
}

/// Where an assigned identity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Held before the run; observation skipped
    Prior,
    /// Joined a cluster whose earlier members already had the identity
    Attached,
    /// Taken from authoritative reference records
    Reference,
    /// Fresh token for a cluster with no counterpart
    Allocated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub identity: Identity,
    pub origin: Origin,
    /// Tier-local dense number
    pub unique_id: u32,
}

impl Assignment {
    pub fn is_new(&self) -> bool {
        self.identity.is_new()
    }
}

/// Outcome of one tier over a batch
#[derive(Debug)]
pub struct AssignmentResult {
    pub tier: Tier,
    pub assignments: BTreeMap<RowKey, Assignment>,
    pub states: BTreeMap<RowKey, TierState>,
    pub errors: Vec<ObservationError>,
    pub unique_ids: UniqueIdTable,
    /// Clusters settled during this run (skipped observations excluded)
    pub clusters: usize,
}

impl AssignmentResult {
    pub fn get(&self, row_key: RowKey) -> Option<&Assignment> {
        self.assignments.get(&row_key)
    }

    pub fn count(&self, origin: Origin) -> usize {
        self.assignments
            .values()
            .filter(|a| a.origin == origin)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.count(Origin::Prior)
    }
}

/// Final identities of one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedObservation {
    pub species: String,
    pub eo: Identity,
    pub sf: Identity,
    /// Batch UNIQUEID: the SF-tier number, so it enumerates the SF pool only.
    /// The EO-tier numbering stays available on `RunReport::eo`.
    pub unique_id: u32,
}

/// Outcome of a full two-tier run
#[derive(Debug)]
pub struct RunReport {
    pub eo: AssignmentResult,
    pub sf: AssignmentResult,
    pub observations: BTreeMap<RowKey, AssignedObservation>,
}

impl RunReport {
    /// Per-observation errors from both tiers
    pub fn errors(&self) -> impl Iterator<Item = &ObservationError> {
        self.eo.errors.iter().chain(self.sf.errors.iter())
    }

    pub fn error_count(&self) -> usize {
        self.eo.errors.len() + self.sf.errors.len()
    }

    /// Write identities back into the observation set
    ///
    /// Observations that failed keep their previous identities.
    pub fn apply<G>(&self, observations: &mut [Observation<G>]) {
        for obs in observations.iter_mut() {
            if let Some(assigned) = self.observations.get(&obs.row_key) {
                obs.eo = Some(assigned.eo.clone());
                obs.sf = Some(assigned.sf.clone());
            }
        }
    }
}

/// One observation as seen by a tier pass
struct Candidate<'a, G> {
    row_key: RowKey,
    species: &'a str,
    geometry: &'a G,
    prior: Option<Identity>,
    /// EO identity used to prefix new SF tokens
    eo: Option<Identity>,
}

enum Resolution {
    Attached(Identity),
    Reference(Identity),
    New,
    Inconsistent(Vec<String>),
}

/// Identity source for the pending members of a settled cluster
enum Fill {
    Shared(Identity),
    Token(String),
}

impl std::fmt::Display for Fill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fill::Shared(identity) => write!(f, "{identity}"),
            Fill::Token(token) => write!(f, "new:{token}"),
        }
    }
}

struct SettledCluster {
    seed: RowKey,
    /// Candidate indices that receive the identity
    pending: Vec<usize>,
    resolution: Resolution,
}

struct PartitionOutcome {
    clusters: Vec<SettledCluster>,
    states: Vec<(usize, TierState)>,
}

struct PartitionJob<'p> {
    species: &'p str,
    members: Vec<usize>,
    threshold: f64,
}

/// Drives the clustering engine over observation batches
pub struct Assigner<'e, E: GeometryEngine> {
    engine: &'e E,
    settings: EngineSettings,
    normalizer: Normalizer,
}

impl<'e, E: GeometryEngine> Assigner<'e, E> {
    pub fn new(engine: &'e E, settings: EngineSettings) -> Self {
        let normalizer = Normalizer::new(settings.normalization_epsilon);
        Self {
            engine,
            settings,
            normalizer,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Cluster one tier and reconcile it against `references`
    pub fn cluster(
        &self,
        observations: &[Observation<E::Geometry>],
        references: &[ReferenceRecord<E::Geometry>],
        policy: &SeparationPolicy,
        tier: Tier,
        tokens: &mut dyn TokenSource,
    ) -> Result<AssignmentResult> {
        let order = row_order(observations)?;
        let geometries: Vec<E::Geometry> = match tier {
            Tier::Eo => observations.iter().map(|o| o.geometry.clone()).collect(),
            Tier::Sf => self
                .normalizer
                .normalize_all(self.engine, observations.iter().map(|o| &o.geometry))?,
        };
        let references = match tier {
            Tier::Eo => ReferenceSet::new(references.iter().cloned()),
            Tier::Sf => ReferenceSet::normalized(self.engine, &self.normalizer, references)?,
        };
        let candidates: Vec<_> = order
            .iter()
            .map(|&i| {
                let obs = &observations[i];
                Candidate {
                    row_key: obs.row_key,
                    species: obs.species.as_str(),
                    geometry: &geometries[i],
                    prior: obs.identity(tier).cloned(),
                    eo: obs.eo.clone(),
                }
            })
            .collect();
        self.run_tier(tier, &candidates, &references, policy, tokens)
    }

    /// Assign EO identities, then SF identities, then the batch UNIQUEID
    ///
    /// The EO tier compares geometries as given; only the SF tier works on
    /// normalised observations and SF references. Observations that fail at
    /// the EO tier are left out of the SF tier.
    pub fn run(
        &self,
        observations: &[Observation<E::Geometry>],
        eo_references: &[ReferenceRecord<E::Geometry>],
        sf_references: &[ReferenceRecord<E::Geometry>],
        policy: &SeparationPolicy,
        tokens: &mut dyn TokenSource,
    ) -> Result<RunReport> {
        let order = row_order(observations)?;
        let eo_refs = ReferenceSet::new(eo_references.iter().cloned());
        let sf_geometries = self
            .normalizer
            .normalize_all(self.engine, observations.iter().map(|o| &o.geometry))?;
        let sf_refs = ReferenceSet::normalized(self.engine, &self.normalizer, sf_references)?;

        let eo_candidates: Vec<_> = order
            .iter()
            .map(|&i| {
                let obs = &observations[i];
                Candidate {
                    row_key: obs.row_key,
                    species: obs.species.as_str(),
                    geometry: &obs.geometry,
                    prior: obs.eo.clone(),
                    eo: obs.eo.clone(),
                }
            })
            .collect();
        let eo = self.run_tier(Tier::Eo, &eo_candidates, &eo_refs, policy, tokens)?;

        let sf_candidates: Vec<_> = order
            .iter()
            .filter_map(|&i| {
                let obs = &observations[i];
                let eo_assignment = eo.assignments.get(&obs.row_key)?;
                Some(Candidate {
                    row_key: obs.row_key,
                    species: obs.species.as_str(),
                    geometry: &sf_geometries[i],
                    prior: obs.sf.clone(),
                    eo: Some(eo_assignment.identity.clone()),
                })
            })
            .collect();
        let sf = self.run_tier(Tier::Sf, &sf_candidates, &sf_refs, policy, tokens)?;

        let mut assigned = BTreeMap::new();
        for candidate in &sf_candidates {
            let (Some(eo_assignment), Some(sf_assignment)) = (
                eo.assignments.get(&candidate.row_key),
                sf.assignments.get(&candidate.row_key),
            ) else {
                continue;
            };
            assigned.insert(
                candidate.row_key,
                AssignedObservation {
                    species: candidate.species.to_string(),
                    eo: eo_assignment.identity.clone(),
                    sf: sf_assignment.identity.clone(),
                    unique_id: sf_assignment.unique_id,
                },
            );
        }

        tracing::info!(
            "Assigned {} observation(s): {} EO cluster(s), {} SF cluster(s), {} error(s)",
            assigned.len(),
            eo.clusters,
            sf.clusters,
            eo.errors.len() + sf.errors.len()
        );

        Ok(RunReport {
            eo,
            sf,
            observations: assigned,
        })
    }

    fn run_tier(
        &self,
        tier: Tier,
        candidates: &[Candidate<'_, E::Geometry>],
        references: &ReferenceSet<E::Geometry>,
        policy: &SeparationPolicy,
        tokens: &mut dyn TokenSource,
    ) -> Result<AssignmentResult> {
        let mut partitions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, candidate) in candidates.iter().enumerate() {
            partitions.entry(candidate.species).or_default().push(i);
        }

        let mut errors = Vec::new();
        let mut states = BTreeMap::new();
        let mut identities: BTreeMap<RowKey, (Identity, Origin)> = BTreeMap::new();
        let mut jobs = Vec::with_capacity(partitions.len());
        for (species, members) in partitions {
            let threshold = match tier {
                Tier::Eo => policy.distance_for(species),
                Tier::Sf => Ok(policy.sf_distance()),
            };
            match threshold {
                Ok(threshold) => jobs.push(PartitionJob {
                    species,
                    members,
                    threshold,
                }),
                Err(err) => {
                    tracing::warn!("Skipping unassigned observations of '{}': {}", species, err);
                    for i in members {
                        let candidate = &candidates[i];
                        if let Some(prior) = &candidate.prior {
                            states.insert(candidate.row_key, TierState::Assigned(prior.clone()));
                            identities.insert(candidate.row_key, (prior.clone(), Origin::Prior));
                            continue;
                        }
                        states.insert(candidate.row_key, TierState::Rejected);
                        errors.push(ObservationError {
                            row_key: candidate.row_key,
                            species: species.to_string(),
                            tier,
                            error: EoError::UnknownSeparationPolicy {
                                species: species.to_string(),
                            },
                        });
                    }
                }
            }
        }

        let outcomes = if self.settings.parallel {
            jobs.par_iter()
                .map(|job| self.cluster_partition(tier, job, candidates, references))
                .collect::<Result<Vec<_>>>()?
        } else {
            jobs.iter()
                .map(|job| self.cluster_partition(tier, job, candidates, references))
                .collect::<Result<Vec<_>>>()?
        };

        // Barrier: every partition has settled. Allocate tokens in a fixed order.
        let mut clusters = 0;
        for (job, outcome) in jobs.iter().zip(outcomes) {
            for (i, state) in outcome.states {
                let candidate = &candidates[i];
                if let (TierState::Assigned(identity), Some(_)) = (&state, &candidate.prior) {
                    identities.insert(candidate.row_key, (identity.clone(), Origin::Prior));
                }
                states.insert(candidate.row_key, state);
            }
            for cluster in outcome.clusters {
                clusters += 1;
                let (fill, origin) = match cluster.resolution {
                    Resolution::Attached(identity) => (Fill::Shared(identity), Origin::Attached),
                    Resolution::Reference(identity) => (Fill::Shared(identity), Origin::Reference),
                    Resolution::New => (Fill::Token(tokens.next_token()?), Origin::Allocated),
                    Resolution::Inconsistent(found) => {
                        for &i in &cluster.pending {
                            let candidate = &candidates[i];
                            states.insert(candidate.row_key, TierState::Rejected);
                            errors.push(ObservationError {
                                row_key: candidate.row_key,
                                species: job.species.to_string(),
                                tier,
                                error: EoError::InconsistentClusterState {
                                    tier,
                                    species: job.species.to_string(),
                                    identities: found.clone(),
                                },
                            });
                        }
                        continue;
                    }
                };
                for &i in &cluster.pending {
                    let candidate = &candidates[i];
                    let assigned = match &fill {
                        Fill::Shared(identity) => identity.clone(),
                        Fill::Token(token) => new_identity(tier, candidate, token),
                    };
                    states.insert(candidate.row_key, TierState::Assigned(assigned.clone()));
                    identities.insert(candidate.row_key, (assigned, origin));
                }
                tracing::info!(
                    "{} cluster seeded at row {} ({}): {} observation(s) -> {}",
                    tier,
                    cluster.seed,
                    job.species,
                    cluster.pending.len(),
                    fill
                );
            }
        }

        let unique_ids = UniqueIdTable::from_pool(identities.values().map(|(identity, _)| identity));
        let assignments = identities
            .into_iter()
            .map(|(row_key, (identity, origin))| {
                let unique_id = unique_ids.get(&identity).unwrap_or_default();
                (
                    row_key,
                    Assignment {
                        identity,
                        origin,
                        unique_id,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        errors.sort_by_key(|e| e.row_key);
        tracing::info!(
            "{} tier: {} cluster(s), {} skipped, {} error(s), {} distinct identities",
            tier,
            clusters,
            assignments.values().filter(|a| a.origin == Origin::Prior).count(),
            errors.len(),
            unique_ids.len()
        );

        Ok(AssignmentResult {
            tier,
            assignments,
            states,
            errors,
            unique_ids,
            clusters,
        })
    }

    fn cluster_partition(
        &self,
        tier: Tier,
        job: &PartitionJob<'_>,
        candidates: &[Candidate<'_, E::Geometry>],
        references: &ReferenceSet<E::Geometry>,
    ) -> Result<PartitionOutcome> {
        let geometries: Vec<E::Geometry> = job
            .members
            .iter()
            .map(|&i| candidates[i].geometry.clone())
            .collect();
        let index = SpatialIndex::build(self.engine, &geometries)?;
        let expander = ClusterExpander::new(&index, job.threshold);
        let reconciler = references.reconciler(self.engine, job.species)?;

        let mut states: Vec<TierState> = job
            .members
            .iter()
            .map(|&i| match &candidates[i].prior {
                Some(identity) => TierState::Assigned(identity.clone()),
                None => TierState::Unvisited,
            })
            .collect();

        let mut clusters = Vec::new();
        for seed in 0..job.members.len() {
            let candidate = &candidates[job.members[seed]];
            match (&states[seed], &candidate.prior) {
                (TierState::Unvisited, _) => {}
                (TierState::Assigned(identity), Some(_)) => {
                    tracing::debug!(
                        "Row {} already assigned to {} {}; skipping",
                        candidate.row_key,
                        tier,
                        identity
                    );
                    continue;
                }
                _ => continue,
            }

            let cluster = expander.expand(seed)?;
            let mut pending = Vec::new();
            let mut held: BTreeSet<&Identity> = BTreeSet::new();
            for &slot in &cluster.members {
                match &candidates[job.members[slot]].prior {
                    Some(identity) => {
                        held.insert(identity);
                    }
                    None => {
                        states[slot] = TierState::Clustering;
                        pending.push(slot);
                    }
                }
            }

            let held: Vec<&Identity> = held.into_iter().collect();
            let resolution = match held.as_slice() {
                [] => {
                    let members = cluster.members.iter().map(|&slot| index.geometry(slot));
                    match reconciler.reconcile(members, job.threshold)?.identity() {
                        Some(identity) => Resolution::Reference(identity),
                        None => Resolution::New,
                    }
                }
                [only] => Resolution::Attached((*only).clone()),
                many => Resolution::Inconsistent(many.iter().map(|i| i.to_string()).collect()),
            };

            for &slot in &pending {
                states[slot] = TierState::Reconciled;
            }
            tracing::debug!(
                "{} expansion from row {} settled after {} pass(es) with {} member(s)",
                tier,
                candidate.row_key,
                cluster.passes,
                cluster.len()
            );
            clusters.push(SettledCluster {
                seed: candidate.row_key,
                pending: pending.iter().map(|&slot| job.members[slot]).collect(),
                resolution,
            });
        }

        Ok(PartitionOutcome {
            clusters,
            states: job
                .members
                .iter()
                .copied()
                .zip(states)
                .collect(),
        })
    }
}

/// New identity for one member of a freshly tokenised cluster
///
/// SF tokens of observations in a new EO are prefixed with that EO's token.
fn new_identity<G>(tier: Tier, candidate: &Candidate<'_, G>, token: &str) -> Identity {
    match (tier, &candidate.eo) {
        (Tier::Sf, Some(Identity::New(eo_token))) => Identity::New(format!("{eo_token}_{token}")),
        _ => Identity::New(token.to_string()),
    }
}

/// Observation indices sorted by row key; duplicate keys are rejected
fn row_order<G>(observations: &[Observation<G>]) -> Result<Vec<usize>> {
    let mut order: Vec<usize> = (0..observations.len()).collect();
    order.sort_by_key(|&i| observations[i].row_key);
    for pair in order.windows(2) {
        if observations[pair[0]].row_key == observations[pair[1]].row_key {
            return Err(EoError::DuplicateRowKey(observations[pair[0]].row_key));
        }
    }
    Ok(order)
}
