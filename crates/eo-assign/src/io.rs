//! CSV readers and writers for bulk-load tables
//!
//! Geometry travels as a GeoJSON-style object in a single CSV column, e.g.
//! `{"type":"Point","coordinates":[512300.0,4471800.0]}`, in projected
//! working units.

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use eo_core::{
    Footprint, Identity, Observation, PolicyColumns, ReferenceRecord, RowKey, RunReport,
    SeparationPolicy, Shape,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Geometry column payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum GeometryJson {
    Point([f64; 2]),
    LineString(Vec<[f64; 2]>),
    /// Exterior ring first, then holes
    Polygon(Vec<Vec<[f64; 2]>>),
}

fn pairs(coords: &[[f64; 2]]) -> Vec<(f64, f64)> {
    coords.iter().map(|&[x, y]| (x, y)).collect()
}

impl GeometryJson {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse geometry JSON")
    }

    pub fn into_footprint(self) -> Result<Footprint> {
        let finite = |c: &[f64; 2]| c[0].is_finite() && c[1].is_finite();
        let shape = match self {
            GeometryJson::Point(c) => {
                if !finite(&c) {
                    bail!("point has non-finite coordinates");
                }
                Shape::point(c[0], c[1])
            }
            GeometryJson::LineString(coords) => {
                if coords.len() < 2 {
                    bail!("line needs at least 2 positions, got {}", coords.len());
                }
                if !coords.iter().all(finite) {
                    bail!("line has non-finite coordinates");
                }
                Shape::line(pairs(&coords))
            }
            GeometryJson::Polygon(rings) => {
                let Some((exterior, holes)) = rings.split_first() else {
                    bail!("polygon has no rings");
                };
                for ring in &rings {
                    if ring.len() < 3 {
                        bail!("polygon ring needs at least 3 positions, got {}", ring.len());
                    }
                    if !ring.iter().all(finite) {
                        bail!("polygon has non-finite coordinates");
                    }
                }
                Shape::polygon_with_holes(pairs(exterior), holes.iter().map(|h| pairs(h)).collect())
            }
        };
        Ok(Footprint::new(shape))
    }
}

impl From<&Shape> for GeometryJson {
    fn from(shape: &Shape) -> Self {
        match shape {
            Shape::Point(p) => GeometryJson::Point([p.x(), p.y()]),
            Shape::Line(l) => GeometryJson::LineString(l.coords().map(|c| [c.x, c.y]).collect()),
            Shape::Polygon(p) => GeometryJson::Polygon(
                std::iter::once(p.exterior())
                    .chain(p.interiors())
                    .map(|r| r.coords().map(|c| [c.x, c.y]).collect())
                    .collect(),
            ),
        }
    }
}

fn parse_footprint(text: &str) -> Result<Footprint> {
    GeometryJson::parse(text)?.into_footprint()
}

#[derive(Debug, Deserialize)]
struct ObservationRow {
    row_key: RowKey,
    species: String,
    geometry: String,
    #[serde(rename = "EO_ID", default)]
    eo_id: Option<String>,
    #[serde(rename = "EO_NEW", default)]
    eo_new: Option<String>,
    #[serde(rename = "SF_ID", default)]
    sf_id: Option<String>,
    #[serde(rename = "SF_NEW", default)]
    sf_new: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReferenceRow {
    id: String,
    species: String,
    geometry: String,
}

/// One row of an assigned output file
///
/// Keeps the geometry, so the file can go straight back in as observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OutputRow {
    row_key: RowKey,
    species: String,
    geometry: String,
    #[serde(rename = "EO_ID")]
    eo_id: Option<String>,
    #[serde(rename = "EO_NEW")]
    eo_new: Option<String>,
    #[serde(rename = "SF_ID")]
    sf_id: Option<String>,
    #[serde(rename = "SF_NEW")]
    sf_new: Option<String>,
    #[serde(rename = "UNIQUEID")]
    unique_id: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorRow<'a> {
    row_key: RowKey,
    species: &'a str,
    tier: &'a str,
    error: String,
}

/// Observation read back from an output file
///
/// Rows that failed in the run carry whatever identities they held before it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignedRow {
    pub row_key: RowKey,
    pub species: String,
    pub eo: Option<Identity>,
    pub sf: Option<Identity>,
    pub unique_id: Option<u32>,
}

impl AssignedRow {
    pub fn is_assigned(&self) -> bool {
        self.eo.is_some() && self.sf.is_some()
    }
}

/// Split an identity into its `(existing, new)` columns
fn identity_columns(identity: Option<&Identity>) -> (Option<String>, Option<String>) {
    match identity {
        Some(Identity::Existing(id)) => (Some(id.clone()), None),
        Some(Identity::New(token)) => (None, Some(token.clone())),
        None => (None, None),
    }
}

fn open(path: &Path, what: &str) -> Result<File> {
    File::open(path).with_context(|| format!("Failed to open {what} file: {}", path.display()))
}

fn create(path: &Path, what: &str) -> Result<File> {
    File::create(path)
        .with_context(|| format!("Failed to create {what} file: {}", path.display()))
}

pub fn read_observations(path: &Path) -> Result<Vec<Observation<Footprint>>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(open(path, "observation")?);

    let mut observations = Vec::new();
    for (n, result) in reader.deserialize().enumerate() {
        let row: ObservationRow =
            result.with_context(|| format!("Failed to parse observation row {}", n + 1))?;
        let geometry = parse_footprint(&row.geometry)
            .with_context(|| format!("Bad geometry for observation {}", row.row_key))?;
        let mut obs = Observation::new(row.row_key, row.species.trim(), geometry);
        obs.eo = Identity::from_fields(row.eo_id.as_deref(), row.eo_new.as_deref());
        obs.sf = Identity::from_fields(row.sf_id.as_deref(), row.sf_new.as_deref());
        observations.push(obs);
    }

    tracing::debug!(
        "Read {} observation(s) from {}",
        observations.len(),
        path.display()
    );
    Ok(observations)
}

pub fn read_references(path: &Path) -> Result<Vec<ReferenceRecord<Footprint>>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(open(path, "reference")?);

    let mut records = Vec::new();
    for (n, result) in reader.deserialize().enumerate() {
        let row: ReferenceRow =
            result.with_context(|| format!("Failed to parse reference row {}", n + 1))?;
        let id = row.id.trim();
        if id.is_empty() {
            bail!("Reference row {} has an empty id", n + 1);
        }
        let geometry = parse_footprint(&row.geometry)
            .with_context(|| format!("Bad geometry for reference {id}"))?;
        records.push(ReferenceRecord::new(id, row.species.trim(), geometry));
    }

    tracing::debug!("Read {} reference(s) from {}", records.len(), path.display());
    Ok(records)
}

pub fn read_policy(
    path: &Path,
    columns: &PolicyColumns,
    units_per_km: f64,
    sf_distance: f64,
) -> Result<SeparationPolicy> {
    let policy =
        SeparationPolicy::from_csv_reader(open(path, "policy")?, columns, units_per_km, sf_distance)
            .with_context(|| format!("Failed to load separation policy: {}", path.display()))?;
    tracing::debug!("Loaded separation distances for {} species", policy.len());
    Ok(policy)
}

/// Write every observation in row-key order with its identities
///
/// A row that failed at a tier keeps its previous identity there (blank when
/// it had none) and gets no UNIQUEID. Returns the number of rows written.
pub fn write_assignments(
    path: &Path,
    observations: &[Observation<Footprint>],
    report: &RunReport,
) -> Result<usize> {
    let mut rows: Vec<&Observation<Footprint>> = observations.iter().collect();
    rows.sort_by_key(|o| o.row_key);

    let mut writer = WriterBuilder::new().from_writer(create(path, "output")?);
    for obs in &rows {
        let eo = report.eo.get(obs.row_key).map(|a| &a.identity).or(obs.eo.as_ref());
        let sf = report.sf.get(obs.row_key).map(|a| &a.identity).or(obs.sf.as_ref());
        let (eo_id, eo_new) = identity_columns(eo);
        let (sf_id, sf_new) = identity_columns(sf);
        let geometry = serde_json::to_string(&GeometryJson::from(&obs.geometry.shape))
            .context("Failed to encode geometry")?;
        writer.serialize(OutputRow {
            row_key: obs.row_key,
            species: obs.species.clone(),
            geometry,
            eo_id,
            eo_new,
            sf_id,
            sf_new,
            unique_id: report.observations.get(&obs.row_key).map(|a| a.unique_id),
        })?;
    }
    writer.flush().context("Failed to flush output file")?;
    Ok(rows.len())
}

pub fn write_errors(path: &Path, report: &RunReport) -> Result<usize> {
    let mut writer = WriterBuilder::new().from_writer(create(path, "error report")?);
    let mut written = 0;
    for err in report.errors() {
        writer.serialize(ErrorRow {
            row_key: err.row_key,
            species: &err.species,
            tier: err.tier.as_str(),
            error: err.error.to_string(),
        })?;
        written += 1;
    }
    writer.flush().context("Failed to flush error report")?;
    Ok(written)
}

pub fn read_assignments(path: &Path) -> Result<Vec<AssignedRow>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(open(path, "assignment")?);

    let mut rows = Vec::new();
    for (n, result) in reader.deserialize().enumerate() {
        let row: OutputRow =
            result.with_context(|| format!("Failed to parse assignment row {}", n + 1))?;
        rows.push(AssignedRow {
            row_key: row.row_key,
            species: row.species,
            eo: Identity::from_fields(row.eo_id.as_deref(), row.eo_new.as_deref()),
            sf: Identity::from_fields(row.sf_id.as_deref(), row.sf_new.as_deref()),
            unique_id: row.unique_id,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eo_core::GeometryKind;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_geometry_kinds() {
        let point = GeometryJson::parse(r#"{"type":"Point","coordinates":[1.0,2.0]}"#)
            .unwrap()
            .into_footprint()
            .unwrap();
        assert_eq!(point.shape.kind(), GeometryKind::Point);

        let line = GeometryJson::parse(r#"{"type":"LineString","coordinates":[[0,0],[5,5]]}"#)
            .unwrap()
            .into_footprint()
            .unwrap();
        assert_eq!(line.shape.kind(), GeometryKind::Line);

        let polygon = GeometryJson::parse(
            r#"{"type":"Polygon","coordinates":[[[0,0],[10,0],[10,10],[0,10],[0,0]],[[2,2],[3,2],[3,3]]]}"#,
        )
        .unwrap()
        .into_footprint()
        .unwrap();
        assert_eq!(polygon.shape.kind(), GeometryKind::Polygon);
    }

    #[test]
    fn test_reject_degenerate_geometry() {
        let line = GeometryJson::LineString(vec![[0.0, 0.0]]);
        assert!(line.into_footprint().is_err());
        assert!(GeometryJson::Polygon(vec![]).into_footprint().is_err());
        assert!(GeometryJson::Point([f64::NAN, 0.0]).into_footprint().is_err());
        assert!(GeometryJson::parse(r#"{"type":"Circle","coordinates":[0,0]}"#).is_err());
    }

    #[test]
    fn test_read_observations_with_prior_identities() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "obs.csv",
            concat!(
                "row_key,species,geometry,EO_ID,EO_NEW,SF_ID,SF_NEW\n",
                "1,Glyptemys insculpta,\"{\"\"type\"\":\"\"Point\"\",\"\"coordinates\"\":[0,0]}\",12,,,\n",
                "2,Glyptemys insculpta,\"{\"\"type\"\":\"\"Point\"\",\"\"coordinates\"\":[5,0]}\",,,,\n",
                "3,Glyptemys insculpta,\"{\"\"type\"\":\"\"Point\"\",\"\"coordinates\"\":[9,0]}\",,oak,,oak_elm\n",
            ),
        );
        let obs = read_observations(&path).unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(obs[0].eo, Some(Identity::Existing("12".into())));
        assert_eq!(obs[0].sf, None);
        assert_eq!(obs[1].eo, None);
        assert_eq!(obs[2].eo, Some(Identity::New("oak".into())));
        assert_eq!(obs[2].sf, Some(Identity::New("oak_elm".into())));
    }

    #[test]
    fn test_read_observations_without_identity_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "obs.csv",
            "row_key,species,geometry\n7,X,\"{\"\"type\"\":\"\"Point\"\",\"\"coordinates\"\":[1,1]}\"\n",
        );
        let obs = read_observations(&path).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].row_key, 7);
        assert!(obs[0].eo.is_none());
    }

    #[test]
    fn test_bad_geometry_names_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "obs.csv",
            "row_key,species,geometry\n42,X,not-json\n",
        );
        let err = read_observations(&path).unwrap_err();
        assert!(format!("{err:#}").contains("observation 42"));
    }

    #[test]
    fn test_read_references_rejects_blank_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "eo.csv",
            "id,species,geometry\n ,X,\"{\"\"type\"\":\"\"Point\"\",\"\"coordinates\"\":[1,1]}\"\n",
        );
        assert!(read_references(&path).is_err());
    }

    #[test]
    fn test_identity_columns() {
        assert_eq!(
            identity_columns(Some(&Identity::Existing("12".into()))),
            (Some("12".to_string()), None)
        );
        assert_eq!(
            identity_columns(Some(&Identity::New("1_2".into()))),
            (None, Some("1_2".to_string()))
        );
        assert_eq!(identity_columns(None), (None, None));
    }

    #[test]
    fn test_geometry_json_from_shape() {
        let line = GeometryJson::LineString(vec![[0.0, 0.0], [5.0, 5.0]]);
        let shape = line.clone().into_footprint().unwrap().shape;
        assert_eq!(GeometryJson::from(&shape), line);

        let square = vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]];
        let hole = vec![[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 1.0]];
        let polygon = GeometryJson::Polygon(vec![square, hole]);
        let shape = polygon.clone().into_footprint().unwrap().shape;
        assert_eq!(GeometryJson::from(&shape), polygon);
    }
}
