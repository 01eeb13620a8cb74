//! New-cluster tokens and per-run UNIQUEID numbering

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EoError, Result};
use crate::model::Identity;

/// Issues opaque, unique labels for clusters with no authoritative ID
pub trait TokenSource: Send {
    fn next_token(&mut self) -> Result<String>;

    /// Number of tokens issued so far
    fn issued(&self) -> usize;
}

/// Counter tokens: "1", "2", ... or "{prefix}1", "{prefix}2", ...
#[derive(Debug, Clone)]
pub struct SequentialTokens {
    prefix: String,
    next: u64,
    issued: usize,
}

impl SequentialTokens {
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    /// A prefix such as the load month keeps tokens apart across runs
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 1)
    }

    pub fn starting_at(prefix: impl Into<String>, start: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: start,
            issued: 0,
        }
    }
}

impl Default for SequentialTokens {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSource for SequentialTokens {
    fn next_token(&mut self) -> Result<String> {
        let token = format!("{}{}", self.prefix, self.next);
        self.next = self
            .next
            .checked_add(1)
            .ok_or(EoError::TokenPoolExhausted {
                issued: self.issued,
            })?;
        self.issued += 1;
        Ok(token)
    }

    fn issued(&self) -> usize {
        self.issued
    }
}

/// Default first word index for word-list tokens
pub const DEFAULT_WORD_START: usize = 3;

/// Default distance between consecutive word picks
pub const DEFAULT_WORD_STRIDE: usize = 5;

/// Dictionary-word tokens
#[derive(Debug, Clone)]
pub struct WordListTokens {
    words: Vec<String>,
    cursor: usize,
    stride: usize,
    issued: usize,
}

fn usable_word(word: &str) -> bool {
    !word.is_empty() && !word.contains('\'') && !word.contains('&') && !word.contains(',')
}

impl WordListTokens {
    /// Build from a word list; blank lines, words with apostrophes, `&` or
    /// commas are dropped, and duplicates keep their first position
    pub fn new<I, S>(words: I, start: usize, stride: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_string())
            .filter(|w| usable_word(w))
            .filter(|w| seen.insert(w.clone()))
            .collect();
        Self {
            words,
            cursor: start,
            stride: stride.max(1),
            issued: 0,
        }
    }

    /// Parse a newline-separated dictionary such as `/usr/share/dict/words`
    pub fn from_text(text: &str, start: usize, stride: usize) -> Self {
        Self::new(text.lines(), start, stride)
    }

    pub fn remaining(&self) -> usize {
        if self.cursor >= self.words.len() {
            0
        } else {
            (self.words.len() - self.cursor).div_ceil(self.stride)
        }
    }
}

impl TokenSource for WordListTokens {
    fn next_token(&mut self) -> Result<String> {
        let word = self
            .words
            .get(self.cursor)
            .cloned()
            .ok_or(EoError::TokenPoolExhausted {
                issued: self.issued,
            })?;
        self.cursor += self.stride;
        self.issued += 1;
        Ok(word)
    }

    fn issued(&self) -> usize {
        self.issued
    }
}

/// Dense 1..N numbering of every identity seen in one run
///
/// Existing IDs are numbered first in sorted order, then new tokens in sorted
/// order. The numbers are only meaningful within the run that produced them.
#[derive(Debug, Clone, Default)]
pub struct UniqueIdTable {
    numbers: BTreeMap<Identity, u32>,
}

impl UniqueIdTable {
    pub fn from_pool<'a, I>(identities: I) -> Self
    where
        I: IntoIterator<Item = &'a Identity>,
    {
        let pool: BTreeSet<&Identity> = identities.into_iter().collect();
        // Identity orders Existing before New, then by value
        let numbers = pool
            .into_iter()
            .zip(1u32..)
            .map(|(identity, n)| (identity.clone(), n))
            .collect();
        Self { numbers }
    }

    pub fn get(&self, identity: &Identity) -> Option<u32> {
        self.numbers.get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// `(identity, number)` pairs in numbering order
    pub fn iter(&self) -> impl Iterator<Item = (&Identity, u32)> + '_ {
        let mut pairs: Vec<_> = self.numbers.iter().map(|(k, &v)| (k, v)).collect();
        pairs.sort_by_key(|&(_, n)| n);
        pairs.into_iter()
    }
}
