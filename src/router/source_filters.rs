// Source filter sets
// Valid / excluded / included source sets combined per request
//
// Numan Thabit 2025 Nov

use crate::types::Source;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFilters {
    valid: BTreeSet<Source>,
    excluded: BTreeSet<Source>,
    included: BTreeSet<Source>,
}

impl Default for SourceFilters {
    fn default() -> Self {
        Self::all()
    }
}

impl SourceFilters {
    pub fn new(
        valid: impl IntoIterator<Item = Source>,
        excluded: impl IntoIterator<Item = Source>,
        included: impl IntoIterator<Item = Source>,
    ) -> Self {
        Self {
            valid: valid.into_iter().collect(),
            excluded: excluded.into_iter().collect(),
            included: included.into_iter().collect(),
        }
    }

    /// Every known source is valid, nothing excluded.
    pub fn all() -> Self {
        Self::new(Source::ALL, [], [])
    }

    pub fn only(valid: impl IntoIterator<Item = Source>) -> Self {
        Self::new(valid, [], [])
    }

    pub fn is_allowed(&self, source: Source) -> bool {
        if !self.valid.contains(&source) || self.excluded.contains(&source) {
            return false;
        }
        self.included.is_empty() || self.included.contains(&source)
    }

    /// Allowed sources in a stable order.
    pub fn sources(&self) -> Vec<Source> {
        self.valid.iter().copied().filter(|s| self.is_allowed(*s)).collect()
    }

    pub fn exclude(&self, sources: impl IntoIterator<Item = Source>) -> Self {
        let mut next = self.clone();
        next.excluded.extend(sources);
        next
    }

    pub fn include(&self, sources: impl IntoIterator<Item = Source>) -> Self {
        let mut next = self.clone();
        next.included.extend(sources);
        next
    }

    /// Only what both filters allow.
    pub fn merge(&self, other: &SourceFilters) -> Self {
        let included = match (self.included.is_empty(), other.included.is_empty()) {
            (true, _) => other.included.clone(),
            (_, true) => self.included.clone(),
            _ => self.included.intersection(&other.included).copied().collect(),
        };
        Self {
            valid: self.valid.intersection(&other.valid).copied().collect(),
            excluded: self.excluded.union(&other.excluded).copied().collect(),
            included,
        }
    }
}
