//! Occurrence counts of procedure names across the record history.

use std::collections::HashMap;

use caselog_types::ProcedureRecord;

/// Procedure names ranked by how often they were logged.
///
/// Derived data: rebuilt wholesale whenever the history changes. Ties keep the
/// order in which names first appeared in the history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyIndex {
    ranked: Vec<(String, usize)>,
}

impl FrequencyIndex {
    #[must_use]
    pub fn from_records(records: &[ProcedureRecord]) -> Self {
        Self::from_names(records.iter().map(|r| r.procedure_name.as_str()))
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut ranked: Vec<(String, usize)> = Vec::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            match positions.get(name) {
                Some(&pos) => ranked[pos].1 += 1,
                None => {
                    positions.insert(name, ranked.len());
                    ranked.push((name.to_string(), 1));
                }
            }
        }
        // Stable sort keeps first-seen order among equal counts.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        Self { ranked }
    }

    /// The `n` most frequent names.
    pub fn top(&self, n: usize) -> impl Iterator<Item = &str> {
        self.ranked.iter().take(n).map(|(name, _)| name.as_str())
    }

    /// Names containing `needle`, case-insensitively, most frequent first.
    pub fn matching<'a>(&'a self, needle: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        let needle = needle.to_lowercase();
        self.ranked
            .iter()
            .filter(move |(name, _)| name.to_lowercase().contains(&needle))
            .map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.ranked
            .iter()
            .find(|(n, _)| n == name)
            .map_or(0, |(_, count)| *count)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}
