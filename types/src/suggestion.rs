//! Autocomplete suggestion sets.

use serde::{Deserialize, Serialize};

/// Upper bound on the number of suggestions shown at once.
pub const MAX_SUGGESTIONS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionOrigin {
    /// Personal history or the reference vocabulary.
    Local,
    /// Remote completion service.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub origin: SuggestionOrigin,
}

impl Suggestion {
    #[must_use]
    pub fn local(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: SuggestionOrigin::Local,
        }
    }

    #[must_use]
    pub fn remote(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: SuggestionOrigin::Remote,
        }
    }
}

/// Ordered, deduplicated, capped suggestion list: local matches first, then remote.
///
/// Deduplication is case-insensitive and keeps the first occurrence, so a local
/// entry always wins over a remote one with the same spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionSet {
    items: Vec<Suggestion>,
}

impl SuggestionSet {
    #[must_use]
    pub fn compose(local: &[String], remote: &[String], cap: usize) -> Self {
        let cap = cap.min(MAX_SUGGESTIONS);
        let mut set = Self::default();
        let candidates = local
            .iter()
            .map(Suggestion::local)
            .chain(remote.iter().map(Suggestion::remote));
        for candidate in candidates {
            if set.items.len() >= cap {
                break;
            }
            if candidate.text.trim().is_empty() || set.contains(&candidate.text) {
                continue;
            }
            set.items.push(candidate);
        }
        set
    }

    #[must_use]
    pub fn contains(&self, text: &str) -> bool {
        self.items
            .iter()
            .any(|item| item.text.eq_ignore_ascii_case(text))
    }

    #[must_use]
    pub fn items(&self) -> &[Suggestion] {
        &self.items
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.text.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
