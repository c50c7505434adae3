//! Procedure-name suggestions.
//!
//! Personal history is ranked first ([`FrequencyIndex`]), the reference
//! [`Vocabulary`] fills in, and remote completions are appended once the
//! input settles and the vision service is reachable.

mod aggregator;
pub mod frequency;
pub mod vocabulary;

pub use aggregator::{SuggestionAggregator, SuggestionConfig};
pub use frequency::FrequencyIndex;
pub use vocabulary::{SURGICAL_PROCEDURES, Vocabulary};
