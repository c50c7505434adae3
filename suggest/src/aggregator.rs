//! Debounced merge of local and remote procedure suggestions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use caselog_types::{MAX_SUGGESTIONS, ProcedureRecord, Suggestion, SuggestionSet};
use caselog_vision::{MIN_COMPLETION_QUERY_CHARS, RemoteVision};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::frequency::FrequencyIndex;
use crate::vocabulary::Vocabulary;

/// Entries shown for an empty query.
const EMPTY_QUERY_TOP: usize = 5;
const DEFAULT_DEBOUNCE_MS: u64 = 600;

#[derive(Debug, Clone)]
pub struct SuggestionConfig {
    /// Quiet period after the last keystroke before a remote fetch.
    pub debounce: Duration,
    pub max_results: usize,
    /// Extra procedure names merged into the reference vocabulary.
    pub custom_procedures: Vec<String>,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            max_results: MAX_SUGGESTIONS,
            custom_procedures: Vec::new(),
        }
    }
}

#[derive(Default)]
struct State {
    index: FrequencyIndex,
    query: String,
    local: Vec<String>,
    remote: Vec<String>,
    /// Bumped on every input change; remote replies carry the value they
    /// were issued under and are dropped when it no longer matches.
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

impl State {
    fn invalidate(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.remote.clear();
        self.generation
    }
}

struct Inner {
    remote: Arc<dyn RemoteVision>,
    vocabulary: Vocabulary,
    max_results: usize,
    debounce: Duration,
    state: Mutex<State>,
    published: watch::Sender<SuggestionSet>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn local_matches(&self, index: &FrequencyIndex, query: &str) -> Vec<String> {
        let query = query.trim();
        if query.is_empty() {
            return index.top(EMPTY_QUERY_TOP).map(str::to_string).collect();
        }
        let mut matches: Vec<String> = index.matching(query).map(str::to_string).collect();
        for entry in self.vocabulary.matching(query) {
            if !matches.iter().any(|m| m.eq_ignore_ascii_case(entry)) {
                matches.push(entry.to_string());
            }
        }
        matches
    }

    fn compose(&self, state: &State) -> SuggestionSet {
        SuggestionSet::compose(&state.local, &state.remote, self.max_results)
    }

    fn publish(&self, set: SuggestionSet) {
        self.published.send_replace(set);
    }

    fn rebuild(&self, records: &[ProcedureRecord]) {
        let mut state = self.lock();
        state.index = FrequencyIndex::from_records(records);
        state.local = self.local_matches(&state.index, &state.query);
        let set = self.compose(&state);
        drop(state);
        tracing::debug!(records = records.len(), "Rebuilt procedure frequency index");
        self.publish(set);
    }

    async fn fetch_remote(self: Arc<Self>, query: String, generation: u64) {
        tokio::time::sleep(self.debounce).await;

        let cooldown = self.remote.cooldown_remaining();
        if cooldown > 0 || self.remote.breaker().is_disabled() {
            tracing::debug!(cooldown, "Skipping remote suggestions, vision service unavailable");
            return;
        }

        let completions = self.remote.suggest_completions(&query).await;
        self.apply_remote(&query, generation, completions);
    }

    /// Merge a finished fetch. A reply for an older generation is dropped
    /// even when its task outran the abort.
    fn apply_remote(&self, query: &str, generation: u64, completions: Vec<String>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            tracing::debug!(%query, "Discarding stale remote suggestions");
            return false;
        }
        let remote: Vec<String> = completions
            .into_iter()
            .filter(|c| !state.local.iter().any(|l| l.eq_ignore_ascii_case(c)))
            .collect();
        tracing::debug!(%query, count = remote.len(), "Remote suggestions applied");
        state.remote = remote;
        state.pending = None;
        let set = self.compose(&state);
        drop(state);
        self.publish(set);
        true
    }
}

/// Suggestion source for the procedure-name field.
///
/// Local matches are returned synchronously on every keystroke; remote
/// completions arrive later through [`subscribe`](Self::subscribe). Must be
/// used from within a Tokio runtime.
pub struct SuggestionAggregator {
    inner: Arc<Inner>,
    history: Mutex<Option<JoinHandle<()>>>,
}

impl SuggestionAggregator {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteVision>, config: SuggestionConfig) -> Self {
        let (published, _) = watch::channel(SuggestionSet::default());
        let inner = Inner {
            remote,
            vocabulary: Vocabulary::with_custom(config.custom_procedures),
            max_results: config.max_results,
            debounce: config.debounce,
            state: Mutex::new(State::default()),
            published,
        };
        Self {
            inner: Arc::new(inner),
            history: Mutex::new(None),
        }
    }

    /// Replace the frequency index with one built from `records`.
    pub fn rebuild_index(&self, records: &[ProcedureRecord]) {
        self.inner.rebuild(records);
    }

    /// Rebuild the index now and again every time the history changes.
    pub fn follow_history(&self, mut records: watch::Receiver<Vec<ProcedureRecord>>) {
        self.inner.rebuild(&records.borrow_and_update());
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            while records.changed().await.is_ok() {
                let snapshot = records.borrow_and_update().clone();
                inner.rebuild(&snapshot);
            }
        });
        let previous = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Local matches for `query`: history hits by frequency, then vocabulary.
    #[must_use]
    pub fn local_matches(&self, query: &str) -> Vec<String> {
        let state = self.inner.lock();
        self.inner.local_matches(&state.index, query)
    }

    /// Current suggestions for `query` without scheduling a remote fetch.
    ///
    /// Remote completions are included only when they were fetched for this
    /// exact query.
    #[must_use]
    pub fn get_suggestions(&self, query: &str) -> SuggestionSet {
        let state = self.inner.lock();
        let local = self.inner.local_matches(&state.index, query);
        let remote: &[String] = if state.query == query {
            &state.remote
        } else {
            &[]
        };
        SuggestionSet::compose(&local, remote, self.inner.max_results)
    }

    /// Handle a text change: publish local matches now and schedule a
    /// debounced remote fetch when local history is not enough.
    pub fn on_input(&self, query: &str) -> SuggestionSet {
        let mut state = self.inner.lock();
        let generation = state.invalidate();
        state.query = query.to_string();
        state.local = self.inner.local_matches(&state.index, query);
        let set = self.inner.compose(&state);

        if wants_remote(query, &state.local) {
            let fetch = Arc::clone(&self.inner).fetch_remote(query.trim().to_string(), generation);
            state.pending = Some(tokio::spawn(fetch));
        }
        drop(state);

        self.inner.publish(set.clone());
        set
    }

    /// Whether a debounced remote fetch is scheduled or in flight.
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.inner
            .lock()
            .pending
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Push updates; the value changes on every input and when remote
    /// completions land.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SuggestionSet> {
        self.inner.published.subscribe()
    }

    /// Accept a suggestion. Returns the exact text for the input field and
    /// clears the list.
    pub fn select(&self, suggestion: &Suggestion) -> String {
        let mut state = self.inner.lock();
        state.invalidate();
        state.query.clone_from(&suggestion.text);
        state.local.clear();
        drop(state);
        self.inner.publish(SuggestionSet::default());
        suggestion.text.clone()
    }

    /// Drop pending work and clear the list, e.g. when the field loses focus.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        state.invalidate();
        state.local.clear();
        drop(state);
        self.inner.publish(SuggestionSet::default());
    }
}

impl Drop for SuggestionAggregator {
    fn drop(&mut self) {
        if let Some(pending) = self.inner.lock().pending.take() {
            pending.abort();
        }
        if let Some(history) = self
            .history
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            history.abort();
        }
    }
}

/// Remote completions are skipped for short queries and when the best local
/// match already is the query.
fn wants_remote(query: &str, local: &[String]) -> bool {
    let query = query.trim();
    if query.chars().count() < MIN_COMPLETION_QUERY_CHARS {
        return false;
    }
    !local
        .first()
        .is_some_and(|top| top.eq_ignore_ascii_case(query))
}
