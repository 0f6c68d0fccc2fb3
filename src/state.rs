//! The mutable record threaded through a cascade.
//!
//! A [`TextState`] is created once per unique input string and rewritten in
//! place by every rule that changes it. Each committed rewrite bumps
//! `revision`; `(id, revision)` is the [`StateKey`] that identifies a frozen
//! snapshot of the state in the provenance graph.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Index of a text state inside its ingestion batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StateId(pub usize);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Identity of one snapshot: which state, after how many rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StateKey {
    pub state: StateId,
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextState {
    id: StateId,
    original: Arc<str>,
    current: String,
    category: Option<String>,
    is_final: bool,
    changed_this_step: bool,
    ever_changed: bool,
    revision: u32,
}

impl TextState {
    pub fn new(id: StateId, original: impl Into<Arc<str>>) -> Self {
        let original: Arc<str> = original.into();
        let current = original.to_string();
        TextState {
            id,
            original,
            current,
            category: None,
            is_final: false,
            changed_this_step: false,
            ever_changed: false,
            revision: 0,
        }
    }

    /// Build one state per distinct input, keeping first-occurrence order.
    pub fn batch<I, S>(inputs: I) -> Vec<TextState>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = std::collections::HashSet::new();
        let mut states = Vec::new();
        for input in inputs {
            let input = input.as_ref();
            if seen.insert(input.to_string()) {
                states.push(TextState::new(StateId(states.len()), input));
            }
        }
        states
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn key(&self) -> StateKey {
        StateKey { state: self.id, revision: self.revision }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn changed_this_step(&self) -> bool {
        self.changed_this_step
    }

    pub fn ever_changed(&self) -> bool {
        self.ever_changed
    }

    /// Number of rewrites committed so far (the cascade depth).
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Freeze the current values into a shareable snapshot.
    pub fn snapshot(&self) -> Arc<TextState> {
        Arc::new(self.clone())
    }

    pub(crate) fn begin_step(&mut self) {
        self.changed_this_step = false;
    }

    /// Replace `current` with `text`. Returns whether anything changed.
    ///
    /// A final state is never rewritten.
    pub(crate) fn commit(&mut self, text: String) -> bool {
        if self.is_final || text == self.current {
            self.changed_this_step = false;
            return false;
        }
        self.current = text;
        self.changed_this_step = true;
        self.ever_changed = true;
        self.revision += 1;
        true
    }

    /// Mark the state final and freeze its category to the current text.
    pub(crate) fn finalize(&mut self) {
        self.is_final = true;
        self.category = Some(self.current.clone());
    }
}

impl fmt::Display for TextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} \"{}\"", self.id, self.revision, self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_mirrors_original() {
        let s = TextState::new(StateId(0), "Bonifico iban1234");
        assert_eq!(s.current(), s.original());
        assert!(!s.ever_changed());
        assert_eq!(s.revision(), 0);
        assert_eq!(s.category(), None);
    }

    #[test]
    fn batch_collapses_duplicates() {
        let states = TextState::batch(["a", "b", "a", "c", "b"]);
        let originals: Vec<&str> = states.iter().map(|s| s.original()).collect();
        assert_eq!(originals, ["a", "b", "c"]);
        assert_eq!(states[2].id(), StateId(2));
    }

    #[test]
    fn commit_tracks_change_flags() {
        let mut s = TextState::new(StateId(0), "pizza");
        s.begin_step();
        assert!(s.commit("FOOD".into()));
        assert!(s.changed_this_step());
        assert_eq!(s.key(), StateKey { state: StateId(0), revision: 1 });

        s.begin_step();
        assert!(!s.commit("FOOD".into()));
        assert!(!s.changed_this_step());
        assert!(s.ever_changed());
        assert_eq!(s.revision(), 1);
    }

    #[test]
    fn final_state_is_not_rewritten() {
        let mut s = TextState::new(StateId(0), "pizza");
        s.commit("FOOD".into());
        s.finalize();
        assert!(!s.commit("DRINK".into()));
        assert_eq!(s.current(), "FOOD");
        assert_eq!(s.category(), Some("FOOD"));
    }

    #[test]
    fn snapshot_is_frozen() {
        let mut s = TextState::new(StateId(1), "x");
        let before = s.snapshot();
        s.commit("y".into());
        assert_eq!(before.current(), "x");
        assert_ne!(before.key(), s.key());
    }
}
