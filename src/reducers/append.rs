use super::Reducer;
use crate::state::{GenerationState, StatePatch};

/// Appends clarification turns to the history channel.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AddHistory;

impl Reducer for AddHistory {
    fn apply(&self, state: &mut GenerationState, patch: &StatePatch) {
        if !patch.history.is_empty() {
            state.history.get_mut().extend(patch.history.iter().cloned());
        }
    }
}

/// Appends generated categories to the categories channel.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AddCategories;

impl Reducer for AddCategories {
    fn apply(&self, state: &mut GenerationState, patch: &StatePatch) {
        if !patch.categories.is_empty() {
            state
                .categories
                .get_mut()
                .extend(patch.categories.iter().cloned());
        }
    }
}

/// Appends error events to the errors channel.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AddErrors;

impl Reducer for AddErrors {
    fn apply(&self, state: &mut GenerationState, patch: &StatePatch) {
        if !patch.errors.is_empty() {
            state.errors.get_mut().extend(patch.errors.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Channel;
    use crate::domain::{ClarificationTurn, Genre};

    #[test]
    fn history_appends_in_order() {
        let mut state = GenerationState::new(Genre::SciFi, "a ringworld");
        let patch = StatePatch {
            history: vec![
                ClarificationTurn {
                    question: "tone?".into(),
                    answer: "grim".into(),
                },
                ClarificationTurn {
                    question: "scale?".into(),
                    answer: "solar".into(),
                },
            ],
            ..StatePatch::default()
        };
        AddHistory.apply(&mut state, &patch);
        AddHistory.apply(&mut state, &StatePatch::default());
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history.items()[1].answer, "solar");
    }
}
