//! Reducers merge node patches into the working state.
//!
//! Each reducer owns one region of [`GenerationState`]: scalar fields are
//! replaced, the history/categories/errors channels are appended. Reducers
//! never touch channel versions; the stepper compares channel lengths before
//! and after the merge and bumps versions only where content changed.

mod append;
mod registry;
mod scalars;

pub use append::{AddCategories, AddErrors, AddHistory};
pub use registry::ReducerRegistry;
pub use scalars::MergeScalars;

use crate::state::{GenerationState, StatePatch};
use crate::types::ChannelType;
use std::fmt;

/// Unified reducer trait: every reducer mutates GenerationState using a
/// StatePatch delta.
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut GenerationState, patch: &StatePatch);
}

#[derive(Debug)]
pub enum ReducerError {
    UnknownChannel(ChannelType),
}

impl fmt::Display for ReducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducerError::UnknownChannel(channel) => {
                write!(f, "no reducers registered for channel: {channel:?}")
            }
        }
    }
}

impl std::error::Error for ReducerError {}
