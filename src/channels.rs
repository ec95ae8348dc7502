//! Versioned append channels backing the working state.
//!
//! Accumulated data (clarification history, generated categories, error
//! events) lives in versioned channels: the items plus a monotonically
//! increasing version counter. Reducers mutate the item collections without
//! touching versions; the stepper bumps a channel's version only when its
//! content actually changed, which gives checkpoints a cheap change signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::PhaseKind;

/// Common surface of a versioned channel.
pub trait Channel {
    type Item: Clone;

    /// Current version counter.
    fn version(&self) -> u32;

    /// Overwrite the version counter (stepper-only; reducers never call this).
    fn set_version(&mut self, version: u32);

    /// Cloned copy of the channel contents.
    fn snapshot(&self) -> Vec<Self::Item>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A versioned, append-oriented vector channel.
///
/// ```rust
/// use worldloom::channels::{Channel, VersionedVec};
///
/// let mut ch: VersionedVec<String> = VersionedVec::default();
/// ch.get_mut().push("first".into());
/// assert_eq!(ch.len(), 1);
/// assert_eq!(ch.version(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedVec<T> {
    items: Vec<T>,
    version: u32,
}

impl<T> VersionedVec<T> {
    pub fn new(items: Vec<T>, version: u32) -> Self {
        Self { items, version }
    }

    /// Mutable access to the underlying items. Versions are managed by the
    /// stepper, not by writers.
    pub fn get_mut(&mut self) -> &mut Vec<T> {
        &mut self.items
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

impl<T> Default for VersionedVec<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            version: 1,
        }
    }
}

impl<T: Clone> Channel for VersionedVec<T> {
    type Item = T;

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Structured error entry captured into state when a node fails.
///
/// Node failures never cross the stepper boundary as panics or hard errors;
/// they are appended here and the phase is moved to
/// [`Phase::Error`](crate::types::Phase::Error).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default = "Utc::now")]
    pub when: DateTime<Utc>,
    /// The graph node that captured the failure.
    pub phase: PhaseKind,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(phase: PhaseKind, message: impl Into<String>) -> Self {
        Self {
            when: Utc::now(),
            phase,
            message: message.into(),
        }
    }
}
