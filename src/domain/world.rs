use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{WorldElementCategory, WorldSkeleton};

/// The finished artifact: skeleton plus every generated category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedWorld {
    pub id: String,
    pub skeleton: WorldSkeleton,
    pub categories: Vec<WorldElementCategory>,
    pub metadata: WorldMetadata,
}

impl GeneratedWorld {
    #[must_use]
    pub fn total_elements(&self) -> usize {
        self.categories.iter().map(|c| c.elements.len()).sum()
    }
}

/// Bookkeeping captured at assembly time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldMetadata {
    pub generated_at: DateTime<Utc>,
    pub total_elements: usize,
    /// Wall-clock duration of the whole generation run, if the start was
    /// recorded. Zero for worlds assembled from partial sessions.
    #[serde(default)]
    pub generation_ms: u64,
}
