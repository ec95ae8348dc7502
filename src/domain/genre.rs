use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// Genre selected at session creation; drives prompt composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    Fantasy,
    SciFi,
    Mystery,
    Horror,
    Historical,
    PostApocalyptic,
}

impl Genre {
    /// Wire/storage form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Fantasy => "fantasy",
            Genre::SciFi => "sci_fi",
            Genre::Mystery => "mystery",
            Genre::Horror => "horror",
            Genre::Historical => "historical",
            Genre::PostApocalyptic => "post_apocalyptic",
        }
    }

    /// Human-readable name used in prompt text.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Genre::Fantasy => "Fantasy",
            Genre::SciFi => "Science Fiction",
            Genre::Mystery => "Mystery",
            Genre::Horror => "Horror",
            Genre::Historical => "Historical",
            Genre::PostApocalyptic => "Post-Apocalyptic",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Genre {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fantasy" => Ok(Genre::Fantasy),
            "sci_fi" => Ok(Genre::SciFi),
            "mystery" => Ok(Genre::Mystery),
            "horror" => Ok(Genre::Horror),
            "historical" => Ok(Genre::Historical),
            "post_apocalyptic" => Ok(Genre::PostApocalyptic),
            other => Err(DomainError::UnknownGenre(other.to_string())),
        }
    }
}
