use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// The enumerated set of element categories a skeleton can plan for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Locations,
    Factions,
    Religions,
    Races,
    MagicSystem,
    Technology,
    History,
    Economy,
    Culture,
    Creatures,
    NotableCharacters,
}

impl ElementKind {
    /// Wire/storage form, matching the serde encoding.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Locations => "locations",
            ElementKind::Factions => "factions",
            ElementKind::Religions => "religions",
            ElementKind::Races => "races",
            ElementKind::MagicSystem => "magic_system",
            ElementKind::Technology => "technology",
            ElementKind::History => "history",
            ElementKind::Economy => "economy",
            ElementKind::Culture => "culture",
            ElementKind::Creatures => "creatures",
            ElementKind::NotableCharacters => "notable_characters",
        }
    }

    /// Display name used for synthesized category wrappers and prompt text.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            ElementKind::Locations => "Locations",
            ElementKind::Factions => "Factions",
            ElementKind::Religions => "Religions",
            ElementKind::Races => "Races & Peoples",
            ElementKind::MagicSystem => "Magic System",
            ElementKind::Technology => "Technology",
            ElementKind::History => "History",
            ElementKind::Economy => "Economy & Trade",
            ElementKind::Culture => "Culture & Customs",
            ElementKind::Creatures => "Creatures",
            ElementKind::NotableCharacters => "Notable Characters",
        }
    }

    /// One-line category description. Used when the generator returns bare
    /// elements and the category wrapper has to be synthesized locally.
    #[must_use]
    pub fn blurb(&self) -> &'static str {
        match self {
            ElementKind::Locations => "Significant places, from capitals to forgotten ruins.",
            ElementKind::Factions => "Organized groups with competing ideologies and goals.",
            ElementKind::Religions => "Faiths, cults, and the institutions built around them.",
            ElementKind::Races => "The peoples inhabiting the world and their traits.",
            ElementKind::MagicSystem => "How supernatural power works, its costs and limits.",
            ElementKind::Technology => "The tools, machines, and sciences of the era.",
            ElementKind::History => "Defining events that shaped the present conflict.",
            ElementKind::Economy => "What is scarce, what is traded, and who profits.",
            ElementKind::Culture => "Customs, art, and everyday life across the world.",
            ElementKind::Creatures => "Wildlife and monsters, mundane and legendary.",
            ElementKind::NotableCharacters => "Named figures positioned to drive stories.",
        }
    }

    /// All categories in canonical order.
    #[must_use]
    pub fn all() -> &'static [ElementKind] {
        &[
            ElementKind::Locations,
            ElementKind::Factions,
            ElementKind::Religions,
            ElementKind::Races,
            ElementKind::MagicSystem,
            ElementKind::Technology,
            ElementKind::History,
            ElementKind::Economy,
            ElementKind::Culture,
            ElementKind::Creatures,
            ElementKind::NotableCharacters,
        ]
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementKind::all()
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| DomainError::UnknownElement(s.to_string()))
    }
}

/// The only two value shapes a lore field may take.
///
/// Untagged so wire JSON stays plain: `"humid"` or `["docks", "old town"]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl TryFrom<&Value> for FieldValue {
    type Error = ();

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(FieldValue::Text(s.clone())),
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(FieldValue::List(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            )),
            _ => Err(()),
        }
    }
}

/// One generated lore item.
///
/// The `fields` map is intentionally open ended: keys are category specific
/// ("ideology_and_goals" for factions, "climate" for locations, ...) and only
/// the outer shape is enforced, via [`validate_fields`](Self::validate_fields):
/// every value must fit [`FieldValue`]. A `serde_json::Map` backs the map so
/// lore field order survives round-trips (`preserve_order`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicWorldElement {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl DynamicWorldElement {
    /// Check that every field value is a string or an array of strings.
    pub fn validate_fields(&self) -> Result<(), DomainError> {
        for (key, value) in &self.fields {
            if FieldValue::try_from(value).is_err() {
                return Err(DomainError::FieldShape { key: key.clone() });
            }
        }
        Ok(())
    }

    /// Typed view of one field, if present and well shaped.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<FieldValue> {
        self.fields.get(key).and_then(|v| FieldValue::try_from(v).ok())
    }
}

/// One generated batch for a single category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldElementCategory {
    pub category: ElementKind,
    pub name: String,
    pub description: String,
    pub elements: Vec<DynamicWorldElement>,
}

impl WorldElementCategory {
    /// Synthesize a category wrapper from static per-type metadata. Used by
    /// the elements fallback path when the generator returned bare elements.
    #[must_use]
    pub fn from_elements(kind: ElementKind, elements: Vec<DynamicWorldElement>) -> Self {
        Self {
            category: kind,
            name: kind.display_name().to_string(),
            description: kind.blurb().to_string(),
            elements,
        }
    }
}
