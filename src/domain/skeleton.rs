use serde::{Deserialize, Serialize};

use super::ElementKind;

/// High-level world outline produced by the architect phase.
///
/// The skeleton is the caller-facing artifact for the approval gate: it can
/// be edited and resubmitted before element generation starts. The
/// `elements_to_generate` plan drives the elements phase one category at a
/// time, in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSkeleton {
    pub name: String,
    pub setting: String,
    pub era: String,
    pub tone: String,
    pub core_conflict: String,
    #[serde(default)]
    pub unique_features: Vec<String>,
    /// Short orienting paragraph shown to the caller alongside the plan.
    pub primer: String,
    pub elements_to_generate: Vec<ElementKind>,
}

impl WorldSkeleton {
    /// Deduplicate the generation plan in place, keeping first occurrences.
    /// Generators occasionally repeat a category; the plan must not.
    pub fn dedup_plan(&mut self) {
        let mut seen = Vec::with_capacity(self.elements_to_generate.len());
        self.elements_to_generate.retain(|kind| {
            if seen.contains(kind) {
                false
            } else {
                seen.push(*kind);
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let mut skeleton = WorldSkeleton {
            name: "Emberfall".into(),
            setting: "a brass city under a dying sun".into(),
            era: "late industrial".into(),
            tone: "elegiac".into(),
            core_conflict: "who controls the last light".into(),
            unique_features: vec!["heat is currency".into()],
            primer: "The city of Emberfall hoards the last warm light.".into(),
            elements_to_generate: vec![
                ElementKind::Factions,
                ElementKind::Locations,
                ElementKind::Factions,
                ElementKind::History,
            ],
        };
        skeleton.dedup_plan();
        assert_eq!(
            skeleton.elements_to_generate,
            vec![
                ElementKind::Factions,
                ElementKind::Locations,
                ElementKind::History
            ]
        );
    }
}
