//! Prompt composition for the generation phases.
//!
//! Pure string assembly: no I/O, no vendor formatting. Each function builds a
//! [`Prompt`] from state the caller already holds, so composition is fully
//! unit-testable. Prompt *content* quality is a vendor concern; the engine
//! only guarantees which facts reach the generator.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::domain::{ClarificationTurn, ElementKind, Genre, WorldSkeleton};

/// A composed prompt: a fixed system framing plus the run-specific request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const ARCHITECT_SYSTEM: &str = "You are a world architect. Produce a concise, \
internally consistent world outline for the requested genre. Ask clarifying \
questions only when the request is genuinely ambiguous.";

const ELEMENTS_SYSTEM: &str = "You are a world-building assistant expanding an \
approved world outline one category at a time. Stay consistent with the \
outline and with categories already generated.";

/// Architect prompt from the genre, the caller's concept, and any resolved
/// clarification rounds so far.
///
/// `final_round` switches to the forcing variant: further clarification is
/// forbidden and a skeleton must be committed with whatever is known.
#[must_use]
pub fn architect_prompt(
    genre: Genre,
    user_input: &str,
    history: &[ClarificationTurn],
    final_round: bool,
) -> Prompt {
    let mut user = format!(
        "Genre: {}\nConcept: {}\n",
        genre.display_name(),
        user_input.trim()
    );
    if !history.is_empty() {
        user.push_str("\nClarifications so far:\n");
        user.push_str(&answer_block(history));
    }
    if final_round {
        user.push_str(
            "\nThis is the final round. Do not ask further questions; commit \
             to a complete world outline using the information above.",
        );
    } else {
        user.push_str(
            "\nEither commit to a complete world outline, or ask up to five \
             clarifying questions with three suggested options each.",
        );
    }
    Prompt {
        system: ARCHITECT_SYSTEM.to_string(),
        user,
    }
}

/// Skeleton-only forcing prompt, used when an architect response was
/// malformed and the run must still end with an outline.
#[must_use]
pub fn skeleton_prompt(genre: Genre, user_input: &str, history: &[ClarificationTurn]) -> Prompt {
    let mut prompt = architect_prompt(genre, user_input, history, true);
    prompt
        .user
        .push_str("\nRespond with the world outline only.");
    prompt
}

/// Per-category prompt from the approved skeleton and the categories already
/// generated, so the generator can stay consistent with prior output.
#[must_use]
pub fn category_prompt(skeleton: &WorldSkeleton, kind: ElementKind, done: &[ElementKind]) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(user, "World: {}", skeleton.name);
    let _ = writeln!(user, "Setting: {}", skeleton.setting);
    let _ = writeln!(user, "Era: {}", skeleton.era);
    let _ = writeln!(user, "Tone: {}", skeleton.tone);
    let _ = writeln!(user, "Core conflict: {}", skeleton.core_conflict);
    if !skeleton.unique_features.is_empty() {
        let _ = writeln!(user, "Unique features: {}", skeleton.unique_features.join("; "));
    }
    if !done.is_empty() {
        let names: Vec<&str> = done.iter().map(|k| k.display_name()).collect();
        let _ = writeln!(user, "Already generated: {}", names.join(", "));
    }
    let _ = write!(
        user,
        "\nGenerate the {} category: {} Provide 3 to 5 elements.",
        kind.display_name(),
        kind.blurb()
    );
    Prompt {
        system: ELEMENTS_SYSTEM.to_string(),
        user,
    }
}

/// Append a resolved clarification round to an existing prompt as a
/// `question: answer` block. Used on resume so the follow-up call sees the
/// caller's direction verbatim.
#[must_use]
pub fn with_answers(mut prompt: Prompt, turns: &[ClarificationTurn]) -> Prompt {
    if !turns.is_empty() {
        prompt.user.push_str("\n\nCaller direction:\n");
        prompt.user.push_str(&answer_block(turns));
        prompt
            .user
            .push_str("\nDo not ask further questions for this category.");
    }
    prompt
}

fn answer_block(turns: &[ClarificationTurn]) -> String {
    let mut block = String::new();
    for turn in turns {
        let answer = if turn.answer.is_empty() {
            "(no answer)"
        } else {
            turn.answer.as_str()
        };
        let _ = writeln!(block, "{}: {}", turn.question, answer);
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(q: &str, a: &str) -> ClarificationTurn {
        ClarificationTurn {
            question: q.into(),
            answer: a.into(),
        }
    }

    fn skeleton() -> WorldSkeleton {
        WorldSkeleton {
            name: "Vesper Reach".into(),
            setting: "orbital ring over a dead world".into(),
            era: "post-collapse".into(),
            tone: "melancholy".into(),
            core_conflict: "air is rationed by lottery".into(),
            unique_features: vec!["gravity varies by district".into()],
            primer: "Life clings to the ring.".into(),
            elements_to_generate: vec![ElementKind::Locations, ElementKind::Factions],
        }
    }

    #[test]
    fn architect_prompt_carries_history_in_order() {
        let history = vec![turn("tone?", "grim"), turn("scale?", "")];
        let p = architect_prompt(Genre::SciFi, "a ringworld", &history, false);
        assert!(p.user.contains("tone?: grim"));
        assert!(p.user.contains("scale?: (no answer)"));
        assert!(p.user.find("tone?").unwrap() < p.user.find("scale?").unwrap());
    }

    #[test]
    fn final_round_forbids_questions() {
        let p = architect_prompt(Genre::SciFi, "a ringworld", &[], true);
        assert!(p.user.contains("Do not ask further questions"));
        assert!(!p.user.contains("ask up to five"));
    }

    #[test]
    fn category_prompt_names_prior_categories() {
        let p = category_prompt(&skeleton(), ElementKind::Factions, &[ElementKind::Locations]);
        assert!(p.user.contains("Already generated: Locations"));
        assert!(p.user.contains("Generate the Factions category"));
    }

    #[test]
    fn with_answers_appends_direction_block() {
        let base = category_prompt(&skeleton(), ElementKind::Factions, &[]);
        let p = with_answers(base.clone(), &[turn("how many guilds?", "three")]);
        assert!(p.user.starts_with(&base.user));
        assert!(p.user.contains("how many guilds?: three"));
    }
}
