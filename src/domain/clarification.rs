use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{DomainError, ElementKind};

/// Upper bound on questions carried by a single clarification request.
pub const MAX_QUESTIONS_PER_REQUEST: usize = 5;

/// Every question carries exactly this many suggested options.
pub const OPTIONS_PER_QUESTION: usize = 3;

/// One multiple-choice-with-freeform question inside a clarification request.
///
/// The `id` is the pairing key: answers reference questions by id, and the
/// follow-up prompt is composed by walking the questions in order and looking
/// each id up in the answer map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    pub id: String,
    pub question: String,
    /// Exactly [`OPTIONS_PER_QUESTION`] suggested answers.
    pub options: Vec<String>,
    /// Whether the caller may answer with arbitrary text instead of an
    /// option. Generators set this; the engine never enforces it.
    #[serde(default = "default_true")]
    pub allow_custom: bool,
}

fn default_true() -> bool {
    true
}

/// Validate the structural invariants of a question batch: 1..=5 questions,
/// exactly 3 options each.
pub fn validate_questions(questions: &[ClarificationQuestion]) -> Result<(), DomainError> {
    if questions.is_empty() || questions.len() > MAX_QUESTIONS_PER_REQUEST {
        return Err(DomainError::QuestionCount {
            got: questions.len(),
            max: MAX_QUESTIONS_PER_REQUEST,
        });
    }
    for q in questions {
        if q.options.len() != OPTIONS_PER_QUESTION {
            return Err(DomainError::OptionCount {
                id: q.id.clone(),
                expected: OPTIONS_PER_QUESTION,
                got: q.options.len(),
            });
        }
    }
    Ok(())
}

/// A typed interrupt payload: the reason a phase suspended and what it needs
/// from the caller before it can resume.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClarificationRequest {
    /// The architect needs direction before committing to a skeleton.
    ArchitectClarification {
        reason: String,
        questions: Vec<ClarificationQuestion>,
        /// 1-based round counter, so callers can show "round 2 of 3".
        iteration: u8,
    },
    /// Element generation needs direction for one specific category.
    ElementsClarification {
        element: ElementKind,
        reason: String,
        questions: Vec<ClarificationQuestion>,
    },
}

impl ClarificationRequest {
    pub fn questions(&self) -> &[ClarificationQuestion] {
        match self {
            ClarificationRequest::ArchitectClarification { questions, .. }
            | ClarificationRequest::ElementsClarification { questions, .. } => questions,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            ClarificationRequest::ArchitectClarification { reason, .. }
            | ClarificationRequest::ElementsClarification { reason, .. } => reason,
        }
    }
}

/// The caller's reply to a pending clarification request.
///
/// `answers` is keyed by question id; unanswered questions are treated as
/// answered with an empty string. `skipped` means the caller declined the
/// whole round and the phase should proceed with what it has.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationAnswers {
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub answers: FxHashMap<String, String>,
}

impl ClarificationAnswers {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            answers: FxHashMap::default(),
        }
    }

    pub fn answer(&self, question_id: &str) -> &str {
        self.answers.get(question_id).map_or("", String::as_str)
    }
}

/// One resolved question/answer pair, recorded verbatim into history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationTurn {
    pub question: String,
    pub answer: String,
}

impl ClarificationTurn {
    /// Pair questions with answers in question order. Unanswered questions
    /// produce turns with an empty answer so the record stays complete.
    pub fn pair(
        questions: &[ClarificationQuestion],
        answers: &ClarificationAnswers,
    ) -> Vec<ClarificationTurn> {
        questions
            .iter()
            .map(|q| ClarificationTurn {
                question: q.question.clone(),
                answer: answers.answer(&q.id).to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, options: usize) -> ClarificationQuestion {
        ClarificationQuestion {
            id: id.to_string(),
            question: format!("what about {id}?"),
            options: (0..options).map(|i| format!("option {i}")).collect(),
            allow_custom: true,
        }
    }

    #[test]
    fn accepts_one_to_five_questions_with_three_options() {
        for n in 1..=MAX_QUESTIONS_PER_REQUEST {
            let qs: Vec<_> = (0..n).map(|i| question(&format!("q{i}"), 3)).collect();
            assert!(validate_questions(&qs).is_ok());
        }
    }

    #[test]
    fn rejects_empty_and_oversized_batches() {
        assert!(matches!(
            validate_questions(&[]),
            Err(DomainError::QuestionCount { got: 0, .. })
        ));
        let qs: Vec<_> = (0..6).map(|i| question(&format!("q{i}"), 3)).collect();
        assert!(matches!(
            validate_questions(&qs),
            Err(DomainError::QuestionCount { got: 6, .. })
        ));
    }

    #[test]
    fn rejects_wrong_option_count() {
        let qs = vec![question("q0", 2)];
        assert!(matches!(
            validate_questions(&qs),
            Err(DomainError::OptionCount { got: 2, .. })
        ));
    }

    #[test]
    fn pairing_follows_question_order_and_fills_gaps() {
        let questions = vec![question("tone", 3), question("scale", 3)];
        let mut answers = ClarificationAnswers::default();
        answers.answers.insert("scale".into(), "continental".into());

        let turns = ClarificationTurn::pair(&questions, &answers);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].answer, "");
        assert_eq!(turns[1].answer, "continental");
    }

    #[test]
    fn request_serializes_with_type_tag() {
        let req = ClarificationRequest::ArchitectClarification {
            reason: "tone is ambiguous".into(),
            questions: vec![question("tone", 3)],
            iteration: 1,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "architect_clarification");
        assert_eq!(json["iteration"], 1);
    }
}
