//! Pure grading rules mapping a question and a submitted payload to a
//! correctness verdict and a canonical correct-answer description.
//!
//! Grading fails closed: malformed content (unknown option ids, wrong-length
//! sequences) is simply incorrect, so a confused client cannot crash a live
//! game. Only a payload whose shape does not match the question kind is a
//! structural error.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::state::question::{Question, QuestionBody, QuestionKind, SubmittedAnswer};

/// Outcome of grading one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graded {
    /// Whether the submission is correct. Always `false` when review is needed.
    pub correct: bool,
    /// Human-readable description of the correct answer.
    pub canonical_answer: String,
    /// Whether a human must grade this answer (essay questions).
    pub needs_review: bool,
}

impl Graded {
    fn auto(correct: bool, canonical_answer: String) -> Self {
        Self {
            correct,
            canonical_answer,
            needs_review: false,
        }
    }
}

/// Error raised when the payload shape does not fit the question kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("answer payload does not match question kind {kind:?}")]
pub struct GradingError {
    /// Kind of the question being graded.
    pub kind: QuestionKind,
}

/// Grade a submission against its question.
pub fn grade(question: &Question, answer: &SubmittedAnswer) -> Result<Graded, GradingError> {
    let mismatch = || GradingError {
        kind: question.kind(),
    };

    let graded = match (&question.body, answer) {
        (QuestionBody::SingleChoice { options }, SubmittedAnswer::Choice { option_id })
        | (QuestionBody::ImageSelection { options }, SubmittedAnswer::Choice { option_id })
        | (QuestionBody::Dropdown { options }, SubmittedAnswer::Choice { option_id }) => {
            let correct_ids: BTreeSet<u32> = options
                .iter()
                .filter(|option| option.correct)
                .map(|option| option.id)
                .collect();
            let submitted: BTreeSet<u32> = [*option_id].into();
            Graded::auto(submitted == correct_ids, choice_canonical(options))
        }
        (QuestionBody::MultipleChoice { options }, SubmittedAnswer::Choices { option_ids }) => {
            let correct_ids: BTreeSet<u32> = options
                .iter()
                .filter(|option| option.correct)
                .map(|option| option.id)
                .collect();
            let submitted: BTreeSet<u32> = option_ids.iter().copied().collect();
            // Exact set equality; partial credit is a scoring-policy concern
            // for other types, never a grading one.
            Graded::auto(submitted == correct_ids, choice_canonical(options))
        }
        (QuestionBody::TrueFalse { answer: expected }, SubmittedAnswer::Boolean { value }) => {
            Graded::auto(value == expected, expected.to_string())
        }
        (QuestionBody::FillInBlank { accepted }, SubmittedAnswer::Text { value })
        | (QuestionBody::ShortAnswer { accepted }, SubmittedAnswer::Text { value }) => {
            let normalized = normalize(value);
            let correct = accepted
                .iter()
                .any(|candidate| normalize(candidate) == normalized);
            Graded::auto(correct, accepted.first().cloned().unwrap_or_default())
        }
        (QuestionBody::Matching { pairs }, SubmittedAnswer::Pairs { pairs: submitted }) => {
            let expected: BTreeSet<(u32, u32)> = pairs
                .iter()
                .map(|pair| (pair.left_id, pair.right_id))
                .collect();
            let got: BTreeSet<(u32, u32)> = submitted.iter().copied().collect();
            let canonical = pairs
                .iter()
                .map(|pair| format!("{} / {}", pair.left, pair.right))
                .collect::<Vec<_>>()
                .join(", ");
            Graded::auto(got == expected && submitted.len() == pairs.len(), canonical)
        }
        (QuestionBody::Ordering { items }, SubmittedAnswer::Sequence { item_ids })
        | (QuestionBody::Ranking { items }, SubmittedAnswer::Sequence { item_ids }) => {
            let expected: Vec<u32> = items.iter().map(|item| item.id).collect();
            let canonical = items
                .iter()
                .map(|item| item.text.clone())
                .collect::<Vec<_>>()
                .join(", ");
            Graded::auto(*item_ids == expected, canonical)
        }
        (
            QuestionBody::DragDrop { placements },
            SubmittedAnswer::Placements {
                placements: submitted,
            },
        ) => {
            let expected: BTreeSet<(u32, u32)> = placements
                .iter()
                .map(|placement| (placement.item_id, placement.zone_id))
                .collect();
            let got: BTreeSet<(u32, u32)> = submitted.iter().copied().collect();
            let canonical = placements
                .iter()
                .map(|placement| format!("item {} in zone {}", placement.item_id, placement.zone_id))
                .collect::<Vec<_>>()
                .join(", ");
            Graded::auto(
                got == expected && submitted.len() == placements.len(),
                canonical,
            )
        }
        (QuestionBody::Hotspot { regions }, SubmittedAnswer::Point { x, y }) => {
            let correct = regions.iter().any(|region| region.contains(*x, *y));
            let canonical = regions
                .first()
                .map(|region| {
                    format!(
                        "region at ({:.2}, {:.2}) sized {:.2} x {:.2}",
                        region.x, region.y, region.width, region.height
                    )
                })
                .unwrap_or_default();
            Graded::auto(correct, canonical)
        }
        (QuestionBody::Matrix { cells }, SubmittedAnswer::Cells { cells: submitted }) => {
            let expected: BTreeSet<(u32, u32)> = cells
                .iter()
                .filter(|cell| cell.correct)
                .map(|cell| (cell.row, cell.col))
                .collect();
            let got: BTreeSet<(u32, u32)> = submitted.iter().copied().collect();
            let canonical = expected
                .iter()
                .map(|(row, col)| format!("({row}, {col})"))
                .collect::<Vec<_>>()
                .join(", ");
            Graded::auto(got == expected, canonical)
        }
        (QuestionBody::Essay, SubmittedAnswer::Text { .. }) => Graded {
            correct: false,
            canonical_answer: "manual review required".into(),
            needs_review: true,
        },
        _ => return Err(mismatch()),
    };

    Ok(graded)
}

/// Canonical correct-answer description for the reveal broadcast.
pub fn canonical_answer(question: &Question) -> String {
    match &question.body {
        QuestionBody::SingleChoice { options }
        | QuestionBody::MultipleChoice { options }
        | QuestionBody::ImageSelection { options }
        | QuestionBody::Dropdown { options } => choice_canonical(options),
        QuestionBody::TrueFalse { answer } => answer.to_string(),
        QuestionBody::FillInBlank { accepted } | QuestionBody::ShortAnswer { accepted } => {
            accepted.first().cloned().unwrap_or_default()
        }
        QuestionBody::Matching { pairs } => pairs
            .iter()
            .map(|pair| format!("{} / {}", pair.left, pair.right))
            .collect::<Vec<_>>()
            .join(", "),
        QuestionBody::Ordering { items } | QuestionBody::Ranking { items } => items
            .iter()
            .map(|item| item.text.clone())
            .collect::<Vec<_>>()
            .join(", "),
        QuestionBody::DragDrop { placements } => placements
            .iter()
            .map(|placement| format!("item {} in zone {}", placement.item_id, placement.zone_id))
            .collect::<Vec<_>>()
            .join(", "),
        QuestionBody::Essay => "manual review required".into(),
        QuestionBody::Hotspot { regions } => regions
            .first()
            .map(|region| {
                format!(
                    "region at ({:.2}, {:.2}) sized {:.2} x {:.2}",
                    region.x, region.y, region.width, region.height
                )
            })
            .unwrap_or_default(),
        QuestionBody::Matrix { cells } => cells
            .iter()
            .filter(|cell| cell.correct)
            .map(|cell| format!("({}, {})", cell.row, cell.col))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn choice_canonical(options: &[crate::state::question::ChoiceOption]) -> String {
    options
        .iter()
        .filter(|option| option.correct)
        .map(|option| option.text.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
