use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A quiz question as consumed from the authoring subsystem.
///
/// The engine never mutates questions; it only grades answers against them
/// and broadcasts stripped-down snapshots to players.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    /// Stable identifier assigned by the authoring subsystem.
    pub id: Uuid,
    /// Prompt shown to players.
    pub text: String,
    /// Seconds players get to answer once the question is broadcast.
    pub time_limit_secs: u32,
    /// Base points awarded for a correct answer before speed bonuses.
    pub points: u32,
    /// Position of the question within the quiz.
    pub order_index: u32,
    /// Type-specific correctness data.
    pub body: QuestionBody,
}

impl Question {
    /// Discriminant of the question's body, used for dispatch and reporting.
    pub fn kind(&self) -> QuestionKind {
        self.body.kind()
    }
}

/// Flat discriminant for every supported question type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Exactly one option is correct.
    SingleChoice,
    /// A set of options is correct; the submitted set must match exactly.
    MultipleChoice,
    /// Boolean statement.
    TrueFalse,
    /// Free text matched against accepted answers.
    FillInBlank,
    /// Left/right pairs that must all be matched.
    Matching,
    /// Items that must be submitted in the stored order.
    Ordering,
    /// Items dragged onto zones; every placement must match.
    DragDrop,
    /// Free text matched against accepted answers.
    ShortAnswer,
    /// Long-form text requiring manual grading.
    Essay,
    /// A point that must land inside one of the correct regions.
    Hotspot,
    /// Single choice over image options.
    ImageSelection,
    /// Single choice rendered as a dropdown.
    Dropdown,
    /// Grid of cells; the submitted cell set must match the correct set.
    Matrix,
    /// Items that must be ranked in the stored order.
    Ranking,
}

/// Correctness data per question type.
///
/// Each variant carries only the fields its grading rule needs, so the
/// grading dispatch can match exhaustively instead of sharing a deep
/// option hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionBody {
    /// Exactly one option carries the correct marker.
    SingleChoice {
        /// Options shown to the player.
        options: Vec<ChoiceOption>,
    },
    /// The submitted option set must equal the correct set; no partial credit.
    MultipleChoice {
        /// Options shown to the player.
        options: Vec<ChoiceOption>,
    },
    /// Boolean statement with a single correct value.
    TrueFalse {
        /// The correct boolean value.
        answer: bool,
    },
    /// Free text compared case-insensitively after trimming.
    FillInBlank {
        /// Accepted answers; the first entry is the canonical one.
        accepted: Vec<String>,
    },
    /// Every left item must be paired with its right counterpart.
    Matching {
        /// Correct pairs keyed by their option identifiers.
        pairs: Vec<MatchPair>,
    },
    /// Items stored in their correct order.
    Ordering {
        /// Items in the order players must reproduce.
        items: Vec<SequenceItem>,
    },
    /// Item-to-zone placements that must all match.
    DragDrop {
        /// Correct placements keyed by item and zone identifiers.
        placements: Vec<Placement>,
    },
    /// Free text compared case-insensitively after trimming.
    ShortAnswer {
        /// Accepted answers; the first entry is the canonical one.
        accepted: Vec<String>,
    },
    /// Long-form answer; never auto-scored as correct.
    Essay,
    /// A submitted point must fall inside one of the correct regions.
    Hotspot {
        /// Axis-aligned regions considered correct.
        regions: Vec<Region>,
    },
    /// Single choice over image options.
    ImageSelection {
        /// Options shown to the player.
        options: Vec<ChoiceOption>,
    },
    /// Single choice rendered as a dropdown.
    Dropdown {
        /// Options shown to the player.
        options: Vec<ChoiceOption>,
    },
    /// Grid cells with per-cell correctness markers.
    Matrix {
        /// Every cell of the grid; the submitted set must equal the marked set.
        cells: Vec<MatrixCell>,
    },
    /// Items stored in their correct rank order.
    Ranking {
        /// Items in the order players must reproduce.
        items: Vec<SequenceItem>,
    },
}

impl QuestionBody {
    /// Discriminant of this body.
    pub fn kind(&self) -> QuestionKind {
        match self {
            QuestionBody::SingleChoice { .. } => QuestionKind::SingleChoice,
            QuestionBody::MultipleChoice { .. } => QuestionKind::MultipleChoice,
            QuestionBody::TrueFalse { .. } => QuestionKind::TrueFalse,
            QuestionBody::FillInBlank { .. } => QuestionKind::FillInBlank,
            QuestionBody::Matching { .. } => QuestionKind::Matching,
            QuestionBody::Ordering { .. } => QuestionKind::Ordering,
            QuestionBody::DragDrop { .. } => QuestionKind::DragDrop,
            QuestionBody::ShortAnswer { .. } => QuestionKind::ShortAnswer,
            QuestionBody::Essay => QuestionKind::Essay,
            QuestionBody::Hotspot { .. } => QuestionKind::Hotspot,
            QuestionBody::ImageSelection { .. } => QuestionKind::ImageSelection,
            QuestionBody::Dropdown { .. } => QuestionKind::Dropdown,
            QuestionBody::Matrix { .. } => QuestionKind::Matrix,
            QuestionBody::Ranking { .. } => QuestionKind::Ranking,
        }
    }
}

/// A selectable option with its correctness marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChoiceOption {
    /// Identifier of the option, unique within the question.
    pub id: u32,
    /// Text (or image reference) shown to the player.
    pub text: String,
    /// Whether selecting this option is correct. Never broadcast to players.
    pub correct: bool,
}

/// One correct left/right association of a matching question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchPair {
    /// Identifier of the left-hand item.
    pub left_id: u32,
    /// Identifier of the right-hand item.
    pub right_id: u32,
    /// Left-hand label shown to the player.
    pub left: String,
    /// Right-hand label shown to the player.
    pub right: String,
}

/// One item of an ordering or ranking question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceItem {
    /// Identifier of the item, unique within the question.
    pub id: u32,
    /// Label shown to the player.
    pub text: String,
}

/// One correct item-to-zone placement of a drag-drop question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Placement {
    /// Identifier of the draggable item.
    pub item_id: u32,
    /// Identifier of the zone the item belongs in.
    pub zone_id: u32,
}

/// Axis-aligned rectangle in relative image coordinates (0.0..=1.0).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Region {
    /// Whether the given point falls inside this region (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// One cell of a matrix question with its correctness marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatrixCell {
    /// Row index of the cell.
    pub row: u32,
    /// Column index of the cell.
    pub col: u32,
    /// Whether this cell must be selected. Never broadcast to players.
    pub correct: bool,
}

/// Answer payload submitted by a participant.
///
/// The payload shape must match the question kind; a mismatch is a
/// structural error rather than an incorrect answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmittedAnswer {
    /// Selection of a single option.
    Choice {
        /// Identifier of the selected option.
        option_id: u32,
    },
    /// Selection of several options.
    Choices {
        /// Identifiers of the selected options.
        option_ids: Vec<u32>,
    },
    /// Boolean answer.
    Boolean {
        /// The submitted truth value.
        value: bool,
    },
    /// Free-text answer.
    Text {
        /// The submitted text, trimmed and lowercased before comparison.
        value: String,
    },
    /// Ordered list of item identifiers.
    Sequence {
        /// Item identifiers in the submitted order.
        item_ids: Vec<u32>,
    },
    /// Left/right associations.
    Pairs {
        /// Submitted `(left_id, right_id)` pairs.
        pairs: Vec<(u32, u32)>,
    },
    /// Item-to-zone placements.
    Placements {
        /// Submitted `(item_id, zone_id)` placements.
        placements: Vec<(u32, u32)>,
    },
    /// A point on an image in relative coordinates.
    Point {
        /// Horizontal coordinate.
        x: f64,
        /// Vertical coordinate.
        y: f64,
    },
    /// Selected matrix cells.
    Cells {
        /// Submitted `(row, col)` cells.
        cells: Vec<(u32, u32)>,
    },
}
