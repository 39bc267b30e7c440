use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifier allocated each time a clue is selected, so the same clue text
/// selected twice is still two distinct questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(Uuid);

impl QuestionId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QuestionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The clue currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Identity of this selection.
    pub id: QuestionId,
    /// Clue text read to the players.
    pub text: String,
    /// Expected answer.
    pub answer: String,
    /// Category the clue belongs to.
    pub category: String,
    /// Dollar value (replaced by the wager for daily doubles).
    pub value: i64,
    /// Whether only the selecting player may answer.
    pub daily_double: bool,
    /// False while a daily double waits for its wager.
    pub revealed: bool,
}

impl Question {
    /// Build a question from a board entry, revealing it immediately unless it is a daily double.
    pub fn from_board(category: &str, entry: &BoardQuestion) -> Self {
        Self {
            id: QuestionId::new(),
            text: entry.clue.clone(),
            answer: entry.answer.clone(),
            category: category.to_string(),
            value: entry.value,
            daily_double: entry.daily_double,
            revealed: !entry.daily_double,
        }
    }

    /// Sentence the host reads out when presenting the clue.
    pub fn narration(&self) -> String {
        format!("For {}, ${}. {}", self.category, self.value, self.text)
    }
}

/// A registered player and their running score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Unique display name.
    pub name: String,
    /// Current score, may go negative.
    pub score: i64,
}

impl PlayerRecord {
    /// New player with a zero score.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            score: 0,
        }
    }
}

/// Board document as exchanged with the board store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Contestants recorded alongside the board.
    #[serde(default)]
    pub contestants: Vec<PlayerRecord>,
    /// Clue grid.
    pub categories: Vec<BoardCategory>,
    /// Final round clue, if any.
    #[serde(default, rename = "final", alias = "final_clue")]
    pub final_clue: Option<FinalClue>,
}

/// One column of the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardCategory {
    /// Category title.
    pub name: String,
    /// Clues ordered by value.
    pub questions: Vec<BoardQuestion>,
}

/// A single cell of the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardQuestion {
    /// Clue text read to the players.
    pub clue: String,
    /// Expected answer.
    pub answer: String,
    /// Dollar value.
    pub value: i64,
    /// Whether finding it asks for a wager.
    #[serde(default, rename = "dailyDouble", alias = "daily_double")]
    pub daily_double: bool,
    /// Set once the clue was played.
    #[serde(default)]
    pub used: bool,
}

/// Final round clue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalClue {
    /// Category announced before wagers.
    pub category: String,
    /// Clue text.
    pub clue: String,
    /// Expected answer.
    pub answer: String,
}

/// Category with the values still available for selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableCategory {
    /// Category title.
    pub name: String,
    /// Values not yet played.
    pub values: Vec<i64>,
}

impl Board {
    /// Categories that still have at least one unused clue.
    pub fn available(&self) -> Vec<AvailableCategory> {
        self.categories
            .iter()
            .filter_map(|category| {
                let values: Vec<i64> = category
                    .questions
                    .iter()
                    .filter(|question| !question.used)
                    .map(|question| question.value)
                    .collect();
                (!values.is_empty()).then(|| AvailableCategory {
                    name: category.name.clone(),
                    values,
                })
            })
            .collect()
    }

    /// True once every clue has been played.
    pub fn exhausted(&self) -> bool {
        self.categories
            .iter()
            .all(|category| category.questions.iter().all(|question| question.used))
    }

    /// Find an unused clue, trying an exact category name, then case-insensitive, then substring.
    pub fn find_unused(&self, category: &str, value: i64) -> Option<(usize, usize)> {
        let wanted = category.trim().to_lowercase();
        let matchers: [&dyn Fn(&str) -> bool; 3] = [
            &|name| name == category.trim(),
            &|name| name.to_lowercase() == wanted,
            &|name| {
                let name = name.to_lowercase();
                !wanted.is_empty() && (name.contains(&wanted) || wanted.contains(&name))
            },
        ];

        matchers.iter().find_map(|matches| {
            self.categories
                .iter()
                .enumerate()
                .filter(|(_, entry)| matches(&entry.name))
                .find_map(|(category_index, entry)| {
                    entry
                        .questions
                        .iter()
                        .position(|question| question.value == value && !question.used)
                        .map(|question_index| (category_index, question_index))
                })
        })
    }

    /// Mark a clue as played and return a fresh [`Question`] for it.
    pub fn take(&mut self, category_index: usize, question_index: usize) -> Option<Question> {
        let category = self.categories.get_mut(category_index)?;
        let entry = category.questions.get_mut(question_index)?;
        entry.used = true;
        Some(Question::from_board(&category.name, entry))
    }
}

/// A chat message retained as a board-generation preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceMessage {
    /// Player who sent it.
    pub username: String,
    /// Topic wish as typed.
    pub message: String,
}

/// Stage of the final round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinalStage {
    /// Players are sending wagers.
    Wagering,
    /// The clue is revealed and players are answering.
    Answering,
    /// Answers were judged.
    Resolved,
}

/// Running state of the final round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalRound {
    /// Clue played.
    pub clue: FinalClue,
    /// Current stage.
    pub stage: FinalStage,
    /// Clamped wagers by player.
    pub wagers: HashMap<String, i64>,
    /// First answer of each player.
    pub answers: HashMap<String, String>,
}

impl FinalRound {
    /// Start the wagering stage for `clue`.
    pub fn new(clue: FinalClue) -> Self {
        Self {
            clue,
            stage: FinalStage::Wagering,
            wagers: HashMap::new(),
            answers: HashMap::new(),
        }
    }
}
