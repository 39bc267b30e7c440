//! In-process collaborators used when no remote endpoint is configured.

use futures::future::{self, BoxFuture};

use crate::{
    collaborators::{
        AnswerJudge, BoardGenerator, ClueResolution, ClueResolver, CollaboratorResult, Judgement,
        SpeechSynthesizer,
    },
    error::CollaboratorError,
    state::game::{AvailableCategory, Board, PreferenceMessage},
};

const QUESTION_PREFIXES: [&str; 8] = [
    "what is ",
    "what are ",
    "who is ",
    "who are ",
    "where is ",
    "where are ",
    "what was ",
    "who was ",
];
const ARTICLES: [&str; 3] = ["the ", "a ", "an "];

/// Lowercase, drop the "what is" framing, leading articles and punctuation.
fn normalize_answer(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut text: &str = &lowered;
    for prefix in QUESTION_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest;
            break;
        }
    }
    for article in ARTICLES {
        if let Some(rest) = text.strip_prefix(article) {
            text = rest;
            break;
        }
    }
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic judge comparing normalised answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatchJudge;

impl ExactMatchJudge {
    /// Synchronous verdict, shared with tests.
    pub fn judge(expected: &str, submitted: &str) -> Judgement {
        let expected = normalize_answer(expected);
        let submitted = normalize_answer(submitted);
        let correct = !submitted.is_empty() && expected == submitted;
        Judgement {
            correct,
            explanation: if correct {
                "The answer matches.".into()
            } else {
                format!("The expected answer was {expected}.")
            },
        }
    }
}

impl AnswerJudge for ExactMatchJudge {
    fn evaluate(
        &self,
        expected: &str,
        submitted: &str,
    ) -> BoxFuture<'static, CollaboratorResult<Judgement>> {
        Box::pin(future::ready(Ok(Self::judge(expected, submitted))))
    }
}

/// Resolver that looks for a category name and a dollar amount in the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClueResolver;

impl KeywordClueResolver {
    /// Synchronous resolution, shared with tests.
    pub fn interpret(message: &str, available: &[AvailableCategory]) -> ClueResolution {
        let lowered = message.to_lowercase();
        let Some(value) = first_number(&lowered) else {
            return ClueResolution::Invalid {
                error: "no dollar value found in the selection".into(),
            };
        };

        let category = available
            .iter()
            .filter(|category| lowered.contains(&category.name.to_lowercase()))
            .max_by_key(|category| category.name.len())
            .or_else(|| {
                available.iter().find(|category| {
                    category
                        .name
                        .to_lowercase()
                        .split_whitespace()
                        .filter(|word| word.len() > 3)
                        .any(|word| lowered.contains(word))
                })
            });

        match category {
            Some(category) if category.values.contains(&value) => ClueResolution::Valid {
                category: category.name.clone(),
                value,
            },
            Some(category) => ClueResolution::Invalid {
                error: format!("${value} is not available in {}", category.name),
            },
            None => ClueResolution::Invalid {
                error: "no available category matches the selection".into(),
            },
        }
    }
}

impl ClueResolver for KeywordClueResolver {
    fn resolve(
        &self,
        message: &str,
        available: &[AvailableCategory],
    ) -> BoxFuture<'static, CollaboratorResult<ClueResolution>> {
        Box::pin(future::ready(Ok(Self::interpret(message, available))))
    }
}

/// First run of digits in `text`, ignoring thousands separators.
pub fn first_number(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Speech stand-in that never produces audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpeech;

impl SpeechSynthesizer for NoSpeech {
    fn synthesize(&self, _text: &str, _voice: &str) -> BoxFuture<'static, CollaboratorResult<String>> {
        Box::pin(future::ready(Err(CollaboratorError::Unavailable(
            "speech synthesizer",
        ))))
    }
}

/// Generator stand-in; the host then loads the fallback board.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGenerator;

impl BoardGenerator for NoGenerator {
    fn generate(
        &self,
        _preferences: &[PreferenceMessage],
    ) -> BoxFuture<'static, CollaboratorResult<Board>> {
        Box::pin(future::ready(Err(CollaboratorError::Unavailable(
            "board generator",
        ))))
    }
}
