//! Content and mastery state of flashcards.

use std::collections::HashMap;
use std::{fmt, str};

use log::warn;
use serde::{de, Serialize, Deserialize, Deserializer};

use crate::error::Error;

/// The mastery score of a card.
///
/// Rises with correct answers and falls with misses. It always lies within
/// `MIN_SCORE..=MAX_SCORE`.
pub type Score = f64;
/// The identifier of a card, as is specified by the user in the deck file.
pub type CardId = String;

/// The lowest mastery score a card can have.
pub const MIN_SCORE: Score = -5.0;
/// The highest mastery score a card can have.
pub const MAX_SCORE: Score = 10.0;

/// Saturate a score into `MIN_SCORE..=MAX_SCORE`.
///
/// NaN saturates to `MIN_SCORE`.
pub fn clamp(score: Score) -> Score {
    score.max(MIN_SCORE).min(MAX_SCORE)
}

/// The user's judgment of their answer to a card.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Judgment {
    /// Every masked span was recalled (`o`).
    Correct,
    /// Partially recalled (`d`).
    Partial,
    /// Missed (`x`). The card is forced back into rotation shortly after.
    Miss,
}

impl Judgment {
    /// The change in mastery score this judgment causes.
    pub fn delta(self) -> Score {
        match self {
            Judgment::Correct => 1.0,
            Judgment::Partial => -0.5,
            Judgment::Miss => -1.0,
        }
    }

    /// The short mark of the judgment.
    pub fn mark(self) -> char {
        match self {
            Judgment::Correct => 'o',
            Judgment::Partial => 'd',
            Judgment::Miss => 'x',
        }
    }
}

impl fmt::Display for Judgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Judgment::Correct => write!(f, "correct"),
            Judgment::Partial => write!(f, "partial"),
            Judgment::Miss => write!(f, "miss"),
        }
    }
}

impl str::FromStr for Judgment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Judgment, Error> {
        match s.trim() {
            "o" | "correct" => Ok(Judgment::Correct),
            "d" | "partial" => Ok(Judgment::Partial),
            "x" | "miss" => Ok(Judgment::Miss),
            other => Err(Error::InvalidJudgment(other.to_string())),
        }
    }
}

/// A piece of card text.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Segment<'a> {
    /// Text that is always shown.
    Plain(&'a str),
    /// A masked span, i.e. an answer.
    Mask(&'a str),
}

impl<'a> Segment<'a> {
    /// The underlying text, with the mask markers removed.
    pub fn as_str(&self) -> &'a str {
        match *self {
            Segment::Plain(s) | Segment::Mask(s) => s,
        }
    }
}

/// Iterator over the segments of a card text.
///
/// An unterminated `{{` is yielded as plain text.
pub struct Segments<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Segment<'a>> {
        if self.rest.is_empty() {
            return None;
        }

        let rest = self.rest;
        match rest.find("{{") {
            Some(0) => match rest[2..].find("}}") {
                Some(len) => {
                    self.rest = &rest[2 + len + 2..];
                    Some(Segment::Mask(&rest[2..2 + len]))
                },
                None => {
                    self.rest = "";
                    Some(Segment::Plain(rest))
                },
            },
            Some(start) => {
                self.rest = &rest[start..];
                Some(Segment::Plain(&rest[..start]))
            },
            None => {
                self.rest = "";
                Some(Segment::Plain(rest))
            },
        }
    }
}

/// Split `text` into plain and masked segments.
pub fn segments(text: &str) -> Segments<'_> {
    Segments { rest: text }
}

/// Extract the answers (the trimmed, nonempty masked spans) of `text`.
pub fn extract_answers(text: &str) -> Result<Vec<String>, &'static str> {
    let mut answers = Vec::new();
    for segment in segments(text) {
        match segment {
            Segment::Plain(s) if s.contains("{{") => return Err("unterminated mask (missing '}}')"),
            Segment::Plain(_) => (),
            Segment::Mask(s) => {
                let s = s.trim();
                if !s.is_empty() {
                    answers.push(s.to_string());
                }
            },
        }
    }

    Ok(answers)
}

/// Parse a comma-separated category list, dropping empty entries.
pub fn parse_categories(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// The user-specified content of a card.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Card {
    /// The passage, with answers written as `{{answer}}`.
    pub text: String,
    /// The answers, in order of appearance.
    pub answers: Vec<String>,
    /// The categories of the card.
    pub categories: Vec<String>,
}

impl Card {
    /// Create a card from its text, extracting the answers.
    pub fn new(text: String, categories: Vec<String>) -> Result<Card, &'static str> {
        Ok(Card {
            answers: extract_answers(&text)?,
            text,
            categories,
        })
    }

    /// The segments of the card text.
    pub fn segments(&self) -> Segments<'_> {
        segments(&self.text)
    }

    /// Render the text, either with numbered blanks in place of the answers or with the answers
    /// shown in brackets.
    pub fn render(&self, reveal: bool) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut n = 0;
        for segment in self.segments() {
            match segment {
                Segment::Plain(s) => out.push_str(s),
                Segment::Mask(s) => {
                    n += 1;
                    if reveal {
                        out.push_str(&format!("[{}]", s.trim()));
                    } else {
                        out.push_str(&format!("[{}]____", n));
                    }
                },
            }
        }

        out
    }

    /// Whether the card belongs to any of `categories`.
    ///
    /// A card without categories belongs to none.
    pub fn in_any(&self, categories: &[String]) -> bool {
        self.categories.iter().any(|c| categories.contains(c))
    }

    /// A one-line summary of the card: its first sentence.
    pub fn summary(&self) -> String {
        let flat: String = self.segments().map(|s| s.as_str()).collect();
        let text = flat.split_whitespace().collect::<Vec<_>>().join(" ");

        if text.is_empty() {
            return "(empty)".to_string();
        }
        // A sentence ends at the ideographic full stop.
        if let Some(dot) = text.find('。') {
            return text[..dot + '。'.len_utf8()].chars().take(120).collect();
        }

        let mut summary: String = text.chars().take(100).collect();
        if text.chars().count() > 100 {
            summary.push('…');
        }
        summary
    }
}

/// The mastery state of a flashcard.
///
/// The content of the card is stored separately, in the form of a `Card`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Metacard {
    /// The user-specified ID of the card.
    pub id: CardId,
    /// The mastery score.
    #[serde(default)]
    pub score: Score,
    /// The number of times the card was answered.
    #[serde(default)]
    pub answer_count: u64,
    /// The number of times the card was answered correctly.
    #[serde(default)]
    pub correct_count: u64,
}

impl Metacard {
    pub fn new(id: CardId) -> Metacard {
        Metacard {
            id,
            score: 0.0,
            answer_count: 0,
            correct_count: 0,
        }
    }

    /// Update the card after it was answered.
    pub fn review(&mut self, judgment: Judgment) {
        self.score = clamp(self.score + judgment.delta());
        self.answer_count += 1;
        if judgment == Judgment::Correct {
            self.correct_count += 1;
        }
    }

    /// Check the card invariants.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.id.is_empty() {
            Err("empty id")
        } else if !self.score.is_finite() || self.score < MIN_SCORE || self.score > MAX_SCORE {
            Err("score out of range")
        } else if self.correct_count > self.answer_count {
            Err("more correct answers than answers")
        } else {
            Ok(())
        }
    }
}

/// An ordered collection of metacards with lookup by ID.
///
/// Deserialization fails if any metacard breaks the invariants checked by `Metacard::validate`.
#[derive(Serialize, Clone, Debug, Default)]
#[serde(into = "Vec<Metacard>")]
pub struct Metacards {
    cards: Vec<Metacard>,
    /// Maps IDs to positions in `cards`.
    index: HashMap<CardId, usize>,
}

impl Metacards {
    pub fn new() -> Metacards {
        Metacards::default()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Metacard> {
        self.index.get(id).map(|&i| &self.cards[i])
    }

    /// Apply `mutator` to the metacard with ID `id`.
    pub fn update<F>(&mut self, id: &str, mutator: F) -> Result<&Metacard, Error>
        where F: FnOnce(&mut Metacard)
    {
        let i = *self.index.get(id).ok_or_else(|| Error::CardNotFound(id.to_string()))?;
        mutator(&mut self.cards[i]);
        Ok(&self.cards[i])
    }

    /// Insert a metacard, replacing any metacard with the same ID in place.
    pub fn insert(&mut self, metacard: Metacard) {
        if let Some(&i) = self.index.get(&metacard.id) {
            self.cards[i] = metacard;
        } else {
            self.index.insert(metacard.id.clone(), self.cards.len());
            self.cards.push(metacard);
        }
    }

    /// Remove and return the metacard with ID `id`.
    pub fn remove(&mut self, id: &str) -> Option<Metacard> {
        let i = self.index.remove(id)?;
        let metacard = self.cards.remove(i);
        // Shift the positions following the removed card.
        for pos in self.index.values_mut() {
            if *pos > i {
                *pos -= 1;
            }
        }

        Some(metacard)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metacard> {
        self.cards.iter()
    }

    /// Count the cards whose score is at least `threshold`.
    pub fn count_at_least(&self, threshold: Score) -> u64 {
        self.cards.iter().filter(|m| m.score >= threshold).count() as u64
    }
}

impl From<Vec<Metacard>> for Metacards {
    fn from(vec: Vec<Metacard>) -> Metacards {
        let mut metacards = Metacards::new();
        for metacard in vec {
            if metacards.contains(&metacard.id) {
                warn!("dropping duplicate metacard '{}'", metacard.id);
                continue;
            }
            metacards.insert(metacard);
        }

        metacards
    }
}

impl<'de> Deserialize<'de> for Metacards {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Metacards, D::Error> {
        let vec = Vec::<Metacard>::deserialize(deserializer)?;
        for metacard in &vec {
            metacard.validate().map_err(|reason| {
                <D::Error as de::Error>::custom(format!("invalid metacard '{}': {}", metacard.id, reason))
            })?;
        }

        Ok(Metacards::from(vec))
    }
}

impl From<Metacards> for Vec<Metacard> {
    fn from(metacards: Metacards) -> Vec<Metacard> {
        metacards.cards
    }
}
