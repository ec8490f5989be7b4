//! Recite -- Memorize statutory text with masked flashcards.

extern crate chrono;
extern crate rand;
extern crate serde_yaml as yaml;

mod settings;
mod error;
mod deck;
mod cards;
mod statistics;
mod scheduler;
mod exchange;

pub use error::Error;
pub use settings::Settings;
pub use deck::{Deck, ParsingErrorLine};
pub use cards::{parse_categories, Card, CardId, Judgment, Metacard, Metacards, Score, Segment, MAX_SCORE, MIN_SCORE};
pub use statistics::{Snapshot, Statistics, Tally, THRESHOLDS};
pub use scheduler::{grade, select_next, weight, ForcedEntry, Graded, Schedule, Scheduler, SchedulerState};
pub use exchange::{Bundle, BundledCard};

/// A calendar day, in the user's local time zone.
pub type Date = chrono::NaiveDate;
