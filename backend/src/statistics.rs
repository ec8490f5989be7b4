//! Daily review statistics.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::cards::{self, Judgment};
use crate::Date;

/// The mastery thresholds that are tracked by the daily snapshots.
pub const THRESHOLDS: [cards::Score; 3] = [3.0, 5.0, 10.0];

/// The answers given on a day.
#[derive(Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Tally {
    /// Answers judged correct.
    #[serde(default)]
    pub correct: u64,
    /// All answers, including partial ones and misses.
    #[serde(default)]
    pub total: u64,
}

/// The number of cards at or above each mastery threshold, as of the last review of a day.
#[derive(Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Snapshot {
    #[serde(default)]
    pub ge3: u64,
    #[serde(default)]
    pub ge5: u64,
    #[serde(default)]
    pub ge10: u64,
}

impl Snapshot {
    /// Take a snapshot of the scores of `metacards`.
    pub fn of(metacards: &cards::Metacards) -> Snapshot {
        Snapshot {
            ge3: metacards.count_at_least(THRESHOLDS[0]),
            ge5: metacards.count_at_least(THRESHOLDS[1]),
            ge10: metacards.count_at_least(THRESHOLDS[2]),
        }
    }
}

/// Review statistics, keyed by day.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Debug)]
pub struct Statistics {
    /// The answers given on each day.
    #[serde(default, rename = "dailyStats")]
    pub daily: BTreeMap<Date, Tally>,
    /// The threshold snapshot of each day.
    #[serde(default, rename = "dailyThresholds")]
    pub thresholds: BTreeMap<Date, Snapshot>,
}

impl Statistics {
    pub fn new() -> Statistics {
        Statistics::default()
    }

    /// Count an answer on day `today`.
    pub fn record(&mut self, today: Date, judgment: Judgment) -> Tally {
        let tally = self.daily.entry(today).or_insert_with(Tally::default);
        tally.total += 1;
        if judgment == Judgment::Correct {
            tally.correct += 1;
        }

        *tally
    }

    /// Replace the snapshot of day `today`.
    pub fn snapshot(&mut self, today: Date, metacards: &cards::Metacards) -> Snapshot {
        let snapshot = Snapshot::of(metacards);
        self.thresholds.insert(today, snapshot);
        snapshot
    }

    /// The answers given on `day`.
    pub fn tally(&self, day: Date) -> Tally {
        self.daily.get(&day).cloned().unwrap_or_default()
    }

    /// All days with any statistics, in chronological order.
    pub fn days(&self) -> Vec<Date> {
        let mut days: Vec<Date> = self.daily.keys().chain(self.thresholds.keys()).cloned().collect();
        days.sort();
        days.dedup();
        days
    }

    /// Merge `other` into these statistics, day by day. The days present in `other` win.
    pub fn merge(&mut self, other: Statistics) {
        self.daily.extend(other.daily);
        self.thresholds.extend(other.thresholds);
    }
}
