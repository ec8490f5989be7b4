//! Selection and grading of memory cards.

use std::collections::{HashSet, VecDeque};

use log::{debug, info, warn};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Serialize, Deserialize, Deserializer};

use crate::cards::{CardId, Judgment, Metacard, Metacards, Score};
use crate::statistics::{Snapshot, Statistics, Tally};
use crate::{cards, deck, settings, Date, Error};

/// The selection weight of a card with mastery score `score`.
///
/// Only positive scores make a card less likely to be drawn. The weight lies in `(0, 1]` and is
/// `1/11` at the maximal score.
pub fn weight(score: Score) -> f64 {
    1.0 / (1.0 + score.max(0.0))
}

/// Deserialize a value, falling back to its default if it is malformed.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where D: Deserializer<'de>,
          T: DeserializeOwned + Default
{
    let value = yaml::Value::deserialize(deserializer)?;
    Ok(yaml::from_value(value).unwrap_or_else(|err| {
        warn!("ignoring malformed scheduler state ({})", err);
        T::default()
    }))
}

/// A missed card waiting to be forced back into rotation.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ForcedEntry {
    /// The missed card.
    pub id: CardId,
    /// The number of selections left before the card is due.
    ///
    /// The entry is ready once this is zero or less.
    #[serde(default)]
    pub delay: i64,
}

/// The short-term selection state.
///
/// This is persisted across sessions.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Debug)]
pub struct SchedulerState {
    /// The most recently selected cards, most recent last.
    #[serde(default, deserialize_with = "lenient")]
    pub recent_queue: VecDeque<CardId>,
    /// The missed cards, in the order they were missed.
    #[serde(default, deserialize_with = "lenient")]
    pub forced_queue: Vec<ForcedEntry>,
}

impl SchedulerState {
    pub fn new() -> SchedulerState {
        SchedulerState::default()
    }

    /// Forget the short-term history.
    ///
    /// Missed cards stay queued.
    pub fn start_session(&mut self) {
        self.recent_queue.clear();
    }

    /// Record a selected card, keeping only the last `window` selections.
    fn remember(&mut self, id: CardId, window: usize) {
        self.recent_queue.push_back(id);
        self.truncate(window);
    }

    /// Drop all but the last `window` selections.
    fn truncate(&mut self, window: usize) {
        while self.recent_queue.len() > window {
            self.recent_queue.pop_front();
        }
    }

    /// Count down every forced entry by one selection.
    fn advance(&mut self) {
        for entry in &mut self.forced_queue {
            // The delay may come from a hand-edited schedule.
            entry.delay = entry.delay.saturating_sub(1);
        }
    }

    /// Take out the earliest forced entry that is ready.
    fn take_ready(&mut self) -> Option<ForcedEntry> {
        let pos = self.forced_queue.iter().position(|entry| entry.delay <= 0)?;
        Some(self.forced_queue.remove(pos))
    }
}

/// Pick the next card to show out of `pool`.
///
/// Every forced entry is counted down first. If an entry is then ready, the earliest such entry
/// is removed from the queue; it is the answer if its card is in `pool` and is discarded
/// otherwise. Failing that, the card is drawn with probability proportional to its weight among
/// the cards of `pool` not selected recently, or among all of `pool` if every card was.
///
/// A recent queue longer than the window, e.g. one loaded from a schedule written with a larger
/// window, is cut down to its most recent entries first.
///
/// On error, `state` is left unchanged.
pub fn select_next<R: Rng + ?Sized>(
    pool: &[CardId],
    metacards: &Metacards,
    state: &mut SchedulerState,
    settings: &settings::Settings,
    rng: &mut R,
) -> Result<CardId, Error> {
    if pool.is_empty() {
        return Err(Error::EmptyPool);
    }
    if let Some(stale) = pool.iter().find(|id| !metacards.contains(id)) {
        warn!("selection pool references unknown card '{}'", stale);
        return Err(Error::CardNotFound(stale.clone()));
    }

    state.truncate(settings.recent_window);
    state.advance();
    if let Some(entry) = state.take_ready() {
        if pool.contains(&entry.id) {
            info!("forcing missed card '{}' back into rotation", entry.id);
            state.remember(entry.id.clone(), settings.recent_window);
            return Ok(entry.id);
        }
        // It may belong to a category excluded this session. It is lost either way.
        warn!("dropping forced requeue of '{}', which is not in the current pool", entry.id);
    }

    let recent: HashSet<&str> = state.recent_queue.iter().map(String::as_str).collect();
    let mut candidates: Vec<&CardId> = pool.iter().filter(|id| !recent.contains(id.as_str())).collect();
    if candidates.is_empty() {
        // The pool is exhausted by the recent cards; ignore them for this draw.
        candidates = pool.iter().collect();
    }

    let id = roulette(&candidates, metacards, rng).clone();
    debug!("selected '{}' out of {} candidates", id, candidates.len());
    state.remember(id.clone(), settings.recent_window);
    Ok(id)
}

/// Draw one of the nonempty `candidates` with probability proportional to its weight.
fn roulette<'a, R: Rng + ?Sized>(candidates: &[&'a CardId], metacards: &Metacards, rng: &mut R) -> &'a CardId {
    let weights: Vec<f64> = candidates
        .iter()
        .map(|id| metacards.get(id).map_or(1.0, |m| weight(m.score)))
        .collect();
    let total: f64 = weights.iter().sum();

    if total > 0.0 && total.is_finite() {
        let mut r = rng.gen::<f64>() * total;
        for (&id, w) in candidates.iter().zip(&weights) {
            r -= w;
            if r <= 0.0 {
                return id;
            }
        }
    }

    // Rounding left a remainder (or there was nothing to weigh).
    candidates[0]
}

/// The outcome of grading a card.
#[derive(Clone, PartialEq, Debug)]
pub struct Graded {
    /// The card after grading.
    pub metacard: Metacard,
    /// The answers of the day, including this one.
    pub tally: Tally,
    /// The threshold snapshot of the day, taken after grading.
    pub snapshot: Snapshot,
}

/// Grade card `id` with `judgment` on day `today`.
///
/// This updates the score and counters of the card, queues the card for forced requeue if it was
/// missed, counts the answer in the daily statistics and retakes the day's threshold snapshot over
/// every card in `metacards`.
///
/// On error, nothing is changed.
pub fn grade(
    id: &str,
    judgment: Judgment,
    metacards: &mut Metacards,
    state: &mut SchedulerState,
    statistics: &mut Statistics,
    settings: &settings::Settings,
    today: Date,
) -> Result<Graded, Error> {
    let metacard = match metacards.update(id, |m| m.review(judgment)) {
        Ok(metacard) => metacard.clone(),
        Err(err) => {
            warn!("cannot grade: {}", err);
            return Err(err);
        },
    };

    if judgment == Judgment::Miss {
        state.forced_queue.push(ForcedEntry {
            id: metacard.id.clone(),
            delay: settings.requeue_delay,
        });
    }

    let tally = statistics.record(today, judgment);
    let snapshot = statistics.snapshot(today, metacards);
    debug!("graded '{}' as {}; score is now {}", id, judgment, metacard.score);

    Ok(Graded {
        metacard,
        tally,
        snapshot,
    })
}

/// A card schedule.
///
/// Card schedules are the persistently stored state data of Recite. They contain a number of
/// so-called "metacards", which hold the mastery state of the respective card, the selection
/// state and the daily statistics. They do not contain the content of the cards.
#[derive(Serialize, Deserialize, Clone, Default, Debug)]
pub struct Schedule {
    /// The mastery states of the cards in the deck.
    #[serde(default)]
    metacards: Metacards,
    /// The mastery states of cards that were removed from the deck.
    ///
    /// They are restored if the card is added back.
    #[serde(default)]
    archive: Metacards,
    /// The selection state.
    #[serde(default, deserialize_with = "lenient")]
    state: SchedulerState,
    /// The daily statistics.
    #[serde(default)]
    statistics: Statistics,
}

impl Schedule {
    /// Create new schedule.
    pub fn new() -> Schedule {
        Schedule::default()
    }

    /// Load from YAML-formatted text.
    pub fn parse(input: &str) -> Result<Schedule, yaml::Error> {
        yaml::from_str(input)
    }

    /// Serialize to YAML-formatted text.
    ///
    /// This is the inverse to `parse`.
    pub fn serialize(&self) -> Result<String, yaml::Error> {
        yaml::to_string(self)
    }

    /// Get the daily statistics.
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Get the selection state.
    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Get the mastery states of the cards in the deck.
    pub fn metacards(&self) -> &Metacards {
        &self.metacards
    }

    /// Pick the next card out of `pool`. See `select_next`.
    pub fn select_next<R: Rng + ?Sized>(&mut self, pool: &[CardId], settings: &settings::Settings, rng: &mut R)
        -> Result<CardId, Error>
    {
        select_next(pool, &self.metacards, &mut self.state, settings, rng)
    }

    /// Grade a card. See `grade`.
    pub fn grade(&mut self, id: &str, judgment: Judgment, settings: &settings::Settings, today: Date)
        -> Result<Graded, Error>
    {
        grade(id, judgment, &mut self.metacards, &mut self.state, &mut self.statistics, settings, today)
    }

    /// Match the metacards with the cards of `deck`.
    ///
    /// Cards without a metacard get a fresh one, metacards without a card are archived and
    /// archived metacards whose card is back are restored.
    pub fn sync(&mut self, deck: &deck::Deck) {
        let restored: Vec<CardId> = self.archive
            .iter()
            .filter(|m| deck.contains(&m.id) && !self.metacards.contains(&m.id))
            .map(|m| m.id.clone())
            .collect();
        for id in restored {
            if let Some(metacard) = self.archive.remove(&id) {
                info!("restoring archived card '{}'", id);
                self.metacards.insert(metacard);
            }
        }

        let removed: Vec<CardId> = self.metacards
            .iter()
            .filter(|m| !deck.contains(&m.id))
            .map(|m| m.id.clone())
            .collect();
        for id in removed {
            if let Some(metacard) = self.metacards.remove(&id) {
                info!("archiving card '{}', which is no longer in the deck", id);
                self.archive.insert(metacard);
            }
        }

        // De-orphan cards that are not a part of the schedule yet.
        for (id, _) in deck.iter() {
            if !self.metacards.contains(id) {
                self.metacards.insert(Metacard::new(id.clone()));
            }
        }
    }

    /// Insert or replace the metacard of a card in the deck.
    pub(crate) fn put(&mut self, metacard: Metacard) {
        self.archive.remove(&metacard.id);
        self.metacards.insert(metacard);
    }

    /// Merge `statistics` into the daily statistics; its days win.
    pub(crate) fn merge_statistics(&mut self, statistics: Statistics) {
        self.statistics.merge(statistics);
    }
}

/// The card scheduler.
///
/// This joins a deck with its schedule and runs a review session over a pool of cards.
#[derive(Debug)]
pub struct Scheduler<R> {
    /// The part of the scheduler that is permanently stored.
    ///
    /// It is an type invariant that every card of `deck` has a metacard.
    sched: Schedule,
    /// The content of the memory cards.
    deck: deck::Deck,
    /// The cards eligible in the current session, in deck order.
    pool: Vec<CardId>,
    /// The current card.
    current: CardId,
    /// The source of randomness for selection.
    rng: R,
}

impl<R: Rng> Scheduler<R> {
    /// Create a scheduler from a deck and schedule and start a session over the cards matching
    /// `filter` (see `Deck::ids`).
    pub fn new(deck: deck::Deck, mut sched: Schedule, filter: Option<&[String]>, rng: R) -> Result<Scheduler<R>, Error> {
        sched.sync(&deck);

        let mut scheduler = Scheduler {
            sched,
            deck,
            pool: Vec::new(),
            current: CardId::new(),
            rng,
        };
        scheduler.start_session(filter)?;

        Ok(scheduler)
    }

    /// Start a new session over the cards matching `filter` and pick the first card.
    ///
    /// The short-term history is cleared, while missed cards stay queued. If no card matches,
    /// the current session continues unchanged.
    pub fn start_session(&mut self, filter: Option<&[String]>) -> Result<(), Error> {
        let pool = self.deck.ids(filter);
        if pool.is_empty() {
            return Err(Error::EmptyPool);
        }
        info!("starting session over {} cards", pool.len());

        self.pool = pool;
        self.sched.state.start_session();
        self.pick_card()
    }

    /// Select the next card out of the pool.
    fn pick_card(&mut self) -> Result<(), Error> {
        self.current = self.sched.select_next(&self.pool, &self.deck.settings, &mut self.rng)?;
        Ok(())
    }

    /// Grade the current card and pick the next one.
    pub fn review(&mut self, judgment: Judgment, today: Date) -> Result<Graded, Error> {
        let graded = self.sched.grade(&self.current, judgment, &self.deck.settings, today)?;
        self.pick_card()?;
        Ok(graded)
    }

    /// Get the ID of the current card.
    pub fn current_id(&self) -> &CardId {
        &self.current
    }

    /// Get the current card.
    pub fn current_card(&self) -> Option<&cards::Card> {
        self.deck.get(&self.current)
    }

    /// Get the current card's metacard.
    pub fn current_metacard(&self) -> Option<&Metacard> {
        self.sched.metacards.get(&self.current)
    }

    /// Get the cards of the current session.
    pub fn pool(&self) -> &[CardId] {
        &self.pool
    }

    /// Get the number of missed cards waiting to be forced back into rotation.
    pub fn forced_cards(&self) -> usize {
        self.sched.state.forced_queue.len()
    }

    /// Get the deck.
    pub fn deck(&self) -> &deck::Deck {
        &self.deck
    }

    /// Get the underlying schedule.
    pub fn schedule(&self) -> &Schedule {
        &self.sched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ids(n: usize) -> Vec<CardId> {
        (0..n).map(|i| ((b'A' + i as u8) as char).to_string()).collect()
    }

    fn metacards(pool: &[CardId]) -> Metacards {
        Metacards::from(pool.iter().cloned().map(Metacard::new).collect::<Vec<_>>())
    }

    fn today() -> Date {
        Date::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn weights() {
        assert_eq!(weight(0.0), 1.0);
        assert_eq!(weight(-3.0), 1.0);
        assert_eq!(weight(-5.0), 1.0);
        assert_eq!(weight(10.0), 1.0 / 11.0);
        let mut last = weight(0.0);
        for i in 1..=20 {
            let w = weight(i as f64 * 0.5);
            assert!(w <= last);
            last = w;
        }
    }

    #[test]
    fn empty_pool() {
        let mut state = SchedulerState::new();
        state.forced_queue.push(ForcedEntry { id: "A".to_string(), delay: 1 });
        let before = state.clone();
        let mut rng = StdRng::seed_from_u64(1);
        let res = select_next(&[], &Metacards::new(), &mut state, &settings::Settings::default(), &mut rng);
        assert_eq!(res, Err(Error::EmptyPool));
        assert_eq!(state, before);
    }

    #[test]
    fn unknown_card_in_pool() {
        let pool = ids(3);
        let mut state = SchedulerState::new();
        let mut rng = StdRng::seed_from_u64(1);
        let res = select_next(&pool, &metacards(&pool[..2]), &mut state, &settings::Settings::default(), &mut rng);
        assert_eq!(res, Err(Error::CardNotFound("C".to_string())));
        assert_eq!(state, SchedulerState::new());
    }

    #[test]
    fn uniform_selection() {
        let pool = ids(6);
        let cards = metacards(&pool);
        let settings = settings::Settings::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0usize; 6];

        let trials = 60_000;
        for _ in 0..trials {
            let mut state = SchedulerState::new();
            let id = select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap();
            counts[pool.iter().position(|x| *x == id).unwrap()] += 1;
        }

        for &count in &counts {
            // Expect 10000 each; allow for about 5 standard deviations.
            assert!(count > 9_550 && count < 10_450, "counts: {:?}", counts);
        }
    }

    #[test]
    fn weighted_selection() {
        let pool = ids(2);
        let mut cards = metacards(&pool);
        cards.update("B", |m| m.score = 10.0).unwrap();
        let settings = settings::Settings::default();
        let mut rng = StdRng::seed_from_u64(7);

        let mut b = 0;
        for _ in 0..12_000 {
            let mut state = SchedulerState::new();
            if select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap() == "B" {
                b += 1;
            }
        }
        // P(B) = (1/11) / (1 + 1/11) = 1/12.
        assert!(b > 800 && b < 1_200, "B was drawn {} times", b);
    }

    #[test]
    fn recency_suppression() {
        let settings = settings::Settings::default();
        for &n in &[6, 7, 10] {
            let pool = ids(n);
            let cards = metacards(&pool);
            let mut state = SchedulerState::new();
            let mut rng = StdRng::seed_from_u64(n as u64);
            let mut history: Vec<CardId> = Vec::new();

            for _ in 0..200 {
                let id = select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap();
                let start = history.len().saturating_sub(5);
                assert!(!history[start..].contains(&id), "{} repeated within {:?}", id, &history[start..]);
                history.push(id);
                assert!(state.recent_queue.len() <= 5);
            }
        }
    }

    #[test]
    fn exhausted_pool_falls_back() {
        let settings = settings::Settings::default();
        let pool = ids(3);
        let cards = metacards(&pool);
        let mut state = SchedulerState::new();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..3 {
            select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap();
        }
        // Every card is recent now, yet selection goes on.
        let id = select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap();
        assert!(pool.contains(&id));
        assert_eq!(state.recent_queue.len(), 4);

        let single = ids(1);
        for _ in 0..10 {
            assert_eq!(select_next(&single, &cards, &mut state, &settings, &mut rng).unwrap(), "A");
        }
        assert_eq!(state.recent_queue.len(), 5);
    }

    #[test]
    fn forced_requeue_timing() {
        let settings = settings::Settings::default();
        let pool = ids(8);
        let mut cards = metacards(&pool);
        let mut state = SchedulerState::new();
        let mut stats = Statistics::new();

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            state.start_session();
            let x = select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap();
            grade(&x, Judgment::Miss, &mut cards, &mut state, &mut stats, &settings, today()).unwrap();

            for _ in 0..4 {
                assert_ne!(select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap(), x);
            }
            assert_eq!(select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap(), x);
            assert!(state.forced_queue.is_empty());
        }
    }

    #[test]
    fn forced_requeue_counts_down_globally() {
        let settings = settings::Settings::default();
        let pool = ids(8);
        let cards = metacards(&pool);
        let mut state = SchedulerState::new();
        state.forced_queue.push(ForcedEntry { id: "H".to_string(), delay: 5 });
        let mut rng = StdRng::seed_from_u64(9);

        // Selections over another pool count as well.
        for _ in 0..4 {
            select_next(&pool[..6], &cards, &mut state, &settings, &mut rng).unwrap();
        }
        assert_eq!(state.forced_queue[0].delay, 1);
        assert_eq!(select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap(), "H");
    }

    #[test]
    fn forced_entry_outside_pool_is_dropped() {
        let settings = settings::Settings::default();
        let pool = ids(8);
        let cards = metacards(&pool);
        let mut state = SchedulerState::new();
        state.forced_queue.push(ForcedEntry { id: "Z".to_string(), delay: 1 });
        state.forced_queue.push(ForcedEntry { id: "B".to_string(), delay: 0 });
        state.forced_queue.push(ForcedEntry { id: "C".to_string(), delay: 3 });
        let mut rng = StdRng::seed_from_u64(5);

        select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap();
        // `Z` is lost, and `B` waits for the next call even though it is ready.
        assert_eq!(state.forced_queue, vec![
            ForcedEntry { id: "B".to_string(), delay: -1 },
            ForcedEntry { id: "C".to_string(), delay: 2 },
        ]);
        assert_eq!(select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap(), "B");
    }

    #[test]
    fn grade_miss() {
        let settings = settings::Settings::default();
        let pool = ids(2);
        let mut cards = metacards(&pool);
        let mut state = SchedulerState::new();
        let mut stats = Statistics::new();

        let graded = grade("A", Judgment::Miss, &mut cards, &mut state, &mut stats, &settings, today()).unwrap();
        assert_eq!(graded.metacard.score, -1.0);
        assert_eq!(graded.metacard.answer_count, 1);
        assert_eq!(graded.metacard.correct_count, 0);
        assert_eq!(graded.tally, Tally { correct: 0, total: 1 });
        assert_eq!(state.forced_queue, vec![ForcedEntry { id: "A".to_string(), delay: 5 }]);

        let graded = grade("B", Judgment::Correct, &mut cards, &mut state, &mut stats, &settings, today()).unwrap();
        assert_eq!(graded.tally, Tally { correct: 1, total: 2 });
        assert_eq!(state.forced_queue.len(), 1);
    }

    #[test]
    fn grade_unknown_card() {
        let settings = settings::Settings::default();
        let mut cards = metacards(&ids(2));
        let mut state = SchedulerState::new();
        let mut stats = Statistics::new();

        let res = grade("Q", Judgment::Miss, &mut cards, &mut state, &mut stats, &settings, today());
        assert_eq!(res, Err(Error::CardNotFound("Q".to_string())));
        assert!(state.forced_queue.is_empty());
        assert_eq!(stats, Statistics::new());
    }

    #[test]
    fn grade_snapshot() {
        let settings = settings::Settings::default();
        let pool = ids(4);
        let mut cards = metacards(&pool);
        for (id, &score) in pool.iter().zip(&[2.0, 5.0, 10.0, 2.0]) {
            cards.update(id, |m| m.score = score).unwrap();
        }
        let mut state = SchedulerState::new();
        let mut stats = Statistics::new();

        let graded = grade("D", Judgment::Correct, &mut cards, &mut state, &mut stats, &settings, today()).unwrap();
        assert_eq!(graded.snapshot, Snapshot { ge3: 3, ge5: 2, ge10: 1 });
        let graded = grade("B", Judgment::Miss, &mut cards, &mut state, &mut stats, &settings, today()).unwrap();
        assert_eq!(graded.snapshot, Snapshot { ge3: 3, ge5: 1, ge10: 1 });
        assert_eq!(stats.thresholds[&today()], Snapshot { ge3: 3, ge5: 1, ge10: 1 });
    }

    #[test]
    fn grade_is_deterministic() {
        let settings = settings::Settings::default();
        let pool = ids(3);
        let cards = metacards(&pool);
        let state = SchedulerState::new();
        let stats = Statistics::new();

        let run = || {
            let (mut cards, mut state, mut stats) = (cards.clone(), state.clone(), stats.clone());
            let graded = grade("B", Judgment::Partial, &mut cards, &mut state, &mut stats, &settings, today()).unwrap();
            (graded, state, stats)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn score_stays_clamped() {
        let settings = settings::Settings::default();
        let pool = ids(3);
        let mut cards = metacards(&pool);
        let mut state = SchedulerState::new();
        let mut stats = Statistics::new();
        let mut rng = StdRng::seed_from_u64(11);
        let judgments = [Judgment::Correct, Judgment::Partial, Judgment::Miss];

        for i in 0..2_000 {
            // Bias towards long runs of one judgment to hit both bounds.
            let judgment = judgments[(i / 40 + rng.gen_range(0..2)) % 3];
            let id = select_next(&pool, &cards, &mut state, &settings, &mut rng).unwrap();
            let graded = grade(&id, judgment, &mut cards, &mut state, &mut stats, &settings, today()).unwrap();
            assert!(graded.metacard.score >= cards::MIN_SCORE && graded.metacard.score <= cards::MAX_SCORE);
        }
        assert_eq!(stats.tally(today()).total, 2_000);
    }

    #[test]
    fn malformed_state() {
        let sched = Schedule::parse("
metacards:
  - id: A
    score: 2.5
    answer_count: 3
    correct_count: 2
state:
  recent_queue: 17
  forced_queue:
    - id: A
      delay: soon
").unwrap();
        assert_eq!(sched.state, SchedulerState::new());
        assert_eq!(sched.metacards.get("A").unwrap().score, 2.5);

        let sched = Schedule::parse("state: [1, 2]").unwrap();
        assert_eq!(sched.state, SchedulerState::new());

        let sched = Schedule::parse("metacards: []").unwrap();
        assert_eq!(sched.state, SchedulerState::new());
    }

    #[test]
    fn malformed_metacards() {
        assert!(Schedule::parse("
metacards:
  - id: A
    score: 50
    answer_count: 1
    correct_count: 1
").is_err());
        assert!(Schedule::parse("
metacards:
  - id: A
    score: 1
    answer_count: 1
    correct_count: 7
").is_err());
        assert!(Schedule::parse("
archive:
  - id: A
    score: -6
").is_err());
        assert!(Schedule::parse("
metacards:
  - id: A
    score: -5
    answer_count: 7
    correct_count: 7
").is_ok());
    }

    #[test]
    fn extreme_forced_delay() {
        let mut sched = Schedule::parse(&format!("
metacards:
  - id: A
  - id: B
state:
  forced_queue:
    - id: Z
      delay: {}
    - id: A
      delay: 3
", i64::MIN)).unwrap();
        let pool = ids(2);
        let mut rng = StdRng::seed_from_u64(2);

        sched.select_next(&pool, &settings::Settings::default(), &mut rng).unwrap();
        assert_eq!(sched.state.forced_queue, vec![ForcedEntry { id: "A".to_string(), delay: 2 }]);
    }

    #[test]
    fn long_recent_queue_is_cut() {
        let mut sched = Schedule::parse("
state:
  recent_queue: [A, B, C, D, E, F, G, H]
").unwrap();
        let pool = ids(9);
        let cards = metacards(&pool);
        let mut rng = StdRng::seed_from_u64(4);

        let id = select_next(&pool, &cards, &mut sched.state, &settings::Settings::default(), &mut rng).unwrap();
        // Only the last five loaded entries still count as recent.
        assert!(["A", "B", "C", "I"].contains(&id.as_str()), "selected {}", id);
        let recent: Vec<&str> = sched.state.recent_queue.iter().map(String::as_str).collect();
        assert_eq!(recent, vec!["E", "F", "G", "H", id.as_str()]);
    }

    #[test]
    fn schedule_round_trip() {
        let mut sched = Schedule::new();
        let deck = deck::Deck::parse("[card a]\ntext: {{x}}\n[card b]\ntext: {{y}}\n").unwrap();
        sched.sync(&deck);
        sched.grade("a", Judgment::Miss, &deck.settings, today()).unwrap();

        let again = Schedule::parse(&sched.serialize().unwrap()).unwrap();
        assert_eq!(again.state, sched.state);
        assert_eq!(again.statistics, sched.statistics);
        assert_eq!(again.metacards.get("a"), sched.metacards.get("a"));
    }

    #[test]
    fn sync_archives_and_restores() {
        let mut sched = Schedule::new();
        let both = deck::Deck::parse("[card a]\ntext: {{x}}\n[card b]\ntext: {{y}}\n").unwrap();
        let only_b = deck::Deck::parse("[card b]\ntext: {{y}}\n").unwrap();

        sched.sync(&both);
        sched.grade("a", Judgment::Correct, &both.settings, today()).unwrap();
        sched.grade("a", Judgment::Correct, &both.settings, today()).unwrap();
        sched.grade("a", Judgment::Correct, &both.settings, today()).unwrap();

        sched.sync(&only_b);
        assert!(!sched.metacards.contains("a"));
        assert_eq!(sched.archive.len(), 1);

        sched.sync(&both);
        assert_eq!(sched.metacards.get("a").unwrap().score, 3.0);
        assert!(sched.archive.is_empty());
    }

    #[test]
    fn scheduler_session() {
        let deck = deck::Deck::parse("
[settings]
requeue delay: 2

[card a]
categories: X
text: {{a}}

[card b]
categories: Y
text: {{b}}

[card c]
categories: X
text: {{c}}
").unwrap();
        let mut sched = Schedule::new();
        sched.state.recent_queue.extend(ids(5));
        sched.state.forced_queue.push(ForcedEntry { id: "b".to_string(), delay: 9 });

        let mut scheduler = Scheduler::new(deck, sched, Some(&["X".to_string()][..]), StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(scheduler.pool(), &["a".to_string(), "c".to_string()][..]);
        assert!(scheduler.pool().contains(scheduler.current_id()));
        assert_eq!(scheduler.schedule().state().recent_queue.len(), 1);
        assert_eq!(scheduler.forced_cards(), 1);

        let first = scheduler.current_id().clone();
        let graded = scheduler.review(Judgment::Miss, today()).unwrap();
        assert_eq!(graded.metacard.id, first);
        assert_eq!(scheduler.forced_cards(), 2);

        // No card matches; the session goes on.
        assert_eq!(scheduler.start_session(Some(&["none".to_string()][..])), Err(Error::EmptyPool));
        assert_eq!(scheduler.pool().len(), 2);

        scheduler.start_session(None).unwrap();
        assert_eq!(scheduler.pool().len(), 3);
        assert!(scheduler.current_card().is_some());
        assert!(scheduler.current_metacard().is_some());
    }
}
