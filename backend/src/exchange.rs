//! Bulk import and export of cards and statistics as JSON.

use serde::{Serialize, Deserialize};

use crate::cards::{self, Card, CardId, Metacard, Score};
use crate::deck::Deck;
use crate::scheduler::Schedule;
use crate::statistics::Statistics;
use crate::Error;

/// A card with its mastery state, as exchanged.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BundledCard {
    pub id: CardId,
    pub text: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub score: Score,
    #[serde(default)]
    pub answer_count: u64,
    #[serde(default)]
    pub correct_count: u64,
}

impl BundledCard {
    /// Split into content and mastery state, checking the card invariants.
    fn split(self) -> Result<(Card, Metacard), Error> {
        let invalid = |reason| Error::InvalidCard(self.id.clone(), reason);

        if self.id.trim() != self.id || self.id.contains(char::is_control) {
            return Err(invalid("malformed id"));
        }
        if self.text.trim().is_empty() {
            return Err(invalid("empty text"));
        }
        let metacard = Metacard {
            id: self.id.clone(),
            score: self.score,
            answer_count: self.answer_count,
            correct_count: self.correct_count,
        };
        metacard.validate().map_err(invalid)?;
        // Categories must survive a trip through the deck format.
        let categories = self.categories.iter().flat_map(|c| cards::parse_categories(c)).collect();
        let card = Card::new(self.text.clone(), categories).map_err(invalid)?;

        Ok((card, metacard))
    }
}

/// An exported collection.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Debug)]
pub struct Bundle {
    /// The cards, in deck order.
    #[serde(default)]
    pub cards: Vec<BundledCard>,
    /// The daily statistics.
    #[serde(flatten)]
    pub statistics: Statistics,
}

impl Bundle {
    /// Collect the cards of `deck` and the state of `sched`.
    pub fn export(deck: &Deck, sched: &Schedule) -> Bundle {
        let cards = deck.iter().map(|(id, card)| {
            let metacard = sched.metacards().get(id).cloned().unwrap_or_else(|| Metacard::new(id.clone()));
            BundledCard {
                id: id.clone(),
                text: card.text.clone(),
                categories: card.categories.clone(),
                score: metacard.score,
                answer_count: metacard.answer_count,
                correct_count: metacard.correct_count,
            }
        }).collect();

        Bundle {
            cards,
            statistics: sched.statistics().clone(),
        }
    }

    /// Load from JSON-formatted text.
    pub fn parse(input: &str) -> Result<Bundle, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// Serialize to pretty-printed JSON.
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Merge the bundle into `deck` and `sched`.
    ///
    /// Cards are matched by ID; the bundled card replaces both the content and the mastery state
    /// of an existing card, and new cards are appended to the deck. The bundled daily statistics
    /// replace those of the same days. If any card is invalid, nothing is merged.
    ///
    /// Returns the number of new cards.
    pub fn merge_into(self, deck: &mut Deck, sched: &mut Schedule) -> Result<usize, Error> {
        let cards = self.cards
            .into_iter()
            .map(BundledCard::split)
            .collect::<Result<Vec<_>, _>>()?;

        let mut added = 0;
        for (card, metacard) in cards {
            if deck.insert(metacard.id.clone(), card) {
                added += 1;
            }
            sched.put(metacard);
        }
        sched.merge_statistics(self.statistics);
        sched.sync(deck);

        Ok(added)
    }
}
