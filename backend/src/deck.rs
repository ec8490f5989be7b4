//! Collections of flashcards.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;
use std::{num, mem, fmt, error};

use crate::cards;
use crate::settings;

/// A collection of flashcards, without any data about mastery.
#[derive(Debug, Default)]
pub struct Deck {
    /// The global settings.
    pub settings: settings::Settings,
    /// The content of the cards.
    cards: HashMap<cards::CardId, cards::Card>,
    /// The IDs of the cards, in the order they appear in the deck.
    order: Vec<cards::CardId>,
}

impl Deck {
    /// Parse deck from `.recite` format.
    ///
    /// This will give an error if the deck was empty.
    pub fn parse(src: &str) -> Result<Deck, ParsingErrorLine> {
        // Parse.
        let mut parser = Parser::default();
        parser.parse(src)?;
        // Ensure that the deck is nonempty.
        if parser.deck.cards.is_empty() {
            Err(ParsingErrorLine {
                err: ParsingError::Other("empty deck"),
                line_num: 0,
            })
        } else { Ok(parser.deck) }
    }

    /// Serialize to `.recite` format.
    ///
    /// This is the inverse to `parse`, except that leading whitespace of text lines is lost.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        // Writing to a `String` cannot fail.
        let _ = writeln!(out, "[settings]");
        let _ = writeln!(out, "recent window: {}", self.settings.recent_window);
        let _ = writeln!(out, "requeue delay: {}", self.settings.requeue_delay);

        for (id, card) in self.iter() {
            let _ = writeln!(out, "\n[card {}]", id);
            if !card.categories.is_empty() {
                let _ = writeln!(out, "categories: {}", card.categories.join(", "));
            }
            for line in card.text.lines() {
                let _ = writeln!(out, "text: {}", line);
            }
        }

        out
    }

    /// Get a card by ID.
    pub fn get(&self, id: &str) -> Option<&cards::Card> {
        self.cards.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cards.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insert a card, replacing the content of any card with the same ID while keeping its
    /// position.
    ///
    /// Returns `true` if the card was new.
    pub fn insert(&mut self, id: cards::CardId, card: cards::Card) -> bool {
        if self.cards.insert(id.clone(), card).is_some() {
            false
        } else {
            self.order.push(id);
            true
        }
    }

    /// Iterate over the cards in deck order.
    pub fn iter(&self) -> impl Iterator<Item = (&cards::CardId, &cards::Card)> {
        self.order.iter().filter_map(move |id| self.cards.get(id).map(|card| (id, card)))
    }

    /// The IDs of the cards matching `filter`, in deck order.
    ///
    /// Without a filter every card matches. With a filter, a card matches when it is in at least
    /// one of the given categories.
    pub fn ids(&self, filter: Option<&[String]>) -> Vec<cards::CardId> {
        self.iter()
            .filter(|(_, card)| filter.map_or(true, |categories| card.in_any(categories)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// All the categories used in the deck, sorted.
    pub fn categories(&self) -> Vec<String> {
        self.cards
            .values()
            .flat_map(|card| card.categories.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Parse a key-value pair in the format `<key>: <value>`.
///
/// The colon may be surronded by whitespaces, which will be trimmed. However, the start and end of
/// `s` is not trimmed. The value may be empty.
fn key_value(s: &str) -> Result<(&str, &str), ParsingError> {
    let colon = s.find(':').ok_or(ParsingError::Other("not a proper key-value pair (no colon present)"))?;
    Ok((s[..colon].trim_end(), s[colon + 1..].trim_start()))
}

/// The deck parser's state.
enum ParserState {
    /// Currently parsing the global settings.
    ///
    /// The global settings are simply a list of key-value pairs.
    Settings,
    /// Currently parsing a card.
    ///
    /// It enters this state after a section whose title is a card ID.
    Card(cards::CardId),
    /// The parser has just been flushed and waits for a new state.
    Flushed,
}

impl Default for ParserState {
    fn default() -> ParserState {
        ParserState::Flushed
    }
}

/// An error during parsing.
#[derive(Debug)]
pub enum ParsingError {
    /// Error during integer parsing.
    ParseInt(num::ParseIntError),
    /// Other error.
    Other(&'static str),
}

impl From<num::ParseIntError> for ParsingError {
    fn from(error: num::ParseIntError) -> Self {
        ParsingError::ParseInt(error)
    }
}

/// A parsing error with an associated line number.
#[derive(Debug)]
pub struct ParsingErrorLine {
    /// The line number, starting at 1. Errors concerning the whole deck have line number 0.
    line_num: usize,
    /// The error.
    err: ParsingError,
}

impl ParsingErrorLine {
    pub fn line_num(&self) -> usize {
        self.line_num
    }
}

impl error::Error for ParsingErrorLine {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.err {
            ParsingError::ParseInt(ref err) => Some(err),
            ParsingError::Other(..) => None,
        }
    }
}

impl fmt::Display for ParsingErrorLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.err {
            ParsingError::ParseInt(ref err) => write!(f, "failed to parse integer ({}); at line {}", err, self.line_num),
            ParsingError::Other(ref err) => write!(f, "{}; at line {}", err, self.line_num),
        }
    }
}

/// A `.recite`-file parser.
#[derive(Default)]
struct Parser {
    /// The deck.
    deck: Deck,
    /// The current state of the parser.
    state: ParserState,
    /// The text lines of the current card.
    ///
    /// This is built incrementally as more lines are parsed. To manifest it to `deck`, use
    /// `flush()`. Note that it is only relevant when `state` is `ParserState::Card`.
    current_text: Vec<String>,
    /// The categories of the current card.
    current_categories: Vec<String>,
}

impl Parser {
    /// Parse `src` and update state accordingly.
    fn parse(&mut self, src: &str) -> Result<(), ParsingErrorLine> {
        // The current line number.
        let mut line_num = 0;
        // Parse line-by-line.
        for line in src.lines() {
            line_num += 1;
            self.parse_line(line).map_err(|err| ParsingErrorLine { err, line_num })?;
        }

        // Flush the last state.
        self.flush().map_err(|err| ParsingErrorLine { err, line_num })
    }

    /// Flush changes.
    ///
    /// This ought to be called after sections have been completed and in the end of the file.
    fn flush(&mut self) -> Result<(), ParsingError> {
        // Replace the old state with the `Flushed` state.
        match mem::replace(&mut self.state, ParserState::Flushed) {
            // The settings are written directly to the deck; nothing to flush.
            ParserState::Settings => (),
            // Insert the card.
            ParserState::Card(id) => {
                if self.current_text.is_empty() {
                    return Err(ParsingError::Other("card without text (previous section)"));
                }
                let text = mem::replace(&mut self.current_text, Vec::new()).join("\n");
                let categories = mem::replace(&mut self.current_categories, Vec::new());
                let card = cards::Card::new(text, categories).map_err(ParsingError::Other)?;

                if !self.deck.insert(id, card) {
                    // Throw an error if the card already exists in the deck.
                    return Err(ParsingError::Other("the same card ID appears multiple times"));
                }
            },
            // Already flushed; do nothing.
            ParserState::Flushed => (),
        }

        Ok(())
    }

    /// Parse a single line and update state accordingly.
    fn parse_line(&mut self, mut line: &str) -> Result<(), ParsingError> {
        // Canonicalize lines.
        line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        // Skip comments.
        if line.starts_with('#') {
            return Ok(());
        // Handle new section.
        } else if line.starts_with('[') && line.ends_with(']') {
            // Close off existing section.
            self.flush()?;

            // Update the state.
            self.state = match line[1..line.len() - 1].trim() {
                "settings" => ParserState::Settings,
                title if title.starts_with("card ") => {
                    // Take the part representing the card ID, following `card ` in the section
                    // name.
                    let id = title["card ".len()..].trim_start();
                    if id.is_empty() {
                        return Err(ParsingError::Other("empty card ID"));
                    }
                    ParserState::Card(id.to_string())
                },
                _ => return Err(ParsingError::Other("unknown section")),
            };

            return Ok(());
        }

        // Read key-value pair.
        let (key, value) = key_value(line)?;

        match self.state {
            ParserState::Settings => match key {
                "recent window" => self.deck.settings.recent_window = value.parse()?,
                "requeue delay" => self.deck.settings.requeue_delay = value.parse()?,
                _ => return Err(ParsingError::Other("unknown key")),
            },
            ParserState::Card(..) => match key {
                "categories" => self.current_categories.extend(cards::parse_categories(value)),
                "text" => self.current_text.push(value.to_string()),
                _ => return Err(ParsingError::Other("unknown key")),
            },
            ParserState::Flushed => return Err(ParsingError::Other("key-value pair outside of a section")),
        }

        Ok(())
    }
}
