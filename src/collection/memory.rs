//! In-memory collection used by the standalone server and the tests.
//!
//! Holds note types, a deck tree, notes and their generated cards. Ids are
//! handed out in ascending order so search results come back in creation
//! order. A collection can be loaded from a JSON [`Fixture`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

use super::model::{
    Card, CardId, CardType, Deck, DeckId, Flag, HIERARCHY_SEPARATOR, NewNote, Note, NoteId, NoteType,
    Queue,
};
use super::search::{CardView, Query};
use super::{Collection, CollectionResult};
use crate::error::CollectionError;

const DEFAULT_DECK_ID: DeckId = 1;
const DEFAULT_DECK: &str = "Default";

#[derive(Debug, Clone)]
pub struct MemoryCollection {
    note_types: Vec<NoteType>,
    decks: BTreeMap<DeckId, Deck>,
    notes: BTreeMap<NoteId, Note>,
    cards: BTreeMap<CardId, Card>,
    next_deck_id: DeckId,
    next_note_id: NoteId,
    next_card_id: CardId,
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCollection {
    /// Empty collection with the `Default` deck and the `Basic` note type.
    pub fn new() -> Self {
        let mut decks = BTreeMap::new();
        decks.insert(DEFAULT_DECK_ID, Deck { id: DEFAULT_DECK_ID, name: DEFAULT_DECK.to_string() });
        Self {
            note_types: vec![NoteType::basic()],
            decks,
            notes: BTreeMap::new(),
            cards: BTreeMap::new(),
            next_deck_id: DEFAULT_DECK_ID + 1,
            next_note_id: 1,
            next_card_id: 1,
        }
    }

    /// 20 `Basic` notes: 10 in `Default`, 6 in `Japanese`, 4 in `Science`.
    ///
    /// Every 3rd note is tagged `important`, every 4th `review`; the first
    /// three `Default` cards carry flags 1, 2 and 3.
    pub fn demo() -> Self {
        let mut col = Self::new();
        let japanese = col.add_deck("Japanese");
        let science = col.add_deck("Science");

        for i in 0..20 {
            let mut tags = Vec::new();
            if i % 3 == 0 {
                tags.push("important".to_string());
            }
            if i % 4 == 0 {
                tags.push("review".to_string());
            }
            let deck = match i {
                0..10 => DEFAULT_DECK_ID,
                10..16 => japanese,
                _ => science,
            };
            let note = NewNote {
                note_type: "Basic".to_string(),
                fields: vec![
                    ("Front".to_string(), format!("Question {}", i + 1)),
                    ("Back".to_string(), format!("Answer {}", i + 1)),
                ],
                tags,
            };
            // Fixed inputs against a fresh collection cannot fail.
            let _ = col.add_note(note, deck);
        }

        let default_cards: Vec<CardId> = col
            .cards
            .values()
            .filter(|c| c.deck_id == DEFAULT_DECK_ID)
            .map(|c| c.id)
            .take(3)
            .collect();
        for (code, id) in (1u8..).zip(default_cards) {
            if let (Some(flag), Some(card)) = (Flag::new(code), col.cards.get_mut(&id)) {
                card.flag = flag;
            }
        }
        col
    }

    /// Registers a note type, replacing one with the same name.
    pub fn add_note_type(&mut self, note_type: NoteType) {
        match self.note_types.iter_mut().find(|nt| nt.name == note_type.name) {
            Some(existing) => *existing = note_type,
            None => self.note_types.push(note_type),
        }
    }

    /// Returns the id of deck `name`, creating it and any missing parents.
    pub fn add_deck(&mut self, name: &str) -> DeckId {
        let mut path = String::new();
        let mut id = DEFAULT_DECK_ID;
        for part in name.split(HIERARCHY_SEPARATOR) {
            if !path.is_empty() {
                path.push_str(HIERARCHY_SEPARATOR);
            }
            path.push_str(part);
            id = match self.decks.values().find(|d| d.name == path) {
                Some(deck) => deck.id,
                None => {
                    let id = self.next_deck_id;
                    self.next_deck_id += 1;
                    self.decks.insert(id, Deck { id, name: path.clone() });
                    id
                }
            };
        }
        id
    }

    /// Overrides scheduling state of an existing card.
    pub fn set_card_state(&mut self, id: CardId, card_type: CardType, queue: Queue, due: i64, interval: u32) -> CollectionResult<()> {
        let card = self.cards.get_mut(&id).ok_or(CollectionError::CardNotFound(id))?;
        card.card_type = card_type;
        card.queue = queue;
        card.due = due;
        card.interval = interval;
        Ok(())
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// Builds a collection from a parsed fixture.
    pub fn from_fixture(fixture: Fixture) -> Result<Self> {
        let mut col = Self::new();
        for note_type in fixture.note_types {
            col.add_note_type(note_type);
        }
        for deck in &fixture.decks {
            col.add_deck(deck);
        }
        for (idx, entry) in fixture.notes.into_iter().enumerate() {
            let deck = col.add_deck(entry.deck.as_deref().unwrap_or(DEFAULT_DECK));
            let note = NewNote {
                note_type: entry.model,
                fields: entry.fields.into_iter().collect(),
                tags: entry.tags,
            };
            let note_id = col
                .add_note(note, deck)
                .with_context(|| format!("Fixture note #{} is invalid", idx))?;
            let cards = col.note_cards(note_id)?;
            for (card, state) in cards.iter().zip(entry.cards) {
                let stored = col
                    .cards
                    .get_mut(&card.id)
                    .ok_or(CollectionError::CardNotFound(card.id))?;
                stored.flag = state.flag;
                stored.card_type = state.card_type;
                stored.queue = match state.queue {
                    Some(code) => Queue::from_code(code)
                        .with_context(|| format!("Fixture note #{} has invalid queue {}", idx, code))?,
                    None => state.card_type.active_queue(),
                };
                stored.due = state.due.unwrap_or(stored.due);
                stored.interval = state.interval;
            }
        }
        Ok(col)
    }

    /// Loads a JSON fixture file (see [`Fixture`]).
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse fixture: {}", path.display()))?;
        Self::from_fixture(fixture)
    }

    fn view_matches(&self, query: &Query, card: &Card) -> bool {
        let Some(note) = self.notes.get(&card.note_id) else {
            return false;
        };
        let Some(note_type) = self.note_types.iter().find(|nt| nt.name == note.note_type) else {
            return false;
        };
        let deck_name = self.decks.get(&card.deck_id).map_or("", |d| d.name.as_str());
        query.matches(&CardView { note, note_type, card, deck_name })
    }

    fn card_mut(&mut self, id: CardId) -> CollectionResult<&mut Card> {
        self.cards.get_mut(&id).ok_or(CollectionError::CardNotFound(id))
    }

    /// Validates all ids before touching any card.
    fn update_cards(&mut self, ids: &[CardId], mut apply: impl FnMut(&mut Card)) -> CollectionResult<()> {
        if let Some(missing) = ids.iter().find(|id| !self.cards.contains_key(id)) {
            return Err(CollectionError::CardNotFound(*missing));
        }
        for id in ids {
            apply(self.card_mut(*id)?);
        }
        Ok(())
    }
}

impl Collection for MemoryCollection {
    fn find_notes(&self, query: &str) -> CollectionResult<Vec<NoteId>> {
        let query = Query::parse(query)?;
        let matched: BTreeSet<NoteId> = self
            .cards
            .values()
            .filter(|card| self.view_matches(&query, card))
            .map(|card| card.note_id)
            .collect();
        Ok(matched.into_iter().collect())
    }

    fn find_cards(&self, query: &str) -> CollectionResult<Vec<CardId>> {
        let query = Query::parse(query)?;
        Ok(self
            .cards
            .values()
            .filter(|card| self.view_matches(&query, card))
            .map(|card| card.id)
            .collect())
    }

    fn note(&self, id: NoteId) -> CollectionResult<Note> {
        self.notes.get(&id).cloned().ok_or(CollectionError::NoteNotFound(id))
    }

    fn card(&self, id: CardId) -> CollectionResult<Card> {
        self.cards.get(&id).cloned().ok_or(CollectionError::CardNotFound(id))
    }

    fn note_cards(&self, id: NoteId) -> CollectionResult<Vec<Card>> {
        if !self.notes.contains_key(&id) {
            return Err(CollectionError::NoteNotFound(id));
        }
        let mut cards: Vec<Card> = self.cards.values().filter(|c| c.note_id == id).cloned().collect();
        cards.sort_by_key(|c| c.ord);
        Ok(cards)
    }

    fn note_type(&self, name: &str) -> CollectionResult<&NoteType> {
        self.note_types
            .iter()
            .find(|nt| nt.name == name)
            .ok_or_else(|| CollectionError::NoteTypeNotFound(name.to_string()))
    }

    fn note_types(&self) -> Vec<&NoteType> {
        self.note_types.iter().collect()
    }

    fn deck_id(&self, name: &str) -> CollectionResult<DeckId> {
        self.decks
            .values()
            .find(|d| d.name == name)
            .map(|d| d.id)
            .ok_or_else(|| CollectionError::DeckNotFound(name.to_string()))
    }

    fn deck_name(&self, id: DeckId) -> CollectionResult<&str> {
        self.decks
            .get(&id)
            .map(|d| d.name.as_str())
            .ok_or(CollectionError::DeckIdNotFound(id))
    }

    fn deck_names(&self) -> Vec<String> {
        self.decks.values().map(|d| d.name.clone()).collect()
    }

    fn tag_names(&self) -> Vec<String> {
        let tags: BTreeSet<&str> = self
            .notes
            .values()
            .flat_map(|n| n.tags.iter().map(String::as_str))
            .collect();
        tags.into_iter().map(str::to_string).collect()
    }

    fn update_note(&mut self, note: &Note) -> CollectionResult<()> {
        let expected = self.note_type(&note.note_type)?.fields.len();
        let stored = self.notes.get_mut(&note.id).ok_or(CollectionError::NoteNotFound(note.id))?;
        let mut fields = note.fields.clone();
        fields.resize(expected, String::new());
        stored.fields = fields;
        stored.tags = note.tags.clone();
        Ok(())
    }

    fn set_user_flag(&mut self, cards: &[CardId], flag: Flag) -> CollectionResult<()> {
        self.update_cards(cards, |card| card.flag = flag)
    }

    fn suspend(&mut self, cards: &[CardId]) -> CollectionResult<()> {
        self.update_cards(cards, |card| card.queue = Queue::Suspended)
    }

    fn unsuspend(&mut self, cards: &[CardId]) -> CollectionResult<()> {
        self.update_cards(cards, |card| {
            if card.queue == Queue::Suspended {
                card.queue = card.card_type.active_queue();
            }
        })
    }

    fn add_note(&mut self, note: NewNote, deck: DeckId) -> CollectionResult<NoteId> {
        if !self.decks.contains_key(&deck) {
            return Err(CollectionError::DeckIdNotFound(deck));
        }
        let note_type = self.note_type(&note.note_type)?.clone();

        let mut fields = vec![String::new(); note_type.fields.len()];
        for (name, value) in note.fields {
            if let Some(idx) = note_type.field_index(&name) {
                fields[idx] = value;
            }
        }
        if fields.first().is_none_or(|f| f.trim().is_empty()) {
            return Err(CollectionError::EmptyNote);
        }

        let note_id = self.next_note_id;
        self.next_note_id += 1;
        // New cards are due in creation order.
        let due = note_id;
        self.notes.insert(
            note_id,
            Note { id: note_id, note_type: note_type.name.clone(), fields, tags: note.tags },
        );

        for ord in 0..note_type.templates.len() {
            let id = self.next_card_id;
            self.next_card_id += 1;
            self.cards.insert(
                id,
                Card {
                    id,
                    note_id,
                    deck_id: deck,
                    ord,
                    card_type: CardType::New,
                    queue: Queue::New,
                    due,
                    interval: 0,
                    flag: Flag::NONE,
                },
            );
        }
        Ok(note_id)
    }
}

/// JSON fixture describing a collection.
///
/// ```json
/// {
///   "noteTypes": [{"name": "Vocab", "fields": ["Word", "Meaning"], "templates": ["Recognize", "Recall"]}],
///   "decks": ["Japanese::N5"],
///   "notes": [{"model": "Vocab", "deck": "Japanese::N5", "fields": {"Word": "猫"}, "tags": ["animal"],
///              "cards": [{"flag": 1, "type": "review", "interval": 12, "due": 40}]}]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Fixture {
    pub note_types: Vec<NoteType>,
    pub decks: Vec<String>,
    pub notes: Vec<FixtureNote>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureNote {
    pub model: String,
    #[serde(default)]
    pub deck: Option<String>,
    #[serde(default)]
    pub fields: IndexMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Per-template state overrides, in template order.
    #[serde(default)]
    pub cards: Vec<FixtureCard>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FixtureCard {
    pub flag: Flag,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub queue: Option<i32>,
    pub due: Option<i64>,
    pub interval: u32,
}
