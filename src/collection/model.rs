//! Domain records of a collection: notes, cards, note types and decks.

use serde::{Deserialize, Serialize};

pub type NoteId = i64;
pub type CardId = i64;
pub type DeckId = i64;

/// Deck hierarchy separator in deck and tag names.
pub const HIERARCHY_SEPARATOR: &str = "::";

/// User flag marker on a card: 0 = none, 1-7 = colored markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Flag(u8);

impl Flag {
    pub const NONE: Flag = Flag(0);
    pub const MAX: u8 = 7;

    pub fn new(code: u8) -> Option<Self> {
        (code <= Self::MAX).then_some(Self(code))
    }

    pub fn code(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Flag {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Flag::new(code).ok_or_else(|| format!("flag must be between 0 and {}, got {}", Flag::MAX, code))
    }
}

impl From<Flag> for u8 {
    fn from(flag: Flag) -> u8 {
        flag.0
    }
}

/// Scheduling kind of a card, independent of suspension or burying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    #[default]
    New,
    Learn,
    Review,
    Relearn,
}

impl CardType {
    /// Queue a card of this type sits in when it is neither suspended nor buried.
    pub fn active_queue(self) -> Queue {
        match self {
            CardType::New => Queue::New,
            CardType::Learn | CardType::Relearn => Queue::Learn,
            CardType::Review => Queue::Review,
        }
    }
}

/// Scheduling queue; the wire format is the integer [`code`](Queue::code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    BuriedManual,
    BuriedSibling,
    Suspended,
    New,
    Learn,
    Review,
    DayLearn,
}

impl Queue {
    pub fn code(self) -> i32 {
        match self {
            Queue::BuriedManual => -3,
            Queue::BuriedSibling => -2,
            Queue::Suspended => -1,
            Queue::New => 0,
            Queue::Learn => 1,
            Queue::Review => 2,
            Queue::DayLearn => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -3 => Queue::BuriedManual,
            -2 => Queue::BuriedSibling,
            -1 => Queue::Suspended,
            0 => Queue::New,
            1 => Queue::Learn,
            2 => Queue::Review,
            3 => Queue::DayLearn,
            _ => return None,
        })
    }

    pub fn is_buried(self) -> bool {
        matches!(self, Queue::BuriedManual | Queue::BuriedSibling)
    }
}

/// Named schema shared by all notes of the type. Field order is display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteType {
    pub name: String,
    pub fields: Vec<String>,
    /// One card is generated per template.
    #[serde(default = "NoteType::default_templates")]
    pub templates: Vec<String>,
}

impl NoteType {
    pub fn new(name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            templates: Self::default_templates(),
        }
    }

    pub fn with_templates(mut self, templates: &[&str]) -> Self {
        self.templates = templates.iter().map(|t| t.to_string()).collect();
        self
    }

    /// The stock two-field type every new collection starts with.
    pub fn basic() -> Self {
        Self::new("Basic", &["Front", "Back"])
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    fn default_templates() -> Vec<String> {
        vec!["Card 1".to_string()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
}

/// A record: field values in note-type order plus a tag set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub note_type: String,
    pub fields: Vec<String>,
    pub tags: Vec<String>,
}

/// A schedulable unit generated from a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub note_id: NoteId,
    pub deck_id: DeckId,
    /// Template index within the note type.
    pub ord: usize,
    pub card_type: CardType,
    pub queue: Queue,
    pub due: i64,
    pub interval: u32,
    pub flag: Flag,
}

impl Card {
    pub fn is_suspended(&self) -> bool {
        self.queue == Queue::Suspended
    }
}

/// Input for creating a note; field names not in the note type are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNote {
    pub note_type: String,
    pub fields: Vec<(String, String)>,
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_range() {
        for code in 0..=7 {
            assert_eq!(Flag::new(code).map(Flag::code), Some(code));
        }
        assert!(Flag::new(8).is_none());
        assert!(serde_json::from_str::<Flag>("9").is_err());
        assert_eq!(serde_json::from_str::<Flag>("3").unwrap(), Flag::new(3).unwrap());
    }

    #[test]
    fn test_queue_codes_round_trip() {
        for code in -3..=3 {
            assert_eq!(Queue::from_code(code).map(Queue::code), Some(code));
        }
        assert!(Queue::from_code(4).is_none());
        assert_eq!(Queue::Suspended.code(), -1);
    }

    #[test]
    fn test_active_queue_never_suspended() {
        for t in [CardType::New, CardType::Learn, CardType::Review, CardType::Relearn] {
            assert_ne!(t.active_queue(), Queue::Suspended);
        }
    }

    #[test]
    fn test_field_index() {
        let nt = NoteType::basic();
        assert_eq!(nt.field_index("Back"), Some(1));
        assert_eq!(nt.field_index("back"), None);
        assert_eq!(nt.templates.len(), 1);
    }
}
