//! Host resource surface: the collection of notes and cards.
//!
//! The server never owns a collection. It reaches one through a
//! [`CollectionHost`] on the owner context, once per request, so the host
//! may swap or close the collection between requests (profile switches).
//!
//! - [`Collection`] - narrow capability surface the action handlers use
//! - [`CollectionHost`] - per-request accessor
//! - [`HostSlot`] - host whose collection can be opened and closed
//! - [`MemoryCollection`] - in-memory implementation (binary, tests)

mod memory;
mod model;
pub mod search;

pub use memory::{Fixture, MemoryCollection};
pub use model::{
    Card, CardId, CardType, Deck, DeckId, Flag, HIERARCHY_SEPARATOR, NewNote, Note, NoteId, NoteType,
    Queue,
};

use crate::error::CollectionError;

pub type CollectionResult<T> = Result<T, CollectionError>;

/// Operations the action handlers may perform on a collection.
///
/// Implementations are not required to be thread-safe; they are only ever
/// called from the owner context.
pub trait Collection {
    /// Note ids matching `query`, in ascending id order.
    fn find_notes(&self, query: &str) -> CollectionResult<Vec<NoteId>>;

    /// Card ids matching `query`, in ascending id order.
    fn find_cards(&self, query: &str) -> CollectionResult<Vec<CardId>>;

    fn note(&self, id: NoteId) -> CollectionResult<Note>;

    fn card(&self, id: CardId) -> CollectionResult<Card>;

    /// Cards of a note ordered by template.
    fn note_cards(&self, id: NoteId) -> CollectionResult<Vec<Card>>;

    fn note_type(&self, name: &str) -> CollectionResult<&NoteType>;

    fn note_types(&self) -> Vec<&NoteType>;

    fn deck_id(&self, name: &str) -> CollectionResult<DeckId>;

    fn deck_name(&self, id: DeckId) -> CollectionResult<&str>;

    fn deck_names(&self) -> Vec<String>;

    fn tag_names(&self) -> Vec<String>;

    /// Writes fields and tags of an existing note.
    fn update_note(&mut self, note: &Note) -> CollectionResult<()>;

    fn set_user_flag(&mut self, cards: &[CardId], flag: Flag) -> CollectionResult<()>;

    fn suspend(&mut self, cards: &[CardId]) -> CollectionResult<()>;

    fn unsuspend(&mut self, cards: &[CardId]) -> CollectionResult<()>;

    /// Adds a note with one card per template into `deck`.
    fn add_note(&mut self, note: NewNote, deck: DeckId) -> CollectionResult<NoteId>;
}

/// Accessor invoked on the owner context for every unit of work.
pub trait CollectionHost {
    type Collection: Collection;

    /// The current collection, or `None` when none is open.
    fn collection(&mut self) -> Option<&mut Self::Collection>;
}

impl CollectionHost for MemoryCollection {
    type Collection = MemoryCollection;

    fn collection(&mut self) -> Option<&mut MemoryCollection> {
        Some(self)
    }
}

/// Host state whose collection is opened and closed over time.
#[derive(Debug)]
pub struct HostSlot<C> {
    current: Option<C>,
}

impl<C> Default for HostSlot<C> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<C> HostSlot<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(collection: C) -> Self {
        Self { current: Some(collection) }
    }

    /// Opens `collection`, returning the one it replaces.
    pub fn open(&mut self, collection: C) -> Option<C> {
        self.current.replace(collection)
    }

    pub fn close(&mut self) -> Option<C> {
        self.current.take()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }
}

impl<C: Collection> CollectionHost for HostSlot<C> {
    type Collection = C;

    fn collection(&mut self) -> Option<&mut C> {
        self.current.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_slot_swaps_collections() {
        let mut slot = HostSlot::new();
        assert!(slot.collection().is_none());

        slot.open(MemoryCollection::new());
        assert!(slot.is_open());
        assert_eq!(slot.collection().map(|c| c.deck_names()), Some(vec!["Default".to_string()]));

        let previous = slot.open(MemoryCollection::demo());
        assert!(previous.is_some());
        assert!(slot.collection().unwrap().deck_names().contains(&"Japanese".to_string()));

        assert!(slot.close().is_some());
        assert!(slot.collection().is_none());
    }
}
