//! Error types for actions, the collection surface and the owner bridge.
//!
//! The `Display` text of [`ActionError`] is what clients see in the `error`
//! slot of the protocol response, so messages are short and name the
//! offending value.

use thiserror::Error;

use crate::collection::{CardId, DeckId, NoteId};

/// Failures raised by a [`Collection`](crate::collection::Collection).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("Note not found: {0}")]
    NoteNotFound(NoteId),

    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    #[error("Note type not found: {0}")]
    NoteTypeNotFound(String),

    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    #[error("Deck id not found: {0}")]
    DeckIdNotFound(DeckId),

    #[error("Cannot create note because it is empty")]
    EmptyNote,

    #[error("Invalid search: {0}")]
    Search(String),
}

/// Failures crossing the owner-context bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The owner queue is closed; nothing will ever run the work.
    #[error("Owner context is not running")]
    Closed,

    /// The work was accepted but dropped before it completed.
    #[error("Owner context dropped the request before it completed")]
    Dropped,

    /// The work panicked on the owner context.
    #[error("Panic on owner context: {0}")]
    Panicked(String),
}

/// Protocol and handler errors reported in the `error` field of a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Missing parameter: {0}")]
    MissingParam(&'static str),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error("Collection is not open")]
    CollectionClosed,

    #[error("Cannot create note because it is empty: note #{0}")]
    EmptyNoteAt(usize),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ActionError {
    pub(crate) fn invalid(name: &'static str, reason: impl ToString) -> Self {
        Self::InvalidParam { name, reason: reason.to_string() }
    }
}
