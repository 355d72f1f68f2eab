//! JSON action protocol: the closed action table and its handlers.
//!
//! # Purpose
//!
//! Maps an action name plus a `params` object onto a handler call against a
//! [`Collection`]. Parsing and validation happen before any collection
//! access, so a request with bad parameters never reaches the owner context.
//!
//! # Key types
//!
//! - [`Action`] - every action name the server understands
//! - [`Command`] - an action with its parameters decoded and validated
//!
//! # Actions
//!
//! | Action             | Params                                   | Result                         |
//! |--------------------|------------------------------------------|--------------------------------|
//! | `getSchema`        | -                                        | `{models, decks, tags}`        |
//! | `getModels`        | -                                        | `{name: [fields]}`             |
//! | `browseNotes`      | `query`, `limit?`, `offset?`             | `{items, total, timing}`       |
//! | `browseCards`      | `query`, `limit?`, `offset?`             | `{items, total, timing}`       |
//! | `setCardFlag`      | `cardId`, `flag` (0-7)                   | `true`                         |
//! | `updateNoteFields` | `noteId`, `fields`                       | `true`                         |
//! | `updateNoteTags`   | `noteId`, `tags`                         | `true`                         |
//! | `setSuspended`     | `cardId`, `suspended`                    | queue code after the change    |
//! | `addNote`          | `deckName`, `modelName`, `fields`, `tags?` | new note id                  |
//! | `bulkAddNotes`     | `deckName`, `modelName`, `notes`         | `{count, noteIds}`             |

pub mod browse;
pub mod edit;
mod params;
pub mod schema;

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::collection::{CardId, Collection, Flag, NoteId};
use crate::error::ActionError;

pub use browse::{BrowseParams, CardItem, NoteItem, Page, Timing};
pub use edit::{BulkAddResult, NoteInput};
pub use schema::Schema;

use params::Params;

/// Names of the supported actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    GetSchema,
    GetModels,
    BrowseNotes,
    BrowseCards,
    SetCardFlag,
    UpdateNoteFields,
    UpdateNoteTags,
    SetSuspended,
    AddNote,
    BulkAddNotes,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::GetSchema,
        Action::GetModels,
        Action::BrowseNotes,
        Action::BrowseCards,
        Action::SetCardFlag,
        Action::UpdateNoteFields,
        Action::UpdateNoteTags,
        Action::SetSuspended,
        Action::AddNote,
        Action::BulkAddNotes,
    ];

    /// Wire name of the action.
    pub fn name(self) -> &'static str {
        match self {
            Action::GetSchema => "getSchema",
            Action::GetModels => "getModels",
            Action::BrowseNotes => "browseNotes",
            Action::BrowseCards => "browseCards",
            Action::SetCardFlag => "setCardFlag",
            Action::UpdateNoteFields => "updateNoteFields",
            Action::UpdateNoteTags => "updateNoteTags",
            Action::SetSuspended => "setSuspended",
            Action::AddNote => "addNote",
            Action::BulkAddNotes => "bulkAddNotes",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = ActionError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))
    }
}

/// A decoded request, ready to run against a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetSchema,
    GetModels,
    BrowseNotes(BrowseParams),
    BrowseCards(BrowseParams),
    SetCardFlag { card_id: CardId, flag: Flag },
    UpdateNoteFields { note_id: NoteId, fields: IndexMap<String, String> },
    UpdateNoteTags { note_id: NoteId, tags: Vec<String> },
    SetSuspended { card_id: CardId, suspended: bool },
    AddNote { deck_name: String, model_name: String, note: NoteInput },
    BulkAddNotes { deck_name: String, model_name: String, notes: Vec<NoteInput> },
}

impl Command {
    /// Decodes the parameters of `action`. Keys the action does not use are
    /// ignored.
    pub fn parse(action: Action, params: &Map<String, Value>) -> Result<Self, ActionError> {
        let p = Params::new(params);
        let command = match action {
            Action::GetSchema => Command::GetSchema,
            Action::GetModels => Command::GetModels,
            Action::BrowseNotes => Command::BrowseNotes(browse_params(&p)?),
            Action::BrowseCards => Command::BrowseCards(browse_params(&p)?),
            Action::SetCardFlag => {
                let code: u8 = p.required("flag")?;
                let flag = Flag::new(code).ok_or_else(|| {
                    ActionError::invalid("flag", format!("{} is not between 0 and {}", code, Flag::MAX))
                })?;
                Command::SetCardFlag { card_id: p.required("cardId")?, flag }
            }
            Action::UpdateNoteFields => Command::UpdateNoteFields {
                note_id: p.required("noteId")?,
                fields: p.required("fields")?,
            },
            Action::UpdateNoteTags => Command::UpdateNoteTags {
                note_id: p.required("noteId")?,
                tags: p.required("tags")?,
            },
            Action::SetSuspended => Command::SetSuspended {
                card_id: p.required("cardId")?,
                suspended: p.required("suspended")?,
            },
            Action::AddNote => Command::AddNote {
                deck_name: p.required("deckName")?,
                model_name: p.required("modelName")?,
                note: NoteInput {
                    fields: p.required("fields")?,
                    tags: p.optional("tags")?.unwrap_or_default(),
                },
            },
            Action::BulkAddNotes => Command::BulkAddNotes {
                deck_name: p.required("deckName")?,
                model_name: p.required("modelName")?,
                notes: p.required("notes")?,
            },
        };
        Ok(command)
    }

    pub fn action(&self) -> Action {
        match self {
            Command::GetSchema => Action::GetSchema,
            Command::GetModels => Action::GetModels,
            Command::BrowseNotes(_) => Action::BrowseNotes,
            Command::BrowseCards(_) => Action::BrowseCards,
            Command::SetCardFlag { .. } => Action::SetCardFlag,
            Command::UpdateNoteFields { .. } => Action::UpdateNoteFields,
            Command::UpdateNoteTags { .. } => Action::UpdateNoteTags,
            Command::SetSuspended { .. } => Action::SetSuspended,
            Command::AddNote { .. } => Action::AddNote,
            Command::BulkAddNotes { .. } => Action::BulkAddNotes,
        }
    }

    /// Runs the command and serializes its result.
    pub fn execute<C: Collection + ?Sized>(self, col: &mut C) -> Result<Value, ActionError> {
        match self {
            Command::GetSchema => to_value(schema::schema(col)),
            Command::GetModels => to_value(schema::models(col)),
            Command::BrowseNotes(params) => to_value(browse::browse_notes(col, &params)?),
            Command::BrowseCards(params) => to_value(browse::browse_cards(col, &params)?),
            Command::SetCardFlag { card_id, flag } => to_value(edit::set_card_flag(col, card_id, flag)?),
            Command::UpdateNoteFields { note_id, fields } => {
                to_value(edit::update_note_fields(col, note_id, &fields)?)
            }
            Command::UpdateNoteTags { note_id, tags } => to_value(edit::update_note_tags(col, note_id, &tags)?),
            Command::SetSuspended { card_id, suspended } => {
                to_value(edit::set_suspended(col, card_id, suspended)?)
            }
            Command::AddNote { deck_name, model_name, note } => {
                to_value(edit::add_note(col, &deck_name, &model_name, note)?)
            }
            Command::BulkAddNotes { deck_name, model_name, notes } => {
                to_value(edit::bulk_add_notes(col, &deck_name, &model_name, notes)?)
            }
        }
    }
}

/// Parses and runs one action in a single step.
pub fn handle_action<C: Collection + ?Sized>(
    col: &mut C,
    name: &str,
    params: &Map<String, Value>,
) -> Result<Value, ActionError> {
    let action: Action = name.parse()?;
    Command::parse(action, params)?.execute(col)
}

fn browse_params(p: &Params<'_>) -> Result<BrowseParams, ActionError> {
    Ok(BrowseParams {
        query: p.required("query")?,
        limit: p.optional("limit")?,
        offset: p.optional("offset")?.unwrap_or(0),
    })
}

fn to_value<T: Serialize>(value: T) -> Result<Value, ActionError> {
    serde_json::to_value(value).map_err(|e| ActionError::InvalidRequest(format!("Unserializable result: {}", e)))
}
