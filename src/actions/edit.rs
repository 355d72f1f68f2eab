//! Mutating actions: flags, suspension, fields, tags and note creation.
//!
//! Field maps are matched against the note type by name. Names the type
//! does not define are ignored rather than rejected, and stored field
//! order always follows the note type regardless of map order.

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::collection::{CardId, Collection, Flag, NewNote, NoteId};
use crate::error::ActionError;

/// One note of a `bulkAddNotes` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NoteInput {
    #[serde(default)]
    pub fields: IndexMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAddResult {
    pub count: usize,
    pub note_ids: Vec<NoteId>,
}

pub fn set_card_flag<C: Collection + ?Sized>(col: &mut C, card_id: CardId, flag: Flag) -> Result<bool, ActionError> {
    col.set_user_flag(&[card_id], flag)?;
    Ok(true)
}

/// Suspends or restores a card; returns the queue code after the change.
pub fn set_suspended<C: Collection + ?Sized>(col: &mut C, card_id: CardId, suspended: bool) -> Result<i32, ActionError> {
    if suspended {
        col.suspend(&[card_id])?;
    } else {
        col.unsuspend(&[card_id])?;
    }
    Ok(col.card(card_id)?.queue.code())
}

pub fn update_note_fields<C: Collection + ?Sized>(
    col: &mut C,
    note_id: NoteId,
    fields: &IndexMap<String, String>,
) -> Result<bool, ActionError> {
    let mut note = col.note(note_id)?;
    let note_type = col.note_type(&note.note_type)?;

    for (name, value) in fields {
        match note_type.field_index(name) {
            Some(idx) => {
                if let Some(slot) = note.fields.get_mut(idx) {
                    *slot = value.clone();
                }
            }
            None => debug!("Note {}: ignoring unknown field {:?}", note_id, name),
        }
    }

    col.update_note(&note)?;
    Ok(true)
}

/// Replaces the full tag set of a note.
pub fn update_note_tags<C: Collection + ?Sized>(col: &mut C, note_id: NoteId, tags: &[String]) -> Result<bool, ActionError> {
    let mut note = col.note(note_id)?;
    note.tags = normalize_tags(tags);
    col.update_note(&note)?;
    Ok(true)
}

pub fn add_note<C: Collection + ?Sized>(
    col: &mut C,
    deck_name: &str,
    model_name: &str,
    note: NoteInput,
) -> Result<NoteId, ActionError> {
    let deck = col.deck_id(deck_name)?;
    col.note_type(model_name)?;
    Ok(col.add_note(new_note(model_name, note), deck)?)
}

/// Adds every note or none: deck, note type and non-empty first fields are
/// checked before the first insert.
pub fn bulk_add_notes<C: Collection + ?Sized>(
    col: &mut C,
    deck_name: &str,
    model_name: &str,
    notes: Vec<NoteInput>,
) -> Result<BulkAddResult, ActionError> {
    let deck = col.deck_id(deck_name)?;
    let note_type = col.note_type(model_name)?;

    let first_field = note_type.fields.first().cloned().unwrap_or_default();
    if let Some(idx) = notes
        .iter()
        .position(|n| n.fields.get(&first_field).is_none_or(|v| v.trim().is_empty()))
    {
        return Err(ActionError::EmptyNoteAt(idx));
    }

    let mut note_ids = Vec::with_capacity(notes.len());
    for note in notes {
        note_ids.push(col.add_note(new_note(model_name, note), deck)?);
    }
    Ok(BulkAddResult { count: note_ids.len(), note_ids })
}

/// Splits entries on whitespace (tags cannot contain spaces), drops empty
/// ones and removes case-insensitive duplicates, keeping the first spelling.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter().flat_map(|t| t.split_whitespace()) {
        if !out.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            out.push(tag.to_string());
        }
    }
    out
}

fn new_note(model_name: &str, note: NoteInput) -> NewNote {
    NewNote {
        note_type: model_name.to_string(),
        fields: note.fields.into_iter().collect(),
        tags: normalize_tags(&note.tags),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CardType, MemoryCollection, Queue};

    fn fields(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_every_flag_is_stored() {
        let mut col = MemoryCollection::demo();
        let id = col.find_cards("deck:Science").unwrap()[0];
        for code in 0..=7 {
            assert_eq!(set_card_flag(&mut col, id, Flag::new(code).unwrap()), Ok(true));
            assert_eq!(col.card(id).unwrap().flag.code(), code);
        }
    }

    #[test]
    fn test_suspend_reports_post_change_queue() {
        let mut col = MemoryCollection::demo();
        let id = col.find_cards("deck:Japanese").unwrap()[0];
        col.set_card_state(id, CardType::Review, Queue::Review, 10, 4).unwrap();

        assert_eq!(set_suspended(&mut col, id, true), Ok(-1));
        assert_eq!(set_suspended(&mut col, id, true), Ok(-1));
        assert_eq!(set_suspended(&mut col, id, false), Ok(Queue::Review.code()));
        assert_eq!(set_suspended(&mut col, id, false), Ok(Queue::Review.code()));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let mut col = MemoryCollection::demo();
        let id = col.find_notes("").unwrap()[0];
        let before = col.note(id).unwrap();

        assert_eq!(update_note_fields(&mut col, id, &fields(&[("Nope", "x")])), Ok(true));
        assert_eq!(col.note(id).unwrap(), before);
    }

    #[test]
    fn test_field_order_follows_note_type() {
        let mut col = MemoryCollection::demo();
        let id = col.find_notes("").unwrap()[0];

        let update = fields(&[("Back", "new back"), ("Extra", "x"), ("Front", "new front")]);
        assert_eq!(update_note_fields(&mut col, id, &update), Ok(true));
        assert_eq!(col.note(id).unwrap().fields, vec!["new front".to_string(), "new back".to_string()]);
    }

    #[test]
    fn test_missing_note_is_an_error() {
        let mut col = MemoryCollection::demo();
        let err = update_note_fields(&mut col, 424242, &fields(&[("Front", "x")])).unwrap_err();
        assert_eq!(err.to_string(), "Note not found: 424242");
    }

    #[test]
    fn test_tags_are_replaced_not_merged() {
        let mut col = MemoryCollection::demo();
        let id = col.find_notes("tag:important tag:review").unwrap()[0];

        let tags = vec!["  fresh ".to_string(), "".to_string(), "Fresh".to_string(), "other".to_string()];
        assert_eq!(update_note_tags(&mut col, id, &tags), Ok(true));
        assert_eq!(col.note(id).unwrap().tags, vec!["fresh".to_string(), "other".to_string()]);

        assert_eq!(update_note_tags(&mut col, id, &[]), Ok(true));
        assert!(col.note(id).unwrap().tags.is_empty());
    }

    #[test]
    fn test_add_note_validates_deck_and_model() {
        let mut col = MemoryCollection::demo();
        let input = NoteInput { fields: fields(&[("Front", "new")]), tags: vec!["t".into()] };

        assert!(add_note(&mut col, "Nope", "Basic", input.clone()).is_err());
        assert!(add_note(&mut col, "Science", "Nope", input.clone()).is_err());

        let id = add_note(&mut col, "Science", "Basic", input).unwrap();
        assert_eq!(col.find_notes("deck:Science").unwrap().len(), 5);
        assert_eq!(col.note(id).unwrap().tags, vec!["t".to_string()]);
    }

    #[test]
    fn test_bulk_add_is_all_or_nothing() {
        let mut col = MemoryCollection::demo();
        let good = NoteInput { fields: fields(&[("Front", "a")]), tags: vec![] };
        let empty = NoteInput { fields: fields(&[("Back", "only back")]), tags: vec![] };

        let err = bulk_add_notes(&mut col, "Default", "Basic", vec![good.clone(), empty]).unwrap_err();
        assert_eq!(err, ActionError::EmptyNoteAt(1));
        assert_eq!(err.to_string(), "Cannot create note because it is empty: note #1");
        assert_eq!(col.note_count(), 20);

        let result = bulk_add_notes(&mut col, "Default", "Basic", vec![good.clone(), good]).unwrap();
        assert_eq!(result.count, 2);
        assert_eq!(result.note_ids.len(), 2);
        assert_eq!(col.note_count(), 22);
    }
}
