//! `browseNotes` / `browseCards`: resolve, slice, then materialize.
//!
//! Id resolution is cheap and always covers the full result set so `total`
//! is exact. Materializing an item (fields, deck, tags) is the expensive
//! part, so only the requested page is fetched. Both phases are timed and
//! reported back for client-side diagnosis.

use std::ops::Range;
use std::sync::LazyLock;
use std::time::Instant;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;

use crate::collection::{CardId, Collection, Note, NoteId};
use crate::error::ActionError;

/// Paging request shared by both browse actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseParams {
    pub query: String,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub timing: Timing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Timing {
    pub find_ms: f64,
    pub fetch_ms: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteItem {
    pub id: NoteId,
    pub model_name: String,
    pub fields: IndexMap<String, String>,
    pub tags: Vec<String>,
    pub deck_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardItem {
    pub id: CardId,
    pub note_id: NoteId,
    pub deck_name: String,
    pub model_name: String,
    pub fields: IndexMap<String, String>,
    pub tags: Vec<String>,
    pub flag: u8,
    pub queue: i32,
    pub due: i64,
    pub interval: u32,
}

/// Index range of the page within `total` ids.
///
/// Without a limit the whole list is returned; an offset past the end
/// yields an empty range.
pub fn page_bounds(total: usize, limit: Option<usize>, offset: usize) -> Range<usize> {
    match limit {
        None => 0..total,
        Some(limit) => {
            let start = offset.min(total);
            let end = start.saturating_add(limit).min(total);
            start..end
        }
    }
}

/// Runs one browse: `find` resolves all ids, `fetch` materializes a page item.
pub fn browse<I, T>(
    params: &BrowseParams,
    find: impl FnOnce(&str) -> Result<Vec<I>, ActionError>,
    mut fetch: impl FnMut(&I) -> Result<T, ActionError>,
) -> Result<Page<T>, ActionError> {
    let query = normalize_query(&params.query);

    let started = Instant::now();
    let ids = find(query.as_str())?;
    let find_ms = elapsed_ms(started);

    let started = Instant::now();
    let items = ids[page_bounds(ids.len(), params.limit, params.offset)]
        .iter()
        .map(&mut fetch)
        .collect::<Result<Vec<T>, ActionError>>()?;
    let fetch_ms = elapsed_ms(started);

    Ok(Page {
        total: ids.len(),
        timing: Timing { find_ms, fetch_ms, count: items.len() },
        items,
    })
}

pub fn browse_notes<C: Collection + ?Sized>(col: &C, params: &BrowseParams) -> Result<Page<NoteItem>, ActionError> {
    browse(params, |q| Ok(col.find_notes(q)?), |id| note_item(col, *id))
}

pub fn browse_cards<C: Collection + ?Sized>(col: &C, params: &BrowseParams) -> Result<Page<CardItem>, ActionError> {
    browse(params, |q| Ok(col.find_cards(q)?), |id| card_item(col, *id))
}

pub fn note_item<C: Collection + ?Sized>(col: &C, id: NoteId) -> Result<NoteItem, ActionError> {
    let note = col.note(id)?;
    let deck_name = match col.note_cards(id)?.first() {
        Some(card) => col.deck_name(card.deck_id)?.to_string(),
        None => String::new(),
    };
    Ok(NoteItem {
        id,
        model_name: note.note_type.clone(),
        fields: named_fields(col, &note)?,
        tags: note.tags,
        deck_name,
    })
}

pub fn card_item<C: Collection + ?Sized>(col: &C, id: CardId) -> Result<CardItem, ActionError> {
    let card = col.card(id)?;
    let note = col.note(card.note_id)?;
    Ok(CardItem {
        id,
        note_id: card.note_id,
        deck_name: col.deck_name(card.deck_id)?.to_string(),
        model_name: note.note_type.clone(),
        fields: named_fields(col, &note)?,
        tags: note.tags,
        flag: card.flag.code(),
        queue: card.queue.code(),
        due: card.due,
        interval: card.interval,
    })
}

/// Field values keyed by name, in note-type order.
fn named_fields<C: Collection + ?Sized>(col: &C, note: &Note) -> Result<IndexMap<String, String>, ActionError> {
    let note_type = col.note_type(&note.note_type)?;
    Ok(note_type
        .fields
        .iter()
        .zip(note.fields.iter())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect())
}

static IS_SUSPEND: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\bis:suspend\b").ok());

/// Accepts the common `is:suspend` shorthand for `is:suspended`.
pub fn normalize_query(query: &str) -> String {
    match IS_SUSPEND.as_ref() {
        Some(re) => re.replace_all(query, "is:suspended").into_owned(),
        None => query.to_string(),
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MemoryCollection;

    fn params(query: &str, limit: Option<usize>, offset: usize) -> BrowseParams {
        BrowseParams { query: query.to_string(), limit, offset }
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(10, None, 0), 0..10);
        assert_eq!(page_bounds(10, None, 7), 0..10);
        assert_eq!(page_bounds(10, Some(5), 8), 8..10);
        assert_eq!(page_bounds(10, Some(5), 10), 10..10);
        assert_eq!(page_bounds(10, Some(5), 50), 10..10);
        assert_eq!(page_bounds(10, Some(0), 3), 3..3);
        assert_eq!(page_bounds(10, Some(usize::MAX), 2), 2..10);
        assert_eq!(page_bounds(0, Some(5), 0), 0..0);
    }

    #[test]
    fn test_page_sizes_for_every_offset() {
        let col = MemoryCollection::demo();
        for limit in [1usize, 3, 7, 25] {
            for offset in 0..25usize {
                let page = browse_notes(&col, &params("", Some(limit), offset)).unwrap();
                assert_eq!(page.total, 20);
                assert_eq!(page.items.len(), limit.min(20usize.saturating_sub(offset)));
                assert_eq!(page.timing.count, page.items.len());
            }
        }
    }

    #[test]
    fn test_deck_default_example() {
        let col = MemoryCollection::demo();

        let all = browse_notes(&col, &params("deck:Default", None, 0)).unwrap();
        assert_eq!(all.total, 10);
        assert_eq!(all.items.len(), 10);
        assert_eq!(all.timing.count, 10);

        let page = browse_notes(&col, &params("deck:Default", Some(5), 8)).unwrap();
        assert_eq!(page.total, 10);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, all.items[8].id);
        assert_eq!(page.items[1].id, all.items[9].id);
    }

    #[test]
    fn test_only_the_page_is_fetched() {
        let mut fetched = Vec::new();
        let page = browse(
            &params("", Some(2), 3),
            |_| Ok((0..100).collect::<Vec<i64>>()),
            |id| {
                fetched.push(*id);
                Ok(*id)
            },
        )
        .unwrap();
        assert_eq!(page.items, vec![3, 4]);
        assert_eq!(page.total, 100);
        assert_eq!(fetched, vec![3, 4]);
    }

    #[test]
    fn test_note_item_shape() {
        let col = MemoryCollection::demo();
        let page = browse_notes(&col, &params("deck:Science", Some(1), 0)).unwrap();
        let item = &page.items[0];
        assert_eq!(item.model_name, "Basic");
        assert_eq!(item.deck_name, "Science");
        assert_eq!(item.fields.keys().collect::<Vec<_>>(), vec!["Front", "Back"]);

        let json = serde_json::to_value(item).unwrap();
        assert!(json.get("modelName").is_some());
        assert!(json.get("deckName").is_some());
    }

    #[test]
    fn test_card_item_shape() {
        let col = MemoryCollection::demo();
        let page = browse_cards(&col, &params("flag:2", None, 0)).unwrap();
        assert_eq!(page.total, 1);
        let json = serde_json::to_value(&page.items[0]).unwrap();
        assert_eq!(json["flag"], 2);
        assert_eq!(json["queue"], 0);
        assert_eq!(json["deckName"], "Default");
        assert!(json.get("noteId").is_some());
        assert!(json.get("interval").is_some());
    }

    #[test]
    fn test_normalize_query() {
        assert!(IS_SUSPEND.is_some());
        assert_eq!(normalize_query("is:suspend"), "is:suspended");
        assert_eq!(normalize_query("-is:suspend deck:x"), "-is:suspended deck:x");
        assert_eq!(normalize_query("is:suspended"), "is:suspended");
        assert_eq!(normalize_query("Front:this:suspend"), "Front:this:suspend");
    }

    #[test]
    fn test_search_errors_propagate() {
        let col = MemoryCollection::demo();
        let err = browse_cards(&col, &params("is:bogus", None, 0)).unwrap_err();
        assert!(err.to_string().contains("is:bogus"));
    }
}
