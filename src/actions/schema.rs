//! Read-only snapshots: `getSchema` and the legacy `getModels`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::collection::Collection;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub models: BTreeMap<String, Vec<String>>,
    pub decks: Vec<String>,
    pub tags: Vec<String>,
}

/// Field names of every note type, keyed by type name.
pub fn models<C: Collection + ?Sized>(col: &C) -> BTreeMap<String, Vec<String>> {
    col.note_types()
        .into_iter()
        .map(|nt| (nt.name.clone(), nt.fields.clone()))
        .collect()
}

pub fn schema<C: Collection + ?Sized>(col: &C) -> Schema {
    let mut decks = col.deck_names();
    decks.sort();
    let mut tags = col.tag_names();
    tags.sort();
    Schema { models: models(col), decks, tags }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{MemoryCollection, NoteType};

    #[test]
    fn test_schema_snapshot() {
        let mut col = MemoryCollection::demo();
        col.add_note_type(NoteType::new("Cloze", &["Text", "Extra"]));
        col.add_deck("Art");

        let schema = schema(&col);
        assert_eq!(schema.models["Basic"], vec!["Front".to_string(), "Back".to_string()]);
        assert_eq!(schema.models["Cloze"], vec!["Text".to_string(), "Extra".to_string()]);
        assert_eq!(schema.decks, vec!["Art", "Default", "Japanese", "Science"]);
        assert_eq!(schema.tags, vec!["important", "review"]);
    }

    #[test]
    fn test_models_keeps_field_order() {
        let mut col = MemoryCollection::new();
        col.add_note_type(NoteType::new("Vocab", &["Word", "Reading", "Meaning"]));
        let json = serde_json::to_value(models(&col)).unwrap();
        assert_eq!(json["Vocab"], serde_json::json!(["Word", "Reading", "Meaning"]));
    }
}
