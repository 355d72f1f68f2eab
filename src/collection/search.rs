//! Search query parsing and matching for [`MemoryCollection`](super::MemoryCollection).
//!
//! Supports the subset of the browser search syntax the web UI emits:
//!
//! | Term               | Matches                                              |
//! |--------------------|------------------------------------------------------|
//! | `text`             | substring of any field (case-insensitive, `*` glob)  |
//! | `Field:value`      | whole field value (`*` glob)                         |
//! | `deck:Name`        | deck and its sub-decks                               |
//! | `tag:name`         | tag and its `name::child` tags                       |
//! | `note:Type`        | note type name                                       |
//! | `flag:N`           | user flag 0-7                                        |
//! | `is:state`         | new, learn, review, suspended, buried(-sibling/-manually) |
//! | `prop:ivl>=N`      | interval / due comparison                            |
//! | `nid:1,2` `cid:3`  | explicit ids                                         |
//!
//! Terms are AND-ed, `or` separates alternatives, `-term` negates and
//! double quotes keep whitespace inside one term.

use regex::{Regex, RegexBuilder};

use super::model::{Card, CardType, Note, NoteType, Queue};
use super::CollectionResult;
use crate::error::CollectionError;

/// Everything a term may look at when testing one card.
pub struct CardView<'a> {
    pub note: &'a Note,
    pub note_type: &'a NoteType,
    pub card: &'a Card,
    pub deck_name: &'a str,
}

/// Parsed query: alternatives of term conjunctions.
#[derive(Debug, Clone)]
pub struct Query {
    alternatives: Vec<Vec<Term>>,
}

impl Query {
    pub fn parse(text: &str) -> CollectionResult<Self> {
        let mut alternatives: Vec<Vec<Term>> = vec![Vec::new()];

        for token in tokenize(text)? {
            if !token.quoted && token.text.eq_ignore_ascii_case("or") {
                if alternatives.last().is_some_and(Vec::is_empty) {
                    return Err(search_error("'or' must follow a search term"));
                }
                alternatives.push(Vec::new());
                continue;
            }
            if !token.quoted && token.text.eq_ignore_ascii_case("and") {
                continue;
            }
            if let Some(terms) = alternatives.last_mut() {
                terms.push(Term::parse(&token.text)?);
            }
        }

        if alternatives.len() > 1 && alternatives.last().is_some_and(Vec::is_empty) {
            return Err(search_error("'or' must be followed by a search term"));
        }

        Ok(Self { alternatives })
    }

    pub fn matches(&self, view: &CardView<'_>) -> bool {
        self.alternatives
            .iter()
            .any(|terms| terms.iter().all(|term| term.matches(view)))
    }
}

#[derive(Debug, Clone)]
struct Term {
    negated: bool,
    kind: TermKind,
}

#[derive(Debug, Clone)]
enum TermKind {
    Text(Pattern),
    Field { name: String, value: Pattern },
    Deck(Pattern),
    Tag(Pattern),
    NoteType(Pattern),
    Flag(u8),
    State(StateFilter),
    Prop(PropFilter),
    NoteIds(Vec<i64>),
    CardIds(Vec<i64>),
}

impl Term {
    fn parse(text: &str) -> CollectionResult<Self> {
        let (negated, body) = match text.strip_prefix('-') {
            Some(rest) if !rest.is_empty() => (true, rest),
            _ => (false, text),
        };

        let kind = match body.split_once(':') {
            None | Some(("", _)) => TermKind::Text(Pattern::contains(body)?),
            Some((key, value)) => match key.to_ascii_lowercase().as_str() {
                "deck" => TermKind::Deck(Pattern::hierarchical(value)?),
                "tag" => TermKind::Tag(Pattern::hierarchical(value)?),
                "note" => TermKind::NoteType(Pattern::exact(value)?),
                "flag" => TermKind::Flag(parse_flag(value)?),
                "is" => TermKind::State(StateFilter::parse(value)?),
                "prop" => TermKind::Prop(PropFilter::parse(value)?),
                "nid" => TermKind::NoteIds(parse_ids(value)?),
                "cid" => TermKind::CardIds(parse_ids(value)?),
                _ => TermKind::Field { name: key.to_string(), value: Pattern::exact(value)? },
            },
        };

        Ok(Self { negated, kind })
    }

    fn matches(&self, view: &CardView<'_>) -> bool {
        self.kind.matches(view) != self.negated
    }
}

impl TermKind {
    fn matches(&self, view: &CardView<'_>) -> bool {
        match self {
            TermKind::Text(pattern) => view.note.fields.iter().any(|f| pattern.is_match(f)),
            TermKind::Field { name, value } => view
                .note_type
                .fields
                .iter()
                .position(|f| f.eq_ignore_ascii_case(name))
                .and_then(|idx| view.note.fields.get(idx))
                .is_some_and(|f| value.is_match(f)),
            TermKind::Deck(pattern) => pattern.is_match(view.deck_name),
            TermKind::Tag(pattern) => view.note.tags.iter().any(|t| pattern.is_match(t)),
            TermKind::NoteType(pattern) => pattern.is_match(&view.note_type.name),
            TermKind::Flag(code) => view.card.flag.code() == *code,
            TermKind::State(state) => state.matches(view.card),
            TermKind::Prop(prop) => prop.matches(view.card),
            TermKind::NoteIds(ids) => ids.contains(&view.note.id),
            TermKind::CardIds(ids) => ids.contains(&view.card.id),
        }
    }
}

/// Case-insensitive glob compiled to a regex; `*` matches any run of characters.
#[derive(Debug, Clone)]
struct Pattern(Regex);

impl Pattern {
    fn exact(glob: &str) -> CollectionResult<Self> {
        Self::build(glob, "^", "$")
    }

    fn contains(glob: &str) -> CollectionResult<Self> {
        Self::build(glob, "", "")
    }

    /// Matches the name itself or any `name::child` below it.
    fn hierarchical(glob: &str) -> CollectionResult<Self> {
        Self::build(glob, "^", "(::.*)?$")
    }

    fn build(glob: &str, prefix: &str, suffix: &str) -> CollectionResult<Self> {
        let body = glob.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
        RegexBuilder::new(&format!("(?s){prefix}{body}{suffix}"))
            .case_insensitive(true)
            .build()
            .map(Pattern)
            .map_err(search_error)
    }

    fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StateFilter {
    New,
    Learn,
    Review,
    Suspended,
    Buried,
    BuriedSibling,
    BuriedManual,
}

impl StateFilter {
    fn parse(value: &str) -> CollectionResult<Self> {
        Ok(match value.to_ascii_lowercase().as_str() {
            "new" => StateFilter::New,
            "learn" => StateFilter::Learn,
            "review" => StateFilter::Review,
            "suspended" => StateFilter::Suspended,
            "buried" => StateFilter::Buried,
            "buried-sibling" => StateFilter::BuriedSibling,
            "buried-manually" => StateFilter::BuriedManual,
            _ => return Err(search_error(format!("unknown state is:{value}"))),
        })
    }

    fn matches(self, card: &Card) -> bool {
        match self {
            StateFilter::New => card.card_type == CardType::New,
            StateFilter::Learn => matches!(card.card_type, CardType::Learn | CardType::Relearn),
            StateFilter::Review => matches!(card.card_type, CardType::Review | CardType::Relearn),
            StateFilter::Suspended => card.queue == Queue::Suspended,
            StateFilter::Buried => card.queue.is_buried(),
            StateFilter::BuriedSibling => card.queue == Queue::BuriedSibling,
            StateFilter::BuriedManual => card.queue == Queue::BuriedManual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prop {
    Interval,
    Due,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PropFilter {
    prop: Prop,
    cmp: Cmp,
    value: i64,
}

impl PropFilter {
    // Two-character operators first so `>=` is not read as `>`.
    const OPERATORS: [(&'static str, Cmp); 6] = [
        (">=", Cmp::Ge),
        ("<=", Cmp::Le),
        ("!=", Cmp::Ne),
        ("=", Cmp::Eq),
        ("<", Cmp::Lt),
        (">", Cmp::Gt),
    ];

    fn parse(value: &str) -> CollectionResult<Self> {
        let split = value.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(value.len());
        let (name, rest) = value.split_at(split);

        let prop = match name.to_ascii_lowercase().as_str() {
            "ivl" => Prop::Interval,
            "due" => Prop::Due,
            _ => return Err(search_error(format!("unknown property prop:{value}"))),
        };

        let (cmp, number) = Self::OPERATORS
            .iter()
            .find_map(|(op, cmp)| rest.strip_prefix(op).map(|n| (*cmp, n)))
            .ok_or_else(|| search_error(format!("missing comparison in prop:{value}")))?;

        let value = number
            .parse::<i64>()
            .map_err(|_| search_error(format!("invalid number in prop:{value}")))?;

        Ok(Self { prop, cmp, value })
    }

    fn matches(&self, card: &Card) -> bool {
        let actual = match self.prop {
            Prop::Interval => i64::from(card.interval),
            Prop::Due => card.due,
        };
        match self.cmp {
            Cmp::Eq => actual == self.value,
            Cmp::Ne => actual != self.value,
            Cmp::Lt => actual < self.value,
            Cmp::Le => actual <= self.value,
            Cmp::Gt => actual > self.value,
            Cmp::Ge => actual >= self.value,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

fn tokenize(text: &str) -> CollectionResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(Token { text: std::mem::take(&mut current), quoted });
                }
                quoted = false;
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(search_error("unterminated quote"));
    }
    if !current.is_empty() {
        tokens.push(Token { text: current, quoted });
    }
    Ok(tokens)
}

fn parse_flag(value: &str) -> CollectionResult<u8> {
    value
        .parse::<u8>()
        .ok()
        .filter(|code| *code <= 7)
        .ok_or_else(|| search_error(format!("flag must be between 0 and 7, got flag:{value}")))
}

fn parse_ids(value: &str) -> CollectionResult<Vec<i64>> {
    value
        .split(',')
        .map(|id| id.trim().parse::<i64>().map_err(|_| search_error(format!("invalid id list: {value}"))))
        .collect()
}

fn search_error(message: impl ToString) -> CollectionError {
    CollectionError::Search(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::model::Flag;

    fn note(fields: &[&str], tags: &[&str]) -> Note {
        Note {
            id: 10,
            note_type: "Basic".into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn card() -> Card {
        Card {
            id: 20,
            note_id: 10,
            deck_id: 1,
            ord: 0,
            card_type: CardType::Review,
            queue: Queue::Review,
            due: 5,
            interval: 30,
            flag: Flag::new(2).unwrap(),
        }
    }

    fn check(query: &str, note: &Note, card: &Card, deck: &str) -> bool {
        let nt = NoteType::basic();
        let view = CardView { note, note_type: &nt, card, deck_name: deck };
        Query::parse(query).unwrap().matches(&view)
    }

    #[test]
    fn test_tokenize_respects_quotes() {
        let tokens = tokenize(r#"deck:"My Deck" -tag:x "or""#).unwrap();
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["deck:My Deck", "-tag:x", "or"]);
        assert!(tokens[2].quoted);
        assert!(tokenize(r#"deck:"open"#).is_err());
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(check("", &note(&["a", "b"], &[]), &card(), "Default"));
        assert!(check("   ", &note(&["a", "b"], &[]), &card(), "Default"));
    }

    #[test]
    fn test_deck_includes_children() {
        let n = note(&["q", "a"], &[]);
        assert!(check("deck:Default", &n, &card(), "Default"));
        assert!(check("deck:default", &n, &card(), "Default::Sub"));
        assert!(!check("deck:Default", &n, &card(), "Defaults"));
        assert!(check("deck:Jap*", &n, &card(), "Japanese"));
    }

    #[test]
    fn test_text_and_field_terms() {
        let n = note(&["Question 12", "Answer 12"], &[]);
        assert!(check("question", &n, &card(), "Default"));
        assert!(check("front:question*", &n, &card(), "Default"));
        assert!(!check("front:question", &n, &card(), "Default"));
        assert!(!check("missing:x", &n, &card(), "Default"));
        assert!(check("\"answer 12\"", &n, &card(), "Default"));
    }

    #[test]
    fn test_tags_negation_and_or() {
        let n = note(&["q", "a"], &["important", "lang::ja"]);
        assert!(check("tag:important", &n, &card(), "Default"));
        assert!(check("tag:lang", &n, &card(), "Default"));
        assert!(!check("-tag:important", &n, &card(), "Default"));
        assert!(check("tag:nope or tag:important", &n, &card(), "Default"));
        assert!(!check("tag:nope OR deck:Other", &n, &card(), "Default"));
    }

    #[test]
    fn test_card_state_terms() {
        let n = note(&["q", "a"], &[]);
        let mut c = card();
        assert!(check("flag:2", &n, &c, "Default"));
        assert!(check("is:review prop:ivl>=30 prop:due<6", &n, &c, "Default"));
        assert!(!check("is:suspended", &n, &c, "Default"));
        c.queue = Queue::Suspended;
        assert!(check("is:suspended", &n, &c, "Default"));
        assert!(check(&format!("cid:{} nid:1,{}", c.id, n.id), &n, &c, "Default"));
    }

    #[test]
    fn test_malformed_queries() {
        assert!(Query::parse("is:bogus").is_err());
        assert!(Query::parse("prop:ivl").is_err());
        assert!(Query::parse("prop:ease>2").is_err());
        assert!(Query::parse("flag:9").is_err());
        assert!(Query::parse("or deck:x").is_err());
        assert!(Query::parse("deck:x or").is_err());
        assert!(Query::parse("nid:1,x").is_err());
    }
}
