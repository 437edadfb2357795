//! Key layouts inside a shard row.
//!
//! Field-index postings:
//!
//! ```text
//! row = <shard>, family = fi\0<FIELD>, qualifier = <value>\0<datatype>\0<uid>
//! ```
//!
//! Stored document attributes ("event" keys):
//!
//! ```text
//! row = <shard>, family = <datatype>\0<uid>, qualifier = <FIELD>\0<value>
//! ```
//!
//! A posting value may itself contain the delimiter; the datatype and uid are
//! always taken from the last two delimiters.

use quarry_common::{Result, error::Error};

use crate::{
    MAX_UNICODE, NULL_DELIMITER,
    document::{DocumentKey, DocumentPointer},
    key::Key,
    range::Range,
};

pub const FIELD_INDEX_PREFIX: &str = "fi\0";

pub fn is_field_index_family(family: &str) -> bool {
    family.starts_with(FIELD_INDEX_PREFIX)
}

pub fn field_index_family(field: &str) -> String {
    format!("{FIELD_INDEX_PREFIX}{field}")
}

pub fn field_index_qualifier(value: &str, pointer: &DocumentPointer) -> String {
    format!(
        "{value}{NULL_DELIMITER}{}{NULL_DELIMITER}{}",
        pointer.datatype, pointer.uid
    )
}

pub fn field_index_key(row: &str, field: &str, value: &str, pointer: &DocumentPointer) -> Key {
    Key::new(
        row,
        field_index_family(field),
        field_index_qualifier(value, pointer),
    )
}

/// All postings of `field == value` in `row`, in document pointer order.
pub fn term_range(row: &str, field: &str, value: &str) -> Range {
    let mut prefix = String::with_capacity(value.len() + 1);
    prefix.push_str(value);
    prefix.push(NULL_DELIMITER);
    Range::qualifier_prefix(row, &field_index_family(field), &prefix)
}

/// All postings of `field` in `row`, in value order.
pub fn field_range(row: &str, field: &str) -> Range {
    Range::exact_family(row, &field_index_family(field))
}

/// Postings of `field` in `row` whose value lies between `lower` and `upper`.
///
/// A missing bound leaves that side open within the field. An exclusive lower
/// bound skips every posting of the bound value itself; an inclusive upper
/// bound keeps them.
pub fn value_range(
    row: &str,
    field: &str,
    lower: Option<(&str, bool)>,
    upper: Option<(&str, bool)>,
) -> Range {
    let family = field_index_family(field);
    let start = match lower {
        Some((value, true)) => Key::new(row, family.as_str(), value),
        Some((value, false)) => {
            Key::new(row, family.as_str(), format!("{value}{NULL_DELIMITER}{MAX_UNICODE}"))
        }
        None => Key::new(row, family.as_str(), ""),
    };
    let end = match upper {
        Some((value, true)) => {
            Key::new(row, family.as_str(), format!("{value}{NULL_DELIMITER}{MAX_UNICODE}"))
        }
        Some((value, false)) => Key::new(row, family.as_str(), value),
        None => Key::new(row, family.as_str(), "").following_key(crate::PartialKey::RowFamily),
    };
    Range::new(Some(start), true, Some(end), false)
}

/// The exact position of one posting, used to seek a term cursor forward.
pub fn posting_seek_key(row: &str, field: &str, value: &str, pointer: &DocumentPointer) -> Key {
    field_index_key(row, field, value, pointer)
}

/// A decoded field-index posting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldIndexEntry {
    pub field: String,
    pub value: String,
    pub pointer: DocumentPointer,
}

impl FieldIndexEntry {
    pub fn parse(key: &Key) -> Result<FieldIndexEntry> {
        let field = key
            .family
            .strip_prefix(FIELD_INDEX_PREFIX)
            .ok_or_else(|| Error::invalid_format("field index family", key.family.clone()))?;
        let (value, pointer) = split_value_and_pointer(&key.qualifier)?;
        Ok(FieldIndexEntry {
            field: field.to_string(),
            value: value.to_string(),
            pointer,
        })
    }

    pub fn document_key(&self, row: &str) -> DocumentKey {
        DocumentKey::new(row, self.pointer.clone())
    }
}

fn split_value_and_pointer(qualifier: &str) -> Result<(&str, DocumentPointer)> {
    let mut parts = qualifier.rsplitn(3, NULL_DELIMITER);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(uid), Some(datatype), Some(value)) => {
            Ok((value, DocumentPointer::new(datatype, uid)))
        }
        _ => Err(Error::invalid_format(
            "field index qualifier",
            format!("expected value\\0datatype\\0uid, got {:?}", qualifier),
        )),
    }
}

pub fn event_family(pointer: &DocumentPointer) -> String {
    format!("{}{NULL_DELIMITER}{}", pointer.datatype, pointer.uid)
}

pub fn event_key(row: &str, pointer: &DocumentPointer, field: &str, value: &str) -> Key {
    Key::new(
        row,
        event_family(pointer),
        format!("{field}{NULL_DELIMITER}{value}"),
    )
}

/// All stored attributes of one document.
pub fn document_range(document: &DocumentKey) -> Range {
    Range::exact_family(&document.row, &event_family(&document.pointer))
}

/// A decoded stored attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventEntry {
    pub pointer: DocumentPointer,
    pub field: String,
    pub value: String,
}

impl EventEntry {
    pub fn parse(key: &Key) -> Result<EventEntry> {
        let pointer = parse_event_family(&key.family).ok_or_else(|| {
            Error::invalid_format("event family", format!("{:?}", key.family))
        })?;
        let (field, value) = key.qualifier.split_once(NULL_DELIMITER).ok_or_else(|| {
            Error::invalid_format("event qualifier", format!("{:?}", key.qualifier))
        })?;
        Ok(EventEntry {
            pointer,
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

fn parse_event_family(family: &str) -> Option<DocumentPointer> {
    if is_field_index_family(family) {
        return None;
    }
    let (datatype, uid) = family.split_once(NULL_DELIMITER)?;
    Some(DocumentPointer::new(datatype, uid))
}

/// Extracts the document pointer from either a posting or a stored attribute.
pub fn parse_pointer(key: &Key) -> Option<DocumentPointer> {
    if is_field_index_family(&key.family) {
        split_value_and_pointer(&key.qualifier)
            .ok()
            .map(|(_, pointer)| pointer)
    } else {
        parse_event_family(&key.family)
    }
}
