use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueTuple};

/// The attribute bag of one candidate document: field name to the values the
/// field carries.
///
/// Values come either from stored document attributes or from field-index
/// postings gathered while the iterator tree located the document. Fields
/// that are only indexed (never stored) are known solely through the latter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    attributes: BTreeMap<String, Vec<ValueTuple>>,
}

impl Document {
    pub fn new() -> Document {
        Default::default()
    }

    /// Adds a value unless the field already carries the same value.
    pub fn put(&mut self, tuple: ValueTuple) {
        let values = self.attributes.entry(tuple.field.clone()).or_default();
        if !values.iter().any(|v| v.same_value(&tuple)) {
            values.push(tuple);
        }
    }

    pub fn merge(&mut self, other: Document) {
        for tuple in other.attributes.into_values().flatten() {
            self.put(tuple);
        }
    }

    /// The field as an arithmetic operand: `Null` when absent, a single tuple
    /// or a set of tuples otherwise.
    pub fn get(&self, field: &str) -> Value {
        match self.attributes.get(field).map(Vec::as_slice) {
            None | Some([]) => Value::Null,
            Some([single]) => Value::Tuple(single.clone()),
            Some(values) => Value::Set(values.iter().cloned().map(Value::Tuple).collect()),
        }
    }

    pub fn values(&self, field: &str) -> &[ValueTuple] {
        self.attributes
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.attributes.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn tuples(&self) -> impl Iterator<Item = &ValueTuple> {
        self.attributes.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn clear(&mut self) {
        self.attributes.clear();
    }
}

impl FromIterator<ValueTuple> for Document {
    fn from_iter<T: IntoIterator<Item = ValueTuple>>(iter: T) -> Self {
        let mut document = Document::new();
        for tuple in iter {
            document.put(tuple);
        }
        document
    }
}
