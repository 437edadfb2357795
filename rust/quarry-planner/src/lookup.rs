//! Bounded term expansion against the global index.
//!
//! Global index layout (forward): `row = value, family = FIELD,
//! qualifier = shard\0datatype`. The reverse index has the same layout with
//! the value reversed in the row.

use std::collections::{BTreeMap, BTreeSet};

use quarry_arithmetic::pattern;
use quarry_common::{Result, ScanBudget};
use quarry_source::{NULL_DELIMITER, SortedSource};

use crate::{
    metadata::ShardMetadata,
    ranges::{RangeDescription, global_index_range, regex_range},
};

/// Values found for one field, up to a threshold.
///
/// Once the threshold is exceeded the values are dropped and the set only
/// reports that it overflowed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValueSet {
    values: BTreeSet<String>,
    threshold: usize,
    exceeded: bool,
}

impl ValueSet {
    pub fn new(threshold: usize) -> ValueSet {
        ValueSet {
            values: BTreeSet::new(),
            threshold,
            exceeded: false,
        }
    }

    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        if self.exceeded {
            return false;
        }
        let added = self.values.insert(value.into());
        if self.values.len() > self.threshold {
            self.mark_exceeded();
        }
        added
    }

    pub fn mark_exceeded(&mut self) {
        self.exceeded = true;
        self.values.clear();
    }

    pub fn is_threshold_exceeded(&self) -> bool {
        self.exceeded
    }

    pub fn values(&self) -> &BTreeSet<String> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Field name to expanded values, bounded per field and in the number of
/// fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexLookupMap {
    fields: BTreeMap<String, ValueSet>,
    key_threshold: usize,
    value_threshold: usize,
    key_threshold_exceeded: bool,
    patterns: BTreeSet<String>,
}

impl IndexLookupMap {
    /// # Arguments
    ///
    /// * `key_threshold` - Maximum number of distinct fields.
    /// * `value_threshold` - Maximum number of values per field.
    pub fn new(key_threshold: usize, value_threshold: usize) -> IndexLookupMap {
        IndexLookupMap {
            key_threshold,
            value_threshold,
            ..Default::default()
        }
    }

    pub fn put(&mut self, field: &str, value: impl Into<String>) {
        if self.key_threshold_exceeded {
            return;
        }
        if !self.fields.contains_key(field) && self.fields.len() >= self.key_threshold {
            self.key_threshold_exceeded = true;
            return;
        }
        let threshold = self.value_threshold;
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| ValueSet::new(threshold))
            .insert(value);
    }

    pub fn get(&self, field: &str) -> Option<&ValueSet> {
        self.fields.get(field)
    }

    /// Marks `field` as exceeded, creating its entry if needed.
    pub fn mark_exceeded(&mut self, field: &str) {
        let threshold = self.value_threshold;
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| ValueSet::new(threshold))
            .mark_exceeded();
    }

    pub fn is_key_threshold_exceeded(&self) -> bool {
        self.key_threshold_exceeded
    }

    /// True when any part of the expansion was cut short.
    pub fn is_threshold_exceeded(&self) -> bool {
        self.key_threshold_exceeded || self.fields.values().any(ValueSet::is_threshold_exceeded)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &ValueSet)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn patterns(&self) -> &BTreeSet<String> {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Bounds and filters for one term expansion.
#[derive(Clone, Debug)]
pub struct LookupOptions {
    /// Fields to expand in; empty means every field.
    pub fields: Vec<String>,
    /// Datatypes to accept; empty means every datatype.
    pub datatypes: BTreeSet<String>,
    pub value_threshold: usize,
    pub key_threshold: usize,
    pub full_table_scan: bool,
    pub budget: ScanBudget,
}

impl Default for LookupOptions {
    fn default() -> Self {
        LookupOptions {
            fields: Vec::new(),
            datatypes: BTreeSet::new(),
            value_threshold: 5000,
            key_threshold: 20000,
            full_table_scan: false,
            budget: ScanBudget::unlimited(),
        }
    }
}

/// Expands `patterns` into the concrete values the global index holds for
/// them.
///
/// Patterns that cannot be answered from the index are skipped. Scanning
/// stops early, with the threshold-exceeded flag set rather than an error,
/// when the value threshold of every requested field is exceeded, when the
/// key threshold is exceeded, or when the budget expires.
///
/// # Arguments
///
/// * `forward` - Cursor over the global forward index.
/// * `reverse` - Cursor over the global reverse index, if there is one.
pub fn lookup_terms_from_regex(
    patterns: &[String],
    forward: &mut dyn SortedSource,
    mut reverse: Option<&mut dyn SortedSource>,
    metadata: &dyn ShardMetadata,
    options: &LookupOptions,
) -> Result<IndexLookupMap> {
    let mut map = IndexLookupMap::new(options.key_threshold, options.value_threshold);
    map.patterns = patterns.iter().cloned().collect();

    let single_field = match options.fields.as_slice() {
        [field] => Some(field.as_str()),
        _ => None,
    };
    let perform_reverse = options.fields.is_empty()
        || options.fields.iter().any(|f| metadata.is_reverse_indexed(f));

    let mut forward_plans = Vec::new();
    let mut reverse_plans = Vec::new();
    for pattern in patterns {
        let description =
            match regex_range(single_field, pattern, metadata, options.full_table_scan) {
                Ok(Some(description)) => description,
                Ok(None) => {
                    log::debug!("ignoring pattern that cannot be looked up in the index: {pattern}");
                    continue;
                }
                Err(e) => {
                    log::debug!("ignoring pattern {pattern}: {e}");
                    continue;
                }
            };
        log::trace!("pattern {pattern} uses {description}");
        let compiled = pattern::compile(pattern)?;
        if description.for_reverse_index {
            reverse_plans.push((description, compiled));
        } else {
            forward_plans.push((description, compiled));
        }
    }

    let mut scan = Scan {
        map: &mut map,
        options,
        single_field,
    };
    for (description, regex) in &forward_plans {
        if !scan.run(forward, description, regex, false)? {
            return Ok(map);
        }
    }
    if perform_reverse {
        if let Some(reverse) = reverse.as_deref_mut() {
            for (description, regex) in &reverse_plans {
                if !scan.run(reverse, description, regex, true)? {
                    return Ok(map);
                }
            }
        }
    } else if !reverse_plans.is_empty() {
        log::debug!("no requested field is reverse indexed; skipping reverse lookups");
    }
    Ok(map)
}

struct Scan<'a> {
    map: &'a mut IndexLookupMap,
    options: &'a LookupOptions,
    single_field: Option<&'a str>,
}

impl Scan<'_> {
    /// Scans one range into the map. Returns `false` when expansion must
    /// stop altogether.
    fn run(
        &mut self,
        source: &mut dyn SortedSource,
        description: &RangeDescription,
        regex: &::regex::Regex,
        reverse: bool,
    ) -> Result<bool> {
        let range = global_index_range(&description.range);
        let inclusive = !self.options.fields.is_empty();
        source.seek(&range, &self.options.fields, inclusive)?;
        while let Some(key) = source.top_key() {
            if self.options.budget.is_expired() {
                log::info!("term expansion timed out on {}", description.range);
                self.mark_all_exceeded();
                return Ok(false);
            }
            let datatype = key
                .qualifier
                .split_once(NULL_DELIMITER)
                .map_or("", |(_, datatype)| datatype);
            if !self.options.datatypes.is_empty() && !self.options.datatypes.contains(datatype) {
                log::trace!("datatype {datatype} filtered out");
                source.next()?;
                continue;
            }
            let term = if reverse {
                key.row.chars().rev().collect()
            } else {
                key.row.clone()
            };
            let field = key.family.clone();
            source.next()?;
            if !regex.is_match(&term) {
                continue;
            }
            self.map.put(&field, term);
            if self.should_stop(&field) {
                log::trace!("passed the term expansion threshold on {field}");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn should_stop(&self, field: &str) -> bool {
        if self.map.is_key_threshold_exceeded() {
            return true;
        }
        if self.single_field.is_some() {
            return self
                .map
                .get(field)
                .is_some_and(ValueSet::is_threshold_exceeded);
        }
        !self.options.fields.is_empty()
            && self.options.fields.iter().all(|f| {
                self.map
                    .get(f)
                    .is_some_and(ValueSet::is_threshold_exceeded)
            })
    }

    fn mark_all_exceeded(&mut self) {
        if self.options.fields.is_empty() {
            // Unseen fields may hold values too.
            self.map.key_threshold_exceeded = true;
            let seen: Vec<String> = self.map.fields().map(|(f, _)| f.to_string()).collect();
            for field in seen {
                self.map.mark_exceeded(&field);
            }
        } else {
            for field in &self.options.fields {
                self.map.mark_exceeded(field);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_set_overflow() {
        let mut set = ValueSet::new(2);
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
        assert!(set.insert("b"));
        set.insert("c");
        assert!(set.is_threshold_exceeded());
        assert!(set.is_empty());
        assert!(!set.insert("d"));
    }

    #[test]
    fn test_key_threshold() {
        let mut map = IndexLookupMap::new(1, 10);
        map.put("A", "x");
        map.put("A", "y");
        assert!(!map.is_threshold_exceeded());
        map.put("B", "x");
        assert!(map.is_key_threshold_exceeded());
        assert!(map.get("B").is_none());
        assert_eq!(map.get("A").unwrap().len(), 2);
    }

    #[test]
    fn test_expired_scan_over_every_field() {
        let mut map = IndexLookupMap::new(10, 10);
        map.put("A", "x");
        let options = LookupOptions::default();
        let mut scan = Scan {
            map: &mut map,
            options: &options,
            single_field: None,
        };
        scan.mark_all_exceeded();
        assert!(map.is_key_threshold_exceeded());
        assert!(map.get("A").unwrap().is_threshold_exceeded());

        let mut map = IndexLookupMap::new(10, 10);
        let options = LookupOptions {
            fields: vec!["B".to_string()],
            ..Default::default()
        };
        let mut scan = Scan {
            map: &mut map,
            options: &options,
            single_field: Some("B"),
        };
        scan.mark_all_exceeded();
        assert!(!map.is_key_threshold_exceeded());
        assert!(map.get("B").unwrap().is_threshold_exceeded());
    }
}
