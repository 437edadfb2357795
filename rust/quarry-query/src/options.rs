use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use quarry_common::{Result, error::Error};
use quarry_planner::LookupOptions;
use quarry_source::FilterChain;
use serde::{Deserialize, Serialize};

use crate::filters::{registry, split_list};

/// A named index filter and its string options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Tuning and behavior switches of one shard query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Ivarator set buffer size; also the posting count above which a range
    /// leaf is escalated to an ivarator.
    pub ivarator_cache_buffer_size: usize,
    /// Scanned postings between forced persists of an ivarator set.
    pub ivarator_persist_threshold: usize,
    pub ivarator_scan_timeout_ms: u64,
    /// Maximum number of population tasks one value-list ivarator is split
    /// into.
    pub max_range_split: usize,
    pub max_ivarator_sources: usize,
    pub value_expansion_threshold: usize,
    pub key_expansion_threshold: usize,
    /// Value count above which an expanded regex is handed to the compiler
    /// as a value list instead of an OR of terms.
    pub or_expansion_threshold: usize,
    pub seek_threshold: usize,
    pub sorted_uids: bool,
    pub full_table_scan: bool,
    /// When non-empty, only these fields may drive index lookups.
    pub include_fields: BTreeSet<String>,
    pub exclude_fields: BTreeSet<String>,
    /// Fields treated as unindexed regardless of shard metadata.
    pub unindexed_fields: BTreeSet<String>,
    pub hit_list: bool,
    pub query_timeout_ms: Option<u64>,
    pub filters: Vec<FilterSpec>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            ivarator_cache_buffer_size: 10_000,
            ivarator_persist_threshold: 100_000,
            ivarator_scan_timeout_ms: 60 * 60 * 1000,
            max_range_split: 11,
            max_ivarator_sources: 33,
            value_expansion_threshold: 5000,
            key_expansion_threshold: 20_000,
            or_expansion_threshold: 500,
            seek_threshold: quarry_iterators::DEFAULT_SEEK_THRESHOLD,
            sorted_uids: true,
            full_table_scan: false,
            include_fields: BTreeSet::new(),
            exclude_fields: BTreeSet::new(),
            unindexed_fields: BTreeSet::new(),
            hit_list: false,
            query_timeout_ms: None,
            filters: Vec::new(),
        }
    }
}

impl QueryOptions {
    pub fn from_json(json: &str) -> Result<QueryOptions> {
        let options: QueryOptions =
            serde_json::from_str(json).map_err(|e| Error::serialization("query options", e))?;
        options.validate()?;
        Ok(options)
    }

    /// Builds options from dotted string settings such as
    /// `ivarator.cache.buffer.size = 500`. Unset options keep their
    /// defaults.
    ///
    /// `filters` lists filter names; `filter.<name>.<option>` sets an option
    /// of filter `<name>`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown option or a malformed value.
    pub fn from_option_map<'a>(
        settings: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<QueryOptions> {
        let mut options = QueryOptions::default();
        let mut filter_names: Vec<String> = Vec::new();
        let mut filter_options: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (name, value) in settings {
            let value = value.trim();
            match name {
                "ivarator.cache.buffer.size" => {
                    options.ivarator_cache_buffer_size = parse(name, value)?
                }
                "ivarator.scan.persist.threshold" => {
                    options.ivarator_persist_threshold = parse(name, value)?
                }
                "ivarator.scan.timeout" => options.ivarator_scan_timeout_ms = parse(name, value)?,
                "ivarator.max.range.split" => options.max_range_split = parse(name, value)?,
                "ivarator.max.sources" => options.max_ivarator_sources = parse(name, value)?,
                "expansion.value.threshold" => {
                    options.value_expansion_threshold = parse(name, value)?
                }
                "expansion.key.threshold" => options.key_expansion_threshold = parse(name, value)?,
                "expansion.or.threshold" => options.or_expansion_threshold = parse(name, value)?,
                "seek.threshold" => options.seek_threshold = parse(name, value)?,
                "sorted.uids" => options.sorted_uids = parse(name, value)?,
                "full.table.scan" => options.full_table_scan = parse(name, value)?,
                "include.fields" => options.include_fields = parse_set(value),
                "exclude.fields" => options.exclude_fields = parse_set(value),
                "unindexed.fields" => options.unindexed_fields = parse_set(value),
                "hit.list" => options.hit_list = parse(name, value)?,
                "query.timeout" => options.query_timeout_ms = Some(parse(name, value)?),
                "filters" => filter_names = split_list(value).map(String::from).collect(),
                _ => {
                    let Some((filter, option)) = name
                        .strip_prefix("filter.")
                        .and_then(|rest| rest.split_once('.'))
                    else {
                        return Err(Error::invalid_arg(name, "unknown query option"));
                    };
                    filter_options
                        .entry(filter.to_string())
                        .or_default()
                        .insert(option.to_string(), value.to_string());
                }
            }
        }
        for name in filter_names {
            let options_of = filter_options.remove(&name).unwrap_or_default();
            options.filters.push(FilterSpec {
                name,
                options: options_of,
            });
        }
        if let Some(orphan) = filter_options.keys().next() {
            return Err(Error::invalid_arg(
                "filters",
                format!("options given for filter '{orphan}' which is not listed"),
            ));
        }
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<()> {
        quarry_common::verify_arg!(ivarator_cache_buffer_size, self.ivarator_cache_buffer_size > 0);
        quarry_common::verify_arg!(ivarator_persist_threshold, self.ivarator_persist_threshold > 0);
        quarry_common::verify_arg!(max_range_split, self.max_range_split > 0);
        quarry_common::verify_arg!(max_ivarator_sources, self.max_ivarator_sources > 0);
        Ok(())
    }

    /// Creates the configured filters through the filter registry.
    pub fn resolve_filters(&self) -> Result<FilterChain> {
        let mut chain = FilterChain::new();
        for spec in &self.filters {
            let filter = registry::get(&spec.name)?.create(&spec.options)?;
            chain.push(filter);
        }
        Ok(chain)
    }

    /// True when `field` may drive an index lookup.
    pub fn is_field_allowed(&self, field: &str) -> bool {
        !self.is_field_blacklisted(field) && !self.unindexed_fields.contains(field)
    }

    /// True when `field` is excluded, or not included while an include list
    /// is set.
    pub fn is_field_blacklisted(&self, field: &str) -> bool {
        self.exclude_fields.contains(field)
            || (!self.include_fields.is_empty() && !self.include_fields.contains(field))
    }

    pub fn ivarator_scan_timeout(&self) -> Duration {
        Duration::from_millis(self.ivarator_scan_timeout_ms)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// Term expansion bounds for the given fields.
    pub fn lookup_options(&self, fields: Vec<String>) -> LookupOptions {
        LookupOptions {
            fields,
            value_threshold: self.value_expansion_threshold,
            key_threshold: self.key_expansion_threshold,
            full_table_scan: self.full_table_scan,
            ..Default::default()
        }
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::invalid_arg(name, format!("cannot parse {value:?}")))
}

fn parse_set(value: &str) -> BTreeSet<String> {
    split_list(value).map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = QueryOptions::default();
        assert_eq!(options.ivarator_cache_buffer_size, 10_000);
        assert_eq!(options.ivarator_persist_threshold, 100_000);
        assert_eq!(options.ivarator_scan_timeout(), Duration::from_secs(3600));
        assert_eq!(options.max_range_split, 11);
        assert_eq!(options.max_ivarator_sources, 33);
        assert_eq!(options.value_expansion_threshold, 5000);
        assert_eq!(options.key_expansion_threshold, 20_000);
        assert_eq!(options.seek_threshold, 10);
        assert!(options.sorted_uids);
    }

    #[test]
    fn test_from_json_keeps_defaults() {
        let options =
            QueryOptions::from_json(r#"{"max_range_split": 4, "hit_list": true}"#).unwrap();
        assert_eq!(options.max_range_split, 4);
        assert!(options.hit_list);
        assert_eq!(options.seek_threshold, 10);
        assert!(QueryOptions::from_json(r#"{"max_range_split": 0}"#).is_err());
    }

    #[test]
    fn test_from_option_map() {
        let options = QueryOptions::from_option_map([
            ("ivarator.cache.buffer.size", "50"),
            ("sorted.uids", "false"),
            ("exclude.fields", "BODY, NOTES"),
            ("query.timeout", "1500"),
            ("filters", "datatype,label"),
            ("filter.datatype.types", "csv"),
            ("filter.label.authorizations", "A,B"),
        ])
        .unwrap();
        assert_eq!(options.ivarator_cache_buffer_size, 50);
        assert!(!options.sorted_uids);
        assert!(!options.is_field_allowed("BODY"));
        assert!(options.is_field_allowed("COLOR"));
        assert_eq!(options.query_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(options.filters.len(), 2);
        assert_eq!(options.filters[0].options["types"], "csv");
        assert!(options.resolve_filters().is_ok());
    }

    #[test]
    fn test_from_option_map_errors() {
        assert!(QueryOptions::from_option_map([("no.such.option", "1")]).is_err());
        assert!(QueryOptions::from_option_map([("seek.threshold", "many")]).is_err());
        assert!(QueryOptions::from_option_map([("filter.datatype.types", "csv")]).is_err());
        let unknown = QueryOptions::from_option_map([("filters", "nope")]).unwrap();
        assert!(unknown.resolve_filters().is_err());
    }

    #[test]
    fn test_include_fields() {
        let options = QueryOptions {
            include_fields: ["COLOR".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert!(options.is_field_allowed("COLOR"));
        assert!(!options.is_field_allowed("SHAPE"));
    }
}
