use std::{collections::BTreeMap, sync::Arc};

use ahash::HashSet;
use quarry_common::{Result, error::Error};
use quarry_source::{Key, KeyFilter, field_index};

use super::{IndexFilterFactory, split_list};

/// Accepts postings and stored attributes of the listed datatypes only.
///
/// Keys that carry no document pointer are accepted.
#[derive(Debug, Clone)]
pub struct DatatypeFilter {
    datatypes: HashSet<String>,
}

impl DatatypeFilter {
    pub fn new(datatypes: impl IntoIterator<Item = impl Into<String>>) -> DatatypeFilter {
        DatatypeFilter {
            datatypes: datatypes.into_iter().map(Into::into).collect(),
        }
    }
}

impl KeyFilter for DatatypeFilter {
    fn name(&self) -> &str {
        "datatype"
    }

    fn accept(&self, key: &Key) -> bool {
        field_index::parse_pointer(key).is_none_or(|p| self.datatypes.contains(&p.datatype))
    }
}

pub(crate) struct DatatypeFilterFactory;

impl IndexFilterFactory for DatatypeFilterFactory {
    fn name(&self) -> &str {
        "datatype"
    }

    /// Options: `types`, a comma separated list of datatypes.
    fn create(&self, options: &BTreeMap<String, String>) -> Result<Arc<dyn KeyFilter>> {
        let types = options
            .get("types")
            .ok_or_else(|| Error::invalid_arg("types", "datatype filter needs 'types'"))?;
        let filter = DatatypeFilter::new(split_list(types));
        if filter.datatypes.is_empty() {
            return Err(Error::invalid_arg("types", "no datatypes listed"));
        }
        Ok(Arc::new(filter))
    }
}
