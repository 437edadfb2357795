use std::{collections::BTreeMap, sync::Arc};

use quarry_common::{Result, error::Error};
use quarry_source::{Key, KeyFilter};

use super::IndexFilterFactory;

/// Accepts keys whose timestamp lies within `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRangeFilter {
    start: i64,
    end: i64,
}

impl TimeRangeFilter {
    pub fn new(start: i64, end: i64) -> Result<TimeRangeFilter> {
        quarry_common::verify_arg!(start, start <= end);
        Ok(TimeRangeFilter { start, end })
    }
}

impl KeyFilter for TimeRangeFilter {
    fn name(&self) -> &str {
        "time-range"
    }

    fn accept(&self, key: &Key) -> bool {
        (self.start..=self.end).contains(&key.timestamp)
    }
}

pub(crate) struct TimeRangeFilterFactory;

impl IndexFilterFactory for TimeRangeFilterFactory {
    fn name(&self) -> &str {
        "time-range"
    }

    /// Options: `start` and `end`, inclusive timestamps; either may be
    /// omitted.
    fn create(&self, options: &BTreeMap<String, String>) -> Result<Arc<dyn KeyFilter>> {
        let bound = |name: &str, default: i64| -> Result<i64> {
            match options.get(name) {
                None => Ok(default),
                Some(text) => text
                    .trim()
                    .parse()
                    .map_err(|_| Error::invalid_arg(name, format!("not a timestamp: {text}"))),
            }
        };
        let filter = TimeRangeFilter::new(bound("start", i64::MIN)?, bound("end", i64::MAX)?)?;
        Ok(Arc::new(filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range() {
        let options = BTreeMap::from([
            ("start".to_string(), "100".to_string()),
            ("end".to_string(), "200".to_string()),
        ]);
        let filter = TimeRangeFilterFactory.create(&options).unwrap();
        let key = |ts| Key::new("r", "f", "q").with_timestamp(ts);
        assert!(filter.accept(&key(100)));
        assert!(filter.accept(&key(200)));
        assert!(!filter.accept(&key(99)));
        assert!(!filter.accept(&key(201)));

        let open = TimeRangeFilterFactory.create(&BTreeMap::new()).unwrap();
        assert!(open.accept(&Key::new("r", "f", "q")));

        let reversed = BTreeMap::from([
            ("start".to_string(), "5".to_string()),
            ("end".to_string(), "1".to_string()),
        ]);
        assert!(TimeRangeFilterFactory.create(&reversed).is_err());
        let garbage = BTreeMap::from([("end".to_string(), "soon".to_string())]);
        assert!(TimeRangeFilterFactory.create(&garbage).is_err());
    }
}
