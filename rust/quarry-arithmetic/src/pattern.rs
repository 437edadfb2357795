use std::sync::{Mutex, PoisonError};

use ahash::HashMap;
use quarry_common::{
    Result,
    error::{Error, PlanningErrorCode},
};
use regex::Regex;

/// Default number of compiled patterns kept per cache.
pub const DEFAULT_PATTERN_CACHE_SIZE: usize = 256;

/// Compiles full-string patterns once and reuses them.
///
/// Patterns match the whole value, and `.` also matches a newline. When the
/// cache is full it is emptied before the next insert.
#[derive(Debug)]
pub struct PatternCache {
    capacity: usize,
    patterns: Mutex<HashMap<String, Regex>>,
}

impl PatternCache {
    pub fn new(capacity: usize) -> PatternCache {
        PatternCache {
            capacity: capacity.max(1),
            patterns: Mutex::new(HashMap::default()),
        }
    }

    pub fn get(&self, pattern: &str) -> Result<Regex> {
        let mut patterns = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(regex) = patterns.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = compile(pattern)?;
        if patterns.len() >= self.capacity {
            patterns.clear();
        }
        patterns.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    pub fn len(&self) -> usize {
        self.patterns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        PatternCache::new(DEFAULT_PATTERN_CACHE_SIZE)
    }
}

/// Compiles `pattern` as an anchored, dot-matches-newline regex.
pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?s)^(?:{pattern})$"))
        .map_err(|e| Error::planning(PlanningErrorCode::InvalidPattern, format!("{pattern}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_string_match() {
        let cache = PatternCache::default();
        let re = cache.get("f.*").unwrap();
        assert!(re.is_match("foo"));
        assert!(re.is_match("f\nx"));
        assert!(!re.is_match("afoo"));
        let alt = cache.get("a|b").unwrap();
        assert!(alt.is_match("b"));
        assert!(!alt.is_match("ab"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PatternCache::default().get("a(").unwrap_err();
        assert_eq!(err.planning_code(), Some(PlanningErrorCode::InvalidPattern));
    }

    #[test]
    fn test_cache_is_bounded() {
        let cache = PatternCache::new(2);
        for p in ["a", "b", "c"] {
            cache.get(p).unwrap();
        }
        assert!(cache.len() <= 2);
    }
}
