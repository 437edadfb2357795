use std::{fmt, sync::Arc};

use crate::key::Key;

/// A predicate applied to every key read on behalf of a query, postings and
/// stored attributes alike.
pub trait KeyFilter: Send + Sync {
    fn name(&self) -> &str;

    fn accept(&self, key: &Key) -> bool;
}

/// An ordered conjunction of key filters. An empty chain accepts everything.
#[derive(Clone, Default)]
pub struct FilterChain(Vec<Arc<dyn KeyFilter>>);

impl FilterChain {
    pub fn new() -> FilterChain {
        FilterChain(Vec::new())
    }

    pub fn push(&mut self, filter: Arc<dyn KeyFilter>) {
        self.0.push(filter);
    }

    pub fn with(mut self, filter: Arc<dyn KeyFilter>) -> FilterChain {
        self.push(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn accept(&self, key: &Key) -> bool {
        self.0.iter().all(|f| f.accept(key))
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter().map(|x| x.name())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RowIs(&'static str);

    impl KeyFilter for RowIs {
        fn name(&self) -> &str {
            "row"
        }

        fn accept(&self, key: &Key) -> bool {
            key.row == self.0
        }
    }

    #[test]
    fn test_chain_is_conjunction() {
        let key = Key::new("a", "f", "q");
        assert!(FilterChain::new().accept(&key));
        let chain = FilterChain::new().with(Arc::new(RowIs("a")));
        assert!(chain.accept(&key));
        let chain = chain.with(Arc::new(RowIs("b")));
        assert!(!chain.accept(&key));
        assert_eq!(format!("{chain:?}"), r#"["row", "row"]"#);
    }
}
