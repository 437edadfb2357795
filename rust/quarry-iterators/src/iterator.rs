use quarry_arithmetic::Document;
use quarry_common::{Result, ScanBudget};
use quarry_source::DocumentKey;

/// A lazily advancing, sorted stream of candidate documents.
///
/// Iterators are positioned by [`initialize`](Self::initialize); afterwards
/// [`has_next`](Self::has_next) tells whether another key is available
/// without advancing. Keys are returned in ascending [`DocumentKey`] order
/// and never repeat. The budget is threaded through every call and checked
/// as the tree advances.
pub trait NestedIterator: Send {
    /// Positions the iterator on its first key.
    fn initialize(&mut self, budget: &ScanBudget) -> Result<()>;

    fn has_next(&self) -> bool;

    /// Returns the next key, or `None` once exhausted.
    fn next(&mut self, budget: &ScanBudget) -> Result<Option<DocumentKey>>;

    /// Returns the first key `>= min`, skipping everything before it.
    ///
    /// # Arguments
    ///
    /// * `min` - The lower bound; must not be smaller than a key already
    ///   returned.
    /// * `budget` - Deadline for the call.
    ///
    /// # Returns
    ///
    /// The key found, or `None` when no key `>= min` remains.
    fn move_to(&mut self, min: &DocumentKey, budget: &ScanBudget) -> Result<Option<DocumentKey>>;

    fn children(&self) -> Vec<&dyn NestedIterator> {
        Vec::new()
    }

    /// Attributes collected for the key returned last.
    fn document(&self) -> &Document;

    fn kind(&self) -> &'static str;

    /// Short, human-readable description of this node alone.
    fn describe(&self) -> String {
        self.kind().to_string()
    }
}

/// Formats a whole iterator tree on one line, e.g. `AND(COLOR==red, OR(...))`.
pub fn describe_tree(iter: &dyn NestedIterator) -> String {
    let children = iter.children();
    if children.is_empty() {
        return iter.describe();
    }
    let inner: Vec<String> = children.into_iter().map(describe_tree).collect();
    format!("{}({})", iter.describe(), inner.join(", "))
}

/// The next key a leaf will return, together with its attributes.
#[derive(Debug, Clone)]
pub(crate) struct Head {
    pub key: DocumentKey,
    pub document: Document,
}

impl Head {
    pub fn new(key: DocumentKey, document: Document) -> Head {
        Head { key, document }
    }

    pub fn reaches(head: &Option<Head>, min: &DocumentKey) -> bool {
        head.as_ref().is_some_and(|h| h.key >= *min)
    }
}
