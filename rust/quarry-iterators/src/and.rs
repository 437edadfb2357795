use quarry_arithmetic::Document;
use quarry_common::{
    Result, ScanBudget,
    error::{Error, PlanningErrorCode},
};
use quarry_source::DocumentKey;

use crate::iterator::{Head, NestedIterator};

/// A child together with the key it returned last and the parent has not
/// consumed yet.
pub(crate) struct Child {
    pub iter: Box<dyn NestedIterator>,
    pub current: Option<DocumentKey>,
}

impl Child {
    pub fn new(iter: Box<dyn NestedIterator>) -> Child {
        Child {
            iter,
            current: None,
        }
    }

    pub fn start(&mut self, budget: &ScanBudget) -> Result<()> {
        self.iter.initialize(budget)?;
        self.current = self.iter.next(budget)?;
        Ok(())
    }

    pub fn advance(&mut self, budget: &ScanBudget) -> Result<()> {
        self.current = self.iter.next(budget)?;
        Ok(())
    }

    /// Moves forward to `min` unless already there.
    pub fn catch_up(&mut self, min: &DocumentKey, budget: &ScanBudget) -> Result<()> {
        if self.current.as_ref().is_some_and(|k| k < min) {
            self.current = self.iter.move_to(min, budget)?;
        }
        Ok(())
    }
}

/// Sorted-merge intersection.
///
/// Every include must reach the same key for it to be returned; the AND
/// ends as soon as any include is exhausted. Excludes are only ever moved to
/// keys the includes agreed on and drop those they also contain.
pub struct AndIterator {
    includes: Vec<Child>,
    excludes: Vec<Child>,
    head: Option<Head>,
    document: Document,
}

impl AndIterator {
    pub fn new(
        includes: Vec<Box<dyn NestedIterator>>,
        excludes: Vec<Box<dyn NestedIterator>>,
    ) -> Result<AndIterator> {
        if includes.is_empty() {
            return Err(Error::planning(
                PlanningErrorCode::EmptyIntersection,
                "an intersection needs at least one positive child",
            ));
        }
        Ok(AndIterator {
            includes: includes.into_iter().map(Child::new).collect(),
            excludes: excludes.into_iter().map(Child::new).collect(),
            head: None,
            document: Document::new(),
        })
    }

    pub fn include_count(&self) -> usize {
        self.includes.len()
    }

    pub fn exclude_count(&self) -> usize {
        self.excludes.len()
    }

    /// Advances the includes until they converge on a key no exclude holds.
    fn find_match(&mut self, budget: &ScanBudget) -> Result<()> {
        self.head = None;
        loop {
            budget.check("intersecting iterators")?;
            let mut target: Option<&DocumentKey> = None;
            for child in &self.includes {
                match &child.current {
                    None => return Ok(()),
                    Some(key) if target.is_none_or(|t| key > t) => target = Some(key),
                    Some(_) => {}
                }
            }
            let Some(target) = target.cloned() else {
                return Ok(());
            };

            let mut converged = true;
            for child in &mut self.includes {
                child.catch_up(&target, budget)?;
                match &child.current {
                    None => return Ok(()),
                    Some(key) if *key != target => converged = false,
                    Some(_) => {}
                }
            }
            if !converged {
                continue;
            }

            if self.is_excluded(&target, budget)? {
                log::trace!("{target} excluded");
                self.includes[0].advance(budget)?;
                continue;
            }

            let mut document = Document::new();
            for child in &self.includes {
                document.merge(child.iter.document().clone());
            }
            self.head = Some(Head::new(target, document));
            return Ok(());
        }
    }

    fn is_excluded(&mut self, key: &DocumentKey, budget: &ScanBudget) -> Result<bool> {
        for child in &mut self.excludes {
            child.catch_up(key, budget)?;
            if child.current.as_ref() == Some(key) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl NestedIterator for AndIterator {
    fn initialize(&mut self, budget: &ScanBudget) -> Result<()> {
        for child in self.includes.iter_mut().chain(self.excludes.iter_mut()) {
            child.start(budget)?;
        }
        self.find_match(budget)
    }

    fn has_next(&self) -> bool {
        self.head.is_some()
    }

    fn next(&mut self, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        let Some(head) = self.head.take() else {
            return Ok(None);
        };
        self.document = head.document;
        self.includes[0].advance(budget)?;
        self.find_match(budget)?;
        Ok(Some(head.key))
    }

    fn move_to(&mut self, min: &DocumentKey, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        if self.head.is_some() && !Head::reaches(&self.head, min) {
            for child in &mut self.includes {
                child.catch_up(min, budget)?;
            }
            self.find_match(budget)?;
        }
        self.next(budget)
    }

    fn children(&self) -> Vec<&dyn NestedIterator> {
        self.includes
            .iter()
            .chain(self.excludes.iter())
            .map(|c| c.iter.as_ref())
            .collect()
    }

    fn document(&self) -> &Document {
        &self.document
    }

    fn kind(&self) -> &'static str {
        "and"
    }

    fn describe(&self) -> String {
        if self.excludes.is_empty() {
            "AND".to_string()
        } else {
            format!("AND[{} excluded]", self.excludes.len())
        }
    }
}
