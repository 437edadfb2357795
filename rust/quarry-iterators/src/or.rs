use std::{cmp::Reverse, collections::BinaryHeap};

use quarry_arithmetic::Document;
use quarry_common::{Result, ScanBudget};
use quarry_source::DocumentKey;

use crate::iterator::{Head, NestedIterator};

/// Sorted-merge union over a min-heap of child positions.
///
/// All children positioned on the smallest key are consumed together, so a
/// key is returned once with the attributes of every child that holds it.
pub struct OrIterator {
    children: Vec<Box<dyn NestedIterator>>,
    heap: BinaryHeap<Reverse<(DocumentKey, usize)>>,
    head: Option<Head>,
    document: Document,
}

impl OrIterator {
    pub fn new(children: Vec<Box<dyn NestedIterator>>) -> OrIterator {
        OrIterator {
            heap: BinaryHeap::with_capacity(children.len()),
            children,
            head: None,
            document: Document::new(),
        }
    }

    fn push_next(&mut self, index: usize, budget: &ScanBudget) -> Result<()> {
        if let Some(key) = self.children[index].next(budget)? {
            self.heap.push(Reverse((key, index)));
        }
        Ok(())
    }

    fn find_head(&mut self, budget: &ScanBudget) -> Result<()> {
        self.head = None;
        let Some(Reverse((key, first))) = self.heap.pop() else {
            return Ok(());
        };
        let mut members = vec![first];
        loop {
            match self.heap.peek() {
                Some(Reverse((next, _))) if *next == key => {}
                _ => break,
            }
            if let Some(Reverse((_, index))) = self.heap.pop() {
                members.push(index);
            }
        }

        let mut document = Document::new();
        for &index in &members {
            document.merge(self.children[index].document().clone());
        }
        for index in members {
            self.push_next(index, budget)?;
        }
        self.head = Some(Head::new(key, document));
        Ok(())
    }
}

impl NestedIterator for OrIterator {
    fn initialize(&mut self, budget: &ScanBudget) -> Result<()> {
        self.heap.clear();
        for index in 0..self.children.len() {
            self.children[index].initialize(budget)?;
            self.push_next(index, budget)?;
        }
        self.find_head(budget)
    }

    fn has_next(&self) -> bool {
        self.head.is_some()
    }

    fn next(&mut self, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        budget.check("merging iterators")?;
        let Some(head) = self.head.take() else {
            return Ok(None);
        };
        self.document = head.document;
        self.find_head(budget)?;
        Ok(Some(head.key))
    }

    fn move_to(&mut self, min: &DocumentKey, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        if self.head.is_some() && !Head::reaches(&self.head, min) {
            let positions = std::mem::take(&mut self.heap).into_vec();
            for Reverse((key, index)) in positions {
                let key = if key < *min {
                    self.children[index].move_to(min, budget)?
                } else {
                    Some(key)
                };
                if let Some(key) = key {
                    self.heap.push(Reverse((key, index)));
                }
            }
            self.find_head(budget)?;
        }
        self.next(budget)
    }

    fn children(&self) -> Vec<&dyn NestedIterator> {
        self.children.iter().map(|c| c.as_ref()).collect()
    }

    fn document(&self) -> &Document {
        &self.document
    }

    fn kind(&self) -> &'static str {
        "or"
    }

    fn describe(&self) -> String {
        "OR".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AndIterator, SortedListIterator, describe_tree};

    fn list(uids: &[u32]) -> Box<dyn NestedIterator> {
        Box::new(SortedListIterator::from_keys(
            uids.iter()
                .map(|u| DocumentKey::from_parts("r", "t", format!("{u:03}"))),
        ))
    }

    fn drain(iter: &mut dyn NestedIterator) -> Vec<String> {
        let budget = ScanBudget::unlimited();
        iter.initialize(&budget).unwrap();
        let mut out = Vec::new();
        while let Some(k) = iter.next(&budget).unwrap() {
            out.push(k.pointer.uid);
        }
        out
    }

    #[test]
    fn test_union_without_duplicates() {
        let mut or = OrIterator::new(vec![list(&[1, 4, 9]), list(&[1, 2, 9]), list(&[]), list(&[3])]);
        assert_eq!(drain(&mut or), vec!["001", "002", "003", "004", "009"]);
    }

    #[test]
    fn test_move_to() {
        let mut or = OrIterator::new(vec![list(&[1, 4, 9]), list(&[2, 6])]);
        let budget = ScanBudget::unlimited();
        or.initialize(&budget).unwrap();
        let five = DocumentKey::from_parts("r", "t", "005");
        assert_eq!(or.move_to(&five, &budget).unwrap().unwrap().pointer.uid, "006");
        assert_eq!(or.next(&budget).unwrap().unwrap().pointer.uid, "009");
        assert_eq!(or.next(&budget).unwrap(), None);
    }

    #[test]
    fn test_nested_under_and() {
        let or = Box::new(OrIterator::new(vec![list(&[1, 3]), list(&[5, 7])]));
        let mut and = AndIterator::new(vec![or, list(&[3, 4, 5, 6])], vec![]).unwrap();
        assert_eq!(describe_tree(&and), "AND(OR(list, list), list)");
        assert_eq!(drain(&mut and), vec!["003", "005"]);
    }
}
