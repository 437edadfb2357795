use std::{collections::BTreeSet, sync::Arc};

use quarry_sorted_set::{ExternalSortedSet, InMemoryHandlerFactory, LocalFileHandlerFactory};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
struct Posting {
    row: String,
    uid: String,
    value: String,
}

fn posting(rng: &mut fastrand::Rng) -> Posting {
    Posting {
        row: format!("2024010{}_{}", rng.u8(1..4), rng.u8(0..3)),
        uid: format!("uid.{:04}", rng.u16(0..500)),
        value: ["red", "blue", "green", "a\0b"][rng.usize(0..4)].to_string(),
    }
}

#[test]
fn test_round_trip_matches_btree_set_on_disk() {
    let factory = Arc::new(LocalFileHandlerFactory::temporary().unwrap());
    let mut set = ExternalSortedSet::with_persist_threshold(factory.clone(), 64).unwrap();
    let mut expected = BTreeSet::new();
    let mut rng = fastrand::Rng::with_seed(0x5eed);

    for _ in 0..1000 {
        let p = posting(&mut rng);
        expected.insert(p.clone());
        set.add(p).unwrap();
    }
    assert!(set.partition_count() >= 2);

    let actual: Vec<Posting> = set.iter().unwrap().map(|p| p.unwrap()).collect();
    let expected: Vec<Posting> = expected.into_iter().collect();
    assert_eq!(actual, expected);
    assert_eq!(set.len().unwrap(), expected.len());
    assert_eq!(set.first(), expected.first());
    assert_eq!(set.last(), expected.last());
}

#[test]
fn test_add_is_idempotent() {
    let factory = Arc::new(InMemoryHandlerFactory::new());
    let mut set = ExternalSortedSet::with_persist_threshold(factory, 4).unwrap();
    let mut rng = fastrand::Rng::with_seed(7);
    let items: Vec<Posting> = (0..50).map(|_| posting(&mut rng)).collect();
    set.add_all(items.iter().cloned()).unwrap();

    let size = set.len().unwrap();
    let order: Vec<Posting> = set.iter().unwrap().map(|p| p.unwrap()).collect();

    for item in items.iter().take(10) {
        set.add(item.clone()).unwrap();
    }
    assert_eq!(set.len().unwrap(), size);
    let again: Vec<Posting> = set.iter().unwrap().map(|p| p.unwrap()).collect();
    assert_eq!(again, order);
}

#[test]
fn test_mutations_across_partitions() {
    let factory = Arc::new(InMemoryHandlerFactory::new());
    let mut set = ExternalSortedSet::with_persist_threshold(factory.clone(), 16).unwrap();
    let mut expected = BTreeSet::new();
    let mut rng = fastrand::Rng::with_seed(42);
    for _ in 0..200 {
        let value = rng.u32(0..1000);
        expected.insert(value);
        set.add(value).unwrap();
    }

    let doomed: Vec<u32> = expected.iter().copied().step_by(3).collect();
    set.remove_all(doomed.iter()).unwrap();
    for d in &doomed {
        expected.remove(d);
    }

    let keep: BTreeSet<u32> = expected.iter().copied().filter(|v| v % 2 == 0).collect();
    set.retain_all(&keep).unwrap();

    let actual: Vec<u32> = set.iter().unwrap().map(|v| v.unwrap()).collect();
    assert_eq!(actual, keep.iter().copied().collect::<Vec<_>>());
    assert_eq!(set.len().unwrap(), keep.len());
    for v in &keep {
        assert!(set.contains(v).unwrap());
    }
    for d in doomed.iter().take(5) {
        assert!(!set.contains(d).unwrap());
    }
}
