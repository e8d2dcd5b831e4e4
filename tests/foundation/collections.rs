//! Integration tests for persistent collections
//!
//! Tests LtVec and LtMap operations and structural sharing.

use tagtable_foundation::{LtMap, LtVec};

// =============================================================================
// LtVec
// =============================================================================

#[test]
fn vec_new_is_empty() {
    let v: LtVec<i32> = LtVec::new();
    assert!(v.is_empty());
    assert_eq!(v.len(), 0);
    assert_eq!(v.get(0), None);
}

#[test]
fn vec_push_back_keeps_original() {
    let v1 = LtVec::new().push_back(1);
    let v2 = v1.push_back(2);

    assert_eq!(v1.len(), 1);
    assert_eq!(v2.len(), 2);
    assert_eq!(v2.get(1), Some(&2));
}

#[test]
fn vec_update() {
    let v = LtVec::from_iter([1, 2, 3]);
    let updated = v.update(1, 20).unwrap();

    assert_eq!(v.get(1), Some(&2));
    assert_eq!(updated.get(1), Some(&20));
    assert!(v.update(3, 0).is_none());
}

#[test]
fn vec_iterates_in_order() {
    let v: LtVec<i32> = (1..=5).collect();
    let items: Vec<i32> = v.iter().copied().collect();
    assert_eq!(items, vec![1, 2, 3, 4, 5]);

    let mut total = 0;
    for item in &v {
        total += item;
    }
    assert_eq!(total, 15);
}

#[test]
fn vec_equality() {
    let a: LtVec<i32> = (0..3).collect();
    let b = LtVec::new().push_back(0).push_back(1).push_back(2);
    assert_eq!(a, b);
    assert_ne!(a, b.push_back(3));
}

// =============================================================================
// LtMap
// =============================================================================

#[test]
fn map_new_is_empty() {
    let m: LtMap<String, i32> = LtMap::new();
    assert!(m.is_empty());
    assert_eq!(m.get("x"), None);
}

#[test]
fn map_insert_overwrites() {
    let m = LtMap::new().insert("a", 1);
    let m2 = m.insert("a", 2);

    assert_eq!(m.get(&"a"), Some(&1));
    assert_eq!(m2.get(&"a"), Some(&2));
    assert_eq!(m2.len(), 1);
}

#[test]
fn map_remove_keeps_original() {
    let m = LtMap::new().insert("a", 1).insert("b", 2);
    let removed = m.remove(&"a");

    assert!(m.contains_key(&"a"));
    assert!(!removed.contains_key(&"a"));
    assert_eq!(removed.len(), 1);
}

#[test]
fn map_remove_missing_is_noop() {
    let m = LtMap::new().insert("a", 1);
    assert_eq!(m.remove(&"zzz"), m);
}

#[test]
fn map_iterates_in_key_order() {
    let m: LtMap<i32, &str> = [(3, "c"), (1, "a"), (2, "b")].into_iter().collect();

    let keys: Vec<i32> = m.keys().copied().collect();
    let values: Vec<&str> = m.values().copied().collect();
    assert_eq!(keys, vec![1, 2, 3]);
    assert_eq!(values, vec!["a", "b", "c"]);
}

#[test]
fn map_large_structural_sharing() {
    let base: LtMap<u32, u32> = (0..1_000).map(|i| (i, i * 2)).collect();
    let changed = base.insert(500, 0);

    assert_eq!(base.get(&500), Some(&1_000));
    assert_eq!(changed.get(&500), Some(&0));
    assert_eq!(base.len(), changed.len());
}
