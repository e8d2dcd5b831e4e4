//! Integration tests for tag interning and entity ids
//!
//! Tests that tag names map to stable ids and that entity ids order and display predictably.

use tagtable_foundation::{EntityId, Interner};

// =============================================================================
// Interner
// =============================================================================

#[test]
fn interning_is_idempotent() {
    let mut interner = Interner::new();
    let a = interner.intern_tag("alive");
    let again = interner.intern_tag("alive");

    assert_eq!(a, again);
    assert_eq!(interner.tag_count(), 1);
}

#[test]
fn distinct_names_get_distinct_ids() {
    let mut interner = Interner::new();
    let a = interner.intern_tag("a");
    let b = interner.intern_tag("b");

    assert_ne!(a, b);
    assert_eq!(interner.get_tag(a), Some("a"));
    assert_eq!(interner.get_tag(b), Some("b"));
}

#[test]
fn lookup_does_not_intern() {
    let mut interner = Interner::new();
    assert_eq!(interner.lookup("ghost"), None);
    assert_eq!(interner.tag_count(), 0);

    let ghost = interner.intern_tag("ghost");
    assert_eq!(interner.lookup("ghost"), Some(ghost));
}

#[test]
fn separate_interners_are_independent() {
    let mut first = Interner::new();
    let mut second = Interner::new();
    first.intern_tag("x");
    let y_first = first.intern_tag("y");
    let y_second = second.intern_tag("y");

    assert_ne!(y_first.index(), y_second.index());
    assert_eq!(second.lookup("x"), None);
}

// =============================================================================
// EntityId
// =============================================================================

#[test]
fn entity_ids_order_by_index() {
    let mut ids = vec![EntityId::new(3), EntityId::new(1), EntityId::new(2)];
    ids.sort();
    assert_eq!(ids, vec![EntityId::new(1), EntityId::new(2), EntityId::new(3)]);
}

#[test]
fn entity_id_next_is_monotonic() {
    let id = EntityId::new(41);
    assert_eq!(id.next(), EntityId::new(42));
    assert!(id.next() > id);
}

#[test]
fn entity_id_formats() {
    let id = EntityId::new(5);
    assert_eq!(id.to_string(), "Entity(5)");
    assert_eq!(format!("{id:?}"), "EntityId(5)");
}
