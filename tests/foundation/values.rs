//! Integration tests for Value types
//!
//! Tests Value variants, accessors, equality, display, and conversions.

use std::sync::Arc;

use tagtable_foundation::{EntityId, LtMap, LtVec, Value};

// =============================================================================
// Value Construction
// =============================================================================

#[test]
fn value_nil() {
    let v = Value::Nil;
    assert!(v.is_nil());
    assert_eq!(v.as_bool(), None);
}

#[test]
fn value_scalars_from_rust_types() {
    assert_eq!(Value::from(true), Value::Bool(true));
    assert_eq!(Value::from(7_i32), Value::Int(7));
    assert_eq!(Value::from(7_i64), Value::Int(7));
    assert_eq!(Value::from(0.5), Value::Float(0.5));
    assert_eq!(Value::from("hi"), Value::String(Arc::from("hi")));
    assert_eq!(Value::from(String::from("hi")), Value::from("hi"));
}

#[test]
fn value_entity_ref() {
    let id = EntityId::new(12);
    let v = Value::from(id);
    assert_eq!(v.as_entity(), Some(id));
    assert_eq!(v.as_int(), None);
}

#[test]
fn value_vec_from_entities() {
    let v = Value::from(vec![EntityId::new(1), EntityId::new(2)]);
    let items = v.as_vec().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items.get(1).and_then(Value::as_entity), Some(EntityId::new(2)));
}

// =============================================================================
// Maps
// =============================================================================

#[test]
fn value_map_lookup() {
    let v = Value::map([("tags", Value::from(vec!["a"])), ("hp", Value::Int(3))]);

    assert_eq!(v.get("hp"), Some(&Value::Int(3)));
    assert!(v.get("tags").and_then(Value::as_vec).is_some());
    assert_eq!(v.get("missing"), None);
}

#[test]
fn value_map_keys_are_ordered() {
    let v = Value::map([("z", 1), ("a", 2), ("m", 3)]);
    let keys: Vec<&str> = v.as_map().unwrap().keys().map(|k| &**k).collect();
    assert_eq!(keys, vec!["a", "m", "z"]);
}

#[test]
fn value_map_last_duplicate_wins() {
    let v = Value::map([("k", 1), ("k", 2)]);
    assert_eq!(v.get("k"), Some(&Value::Int(2)));
}

#[test]
fn nested_maps_compare_structurally() {
    let a = Value::map([("inner", Value::map([("x", 1)]))]);
    let b = Value::map([("inner", Value::map([("x", 1)]))]);
    let c = Value::map([("inner", Value::map([("x", 2)]))]);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

// =============================================================================
// Equality and Display
// =============================================================================

#[test]
fn int_and_float_are_distinct() {
    assert_ne!(Value::Int(1), Value::Float(1.0));
}

#[test]
fn nan_equals_itself() {
    let v = Value::Float(f64::NAN);
    assert_eq!(v.clone(), v);
}

#[test]
fn display_formats() {
    assert_eq!(Value::Nil.to_string(), "nil");
    assert_eq!(Value::from("text").to_string(), "text");
    assert_eq!(Value::from(EntityId::new(3)).to_string(), "Entity(3)");
    assert_eq!(Value::from(vec![1, 2]).to_string(), "[1 2]");
    assert_eq!(Value::map([("a", 1), ("b", 2)]).to_string(), "{a 1, b 2}");
}

#[test]
fn debug_quotes_strings() {
    assert_eq!(format!("{:?}", Value::from("x")), "\"x\"");
}

#[test]
fn composite_values_share_structure() {
    let items: LtVec<Value> = (0..100).map(Value::Int).collect();
    let v = Value::Vec(items.clone());
    let w = Value::Vec(items.push_back(Value::Nil));

    assert_eq!(v.as_vec().unwrap().len(), 100);
    assert_eq!(w.as_vec().unwrap().len(), 101);

    let map: LtMap<Arc<str>, Value> = LtMap::new().insert("k".into(), v);
    assert_eq!(Value::Map(map).get("k").and_then(Value::as_vec).map(LtVec::len), Some(100));
}
