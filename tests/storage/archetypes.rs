//! Integration tests for archetype identity and reuse

use tagtable::World;

// =============================================================================
// Canonical Identity
// =============================================================================

#[test]
fn same_tag_set_shares_archetype() {
    let mut world = World::new();
    let a = world.child("a", None).unwrap();
    let b = world.child("b", None).unwrap();

    world.add(a, "b").unwrap();
    world.apply().unwrap();
    let archetypes_after_first = world.graph().len();

    world.add(b, "b").unwrap();
    world.apply().unwrap();

    assert_eq!(world.archetype_of(a), world.archetype_of(b));
    assert_eq!(world.graph().len(), archetypes_after_first);
}

#[test]
fn removing_a_tag_lands_on_existing_archetype() {
    let mut world = World::new();
    let other = world.child("other", None).unwrap();
    world.add(other, "b").unwrap();
    world.apply().unwrap();
    let b_only = world.archetype_of(other);

    let x = world.child("x", None).unwrap();
    world.entity_mut(x).unwrap().add("a").add("b").apply().unwrap();
    let archetypes = world.graph().len();

    world.remove(x, "a").unwrap();
    world.apply().unwrap();

    assert_eq!(world.tags(x), vec!["b"]);
    assert_eq!(world.archetype_of(x), b_only);
    assert_eq!(world.graph().len(), archetypes);
}

#[test]
fn insertion_order_does_not_matter() {
    let mut world = World::new();
    let first = world.child("first", None).unwrap();
    let second = world.child("second", None).unwrap();

    world.entity_mut(first).unwrap().add("a").add("b");
    world.entity_mut(second).unwrap().add("b").add("a");
    world.apply().unwrap();

    assert_eq!(world.archetype_of(first), world.archetype_of(second));
    assert_eq!(world.tags(first), vec!["a", "b"]);
}

#[test]
fn archetype_keys_are_sorted_names() {
    let mut world = World::new();
    let e = world.child("e", None).unwrap();
    world.entity_mut(e).unwrap().add("zeta").add("alpha").apply().unwrap();

    let archetype = world.graph().archetype(world.archetype_of(e).unwrap());
    assert_eq!(archetype.key(world.interner()), "alpha|zeta");
    assert!(archetype.has_entity(e));
}

#[test]
fn root_archetype_is_empty_set() {
    let world = World::new();
    let root = world.graph().archetype(world.graph().root());

    assert!(root.tags().is_empty());
    assert_eq!(root.key(world.interner()), "");
    assert!(root.has_entity(world.root()));
}

// =============================================================================
// Retention and Edges
// =============================================================================

#[test]
fn emptied_archetypes_are_retained() {
    let mut world = World::new();
    let e = world.child("e", None).unwrap();

    world.add(e, "temp").unwrap();
    world.apply().unwrap();
    let temp = world.archetype_of(e).unwrap();

    world.remove(e, "temp").unwrap();
    world.apply().unwrap();

    assert!(world.graph().archetype(temp).is_empty());
    assert_eq!(world.archetype_of(e), Some(world.graph().root()));

    // Going back reuses the same node.
    world.add(e, "temp").unwrap();
    world.apply().unwrap();
    assert_eq!(world.archetype_of(e), Some(temp));
}

#[test]
fn edges_are_reciprocal() {
    let mut world = World::new();
    let e = world.child("e", None).unwrap();
    world.add(e, "lit").unwrap();
    world.apply().unwrap();

    let lit = world.interner().lookup("lit").unwrap();
    let root = world.graph().root();
    let target = world.graph().archetype(root).add_edge(lit).unwrap();

    assert_eq!(world.archetype_of(e), Some(target));
    assert_eq!(world.graph().archetype(target).remove_edge(lit), Some(root));
}

#[test]
fn each_entity_sits_in_exactly_one_archetype() {
    let mut world = World::new();
    let ids: Vec<_> = (0..20)
        .map(|i| world.child(format!("e{i}"), None).unwrap())
        .collect();
    for (i, &id) in ids.iter().enumerate() {
        if i % 2 == 0 {
            world.add(id, "even").unwrap();
        }
        if i % 3 == 0 {
            world.add(id, "third").unwrap();
        }
    }
    world.apply().unwrap();

    for &id in &ids {
        let holding = world
            .graph()
            .iter()
            .filter(|archetype| archetype.has_entity(id))
            .count();
        assert_eq!(holding, 1);
    }
}
