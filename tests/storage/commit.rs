//! Integration tests for the two-pass commit
//!
//! Every entity moves before any subscriber runs, subscribers see settled
//! membership, and anything they stage is drained before `apply` returns.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use tagtable::{EntityId, ErrorKind, World, WorldConfig};

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

// =============================================================================
// Settled Membership
// =============================================================================

#[test]
fn migration_emits_one_removed_and_one_added() {
    let mut world = World::new();
    let e = world.child("e", None).unwrap();
    world.add(e, "A").unwrap();
    world.apply().unwrap();

    let both = world.query(["A", "B"]);
    let only_a = world.query(["A", "!B"]);
    let events = log();

    let sink = events.clone();
    world
        .subscribe_added(both, move |world, id| {
            let in_both = world.view(both).unwrap().iter().any(|m| m == id);
            let in_only_a = world.view(only_a).unwrap().iter().any(|m| m == id);
            sink.borrow_mut().push(format!(
                "added has_b={} in_both={in_both} in_only_a={in_only_a}",
                world.has(id, "B")
            ));
        })
        .unwrap();
    let sink = events.clone();
    world
        .subscribe_removed(only_a, move |world, id| {
            let in_only_a = world.view(only_a).unwrap().iter().any(|m| m == id);
            sink.borrow_mut().push(format!(
                "removed has_b={} in_only_a={in_only_a}",
                world.has(id, "B")
            ));
        })
        .unwrap();

    world.add(e, "B").unwrap();
    let stats = world.apply().unwrap();

    assert_eq!(
        *events.borrow(),
        vec![
            "removed has_b=true in_only_a=false".to_string(),
            "added has_b=true in_both=true in_only_a=false".to_string(),
        ]
    );
    assert_eq!(stats.added, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.migrated, 1);
}

#[test]
fn callbacks_see_every_entity_moved() {
    let mut world = World::new();
    let first = world.child("first", None).unwrap();
    let second = world.child("second", None).unwrap();
    let marked = world.query(["marked"]);

    let observed = Rc::new(RefCell::new(Vec::new()));
    let sink = observed.clone();
    world
        .subscribe_added(marked, move |world, _| {
            sink.borrow_mut().push(world.view(marked).unwrap().len());
        })
        .unwrap();

    world.add(first, "marked").unwrap();
    world.add(second, "marked").unwrap();
    world.apply().unwrap();

    // Both callbacks ran after both entities had moved.
    assert_eq!(*observed.borrow(), vec![2, 2]);
}

#[test]
fn removed_is_emitted_before_added_per_entity() {
    let mut world = World::new();
    let e = world.child("e", None).unwrap();
    world.add(e, "idle").unwrap();
    world.apply().unwrap();

    let idle = world.query(["idle"]);
    let busy = world.query(["busy"]);
    let events = log();

    let sink = events.clone();
    world
        .subscribe_removed(idle, move |_, _| sink.borrow_mut().push("left idle".into()))
        .unwrap();
    let sink = events.clone();
    world
        .subscribe_added(busy, move |_, _| sink.borrow_mut().push("became busy".into()))
        .unwrap();

    world.entity_mut(e).unwrap().remove("idle").add("busy").apply().unwrap();

    assert_eq!(*events.borrow(), vec!["left idle", "became busy"]);
}

// =============================================================================
// Re-entrant Staging
// =============================================================================

#[test]
fn callback_staging_is_drained_in_later_rounds() {
    let mut world = World::new();
    let e = world.child("e", None).unwrap();

    let wounded = world.query(["wounded"]);
    let fleeing = world.query(["fleeing"]);
    world
        .subscribe_added(wounded, |world, id| {
            world.add(id, "fleeing").unwrap();
        })
        .unwrap();
    let fled = Rc::new(RefCell::new(false));
    let sink = fled.clone();
    world
        .subscribe_added(fleeing, move |_, _| *sink.borrow_mut() = true)
        .unwrap();

    world.add(e, "wounded").unwrap();
    let stats = world.apply().unwrap();

    assert_eq!(stats.rounds, 2);
    assert!(world.has(e, "fleeing"));
    assert!(*fled.borrow());
    assert!(world.pending(e).is_none());
}

#[test]
fn nested_apply_defers_to_running_commit() {
    let mut world = World::new();
    let e = world.child("e", None).unwrap();
    let armed = world.query(["armed"]);

    world
        .subscribe_added(armed, |world, id| {
            world.add(id, "fired").unwrap();
            let nested = world.apply().unwrap();
            assert_eq!(nested.rounds, 0);
            assert!(!world.has(id, "fired"));
        })
        .unwrap();

    world.add(e, "armed").unwrap();
    world.apply().unwrap();
    assert!(world.has(e, "fired"));
}

#[test]
fn subscriber_registered_during_commit_is_kept() {
    let mut world = World::new();
    let a = world.child("a", None).unwrap();
    let b = world.child("b", None).unwrap();
    let q = world.query(["seen"]);

    let late = Rc::new(RefCell::new(Vec::new()));
    let sink = late.clone();
    let registered = Rc::new(RefCell::new(false));
    world
        .subscribe_added(q, move |world, _| {
            if !*registered.borrow() {
                *registered.borrow_mut() = true;
                let sink = sink.clone();
                world
                    .subscribe_removed(q, move |_, id| sink.borrow_mut().push(id))
                    .unwrap();
            }
        })
        .unwrap();

    world.add(a, "seen").unwrap();
    world.apply().unwrap();
    world.add(b, "seen").unwrap();
    world.remove(a, "seen").unwrap();
    world.apply().unwrap();

    assert_eq!(*late.borrow(), vec![a]);
}

#[test]
fn round_limit_stops_runaway_commits() {
    let mut world = World::with_config(WorldConfig::new().with_max_commit_rounds(3));
    let e = world.child("e", None).unwrap();

    let on = world.query(["blinker", "on"]);
    let off = world.query(["blinker", "!on"]);
    world
        .subscribe_added(on, |world, id| {
            world.remove(id, "on").unwrap();
        })
        .unwrap();
    world
        .subscribe_added(off, |world, id| {
            world.add(id, "on").unwrap();
        })
        .unwrap();

    world.add(e, "blinker").unwrap();
    let err = world.apply().unwrap_err();

    assert!(matches!(err.kind, ErrorKind::LimitExceeded(_)));
    assert!(world.pending(e).is_some());
}

#[test]
fn query_created_in_callback_is_seeded() {
    let mut world = World::new();
    let e = world.child("e", None).unwrap();
    let trigger = world.query(["trigger"]);

    let counts = Rc::new(RefCell::new(Vec::new()));
    let sink = counts.clone();
    world
        .subscribe_added(trigger, move |world, _| {
            let late = world.query(["trigger"]);
            let marked = world.query(["trigger", "marked"]);
            sink.borrow_mut()
                .push((late == trigger, world.view(marked).unwrap().len()));
        })
        .unwrap();

    world.add(e, "trigger").unwrap();
    world.apply().unwrap();

    assert_eq!(*counts.borrow(), vec![(true, 0)]);
}

// =============================================================================
// Property Tests
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Add(usize, &'static str),
    Remove(usize, &'static str),
    Apply,
}

fn op() -> impl Strategy<Value = Op> {
    let tag = prop::sample::select(vec!["a", "b", "c", "d"]);
    prop_oneof![
        (0usize..4, tag.clone()).prop_map(|(e, t)| Op::Add(e, t)),
        (0usize..4, tag).prop_map(|(e, t)| Op::Remove(e, t)),
        Just(Op::Apply),
    ]
}

proptest! {
    #[test]
    fn committed_tags_follow_set_algebra(ops in prop::collection::vec(op(), 0..60)) {
        let mut world = World::new();
        let ids: Vec<EntityId> = (0..4)
            .map(|i| world.child(format!("e{i}"), None).unwrap())
            .collect();
        let watched = world.query(["a", "!b"]);
        let mut model: Vec<std::collections::BTreeSet<&str>> = vec![Default::default(); 4];
        let mut staged = model.clone();

        for op in ops {
            match op {
                Op::Add(e, t) => {
                    world.add(ids[e], t).unwrap();
                    staged[e].insert(t);
                }
                Op::Remove(e, t) => {
                    world.remove(ids[e], t).unwrap();
                    staged[e].remove(t);
                }
                Op::Apply => {
                    world.apply().unwrap();
                    model = staged.clone();
                }
            }
            for (i, id) in ids.iter().enumerate() {
                let committed: Vec<&str> = model[i].iter().copied().collect();
                prop_assert_eq!(world.tags(*id), committed);
            }
        }

        world.apply().unwrap();
        let view = world.view(watched).unwrap();
        for (i, id) in ids.iter().enumerate() {
            let expected = staged[i].contains("a") && !staged[i].contains("b");
            prop_assert_eq!(view.iter().any(|m| m == *id), expected);
        }
    }
}
