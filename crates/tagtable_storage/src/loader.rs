//! Declarative loading of plain-data descriptors into entities.
//!
//! A descriptor is a [`Value::Map`]. Its `tags` vector is staged on the
//! entity, nested maps that carry their own `tags` become owned child
//! entities, and strings starting with `$` or `@` are reference paths that
//! are resolved once the whole descriptor tree exists:
//!
//! - `$.a.b` starts at the world's root entity;
//! - `@.a.b` starts at the entity the outermost `set` call loaded into.
//!
//! Each path segment indexes the current value: an entity by data key (or,
//! failing that, by child name), a map by key, a vector by position.
//! `items[0]` is accepted as a synonym for `items.0`.

use std::fmt;
use std::sync::Arc;

use tagtable_foundation::{EntityId, Error, ErrorContext, LtMap, LtVec, Result, Value};

use crate::entity::is_reserved;
use crate::world::World;

/// One step from an entity's data root towards a value.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Key(Arc<str>),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A reference string met while loading.
#[derive(Clone, Debug)]
struct PendingReference {
    /// Entity whose data holds the slot.
    entity: EntityId,
    /// Where in that entity's data the resolved value goes.
    slot: Vec<Segment>,
    path: Arc<str>,
}

/// State shared by one outermost `set` call.
struct LoadContext {
    /// Base for `@` paths.
    base: EntityId,
    references: Vec<PendingReference>,
}

/// Outcome of walking a reference path.
enum Lookup {
    Found(Value),
    /// The path reaches a slot whose own reference is not resolved yet.
    Blocked,
    Missing,
}

fn unresolved(reference: &PendingReference) -> Error {
    let context = reference.slot.iter().fold(
        ErrorContext::new().with_source(reference.entity.to_string()),
        |context, segment| context.with_frame(segment.to_string()),
    );
    Error::unresolved_reference(&*reference.path).with_context(context)
}

fn is_unset(value: Option<&Value>) -> bool {
    value.is_none_or(Value::is_nil)
}

fn is_reference(text: &str) -> bool {
    text.starts_with('$') || text.starts_with('@')
}

fn extend(slot: &[Segment], segment: Segment) -> Vec<Segment> {
    let mut next = slot.to_vec();
    next.push(segment);
    next
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.')
        .flat_map(|part| part.split(['[', ']']))
        .filter(|segment| !segment.is_empty())
}

fn tag_names(value: &Value) -> Result<Vec<&str>> {
    let Some(items) = value.as_vec() else {
        return Err(Error::invalid_descriptor(format!(
            "tags must be a vector of strings, found {value}"
        )));
    };
    items
        .iter()
        .map(|tag| {
            tag.as_str().ok_or_else(|| {
                Error::invalid_descriptor(format!("tag must be a string, found {tag}"))
            })
        })
        .collect()
}

/// Writes `value` at `slot` below `current`, creating containers as needed.
fn set_in(current: Option<&Value>, slot: &[Segment], value: Value) -> Value {
    let Some((head, rest)) = slot.split_first() else {
        return value;
    };
    match head {
        Segment::Key(key) => {
            let map = current.and_then(Value::as_map).cloned().unwrap_or_default();
            let inner = set_in(map.get(&**key), rest, value);
            Value::Map(map.insert(Arc::clone(key), inner))
        }
        Segment::Index(index) => {
            let items = current.and_then(Value::as_vec).cloned().unwrap_or_default();
            let inner = set_in(items.get(*index), rest, value);
            if *index < items.len() {
                Value::Vec(items.update(*index, inner).unwrap_or(items))
            } else {
                Value::Vec(items.push_back(inner))
            }
        }
    }
}

impl World {
    /// Loads a descriptor into an entity.
    ///
    /// With `overwrite` false, values already present on the entity are kept.
    /// Tags are staged and become visible after [`apply`](Self::apply).
    ///
    /// ```
    /// use tagtable_foundation::Value;
    /// use tagtable_storage::World;
    ///
    /// let mut world = World::new();
    /// let hero = world.child("hero", Some(world.root())).unwrap();
    /// let descriptor = Value::map([
    ///     ("tags", Value::from(vec!["player"])),
    ///     ("hp", Value::Int(10)),
    ///     ("sword", Value::map([("tags", Value::from(vec!["item"]))])),
    ///     ("wielding", Value::from("@.sword")),
    /// ]);
    /// world.set(hero, &descriptor, true).unwrap();
    ///
    /// let sword = world.get(hero, "sword").and_then(Value::as_entity).unwrap();
    /// assert_eq!(world.get(hero, "wielding"), Some(&Value::EntityRef(sword)));
    /// assert_eq!(world.owner(sword), Some(hero));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is unknown, the descriptor has the
    /// wrong shape, or a reference path cannot be resolved.
    pub fn set(&mut self, entity: EntityId, descriptor: &Value, overwrite: bool) -> Result<()> {
        if !self.exists(entity) {
            return Err(Error::entity_not_found(entity));
        }

        let mut cx = LoadContext {
            base: entity,
            references: Vec::new(),
        };
        self.load_entity(&mut cx, entity, descriptor, overwrite)?;

        let count = cx.references.len();
        self.resolve_references(cx)?;
        tracing::debug!(%entity, references = count, "loaded descriptor");
        Ok(())
    }

    /// Creates an entity and loads a descriptor into it.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`child`](Self::child) and [`set`](Self::set).
    pub fn child_with(
        &mut self,
        name: impl Into<Arc<str>>,
        owner: Option<EntityId>,
        descriptor: &Value,
    ) -> Result<EntityId> {
        let id = self.child(name, owner)?;
        self.set(id, descriptor, true)?;
        Ok(id)
    }

    /// Removes the keys a descriptor names from an entity.
    ///
    /// A key whose value is an owned child entity, unset with a map, destroys
    /// that child. Entities nested deeper (in vectors or maps) are unset
    /// recursively with the pattern found at their position instead. A
    /// `tags` vector stages removal of those tags.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is unknown or the descriptor has the
    /// wrong shape.
    pub fn unset(&mut self, entity: EntityId, descriptor: &Value) -> Result<()> {
        if !self.exists(entity) {
            return Err(Error::entity_not_found(entity));
        }
        let Some(entries) = descriptor.as_map() else {
            return Err(Error::invalid_descriptor(format!(
                "expected a map, found {descriptor}"
            )));
        };

        for (key, pattern) in entries.iter() {
            if is_reserved(key) {
                continue;
            }
            if &**key == "tags" {
                for tag in tag_names(pattern)? {
                    self.stage_remove(entity, tag);
                }
                continue;
            }

            let Some(current) = self.get(entity, key).cloned() else {
                continue;
            };
            self.release(entity, &current, pattern)?;
            let data = self.data(entity).cloned().unwrap_or_default().remove(&**key);
            self.replace_data(entity, data)?;
        }

        Ok(())
    }

    /// Handles the value stored directly under an unset key.
    ///
    /// A map pattern over an owned child entity destroys it. Vector and map
    /// patterns descend into the stored value instead.
    fn release(&mut self, owner: EntityId, current: &Value, pattern: &Value) -> Result<()> {
        match (current, pattern) {
            (Value::EntityRef(child), Value::Map(_)) => {
                if self.owner(*child) == Some(owner) {
                    self.destroy(*child)?;
                }
                Ok(())
            }
            _ => self.release_nested(current, pattern),
        }
    }

    /// Below the top level, entities reached by a map pattern only lose the
    /// keys the pattern names.
    fn release_nested(&mut self, current: &Value, pattern: &Value) -> Result<()> {
        match (current, pattern) {
            (Value::EntityRef(child), Value::Map(_)) if self.exists(*child) => {
                self.unset(*child, pattern)?;
            }
            (Value::Vec(items), Value::Vec(patterns)) => {
                for (item, pattern) in items.iter().zip(patterns.iter()) {
                    self.release_nested(item, pattern)?;
                }
            }
            (Value::Map(inner), Value::Map(patterns)) => {
                for (key, pattern) in patterns.iter() {
                    if let Some(item) = inner.get(&**key) {
                        self.release_nested(item, pattern)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn load_entity(
        &mut self,
        cx: &mut LoadContext,
        entity: EntityId,
        descriptor: &Value,
        overwrite: bool,
    ) -> Result<()> {
        let Some(entries) = descriptor.as_map() else {
            return Err(Error::invalid_descriptor(format!(
                "expected a map for {entity}, found {descriptor}"
            ))
            .with_context(ErrorContext::new().with_source(entity.to_string())));
        };

        for (key, value) in entries.iter() {
            if is_reserved(key) {
                continue;
            }
            if &**key == "tags" {
                for tag in tag_names(value)? {
                    self.stage_add(entity, tag);
                }
                continue;
            }

            let existing = self.get(entity, key).cloned();
            let slot = [Segment::Key(Arc::clone(key))];
            if let Some(loaded) = self.load_entry(cx, entity, &slot, existing, value, overwrite)? {
                let data = self
                    .data(entity)
                    .cloned()
                    .unwrap_or_default()
                    .insert(Arc::clone(key), loaded);
                self.replace_data(entity, data)?;
            }
        }

        Ok(())
    }

    /// Loads one keyed entry. `$`-prefixed keys are copied verbatim.
    fn load_entry(
        &mut self,
        cx: &mut LoadContext,
        owner: EntityId,
        slot: &[Segment],
        existing: Option<Value>,
        source: &Value,
        overwrite: bool,
    ) -> Result<Option<Value>> {
        if let Some(Segment::Key(key)) = slot.last() {
            if key.starts_with('$') {
                let copy = overwrite || is_unset(existing.as_ref());
                return Ok(copy.then(|| source.clone()));
            }
        }
        self.load_value(cx, owner, slot, existing, source, overwrite)
    }

    /// Computes the value to store at `slot`, or `None` to leave it alone.
    fn load_value(
        &mut self,
        cx: &mut LoadContext,
        owner: EntityId,
        slot: &[Segment],
        existing: Option<Value>,
        source: &Value,
        overwrite: bool,
    ) -> Result<Option<Value>> {
        match source {
            Value::Vec(items) => {
                if !overwrite && !is_unset(existing.as_ref()) {
                    return Ok(None);
                }
                let mut loaded = LtVec::new();
                for (index, item) in items.iter().enumerate() {
                    let slot = extend(slot, Segment::Index(index));
                    let value = self.load_value(cx, owner, &slot, None, item, overwrite)?;
                    loaded = loaded.push_back(value.unwrap_or(Value::Nil));
                }
                Ok(Some(Value::Vec(loaded)))
            }

            Value::Map(entries) if entries.contains_key("tags") => {
                let child = match existing {
                    Some(Value::EntityRef(child)) if self.exists(child) => child,
                    previous => {
                        let name = slot.last().map(ToString::to_string).unwrap_or_default();
                        let child = self.child(name, Some(owner))?;
                        if let Some(previous @ Value::Map(_)) = previous {
                            self.load_entity(cx, child, &previous, true)?;
                        }
                        child
                    }
                };
                self.load_entity(cx, child, source, overwrite)?;
                Ok(Some(Value::EntityRef(child)))
            }

            Value::Map(entries) => {
                let mut merged = match existing {
                    Some(Value::EntityRef(child)) if self.exists(child) => {
                        self.load_entity(cx, child, source, overwrite)?;
                        return Ok(Some(Value::EntityRef(child)));
                    }
                    Some(Value::Map(map)) => map,
                    Some(ref other) if !other.is_nil() && !overwrite => return Ok(None),
                    _ => LtMap::new(),
                };
                for (key, value) in entries.iter() {
                    let current = merged.get(&**key).cloned();
                    if is_reserved(key) || (!overwrite && !is_unset(current.as_ref())) {
                        continue;
                    }
                    let slot = extend(slot, Segment::Key(Arc::clone(key)));
                    if let Some(loaded) =
                        self.load_entry(cx, owner, &slot, current, value, overwrite)?
                    {
                        merged = merged.insert(Arc::clone(key), loaded);
                    }
                }
                Ok(Some(Value::Map(merged)))
            }

            Value::String(text) if is_reference(text) => {
                cx.references.push(PendingReference {
                    entity: owner,
                    slot: slot.to_vec(),
                    path: Arc::clone(text),
                });
                // Placeholder keeps vector positions stable until resolution.
                Ok(Some(Value::Nil))
            }

            _ => Ok((overwrite || is_unset(existing.as_ref())).then(|| source.clone())),
        }
    }

    /// Resolves collected references, writing each into its slot.
    ///
    /// A path that walks into a slot still waiting for its own reference is
    /// retried after the other references of the pass, so chains resolve in
    /// dependency order. A path that finds nothing fails, and so does a
    /// chain that never settles (`a: "@.b", b: "@.a"`).
    fn resolve_references(&mut self, cx: LoadContext) -> Result<()> {
        let mut waiting = cx.references;

        while !waiting.is_empty() {
            let mut blocked = Vec::new();
            let before = waiting.len();

            for (position, reference) in waiting.iter().enumerate() {
                let others = waiting[position..].iter().chain(blocked.iter().copied());
                match self.lookup_path(&reference.path, cx.base, others) {
                    Lookup::Found(found) => {
                        self.write_slot(reference.entity, &reference.slot, found)?;
                    }
                    Lookup::Blocked => blocked.push(reference),
                    Lookup::Missing => return Err(unresolved(reference)),
                }
            }

            if blocked.len() == before {
                return Err(unresolved(blocked[0]));
            }
            waiting = blocked.into_iter().cloned().collect();
        }
        Ok(())
    }

    /// Resolves a `$` or `@` path. `base` anchors `@` paths.
    #[must_use]
    pub fn resolve_path(&self, path: &str, base: EntityId) -> Option<Value> {
        match self.lookup_path(path, base, std::iter::empty()) {
            Lookup::Found(value) => Some(value),
            Lookup::Blocked | Lookup::Missing => None,
        }
    }

    /// Walks `path`, reporting `Blocked` as soon as it reaches a slot one of
    /// `waiting` still has to fill.
    fn lookup_path<'r>(
        &self,
        path: &str,
        base: EntityId,
        waiting: impl Iterator<Item = &'r PendingReference> + Clone,
    ) -> Lookup {
        let (start, rest) = match path.strip_prefix('$') {
            Some(rest) => (self.root(), rest),
            None => match path.strip_prefix('@') {
                Some(rest) => (base, rest),
                None => return Lookup::Missing,
            },
        };
        if !self.exists(start) {
            return Lookup::Missing;
        }

        let mut current = Value::EntityRef(start);
        let mut location: Option<(EntityId, Vec<Segment>)> = None;
        for segment in path_segments(rest) {
            let Some((next, next_location)) = self.step(&current, location.as_ref(), segment)
            else {
                return Lookup::Missing;
            };
            if let Some((entity, slot)) = &next_location {
                let pending = waiting
                    .clone()
                    .any(|reference| reference.entity == *entity && reference.slot == *slot);
                if pending {
                    return Lookup::Blocked;
                }
            }
            current = next;
            location = next_location;
        }
        Lookup::Found(current)
    }

    /// Takes one path step. The location tracks which entity data slot the
    /// value was read from; stepping onto a child entity resets it.
    fn step(
        &self,
        current: &Value,
        location: Option<&(EntityId, Vec<Segment>)>,
        segment: &str,
    ) -> Option<(Value, Option<(EntityId, Vec<Segment>)>)> {
        match current {
            Value::EntityRef(id) => {
                if let Some(value) = self.get(*id, segment) {
                    let slot = vec![Segment::Key(Arc::from(segment))];
                    return Some((value.clone(), Some((*id, slot))));
                }
                self.children(*id)
                    .iter()
                    .copied()
                    .find(|&child| self.name(child) == Some(segment))
                    .map(|child| (Value::EntityRef(child), None))
            }
            Value::Map(map) => {
                let value = map.get(segment)?.clone();
                let key = Segment::Key(Arc::from(segment));
                let location = location.map(|(entity, slot)| (*entity, extend(slot, key)));
                Some((value, location))
            }
            Value::Vec(items) => {
                let index = segment.parse::<usize>().ok()?;
                let value = items.get(index)?.clone();
                let location =
                    location.map(|(entity, slot)| (*entity, extend(slot, Segment::Index(index))));
                Some((value, location))
            }
            _ => None,
        }
    }

    fn write_slot(&mut self, entity: EntityId, slot: &[Segment], value: Value) -> Result<()> {
        let Some((Segment::Key(key), rest)) = slot.split_first() else {
            return Err(Error::internal("reference slot must start at a data key"));
        };
        let data = self.data(entity).cloned().unwrap_or_default();
        let updated = set_in(data.get(&**key), rest, value);
        self.replace_data(entity, data.insert(Arc::clone(key), updated))
    }
}
