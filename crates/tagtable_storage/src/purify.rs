//! Turning entity trees back into plain data.

use std::collections::HashSet;
use std::sync::Arc;

use tagtable_foundation::{EntityId, Error, LtMap, LtVec, Result, Value};

use crate::entity::is_reserved;
use crate::world::World;

impl World {
    /// Converts an entity and everything its data reaches into plain data.
    ///
    /// The result is a map with a `tags` vector (committed tags, sorted)
    /// followed by the user data. Entity references are inlined the first
    /// time they are met; later references to an already inlined entity are
    /// dropped from maps and become `nil` in vectors, which breaks cycles.
    ///
    /// # Errors
    ///
    /// Returns an error if `entity` is not an entity of this world.
    pub fn purify(&self, entity: EntityId) -> Result<Value> {
        if !self.exists(entity) {
            return Err(Error::entity_not_found(entity));
        }
        let mut seen = HashSet::new();
        Ok(self.purify_entity(entity, &mut seen))
    }

    fn purify_entity(&self, entity: EntityId, seen: &mut HashSet<EntityId>) -> Value {
        seen.insert(entity);

        let tags: LtVec<Value> = self.tags(entity).into_iter().map(Value::from).collect();
        let mut purified = LtMap::new().insert(Arc::from("tags"), Value::Vec(tags));

        if let Some(data) = self.data(entity) {
            for (key, value) in data.iter() {
                if is_reserved(key) {
                    continue;
                }
                if let Some(value) = self.purify_value(value, seen) {
                    purified = purified.insert(Arc::clone(key), value);
                }
            }
        }

        Value::Map(purified)
    }

    fn purify_value(&self, value: &Value, seen: &mut HashSet<EntityId>) -> Option<Value> {
        match value {
            Value::EntityRef(id) => {
                if seen.contains(id) || !self.exists(*id) {
                    None
                } else {
                    Some(self.purify_entity(*id, seen))
                }
            }
            Value::Vec(items) => Some(Value::Vec(
                items
                    .iter()
                    .map(|item| self.purify_value(item, seen).unwrap_or(Value::Nil))
                    .collect(),
            )),
            Value::Map(entries) => {
                let mut purified = LtMap::new();
                for (key, item) in entries.iter() {
                    if let Some(item) = self.purify_value(item, seen) {
                        purified = purified.insert(Arc::clone(key), item);
                    }
                }
                Some(Value::Map(purified))
            }
            other => Some(other.clone()),
        }
    }
}
