//! Entity records and the hierarchy between them.
//!
//! The `EntityTable` allocates ids monotonically and never reuses them, so a
//! record stays addressable for the lifetime of the world even after the
//! entity has been destroyed.

// Allow u64 to usize casts - we target 64-bit systems
#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;

use tagtable_foundation::{EntityId, Error, LtMap, Result, Value};

use crate::archetype::ArchetypeId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Keys the loader and purifier treat as entity internals rather than data.
pub const RESERVED_KEYS: &[&str] = &["archetype", "children", "id", "name", "owner"];

/// Returns true if `key` names an entity internal.
#[must_use]
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Plain record for one entity. Behaviour lives on `World`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityRecord {
    id: EntityId,
    name: Arc<str>,
    /// Committed archetype. Staged changes live in the graph.
    archetype: ArchetypeId,
    owner: Option<EntityId>,
    children: Vec<EntityId>,
    data: LtMap<Arc<str>, Value>,
}

impl EntityRecord {
    /// Returns the entity id.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the committed archetype.
    #[must_use]
    pub fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    /// Returns the owning entity, if any.
    #[must_use]
    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    /// Returns owned children in creation order.
    #[must_use]
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Returns the user data.
    #[must_use]
    pub fn data(&self) -> &LtMap<Arc<str>, Value> {
        &self.data
    }
}

/// Allocates entities and tracks their records.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityTable {
    records: Vec<EntityRecord>,
}

impl EntityTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new entity in `archetype`, linked under `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if `owner` is not an entity of this table.
    pub fn spawn(
        &mut self,
        name: impl Into<Arc<str>>,
        owner: Option<EntityId>,
        archetype: ArchetypeId,
    ) -> Result<EntityId> {
        if let Some(owner) = owner {
            self.validate(owner)?;
        }

        let id = self.allocate(name, archetype);
        if let Some(owner) = owner {
            self.records[id.index() as usize].owner = Some(owner);
            self.records[owner.index() as usize].children.push(id);
        }

        Ok(id)
    }

    /// Allocates a new unowned entity in `archetype`.
    pub fn allocate(&mut self, name: impl Into<Arc<str>>, archetype: ArchetypeId) -> EntityId {
        let id = EntityId::new(self.records.len() as u64);
        self.records.push(EntityRecord {
            id,
            name: name.into(),
            archetype,
            owner: None,
            children: Vec::new(),
            data: LtMap::new(),
        });
        id
    }

    /// Checks if an entity was ever allocated here.
    #[must_use]
    pub fn exists(&self, id: EntityId) -> bool {
        (id.index() as usize) < self.records.len()
    }

    /// Validates that an entity was allocated here.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::EntityNotFound`](tagtable_foundation::ErrorKind::EntityNotFound)
    /// for ids this table never handed out.
    pub fn validate(&self, id: EntityId) -> Result<()> {
        if self.exists(id) {
            Ok(())
        } else {
            Err(Error::entity_not_found(id))
        }
    }

    /// Gets a record.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.records.get(id.index() as usize)
    }

    /// Gets a record, failing for unknown ids.
    ///
    /// # Errors
    ///
    /// Returns an error for ids this table never handed out.
    pub fn try_get(&self, id: EntityId) -> Result<&EntityRecord> {
        self.get(id).ok_or_else(|| Error::entity_not_found(id))
    }

    fn get_mut(&mut self, id: EntityId) -> Result<&mut EntityRecord> {
        self.records
            .get_mut(id.index() as usize)
            .ok_or_else(|| Error::entity_not_found(id))
    }

    /// Repoints the committed archetype of an entity.
    pub(crate) fn relocate(&mut self, id: EntityId, archetype: ArchetypeId) {
        if let Some(record) = self.records.get_mut(id.index() as usize) {
            record.archetype = archetype;
        }
    }

    /// Removes an entity from its owner's child list and clears the owner.
    ///
    /// # Errors
    ///
    /// Returns an error for ids this table never handed out.
    pub fn detach(&mut self, id: EntityId) -> Result<()> {
        let Some(owner) = self.get_mut(id)?.owner.take() else {
            return Ok(());
        };
        let siblings = &mut self.get_mut(owner)?.children;
        if let Some(pos) = siblings.iter().position(|&c| c == id) {
            siblings.remove(pos);
        }
        Ok(())
    }

    /// Replaces the user data of an entity.
    ///
    /// # Errors
    ///
    /// Returns an error for ids this table never handed out.
    pub fn set_data(&mut self, id: EntityId, data: LtMap<Arc<str>, Value>) -> Result<()> {
        self.get_mut(id)?.data = data;
        Ok(())
    }

    /// Returns the number of entities ever allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing was allocated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over all records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.iter()
    }
}
