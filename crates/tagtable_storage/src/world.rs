//! The world: entity lifecycle, tag staging and the commit loop.
//!
//! `World` owns everything one store needs (interner, entity table,
//! archetype graph, live queries), so no state leaks between instances.
//! Tag mutations are staged through the graph and only become visible to
//! `has`, `tags` and queries after [`World::apply`].

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tagtable_foundation::{
    EntityId, Error, Interner, LtMap, Result, SemanticLimit, TagId, Value,
};

use crate::archetype::{ArchetypeGraph, ArchetypeId, InterestDiff, Transition};
use crate::config::WorldConfig;
use crate::entity::{EntityRecord, EntityTable, is_reserved};
use crate::query::{
    Filter, QueryEvent, QueryId, QueryIndex, QueryRegistry, QueryView, QueryWiring,
};

/// Summary of one [`World::apply`] call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CommitStats {
    /// Commit rounds run. Rounds after the first drain re-entrant staging.
    pub rounds: u32,
    /// Entities that changed archetype.
    pub migrated: usize,
    /// Query-added notifications emitted (one per query, not per subscriber).
    pub added: usize,
    /// Query-removed notifications emitted.
    pub removed: usize,
}

/// A tag-driven entity store.
#[derive(Debug)]
pub struct World {
    config: WorldConfig,
    interner: Interner,
    entities: EntityTable,
    graph: ArchetypeGraph,
    queries: QueryRegistry,
    root: EntityId,
    /// Set while the commit loop runs, so nested `apply()` calls defer to it.
    committing: bool,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates a world with the given configuration.
    ///
    /// The world starts with the root archetype and one root entity in it.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        let mut entities = EntityTable::new();
        let mut graph = ArchetypeGraph::new();
        let root = entities.allocate(config.root_name.as_str(), ArchetypeId::ROOT);
        graph.insert_entity(root, ArchetypeId::ROOT);

        Self {
            config,
            interner: Interner::new(),
            entities,
            graph,
            queries: QueryRegistry::new(),
            root,
            committing: false,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Returns the root entity.
    #[must_use]
    pub fn root(&self) -> EntityId {
        self.root
    }

    /// Returns the tag interner.
    #[must_use]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Returns the archetype graph.
    #[must_use]
    pub fn graph(&self) -> &ArchetypeGraph {
        &self.graph
    }

    /// Returns the live queries.
    #[must_use]
    pub fn queries(&self) -> &QueryRegistry {
        &self.queries
    }

    /// Returns the number of entities ever created, root included.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Looks up an entity record by id.
    #[must_use]
    pub fn lookup(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(id)
    }

    /// Checks if an entity belongs to this world.
    #[must_use]
    pub fn exists(&self, id: EntityId) -> bool {
        self.entities.exists(id)
    }

    // --- Entity Operations ---

    /// Creates an entity named `name`, optionally owned by `owner`.
    ///
    /// The new entity has no tags and sits in the root archetype.
    ///
    /// # Errors
    ///
    /// Returns an error if `owner` is not an entity of this world.
    pub fn child(
        &mut self,
        name: impl Into<Arc<str>>,
        owner: Option<EntityId>,
    ) -> Result<EntityId> {
        let id = self.entities.spawn(name, owner, ArchetypeId::ROOT)?;
        self.graph.insert_entity(id, ArchetypeId::ROOT);
        tracing::trace!(%id, owner = ?owner, "created entity");
        Ok(id)
    }

    /// Returns a chaining handle for one entity.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not an entity of this world.
    pub fn entity_mut(&mut self, id: EntityId) -> Result<EntityMut<'_>> {
        self.entities.validate(id)?;
        Ok(EntityMut { world: self, id })
    }

    /// Stages adding a tag. Returns whether anything was staged.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not an entity of this world.
    pub fn add(&mut self, id: EntityId, tag: &str) -> Result<bool> {
        self.entities.validate(id)?;
        Ok(self.stage_add(id, tag))
    }

    /// Stages removing a tag. Returns whether anything was staged.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not an entity of this world.
    pub fn remove(&mut self, id: EntityId, tag: &str) -> Result<bool> {
        self.entities.validate(id)?;
        Ok(self.stage_remove(id, tag))
    }

    /// Checks the committed tag set. Staged changes are not visible.
    #[must_use]
    pub fn has(&self, id: EntityId, tag: &str) -> bool {
        self.entities.get(id).is_some_and(|record| {
            self.graph
                .archetype(record.archetype())
                .contains_name(&self.interner, tag)
        })
    }

    /// Returns the committed tags of an entity, sorted by name.
    #[must_use]
    pub fn tags(&self, id: EntityId) -> Vec<&str> {
        let Some(record) = self.entities.get(id) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .archetype(record.archetype())
            .tags()
            .iter()
            .filter_map(|&tag| self.interner.get_tag(tag))
            .collect();
        names.sort_unstable();
        names
    }

    /// Returns the committed archetype of an entity.
    #[must_use]
    pub fn archetype_of(&self, id: EntityId) -> Option<ArchetypeId> {
        self.entities.get(id).map(EntityRecord::archetype)
    }

    /// Returns the staged transition of an entity, if any.
    #[must_use]
    pub fn pending(&self, id: EntityId) -> Option<Transition> {
        self.graph.pending(id)
    }

    /// Returns the owner of an entity.
    #[must_use]
    pub fn owner(&self, id: EntityId) -> Option<EntityId> {
        self.entities.get(id).and_then(EntityRecord::owner)
    }

    /// Returns the owned children of an entity in creation order.
    #[must_use]
    pub fn children(&self, id: EntityId) -> &[EntityId] {
        match self.entities.get(id) {
            Some(record) => record.children(),
            None => &[],
        }
    }

    /// Returns the name of an entity.
    #[must_use]
    pub fn name(&self, id: EntityId) -> Option<&str> {
        self.entities.get(id).map(EntityRecord::name)
    }

    /// Destroys an entity and, recursively, everything it owns.
    ///
    /// Stages removal of every committed tag, so queries observe the
    /// destruction on the next [`apply`](Self::apply). The entity is unlinked
    /// from its owner immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not an entity of this world.
    pub fn destroy(&mut self, id: EntityId) -> Result<()> {
        let record = self.entities.try_get(id)?;
        let children = record.children().to_vec();
        let tags = self.graph.archetype(record.archetype()).tags().to_vec();

        for tag in tags.into_iter().rev() {
            self.stage_remove_id(id, tag);
        }
        for child in children {
            self.destroy(child)?;
        }
        self.entities.detach(id)?;

        tracing::trace!(%id, "destroyed entity");
        Ok(())
    }

    // --- User Data ---

    /// Returns the user data of an entity.
    #[must_use]
    pub fn data(&self, id: EntityId) -> Option<&LtMap<Arc<str>, Value>> {
        self.entities.get(id).map(EntityRecord::data)
    }

    /// Reads one user data value.
    #[must_use]
    pub fn get(&self, id: EntityId, key: &str) -> Option<&Value> {
        self.data(id).and_then(|data| data.get(key))
    }

    /// Writes one user data value.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is unknown or `key` names an entity internal.
    pub fn insert(
        &mut self,
        id: EntityId,
        key: impl Into<Arc<str>>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let key = key.into();
        if is_reserved(&key) {
            return Err(Error::invalid_descriptor(format!("reserved key: {key}")));
        }
        let data = self.entities.try_get(id)?.data().insert(key, value.into());
        self.entities.set_data(id, data)
    }

    pub(crate) fn replace_data(&mut self, id: EntityId, data: LtMap<Arc<str>, Value>) -> Result<()> {
        self.entities.set_data(id, data)
    }

    // --- Queries ---

    /// Returns the query for `filter`, creating it on first request.
    ///
    /// Equivalent filters return the same query.
    pub fn query(&mut self, filter: impl Into<Filter>) -> QueryId {
        self.queries
            .get_or_create(filter.into(), &mut self.graph, &mut self.interner)
    }

    /// Returns a read view over a query's current members.
    ///
    /// # Errors
    ///
    /// Returns an error if `query` was not created by this world.
    pub fn view(&self, query: QueryId) -> Result<QueryView<'_>> {
        let index = self.queries.try_get(query)?;
        Ok(QueryView::new(index, &self.graph))
    }

    /// Returns the filter a query was created with.
    ///
    /// # Errors
    ///
    /// Returns an error if `query` was not created by this world.
    pub fn filter_of(&self, query: QueryId) -> Result<&Filter> {
        Ok(self.queries.try_get(query)?.filter())
    }

    /// Subscribes to entities entering a query.
    ///
    /// The subscriber is first called once for every current member, then
    /// registered for future additions.
    ///
    /// # Errors
    ///
    /// Returns an error if `query` was not created by this world.
    pub fn subscribe_added(
        &mut self,
        query: QueryId,
        mut subscriber: impl FnMut(&mut World, EntityId) + 'static,
    ) -> Result<()> {
        let members = self.view(query)?.to_vec();
        for entity in members {
            subscriber(self, entity);
        }
        self.query_mut(query)?
            .subscribe(QueryEvent::Added, Box::new(subscriber));
        Ok(())
    }

    /// Subscribes to entities leaving a query.
    ///
    /// # Errors
    ///
    /// Returns an error if `query` was not created by this world.
    pub fn subscribe_removed(
        &mut self,
        query: QueryId,
        subscriber: impl FnMut(&mut World, EntityId) + 'static,
    ) -> Result<()> {
        self.query_mut(query)?
            .subscribe(QueryEvent::Removed, Box::new(subscriber));
        Ok(())
    }

    fn query_mut(&mut self, query: QueryId) -> Result<&mut QueryIndex> {
        self.queries
            .get_mut(query)
            .ok_or_else(|| Error::internal(format!("unknown query {}", query.index())))
    }

    // --- Commit ---

    /// Commits every staged transition and notifies queries.
    ///
    /// Each round first moves all staged entities into their target
    /// archetypes, then notifies queries whose interest changed, so every
    /// callback observes settled membership. Anything the callbacks stage is
    /// committed by a further round before this returns. Calling `apply`
    /// from inside a callback does nothing; the running commit drains it.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticLimit::MaxCommitRounds`] if a configured round limit
    /// is reached while transitions are still staged. Those transitions stay
    /// staged.
    pub fn apply(&mut self) -> Result<CommitStats> {
        if self.committing {
            tracing::warn!("apply() called during a commit; the running commit will drain it");
            return Ok(CommitStats::default());
        }

        self.committing = true;
        let result = self.commit();
        self.committing = false;
        result
    }

    fn commit(&mut self) -> Result<CommitStats> {
        let mut stats = CommitStats::default();

        loop {
            if let Some(limit) = self.config.max_commit_rounds {
                if stats.rounds >= limit && self.graph.has_pending() {
                    return Err(Error::limit_exceeded(SemanticLimit::MaxCommitRounds {
                        limit,
                    }));
                }
            }

            let entities = &mut self.entities;
            let Some(batch) = self
                .graph
                .begin_round(|entity, to| entities.relocate(entity, to))
            else {
                break;
            };

            stats.rounds += 1;
            stats.migrated += batch.len();
            tracing::debug!(round = stats.rounds, migrated = batch.len(), "commit round");

            // Diffs are taken before any callback runs, so queries created
            // by a callback only see this round through their seed scan.
            let diffs: Vec<(EntityId, InterestDiff)> = batch
                .into_iter()
                .map(|(entity, transition)| (entity, self.graph.interest_diff(transition)))
                .collect();

            for (entity, diff) in diffs {
                for query in diff.removed {
                    self.emit(query, entity, QueryEvent::Removed);
                    stats.removed += 1;
                }
                for query in diff.added {
                    self.emit(query, entity, QueryEvent::Added);
                    stats.added += 1;
                }
            }
        }

        Ok(stats)
    }

    fn emit(&mut self, query: QueryId, entity: EntityId, event: QueryEvent) {
        let Some(index) = self.queries.get_mut(query) else {
            return;
        };
        let mut subscribers = index.take_subscribers(event);
        for subscriber in &mut subscribers {
            subscriber(self, entity);
        }
        if let Some(index) = self.queries.get_mut(query) {
            index.restore_subscribers(event, subscribers);
        }
    }

    // --- Staging ---

    pub(crate) fn stage_add(&mut self, id: EntityId, tag: &str) -> bool {
        let tag = self.interner.intern_tag(tag);
        self.stage_add_id(id, tag)
    }

    pub(crate) fn stage_remove(&mut self, id: EntityId, tag: &str) -> bool {
        // A tag never interned cannot be on any archetype.
        let Some(tag) = self.interner.lookup(tag) else {
            return false;
        };
        self.stage_remove_id(id, tag)
    }

    fn stage_add_id(&mut self, id: EntityId, tag: TagId) -> bool {
        let Some(committed) = self.archetype_of(id) else {
            return false;
        };
        let mut wiring = QueryWiring {
            queries: &mut self.queries,
            interner: &self.interner,
        };
        self.graph.stage_add(id, committed, tag, &mut wiring)
    }

    fn stage_remove_id(&mut self, id: EntityId, tag: TagId) -> bool {
        let Some(committed) = self.archetype_of(id) else {
            return false;
        };
        let mut wiring = QueryWiring {
            queries: &mut self.queries,
            interner: &self.interner,
        };
        self.graph.stage_remove(id, committed, tag, &mut wiring)
    }
}

/// Chaining handle over one entity of a world.
///
/// ```
/// use tagtable_storage::World;
///
/// let mut world = World::new();
/// let root = world.root();
/// let goblin = world.child("goblin", Some(root)).unwrap();
///
/// world.entity_mut(goblin).unwrap().add("enemy").add("hostile").apply().unwrap();
/// assert!(world.has(goblin, "hostile"));
/// ```
#[derive(Debug)]
pub struct EntityMut<'w> {
    world: &'w mut World,
    id: EntityId,
}

impl EntityMut<'_> {
    /// Returns the entity id.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the world this handle borrows.
    pub fn world(&mut self) -> &mut World {
        self.world
    }

    /// Stages adding a tag.
    pub fn add(&mut self, tag: &str) -> &mut Self {
        self.world.stage_add(self.id, tag);
        self
    }

    /// Stages removing a tag.
    pub fn remove(&mut self, tag: &str) -> &mut Self {
        self.world.stage_remove(self.id, tag);
        self
    }

    /// Checks the committed tag set.
    #[must_use]
    pub fn has(&self, tag: &str) -> bool {
        self.world.has(self.id, tag)
    }

    /// Returns the committed tags, sorted by name.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        self.world.tags(self.id)
    }

    /// Returns the owner.
    #[must_use]
    pub fn owner(&self) -> Option<EntityId> {
        self.world.owner(self.id)
    }

    /// Returns the owned children.
    #[must_use]
    pub fn children(&self) -> &[EntityId] {
        self.world.children(self.id)
    }

    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.world.name(self.id).unwrap_or_default()
    }

    /// Creates an entity owned by this one.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`World::child`].
    pub fn child(&mut self, name: impl Into<Arc<str>>) -> Result<EntityId> {
        self.world.child(name, Some(self.id))
    }

    /// Loads a descriptor into this entity. See [`World::set`].
    ///
    /// # Errors
    ///
    /// Propagates errors from [`World::set`].
    pub fn set(&mut self, descriptor: &Value, overwrite: bool) -> Result<&mut Self> {
        self.world.set(self.id, descriptor, overwrite)?;
        Ok(self)
    }

    /// Destroys this entity and everything it owns.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`World::destroy`].
    pub fn destroy(self) -> Result<()> {
        self.world.destroy(self.id)
    }

    /// Commits all staged changes of the world.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`World::apply`].
    pub fn apply(&mut self) -> Result<CommitStats> {
        self.world.apply()
    }
}
