//! The archetype graph.
//!
//! Every distinct tag set an entity has ever reached is an [`Archetype`]
//! node. Nodes live in an arena owned by [`ArchetypeGraph`] and are addressed
//! by [`ArchetypeId`]; add/remove edges between nodes are cached the first
//! time they are walked. Nodes are never removed, so an id stays valid for
//! the lifetime of the graph.
//!
//! Tag mutations do not move entities directly. They are staged as one net
//! [`Transition`] per entity and applied in bulk by [`ArchetypeGraph::begin_round`].

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tagtable_foundation::{EntityId, Interner, TagId};

use crate::query::QueryId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of an archetype in its graph.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The empty-tag archetype every entity starts in.
    pub const ROOT: ArchetypeId = ArchetypeId(0);

    /// Returns the raw index of this archetype.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// A node of the archetype graph: one distinct tag set.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    /// Tags, sorted by `TagId` for consistent identity.
    tags: Vec<TagId>,
    entities: BTreeSet<EntityId>,
    add_edges: HashMap<TagId, ArchetypeId>,
    remove_edges: HashMap<TagId, ArchetypeId>,
    /// Queries whose filter matches this tag set.
    queries: BTreeSet<QueryId>,
}

impl Archetype {
    fn new(id: ArchetypeId, tags: Vec<TagId>) -> Self {
        Self {
            id,
            tags,
            entities: BTreeSet::new(),
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
            queries: BTreeSet::new(),
        }
    }

    /// Returns this archetype's id.
    #[must_use]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Returns the tags of this archetype, sorted by id.
    #[must_use]
    pub fn tags(&self) -> &[TagId] {
        &self.tags
    }

    /// Checks if this archetype carries a tag.
    #[must_use]
    pub fn contains(&self, tag: TagId) -> bool {
        self.tags.binary_search(&tag).is_ok()
    }

    /// Checks if this archetype carries a tag, by name.
    #[must_use]
    pub fn contains_name(&self, interner: &Interner, name: &str) -> bool {
        interner.lookup(name).is_some_and(|tag| self.contains(tag))
    }

    /// Returns the canonical key: tag names sorted and joined with `|`.
    #[must_use]
    pub fn key(&self, interner: &Interner) -> String {
        let mut names: Vec<&str> = self
            .tags
            .iter()
            .filter_map(|&tag| interner.get_tag(tag))
            .collect();
        names.sort_unstable();
        names.join("|")
    }

    /// Iterates the committed members of this archetype in id order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }

    /// Returns the number of committed members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entity currently lives here.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Checks whether an entity is a committed member.
    #[must_use]
    pub fn has_entity(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    /// Iterates the queries registered on this archetype.
    pub fn queries(&self) -> impl Iterator<Item = QueryId> + '_ {
        self.queries.iter().copied()
    }

    /// Checks whether a query is registered on this archetype.
    #[must_use]
    pub fn is_watched_by(&self, query: QueryId) -> bool {
        self.queries.contains(&query)
    }

    /// Returns the cached target of adding `tag`, if already walked.
    #[must_use]
    pub fn add_edge(&self, tag: TagId) -> Option<ArchetypeId> {
        self.add_edges.get(&tag).copied()
    }

    /// Returns the cached target of removing `tag`, if already walked.
    #[must_use]
    pub fn remove_edge(&self, tag: TagId) -> Option<ArchetypeId> {
        self.remove_edges.get(&tag).copied()
    }

    pub(crate) fn register_query(&mut self, query: QueryId) {
        self.queries.insert(query);
    }
}

/// Callback run once for every archetype the graph creates.
///
/// The hook runs before the edge lookup that created the archetype returns,
/// so the new node is fully wired by the time any entity is staged into it.
pub trait ArchetypeHook {
    /// Called with the freshly created archetype.
    fn archetype_created(&mut self, archetype: &mut Archetype);
}

impl ArchetypeHook for () {
    fn archetype_created(&mut self, _archetype: &mut Archetype) {}
}

/// A staged, not yet committed, archetype change for one entity.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transition {
    /// The committed archetype at the time the change was first staged.
    pub from: ArchetypeId,
    /// The archetype the entity will occupy after commit.
    pub to: ArchetypeId,
}

impl Transition {
    /// Returns true if committing this transition moves the entity.
    #[must_use]
    pub fn is_move(&self) -> bool {
        self.from != self.to
    }
}

/// Queries whose interest in an entity changes across a transition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterestDiff {
    /// Queries on `from` but not on `to`.
    pub removed: Vec<QueryId>,
    /// Queries on `to` but not on `from`.
    pub added: Vec<QueryId>,
}

/// Arena of archetypes plus the pending transition queue.
#[derive(Debug)]
pub struct ArchetypeGraph {
    archetypes: Vec<Archetype>,
    by_key: HashMap<Vec<TagId>, ArchetypeId>,
    pending: BTreeMap<EntityId, Transition>,
}

impl Default for ArchetypeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchetypeGraph {
    /// Creates a graph holding only the root archetype.
    #[must_use]
    pub fn new() -> Self {
        let mut by_key = HashMap::new();
        by_key.insert(Vec::new(), ArchetypeId::ROOT);
        Self {
            archetypes: vec![Archetype::new(ArchetypeId::ROOT, Vec::new())],
            by_key,
            pending: BTreeMap::new(),
        }
    }

    /// Returns the root (empty tag set) archetype id.
    #[must_use]
    pub fn root(&self) -> ArchetypeId {
        ArchetypeId::ROOT
    }

    /// Gets an archetype by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this graph.
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id.0 as usize]
    }

    fn archetype_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.archetypes[id.0 as usize]
    }

    /// Iterates all archetypes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Archetype> {
        self.archetypes.iter_mut()
    }

    /// Returns the number of archetypes ever created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Always false: the root archetype exists from construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Finds the archetype for an arbitrary tag set, if it exists.
    #[must_use]
    pub fn find(&self, tags: &[TagId]) -> Option<ArchetypeId> {
        let mut key = tags.to_vec();
        key.sort_unstable();
        key.dedup();
        self.by_key.get(&key).copied()
    }

    // --- Edges ---

    /// Returns the archetype reached by adding `tag` to `node`.
    ///
    /// Walking an edge the first time may create the target archetype, in
    /// which case `hook` sees it before this returns.
    ///
    /// # Panics
    ///
    /// Panics if the graph would exceed `u32::MAX` archetypes.
    pub fn get_or_create_add_edge(
        &mut self,
        node: ArchetypeId,
        tag: TagId,
        hook: &mut dyn ArchetypeHook,
    ) -> ArchetypeId {
        if let Some(target) = self.archetype(node).add_edge(tag) {
            return target;
        }

        let source = self.archetype(node);
        let target = if source.contains(tag) {
            node
        } else {
            let mut key = source.tags.clone();
            let pos = key.binary_search(&tag).unwrap_or_else(|p| p);
            key.insert(pos, tag);
            self.find_or_create(key, hook, |created| {
                created.remove_edges.insert(tag, node);
            })
        };

        self.archetype_mut(node).add_edges.insert(tag, target);
        target
    }

    /// Returns the archetype reached by removing `tag` from `node`.
    ///
    /// # Panics
    ///
    /// Panics if the graph would exceed `u32::MAX` archetypes.
    pub fn get_or_create_remove_edge(
        &mut self,
        node: ArchetypeId,
        tag: TagId,
        hook: &mut dyn ArchetypeHook,
    ) -> ArchetypeId {
        if let Some(target) = self.archetype(node).remove_edge(tag) {
            return target;
        }

        let source = self.archetype(node);
        let target = if let Ok(pos) = source.tags.binary_search(&tag) {
            let mut key = source.tags.clone();
            key.remove(pos);
            self.find_or_create(key, hook, |created| {
                created.add_edges.insert(tag, node);
            })
        } else {
            node
        };

        self.archetype_mut(node).remove_edges.insert(tag, target);
        target
    }

    fn find_or_create(
        &mut self,
        key: Vec<TagId>,
        hook: &mut dyn ArchetypeHook,
        wire_back: impl FnOnce(&mut Archetype),
    ) -> ArchetypeId {
        if let Some(&existing) = self.by_key.get(&key) {
            return existing;
        }

        let id = ArchetypeId(u32::try_from(self.archetypes.len()).expect("too many archetypes"));
        let mut archetype = Archetype::new(id, key.clone());
        wire_back(&mut archetype);
        hook.archetype_created(&mut archetype);

        tracing::trace!(archetype = id.0, tags = ?archetype.tags, "created archetype");

        self.by_key.insert(key, id);
        self.archetypes.push(archetype);
        id
    }

    // --- Staging ---

    /// Returns where an entity will be after the next commit.
    #[must_use]
    pub fn effective(&self, entity: EntityId, committed: ArchetypeId) -> ArchetypeId {
        self.pending.get(&entity).map_or(committed, |t| t.to)
    }

    /// Stages adding `tag` to an entity currently committed in `committed`.
    ///
    /// Returns false without staging anything when the entity's effective
    /// tag set already has the tag.
    pub fn stage_add(
        &mut self,
        entity: EntityId,
        committed: ArchetypeId,
        tag: TagId,
        hook: &mut dyn ArchetypeHook,
    ) -> bool {
        let effective = self.effective(entity, committed);
        if self.archetype(effective).contains(tag) {
            return false;
        }
        let target = self.get_or_create_add_edge(effective, tag, hook);
        self.stage(entity, committed, target);
        true
    }

    /// Stages removing `tag` from an entity currently committed in `committed`.
    ///
    /// Returns false without staging anything when the entity's effective
    /// tag set lacks the tag.
    pub fn stage_remove(
        &mut self,
        entity: EntityId,
        committed: ArchetypeId,
        tag: TagId,
        hook: &mut dyn ArchetypeHook,
    ) -> bool {
        let effective = self.effective(entity, committed);
        if !self.archetype(effective).contains(tag) {
            return false;
        }
        let target = self.get_or_create_remove_edge(effective, tag, hook);
        self.stage(entity, committed, target);
        true
    }

    fn stage(&mut self, entity: EntityId, committed: ArchetypeId, target: ArchetypeId) {
        match self.pending.entry(entity) {
            Entry::Occupied(mut slot) => slot.get_mut().to = target,
            Entry::Vacant(slot) => {
                slot.insert(Transition {
                    from: committed,
                    to: target,
                });
            }
        }
        tracing::trace!(%entity, to = target.0, "staged transition");
    }

    /// Returns the staged transition for an entity, if any.
    #[must_use]
    pub fn pending(&self, entity: EntityId) -> Option<Transition> {
        self.pending.get(&entity).copied()
    }

    /// Returns the number of entities with a staged transition.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if anything is staged.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    // --- Commit ---

    /// Starts one commit round.
    ///
    /// Snapshots and clears the pending queue, then runs the membership pass
    /// for every transition that actually moves its entity, calling
    /// `relocate` so the owner of the entity records can repoint them.
    /// Returns the moving transitions in entity order for the notification
    /// pass, or `None` when nothing was staged.
    ///
    /// Anything staged after this returns lands in the next round.
    pub fn begin_round(
        &mut self,
        mut relocate: impl FnMut(EntityId, ArchetypeId),
    ) -> Option<Vec<(EntityId, Transition)>> {
        if self.pending.is_empty() {
            return None;
        }

        let batch: Vec<(EntityId, Transition)> = std::mem::take(&mut self.pending)
            .into_iter()
            .filter(|(_, transition)| transition.is_move())
            .collect();

        for &(entity, transition) in &batch {
            self.archetype_mut(transition.from).entities.remove(&entity);
            relocate(entity, transition.to);
            self.archetype_mut(transition.to).entities.insert(entity);
        }

        Some(batch)
    }

    /// Computes which queries gain or lose interest across a transition.
    #[must_use]
    pub fn interest_diff(&self, transition: Transition) -> InterestDiff {
        let from = self.archetype(transition.from);
        let to = self.archetype(transition.to);
        InterestDiff {
            removed: from.queries.difference(&to.queries).copied().collect(),
            added: to.queries.difference(&from.queries).copied().collect(),
        }
    }

    /// Places a freshly allocated entity in an archetype without staging.
    pub(crate) fn insert_entity(&mut self, entity: EntityId, archetype: ArchetypeId) {
        self.archetype_mut(archetype).entities.insert(entity);
    }
}
