//! Live queries over the archetype graph.
//!
//! A query is identified by its canonical [`Filter`]. Each [`QueryIndex`]
//! keeps the list of archetypes its filter matches; the graph keeps the
//! reverse set on every archetype. Both sides are updated together, either
//! when the query is created (seed scan) or when an archetype is created
//! (hook), so membership never has to be recomputed on read.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tagtable_foundation::{EntityId, Error, Interner, Result, TagId};

use crate::archetype::{Archetype, ArchetypeGraph, ArchetypeHook, ArchetypeId};
use crate::world::World;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a query within one world.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QueryId(u32);

impl QueryId {
    /// Returns the raw index of this query.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

/// Membership test handed to predicate filters: "does the archetype carry
/// this tag?".
pub type TagTest<'a> = &'a dyn Fn(&str) -> bool;

/// A named predicate over an archetype's tag set.
pub type Predicate = Rc<dyn Fn(TagTest<'_>) -> bool>;

/// Callback notified when an entity enters or leaves a query.
pub type Subscriber = Box<dyn FnMut(&mut World, EntityId)>;

/// Which change a subscriber is notified of.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum QueryEvent {
    /// The entity now matches the query.
    Added,
    /// The entity no longer matches the query.
    Removed,
}

/// A query filter.
///
/// Tag filters are written as lists of names where a leading `!` negates the
/// tag: `["enemy", "!dead"]` matches archetypes that carry `enemy` and lack
/// `dead`. Predicate filters are identified by their name, so two predicates
/// registered under the same name are the same query.
#[derive(Clone)]
pub enum Filter {
    /// All of `with` present and none of `without`.
    Tags {
        /// Required tags, sorted and deduplicated.
        with: Vec<Arc<str>>,
        /// Excluded tags, sorted and deduplicated.
        without: Vec<Arc<str>>,
    },
    /// Arbitrary test over the tag set.
    Predicate {
        /// Identity of the predicate.
        name: Arc<str>,
        /// The test itself.
        test: Predicate,
    },
}

impl Filter {
    /// Builds a tag filter from names, `!name` meaning "must not have".
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut with = Vec::new();
        let mut without = Vec::new();
        for tag in tags {
            let tag = tag.as_ref();
            match tag.strip_prefix('!') {
                Some(negated) => without.push(Arc::from(negated)),
                None => with.push(Arc::from(tag)),
            }
        }
        Self::from_parts(with, without)
    }

    /// Builds a predicate filter.
    pub fn predicate(
        name: impl Into<Arc<str>>,
        test: impl Fn(TagTest<'_>) -> bool + 'static,
    ) -> Self {
        Self::Predicate {
            name: name.into(),
            test: Rc::new(test),
        }
    }

    /// Builds a tag filter from separate required and excluded lists.
    ///
    /// Names are taken as written; a leading `!` has no special meaning here.
    pub fn matching<I, J, S, T>(with: I, without: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self::from_parts(
            with.into_iter().map(|t| Arc::from(t.as_ref())).collect(),
            without.into_iter().map(|t| Arc::from(t.as_ref())).collect(),
        )
    }

    fn from_parts(mut with: Vec<Arc<str>>, mut without: Vec<Arc<str>>) -> Self {
        with.sort_unstable();
        with.dedup();
        without.sort_unstable();
        without.dedup();
        Self::Tags { with, without }
    }

    /// Returns the canonical key that identifies this filter.
    ///
    /// Equivalent tag filters share a key regardless of the order their tags
    /// were written in.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Tags { with, without } => {
                let mut parts: Vec<String> = with.iter().map(ToString::to_string).collect();
                parts.extend(without.iter().map(|t| format!("!{t}")));
                parts.join("|")
            }
            Self::Predicate { name, .. } => format!("?{name}"),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tags { with, without } => f
                .debug_struct("Tags")
                .field("with", with)
                .field("without", without)
                .finish(),
            Self::Predicate { name, .. } => f.debug_tuple("Predicate").field(name).finish(),
        }
    }
}

impl<S: AsRef<str>> From<&[S]> for Filter {
    fn from(tags: &[S]) -> Self {
        Self::tags(tags)
    }
}

impl<S: AsRef<str>, const N: usize> From<[S; N]> for Filter {
    fn from(tags: [S; N]) -> Self {
        Self::tags(tags)
    }
}

impl<S: AsRef<str>> From<Vec<S>> for Filter {
    fn from(tags: Vec<S>) -> Self {
        Self::tags(tags)
    }
}

/// A filter compiled against a world's interner.
enum Matcher {
    Tags { with: Vec<TagId>, without: Vec<TagId> },
    Predicate(Predicate),
}

impl Matcher {
    fn compile(filter: &Filter, interner: &mut Interner) -> Self {
        match filter {
            Filter::Tags { with, without } => Self::Tags {
                with: with.iter().map(|t| interner.intern_tag(t)).collect(),
                without: without.iter().map(|t| interner.intern_tag(t)).collect(),
            },
            Filter::Predicate { test, .. } => Self::Predicate(Rc::clone(test)),
        }
    }

    fn matches(&self, archetype: &Archetype, interner: &Interner) -> bool {
        match self {
            Self::Tags { with, without } => {
                with.iter().all(|&t| archetype.contains(t))
                    && !without.iter().any(|&t| archetype.contains(t))
            }
            Self::Predicate(test) => {
                let has = |name: &str| archetype.contains_name(interner, name);
                test(&has)
            }
        }
    }
}

/// One live query: its filter, matching archetypes and subscribers.
pub struct QueryIndex {
    id: QueryId,
    filter: Filter,
    matcher: Matcher,
    archetypes: Vec<ArchetypeId>,
    added: Vec<Subscriber>,
    removed: Vec<Subscriber>,
}

impl QueryIndex {
    /// Returns this query's id.
    #[must_use]
    pub fn id(&self) -> QueryId {
        self.id
    }

    /// Returns the filter this query was created with.
    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Returns the archetypes currently matched, in discovery order.
    #[must_use]
    pub fn archetypes(&self) -> &[ArchetypeId] {
        &self.archetypes
    }

    /// Registers `archetype` on both sides if the filter matches it.
    fn consider(&mut self, archetype: &mut Archetype, interner: &Interner) -> bool {
        if !self.matcher.matches(archetype, interner) {
            return false;
        }
        self.archetypes.push(archetype.id());
        archetype.register_query(self.id);
        true
    }

    fn subscribers_mut(&mut self, event: QueryEvent) -> &mut Vec<Subscriber> {
        match event {
            QueryEvent::Added => &mut self.added,
            QueryEvent::Removed => &mut self.removed,
        }
    }

    /// Detaches the subscribers for `event` so they can be called with the
    /// world mutably borrowed.
    pub(crate) fn take_subscribers(&mut self, event: QueryEvent) -> Vec<Subscriber> {
        std::mem::take(self.subscribers_mut(event))
    }

    /// Puts detached subscribers back ahead of any registered meanwhile.
    pub(crate) fn restore_subscribers(
        &mut self,
        event: QueryEvent,
        mut subscribers: Vec<Subscriber>,
    ) {
        let slot = self.subscribers_mut(event);
        subscribers.append(slot);
        *slot = subscribers;
    }

    pub(crate) fn subscribe(&mut self, event: QueryEvent, subscriber: Subscriber) {
        self.subscribers_mut(event).push(subscriber);
    }

    /// Returns the number of subscribers for `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: QueryEvent) -> usize {
        match event {
            QueryEvent::Added => self.added.len(),
            QueryEvent::Removed => self.removed.len(),
        }
    }
}

impl fmt::Debug for QueryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryIndex")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("archetypes", &self.archetypes)
            .field("added", &self.added.len())
            .field("removed", &self.removed.len())
            .finish()
    }
}

/// All live queries of a world, deduplicated by filter key.
#[derive(Debug, Default)]
pub struct QueryRegistry {
    queries: Vec<QueryIndex>,
    by_key: std::collections::HashMap<String, QueryId>,
}

impl QueryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the query for `filter`, creating and seeding it if needed.
    ///
    /// # Panics
    ///
    /// Panics if the registry would exceed `u32::MAX` queries.
    pub fn get_or_create(
        &mut self,
        filter: Filter,
        graph: &mut ArchetypeGraph,
        interner: &mut Interner,
    ) -> QueryId {
        let key = filter.key();
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }

        let id = QueryId(u32::try_from(self.queries.len()).expect("too many queries"));
        let matcher = Matcher::compile(&filter, interner);
        let mut index = QueryIndex {
            id,
            filter,
            matcher,
            archetypes: Vec::new(),
            added: Vec::new(),
            removed: Vec::new(),
        };

        for archetype in graph.iter_mut() {
            index.consider(archetype, interner);
        }

        tracing::debug!(
            query = id.0,
            key = %key,
            archetypes = index.archetypes.len(),
            "created query"
        );

        self.queries.push(index);
        self.by_key.insert(key, id);
        id
    }

    /// Gets a query by id.
    #[must_use]
    pub fn get(&self, id: QueryId) -> Option<&QueryIndex> {
        self.queries.get(id.0 as usize)
    }

    pub(crate) fn get_mut(&mut self, id: QueryId) -> Option<&mut QueryIndex> {
        self.queries.get_mut(id.0 as usize)
    }

    /// Gets a query by id, failing for ids from another world.
    pub fn try_get(&self, id: QueryId) -> Result<&QueryIndex> {
        self.get(id)
            .ok_or_else(|| Error::internal(format!("unknown query {}", id.0)))
    }

    /// Finds the query registered for an equivalent filter.
    #[must_use]
    pub fn find(&self, filter: &Filter) -> Option<QueryId> {
        self.by_key.get(&filter.key()).copied()
    }

    /// Returns the number of live queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Returns true if no query was ever created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// New-archetype hook: re-evaluates every live query against the new node.
pub(crate) struct QueryWiring<'a> {
    pub(crate) queries: &'a mut QueryRegistry,
    pub(crate) interner: &'a Interner,
}

impl ArchetypeHook for QueryWiring<'_> {
    fn archetype_created(&mut self, archetype: &mut Archetype) {
        for query in &mut self.queries.queries {
            if query.consider(archetype, self.interner) {
                tracing::trace!(
                    query = query.id.0,
                    archetype = archetype.id().index(),
                    "query matched new archetype"
                );
            }
        }
    }
}

/// Read-only view over the current members of a query.
#[derive(Clone, Copy)]
pub struct QueryView<'w> {
    index: &'w QueryIndex,
    graph: &'w ArchetypeGraph,
}

impl<'w> QueryView<'w> {
    pub(crate) fn new(index: &'w QueryIndex, graph: &'w ArchetypeGraph) -> Self {
        Self { index, graph }
    }

    /// Returns the id of the viewed query.
    #[must_use]
    pub fn id(&self) -> QueryId {
        self.index.id
    }

    /// Returns the filter of the viewed query.
    #[must_use]
    pub fn filter_of(&self) -> &'w Filter {
        &self.index.filter
    }

    /// Iterates members: archetypes in discovery order, entities in id order
    /// within each archetype.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + use<'w> {
        let (index, graph) = (self.index, self.graph);
        index
            .archetypes
            .iter()
            .flat_map(move |&id| graph.archetype(id).entities())
    }

    /// Collects all members.
    #[must_use]
    pub fn to_vec(&self) -> Vec<EntityId> {
        self.iter().collect()
    }

    /// Calls `f` for every member.
    pub fn for_each(&self, f: impl FnMut(EntityId)) {
        self.iter().for_each(f);
    }

    /// Maps every member.
    pub fn map<R>(&self, f: impl FnMut(EntityId) -> R) -> Vec<R> {
        self.iter().map(f).collect()
    }

    /// Collects the members accepted by `predicate`.
    pub fn filter(&self, mut predicate: impl FnMut(EntityId) -> bool) -> Vec<EntityId> {
        self.iter().filter(|&e| predicate(e)).collect()
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index
            .archetypes
            .iter()
            .map(|&id| self.graph.archetype(id).len())
            .sum()
    }

    /// Returns true if the query currently has no member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_any()
    }

    /// Returns true if the query currently has at least one member.
    #[must_use]
    pub fn has_any(&self) -> bool {
        self.index
            .archetypes
            .iter()
            .any(|&id| !self.graph.archetype(id).is_empty())
    }

    /// Returns the only member.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotSingleton`](tagtable_foundation::ErrorKind::NotSingleton)
    /// unless exactly one entity matches.
    pub fn singleton(&self) -> Result<EntityId> {
        let mut members = self.iter();
        match (members.next(), members.next()) {
            (Some(only), None) => Ok(only),
            _ => Err(Error::not_singleton(self.len())),
        }
    }

    /// Returns the only member, or `None` unless exactly one entity matches.
    #[must_use]
    pub fn try_singleton(&self) -> Option<EntityId> {
        self.singleton().ok()
    }
}

impl fmt::Debug for QueryView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryView")
            .field("id", &self.index.id)
            .field("filter", &self.index.filter)
            .field("len", &self.len())
            .finish()
    }
}
