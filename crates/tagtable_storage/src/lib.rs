//! Tag-driven entity storage for Tagtable.
//!
//! This crate provides:
//! - [`ArchetypeGraph`] - Canonical tag-set nodes with memoized transition edges
//! - [`QueryRegistry`] - Incrementally maintained live queries
//! - [`EntityTable`] - Monotonic entity allocation and ownership hierarchy
//! - [`World`] - The store: staging, two-pass commit, loading and purification

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod archetype;
pub mod config;
pub mod entity;
pub mod loader;
pub mod purify;
pub mod query;
pub mod world;

pub use archetype::{
    Archetype, ArchetypeGraph, ArchetypeHook, ArchetypeId, InterestDiff, Transition,
};
pub use config::WorldConfig;
pub use entity::{EntityRecord, EntityTable, RESERVED_KEYS};
pub use query::{
    Filter, Predicate, QueryEvent, QueryId, QueryIndex, QueryRegistry, QueryView, Subscriber,
    TagTest,
};
pub use world::{CommitStats, EntityMut, World};
