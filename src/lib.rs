//! Tagtable - In-memory tag-driven entity store
//!
//! This crate re-exports all layers of the Tagtable system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 1: tagtable_storage    - Archetype graph, live queries, World, loader
//! Layer 0: tagtable_foundation - Core types (Value, EntityId, TagId, Error)
//! ```

pub use tagtable_foundation as foundation;
pub use tagtable_storage as storage;

pub use tagtable_foundation::{EntityId, Error, ErrorKind, Result, Value};
pub use tagtable_storage::{CommitStats, EntityMut, Filter, QueryId, World, WorldConfig};
