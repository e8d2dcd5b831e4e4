//! Integration tests for Layer 1: Storage
//!
//! Tests for the archetype graph, entity lifecycle, live queries, the
//! two-pass commit, and descriptor loading.

mod archetypes;
mod commit;
