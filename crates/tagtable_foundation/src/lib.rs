//! Core types, values, and persistent collections for Tagtable.
//!
//! This crate provides:
//! - [`EntityId`] - Monotonic entity identifiers
//! - [`TagId`] and [`Interner`] - Interned tag names
//! - [`Value`] - Plain data carried by entities and descriptors
//! - [`Error`] - Rich error types with context
//! - Persistent collections ([`LtVec`], [`LtMap`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod entity;
pub mod error;
pub mod intern;
pub mod value;

pub use collections::{LtMap, LtVec};
pub use entity::EntityId;
pub use error::{Error, ErrorContext, ErrorKind, Result, SemanticLimit};
pub use intern::{Interner, TagId};
pub use value::Value;
