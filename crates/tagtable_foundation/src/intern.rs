//! String interning for tag names.
//!
//! Tags are interned so archetype identity can be computed over small
//! integer ids instead of strings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Interned tag identifier.
///
/// Ids are only meaningful for the [`Interner`] that produced them.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TagId(pub(crate) u32);

impl TagId {
    /// Returns the raw index of this tag.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagId({})", self.0)
    }
}

/// Interner for tag names.
///
/// This is a simple interner that maps strings to unique IDs and back.
/// It is not thread-safe; use external synchronization if needed.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interner {
    /// Tag names, indexed by `TagId`.
    tags: Vec<Arc<str>>,
    /// Map from tag name to `TagId`.
    tag_map: HashMap<Arc<str>, TagId>,
}

impl Interner {
    /// Creates a new empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a tag name, returning its [`TagId`].
    ///
    /// # Panics
    ///
    /// Panics if the number of interned tags exceeds `u32::MAX`.
    pub fn intern_tag(&mut self, s: &str) -> TagId {
        if let Some(&id) = self.tag_map.get(s) {
            return id;
        }

        let id = TagId(u32::try_from(self.tags.len()).expect("too many tags"));
        let arc: Arc<str> = s.into();
        self.tags.push(arc.clone());
        self.tag_map.insert(arc, id);
        id
    }

    /// Looks up a tag without interning it.
    #[must_use]
    pub fn lookup(&self, s: &str) -> Option<TagId> {
        self.tag_map.get(s).copied()
    }

    /// Gets the name of a tag.
    #[must_use]
    pub fn get_tag(&self, id: TagId) -> Option<&str> {
        self.tags.get(id.0 as usize).map(AsRef::as_ref)
    }

    /// Returns the number of interned tags.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }
}
