//! Entity identifiers and the indexed arena that owns IR entities
//!
//! Handles given to callers are validated indices into these arenas,
//! never pointers, so a handle can always be checked before use.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU32, Ordering};

/// Identity of one [`Context`](crate::Context) instance.
///
/// Every handle carries the id of the context that minted it, so handles
/// from one context are rejected by another.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ContextId(u32);

impl ContextId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A type usable as an arena index.
pub trait EntityId: Copy + Eq {
    fn new(raw: u32) -> Self;
    fn index(self) -> usize;
}

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        pub struct $name(u32);

        impl $name {
            pub fn as_u32(self) -> u32 {
                self.0
            }
        }

        impl EntityId for $name {
            fn new(raw: u32) -> Self {
                Self(raw)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Index of a function within its context
    FuncId,
    "fn"
);
entity_id!(
    /// Index of a block within its function; block 0 is the entry block
    BlockId,
    "bb"
);
entity_id!(
    /// Index of a value slot within its function
    ValueId,
    "%"
);

/// A `Vec` indexed by an entity id.
#[derive(Debug, Clone)]
pub struct EntityVec<I: EntityId, T> {
    raw: Vec<T>,
    _marker: PhantomData<fn(I) -> I>,
}

impl<I: EntityId, T> Default for EntityVec<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: EntityId, T> EntityVec<I, T> {
    pub fn new() -> Self {
        Self {
            raw: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Push a value and return its id.
    pub fn push(&mut self, value: T) -> I {
        let id = I::new(self.raw.len() as u32);
        self.raw.push(value);
        id
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.raw.get(id.index())
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.raw.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.raw.iter()
    }

    pub fn iter_enumerated(&self) -> impl Iterator<Item = (I, &T)> {
        self.raw
            .iter()
            .enumerate()
            .map(|(i, v)| (I::new(i as u32), v))
    }

    pub fn ids(&self) -> impl Iterator<Item = I> {
        (0..self.raw.len() as u32).map(I::new)
    }
}

impl<I: EntityId, T> Index<I> for EntityVec<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        &self.raw[id.index()]
    }
}

impl<I: EntityId, T> IndexMut<I> for EntityVec<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        &mut self.raw[id.index()]
    }
}
