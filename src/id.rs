// Chain identity
//
// Every image chain gets a generation number from an allocator owned by the
// recreation controller. Nothing is global, so independent controllers (and
// tests) count independently.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainId(u64);

impl ChainId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain#{}", self.0)
    }
}

/// Monotonic generator of [`ChainId`]s.
#[derive(Debug, Default)]
pub struct ChainIdAllocator {
    next: u64,
}

impl ChainIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ChainId {
        let id = ChainId(self.next);
        self.next += 1;
        id
    }
}
