//! Strongly-typed worker identifier.

use std::fmt;

/// Identifies one worker (and the environment it owns) within a
/// multi-environment controller.
///
/// `WorkerId(i)` is the i-th worker spawned at construction; batched
/// results are always index-aligned with worker ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u32);

impl WorkerId {
    /// The worker's position as a collection index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for WorkerId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
