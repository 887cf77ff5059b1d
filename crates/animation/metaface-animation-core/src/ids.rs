#![allow(dead_code)]
//! Identifiers and simple allocators for actors and build requests.

use serde::{Deserialize, Serialize};

/// One avatar instance owning a face controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u32);

/// One build request. Later requests for the same actor supersede earlier ones.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Monotonic allocator for ActorId and RequestId.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_actor: u32,
    next_request: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_actor(&mut self) -> ActorId {
        let id = ActorId(self.next_actor);
        self.next_actor = self.next_actor.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_request(&mut self) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request = self.next_request.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
