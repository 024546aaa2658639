// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity identity: the generational `EntityId` handle and the concurrent allocator that
//! hands them out.

use crate::handle::GenHandle;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU32, Ordering};

/// Marker tag for [`GenHandle`] — distinguishes entity handles from resource/ticket handles.
pub struct EntityTag;

/// A generational entity handle.
pub type EntityId = GenHandle<EntityTag>;

/// The `(chunk, row)` an entity currently occupies inside its archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_index: u32,
    pub chunk_index: u32,
    pub row: u32,
}

/// Concurrent, fixed-capacity entity id allocator.
///
/// Backed by a lock-free free-queue of reusable indices and an atomic `next_index` counter,
/// grounded directly in the original engine's `EntityIDAllocator`: `create` first tries to
/// reuse an index from the free queue (reading its current generation), falling back to a
/// fresh index from `next_index` when the queue is empty. `destroy` bumps the slot's
/// generation (invalidating any outstanding handle) before returning the index to the queue.
pub struct EntityIdAllocator {
    max_entities: u32,
    next_index: AtomicU32,
    generations: Vec<AtomicU32>,
    free_queue: ArrayQueue<u32>,
}

impl EntityIdAllocator {
    /// Construct an allocator with a fixed capacity (production configs use `>= 100_000`, but
    /// any positive capacity is accepted here so tests can use small worlds).
    pub fn new(max_entities: u32) -> Self {
        let mut generations = Vec::with_capacity(max_entities as usize);
        generations.resize_with(max_entities as usize, || AtomicU32::new(0));
        Self {
            max_entities,
            next_index: AtomicU32::new(0),
            generations,
            free_queue: ArrayQueue::new(max_entities.max(1) as usize),
        }
    }

    /// Allocate a new entity id, or `EntityId::INVALID` if the id space is exhausted.
    pub fn create(&self) -> EntityId {
        if let Some(index) = self.free_queue.pop() {
            let gen = self.generations[index as usize].load(Ordering::Acquire);
            return EntityId::new(index, gen);
        }

        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        if index >= self.max_entities {
            return EntityId::INVALID;
        }
        self.generations[index as usize].store(0, Ordering::Release);
        EntityId::new(index, 0)
    }

    /// Free `id`: bumps its slot's generation so the handle can no longer validate, then
    /// enqueues the index for reuse. A full free queue (id leak) is tolerated, matching the
    /// source's documented behavior — it is not a correctness violation, only a capacity one.
    pub fn destroy(&self, id: EntityId) {
        if id.index() >= self.max_entities {
            return;
        }
        self.generations[id.index() as usize].fetch_add(1, Ordering::AcqRel);
        let _ = self.free_queue.push(id.index());
    }

    /// Whether `id`'s generation still matches the slot's current generation.
    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_sentinel() || id.index() >= self.max_entities {
            return false;
        }
        self.generations[id.index() as usize].load(Ordering::Acquire) == id.generation()
    }

    pub fn capacity(&self) -> u32 {
        self.max_entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_destroy_roundtrip() {
        let alloc = EntityIdAllocator::new(8);
        let e0 = alloc.create();
        assert!(alloc.is_alive(e0));
        alloc.destroy(e0);
        assert!(!alloc.is_alive(e0));
    }

    #[test]
    fn test_destroyed_index_is_reused_with_bumped_generation() {
        let alloc = EntityIdAllocator::new(8);
        let e0 = alloc.create();
        alloc.destroy(e0);
        let e1 = alloc.create();
        assert_eq!(e1.index(), e0.index());
        assert_eq!(e1.generation(), e0.generation() + 1);
        assert!(!alloc.is_alive(e0));
        assert!(alloc.is_alive(e1));
    }

    #[test]
    fn test_exhaustion_returns_sentinel() {
        let alloc = EntityIdAllocator::new(2);
        let _a = alloc.create();
        let _b = alloc.create();
        let c = alloc.create();
        assert!(c.is_sentinel());
    }
}
