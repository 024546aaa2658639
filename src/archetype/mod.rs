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

//! The Archetype: all entities sharing one component mask, owning an ordered list of Chunks.

pub mod chunk;

use crate::bitset::ComponentMask;
use chunk::ArchetypeChunk;

/// All entities sharing an identical component mask. Owns its chunks; a fresh chunk is
/// appended whenever the last one is full. Chunks are never removed or compacted across each
/// other — only swap-pop within a chunk — so row indices into previously-handed-out chunks
/// stay valid for the archetype's lifetime.
pub struct Archetype {
    mask: ComponentMask,
    chunk_bytes: usize,
    chunks: Vec<ArchetypeChunk>,
}

impl Archetype {
    pub fn new(mask: ComponentMask, chunk_bytes: usize) -> Self {
        Self { mask, chunk_bytes, chunks: Vec::new() }
    }

    pub fn mask(&self) -> ComponentMask {
        self.mask
    }

    pub fn chunks(&self) -> &[ArchetypeChunk] {
        &self.chunks
    }

    pub fn chunk(&self, index: usize) -> &ArchetypeChunk {
        &self.chunks[index]
    }

    pub fn chunk_mut(&mut self, index: usize) -> &mut ArchetypeChunk {
        &mut self.chunks[index]
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of a chunk with spare capacity, appending a fresh one if every existing chunk is
    /// full (or none exist yet).
    pub fn chunk_with_capacity(&mut self) -> usize {
        if let Some(idx) = self.chunks.iter().position(|c| !c.is_full()) {
            return idx;
        }
        self.chunks.push(ArchetypeChunk::new(self.mask, self.chunk_bytes));
        self.chunks.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentTypeRegistry;
    use crate::entity::EntityId;

    #[derive(Debug, Clone, Copy)]
    struct Tiny(u32);

    #[test]
    fn test_chunk_with_capacity_appends_when_full() {
        let registry = ComponentTypeRegistry::global();
        let id = registry.register::<Tiny>();
        let mut mask = ComponentMask::EMPTY;
        mask.set(id);

        // force a tiny chunk budget so capacity is small and we can fill it in the test.
        let mut archetype = Archetype::new(mask, 64);
        let first = archetype.chunk_with_capacity();
        let cap = archetype.chunk(first).capacity();
        for i in 0..cap {
            let row = archetype.chunk_mut(first).add_entity(EntityId::new(i as u32, 0));
            assert_eq!(row, i);
        }
        assert!(archetype.chunk(first).is_full());

        let second = archetype.chunk_with_capacity();
        assert_ne!(first, second);
        assert_eq!(archetype.chunk_count(), 2);
    }
}
