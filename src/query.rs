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

//! Queries and the typed column accessor systems use to read/write a matched chunk.
//!
//! A [`Query`] is just a required/excluded [`ComponentMask`] pair; [`World::for_each_chunk`]
//! runs a closure once per matching chunk, handing it an [`Accessor`] rather than the chunk
//! itself so systems never see chunk-internal layout details.
//!
//! [`World::for_each_chunk`]: crate::world::World::for_each_chunk

use crate::archetype::chunk::ArchetypeChunk;
use crate::bitset::ComponentMask;
use crate::component::{Component, ComponentTypeRegistry};
use crate::entity::EntityId;

/// A required/excluded component mask pair. Matches archetype `mask` iff `mask` contains every
/// required bit and none of the excluded bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Query {
    required: ComponentMask,
    excluded: ComponentMask,
}

impl Query {
    pub fn new() -> Self {
        Self { required: ComponentMask::EMPTY, excluded: ComponentMask::EMPTY }
    }

    /// Require `T` to be present. Registers `T` if it has never been registered before —
    /// harmless, since an unregistered type can never appear in any archetype mask anyway.
    pub fn with<T: Component>(mut self) -> Self {
        let type_id = ComponentTypeRegistry::global().register::<T>();
        self.required.set(type_id);
        self
    }

    /// Exclude entities that have `T`.
    pub fn without<T: Component>(mut self) -> Self {
        let type_id = ComponentTypeRegistry::global().register::<T>();
        self.excluded.set(type_id);
        self
    }

    pub fn required(&self) -> ComponentMask {
        self.required
    }

    pub fn excluded(&self) -> ComponentMask {
        self.excluded
    }

    pub fn matches(&self, mask: &ComponentMask) -> bool {
        mask.matches(&self.required, &self.excluded)
    }
}

/// Typed, per-chunk column access handed to a system's closure by
/// [`World::for_each_chunk`](crate::world::World::for_each_chunk). Wraps a shared reference to
/// the underlying chunk; mutable column access goes through
/// [`ArchetypeChunk::get_column_mut_unchecked`], which is sound here under the same invariant
/// `Executor::run_stage` relies on: a stage never schedules two systems with overlapping
/// declared writes against the same component, so two `Accessor`s never alias a write slice.
pub struct Accessor<'a> {
    chunk: &'a ArchetypeChunk,
}

impl<'a> Accessor<'a> {
    pub fn new(chunk: &'a ArchetypeChunk) -> Self {
        Self { chunk }
    }

    pub fn len(&self) -> usize {
        self.chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    pub fn entity_at(&self, row: usize) -> EntityId {
        self.chunk.entity_id_at(row)
    }

    /// Read-only view of `T`'s column, `None` if this chunk's archetype lacks `T`.
    pub fn read<T: Component>(&self) -> Option<&'a [T]> {
        let ptr = self.chunk.get_column::<T>()?;
        Some(unsafe { std::slice::from_raw_parts(ptr, self.chunk.len()) })
    }

    /// Mutable view of `T`'s column.
    ///
    /// # Safety
    /// Sound only when the caller's declared [`SystemAccess`](crate::system::SystemAccess)
    /// writes `T` and no other concurrently running system in the same stage reads or writes it
    /// — the scheduler guarantees this, so ordinary system code can call this safely.
    pub fn write<T: Component>(&self) -> Option<&'a mut [T]> {
        let ptr = unsafe { self.chunk.get_column_mut_unchecked::<T>()? };
        Some(unsafe { std::slice::from_raw_parts_mut(ptr, self.chunk.len()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health(f32);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Poison(f32);

    #[test]
    fn test_query_matches_required_and_excluded() {
        let registry = ComponentTypeRegistry::global();
        let health = registry.register::<Health>();
        let poison = registry.register::<Poison>();

        let mut mask = ComponentMask::EMPTY;
        mask.set(health);

        let query = Query::new().with::<Health>().without::<Poison>();
        assert!(query.matches(&mask));

        mask.set(poison);
        assert!(!query.matches(&mask));
        let _ = poison;
    }

    #[test]
    fn test_default_query_matches_everything() {
        let mut mask = ComponentMask::EMPTY;
        mask.set(3);
        assert!(Query::new().matches(&mask));
        assert!(Query::new().matches(&ComponentMask::EMPTY));
    }
}
