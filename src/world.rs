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

//! The Entity Manager and Archetype Manager (§4.3), combined into one `World`: the entity
//! store a [`crate::spatial::SpatialChunk`] owns. Maps `entity_id -> (chunk, row)`, allocates
//! and frees entity ids, and owns the archetype manager and the sparse component stores.
//!
//! Thread-safety follows §4.3: the location table and archetype list are guarded by a
//! reader-writer lock. Reads during system iteration take the shared lock for the duration of
//! the chunk pass; structural mutations (create/destroy/move) take the exclusive lock.

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::archetype::chunk::ArchetypeChunk;
use crate::archetype::Archetype;
use crate::bitset::ComponentMask;
use crate::component::{Bundle, Component, ComponentTypeRegistry};
use crate::config::EngineConfig;
use crate::entity::{EntityId, EntityIdAllocator, EntityLocation};
use crate::error::{fatal, EngineError, Result};
use crate::query::{Accessor, Query};
use crate::sparse::SparseStore;

struct Inner {
    locations: Vec<Option<EntityLocation>>,
    archetypes: Vec<Archetype>,
    archetype_index: AHashMap<ComponentMask, usize>,
    sparse: SparseStore,
}

/// Entity + Archetype store. One `World` belongs to exactly one
/// [`crate::spatial::SpatialChunk`]; the top-level orchestrator that owns levels and drives the
/// per-frame scheduler lives in [`crate::spatial`].
pub struct World {
    config: EngineConfig,
    entity_alloc: EntityIdAllocator,
    inner: RwLock<Inner>,
}

impl World {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            entity_alloc: EntityIdAllocator::new(config.max_entities),
            inner: RwLock::new(Inner {
                locations: {
                    let mut v = Vec::with_capacity(config.max_entities as usize);
                    v.resize(config.max_entities as usize, None);
                    v
                },
                archetypes: Vec::new(),
                archetype_index: AHashMap::new(),
                sparse: SparseStore::new(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// `CreateEntity(mask)`: allocate an id, find-or-create the archetype for `bundle`'s mask,
    /// find a chunk with capacity (appending one if needed), add the row, record the location.
    pub fn spawn<B: Bundle>(&self, bundle: B) -> EntityId {
        let id = self.entity_alloc.create();
        if id.is_sentinel() {
            fatal(format!(
                "EntityIdAllocator exhausted (capacity {})",
                self.entity_alloc.capacity()
            ));
        }

        let type_ids = B::type_ids();
        let mask = B::mask();

        let mut inner = self.inner.write();
        let archetype_idx = Self::find_or_create_archetype_locked(&mut inner, mask, self.config.chunk_bytes);
        let chunk_idx = inner.archetypes[archetype_idx].chunk_with_capacity();
        let chunk = inner.archetypes[archetype_idx].chunk_mut(chunk_idx);
        let row = chunk.add_entity(id);

        let mut ptrs = smallvec::SmallVec::<[*mut u8; crate::component::MAX_BUNDLE_COMPONENTS]>::new();
        for &type_id in &type_ids {
            let ptr = chunk
                .component_ptr_mut(type_id, row)
                .unwrap_or_else(|| fatal("bundle component missing from its own archetype chunk"));
            ptrs.push(ptr);
        }
        unsafe { bundle.write_components(&ptrs) };

        inner.locations[id.index() as usize] = Some(EntityLocation {
            archetype_index: archetype_idx as u32,
            chunk_index: chunk_idx as u32,
            row: row as u32,
        });

        id
    }

    fn find_or_create_archetype_locked(inner: &mut Inner, mask: ComponentMask, chunk_bytes: usize) -> usize {
        if let Some(&idx) = inner.archetype_index.get(&mask) {
            return idx;
        }
        let idx = inner.archetypes.len();
        inner.archetypes.push(Archetype::new(mask, chunk_bytes));
        inner.archetype_index.insert(mask, idx);
        idx
    }

    /// `DestroyEntity(entity_id)`: remove from its chunk (swap-pop), fix up the swapped
    /// entity's location entry, remove it from every sparse store, and free its id.
    pub fn despawn(&self, entity: EntityId) -> Result<()> {
        if !self.entity_alloc.is_alive(entity) {
            return Err(EngineError::EntityNotFound);
        }

        let mut inner = self.inner.write();
        let location = inner.locations[entity.index() as usize].take().ok_or(EngineError::EntityNotFound)?;

        let archetype = &mut inner.archetypes[location.archetype_index as usize];
        let chunk = archetype.chunk_mut(location.chunk_index as usize);
        if let Some(moved_id) = chunk.remove_entity_swap_pop(location.row as usize) {
            inner.locations[moved_id.index() as usize] = Some(EntityLocation {
                archetype_index: location.archetype_index,
                chunk_index: location.chunk_index,
                row: location.row,
            });
        }

        inner.sparse.remove_entity_everywhere(entity);
        self.entity_alloc.destroy(entity);
        Ok(())
    }

    /// `AddComponent`: move the entity to the archetype whose mask has `T`'s bit set, copying
    /// every shared column row-by-row and writing `value` into the new column.
    pub fn add_component<T: Component>(&self, entity: EntityId, value: T) -> Result<()> {
        let type_id = ComponentTypeRegistry::global().register::<T>();
        self.migrate(entity, |mask| mask.set(type_id), |chunk, row| {
            let ptr = chunk
                .component_ptr_mut(type_id, row)
                .unwrap_or_else(|| fatal("newly added component column missing after migration"));
            unsafe { (ptr as *mut T).write(value) };
        })
    }

    /// `RemoveComponent`: move the entity to the archetype with `T`'s bit cleared.
    pub fn remove_component<T: Component>(&self, entity: EntityId) -> Result<()> {
        let Some(type_id) = ComponentTypeRegistry::global().type_id_of::<T>() else {
            return Ok(());
        };
        self.migrate(entity, |mask| mask.clear(type_id), |_, _| {})
    }

    /// Shared machinery behind add/remove component: compute the destination mask, find-or-
    /// create that archetype, copy every column the two archetypes have in common, run
    /// `init_new` against the destination row for the toggled component, then swap-pop the
    /// entity out of its old chunk and update the location table.
    fn migrate(
        &self,
        entity: EntityId,
        toggle: impl FnOnce(&mut ComponentMask),
        init_new: impl FnOnce(&mut ArchetypeChunk, usize),
    ) -> Result<()> {
        if !self.entity_alloc.is_alive(entity) {
            return Err(EngineError::EntityNotFound);
        }

        let mut inner = self.inner.write();
        let old_location = inner.locations[entity.index() as usize].ok_or(EngineError::EntityNotFound)?;

        let old_mask = inner.archetypes[old_location.archetype_index as usize].mask();
        let mut new_mask = old_mask;
        toggle(&mut new_mask);

        let new_archetype_idx =
            Self::find_or_create_archetype_locked(&mut inner, new_mask, self.config.chunk_bytes);
        let new_chunk_idx = inner.archetypes[new_archetype_idx].chunk_with_capacity();

        let new_row = {
            let new_chunk = inner.archetypes[new_archetype_idx].chunk_mut(new_chunk_idx);
            new_chunk.add_entity(entity)
        };

        // copy every column both archetypes share.
        let shared: Vec<usize> = old_mask
            .ones()
            .filter(|id| new_mask.contains(*id))
            .collect();
        for type_id in shared {
            let meta = ComponentTypeRegistry::global().meta(type_id)?;
            if meta.is_sparse {
                continue;
            }
            let src = {
                let old_archetype = &mut inner.archetypes[old_location.archetype_index as usize];
                let old_chunk = old_archetype.chunk_mut(old_location.chunk_index as usize);
                old_chunk
                    .component_ptr_mut(type_id, old_location.row as usize)
                    .unwrap_or_else(|| fatal("shared component column missing during migration"))
            };
            let dst = {
                let new_archetype = &mut inner.archetypes[new_archetype_idx];
                let new_chunk = new_archetype.chunk_mut(new_chunk_idx);
                new_chunk
                    .component_ptr_mut(type_id, new_row)
                    .unwrap_or_else(|| fatal("shared component column missing during migration"))
            };
            unsafe { std::ptr::copy_nonoverlapping(src, dst, meta.byte_size) };
        }

        {
            let new_archetype = &mut inner.archetypes[new_archetype_idx];
            let new_chunk = new_archetype.chunk_mut(new_chunk_idx);
            init_new(new_chunk, new_row);
        }

        // remove the entity from its old chunk (swap-pop) and fix up whichever entity got
        // swapped into its old row.
        let old_archetype = &mut inner.archetypes[old_location.archetype_index as usize];
        let old_chunk = old_archetype.chunk_mut(old_location.chunk_index as usize);
        if let Some(moved_id) = old_chunk.remove_entity_swap_pop(old_location.row as usize) {
            inner.locations[moved_id.index() as usize] = Some(EntityLocation {
                archetype_index: old_location.archetype_index,
                chunk_index: old_location.chunk_index,
                row: old_location.row,
            });
        }

        inner.locations[entity.index() as usize] = Some(EntityLocation {
            archetype_index: new_archetype_idx as u32,
            chunk_index: new_chunk_idx as u32,
            row: new_row as u32,
        });

        Ok(())
    }

    /// `GetMask(entity_id)`: look up via the location table. Falls back to `None` rather than a
    /// linear chunk scan — a recovery-path scan is a debug-only tool, not a correctness
    /// requirement of the hot path.
    pub fn get_mask(&self, entity: EntityId) -> Option<ComponentMask> {
        let inner = self.inner.read();
        let location = (*inner.locations.get(entity.index() as usize)?)?;
        Some(inner.archetypes[location.archetype_index as usize].mask())
    }

    pub fn get_entity_location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.inner.read().locations.get(entity.index() as usize).copied().flatten()
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entity_alloc.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.inner.read().locations.iter().filter(|l| l.is_some()).count()
    }

    pub fn archetype_count(&self) -> usize {
        self.inner.read().archetypes.len()
    }

    pub fn with_sparse<T: Component, R>(&self, entity: EntityId, f: impl FnOnce(Option<&T>) -> R) -> R {
        let inner = self.inner.read();
        f(inner.sparse.get::<T>(entity))
    }

    pub fn insert_sparse<T: Component>(&self, entity: EntityId, value: T) -> Option<T> {
        self.inner.write().sparse.insert(entity, value)
    }

    pub fn remove_sparse<T: Component>(&self, entity: EntityId) -> bool {
        self.inner.write().sparse.remove::<T>(entity)
    }

    /// `MatchingChunks(query)`: run `f` once per chunk whose archetype mask satisfies `query`,
    /// holding the shared lock for the whole pass (§4.3/§5). `f` receives an [`Accessor`] for
    /// typed column access plus the chunk's row count.
    pub fn for_each_chunk(&self, query: &Query, mut f: impl FnMut(Accessor<'_>, usize)) {
        let inner = self.inner.read();
        for archetype in &inner.archetypes {
            if !query.matches(&archetype.mask()) {
                continue;
            }
            for chunk in archetype.chunks() {
                if chunk.is_empty() {
                    continue;
                }
                f(Accessor::new(chunk), chunk.len());
            }
        }
    }

    pub fn archetype_masks(&self) -> Vec<ComponentMask> {
        self.inner.read().archetypes.iter().map(|a| a.mask()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    fn small_world() -> World {
        World::new(EngineConfig { max_entities: 16, ..Default::default() })
    }

    #[test]
    fn test_spawn_three_then_destroy_middle_swap_pops() {
        // 3 entities, destroy the middle one, row 1 now holds row 2's entity.
        let world = small_world();
        let e0 = world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { x: 1.0, y: 0.0 }));
        let e1 = world.spawn((Position { x: 1.0, y: 0.0 }, Velocity { x: 1.0, y: 0.0 }));
        let e2 = world.spawn((Position { x: 2.0, y: 0.0 }, Velocity { x: 1.0, y: 0.0 }));

        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.archetype_count(), 1);

        world.despawn(e1).unwrap();
        assert_eq!(world.entity_count(), 2);

        let e2_location = world.get_entity_location(e2).unwrap();
        assert_eq!(e2_location.row, 1);
        assert!(world.is_alive(e0));
        assert!(!world.is_alive(e1));
        assert!(world.is_alive(e2));
    }

    #[test]
    fn test_add_remove_component_round_trip_preserves_archetype_count() {
        // CreateEntity -> AddComponent(T) -> RemoveComponent(T) -> DestroyEntity leaves the
        // world with the archetype set it started with, up to chunk row counts.
        let world = small_world();
        let e = world.spawn((Position { x: 1.0, y: 2.0 },));
        let before = world.archetype_count();

        world.add_component(e, Velocity { x: 5.0, y: 5.0 }).unwrap();
        assert_eq!(world.get_mask(e).unwrap().popcount(), 2);

        world.remove_component::<Velocity>(e).unwrap();
        assert_eq!(world.get_mask(e).unwrap().popcount(), 1);

        // the position data must have survived both migrations untouched.
        let mut seen = false;
        world.for_each_chunk(&Query::new().with::<Position>(), |accessor, len| {
            let positions = accessor.read::<Position>().unwrap();
            for i in 0..len {
                if accessor.entity_at(i) == e {
                    assert_eq!(positions[i], Position { x: 1.0, y: 2.0 });
                    seen = true;
                }
            }
        });
        assert!(seen);

        world.despawn(e).unwrap();
        assert_eq!(world.archetype_count(), before + 1); // the Position+Velocity archetype persists forever (§3)
    }

    #[test]
    fn test_destroy_unknown_entity_errors() {
        let world = small_world();
        let e = world.spawn((Position { x: 0.0, y: 0.0 },));
        world.despawn(e).unwrap();
        assert!(world.despawn(e).is_err());
    }

    #[test]
    fn test_for_each_chunk_respects_exclusion() {
        let world = small_world();
        world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { x: 0.0, y: 0.0 }));
        world.spawn((Position { x: 0.0, y: 0.0 },));

        let mut matched = 0usize;
        world.for_each_chunk(&Query::new().with::<Position>().without::<Velocity>(), |_, len| {
            matched += len;
        });
        assert_eq!(matched, 1);
    }
}
