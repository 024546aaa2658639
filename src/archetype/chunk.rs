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

//! The Archetype Chunk: a fixed-byte SoA buffer holding up to `N` rows for one archetype mask.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::bitset::ComponentMask;
use crate::component::{Component, ComponentTypeRegistry};
use crate::entity::EntityId;
use crate::error::fatal;
use crate::utils::align_to;

/// One independent byte run inside the chunk buffer for a single SoA field of a component.
/// A plain (non-decomposed) component has exactly one field run spanning its whole size.
#[derive(Debug, Clone, Copy)]
struct FieldRun {
    field_index: usize,
    offset: usize,
    elem_size: usize,
    elem_align: usize,
}

#[derive(Debug, Clone)]
struct ColumnLayout {
    type_id: usize,
    byte_size: usize,
    drop_fn: Option<unsafe fn(*mut u8)>,
    fields: SmallVec<[FieldRun; 4]>,
}

/// A fixed-byte-size buffer interpreted as SoA columns for one component mask.
///
/// Capacity `N` is computed once at construction from the mask's registered component
/// layouts (see [`crate::utils::fit_capacity`]) and never changes; `AddEntity`/
/// `RemoveEntitySwapPop` only move the row cursor `n` within `[0, N]`. Column base pointers
/// are stable for the chunk's lifetime.
pub struct ArchetypeChunk {
    mask: ComponentMask,
    capacity: usize,
    len: usize,
    buffer: Vec<u8>,
    entity_ids_offset: usize,
    columns: FxHashMap<usize, ColumnLayout>,
}

impl ArchetypeChunk {
    /// Build a new chunk for `mask`, sized so its SoA columns (sparse components excluded)
    /// plus the trailing entity-id column fit within `chunk_bytes`.
    pub fn new(mask: ComponentMask, chunk_bytes: usize) -> Self {
        let registry = ComponentTypeRegistry::global();

        let mut metas = Vec::new();
        for type_id in mask.ones() {
            let meta = registry.meta(type_id).unwrap_or_else(|e| fatal(e));
            if meta.is_sparse {
                continue;
            }
            metas.push(meta);
        }

        // sort by type_id for deterministic layout regardless of mask bit iteration order.
        metas.sort_by_key(|m| m.type_id);

        let column_descs: Vec<(usize, usize)> =
            metas.iter().map(|m| (m.byte_size, m.align)).collect();
        let capacity = crate::utils::fit_capacity(&column_descs, chunk_bytes);

        let mut offset = 0usize;
        let mut columns = FxHashMap::default();
        for meta in &metas {
            offset = align_to(offset, meta.align);
            let column_start = offset;
            let mut fields = SmallVec::new();
            if meta.fields.len() <= 1 {
                fields.push(FieldRun {
                    field_index: 0,
                    offset: column_start,
                    elem_size: meta.byte_size,
                    elem_align: meta.align,
                });
                offset += meta.byte_size * capacity;
            } else {
                let mut field_offset = column_start;
                for (i, field) in meta.fields.iter().enumerate() {
                    field_offset = align_to(field_offset, field.align.max(1));
                    fields.push(FieldRun {
                        field_index: i,
                        offset: field_offset,
                        elem_size: field.size,
                        elem_align: field.align.max(1),
                    });
                    field_offset += field.size * capacity;
                }
                offset = field_offset;
            }
            columns.insert(
                meta.type_id,
                ColumnLayout {
                    type_id: meta.type_id,
                    byte_size: meta.byte_size,
                    drop_fn: meta.drop_fn,
                    fields,
                },
            );
        }

        offset = align_to(offset, std::mem::align_of::<u32>());
        let entity_ids_offset = offset;
        offset += std::mem::size_of::<u32>() * capacity * 2; // index + generation, packed as two u32 per row

        Self {
            mask,
            capacity,
            len: 0,
            buffer: vec![0u8; offset],
            entity_ids_offset,
            columns,
        }
    }

    pub fn mask(&self) -> ComponentMask {
        self.mask
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// Append `entity_id` at row `n`, returning the new row index. Column memory at the new
    /// row is left uninitialized; callers must write each relevant column themselves.
    pub fn add_entity(&mut self, entity_id: EntityId) -> usize {
        if self.len >= self.capacity {
            fatal(format!(
                "ArchetypeChunk::add_entity over capacity ({} >= {})",
                self.len, self.capacity
            ));
        }
        let row = self.len;
        self.len += 1;
        self.write_entity_id(row, entity_id);
        row
    }

    /// Copies the last row's entity id and column bytes into `row`, decrementing `n`.
    /// Returns the entity id that was swapped into `row` from the old last row, if that
    /// differs from `row` itself (the caller must fix up that entity's location).
    pub fn remove_entity_swap_pop(&mut self, row: usize) -> Option<EntityId> {
        if row >= self.len {
            fatal(format!(
                "ArchetypeChunk::remove_entity_swap_pop out of range ({} >= {})",
                row, self.len
            ));
        }
        let last = self.len - 1;
        let mut moved = None;
        if row != last {
            let moved_id = self.entity_id_at(last);
            for column in self.columns.values() {
                for field in &column.fields {
                    let stride = field.elem_size;
                    unsafe {
                        let base = self.buffer.as_mut_ptr().add(field.offset);
                        let src = base.add(last * stride);
                        let dst = base.add(row * stride);
                        std::ptr::copy_nonoverlapping(src, dst, stride);
                    }
                }
            }
            self.write_entity_id(row, moved_id);
            moved = Some(moved_id);
        } else {
            // drop the last row's components in place if they need drop glue.
            self.drop_row(last);
        }
        self.len -= 1;
        moved
    }

    fn drop_row(&mut self, row: usize) {
        for column in self.columns.values() {
            if let Some(drop_fn) = column.drop_fn {
                for field in &column.fields {
                    unsafe {
                        let ptr = self.buffer.as_mut_ptr().add(field.offset + row * field.elem_size);
                        drop_fn(ptr);
                    }
                }
            }
        }
    }

    /// Base pointer for component `T`'s column, or `None` if this chunk's mask lacks `T` or
    /// `T` is registered with more than one SoA field (use [`Self::field_ptr`] instead).
    pub fn get_column<T: Component>(&self) -> Option<*const T> {
        let type_id = ComponentTypeRegistry::global().type_id_of::<T>()?;
        let column = self.columns.get(&type_id)?;
        if column.fields.len() != 1 || column.byte_size != std::mem::size_of::<T>() {
            return None;
        }
        Some(unsafe { self.buffer.as_ptr().add(column.fields[0].offset) as *const T })
    }

    /// Mutable variant of [`Self::get_column`].
    pub fn get_column_mut<T: Component>(&mut self) -> Option<*mut T> {
        let type_id = ComponentTypeRegistry::global().type_id_of::<T>()?;
        let column = self.columns.get(&type_id)?;
        if column.fields.len() != 1 || column.byte_size != std::mem::size_of::<T>() {
            return None;
        }
        Some(unsafe { self.buffer.as_mut_ptr().add(column.fields[0].offset) as *mut T })
    }

    /// Same as [`Self::get_column_mut`] but callable through a shared reference.
    ///
    /// # Safety
    /// The caller must hold exclusive access to `T`'s column for as long as the returned
    /// pointer is used — guaranteed by the scheduler's conflict graph (§4.5): two systems
    /// only run concurrently against the same chunk when their declared `Write` sets are
    /// disjoint, so no two callers ever obtain a mutable pointer into the same column at once.
    pub unsafe fn get_column_mut_unchecked<T: Component>(&self) -> Option<*mut T> {
        let type_id = ComponentTypeRegistry::global().type_id_of::<T>()?;
        let column = self.columns.get(&type_id)?;
        if column.fields.len() != 1 || column.byte_size != std::mem::size_of::<T>() {
            return None;
        }
        Some(self.buffer.as_ptr().add(column.fields[0].offset) as *mut T)
    }

    /// Raw byte pointer to `row` within `type_id`'s single-field column (used by the generic
    /// Bundle spawn path, which writes full component values rather than going through field
    /// runs).
    pub fn component_ptr_mut(&mut self, type_id: usize, row: usize) -> Option<*mut u8> {
        let column = self.columns.get(&type_id)?;
        Some(unsafe { self.buffer.as_mut_ptr().add(column.fields[0].offset + row * column.byte_size) })
    }

    /// Base pointer for an individual SoA field of `type_id`'s column.
    pub fn field_ptr(&self, type_id: usize, field_index: usize) -> Option<*const u8> {
        let column = self.columns.get(&type_id)?;
        let field = column.fields.iter().find(|f| f.field_index == field_index)?;
        Some(unsafe { self.buffer.as_ptr().add(field.offset) })
    }

    pub fn field_ptr_mut(&mut self, type_id: usize, field_index: usize) -> Option<*mut u8> {
        let column = self.columns.get(&type_id)?;
        let field = column.fields.iter().find(|f| f.field_index == field_index)?;
        Some(unsafe { self.buffer.as_mut_ptr().add(field.offset) })
    }

    pub fn has_column(&self, type_id: usize) -> bool {
        self.columns.contains_key(&type_id)
    }

    fn write_entity_id(&mut self, row: usize, id: EntityId) {
        let offset = self.entity_ids_offset + row * std::mem::size_of::<u32>() * 2;
        unsafe {
            let ptr = self.buffer.as_mut_ptr().add(offset) as *mut u32;
            ptr.write(id.index());
            ptr.add(1).write(id.generation());
        }
    }

    pub fn entity_id_at(&self, row: usize) -> EntityId {
        debug_assert!(row < self.len);
        let offset = self.entity_ids_offset + row * std::mem::size_of::<u32>() * 2;
        unsafe {
            let ptr = self.buffer.as_ptr().add(offset) as *const u32;
            EntityId::new(ptr.read(), ptr.add(1).read())
        }
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        (0..self.len).map(|r| self.entity_id_at(r)).collect()
    }
}

impl Drop for ArchetypeChunk {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        for row in 0..self.len {
            self.drop_row(row);
        }
    }
}

// SAFETY: all interior mutability in ArchetypeChunk is explicit raw-pointer access gated by
// the owning ArchetypeManager's reader-writer lock; the chunk itself holds no non-Send/Sync
// state (a plain Vec<u8> buffer).
unsafe impl Send for ArchetypeChunk {}
unsafe impl Sync for ArchetypeChunk {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentTypeRegistry;

    #[derive(Debug, Clone, Copy)]
    struct Position {
        x: f32,
        y: f32,
        z: f32,
    }

    #[derive(Debug, Clone, Copy)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    fn mask_for(type_ids: &[usize]) -> ComponentMask {
        let mut m = ComponentMask::EMPTY;
        for id in type_ids {
            m.set(*id);
        }
        m
    }

    #[test]
    fn test_capacity_is_positive_for_small_components() {
        let registry = ComponentTypeRegistry::global();
        let pos = registry.register::<Position>();
        let vel = registry.register::<Velocity>();
        let chunk = ArchetypeChunk::new(mask_for(&[pos, vel]), 16 * 1024);
        assert!(chunk.capacity() > 0);
    }

    #[test]
    fn test_add_and_remove_swap_pop() {
        let registry = ComponentTypeRegistry::global();
        let pos = registry.register::<Position>();
        let mut chunk = ArchetypeChunk::new(mask_for(&[pos]), 16 * 1024);

        let e0 = EntityId::new(0, 0);
        let e1 = EntityId::new(1, 0);
        let e2 = EntityId::new(2, 0);

        let r0 = chunk.add_entity(e0);
        let r1 = chunk.add_entity(e1);
        let r2 = chunk.add_entity(e2);
        assert_eq!((r0, r1, r2), (0, 1, 2));
        assert_eq!(chunk.len(), 3);

        let moved = chunk.remove_entity_swap_pop(1);
        assert_eq!(moved, Some(e2));
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.entity_id_at(1), e2);
        assert_eq!(chunk.entity_id_at(0), e0);
    }

    #[test]
    fn test_remove_last_row_returns_none() {
        let registry = ComponentTypeRegistry::global();
        let pos = registry.register::<Position>();
        let mut chunk = ArchetypeChunk::new(mask_for(&[pos]), 16 * 1024);
        let e0 = EntityId::new(0, 0);
        chunk.add_entity(e0);
        let moved = chunk.remove_entity_swap_pop(0);
        assert_eq!(moved, None);
        assert_eq!(chunk.len(), 0);
    }

    #[test]
    #[should_panic]
    fn test_add_entity_over_capacity_is_fatal() {
        let registry = ComponentTypeRegistry::global();
        let pos = registry.register::<Position>();
        // tiny budget forces capacity down to something small/zero-ish; exercise overflow.
        let mut chunk = ArchetypeChunk::new(mask_for(&[pos]), 64);
        loop {
            chunk.add_entity(EntityId::new(0, 0));
        }
    }

    #[test]
    fn test_get_column_roundtrip() {
        let registry = ComponentTypeRegistry::global();
        let pos = registry.register::<Position>();
        let mut chunk = ArchetypeChunk::new(mask_for(&[pos]), 16 * 1024);
        let row = chunk.add_entity(EntityId::new(5, 0));
        let ptr = chunk.get_column_mut::<Position>().unwrap();
        unsafe {
            ptr.add(row).write(Position { x: 1.0, y: 2.0, z: 3.0 });
        }
        let read_ptr = chunk.get_column::<Position>().unwrap();
        let value = unsafe { *read_ptr.add(row) };
        assert_eq!(value.x, 1.0);
        assert_eq!(value.z, 3.0);
    }
}
