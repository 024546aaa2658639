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

//! Sparse component storage: out-of-chunk, keyed by entity id. Still counted in the entity's
//! mask for query matching, but never laid out in an Archetype Chunk.

use std::any::Any;

use rustc_hash::FxHashMap;

use crate::component::{Component, ComponentTypeRegistry};
use crate::entity::EntityId;

trait SparseColumn: Send + Sync {
    fn remove_any(&mut self, id: EntityId) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypedSparseColumn<T: Component> {
    values: FxHashMap<EntityId, T>,
}

impl<T: Component> SparseColumn for TypedSparseColumn<T> {
    fn remove_any(&mut self, id: EntityId) -> bool {
        self.values.remove(&id).is_some()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Per-type tables for sparse components, addressed by [`ComponentTypeRegistry`] type id.
#[derive(Default)]
pub struct SparseStore {
    columns: FxHashMap<usize, Box<dyn SparseColumn>>,
}

impl SparseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn type_id_for<T: Component>() -> usize {
        ComponentTypeRegistry::global().register_sparse::<T>()
    }

    pub fn insert<T: Component>(&mut self, entity: EntityId, value: T) -> Option<T> {
        let type_id = Self::type_id_for::<T>();
        let column = self
            .columns
            .entry(type_id)
            .or_insert_with(|| Box::new(TypedSparseColumn::<T> { values: FxHashMap::default() }));
        let typed = column
            .as_any_mut()
            .downcast_mut::<TypedSparseColumn<T>>()
            .expect("sparse column type mismatch");
        typed.values.insert(entity, value)
    }

    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let type_id = ComponentTypeRegistry::global().type_id_of::<T>()?;
        let column = self.columns.get(&type_id)?;
        let typed = column.as_any().downcast_ref::<TypedSparseColumn<T>>()?;
        typed.values.get(&entity)
    }

    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let type_id = ComponentTypeRegistry::global().type_id_of::<T>()?;
        let column = self.columns.get_mut(&type_id)?;
        let typed = column.as_any_mut().downcast_mut::<TypedSparseColumn<T>>()?;
        typed.values.get_mut(&entity)
    }

    pub fn remove<T: Component>(&mut self, entity: EntityId) -> bool {
        match ComponentTypeRegistry::global().type_id_of::<T>() {
            Some(type_id) => self
                .columns
                .get_mut(&type_id)
                .map(|c| c.remove_any(entity))
                .unwrap_or(false),
            None => false,
        }
    }

    /// Remove `entity` from every sparse column, used by `DestroyEntity`.
    pub fn remove_entity_everywhere(&mut self, entity: EntityId) {
        for column in self.columns.values_mut() {
            column.remove_any(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tag(u32);

    #[test]
    fn test_insert_get_remove() {
        let mut store = SparseStore::new();
        let e = EntityId::new(1, 0);
        assert!(store.insert(e, Tag(7)).is_none());
        assert_eq!(store.get::<Tag>(e), Some(&Tag(7)));
        assert!(store.remove::<Tag>(e));
        assert_eq!(store.get::<Tag>(e), None);
    }

    #[test]
    fn test_remove_entity_everywhere() {
        #[derive(Debug, Clone, Copy)]
        struct Other(u32);

        let mut store = SparseStore::new();
        let e = EntityId::new(2, 0);
        store.insert(e, Tag(1));
        store.insert(e, Other(2));
        store.remove_entity_everywhere(e);
        assert_eq!(store.get::<Tag>(e), None);
        assert_eq!(store.get::<Other>(e), None);
    }
}
