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

//! Component types, the global Component Type Registry, and Bundles.
//!
//! Components are data attached to entities. The registry assigns each distinct component
//! type a small dense [`ComponentMask`](crate::bitset::ComponentMask)-indexable id the first
//! time it is registered, and records the byte layout Archetype Chunks need to lay the type
//! out as an SoA column. Bundles group multiple components for spawning in one call.

use std::any::TypeId;
use std::sync::OnceLock;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use crate::bitset::{ComponentMask, MAX_COMPONENT_TYPES};
use crate::error::{EngineError, Result};

/// Maximum number of components supported by a single [`Bundle`].
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for components. Components must be `'static` (no borrowed data) and
/// `Send + Sync` so chunks can be iterated from worker threads.
pub trait Component: 'static + Send + Sync {}

/// Automatically implement Component for all valid types.
impl<T: 'static + Send + Sync> Component for T {}

/// Describes one scalar field of an SoA-decomposed component, used by [`ArchetypeChunk`] to
/// lay the component out as several parallel sub-columns rather than one opaque byte run.
///
/// [`ArchetypeChunk`]: crate::archetype::chunk::ArchetypeChunk
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
    pub align: usize,
}

/// Opt-in trait for components that want per-field SoA decomposition inside the chunk
/// (e.g. a `Transform`'s position/rotation/scale laid out as three independent runs so a
/// system touching only position doesn't pull rotation/scale cache lines). Components that
/// don't implement this are stored as a single field spanning their full size — ordinary AoS
/// layout within one SoA column, the documented fallback for types without an SoA decomposition.
pub trait SoaFields: Component + Sized {
    fn soa_fields() -> &'static [FieldDescriptor];
}

/// `{size, align, is_sparse, SoA field descriptors}` recorded for one registered component
/// type.
#[derive(Debug, Clone)]
pub struct ComponentMeta {
    pub type_id: usize,
    pub byte_size: usize,
    pub align: usize,
    pub is_sparse: bool,
    pub fields: SmallVec<[FieldDescriptor; 4]>,
    pub drop_fn: Option<unsafe fn(*mut u8)>,
    pub type_name: &'static str,
}

unsafe fn drop_in_place_as<T>(ptr: *mut u8) {
    std::ptr::drop_in_place(ptr as *mut T);
}

struct RegistryInner {
    by_type: FxHashMap<TypeId, usize>,
    metas: Vec<ComponentMeta>,
}

/// Process-wide `type_id -> ComponentMeta` map. Registration is idempotent per Rust type;
/// ids are assigned densely in first-registration order so they can index directly into a
/// [`ComponentMask`]. Must be initialized before any [`World`](crate::world::World) is built
/// and is read-mostly thereafter — modeled as a singleton whose lifetime straddles process
/// init and teardown, guarded by a `parking_lot::RwLock`.
pub struct ComponentTypeRegistry {
    inner: RwLock<RegistryInner>,
}

impl ComponentTypeRegistry {
    fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner { by_type: FxHashMap::default(), metas: Vec::new() }),
        }
    }

    /// The process-wide registry instance.
    pub fn global() -> &'static ComponentTypeRegistry {
        static INSTANCE: OnceLock<ComponentTypeRegistry> = OnceLock::new();
        INSTANCE.get_or_init(ComponentTypeRegistry::new)
    }

    /// Register `T` as a plain (AoS-within-column) component if not already registered.
    /// Returns the assigned type id either way.
    pub fn register<T: Component>(&self) -> usize {
        self.register_with_fields::<T>(false, None)
    }

    /// Register `T` as a sparse component (stored out-of-chunk, keyed by entity id).
    pub fn register_sparse<T: Component>(&self) -> usize {
        self.register_with_fields::<T>(true, None)
    }

    /// Register `T` with explicit SoA field decomposition.
    pub fn register_soa<T: SoaFields>(&self) -> usize {
        self.register_with_fields::<T>(false, Some(T::soa_fields()))
    }

    fn register_with_fields<T: Component>(
        &self,
        is_sparse: bool,
        fields: Option<&'static [FieldDescriptor]>,
    ) -> usize {
        let type_id = TypeId::of::<T>();
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.by_type.get(&type_id) {
                return id;
            }
        }
        let mut inner = self.inner.write();
        // another thread may have registered while we waited for the write lock.
        if let Some(&id) = inner.by_type.get(&type_id) {
            return id;
        }
        let id = inner.metas.len();
        assert!(id < MAX_COMPONENT_TYPES, "component type registry exhausted (max {MAX_COMPONENT_TYPES})");

        let fields: SmallVec<[FieldDescriptor; 4]> = match fields {
            Some(fs) => fs.iter().copied().collect(),
            None => smallvec![FieldDescriptor {
                name: "",
                offset: 0,
                size: std::mem::size_of::<T>(),
                align: std::mem::align_of::<T>().max(1),
            }],
        };

        inner.metas.push(ComponentMeta {
            type_id: id,
            byte_size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>().max(1),
            is_sparse,
            fields,
            drop_fn: if std::mem::needs_drop::<T>() { Some(drop_in_place_as::<T>) } else { None },
            type_name: std::any::type_name::<T>(),
        });
        inner.by_type.insert(type_id, id);
        id
    }

    /// Look up the type id for an already-registered type, without registering it.
    pub fn type_id_of<T: Component>(&self) -> Option<usize> {
        self.inner.read().by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Fetch metadata for a registered type id.
    pub fn meta(&self, type_id: usize) -> Result<ComponentMeta> {
        self.inner
            .read()
            .metas
            .get(type_id)
            .cloned()
            .ok_or(EngineError::UnknownComponentType)
    }

    pub fn mask_of(&self, type_ids: &[usize]) -> ComponentMask {
        let mut mask = ComponentMask::EMPTY;
        for &id in type_ids {
            mask.set(id);
        }
        mask
    }
}

/// Bundle of components spawned together.
pub trait Bundle: Send + Sync + 'static {
    /// Type ids (registering each type lazily) of every component in the bundle.
    fn type_ids() -> SmallVec<[usize; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Component mask for this bundle.
    fn mask() -> ComponentMask
    where
        Self: Sized,
    {
        let mut mask = ComponentMask::EMPTY;
        for id in Self::type_ids() {
            mask.set(id);
        }
        mask
    }

    /// Write each component into the byte pointer the chunk has allocated for it.
    ///
    /// # Safety
    /// Caller must ensure `ptrs[i]` points at `size_of` valid, properly aligned, uninitialized
    /// bytes for the i-th component of the bundle, in the same order as [`Bundle::type_ids`].
    unsafe fn write_components(self, ptrs: &[*mut u8]);
}

macro_rules! impl_bundle {
    ($($T:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn type_ids() -> SmallVec<[usize; MAX_BUNDLE_COMPONENTS]> {
                let registry = ComponentTypeRegistry::global();
                smallvec![$(registry.register::<$T>()),*]
            }

            unsafe fn write_components(self, ptrs: &[*mut u8]) {
                let ($($T,)*) = self;
                let mut i = 0;
                $(
                    std::ptr::write(ptrs[i] as *mut $T, $T);
                    i += 1;
                )*
                let _ = i;
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);
