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

//! Service locator: a type-keyed registry of engine-wide singletons (render service, physics
//! service, audio mixer, asset manager, ...) shared by reference across every system.
//!
//! Services are registered once, addressed by type, and optionally participate in an ordered
//! per-frame update pass. Static services (registered during [`ServiceLocator::init`]) cannot
//! be unregistered; dynamic services (registered later via [`ServiceLocator::register`]) can be,
//! in which case the vacated update slot is filled by swap-popping the last entry so update
//! order among the remaining services never needs to be rebuilt from scratch.

use std::any::{Any, TypeId};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{EngineError, Result};

/// Marker for anything that can live in the locator. Implemented for every `Send + Sync +
/// 'static` type; no manual impl required.
pub trait Service: Any + Send + Sync {}
impl<T: Any + Send + Sync> Service for T {}

/// A service that wants a slice of every frame's update pass. Both methods take `&self`:
/// services needing mutation synchronize internally (`parking_lot::Mutex`/`RwLock`), matching
/// how they're shared as `Arc<T>` across systems.
///
/// [`ServiceLocator::update_all`] calls `pre_update` on every updatable service, in list order,
/// before calling `update` on any of them — so a service's `pre_update` never observes another
/// service's `update` from the same frame. Most services have nothing to do in the pre-pass and
/// can rely on the default no-op.
pub trait UpdateService: Service {
    fn pre_update(&self, _delta_time: f64) {}

    fn update(&self, delta_time: f64);
}

type UpdateThunk = Box<dyn Fn(&dyn Any, f64) + Send + Sync>;
type PreUpdateThunk = Box<dyn Fn(&dyn Any, f64) + Send + Sync>;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    is_static: bool,
}

#[derive(Default)]
struct Inner {
    services: FxHashMap<TypeId, Entry>,
    update_order: Vec<TypeId>,
    update_index: FxHashMap<TypeId, usize>,
    update_thunks: FxHashMap<TypeId, UpdateThunk>,
    pre_update_thunks: FxHashMap<TypeId, PreUpdateThunk>,
}

/// Engine-wide service registry. Cheap to share by reference; internally synchronized so
/// registration and lookup can both happen from system code running in the thread pool.
#[derive(Default)]
pub struct ServiceLocator {
    inner: RwLock<Inner>,
    initialized: std::sync::atomic::AtomicBool,
}

impl ServiceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-time bulk registration of the engine's built-in static services. Calling this twice
    /// is a programming error (§7: fatal).
    pub fn init(&self, register: impl FnOnce(&ServiceLocator)) {
        if self.initialized.swap(true, std::sync::atomic::Ordering::SeqCst) {
            crate::error::fatal("ServiceLocator::init called more than once");
        }
        register(self);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn register_inner<T: Service + 'static>(&self, value: T, is_static: bool) -> Result<Arc<T>> {
        let type_id = TypeId::of::<T>();
        let mut inner = self.inner.write();
        if inner.services.contains_key(&type_id) {
            return Err(EngineError::ServiceAlreadyRegistered(std::any::type_name::<T>()));
        }
        let arc = Arc::new(value);
        inner.services.insert(type_id, Entry { value: arc.clone(), is_static });
        Ok(arc)
    }

    /// Register a static service. Only callable from within the closure passed to [`Self::init`]
    /// in spirit (nothing enforces that mechanically, matching the original's single-use
    /// convention) — static services are never unregistered.
    pub fn register_static<T: Service + 'static>(&self, value: T) -> Result<Arc<T>> {
        self.register_inner(value, true)
    }

    /// Register a dynamic service, later removable via [`Self::unregister`].
    pub fn register<T: Service + 'static>(&self, value: T) -> Result<Arc<T>> {
        self.register_inner(value, false)
    }

    /// Register a dynamic service that also participates in the per-frame update pass.
    pub fn register_updatable<T: UpdateService + 'static>(&self, value: T) -> Result<Arc<T>> {
        let arc = self.register_inner(value, false)?;
        self.add_to_update_order::<T>();
        Ok(arc)
    }

    fn add_to_update_order<T: UpdateService + 'static>(&self) {
        let type_id = TypeId::of::<T>();
        let mut inner = self.inner.write();
        let index = inner.update_order.len();
        inner.update_order.push(type_id);
        inner.update_index.insert(type_id, index);
        inner.update_thunks.insert(
            type_id,
            Box::new(|any: &dyn Any, dt: f64| {
                any.downcast_ref::<T>()
                    .expect("service update thunk type mismatch")
                    .update(dt);
            }),
        );
        inner.pre_update_thunks.insert(
            type_id,
            Box::new(|any: &dyn Any, dt: f64| {
                any.downcast_ref::<T>()
                    .expect("service pre_update thunk type mismatch")
                    .pre_update(dt);
            }),
        );
    }

    /// Unregister a dynamic service. Fatal if `T` is static (mirrors the original's
    /// `static_assert`).
    pub fn unregister<T: Service + 'static>(&self) {
        let type_id = TypeId::of::<T>();
        let mut inner = self.inner.write();

        if let Some(entry) = inner.services.get(&type_id) {
            if entry.is_static {
                crate::error::fatal("cannot unregister a static service");
            }
        } else {
            return;
        }

        inner.services.remove(&type_id);

        if let Some(index) = inner.update_index.remove(&type_id) {
            let last = inner.update_order.len() - 1;
            inner.update_order.swap(index, last);
            inner.update_order.pop();
            inner.update_thunks.remove(&type_id);
            inner.pre_update_thunks.remove(&type_id);
            if index != last {
                let moved = inner.update_order[index];
                inner.update_index.insert(moved, index);
            }
        }
    }

    pub fn get<T: Service + 'static>(&self) -> Option<Arc<T>> {
        let inner = self.inner.read();
        inner
            .services
            .get(&TypeId::of::<T>())
            .map(|entry| entry.value.clone().downcast::<T>().expect("service type mismatch"))
    }

    pub fn is_registered<T: Service + 'static>(&self) -> bool {
        self.inner.read().services.contains_key(&TypeId::of::<T>())
    }

    /// Runs `pre_update` then `update` on every registered update service, in list order
    /// (swap-pop reordering notwithstanding — order among survivors is preserved, only the gap
    /// is filled). `pre_update` runs for the whole list before `update` runs for any of it, so
    /// no service's `update` can observe a later service's `pre_update` out of phase.
    pub fn update_all(&self, delta_time: f64) {
        let inner = self.inner.read();
        for type_id in &inner.update_order {
            let entry = &inner.services[type_id];
            let thunk = &inner.pre_update_thunks[type_id];
            thunk(entry.value.as_ref(), delta_time);
        }
        for type_id in &inner.update_order {
            let entry = &inner.services[type_id];
            let thunk = &inner.update_thunks[type_id];
            thunk(entry.value.as_ref(), delta_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Counter(Mutex<u32>);
    impl UpdateService for Counter {
        fn update(&self, _delta_time: f64) {
            *self.0.lock() += 1;
        }
    }

    #[test]
    fn test_register_and_get() {
        let locator = ServiceLocator::new();
        locator.register(42u32).unwrap();
        assert_eq!(*locator.get::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_duplicate_registration_errors() {
        let locator = ServiceLocator::new();
        locator.register(1u32).unwrap();
        assert!(locator.register(2u32).is_err());
    }

    #[test]
    fn test_update_all_runs_every_updatable_service() {
        let locator = ServiceLocator::new();
        locator.register_updatable(Counter(Mutex::new(0))).unwrap();
        locator.update_all(1.0 / 60.0);
        locator.update_all(1.0 / 60.0);
        assert_eq!(*locator.get::<Counter>().unwrap().0.lock(), 2);
    }

    #[test]
    fn test_pre_update_runs_for_every_service_before_update_runs_for_any() {
        struct Tracking(Mutex<Vec<&'static str>>);
        impl UpdateService for Tracking {
            fn pre_update(&self, _delta_time: f64) {
                self.0.lock().push("pre");
            }
            fn update(&self, _delta_time: f64) {
                self.0.lock().push("update");
            }
        }

        let locator = ServiceLocator::new();
        locator.register_updatable(Tracking(Mutex::new(Vec::new()))).unwrap();
        locator.update_all(1.0 / 60.0);
        assert_eq!(*locator.get::<Tracking>().unwrap().0.lock(), vec!["pre", "update"]);
    }

    #[test]
    fn test_pre_update_default_is_a_no_op() {
        // Counter relies on the default `pre_update` impl; update_all must not panic or skip it.
        let locator = ServiceLocator::new();
        locator.register_updatable(Counter(Mutex::new(0))).unwrap();
        locator.update_all(1.0 / 60.0);
        assert_eq!(*locator.get::<Counter>().unwrap().0.lock(), 1);
    }

    #[test]
    fn test_unregister_preserves_remaining_update_order_membership() {
        struct A(Mutex<u32>);
        impl UpdateService for A {
            fn update(&self, _dt: f64) {
                *self.0.lock() += 1;
            }
        }
        struct B(Mutex<u32>);
        impl UpdateService for B {
            fn update(&self, _dt: f64) {
                *self.0.lock() += 1;
            }
        }

        let locator = ServiceLocator::new();
        locator.register_updatable(A(Mutex::new(0))).unwrap();
        locator.register_updatable(B(Mutex::new(0))).unwrap();
        locator.unregister::<A>();
        locator.update_all(1.0);
        assert_eq!(*locator.get::<B>().unwrap().0.lock(), 1);
        assert!(locator.get::<A>().is_none());
    }
}
