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

//! The Resource Manager Base (§4.7): a generic, ref-counted slot table for GPU-ish resources
//! (buffers, textures, shaders, materials, meshes, PSOs, samplers) with frame-delayed
//! destruction and a content-addressed cache. Concrete resource kinds plug in by implementing
//! [`ResourceFactory`]; this module owns the slot/refcount/pending-delete/cache machinery every
//! kind shares.
//!
//! Also hosts [`TicketTable`], the same generational-slot idea stripped down for resolving
//! asynchronously published results (audio voice ids, physics body ids) rather than
//! ref-counted resources.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::error::{fatal, EngineError, Result};
use crate::handle::GenHandle;

/// Marker tag distinguishing [`ResourceHandle`] from other [`GenHandle`] kinds.
pub struct ResourceTag;
pub type ResourceHandle = GenHandle<ResourceTag>;

/// What a concrete resource kind (texture manager, mesh manager, ...) must supply. `Desc` is
/// the creation descriptor; `Key` is the content-cache key derived from it (often `Desc` itself
/// when it's already `Hash + Eq`); `Data` is the resource payload stored in the slot.
pub trait ResourceFactory {
    type Desc;
    type Key: Eq + Hash + Clone;
    type Data;

    /// Derive the content-cache key `FindExisting`/`RegisterKey` index by.
    fn key_for(desc: &Self::Desc) -> Self::Key;

    /// `CreateResource`: build the payload for a cache-miss `Add`.
    fn create(&self, desc: &Self::Desc) -> Result<Self::Data>;

    /// `DestroyResource`: release backend state for a reclaimed slot.
    fn destroy(&self, data: Self::Data);
}

struct Slot<T> {
    data: Option<T>,
    generation: u32,
    alive: bool,
    refcount: AtomicU32,
}

#[derive(Clone, Copy)]
struct PendingDelete {
    index: usize,
    generation: u32,
    delete_sync: u64,
}

/// Generic ref-counted resource slot table. One instance per resource kind (textures, meshes,
/// ...), each wrapping a different [`ResourceFactory`].
pub struct ResourceManager<F: ResourceFactory> {
    factory: F,
    slots: RwLock<Vec<Slot<F::Data>>>,
    free_list: Mutex<Vec<usize>>,
    content_cache: RwLock<FxHashMap<F::Key, ResourceHandle>>,
    pending: Mutex<Vec<PendingDelete>>,
}

impl<F: ResourceFactory> ResourceManager<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            slots: RwLock::new(Vec::new()),
            free_list: Mutex::new(Vec::new()),
            content_cache: RwLock::new(FxHashMap::default()),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// `Add(desc) -> (handle, was_cache_hit)`. A cache hit bumps the refcount and cancels any
    /// pending delete for the slot; a miss allocates (or reuses) a slot, delegates creation to
    /// the factory, and registers the new key.
    pub fn add(&self, desc: F::Desc) -> Result<(ResourceHandle, bool)> {
        let key = F::key_for(&desc);

        if let Some(&handle) = self.content_cache.read().get(&key) {
            let slots = self.slots.read();
            let slot = &slots[handle.index() as usize];
            if slot.generation != handle.generation() || !slot.alive {
                fatal("content cache held a handle to a dead resource slot");
            }
            slot.refcount.fetch_add(1, Ordering::Relaxed);
            drop(slots);
            self.cancel_pending(handle);
            return Ok((handle, true));
        }

        let mut slots = self.slots.write();
        let reused_index = self.free_list.lock().pop();
        let (index, generation) = match reused_index {
            Some(index) => {
                let generation = slots[index].generation.wrapping_add(1);
                (index, generation)
            }
            None => (slots.len(), 0),
        };

        let data = self.factory.create(&desc)?;

        if index == slots.len() {
            slots.push(Slot { data: Some(data), generation, alive: true, refcount: AtomicU32::new(1) });
        } else {
            let slot = &mut slots[index];
            slot.data = Some(data);
            slot.generation = generation;
            slot.alive = true;
            slot.refcount.store(1, Ordering::Relaxed);
        }
        drop(slots);

        let handle = ResourceHandle::new(index as u32, generation);
        self.content_cache.write().insert(key, handle);
        Ok((handle, false))
    }

    /// Classic retain. Fatal on a stale or dead handle.
    pub fn add_ref(&self, handle: ResourceHandle) {
        let slots = self.slots.read();
        let slot = self.live_slot(&slots, handle);
        slot.refcount.fetch_add(1, Ordering::Relaxed);
    }

    /// Classic release. When the refcount transitions 1→0, enqueues the slot for deferred
    /// destruction at `delete_sync`; a duplicate enqueue only extends the deadline.
    pub fn release(&self, handle: ResourceHandle, delete_sync: u64) {
        let slots = self.slots.read();
        let slot = self.live_slot(&slots, handle);
        let previous = slot.refcount.fetch_sub(1, Ordering::AcqRel);
        if previous == 0 {
            fatal("resource refcount underflow on release");
        }
        drop(slots);
        if previous == 1 {
            self.enqueue_delete(handle, delete_sync);
        }
    }

    /// `Get(h)`: shared-locked read access. Fatal if stale or not alive.
    pub fn get(&self, handle: ResourceHandle) -> parking_lot::MappedRwLockReadGuard<'_, F::Data> {
        let slots = self.slots.read();
        self.live_slot(&slots, handle);
        parking_lot::RwLockReadGuard::map(slots, |slots| {
            slots[handle.index() as usize].data.as_ref().expect("alive slot missing data")
        })
    }

    fn live_slot<'a>(&self, slots: &'a [Slot<F::Data>], handle: ResourceHandle) -> &'a Slot<F::Data> {
        match slots.get(handle.index() as usize) {
            Some(slot) if slot.generation == handle.generation() && slot.alive => slot,
            _ => fatal("stale or dead resource handle"),
        }
    }

    fn enqueue_delete(&self, handle: ResourceHandle, delete_sync: u64) {
        let mut pending = self.pending.lock();
        let index = handle.index() as usize;
        if let Some(entry) = pending.iter_mut().find(|p| p.index == index && p.generation == handle.generation()) {
            entry.delete_sync = entry.delete_sync.max(delete_sync);
        } else {
            pending.push(PendingDelete { index, generation: handle.generation(), delete_sync });
        }
    }

    fn cancel_pending(&self, handle: ResourceHandle) {
        let index = handle.index() as usize;
        self.pending.lock().retain(|p| !(p.index == index && p.generation == handle.generation()));
    }

    /// `ProcessDeferredDeletes(current_frame)`: reclaim every pending slot whose delete_sync has
    /// elapsed and whose refcount is still zero (an intervening `Add` reanimating the slot wins
    /// over the pending delete, per the open question on the reanimation race).
    pub fn process_deferred_deletes(&self, current_frame: u64) {
        let ready: Vec<PendingDelete> = {
            let mut pending = self.pending.lock();
            let mut ready = Vec::new();
            pending.retain(|entry| {
                if entry.delete_sync <= current_frame {
                    ready.push(*entry);
                    false
                } else {
                    true
                }
            });
            ready
        };

        for entry in ready {
            let data = {
                let mut slots = self.slots.write();
                let slot = &mut slots[entry.index];
                if slot.generation != entry.generation || slot.refcount.load(Ordering::Acquire) != 0 {
                    None
                } else {
                    slot.alive = false;
                    slot.data.take()
                }
            };

            let Some(data) = data else { continue };
            self.remove_from_caches(entry.index, entry.generation);
            self.factory.destroy(data);
            self.free_list.lock().push(entry.index);
        }
    }

    fn remove_from_caches(&self, index: usize, generation: u32) {
        let handle = ResourceHandle::new(index as u32, generation);
        self.content_cache.write().retain(|_, h| *h != handle);
    }

    pub fn is_valid(&self, handle: ResourceHandle) -> bool {
        let slots = self.slots.read();
        matches!(slots.get(handle.index() as usize), Some(slot) if slot.generation == handle.generation() && slot.alive)
    }
}

/// Marker tag for [`Ticket`].
pub struct TicketTag;
pub type Ticket = GenHandle<TicketTag>;

struct TicketSlot<T> {
    generation: u32,
    value: Option<T>,
}

/// Fixed-capacity generational slot table for resolving asynchronously-published results (an
/// audio backend's voice id once `Play` is processed, a physics backend's body id once
/// `CreateBody` is applied). `reserve` hands the caller a ticket immediately; the producing
/// thread later calls `resolve` once the real value is known.
pub struct TicketTable<T> {
    slots: RwLock<Vec<TicketSlot<T>>>,
    free: Mutex<VecDeque<usize>>,
    capacity: usize,
}

impl<T> TicketTable<T> {
    pub fn new(capacity: usize) -> Self {
        Self { slots: RwLock::new(Vec::new()), free: Mutex::new(VecDeque::new()), capacity }
    }

    /// Reserve a ticket for a result that hasn't arrived yet. Fatal if the table is at capacity
    /// (mirrors the audio/physics command queues' "no silent drop" policy: callers are expected
    /// to back off before reserving past capacity, not to have the table absorb the overflow).
    pub fn reserve(&self) -> Ticket {
        if let Some(index) = self.free.lock().pop_front() {
            let mut slots = self.slots.write();
            slots[index].value = None;
            return Ticket::new(index as u32, slots[index].generation);
        }

        let mut slots = self.slots.write();
        if slots.len() >= self.capacity {
            fatal(format!("ticket table exhausted (capacity {})", self.capacity));
        }
        slots.push(TicketSlot { generation: 0, value: None });
        Ticket::new((slots.len() - 1) as u32, 0)
    }

    /// Producer-side: fill in the result for `ticket`. No-op if the ticket's generation is
    /// stale (the reservation was already resolved-and-freed and reused).
    pub fn resolve(&self, ticket: Ticket, value: T) {
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get_mut(ticket.index() as usize) {
            if slot.generation == ticket.generation() {
                slot.value = Some(value);
            }
        }
    }

    /// Consumer-side: take the result if it has arrived, freeing the ticket's slot for reuse
    /// and bumping its generation so the consumed ticket can no longer resolve.
    pub fn take(&self, ticket: Ticket) -> Option<T> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(ticket.index() as usize)?;
        if slot.generation != ticket.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        drop(slots);
        self.free.lock().push_back(ticket.index() as usize);
        Some(value)
    }

    pub fn is_resolved(&self, ticket: Ticket) -> bool {
        let slots = self.slots.read();
        slots
            .get(ticket.index() as usize)
            .map(|s| s.generation == ticket.generation() && s.value.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct TextureDesc {
        path: String,
    }

    struct TextureData {
        bytes: Vec<u8>,
    }

    struct TextureFactory {
        destroyed: Mutex<Vec<String>>,
    }

    impl ResourceFactory for TextureFactory {
        type Desc = TextureDesc;
        type Key = String;
        type Data = TextureData;

        fn key_for(desc: &Self::Desc) -> Self::Key {
            desc.path.clone()
        }

        fn create(&self, desc: &Self::Desc) -> Result<Self::Data> {
            Ok(TextureData { bytes: desc.path.as_bytes().to_vec() })
        }

        fn destroy(&self, data: Self::Data) {
            self.destroyed.lock().push(String::from_utf8(data.bytes).unwrap());
        }
    }

    #[test]
    fn test_add_same_content_twice_shares_one_slot() {
        // same content key twice should hit the cache and share one slot.
        let manager = ResourceManager::new(TextureFactory { destroyed: Mutex::new(Vec::new()) });
        let (h1, hit1) = manager.add(TextureDesc { path: "a.png".into() }).unwrap();
        assert!(!hit1);
        let (h2, hit2) = manager.add(TextureDesc { path: "a.png".into() }).unwrap();
        assert!(hit2);
        assert_eq!(h1, h2);

        manager.release(h1, 10);
        manager.release(h1, 12);
        manager.process_deferred_deletes(10);
        assert!(manager.is_valid(h1));

        manager.process_deferred_deletes(12);
        assert!(!manager.is_valid(h1));
        assert_eq!(manager.factory.destroyed.lock().len(), 1);
    }

    #[test]
    fn test_reanimation_before_delete_sync_cancels_destroy() {
        let manager = ResourceManager::new(TextureFactory { destroyed: Mutex::new(Vec::new()) });
        let (h, _) = manager.add(TextureDesc { path: "b.png".into() }).unwrap();
        manager.release(h, 5);
        let (h2, hit) = manager.add(TextureDesc { path: "b.png".into() }).unwrap();
        assert!(hit);
        assert_eq!(h, h2);

        manager.process_deferred_deletes(5);
        assert!(manager.is_valid(h));
        assert!(manager.factory.destroyed.lock().is_empty());
    }

    #[test]
    #[should_panic]
    fn test_release_underflow_is_fatal() {
        let manager = ResourceManager::new(TextureFactory { destroyed: Mutex::new(Vec::new()) });
        let (h, _) = manager.add(TextureDesc { path: "c.png".into() }).unwrap();
        manager.release(h, 0);
        manager.release(h, 0);
    }

    #[test]
    fn test_ticket_table_reserve_resolve_take_round_trip() {
        let table: TicketTable<u32> = TicketTable::new(4);
        let ticket = table.reserve();
        assert!(!table.is_resolved(ticket));
        table.resolve(ticket, 42);
        assert!(table.is_resolved(ticket));
        assert_eq!(table.take(ticket), Some(42));
        assert_eq!(table.take(ticket), None);
    }

    #[test]
    fn test_ticket_slot_reuse_invalidates_old_ticket() {
        let table: TicketTable<u32> = TicketTable::new(1);
        let t1 = table.reserve();
        table.resolve(t1, 1);
        assert_eq!(table.take(t1), Some(1));

        let t2 = table.reserve();
        assert_ne!(t1, t2);
        assert!(!table.is_resolved(t1));
    }
}
