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

//! System contract and access-conflict metadata.

use crate::bitset::ComponentMask;
use crate::error::Result;
use crate::service::ServiceLocator;
use crate::world::World;

/// System identifier, dense within one [`crate::schedule::Schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub u32);

/// Declared component access: the set of types a system reads and the set it writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAccess {
    pub reads: ComponentMask,
    pub writes: ComponentMask,
}

impl SystemAccess {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn reading(mut self, type_id: usize) -> Self {
        self.reads.set(type_id);
        self
    }

    pub fn writing(mut self, type_id: usize) -> Self {
        self.writes.set(type_id);
        self
    }

    /// Two systems may run concurrently iff their Write sets are disjoint from each other's
    /// Read and Write sets. Equivalently, they conflict iff either write set intersects the
    /// other's read-or-write set.
    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        let other_rw = other.reads.union(&other.writes);
        let self_rw = self.reads.union(&self.writes);
        self.writes.intersects(&other_rw) || other.writes.intersects(&self_rw)
    }
}

/// The execution context handed to [`System::update`]: the world, the service locator, and
/// the frame's delta time. Systems do not hold a reference to the thread-pool executor
/// directly — parallel dispatch across systems is the scheduler's responsibility (§4.12).
pub struct SystemContext<'a> {
    pub world: &'a World,
    pub services: &'a ServiceLocator,
    pub delta_time: f64,
}

/// A System declares the component access set it needs and the services it consumes, then
/// iterates matching chunks via Accessors on each `update`.
pub trait System: Send + Sync {
    fn access(&self) -> SystemAccess;

    fn name(&self) -> &'static str;

    fn update(&mut self, ctx: &SystemContext) -> Result<()>;
}

pub type BoxedSystem = Box<dyn System>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_write_conflicts() {
        let a = SystemAccess::empty().writing(3);
        let b = SystemAccess::empty().writing(3);
        assert!(a.conflicts_with(&b));
    }

    #[test]
    fn test_read_read_does_not_conflict() {
        let a = SystemAccess::empty().reading(3);
        let b = SystemAccess::empty().reading(3);
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn test_write_read_conflicts() {
        let a = SystemAccess::empty().writing(5);
        let b = SystemAccess::empty().reading(5);
        assert!(a.conflicts_with(&b));
        assert!(b.conflicts_with(&a));
    }

    #[test]
    fn test_disjoint_access_does_not_conflict() {
        let a = SystemAccess::empty().writing(1);
        let b = SystemAccess::empty().writing(2);
        assert!(!a.conflicts_with(&b));
    }
}
