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

//! Spatial Partitioning & World (§4.11) and the top-level Scheduler (§4.12).
//!
//! A [`Universe`] owns a tuple of [`Level`]s; each level holds one or more [`SpatialChunk`]s —
//! partition cells keyed by `(level_id, scheme, depth, code, generation)` where `code` is a
//! Morton code of the cell coordinates. Each chunk owns its own [`World`] and [`Schedule`].
//! [`Universe::update_all_levels`] advances services, then runs every Main level's chunks on
//! the thread pool and every Sub level's chunks serially on the calling thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::Result;
use crate::executor::Executor;
use crate::schedule::Schedule;
use crate::service::ServiceLocator;
use crate::world::World;

/// Partition scheme a [`SpatialChunk`] was carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialScheme {
    Grid2D,
    Grid3D,
    Quadtree,
    Octree,
}

/// Interleaves the low 32 bits of `x`/`y` into a 64-bit Morton code.
pub fn morton_encode_2d(x: u32, y: u32) -> u64 {
    fn spread(v: u32) -> u64 {
        let mut v = v as u64;
        v = (v | (v << 16)) & 0x0000FFFF0000FFFF;
        v = (v | (v << 8)) & 0x00FF00FF00FF00FF;
        v = (v | (v << 4)) & 0x0F0F0F0F0F0F0F0F;
        v = (v | (v << 2)) & 0x3333333333333333;
        v = (v | (v << 1)) & 0x5555555555555555;
        v
    }
    spread(x) | (spread(y) << 1)
}

/// Interleaves the low 21 bits of `x`/`y`/`z` into a 63-bit Morton code.
pub fn morton_encode_3d(x: u32, y: u32, z: u32) -> u64 {
    fn spread(v: u32) -> u64 {
        let mut v = (v & 0x1FFFFF) as u64;
        v = (v | (v << 32)) & 0x1F00000000FFFF;
        v = (v | (v << 16)) & 0x1F0000FF0000FF;
        v = (v | (v << 8)) & 0x100F00F00F00F00F;
        v = (v | (v << 4)) & 0x10C30C30C30C30C3;
        v = (v | (v << 2)) & 0x1249249249249249;
        v
    }
    spread(x) | (spread(y) << 1) | (spread(z) << 2)
}

/// Identifies one partition cell: the level it belongs to, the scheme/depth it was carved at,
/// its Morton-coded cell coordinates, and a generation bumped when the cell is recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub level_id: u32,
    pub scheme: SpatialScheme,
    pub depth: u32,
    pub code: u64,
    pub generation: u32,
}

/// Caps the number of cross-chunk entity reassignments processed in one frame, so a burst of
/// boundary-crossing motion cannot stall the frame; excess moves defer to next frame with no
/// data loss (§7's budget-exhaustion policy).
pub struct BudgetMover {
    budget_per_frame: usize,
    pending: Mutex<Vec<PendingMove>>,
}

/// A queued chunk-crossing move: move `entity` from `from` into `to`.
#[derive(Debug, Clone, Copy)]
pub struct PendingMove {
    pub entity: crate::entity::EntityId,
    pub from: ChunkKey,
    pub to: ChunkKey,
}

impl BudgetMover {
    pub fn new(budget_per_frame: usize) -> Self {
        Self { budget_per_frame, pending: Mutex::new(Vec::new()) }
    }

    pub fn enqueue(&self, mv: PendingMove) {
        self.pending.lock().push(mv);
    }

    /// Drains up to `budget_per_frame` pending moves, leaving the rest queued for next frame.
    pub fn drain_budgeted(&self) -> Vec<PendingMove> {
        let mut pending = self.pending.lock();
        let take = pending.len().min(self.budget_per_frame);
        pending.drain(..take).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

/// One partition cell: its key and its own Entity/Archetype Manager plus the schedule of
/// systems that run against it.
pub struct SpatialChunk {
    key: ChunkKey,
    world: World,
    schedule: Mutex<Schedule>,
}

impl SpatialChunk {
    pub fn new(key: ChunkKey, world: World, schedule: Schedule) -> Self {
        Self { key, world, schedule: Mutex::new(schedule) }
    }

    pub fn key(&self) -> ChunkKey {
        self.key
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Runs every system in this chunk's schedule in stage order. Stage-internal systems run
    /// sequentially here — the thread-level parallelism for a frame comes from the Universe
    /// dispatching distinct chunks across the pool, not from nesting another pool per chunk.
    fn run_schedule(&self, services: &ServiceLocator, delta_time: f64) -> Result<()> {
        let mut schedule = self.schedule.lock();
        schedule.ensure_built()?;
        let ctx = crate::system::SystemContext { world: &self.world, services, delta_time };
        for stage in schedule.stage_plan() {
            for &system_id in stage {
                let system = schedule.system_mut_by_id(system_id).expect("stage referenced an unknown system id");
                system.update(&ctx)?;
            }
        }
        Ok(())
    }
}

/// Whether a [`Level`] receives a full update every frame or a limited one (e.g. streaming
/// only, for distant content).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelKind {
    Main,
    Sub,
}

/// One or more [`SpatialChunk`]s updated together as a unit.
pub struct Level {
    pub id: u32,
    pub kind: LevelKind,
    chunks: Vec<SpatialChunk>,
}

impl Level {
    pub fn new(id: u32, kind: LevelKind) -> Self {
        Self { id, kind, chunks: Vec::new() }
    }

    pub fn add_chunk(&mut self, chunk: SpatialChunk) {
        self.chunks.push(chunk);
    }

    pub fn chunks(&self) -> &[SpatialChunk] {
        &self.chunks
    }

    /// Sub-level update: a reduced pass (e.g. streaming bookkeeping only) run serially on the
    /// calling thread. Reuses the chunk's own schedule rather than a separate limited-update
    /// system set, since which systems a Sub level schedules is a content decision, not a
    /// core-level one.
    fn update_sub(&self, services: &ServiceLocator, delta_time: f64) -> Result<()> {
        for chunk in &self.chunks {
            chunk.run_schedule(services, delta_time)?;
        }
        Ok(())
    }
}

/// Top-level orchestrator: owns every [`Level`], the thread-pool [`Executor`] Main levels
/// dispatch onto, the [`ServiceLocator`], and the cross-chunk [`BudgetMover`].
pub struct Universe {
    levels: Vec<Level>,
    executor: Executor,
    services: Arc<ServiceLocator>,
    mover: BudgetMover,
}

impl Universe {
    pub fn new(executor: Executor, services: Arc<ServiceLocator>, chunk_move_budget_per_frame: usize) -> Self {
        Self { levels: Vec::new(), executor, services, mover: BudgetMover::new(chunk_move_budget_per_frame) }
    }

    pub fn add_level(&mut self, level: Level) {
        self.levels.push(level);
    }

    pub fn services(&self) -> &Arc<ServiceLocator> {
        &self.services
    }

    pub fn mover(&self) -> &BudgetMover {
        &self.mover
    }

    /// `UpdateAllLevels(Δt, executor)`:
    /// 1. Advance every registered [`UpdateService`](crate::service::UpdateService) on the
    ///    calling thread, in registration order.
    /// 2. Run every Main level's chunks on the thread pool, blocking until all complete.
    /// 3. Run every Sub level's chunks serially on the calling thread, after Main.
    pub fn update_all_levels(&mut self, delta_time: f64) -> Result<()> {
        self.services.update_all(delta_time);

        let services = &self.services;
        let main_chunks: Vec<&SpatialChunk> = self
            .levels
            .iter()
            .filter(|level| level.kind == LevelKind::Main)
            .flat_map(|level| level.chunks())
            .collect();

        let failures = AtomicUsize::new(0);
        let first_error: Mutex<Option<crate::error::EngineError>> = Mutex::new(None);
        self.executor.pool().install(|| {
            main_chunks.par_iter().for_each(|chunk| {
                if let Err(err) = chunk.run_schedule(services, delta_time) {
                    failures.fetch_add(1, Ordering::Relaxed);
                    first_error.lock().get_or_insert(err);
                }
            });
        });
        if failures.load(Ordering::Relaxed) > 0 {
            return Err(first_error.lock().take().expect("failure recorded without an error"));
        }

        for level in self.levels.iter().filter(|level| level.kind == LevelKind::Sub) {
            level.update_sub(services, delta_time)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::system::{System, SystemAccess, SystemContext};
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    #[test]
    fn test_morton_2d_round_trip_on_low_bits() {
        let code = morton_encode_2d(3, 5);
        let code_same = morton_encode_2d(3, 5);
        assert_eq!(code, code_same);
        assert_ne!(morton_encode_2d(3, 5), morton_encode_2d(5, 3));
    }

    #[test]
    fn test_budget_mover_caps_per_frame_drain() {
        let mover = BudgetMover::new(2);
        let key = ChunkKey { level_id: 0, scheme: SpatialScheme::Grid2D, depth: 0, code: 0, generation: 0 };
        for _ in 0..5 {
            mover.enqueue(PendingMove { entity: crate::entity::EntityId::INVALID, from: key, to: key });
        }
        let drained = mover.drain_budgeted();
        assert_eq!(drained.len(), 2);
        assert_eq!(mover.pending_count(), 3);
    }

    struct Counting(Arc<AtomicU32>);
    impl System for Counting {
        fn access(&self) -> SystemAccess {
            SystemAccess::empty()
        }
        fn name(&self) -> &'static str {
            "counting"
        }
        fn update(&mut self, _ctx: &SystemContext) -> Result<()> {
            self.0.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    fn make_chunk(level_id: u32, counter: Arc<AtomicU32>) -> SpatialChunk {
        let key = ChunkKey { level_id, scheme: SpatialScheme::Grid2D, depth: 0, code: 0, generation: 0 };
        let world = World::new(EngineConfig::default());
        let schedule = Schedule::new().with_system(Box::new(Counting(counter)));
        SpatialChunk::new(key, world, schedule)
    }

    #[test]
    fn test_update_all_levels_runs_main_and_sub_chunks() {
        let executor = Executor::new(2).unwrap();
        let services = Arc::new(ServiceLocator::new());
        let mut universe = Universe::new(executor, services, 256);

        let main_counter = Arc::new(AtomicU32::new(0));
        let mut main_level = Level::new(0, LevelKind::Main);
        main_level.add_chunk(make_chunk(0, main_counter.clone()));
        universe.add_level(main_level);

        let sub_counter = Arc::new(AtomicU32::new(0));
        let mut sub_level = Level::new(1, LevelKind::Sub);
        sub_level.add_chunk(make_chunk(1, sub_counter.clone()));
        universe.add_level(sub_level);

        universe.update_all_levels(1.0 / 60.0).unwrap();

        assert_eq!(main_counter.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(sub_counter.load(AtomicOrdering::SeqCst), 1);
    }
}
