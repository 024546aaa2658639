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

//! Frame executor: runs a [`Schedule`]'s stages in order, dispatching the systems within each
//! stage across rayon's work-stealing pool. A stage only starts once every system in the
//! previous stage has returned (rayon's `install`/`par_iter` join is the countdown latch);
//! inside a stage there is no ordering at all, which is sound because [`Schedule`] only groups
//! systems with non-conflicting [`SystemAccess`] into the same stage.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::error::Result;
use crate::schedule::Schedule;
use crate::service::ServiceLocator;
use crate::system::{BoxedSystem, SystemContext, SystemId};
use crate::world::World;

/// Per-system timing, sampled over the last `history_len` frames, for the debug telemetry bus.
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub min: std::time::Duration,
    pub max: std::time::Duration,
    pub avg: std::time::Duration,
    pub call_count: u64,
}

/// Rolling per-system execution-time profiler. Disabled cost is one `Instant::now()` pair per
/// system per frame; samples older than `history_len` are dropped.
pub struct SystemProfiler {
    timings: HashMap<SystemId, Vec<std::time::Duration>>,
    call_counts: HashMap<SystemId, u64>,
    history_len: usize,
}

impl SystemProfiler {
    pub fn new(history_len: usize) -> Self {
        Self { timings: HashMap::new(), call_counts: HashMap::new(), history_len }
    }

    pub fn record_execution(&mut self, id: SystemId, duration: std::time::Duration) {
        let samples = self.timings.entry(id).or_default();
        samples.push(duration);
        if samples.len() > self.history_len {
            samples.remove(0);
        }
        *self.call_counts.entry(id).or_insert(0) += 1;
    }

    pub fn get_stats(&self, id: SystemId) -> Option<SystemStats> {
        let timings = self.timings.get(&id)?;
        if timings.is_empty() {
            return None;
        }

        let min = *timings.iter().min().unwrap();
        let max = *timings.iter().max().unwrap();
        let avg = timings.iter().sum::<std::time::Duration>() / timings.len() as u32;

        Some(SystemStats { min, max, avg, call_count: *self.call_counts.get(&id).unwrap_or(&0) })
    }

    pub fn clear(&mut self) {
        self.timings.clear();
        self.call_counts.clear();
    }
}

impl Default for SystemProfiler {
    fn default() -> Self {
        Self::new(120)
    }
}

/// Drives one [`Schedule`] to completion for a single frame on a dedicated rayon pool, isolated
/// from whatever pool the host application uses elsewhere.
pub struct Executor {
    pool: rayon::ThreadPool,
    pub profiler: SystemProfiler,
}

impl Executor {
    /// `worker_threads == 0` lets rayon size the pool to the available cores.
    pub fn new(worker_threads: usize) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if worker_threads > 0 {
            builder = builder.num_threads(worker_threads);
        }
        let pool = builder
            .thread_name(|i| format!("novaforge-worker-{i}"))
            .build()
            .map_err(|e| crate::error::EngineError::IoError(e.to_string()))?;
        Ok(Self { pool, profiler: SystemProfiler::default() })
    }

    /// The underlying thread pool, for callers (e.g. [`crate::spatial::Universe`]) that
    /// dispatch their own parallel work onto it rather than running a [`Schedule`] directly.
    pub fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }

    /// Runs every stage of `schedule` once, in order, against `world`/`services`.
    pub fn run_frame(
        &mut self,
        schedule: &mut Schedule,
        world: &World,
        services: &ServiceLocator,
        delta_time: f64,
    ) -> Result<()> {
        schedule.ensure_built()?;
        let stage_plan: Vec<Vec<SystemId>> =
            schedule.stage_plan().into_iter().map(|s| s.to_vec()).collect();

        for stage in &stage_plan {
            let timings = Self::run_stage(&self.pool, schedule, stage, world, services, delta_time)?;
            for (id, duration) in timings {
                self.profiler.record_execution(id, duration);
            }
        }

        Ok(())
    }

    /// Dispatches one stage's systems across the pool and waits for all of them. Systems are
    /// addressed through a raw pointer to the schedule's system vector so distinct mutable
    /// borrows can be handed to distinct worker threads at once: sound only because `Schedule`
    /// never places two systems with conflicting [`SystemAccess`] in the same stage, so no two
    /// threads in this loop ever touch the same system or overlapping component storage at once.
    fn run_stage(
        pool: &rayon::ThreadPool,
        schedule: &mut Schedule,
        stage: &[SystemId],
        world: &World,
        services: &ServiceLocator,
        delta_time: f64,
    ) -> Result<Vec<(SystemId, std::time::Duration)>> {
        let schedule_ptr = schedule as *mut Schedule as usize;
        let ctx = SystemContext { world, services, delta_time };

        let results: Vec<(SystemId, Result<()>, std::time::Duration)> = pool.install(|| {
            stage
                .par_iter()
                .map(|&system_id| {
                    // SAFETY: see struct-level doc comment.
                    let schedule = unsafe { &mut *(schedule_ptr as *mut Schedule) };
                    let system: &mut BoxedSystem = schedule
                        .system_mut_by_id(system_id)
                        .expect("stage referenced an unknown system id");
                    let start = std::time::Instant::now();
                    let result = system.update(&ctx);
                    (system_id, result, start.elapsed())
                })
                .collect()
        });

        let mut timings = Vec::with_capacity(results.len());
        for (id, result, duration) in results {
            result?;
            timings.push((id, duration));
        }
        Ok(timings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::system::{System, SystemAccess};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Counting {
        name: &'static str,
        access: SystemAccess,
        counter: Arc<AtomicU32>,
    }

    impl System for Counting {
        fn access(&self) -> SystemAccess {
            self.access
        }
        fn name(&self) -> &'static str {
            self.name
        }
        fn update(&mut self, _ctx: &SystemContext) -> Result<()> {
            self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_run_frame_executes_every_system() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(Counting {
            name: "a",
            access: SystemAccess::empty().writing(0),
            counter: counter.clone(),
        }));
        schedule.add_system(Box::new(Counting {
            name: "b",
            access: SystemAccess::empty().writing(1),
            counter: counter.clone(),
        }));

        let world = World::new(EngineConfig::default());
        let services = ServiceLocator::new();
        let mut executor = Executor::new(2).unwrap();
        executor.run_frame(&mut schedule, &world, &services, 1.0 / 60.0).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(executor.profiler.get_stats(SystemId(0)).is_some());
    }
}
