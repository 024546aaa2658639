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

//! Render Graph (§4.8): an ordered sequence of named passes, each owning a double-buffered
//! lock-free draw queue. `Execute` swaps each pass's queue, sorts the drained commands by sort
//! key, and hands them to a [`RenderBackend`]; after every pass runs it advances the frame
//! counter and asks the backend to reclaim deferred resource deletes.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use rustc_hash::FxHashMap;

use crate::error::{EngineError, Result};

/// `(pso_index << 40) | (material_index << 20) | mesh_index`.
pub fn make_sort_key(pso: u32, material: u32, mesh: u32) -> u64 {
    ((pso as u64) << 40) | ((material as u64) << 20) | (mesh as u64)
}

/// One queued draw. `payload` is an opaque index into whatever per-frame draw-data table the
/// backend maintains (instance buffer slot, command-list index, ...) — the render graph core
/// never interprets it, only sorts by `sort_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    pub sort_key: u64,
    pub payload: u64,
}

const RADIX_BITS: u32 = 8;
const RADIX_BUCKETS: usize = 1 << RADIX_BITS; // 256
const RADIX_PASSES: u32 = 64 / RADIX_BITS; // 8
const COMPARISON_SORT_THRESHOLD: usize = 4096;
const MULTI_THREAD_RADIX_THRESHOLD: usize = 20_000;

/// Sorts `commands` ascending by [`DrawCommand::sort_key`], stable on ties (insertion order
/// preserved). Dispatches to one of three strategies by size, per §4.8.
pub fn sort_draws(commands: &mut [DrawCommand]) {
    let n = commands.len();
    if n < COMPARISON_SORT_THRESHOLD {
        commands.sort_by_key(|c| c.sort_key);
    } else if n < MULTI_THREAD_RADIX_THRESHOLD {
        radix_sort_single_thread(commands);
    } else {
        radix_sort_multi_thread(commands);
    }
}

fn radix_sort_single_thread(commands: &mut [DrawCommand]) {
    let n = commands.len();
    if n == 0 {
        return;
    }
    let mut buffer = commands.to_vec();
    let mut src: &mut [DrawCommand] = commands;
    let mut dst: &mut [DrawCommand] = &mut buffer;

    for pass in 0..RADIX_PASSES {
        let shift = pass * RADIX_BITS;
        let mut counts = [0usize; RADIX_BUCKETS];
        for cmd in src.iter() {
            counts[bucket_of(cmd.sort_key, shift)] += 1;
        }
        let mut offsets = [0usize; RADIX_BUCKETS];
        let mut running = 0usize;
        for (bucket, count) in counts.iter().enumerate() {
            offsets[bucket] = running;
            running += count;
        }
        for cmd in src.iter() {
            let bucket = bucket_of(cmd.sort_key, shift);
            dst[offsets[bucket]] = *cmd;
            offsets[bucket] += 1;
        }
        std::mem::swap(&mut src, &mut dst);
    }
    // RADIX_PASSES is even, so `src` already aliases the caller's `commands` slice here.
}

#[cfg(feature = "parallel")]
fn radix_sort_multi_thread(commands: &mut [DrawCommand]) {
    use rayon::prelude::*;

    let n = commands.len();
    if n == 0 {
        return;
    }
    let mut buffer = commands.to_vec();
    let mut src: &mut [DrawCommand] = commands;
    let mut dst: &mut [DrawCommand] = &mut buffer;

    let num_threads = rayon::current_num_threads().max(1);
    let chunk_size = n.div_ceil(num_threads).max(1);

    for pass in 0..RADIX_PASSES {
        let shift = pass * RADIX_BITS;

        // per-thread local histograms over this pass's digit.
        let local_counts: Vec<[usize; RADIX_BUCKETS]> = src
            .par_chunks(chunk_size)
            .map(|chunk| {
                let mut counts = [0usize; RADIX_BUCKETS];
                for cmd in chunk {
                    counts[bucket_of(cmd.sort_key, shift)] += 1;
                }
                counts
            })
            .collect();

        // global per-bucket base offset, then per-thread offset within each bucket so every
        // thread writes into a disjoint, contiguous region of `dst`.
        let mut global_offset = [0usize; RADIX_BUCKETS];
        let mut running = 0usize;
        for bucket in 0..RADIX_BUCKETS {
            global_offset[bucket] = running;
            running += local_counts.iter().map(|c| c[bucket]).sum::<usize>();
        }
        let mut thread_offsets = vec![[0usize; RADIX_BUCKETS]; local_counts.len()];
        for bucket in 0..RADIX_BUCKETS {
            let mut running = global_offset[bucket];
            for (thread, offsets) in thread_offsets.iter_mut().enumerate() {
                offsets[bucket] = running;
                running += local_counts[thread][bucket];
            }
        }

        // SAFETY: each thread's `thread_offsets` row reserves a disjoint slice of `dst` per
        // bucket (computed above from the exact per-thread, per-bucket counts), so concurrent
        // writes through the shared raw pointer never alias. This mirrors the dispatch-across-
        // threads justification in `Executor::run_stage`.
        let dst_ptr = dst.as_mut_ptr();
        let dst_addr = dst_ptr as usize;
        src.par_chunks(chunk_size).zip(thread_offsets.par_iter()).for_each(|(chunk, offsets)| {
            let mut local = *offsets;
            let dst_slice = unsafe { std::slice::from_raw_parts_mut(dst_addr as *mut DrawCommand, n) };
            for cmd in chunk {
                let bucket = bucket_of(cmd.sort_key, shift);
                dst_slice[local[bucket]] = *cmd;
                local[bucket] += 1;
            }
        });

        std::mem::swap(&mut src, &mut dst);
    }
}

#[cfg(not(feature = "parallel"))]
fn radix_sort_multi_thread(commands: &mut [DrawCommand]) {
    radix_sort_single_thread(commands);
}

#[inline]
fn bucket_of(sort_key: u64, shift: u32) -> usize {
    ((sort_key >> shift) & (RADIX_BUCKETS as u64 - 1)) as usize
}

/// Double-buffered lock-free MPSC draw queue. Any thread may [`Self::push`]; exactly one thread
/// calls [`Self::swap_and_drain`] per flush. Producers that push during a drain land in the new
/// front ring and are processed next frame — the documented one-frame latency bound.
pub struct RenderQueue {
    rings: [SegQueue<DrawCommand>; 2],
    front: AtomicUsize,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self { rings: [SegQueue::new(), SegQueue::new()], front: AtomicUsize::new(0) }
    }

    pub fn push(&self, command: DrawCommand) {
        let front = self.front.load(Ordering::Acquire) & 1;
        self.rings[front].push(command);
    }

    /// Flips the front ring and drains what was the front into insertion order. Must be called
    /// from a single consumer thread per pass.
    pub fn swap_and_drain(&self) -> Vec<DrawCommand> {
        let drained_ring = self.front.fetch_xor(1, Ordering::AcqRel) & 1;
        let mut drained = Vec::new();
        while let Some(command) = self.rings[drained_ring].pop() {
            drained.push(command);
        }
        drained
    }
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry mapping pass name to its queue, so systems can push draws by name without holding
/// a reference to the owning [`RenderGraph`].
#[derive(Default)]
pub struct RenderService {
    queues: parking_lot::RwLock<FxHashMap<String, Arc<RenderQueue>>>,
}

impl RenderService {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, name: String, queue: Arc<RenderQueue>) {
        self.queues.write().insert(name, queue);
    }

    pub fn push(&self, pass_name: &str, command: DrawCommand) -> Result<()> {
        let queues = self.queues.read();
        let queue = queues.get(pass_name).ok_or_else(|| EngineError::ResourceNotFound(pass_name.to_string()))?;
        queue.push(command);
        Ok(())
    }
}

/// One named pass: its render targets (abstract handle names — the graphics API itself is out
/// of scope per the Non-goals), optional depth-stencil target, and draw queue.
pub struct RenderPass {
    pub name: String,
    pub render_targets: Vec<String>,
    pub depth_stencil: Option<String>,
    queue: Arc<RenderQueue>,
}

impl RenderPass {
    pub fn queue(&self) -> &Arc<RenderQueue> {
        &self.queue
    }
}

/// Abstract graphics backend boundary (§6): the render graph core is parameterized over these
/// capabilities rather than any concrete API.
pub trait RenderBackend {
    fn set_render_targets(&mut self, render_targets: &[String], depth_stencil: Option<&str>);
    fn execute_draws(&mut self, pass_name: &str, commands: &[DrawCommand]);
    fn process_deferred_deletes(&mut self, frame: u64);
}

/// Ordered sequence of passes executed strictly in declaration order each frame.
pub struct RenderGraph {
    passes: Vec<RenderPass>,
    service: Arc<RenderService>,
    current_frame: AtomicU64,
}

impl RenderGraph {
    pub fn new(service: Arc<RenderService>) -> Self {
        Self { passes: Vec::new(), service, current_frame: AtomicU64::new(0) }
    }

    /// `AddPass`: appends a pass and registers its queue with the [`RenderService`] under
    /// `name` so systems can push draws without seeing the graph itself.
    pub fn add_pass(
        &mut self,
        name: impl Into<String>,
        render_targets: Vec<String>,
        depth_stencil: Option<String>,
    ) -> usize {
        let name = name.into();
        let queue = Arc::new(RenderQueue::new());
        self.service.register(name.clone(), queue.clone());
        self.passes.push(RenderPass { name, render_targets, depth_stencil, queue });
        self.passes.len() - 1
    }

    pub fn pass(&self, index: usize) -> &RenderPass {
        &self.passes[index]
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame.load(Ordering::Acquire)
    }

    /// Runs every pass in declaration order: bind targets, swap-and-drain the pass's queue,
    /// sort ascending by key, hand the sorted batch to the backend. Once every pass has run,
    /// advances the frame counter and asks the backend to reclaim deferred resource deletes.
    pub fn execute(&self, backend: &mut dyn RenderBackend) {
        for pass in &self.passes {
            backend.set_render_targets(&pass.render_targets, pass.depth_stencil.as_deref());
            let mut commands = pass.queue.swap_and_drain();
            sort_draws(&mut commands);
            backend.execute_draws(&pass.name, &commands);
        }

        let frame = self.current_frame.fetch_add(1, Ordering::AcqRel) + 1;
        backend.process_deferred_deletes(frame);
    }
}
