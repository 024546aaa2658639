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

//! Debug/telemetry bus: a per-frame publish point for observational data (load figures, frame
//! time, a status line, recent log lines, an optional scene-tree snapshot) that a debug overlay
//! or external profiler can read without taking a lock the writer also holds.
//!
//! Same double-buffer shape as [`crate::render_graph::RenderQueue`]: two snapshot slots behind
//! their own `RwLock`, with an atomic index saying which one is currently published. A writer
//! takes the write guard of the *back* slot, mutates it, then flips the index; a reader always
//! takes the read guard of whichever slot is currently front. Reader and writer therefore never
//! contend for the same guard. This is purely observational — nothing in the engine's
//! correctness depends on what the bus holds or how fresh it is.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

/// Bounded ring of the most recent log lines surfaced to the bus. Older lines fall off silently;
/// this is a debug overlay feed, not a log sink of record.
const LOG_LINE_CAPACITY: usize = 64;

/// One published frame's worth of telemetry. Cheap to clone; the writer mutates its own copy of
/// the back slot rather than patching fields in place, so a reader never sees a half-updated
/// snapshot.
#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    pub cpu_load_percent: f32,
    pub gpu_load_percent: f32,
    pub frame_time_seconds: f64,
    pub status: String,
    pub log_lines: VecDeque<String>,
    pub tree_snapshot: Option<String>,
}

/// Lock-free-to-readers publish bus for [`TelemetrySnapshot`]s.
pub struct TelemetryBus {
    slots: [RwLock<TelemetrySnapshot>; 2],
    front: AtomicUsize,
}

impl TelemetryBus {
    pub fn new() -> Self {
        Self { slots: [RwLock::new(TelemetrySnapshot::default()), RwLock::new(TelemetrySnapshot::default())], front: AtomicUsize::new(0) }
    }

    /// Returns a clone of the currently-published snapshot.
    pub fn read(&self) -> TelemetrySnapshot {
        let front = self.front.load(Ordering::Acquire) & 1;
        self.slots[front].read().clone()
    }

    /// Writes a new snapshot into the back slot (starting from a clone of the current front, so
    /// fields the caller doesn't touch carry forward) and publishes it by flipping the front
    /// index.
    pub fn publish(&self, mutate: impl FnOnce(&mut TelemetrySnapshot)) {
        let front = self.front.load(Ordering::Acquire) & 1;
        let back = front ^ 1;
        {
            let mut back_guard = self.slots[back].write();
            *back_guard = self.slots[front].read().clone();
            mutate(&mut back_guard);
        }
        self.front.fetch_xor(1, Ordering::AcqRel);
    }

    /// Convenience publish for the common per-frame counters.
    pub fn publish_frame(&self, cpu_load_percent: f32, gpu_load_percent: f32, frame_time_seconds: f64) {
        self.publish(|snapshot| {
            snapshot.cpu_load_percent = cpu_load_percent;
            snapshot.gpu_load_percent = gpu_load_percent;
            snapshot.frame_time_seconds = frame_time_seconds;
        });
    }

    pub fn push_log_line(&self, line: impl Into<String>) {
        let line = line.into();
        self.publish(|snapshot| {
            if snapshot.log_lines.len() >= LOG_LINE_CAPACITY {
                snapshot.log_lines.pop_front();
            }
            snapshot.log_lines.push_back(line);
        });
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.publish(|snapshot| snapshot.status = status);
    }

    pub fn set_tree_snapshot(&self, tree: Option<String>) {
        self.publish(|snapshot| snapshot.tree_snapshot = tree);
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_before_any_publish_returns_default_snapshot() {
        let bus = TelemetryBus::new();
        let snapshot = bus.read();
        assert_eq!(snapshot.cpu_load_percent, 0.0);
        assert!(snapshot.log_lines.is_empty());
    }

    #[test]
    fn test_publish_frame_is_visible_to_next_read() {
        let bus = TelemetryBus::new();
        bus.publish_frame(12.5, 40.0, 1.0 / 60.0);
        let snapshot = bus.read();
        assert_eq!(snapshot.cpu_load_percent, 12.5);
        assert_eq!(snapshot.gpu_load_percent, 40.0);
        assert!((snapshot.frame_time_seconds - 1.0 / 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_log_lines_ring_drops_oldest_past_capacity() {
        let bus = TelemetryBus::new();
        for i in 0..(LOG_LINE_CAPACITY + 10) {
            bus.push_log_line(format!("line {i}"));
        }
        let snapshot = bus.read();
        assert_eq!(snapshot.log_lines.len(), LOG_LINE_CAPACITY);
        assert_eq!(snapshot.log_lines.front().unwrap(), "line 10");
        assert_eq!(snapshot.log_lines.back().unwrap(), &format!("line {}", LOG_LINE_CAPACITY + 9));
    }

    #[test]
    fn test_status_and_tree_snapshot_publish_independently() {
        let bus = TelemetryBus::new();
        bus.set_status("loading level");
        bus.set_tree_snapshot(Some("root/child".to_string()));
        let snapshot = bus.read();
        assert_eq!(snapshot.status, "loading level");
        assert_eq!(snapshot.tree_snapshot.as_deref(), Some("root/child"));
    }

    #[test]
    fn test_unrelated_fields_survive_a_partial_publish() {
        let bus = TelemetryBus::new();
        bus.publish_frame(5.0, 6.0, 0.016);
        bus.set_status("steady state");
        let snapshot = bus.read();
        assert_eq!(snapshot.cpu_load_percent, 5.0);
        assert_eq!(snapshot.status, "steady state");
    }
}
