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

//! Frame Timer (§4.9): paces the driver loop against an optional max-FPS cap, clamps the
//! reported delta time against OS-stall spikes, and tracks an EMA-smoothed FPS for telemetry.

use std::time::{Duration, Instant};

/// Below this remaining duration, `Tick` busy-waits instead of sleeping again — sleep
/// granularity on most schedulers is coarser than this, so a second `sleep` call would
/// routinely overshoot the deadline.
const BUSY_WAIT_THRESHOLD: Duration = Duration::from_micros(200);

/// Upper clamp on the reported delta time: `1/15` s. Prevents a single massive step (debugger
/// pause, OS scheduling stall) from blowing up physics/animation integration.
const MAX_DELTA_SECONDS: f64 = 1.0 / 15.0;

/// How often the EMA FPS estimate is refreshed.
const FPS_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

/// EMA smoothing weight applied to the previous estimate each refresh.
const FPS_EMA_WEIGHT: f64 = 0.75;

/// High-resolution monotonic frame pacer. `max_fps` is `None` for an uncapped loop (vsync or
/// unthrottled); set it to throttle to a target frame rate via sleep + busy-wait.
pub struct FrameTimer {
    max_fps: Option<f64>,
    last: Instant,
    fps: f64,
    fps_window_start: Instant,
    fps_window_frames: u32,
    frame_count: u64,
}

impl FrameTimer {
    pub fn new(max_fps: Option<f64>) -> Self {
        let now = Instant::now();
        Self { max_fps, last: now, fps: 0.0, fps_window_start: now, fps_window_frames: 0, frame_count: 0 }
    }

    pub fn max_fps(&self) -> Option<f64> {
        self.max_fps
    }

    pub fn set_max_fps(&mut self, max_fps: Option<f64>) {
        self.max_fps = max_fps;
    }

    /// `Tick()`: paces to `max_fps` if set, returns the clamped delta time in seconds, and
    /// refreshes the EMA FPS estimate on its own cadence.
    ///
    /// 1. Read `now`.
    /// 2. If a max FPS is set, sleep until `next - margin`, then busy-wait the remainder.
    /// 3. `Δt = clamp(now - last, 0, 1/15)`.
    /// 4. `last = now`; update FPS every `FPS_UPDATE_INTERVAL`.
    pub fn tick(&mut self) -> f64 {
        if let Some(target_fps) = self.max_fps {
            let period = Duration::from_secs_f64(1.0 / target_fps);
            let next = self.last + period;
            loop {
                let now = Instant::now();
                if now >= next {
                    break;
                }
                let remaining = next - now;
                if remaining > BUSY_WAIT_THRESHOLD {
                    std::thread::sleep(remaining - BUSY_WAIT_THRESHOLD);
                } else {
                    std::hint::spin_loop();
                }
            }
        }

        let now = Instant::now();
        let raw_delta = now.saturating_duration_since(self.last).as_secs_f64();
        let delta = raw_delta.clamp(0.0, MAX_DELTA_SECONDS);
        self.last = now;
        self.frame_count += 1;
        self.fps_window_frames += 1;

        let elapsed_in_window = now.saturating_duration_since(self.fps_window_start);
        if elapsed_in_window >= FPS_UPDATE_INTERVAL {
            let instantaneous_fps = self.fps_window_frames as f64 / elapsed_in_window.as_secs_f64();
            self.fps = if self.fps == 0.0 {
                instantaneous_fps
            } else {
                self.fps * FPS_EMA_WEIGHT + instantaneous_fps * (1.0 - FPS_EMA_WEIGHT)
            };
            self.fps_window_start = now;
            self.fps_window_frames = 0;
        }

        delta
    }

    /// Latest EMA-smoothed FPS estimate. `0.0` until the first `FPS_UPDATE_INTERVAL` window
    /// closes.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(None)
    }
}
