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

//! Engine configuration: the tunables every other module reads at construction time.
//! Loadable from JSON via `serde_json`; every field has a documented default so a host
//! application can start from `EngineConfig::default()` and override only what it cares about.

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Byte budget of a single archetype chunk. Capacity per archetype is derived from this at
    /// archetype-creation time, not configured directly.
    pub chunk_bytes: usize,

    /// Upper bound on distinct registered component types; bounds [`crate::bitset::ComponentMask`]
    /// width indirectly (the mask is fixed at 256 bits, so this must not exceed that).
    pub max_component_types: usize,

    /// Upper bound on live entities; sizes the [`crate::entity::EntityIdAllocator`] free list.
    pub max_entities: u32,

    /// Physics accumulator step, in seconds.
    pub physics_fixed_timestep: f64,

    /// Physics substeps run per fixed step.
    pub physics_substeps: u32,

    /// Capacity of the audio backend's ticket slot table.
    pub audio_ticket_capacity: usize,

    /// Double-buffer count for the render queue's sorted submission buffers.
    pub render_queue_ring_buffers: usize,

    /// Frame pacing cap; `None` means uncapped (vsync or unthrottled).
    pub max_fps: Option<f64>,

    /// Cross-chunk entity moves permitted per frame, to bound worst-case frame cost of
    /// archetype-migrating component add/remove operations.
    pub chunk_move_budget_per_frame: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 16 * 1024,
            max_component_types: 256,
            max_entities: 100_000,
            physics_fixed_timestep: 1.0 / 60.0,
            physics_substeps: 1,
            audio_ticket_capacity: 65_536,
            render_queue_ring_buffers: 2,
            max_fps: None,
            chunk_move_budget_per_frame: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_bytes, 16 * 1024);
        assert_eq!(config.max_component_types, 256);
        assert_eq!(config.max_entities, 100_000);
        assert!((config.physics_fixed_timestep - 1.0 / 60.0).abs() < f64::EPSILON);
        assert_eq!(config.physics_substeps, 1);
        assert_eq!(config.audio_ticket_capacity, 65_536);
        assert_eq!(config.render_queue_ring_buffers, 2);
        assert_eq!(config.max_fps, None);
        assert_eq!(config.chunk_move_budget_per_frame, 256);
    }

    #[test]
    fn test_partial_json_overlay_keeps_remaining_defaults() {
        let config = EngineConfig::from_json(r#"{"max_entities": 5000}"#).unwrap();
        assert_eq!(config.max_entities, 5000);
        assert_eq!(config.chunk_bytes, 16 * 1024);
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = EngineConfig { max_fps: Some(144.0), ..Default::default() };
        let json = config.to_json().unwrap();
        let restored = EngineConfig::from_json(&json).unwrap();
        assert_eq!(config, restored);
    }
}
