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

//! NovaForge core - archetype ECS, frame scheduler, and render/resource/physics coupling
//! for a real-time game engine.
//!
//! The entity/component layer ([`archetype`], [`component`], [`entity`], [`sparse`],
//! [`bitset`], [`world`], [`query`]) is a Structure-of-Arrays archetype store addressed
//! through generational handles. [`schedule`] and [`executor`] turn a set of [`system`]s into
//! conflict-free stages and run them on a shared thread pool. [`spatial`] partitions entities
//! into levels and chunks, each owning its own [`world::World`], and drives them frame to
//! frame. [`render_graph`] sorts and submits draw calls; [`resources`] is the generic
//! refcounted resource base every resource-kind backend (mesh, texture, shader) builds on;
//! [`physics`] bridges fixed-timestep simulation back onto the variable-rate render loop;
//! [`input`] double-buffers device state; [`time`] paces the frame loop itself.

pub mod archetype;
pub mod bitset;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod handle;
pub mod input;
pub mod physics;
pub mod query;
pub mod render_graph;
pub mod resources;
pub mod service;
pub mod sparse;
pub mod spatial;
pub mod telemetry;
pub mod time;
pub mod utils;
pub mod world;

pub mod executor;
pub mod schedule;
pub mod system;

pub mod prelude;

pub use archetype::Archetype;
pub use bitset::ComponentMask;
pub use component::{Bundle, Component};
pub use config::EngineConfig;
pub use entity::EntityId;
pub use error::{EngineError, Result};
pub use handle::GenHandle;
pub use query::{Accessor, Query};
pub use service::{Service, ServiceLocator, UpdateService};
pub use world::World;

pub use executor::{Executor, SystemProfiler};
pub use schedule::{Schedule, Stage, SystemGraph};
pub use system::{BoxedSystem, System, SystemAccess, SystemId};

pub use spatial::{Level, SpatialChunk, Universe};
pub use telemetry::{TelemetryBus, TelemetrySnapshot};
pub use time::FrameTimer;
