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

//! `use novaforge_core::prelude::*;` pulls in the handful of types almost every host
//! application touches: the world, queries, systems, scheduling, and the top-level Universe.

pub use crate::archetype::Archetype;
pub use crate::bitset::ComponentMask;
pub use crate::component::{Bundle, Component};
pub use crate::config::EngineConfig;
pub use crate::entity::EntityId;
pub use crate::error::{EngineError, Result};
pub use crate::executor::Executor;
pub use crate::input::{InputState, MouseButton};
pub use crate::physics::{
    Body, CreateIntent, PhysicsCommand, PhysicsCoupling, PhysicsEvent, PhysicsPose, Pose, ShapeDesc, ShapeKind,
    Static, Transform, SENTINEL_BODY_ID,
};
pub use crate::query::{Accessor, Query};
pub use crate::render_graph::{DrawCommand, RenderBackend, RenderGraph, RenderPass, RenderQueue, RenderService};
pub use crate::resources::{ResourceFactory, ResourceHandle, ResourceManager, Ticket, TicketTable};
pub use crate::schedule::{Schedule, Stage};
pub use crate::service::{Service, ServiceLocator, UpdateService};
pub use crate::spatial::{BudgetMover, ChunkKey, Level, LevelKind, SpatialChunk, SpatialScheme, Universe};
pub use crate::system::{System, SystemAccess, SystemContext, SystemId};
pub use crate::telemetry::{TelemetryBus, TelemetrySnapshot};
pub use crate::time::FrameTimer;
pub use crate::world::World;
