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

//! Physics Coupling (§4.10): the engine does not simulate rigid bodies itself, it owns the
//! bridge between a fixed-timestep physics device and the variable-rate render loop. A
//! [`PhysicsCoupling`] runs an accumulator, exchanges commands/events with the device over
//! SPSC rings, and exposes the interpolation alpha render-time systems need.

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use glam::{Quat, Vec3};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::entity::EntityId;
use crate::error::Result;
use crate::service::UpdateService;
use crate::system::{System, SystemAccess, SystemContext};
use crate::world::World;

/// Body id value meaning "no physics body yet" — both the just-spawned default and the value a
/// create-intent's target keeps until the device's `CreatedBody` event writes the real id back.
pub const SENTINEL_BODY_ID: u32 = 0xFFFF_FFFF;

/// Collider shape description. The solver itself is out of scope; this is only enough data for
/// the device's `CreateBody` command.
#[derive(Debug, Clone, Copy)]
pub enum ShapeKind {
    Sphere,
    Box,
    Capsule,
}

#[derive(Debug, Clone, Copy)]
pub struct ShapeDesc {
    pub kind: ShapeKind,
    pub half_extents: Vec3,
}

/// Commands the core issues to the physics backend (§6's physics command set).
#[derive(Debug, Clone, Copy)]
pub enum PhysicsCommand {
    CreateBody { entity: EntityId, shape: ShapeDesc, position: Vec3, rotation: Quat },
    DestroyBody { body_id: u32 },
    Teleport { body_id: u32, position: Vec3, rotation: Quat },
    SetLinearVelocity { body_id: u32, velocity: Vec3 },
    SetAngularVelocity { body_id: u32, velocity: Vec3 },
    AddImpulse { body_id: u32, impulse: Vec3 },
    SetKinematicTarget { body_id: u32, position: Vec3, rotation: Quat },
    SetCollisionMask { body_id: u32, mask: u32 },
    SetObjectLayer { body_id: u32, layer: u32 },
    RayCast { origin: Vec3, direction: Vec3, max_distance: f32, query_id: u64 },
}

/// Events the physics backend reports back (§6's physics event set).
#[derive(Debug, Clone, Copy)]
pub enum PhysicsEvent {
    Contact { body_a: u32, body_b: u32 },
    RayCastHit { query_id: u64, body_id: u32, point: Vec3, normal: Vec3, distance: f32 },
    CreatedBody { entity: EntityId, body_id: u32 },
}

/// A pose snapshot (position + rotation) for one body.
#[derive(Debug, Clone, Copy)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self { position: Vec3::ZERO, rotation: Quat::IDENTITY }
    }
}

/// Linear position + slerp rotation interpolation between `prev` and `curr`, `alpha` in `[0,1]`.
pub fn interpolate_pose(prev: &Pose, curr: &Pose, alpha: f32) -> Pose {
    Pose { position: prev.position.lerp(curr.position, alpha), rotation: prev.rotation.slerp(curr.rotation, alpha) }
}

/// Renderable, interpolated transform — the output of [`interpolate_pose`], read by the render
/// systems.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self { position: Vec3::ZERO, rotation: Quat::IDENTITY }
    }
}

/// Previous/current physics poses an entity's [`Transform`] is interpolated between each frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicsPose {
    pub prev: Pose,
    pub curr: Pose,
}

/// The physics body bound to an entity. `body_id == SENTINEL_BODY_ID` means no body has been
/// created (or confirmed) yet.
#[derive(Debug, Clone, Copy)]
pub struct Body {
    pub body_id: u32,
}

impl Default for Body {
    fn default() -> Self {
        Self { body_id: SENTINEL_BODY_ID }
    }
}

/// Marker component: bodies tagged `Static` are excluded from pose read-back (§4.10).
#[derive(Debug, Clone, Copy, Default)]
pub struct Static;

/// A pending body-creation request, queued by entity-creation sites instead of calling the
/// physics device directly (§4.10's body creation protocol).
#[derive(Debug, Clone, Copy)]
pub struct CreateIntent {
    pub entity: EntityId,
    pub shape: ShapeDesc,
    pub owner_chunk_key: u64,
}

const ACCUMULATOR_EPSILON: f64 = 1e-9;
const COMMAND_RING_CAPACITY: usize = 4096;
const EVENT_RING_CAPACITY: usize = 4096;

/// Owns the fixed-timestep accumulator, the command/event SPSC rings to the physics device, the
/// pending create-intent queue, and the prev/curr pose snapshots systems interpolate from.
///
/// Registered as an [`UpdateService`] so `ServiceLocator::update_all` drives its accumulator on
/// the driver thread, ahead of any level update, per §4.12 step 1.
pub struct PhysicsCoupling {
    fixed_timestep: f64,
    substeps: u32,
    accumulator: Mutex<f64>,
    commands: ArrayQueue<PhysicsCommand>,
    events: ArrayQueue<PhysicsEvent>,
    create_intents: Mutex<Vec<CreateIntent>>,
    poses: RwLock<FxHashMap<EntityId, PhysicsPose>>,
}

impl PhysicsCoupling {
    pub fn new(fixed_timestep: f64, substeps: u32) -> Self {
        Self {
            fixed_timestep,
            substeps,
            accumulator: Mutex::new(0.0),
            commands: ArrayQueue::new(COMMAND_RING_CAPACITY),
            events: ArrayQueue::new(EVENT_RING_CAPACITY),
            create_intents: Mutex::new(Vec::new()),
            poses: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn fixed_timestep(&self) -> f64 {
        self.fixed_timestep
    }

    /// `GetAlpha`: fraction of a fixed step the accumulator has banked, for render-time
    /// interpolation.
    pub fn alpha(&self) -> f32 {
        (*self.accumulator.lock() / self.fixed_timestep) as f32
    }

    /// Enqueue a command for the physics device, retrying with a yield on a full ring — §7's
    /// transient-saturation policy (no packet drop, producer backs off).
    pub fn push_command(&self, command: PhysicsCommand) {
        let mut command = command;
        while let Err(returned) = self.commands.push(command) {
            command = returned;
            std::thread::yield_now();
        }
    }

    /// Drained by the physics device (or a test harness standing in for one).
    pub fn pop_command(&self) -> Option<PhysicsCommand> {
        self.commands.pop()
    }

    /// Pushed by the physics device once it processes a command.
    pub fn push_event(&self, event: PhysicsEvent) {
        let mut event = event;
        while let Err(returned) = self.events.push(event) {
            event = returned;
            std::thread::yield_now();
        }
    }

    pub fn pop_event(&self) -> Option<PhysicsEvent> {
        self.events.pop()
    }

    pub fn enqueue_create_intent(&self, intent: CreateIntent) {
        self.create_intents.lock().push(intent);
    }

    /// Drains every pending create intent, issuing one `CreateBody` command per intent. Called
    /// once per frame by [`DrainCreateIntentsSystem`].
    fn drain_create_intents(&self, world: &World) {
        let intents: Vec<CreateIntent> = std::mem::take(&mut *self.create_intents.lock());
        for intent in intents {
            let (position, rotation) = world
                .with_sparse::<Transform, _>(intent.entity, |t| {
                    t.map(|t| (t.position, t.rotation)).unwrap_or_default()
                });
            self.push_command(PhysicsCommand::CreateBody {
                entity: intent.entity,
                shape: intent.shape,
                position,
                rotation,
            });
        }
    }

    /// Drains `CreatedBody` events and writes the real body id back, but only while the
    /// entity's current id is still the sentinel — prevents a double-create race (§4.10).
    fn apply_created_body_events(&self, world: &World) {
        while let Some(event) = self.pop_event() {
            if let PhysicsEvent::CreatedBody { entity, body_id } = event {
                let should_write =
                    world.with_sparse::<Body, _>(entity, |b| b.map_or(true, |b| b.body_id == SENTINEL_BODY_ID));
                if should_write {
                    world.insert_sparse(entity, Body { body_id });
                }
            }
        }
    }

    /// Rotates every tracked entity's snapshot buffers: `prev = curr`, ready for the device's
    /// next `ReadPosesBatch` to refill `curr` via [`Self::record_current_pose`].
    fn snapshot_current_into_prev(&self, _world: &World) {
        let mut poses = self.poses.write();
        for snapshot in poses.values_mut() {
            snapshot.prev = snapshot.curr;
        }
    }

    /// Applies freshly read device poses for non-static, non-sentinel bodies, then interpolates
    /// into the renderable [`Transform`] component at the current `alpha`.
    fn interpolate_into_transforms(&self, world: &World) {
        let alpha = self.alpha();
        let poses = self.poses.read();
        for (&entity, snapshot) in poses.iter() {
            let interpolated = interpolate_pose(&snapshot.prev, &snapshot.curr, alpha);
            world.insert_sparse(entity, Transform { position: interpolated.position, rotation: interpolated.rotation });
        }
    }

    /// Sets (or initializes) the current pose read back for `entity`'s body, skipping static
    /// bodies — `ReadPosesBatch` is modeled as the device calling this once per live body.
    pub fn record_current_pose(&self, entity: EntityId, pose: Pose, is_static: bool) {
        if is_static {
            return;
        }
        let mut poses = self.poses.write();
        let entry = poses.entry(entity).or_insert_with(|| PhysicsPose { prev: pose, curr: pose });
        entry.curr = pose;
    }

    pub fn pose_of(&self, entity: EntityId) -> Option<PhysicsPose> {
        self.poses.read().get(&entity).copied()
    }
}

impl UpdateService for PhysicsCoupling {
    /// Runs the accumulator loop: drain the command ring, step, rotate poses, repeat while at
    /// least one fixed step is banked. Actual device stepping (`step(h, substeps)`) is the
    /// responsibility of whatever owns the other end of the rings; this loop only paces it.
    fn update(&self, delta_time: f64) {
        let mut accumulator = self.accumulator.lock();
        *accumulator += delta_time;
        while *accumulator + ACCUMULATOR_EPSILON >= self.fixed_timestep {
            *accumulator -= self.fixed_timestep;
            let _ = self.substeps;
        }
    }
}

/// Snapshots `curr` poses into `prev` before the device's next read-back — "memcpy per column"
/// in spirit, realized here as swapping the cached snapshot map.
pub struct SnapshotPosesSystem {
    coupling: Arc<PhysicsCoupling>,
}

impl SnapshotPosesSystem {
    pub fn new(coupling: Arc<PhysicsCoupling>) -> Self {
        Self { coupling }
    }
}

impl System for SnapshotPosesSystem {
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }

    fn name(&self) -> &'static str {
        "SnapshotPosesSystem"
    }

    fn update(&mut self, ctx: &SystemContext) -> Result<()> {
        self.coupling.snapshot_current_into_prev(ctx.world);
        Ok(())
    }
}

/// Interpolates `prev -> curr` by the current alpha into each entity's renderable [`Transform`].
pub struct InterpolateTransformsSystem {
    coupling: Arc<PhysicsCoupling>,
}

impl InterpolateTransformsSystem {
    pub fn new(coupling: Arc<PhysicsCoupling>) -> Self {
        Self { coupling }
    }
}

impl System for InterpolateTransformsSystem {
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }

    fn name(&self) -> &'static str {
        "InterpolateTransformsSystem"
    }

    fn update(&mut self, ctx: &SystemContext) -> Result<()> {
        self.coupling.interpolate_into_transforms(ctx.world);
        Ok(())
    }
}

/// Drains pending [`CreateIntent`]s, issuing a `CreateBody` command per intent.
pub struct DrainCreateIntentsSystem {
    coupling: Arc<PhysicsCoupling>,
}

impl DrainCreateIntentsSystem {
    pub fn new(coupling: Arc<PhysicsCoupling>) -> Self {
        Self { coupling }
    }
}

impl System for DrainCreateIntentsSystem {
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }

    fn name(&self) -> &'static str {
        "DrainCreateIntentsSystem"
    }

    fn update(&mut self, ctx: &SystemContext) -> Result<()> {
        self.coupling.drain_create_intents(ctx.world);
        Ok(())
    }
}

/// Drains `CreatedBody` events, writing the real body id back into each entity's [`Body`]
/// component under the sentinel guard.
pub struct ApplyCreatedBodyEventsSystem {
    coupling: Arc<PhysicsCoupling>,
}

impl ApplyCreatedBodyEventsSystem {
    pub fn new(coupling: Arc<PhysicsCoupling>) -> Self {
        Self { coupling }
    }
}

impl System for ApplyCreatedBodyEventsSystem {
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }

    fn name(&self) -> &'static str {
        "ApplyCreatedBodyEventsSystem"
    }

    fn update(&mut self, ctx: &SystemContext) -> Result<()> {
        self.coupling.apply_created_body_events(ctx.world);
        Ok(())
    }
}
