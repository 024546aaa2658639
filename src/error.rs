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

//! Error types.
//!
//! Programming-contract violations (invalid handle, generation mismatch, double-register,
//! oversubscribed chunk, release underflow) are fatal: callers that detect them should
//! assert/panic rather than propagate an [`EngineError`]. This enum covers the recoverable
//! half of the error model — external-resource failures, transient saturation, and budget
//! exhaustion — which the core surfaces as tagged results instead of throwing.

use std::fmt;

/// Engine error type.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Entity not found in the location table.
    EntityNotFound,

    /// Component not present on the entity's archetype.
    ComponentNotFound,

    /// Archetype not found for a given mask.
    ArchetypeNotFound,

    /// Component type id exceeds the configured mask width, or was never registered.
    UnknownComponentType,

    /// System dependency cycle detected while building a schedule.
    SystemCycleDetected,

    /// Schedule construction error.
    ScheduleError(String),

    /// System not found.
    SystemNotFound,

    /// A service type was looked up but never registered.
    ServiceNotFound(&'static str),

    /// A static service or a dynamic service was registered twice.
    ServiceAlreadyRegistered(&'static str),

    /// Asset/resource load failure (recoverable: caller should fall back to a default resource).
    ResourceLoadError(String),

    /// Resource not found by content key or path.
    ResourceNotFound(String),

    /// Spawn batch size exceeds the configured DoS guard.
    BatchTooLarge,

    /// Entity id space exhausted (`EntityIDAllocator` at capacity).
    EntityCapacityExhausted { attempted: usize, capacity: usize },

    /// Archetype creation failed.
    ArchetypeCreationFailed { component_count: usize, reason: String },

    /// Spatial partition scheme error (unknown chunk key, depth overflow).
    SpatialError(String),

    /// IO error (config load, log sink setup).
    IoError(String),

    /// Config deserialization error.
    ConfigError(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::EntityNotFound => write!(f, "entity not found"),
            EngineError::ComponentNotFound => write!(f, "component not found"),
            EngineError::ArchetypeNotFound => write!(f, "archetype not found"),
            EngineError::UnknownComponentType => write!(f, "unknown component type id"),
            EngineError::SystemCycleDetected => write!(f, "system dependency cycle detected"),
            EngineError::ScheduleError(msg) => write!(f, "schedule error: {msg}"),
            EngineError::SystemNotFound => write!(f, "system not found"),
            EngineError::ServiceNotFound(name) => write!(f, "service not registered: {name}"),
            EngineError::ServiceAlreadyRegistered(name) => {
                write!(f, "service already registered: {name}")
            }
            EngineError::ResourceLoadError(msg) => write!(f, "resource load error: {msg}"),
            EngineError::ResourceNotFound(msg) => write!(f, "resource not found: {msg}"),
            EngineError::BatchTooLarge => write!(f, "spawn batch size too large"),
            EngineError::EntityCapacityExhausted { attempted, capacity } => write!(
                f,
                "entity capacity exhausted: attempted {attempted}, capacity {capacity}"
            ),
            EngineError::ArchetypeCreationFailed { component_count, reason } => write!(
                f,
                "failed to create archetype for {component_count} components: {reason}"
            ),
            EngineError::SpatialError(msg) => write!(f, "spatial partition error: {msg}"),
            EngineError::IoError(msg) => write!(f, "io error: {msg}"),
            EngineError::ConfigError(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Aborts with a formatted, contextual message. Used at programming-contract violation sites
/// (stale handle, release underflow, oversubscribed chunk) which are fatal in every build
/// profile per the error handling design: release behavior is undefined but must be a
/// controlled abort, never silent corruption.
#[track_caller]
pub fn fatal(msg: impl fmt::Display) -> ! {
    let location = std::panic::Location::caller();
    tracing_fatal(&msg, location);
    panic!("[fatal @ {}:{}] {}", location.file(), location.line(), msg);
}

#[cfg(feature = "profiling")]
fn tracing_fatal(msg: &impl fmt::Display, location: &std::panic::Location<'_>) {
    tracing::error!(file = location.file(), line = location.line(), "{msg}");
}

#[cfg(not(feature = "profiling"))]
fn tracing_fatal(_msg: &impl fmt::Display, _location: &std::panic::Location<'_>) {}
