//! Engine adapter boundary.
//!
//! The shim only ever talks to the underlying container engine through
//! [`ContainerEngine`]. Implementations return raw [`EngineRecord`]s; all
//! orchestrator-level interpretation happens in [`crate::runtime`].
//!
//! ## Implementations
//!
//! - [`LocalEngine`]: record-keeping engine over a [`RecordStore`]
//!   ([`MemoryStore`] or [`crate::db::SqliteRecordStore`])
//! - `DockerEngine`: Docker Engine API (feature `docker`)

#[cfg(feature = "docker")]
mod docker;
mod local;

#[cfg(feature = "docker")]
pub use docker::DockerEngine;
pub use local::{LocalEngine, MemoryStore, RecordStore};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::labels::Labels;

/// Result type alias for engine calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors reported by an engine adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// No record with this id.
    #[error("no such container: {0}")]
    NotFound(String),

    /// The engine refused the request in the record's current state.
    #[error("conflict on '{id}': {reason}")]
    Conflict { id: String, reason: String },

    /// Backend (daemon, API) failure, message kept verbatim.
    #[error("{0}")]
    Backend(String),

    /// Local record store failure.
    #[error("record store: {0}")]
    Store(String),
}

// =============================================================================
// Engine records
// =============================================================================

/// Engine-native container state.
///
/// Kept as the engine's own vocabulary; mapping to orchestrator state is the
/// translator's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EngineState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    /// Anything the engine reports that we do not recognise.
    Other(String),
}

impl EngineState {
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for EngineState {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<EngineState> for String {
    fn from(state: EngineState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bind mount as submitted to and reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Mount {
    pub container_path: String,
    pub host_path: String,
    #[serde(default)]
    pub readonly: bool,
}

/// The engine's persisted view of one container.
///
/// Timestamps are `None` until the event has happened; adapters must map the
/// engine's zero time to `None` rather than the epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRecord {
    pub id: String,
    pub name: String,
    pub state: EngineState,
    /// Image reference as submitted at create.
    pub image: String,
    /// Engine-resolved image reference.
    #[serde(default)]
    pub image_id: String,
    #[serde(default)]
    pub labels: Labels,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_code: i32,
    /// Engine error string for the last exit, empty if none.
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub oom_killed: bool,
    #[serde(default)]
    pub mounts: Vec<Mount>,
}

/// Parameters for [`ContainerEngine::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateParams {
    pub name: String,
    pub image: String,
    pub labels: Labels,
    pub mounts: Vec<Mount>,
}

/// True when every selector pair is present in `labels` with an equal value.
pub fn matches_selector(selector: &Labels, labels: &Labels) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
}

// =============================================================================
// Adapter trait
// =============================================================================

/// Primitive operations of the underlying container engine.
///
/// Idempotency and per-id serialisation are the engine's concern; callers
/// must treat [`EngineError::NotFound`] as a normal race outcome.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Create a container record; returns the engine-assigned id.
    async fn create(&self, params: CreateParams) -> EngineResult<String>;

    async fn start(&self, id: &str) -> EngineResult<()>;

    /// Stop, escalating to a kill after `grace`.
    async fn stop(&self, id: &str, grace: Duration) -> EngineResult<()>;

    async fn remove(&self, id: &str) -> EngineResult<()>;

    async fn inspect(&self, id: &str) -> EngineResult<EngineRecord>;

    /// Records whose labels match `selector`, in engine enumeration
    /// (creation) order.
    async fn list(&self, selector: &Labels) -> EngineResult<Vec<EngineRecord>>;
}
