//! Orchestrator-facing request and response types.

use std::fmt;

use serde::{Deserialize, Serialize};

pub use crate::engine::Mount;
pub use crate::labels::{ContainerMetadata, Labels, SandboxMetadata};

// =============================================================================
// Requests
// =============================================================================

/// Container creation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub metadata: ContainerMetadata,
    pub image: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    #[serde(default)]
    pub mounts: Vec<Mount>,
}

/// Sandbox (pod) the container belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub metadata: SandboxMetadata,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
}

// =============================================================================
// Container state and status
// =============================================================================

/// Orchestrator container state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerState {
    Created,
    Running,
    Exited,
    Unknown,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.pad("CREATED"),
            Self::Running => f.pad("RUNNING"),
            Self::Exited => f.pad("EXITED"),
            Self::Unknown => f.pad("UNKNOWN"),
        }
    }
}

/// Full status of one container, recomputed from the engine record on every
/// query.
///
/// Timestamps are seconds since the epoch; events that have not happened
/// are 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub id: String,
    pub metadata: ContainerMetadata,
    pub state: ContainerState,
    pub created_at: i64,
    pub started_at: i64,
    pub finished_at: i64,
    pub image: String,
    pub image_ref: String,
    pub exit_code: i32,
    pub reason: String,
    pub message: String,
    pub mounts: Vec<Mount>,
    pub labels: Labels,
    pub annotations: Labels,
}

/// List entry for a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub pod_sandbox_id: String,
    pub metadata: ContainerMetadata,
    pub image: String,
    pub image_ref: String,
    pub state: ContainerState,
    pub created_at: i64,
    pub labels: Labels,
    pub annotations: Labels,
}

/// Narrowing for [`crate::PodShim::list_containers`]. Unset fields match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilter {
    /// Full id or unique-looking prefix.
    pub id: Option<String>,
    pub pod_sandbox_id: Option<String>,
    pub state: Option<ContainerState>,
    /// Every pair must match a caller label exactly.
    pub label_selector: Labels,
}

// =============================================================================
// Sandbox state and status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PodSandboxState {
    Ready,
    #[serde(rename = "NOTREADY")]
    NotReady,
}

impl fmt::Display for PodSandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.pad("READY"),
            Self::NotReady => f.pad("NOTREADY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSandboxStatus {
    pub id: String,
    pub metadata: SandboxMetadata,
    pub state: PodSandboxState,
    pub created_at: i64,
    pub labels: Labels,
    pub annotations: Labels,
}

/// List entry for a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSandbox {
    pub id: String,
    pub metadata: SandboxMetadata,
    pub state: PodSandboxState,
    pub created_at: i64,
    pub labels: Labels,
    pub annotations: Labels,
}

#[derive(Debug, Clone, Default)]
pub struct PodSandboxFilter {
    pub id: Option<String>,
    pub state: Option<PodSandboxState>,
    pub label_selector: Labels,
}
