//! Container lifecycle translation.
//!
//! Requests are encoded onto engine records through the metadata codec;
//! engine records are decoded back into orchestrator status.
//!
//! ```text
//!   ┌─────────┐  create   ┌─────────┐  start   ┌─────────┐  stop / exit  ┌────────┐
//!   │ (none)  │ ────────► │ CREATED │ ───────► │ RUNNING │ ────────────► │ EXITED │
//!   └─────────┘           └─────────┘          └─────────┘               └────────┘
//!        ▲                     │ remove             │ remove                 │ remove
//!        └─────────────────────┴────────────────────┴────────────────────────┘
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::core::PodShim;
use super::types::{Container, ContainerConfig, ContainerState, ContainerStatus, SandboxConfig};
use crate::engine::{CreateParams, EngineError, EngineRecord, EngineState};
use crate::errors::{ShimError, ShimResult};
use crate::labels::{self, ContainerMetadata, LabelError, RecordIdentity, SandboxMetadata};

/// Exit reasons reported for EXITED containers.
pub mod reasons {
    pub const COMPLETED: &str = "Completed";
    pub const ERROR: &str = "Error";
    pub const OOM_KILLED: &str = "OOMKilled";
}

/// Engine record name: `k8s_<container>_<pod>_<namespace>_<uid>_<attempt>`.
pub(crate) fn container_name(container: &ContainerMetadata, sandbox: &SandboxMetadata) -> String {
    format!(
        "k8s_{}_{}_{}_{}_{}",
        container.name, sandbox.name, sandbox.namespace, sandbox.uid, container.attempt
    )
}

/// Fixed engine → orchestrator state table.
pub(crate) fn map_state(state: &EngineState) -> ContainerState {
    match state {
        EngineState::Created => ContainerState::Created,
        EngineState::Running => ContainerState::Running,
        EngineState::Exited | EngineState::Dead => ContainerState::Exited,
        _ => ContainerState::Unknown,
    }
}

/// Seconds since the epoch; unset (or pre-epoch) is 0.
pub(crate) fn unix_seconds(t: Option<DateTime<Utc>>) -> i64 {
    t.map(|t| t.timestamp()).filter(|s| *s > 0).unwrap_or(0)
}

fn exit_reason(record: &EngineRecord) -> &'static str {
    if record.oom_killed {
        reasons::OOM_KILLED
    } else if record.exit_code == 0 {
        reasons::COMPLETED
    } else {
        reasons::ERROR
    }
}

/// Map an engine failure on `id`; not-found keeps its own kind.
pub(crate) fn engine_failure(
    id: &str,
    err: EngineError,
    wrap: impl FnOnce(String, EngineError) -> ShimError,
) -> ShimError {
    match err {
        EngineError::NotFound(_) => ShimError::NotFound(id.to_string()),
        other => wrap(id.to_string(), other),
    }
}

pub(crate) fn malformed(id: &str, err: LabelError) -> ShimError {
    ShimError::MalformedMetadata {
        id: id.to_string(),
        reason: err.to_string(),
    }
}

/// Translate an engine record into full container status.
pub(crate) fn to_container_status(record: EngineRecord) -> ShimResult<ContainerStatus> {
    let metadata = match labels::decode(&record.labels).map_err(|e| malformed(&record.id, e))? {
        RecordIdentity::Container { metadata, .. } => metadata,
        RecordIdentity::Sandbox { .. } => {
            tracing::debug!(container_id = %record.id, "Record is a sandbox, not a container");
            return Err(ShimError::NotFound(record.id));
        }
    };

    let (user_labels, annotations) = labels::strip(&record.labels);
    let state = map_state(&record.state);

    let (exit_code, reason, message) = if state == ContainerState::Exited {
        (
            record.exit_code,
            exit_reason(&record).to_string(),
            record.error.clone(),
        )
    } else {
        (0, String::new(), String::new())
    };

    Ok(ContainerStatus {
        id: record.id,
        metadata,
        state,
        created_at: unix_seconds(record.created_at),
        started_at: unix_seconds(record.started_at),
        finished_at: unix_seconds(record.finished_at),
        image: record.image,
        image_ref: record.image_id,
        exit_code,
        reason,
        message,
        mounts: record.mounts,
        labels: user_labels,
        annotations,
    })
}

/// Translate an engine record into a list entry.
///
/// `Ok(None)` for records that are not containers.
pub(crate) fn to_container(record: EngineRecord) -> Result<Option<Container>, LabelError> {
    let (metadata, pod_sandbox_id) = match labels::decode(&record.labels)? {
        RecordIdentity::Container {
            metadata,
            sandbox_id,
        } => (metadata, sandbox_id),
        RecordIdentity::Sandbox { .. } => return Ok(None),
    };
    let (user_labels, annotations) = labels::strip(&record.labels);

    Ok(Some(Container {
        id: record.id,
        pod_sandbox_id,
        metadata,
        image: record.image,
        image_ref: record.image_id,
        state: map_state(&record.state),
        created_at: unix_seconds(record.created_at),
        labels: user_labels,
        annotations,
    }))
}

impl PodShim {
    /// Create a container correlated to `pod_sandbox_id`.
    ///
    /// Validation happens before any engine call, so a rejected request has
    /// no side effect.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig`: empty image, name or sandbox id; reserved label key
    /// - `CreateFailed`: the engine refused the create
    pub async fn create_container(
        &self,
        pod_sandbox_id: &str,
        config: ContainerConfig,
        sandbox_config: &SandboxConfig,
    ) -> ShimResult<String> {
        if config.image.is_empty() {
            return Err(ShimError::InvalidConfig("image reference is empty".into()));
        }
        if config.metadata.name.is_empty() {
            return Err(ShimError::InvalidConfig("container name is empty".into()));
        }
        if pod_sandbox_id.is_empty() {
            return Err(ShimError::InvalidConfig("pod sandbox id is empty".into()));
        }

        let name = container_name(&config.metadata, &sandbox_config.metadata);
        let identity = RecordIdentity::Container {
            metadata: config.metadata,
            sandbox_id: pod_sandbox_id.to_string(),
        };
        let merged = labels::merge(&identity, &config.labels, &config.annotations)
            .map_err(|e| ShimError::InvalidConfig(e.to_string()))?;

        tracing::debug!(
            name = %name,
            sandbox_id = %pod_sandbox_id,
            image = %config.image,
            "Creating container"
        );

        let params = CreateParams {
            name: name.clone(),
            image: config.image,
            labels: merged,
            mounts: config.mounts,
        };
        let id = self
            .engine()
            .create(params)
            .await
            .map_err(|source| ShimError::CreateFailed {
                name: name.clone(),
                source,
            })?;

        tracing::info!(container_id = %id, name = %name, "Created container");
        Ok(id)
    }

    /// Start a created container.
    pub async fn start_container(&self, id: &str) -> ShimResult<()> {
        tracing::debug!(container_id = %id, "Starting container");

        self.engine()
            .start(id)
            .await
            .map_err(|e| {
                engine_failure(id, e, |id, source| ShimError::StartFailed { id, source })
            })?;

        tracing::info!(container_id = %id, "Started container");
        Ok(())
    }

    /// Stop a container, giving it `grace` before it is killed.
    pub async fn stop_container(&self, id: &str, grace: Duration) -> ShimResult<()> {
        tracing::debug!(container_id = %id, grace = ?grace, "Stopping container");

        self.engine()
            .stop(id, grace)
            .await
            .map_err(|e| {
                engine_failure(id, e, |id, source| ShimError::StopFailed { id, source })
            })?;

        tracing::info!(container_id = %id, "Stopped container");
        Ok(())
    }

    /// Remove a container in any state.
    ///
    /// Afterwards `container_status` fails with `NotFound` and listings no
    /// longer include the id.
    pub async fn remove_container(&self, id: &str) -> ShimResult<()> {
        tracing::debug!(container_id = %id, "Removing container");

        self.engine()
            .remove(id)
            .await
            .map_err(|e| {
                engine_failure(id, e, |id, source| ShimError::RemoveFailed { id, source })
            })?;

        tracing::info!(container_id = %id, "Removed container");
        Ok(())
    }

    /// Current status, recomputed from the engine record.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such record, or the record is a sandbox
    /// - `MalformedMetadata`: reserved labels missing or corrupt
    /// - `InspectFailed`: any other engine failure
    pub async fn container_status(&self, id: &str) -> ShimResult<ContainerStatus> {
        let record = self.engine().inspect(id).await.map_err(|e| {
            engine_failure(id, e, |id, source| ShimError::InspectFailed { id, source })
        })?;

        tracing::trace!(container_id = %id, engine_state = %record.state, "Inspected container");
        to_container_status(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FakeClock};
    use crate::labels::{Labels, keys};
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;

    fn sandbox_config() -> SandboxConfig {
        SandboxConfig {
            metadata: SandboxMetadata {
                name: "foo".into(),
                namespace: "bar".into(),
                uid: "1".into(),
                attempt: 0,
            },
            ..Default::default()
        }
    }

    fn container_config(name: &str) -> ContainerConfig {
        ContainerConfig {
            metadata: ContainerMetadata {
                name: name.into(),
                attempt: 0,
            },
            image: "iamimage".into(),
            labels: [("abc.xyz".to_string(), "foo".to_string())]
                .into_iter()
                .collect(),
            annotations: [("foo.bar.baz".to_string(), "abc".to_string())]
                .into_iter()
                .collect(),
            mounts: Vec::new(),
        }
    }

    fn record(state: EngineState, exit_code: i32, oom_killed: bool) -> EngineRecord {
        let identity = RecordIdentity::Container {
            metadata: ContainerMetadata {
                name: "pause".into(),
                attempt: 0,
            },
            sandbox_id: "sandboxid".into(),
        };
        EngineRecord {
            id: "cid".into(),
            name: "k8s_pause".into(),
            state,
            image: "iamimage".into(),
            image_id: "sha256:abc".into(),
            labels: labels::encode(&identity),
            created_at: Some(Utc::now()),
            started_at: None,
            finished_at: None,
            exit_code,
            error: "boom".into(),
            oom_killed,
            mounts: Vec::new(),
        }
    }

    #[test]
    fn test_state_table() {
        assert_eq!(map_state(&EngineState::Created), ContainerState::Created);
        assert_eq!(map_state(&EngineState::Running), ContainerState::Running);
        assert_eq!(map_state(&EngineState::Exited), ContainerState::Exited);
        assert_eq!(map_state(&EngineState::Dead), ContainerState::Exited);
        assert_eq!(map_state(&EngineState::Paused), ContainerState::Unknown);
        assert_eq!(
            map_state(&EngineState::Other("???".into())),
            ContainerState::Unknown
        );
    }

    #[test]
    fn test_unset_time_is_zero() {
        assert_eq!(unix_seconds(None), 0);
        assert_eq!(unix_seconds(DateTime::from_timestamp(0, 0)), 0);
        assert_eq!(unix_seconds(DateTime::from_timestamp(1_700_000_000, 0)), 1_700_000_000);
    }

    #[test]
    fn test_exit_fields_only_when_exited() {
        let running = to_container_status(record(EngineState::Running, 3, false)).unwrap();
        assert_eq!(running.exit_code, 0);
        assert_eq!(running.reason, "");
        assert_eq!(running.message, "");

        let failed = to_container_status(record(EngineState::Exited, 3, false)).unwrap();
        assert_eq!(failed.exit_code, 3);
        assert_eq!(failed.reason, reasons::ERROR);
        assert_eq!(failed.message, "boom");

        let oom = to_container_status(record(EngineState::Dead, 137, true)).unwrap();
        assert_eq!(oom.reason, reasons::OOM_KILLED);

        let ok = to_container_status(record(EngineState::Exited, 0, false)).unwrap();
        assert_eq!(ok.reason, reasons::COMPLETED);
    }

    #[test]
    fn test_container_name_convention() {
        let name = container_name(
            &container_config("sidecar").metadata,
            &sandbox_config().metadata,
        );
        assert_eq!(name, "k8s_sidecar_foo_bar_1_0");
    }

    #[tokio::test]
    async fn test_status_follows_lifecycle() {
        let clock = FakeClock::new(Utc::now() - ChronoDuration::hours(1));
        let shim = PodShim::in_memory(Arc::new(clock.clone()));
        let config = container_config("pause");

        let created_at = clock.now().timestamp();
        let id = shim
            .create_container("sandboxid", config.clone(), &sandbox_config())
            .await
            .unwrap();

        let status = shim.container_status(&id).await.unwrap();
        assert_eq!(status.id, id);
        assert_eq!(status.state, ContainerState::Created);
        assert_eq!(status.created_at, created_at);
        assert_eq!(status.started_at, 0);
        assert_eq!(status.finished_at, 0);
        assert_eq!(status.metadata, config.metadata);
        assert_eq!(status.image, "iamimage");
        assert_eq!(status.labels, config.labels);
        assert_eq!(status.annotations, config.annotations);
        assert!(status.mounts.is_empty());

        clock.advance(ChronoDuration::hours(1));
        let started_at = clock.now().timestamp();
        shim.start_container(&id).await.unwrap();
        let status = shim.container_status(&id).await.unwrap();
        assert_eq!(status.state, ContainerState::Running);
        assert_eq!(status.started_at, started_at);
        assert_eq!(status.created_at, created_at);

        clock.advance(ChronoDuration::hours(1));
        let finished_at = clock.now().timestamp();
        shim.stop_container(&id, Duration::ZERO).await.unwrap();
        let status = shim.container_status(&id).await.unwrap();
        assert_eq!(status.state, ContainerState::Exited);
        assert_eq!(status.reason, reasons::COMPLETED);
        assert_eq!(status.exit_code, 0);
        assert_eq!(status.finished_at, finished_at);
        assert_eq!(status.started_at, started_at);

        shim.remove_container(&id).await.unwrap();
        assert!(shim.container_status(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_writes_internal_labels() {
        let shim = PodShim::in_memory(Arc::new(FakeClock::default()));
        let id = shim
            .create_container("sandboxid", container_config("pause"), &sandbox_config())
            .await
            .unwrap();

        let record = shim.engine().inspect(&id).await.unwrap();
        assert_eq!(record.labels[keys::TYPE], keys::TYPE_CONTAINER);
        assert_eq!(record.labels[keys::SANDBOX_ID], "sandboxid");
        assert_eq!(record.name, "k8s_pause_foo_bar_1_0");
    }

    #[tokio::test]
    async fn test_create_rejects_before_engine_call() {
        let shim = PodShim::in_memory(Arc::new(FakeClock::default()));

        let mut reserved = container_config("a");
        reserved
            .labels
            .insert(keys::SANDBOX_ID.to_string(), "hijack".to_string());
        let mut no_image = container_config("b");
        no_image.image.clear();

        for (sandbox_id, config) in [
            ("sandboxid", reserved),
            ("sandboxid", no_image),
            ("", container_config("c")),
        ] {
            let err = shim
                .create_container(sandbox_id, config, &sandbox_config())
                .await
                .unwrap_err();
            assert!(matches!(err, ShimError::InvalidConfig(_)), "{err}");
        }

        assert!(shim.engine().list(&Labels::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_create_failed() {
        let shim = PodShim::in_memory(Arc::new(FakeClock::default()));
        shim.create_container("s", container_config("a"), &sandbox_config())
            .await
            .unwrap();
        let err = shim
            .create_container("s", container_config("a"), &sandbox_config())
            .await
            .unwrap_err();
        assert!(matches!(err, ShimError::CreateFailed { .. }));
    }

    #[tokio::test]
    async fn test_operations_on_missing_id_are_not_found() {
        let shim = PodShim::in_memory(Arc::new(FakeClock::default()));
        assert!(shim.start_container("nope").await.unwrap_err().is_not_found());
        assert!(
            shim.stop_container("nope", Duration::ZERO)
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(shim.remove_container("nope").await.unwrap_err().is_not_found());
        assert!(shim.container_status("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_start_after_exit_is_start_failed() {
        let shim = PodShim::in_memory(Arc::new(FakeClock::default()));
        let id = shim
            .create_container("s", container_config("a"), &sandbox_config())
            .await
            .unwrap();
        shim.start_container(&id).await.unwrap();
        shim.stop_container(&id, Duration::ZERO).await.unwrap();

        let err = shim.start_container(&id).await.unwrap_err();
        assert!(matches!(err, ShimError::StartFailed { .. }));
    }

    #[tokio::test]
    async fn test_status_of_corrupt_record_is_malformed() {
        let shim = PodShim::in_memory(Arc::new(FakeClock::default()));
        let id = shim
            .engine()
            .create(CreateParams {
                name: "stray".into(),
                image: "busybox".into(),
                labels: [(keys::TYPE.to_string(), keys::TYPE_CONTAINER.to_string())]
                    .into_iter()
                    .collect(),
                mounts: Vec::new(),
            })
            .await
            .unwrap();

        let err = shim.container_status(&id).await.unwrap_err();
        assert!(matches!(err, ShimError::MalformedMetadata { .. }));
    }
}
