//! Pod sandbox lifecycle.
//!
//! A sandbox is an ordinary engine record running the infra image, tagged
//! `podsandbox` by the codec. Containers point at it through their sandbox
//! correlation label.

use chrono::{DateTime, Utc};

use super::container::{engine_failure, malformed, unix_seconds};
use super::core::PodShim;
use super::types::{
    ContainerFilter, ContainerState, PodSandbox, PodSandboxState, PodSandboxStatus, SandboxConfig,
};
use crate::engine::{CreateParams, EngineRecord, EngineState};
use crate::errors::{ShimError, ShimResult};
use crate::labels::{self, LabelError, RecordIdentity, SandboxMetadata};

/// Engine record name: `k8s_POD_<pod>_<namespace>_<uid>_<attempt>`.
pub(crate) fn sandbox_name(sandbox: &SandboxMetadata) -> String {
    format!(
        "k8s_POD_{}_{}_{}_{}",
        sandbox.name, sandbox.namespace, sandbox.uid, sandbox.attempt
    )
}

fn sandbox_state(state: &EngineState) -> PodSandboxState {
    if *state == EngineState::Running {
        PodSandboxState::Ready
    } else {
        PodSandboxState::NotReady
    }
}

struct DecodedSandbox {
    id: String,
    metadata: SandboxMetadata,
    state: PodSandboxState,
    created_at: Option<DateTime<Utc>>,
    labels: labels::Labels,
    annotations: labels::Labels,
}

/// `Ok(None)` for records that are not sandboxes.
fn decode_sandbox(record: EngineRecord) -> Result<Option<DecodedSandbox>, LabelError> {
    let metadata = match labels::decode(&record.labels)? {
        RecordIdentity::Sandbox { metadata } => metadata,
        RecordIdentity::Container { .. } => return Ok(None),
    };
    let (user_labels, annotations) = labels::strip(&record.labels);

    Ok(Some(DecodedSandbox {
        id: record.id,
        metadata,
        state: sandbox_state(&record.state),
        created_at: record.created_at,
        labels: user_labels,
        annotations,
    }))
}

pub(crate) fn to_pod_sandbox(record: EngineRecord) -> Result<Option<PodSandbox>, LabelError> {
    Ok(decode_sandbox(record)?.map(|s| PodSandbox {
        id: s.id,
        metadata: s.metadata,
        state: s.state,
        created_at: unix_seconds(s.created_at),
        labels: s.labels,
        annotations: s.annotations,
    }))
}

impl PodShim {
    /// Create and start a sandbox record.
    ///
    /// `image` defaults to [`crate::ShimOptions::sandbox_image`]. If the
    /// start fails the record is removed again, so a failed call leaves
    /// nothing behind.
    pub async fn run_pod_sandbox(
        &self,
        config: &SandboxConfig,
        image: Option<&str>,
    ) -> ShimResult<String> {
        if config.metadata.name.is_empty() {
            return Err(ShimError::InvalidConfig("pod name is empty".into()));
        }

        let image = image.unwrap_or(&self.inner.options.sandbox_image).to_string();
        if image.is_empty() {
            return Err(ShimError::InvalidConfig("sandbox image is empty".into()));
        }

        let name = sandbox_name(&config.metadata);
        let identity = RecordIdentity::Sandbox {
            metadata: config.metadata.clone(),
        };
        let merged = labels::merge(&identity, &config.labels, &config.annotations)
            .map_err(|e| ShimError::InvalidConfig(e.to_string()))?;

        tracing::debug!(name = %name, image = %image, "Running pod sandbox");

        let id = self
            .engine()
            .create(CreateParams {
                name: name.clone(),
                image,
                labels: merged,
                mounts: Vec::new(),
            })
            .await
            .map_err(|source| ShimError::CreateFailed {
                name: name.clone(),
                source,
            })?;

        if let Err(e) = self.engine().start(&id).await {
            tracing::warn!(
                sandbox_id = %id,
                error = %e,
                "Sandbox failed to start, removing record"
            );
            if let Err(cleanup) = self.engine().remove(&id).await {
                tracing::warn!(
                    sandbox_id = %id,
                    error = %cleanup,
                    "Failed to remove sandbox record"
                );
            }
            return Err(ShimError::StartFailed { id, source: e });
        }

        tracing::info!(sandbox_id = %id, name = %name, "Pod sandbox ready");
        Ok(id)
    }

    /// Current sandbox status.
    pub async fn pod_sandbox_status(&self, id: &str) -> ShimResult<PodSandboxStatus> {
        let record = self.engine().inspect(id).await.map_err(|e| {
            engine_failure(id, e, |id, source| ShimError::InspectFailed { id, source })
        })?;

        let sandbox = decode_sandbox(record)
            .map_err(|e| malformed(id, e))?
            .ok_or_else(|| ShimError::NotFound(id.to_string()))?;

        Ok(PodSandboxStatus {
            id: sandbox.id,
            metadata: sandbox.metadata,
            state: sandbox.state,
            created_at: unix_seconds(sandbox.created_at),
            labels: sandbox.labels,
            annotations: sandbox.annotations,
        })
    }

    /// Stop every container in the sandbox, then the sandbox itself.
    ///
    /// Containers that disappear mid-sweep are skipped.
    pub async fn stop_pod_sandbox(&self, id: &str) -> ShimResult<()> {
        // Fails with NotFound before touching any container
        self.pod_sandbox_status(id).await?;

        let grace = self.inner.options.default_stop_grace;
        for container in self.sandbox_containers(id).await? {
            if container.state == ContainerState::Exited {
                continue;
            }
            match self.stop_container(&container.id, grace).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(container_id = %container.id, "Container gone before stop");
                }
                Err(e) => return Err(e),
            }
        }

        self.engine()
            .stop(id, grace)
            .await
            .map_err(|e| {
                engine_failure(id, e, |id, source| ShimError::StopFailed { id, source })
            })?;

        tracing::info!(sandbox_id = %id, "Stopped pod sandbox");
        Ok(())
    }

    /// Remove every container in the sandbox, then the sandbox record.
    pub async fn remove_pod_sandbox(&self, id: &str) -> ShimResult<()> {
        self.pod_sandbox_status(id).await?;

        for container in self.sandbox_containers(id).await? {
            match self.remove_container(&container.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(container_id = %container.id, "Container already removed");
                }
                Err(e) => return Err(e),
            }
        }

        self.engine()
            .remove(id)
            .await
            .map_err(|e| {
                engine_failure(id, e, |id, source| ShimError::RemoveFailed { id, source })
            })?;

        tracing::info!(sandbox_id = %id, "Removed pod sandbox");
        Ok(())
    }

    async fn sandbox_containers(&self, id: &str) -> ShimResult<Vec<super::types::Container>> {
        let filter = ContainerFilter {
            pod_sandbox_id: Some(id.to_string()),
            ..Default::default()
        };
        self.list_containers(Some(&filter)).await
    }
}
