//! Docker Engine API adapter.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{
        Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
        RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    errors::Error as BollardError,
    models::{ContainerInspectResponse, HostConfig},
};
use chrono::{DateTime, Datelike, Utc};

use super::{
    ContainerEngine, CreateParams, EngineError, EngineRecord, EngineResult, EngineState, Mount,
};
use crate::labels::Labels;

/// Adapter over a local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using the platform's default socket / named pipe and verify
    /// the daemon answers.
    pub async fn connect() -> EngineResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        docker.ping().await.map_err(|e| {
            tracing::error!("Failed to connect to Docker daemon: {}", e);
            EngineError::Backend(e.to_string())
        })?;

        tracing::info!("Connected to Docker daemon");
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

/// Map a bollard error for an operation on `id`.
fn map_err(id: &str, err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => EngineError::NotFound(id.to_string()),
        BollardError::DockerResponseServerError {
            status_code: 409,
            message,
        } => EngineError::Conflict {
            id: id.to_string(),
            reason: message,
        },
        other => EngineError::Backend(other.to_string()),
    }
}

/// Docker reports events that have not happened as `0001-01-01T00:00:00Z`.
fn parse_engine_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw?).ok()?.with_timezone(&Utc);
    if parsed.year() <= 1 || parsed.timestamp() <= 0 {
        None
    } else {
        Some(parsed)
    }
}

fn bind_spec(mount: &Mount) -> String {
    if mount.readonly {
        format!("{}:{}:ro", mount.host_path, mount.container_path)
    } else {
        format!("{}:{}", mount.host_path, mount.container_path)
    }
}

fn to_record(id: &str, inspect: ContainerInspectResponse) -> EngineRecord {
    let state = inspect.state.unwrap_or_default();
    let config = inspect.config.unwrap_or_default();

    let mounts = inspect
        .mounts
        .unwrap_or_default()
        .into_iter()
        .map(|m| Mount {
            container_path: m.destination.unwrap_or_default(),
            host_path: m.source.unwrap_or_default(),
            readonly: !m.rw.unwrap_or(true),
        })
        .collect();

    EngineRecord {
        id: inspect.id.unwrap_or_else(|| id.to_string()),
        name: inspect
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        state: state
            .status
            .map(|s| EngineState::parse(&s.to_string()))
            .unwrap_or_else(|| EngineState::Other(String::new())),
        image: config.image.unwrap_or_default(),
        image_id: inspect.image.unwrap_or_default(),
        labels: config.labels.unwrap_or_default(),
        created_at: parse_engine_time(inspect.created.as_deref()),
        started_at: parse_engine_time(state.started_at.as_deref()),
        finished_at: parse_engine_time(state.finished_at.as_deref()),
        exit_code: state.exit_code.unwrap_or(0) as i32,
        error: state.error.unwrap_or_default(),
        oom_killed: state.oom_killed.unwrap_or(false),
        mounts,
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    fn name(&self) -> &str {
        "docker"
    }

    async fn create(&self, params: CreateParams) -> EngineResult<String> {
        let binds: Vec<String> = params.mounts.iter().map(bind_spec).collect();

        let config = Config {
            image: Some(params.image.clone()),
            labels: Some(params.labels),
            host_config: Some(HostConfig {
                binds: (!binds.is_empty()).then_some(binds),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = (!params.name.is_empty()).then(|| CreateContainerOptions {
            name: params.name.clone(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| map_err(&params.name, e))?;

        for warning in &response.warnings {
            tracing::warn!(container_id = %response.id, "Docker create warning: {}", warning);
        }
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> EngineResult<()> {
        match self
            .docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // Already started
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_err(id, e)),
        }
    }

    async fn stop(&self, id: &str, grace: Duration) -> EngineResult<()> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };

        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // Already stopped
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_err(id, e)),
        }
    }

    async fn remove(&self, id: &str) -> EngineResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| map_err(id, e))
    }

    async fn inspect(&self, id: &str) -> EngineResult<EngineRecord> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_err(id, e))?;
        Ok(to_record(id, inspect))
    }

    async fn list(&self, selector: &Labels) -> EngineResult<Vec<EngineRecord>> {
        let mut filters = HashMap::new();
        if !selector.is_empty() {
            filters.insert(
                "label".to_string(),
                selector
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>(),
            );
        }

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let mut summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        // Docker lists newest first
        summaries.reverse();

        let mut records = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id else { continue };
            match self.inspect(&id).await {
                Ok(record) => records.push(record),
                // Removed between list and inspect
                Err(EngineError::NotFound(_)) => {
                    tracing::debug!(container_id = %id, "Container vanished during list");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }
}
