//! Listing and filtering.
//!
//! Containers and sandboxes share one engine record space; the codec's
//! discriminator tells them apart. A record whose labels cannot be decoded is
//! logged and skipped so it cannot hide the rest of the listing.

use chrono::{DateTime, Utc};

use super::container::to_container;
use super::core::PodShim;
use super::sandbox::to_pod_sandbox;
use super::types::{Container, ContainerFilter, PodSandbox, PodSandboxFilter};
use crate::engine::{EngineRecord, matches_selector};
use crate::errors::{ShimError, ShimResult};
use crate::labels::{Labels, RecordKind, keys};

/// Most recently created first; equal creation times fall back to reverse
/// enumeration order.
pub(crate) fn order_by_recency<T>(items: Vec<(Option<DateTime<Utc>>, T)>) -> Vec<T> {
    let mut indexed: Vec<(Option<DateTime<Utc>>, usize, T)> = items
        .into_iter()
        .enumerate()
        .map(|(idx, (created, item))| (created, idx, item))
        .collect();
    indexed.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
    indexed.into_iter().map(|(_, _, item)| item).collect()
}

/// Exact id, or a prefix of it (engine ids are often shown truncated).
fn id_matches(wanted: Option<&str>, id: &str) -> bool {
    wanted.is_none_or(|w| id.starts_with(w))
}

/// Engine-side label selector for one record kind.
fn kind_selector(kind: RecordKind, extra: &Labels) -> Labels {
    let mut selector = extra.clone();
    selector.insert(keys::TYPE.to_string(), kind.as_label().to_string());
    selector
}

impl PodShim {
    async fn list_records(&self, selector: &Labels) -> ShimResult<Vec<EngineRecord>> {
        self.engine()
            .list(selector)
            .await
            .map_err(ShimError::ListFailed)
    }

    /// List containers, newest first.
    ///
    /// `None` lists every container record.
    pub async fn list_containers(
        &self,
        filter: Option<&ContainerFilter>,
    ) -> ShimResult<Vec<Container>> {
        let default_filter = ContainerFilter::default();
        let filter = filter.unwrap_or(&default_filter);

        let mut narrowing = filter.label_selector.clone();
        if let Some(sandbox_id) = &filter.pod_sandbox_id {
            narrowing.insert(keys::SANDBOX_ID.to_string(), sandbox_id.clone());
        }
        let records = self
            .list_records(&kind_selector(RecordKind::Container, &narrowing))
            .await?;

        let mut matched = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id.clone();
            let created = record.created_at;

            let container = match to_container(record) {
                Ok(Some(container)) => container,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        container_id = %id,
                        error = %e,
                        "Skipping record with malformed metadata"
                    );
                    continue;
                }
            };

            let keep = id_matches(filter.id.as_deref(), &container.id)
                && filter
                    .pod_sandbox_id
                    .as_ref()
                    .is_none_or(|s| *s == container.pod_sandbox_id)
                && filter.state.is_none_or(|s| s == container.state)
                && matches_selector(&filter.label_selector, &container.labels);

            if keep {
                matched.push((created, container));
            }
        }

        Ok(order_by_recency(matched))
    }

    /// List sandboxes, newest first.
    pub async fn list_pod_sandboxes(
        &self,
        filter: Option<&PodSandboxFilter>,
    ) -> ShimResult<Vec<PodSandbox>> {
        let default_filter = PodSandboxFilter::default();
        let filter = filter.unwrap_or(&default_filter);

        let records = self
            .list_records(&kind_selector(RecordKind::Sandbox, &filter.label_selector))
            .await?;

        let mut matched = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id.clone();
            let created = record.created_at;

            let sandbox = match to_pod_sandbox(record) {
                Ok(Some(sandbox)) => sandbox,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        sandbox_id = %id,
                        error = %e,
                        "Skipping record with malformed metadata"
                    );
                    continue;
                }
            };

            let keep = id_matches(filter.id.as_deref(), &sandbox.id)
                && filter.state.is_none_or(|s| s == sandbox.state)
                && matches_selector(&filter.label_selector, &sandbox.labels);

            if keep {
                matched.push((created, sandbox));
            }
        }

        Ok(order_by_recency(matched))
    }
}
