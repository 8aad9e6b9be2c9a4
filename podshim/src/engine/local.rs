//! Record-keeping engine.
//!
//! `LocalEngine` implements the engine contract by applying lifecycle
//! transitions to records in a [`RecordStore`]. It runs no processes; it is
//! the backend for dry runs, the durable CLI mode, and tests. Timestamps come
//! from the injected clock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use ulid::Ulid;

use super::{
    ContainerEngine, CreateParams, EngineError, EngineRecord, EngineResult, EngineState,
    matches_selector,
};
use crate::clock::SharedClock;
use crate::labels::Labels;

/// Storage for engine records.
///
/// `list` must return records in insertion order.
pub trait RecordStore: Send {
    fn insert(&mut self, record: &EngineRecord) -> EngineResult<()>;
    fn get(&self, id: &str) -> EngineResult<Option<EngineRecord>>;
    fn update(&mut self, record: &EngineRecord) -> EngineResult<()>;
    /// Returns `false` if no record had this id.
    fn delete(&mut self, id: &str) -> EngineResult<bool>;
    fn list(&self) -> EngineResult<Vec<EngineRecord>>;
    /// First record named `name`, if any.
    fn find_by_name(&self, name: &str) -> EngineResult<Option<EngineRecord>>;
}

/// In-process record store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<EngineRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn insert(&mut self, record: &EngineRecord) -> EngineResult<()> {
        if self.records.iter().any(|r| r.id == record.id) {
            return Err(EngineError::Store(format!(
                "record {} already exists",
                record.id
            )));
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> EngineResult<Option<EngineRecord>> {
        Ok(self.records.iter().find(|r| r.id == id).cloned())
    }

    fn update(&mut self, record: &EngineRecord) -> EngineResult<()> {
        let slot = self
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| EngineError::NotFound(record.id.clone()))?;
        *slot = record.clone();
        Ok(())
    }

    fn delete(&mut self, id: &str) -> EngineResult<bool> {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        Ok(self.records.len() != before)
    }

    fn list(&self) -> EngineResult<Vec<EngineRecord>> {
        Ok(self.records.clone())
    }

    fn find_by_name(&self, name: &str) -> EngineResult<Option<EngineRecord>> {
        Ok(self.records.iter().find(|r| r.name == name).cloned())
    }
}

/// Engine that only keeps records.
pub struct LocalEngine {
    store: Mutex<Box<dyn RecordStore>>,
    clock: SharedClock,
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine").finish()
    }
}

impl LocalEngine {
    pub fn new(store: impl RecordStore + 'static, clock: SharedClock) -> Self {
        Self {
            store: Mutex::new(Box::new(store)),
            clock,
        }
    }

    /// Engine backed by a fresh [`MemoryStore`].
    pub fn in_memory(clock: SharedClock) -> Self {
        Self::new(MemoryStore::new(), clock)
    }

    /// Record that a running container's process exited on its own.
    ///
    /// This is how the engine side reports an exit the shim did not ask for;
    /// the next status query observes it.
    pub fn mark_exited(
        &self,
        id: &str,
        exit_code: i32,
        error: Option<String>,
        oom_killed: bool,
    ) -> EngineResult<()> {
        let mut store = self.store.lock();
        let mut record = get_existing(&**store, id)?;

        if record.state != EngineState::Running {
            return Err(EngineError::Conflict {
                id: id.to_string(),
                reason: format!("container is {}, not running", record.state),
            });
        }

        record.state = EngineState::Exited;
        record.finished_at = Some(not_before(
            self.clock.now(),
            record.started_at.or(record.created_at),
        ));
        record.exit_code = exit_code;
        record.error = error.unwrap_or_default();
        record.oom_killed = oom_killed;
        store.update(&record)?;

        tracing::debug!(container_id = %id, exit_code, oom_killed, "Container exited");
        Ok(())
    }
}

/// Local image id: content hash of the reference.
fn image_id(image: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(image.as_bytes())))
}

/// Clamp `now` so a clock step backwards cannot order a later event before
/// an earlier one.
fn not_before(now: DateTime<Utc>, floor: Option<DateTime<Utc>>) -> DateTime<Utc> {
    floor.map_or(now, |floor| now.max(floor))
}

fn get_existing(store: &dyn RecordStore, id: &str) -> EngineResult<EngineRecord> {
    store
        .get(id)?
        .ok_or_else(|| EngineError::NotFound(id.to_string()))
}

#[async_trait]
impl ContainerEngine for LocalEngine {
    fn name(&self) -> &str {
        "local"
    }

    async fn create(&self, params: CreateParams) -> EngineResult<String> {
        if params.image.is_empty() {
            return Err(EngineError::Backend("image reference is empty".into()));
        }

        let mut store = self.store.lock();

        if !params.name.is_empty() && store.find_by_name(&params.name)?.is_some() {
            return Err(EngineError::Conflict {
                id: params.name.clone(),
                reason: "container name already in use".into(),
            });
        }

        let id = Ulid::new().to_string().to_lowercase();
        let record = EngineRecord {
            id: id.clone(),
            name: params.name,
            state: EngineState::Created,
            image_id: image_id(&params.image),
            image: params.image,
            labels: params.labels,
            created_at: Some(self.clock.now()),
            started_at: None,
            finished_at: None,
            exit_code: 0,
            error: String::new(),
            oom_killed: false,
            mounts: params.mounts,
        };
        store.insert(&record)?;

        tracing::trace!(container_id = %id, name = %record.name, "Record created");
        Ok(id)
    }

    async fn start(&self, id: &str) -> EngineResult<()> {
        let mut store = self.store.lock();
        let mut record = get_existing(&**store, id)?;

        match record.state {
            EngineState::Created => {
                record.state = EngineState::Running;
                record.started_at = Some(not_before(self.clock.now(), record.created_at));
                store.update(&record)
            }
            EngineState::Running => Ok(()),
            ref other => Err(EngineError::Conflict {
                id: id.to_string(),
                reason: format!("cannot start container in state {}", other),
            }),
        }
    }

    async fn stop(&self, id: &str, grace: Duration) -> EngineResult<()> {
        let mut store = self.store.lock();
        let mut record = get_existing(&**store, id)?;

        match record.state {
            EngineState::Exited | EngineState::Dead => Ok(()),
            _ => {
                tracing::trace!(container_id = %id, grace = ?grace, "Stopping record");
                record.state = EngineState::Exited;
                record.finished_at = Some(not_before(
            self.clock.now(),
            record.started_at.or(record.created_at),
        ));
                record.exit_code = 0;
                store.update(&record)
            }
        }
    }

    async fn remove(&self, id: &str) -> EngineResult<()> {
        let mut store = self.store.lock();
        if store.delete(id)? {
            Ok(())
        } else {
            Err(EngineError::NotFound(id.to_string()))
        }
    }

    async fn inspect(&self, id: &str) -> EngineResult<EngineRecord> {
        let store = self.store.lock();
        get_existing(&**store, id)
    }

    async fn list(&self, selector: &Labels) -> EngineResult<Vec<EngineRecord>> {
        let store = self.store.lock();
        Ok(store
            .list()?
            .into_iter()
            .filter(|r| matches_selector(selector, &r.labels))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FakeClock};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;

    fn engine() -> (LocalEngine, FakeClock) {
        let clock = FakeClock::new(Utc::now());
        (LocalEngine::in_memory(Arc::new(clock.clone())), clock)
    }

    fn params(name: &str) -> CreateParams {
        CreateParams {
            name: name.into(),
            image: "busybox".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_lifecycle_timestamps_follow_clock() {
        let (engine, clock) = engine();
        let t0 = clock.now();

        let id = engine.create(params("a")).await.unwrap();
        clock.advance(ChronoDuration::seconds(5));
        engine.start(&id).await.unwrap();
        clock.advance(ChronoDuration::seconds(5));
        engine.stop(&id, Duration::ZERO).await.unwrap();

        let record = engine.inspect(&id).await.unwrap();
        assert_eq!(record.state, EngineState::Exited);
        assert_eq!(record.created_at, Some(t0));
        assert_eq!(record.started_at, Some(t0 + ChronoDuration::seconds(5)));
        assert_eq!(record.finished_at, Some(t0 + ChronoDuration::seconds(10)));
        assert!(record.image_id.starts_with("sha256:"));
    }

    #[tokio::test]
    async fn test_clock_stepping_back_keeps_timestamps_ordered() {
        let (engine, clock) = engine();
        let t0 = clock.now();

        let id = engine.create(params("a")).await.unwrap();
        clock.set_time(t0 - ChronoDuration::hours(1));
        engine.start(&id).await.unwrap();
        clock.set_time(t0 - ChronoDuration::hours(2));
        engine.stop(&id, Duration::ZERO).await.unwrap();

        let record = engine.inspect(&id).await.unwrap();
        assert_eq!(record.created_at, Some(t0));
        assert_eq!(record.started_at, Some(t0));
        assert_eq!(record.finished_at, Some(t0));

        // Engine-side exit takes the same floor
        let id = engine.create(params("b")).await.unwrap();
        clock.set_time(t0);
        engine.start(&id).await.unwrap();
        clock.set_time(t0 - ChronoDuration::hours(3));
        engine.mark_exited(&id, 1, None, false).unwrap();

        let record = engine.inspect(&id).await.unwrap();
        assert!(record.created_at <= record.started_at);
        assert!(record.started_at <= record.finished_at);
    }

    #[tokio::test]
    async fn test_start_exited_is_conflict() {
        let (engine, _) = engine();
        let id = engine.create(params("a")).await.unwrap();
        engine.start(&id).await.unwrap();
        engine.start(&id).await.unwrap();
        engine.stop(&id, Duration::ZERO).await.unwrap();

        let err = engine.start(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let (engine, _) = engine();
        engine.create(params("same")).await.unwrap();
        let err = engine.create(params("same")).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_name_reusable_after_remove() {
        let (engine, _) = engine();
        let id = engine.create(params("same")).await.unwrap();
        engine.remove(&id).await.unwrap();
        engine.create(params("same")).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_then_inspect_not_found() {
        let (engine, _) = engine();
        let id = engine.create(params("a")).await.unwrap();
        engine.remove(&id).await.unwrap();

        assert_eq!(
            engine.inspect(&id).await.unwrap_err(),
            EngineError::NotFound(id.clone())
        );
        assert_eq!(
            engine.remove(&id).await.unwrap_err(),
            EngineError::NotFound(id)
        );
    }

    #[tokio::test]
    async fn test_mark_exited_requires_running() {
        let (engine, _) = engine();
        let id = engine.create(params("a")).await.unwrap();
        assert!(engine.mark_exited(&id, 1, None, false).is_err());

        engine.start(&id).await.unwrap();
        engine
            .mark_exited(&id, 137, Some("killed".into()), true)
            .unwrap();

        let record = engine.inspect(&id).await.unwrap();
        assert_eq!(record.exit_code, 137);
        assert_eq!(record.error, "killed");
        assert!(record.oom_killed);
    }

    #[tokio::test]
    async fn test_list_keeps_creation_order_and_filters() {
        let (engine, _) = engine();
        let mut ids = Vec::new();
        for i in 0..3 {
            let mut p = params(&format!("c{}", i));
            p.labels.insert("idx".into(), i.to_string());
            ids.push(engine.create(p).await.unwrap());
        }

        let all: Vec<String> = engine
            .list(&Labels::new())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(all, ids);

        let selector: Labels = [("idx".to_string(), "1".to_string())].into_iter().collect();
        let one = engine.list(&selector).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].id, ids[1]);
    }
}
