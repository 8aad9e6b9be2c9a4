//! Shim entry point.

use std::sync::Arc;

use crate::clock::{SharedClock, SystemClock};
use crate::db::{Database, SqliteRecordStore};
use crate::engine::{ContainerEngine, LocalEngine};
use crate::errors::{ShimError, ShimResult};
use crate::runtime::options::ShimOptions;

// ============================================================================
// PUBLIC API
// ============================================================================

/// PodShim translates pod/container lifecycle calls onto a container engine.
///
/// Holds no lifecycle state of its own: every status and listing is
/// recomputed from the engine, so there is nothing to invalidate after a
/// remove or an engine-side exit.
///
/// **Cloning**: cheap via `Arc`; all clones share the same engine handle.
#[derive(Clone)]
pub struct PodShim {
    pub(crate) inner: ShimInner,
}

/// Shared shim state.
pub type ShimInner = Arc<ShimInnerImpl>;

pub struct ShimInnerImpl {
    /// Immutable after construction; the engine does its own locking.
    pub(crate) engine: Arc<dyn ContainerEngine>,
    pub(crate) options: ShimOptions,
}

impl PodShim {
    /// Wrap an existing engine adapter.
    pub fn new(engine: Arc<dyn ContainerEngine>, options: ShimOptions) -> Self {
        tracing::debug!(engine = engine.name(), "initialized shim");
        Self {
            inner: Arc::new(ShimInnerImpl { engine, options }),
        }
    }

    /// Shim over the durable local engine under `options.home_dir`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `home_dir` is not absolute
    /// - the record database cannot be opened
    pub fn open(options: ShimOptions) -> ShimResult<Self> {
        Self::open_with_clock(options, Arc::new(SystemClock))
    }

    /// Like [`PodShim::open`] with an explicit time source.
    pub fn open_with_clock(options: ShimOptions, clock: SharedClock) -> ShimResult<Self> {
        // Validate early: check preconditions before touching the filesystem
        if !options.home_dir.is_absolute() {
            return Err(ShimError::InvalidConfig(format!(
                "home_dir must be absolute path, got: {}",
                options.home_dir.display()
            )));
        }

        let db_path = options.db_path();
        let db = Database::open(&db_path).map_err(|e| {
            ShimError::Database(format!(
                "Failed to initialize record store at {}: {}",
                db_path.display(),
                e
            ))
        })?;
        let engine = LocalEngine::new(SqliteRecordStore::new(db), clock);

        Ok(Self::new(Arc::new(engine), options))
    }

    /// Shim over a local engine that keeps records in memory only.
    pub fn in_memory(clock: SharedClock) -> Self {
        Self::new(
            Arc::new(LocalEngine::in_memory(clock)),
            ShimOptions::default(),
        )
    }

    /// Shim over the local Docker daemon.
    #[cfg(feature = "docker")]
    pub async fn docker(options: ShimOptions) -> ShimResult<Self> {
        let engine = crate::engine::DockerEngine::connect()
            .await
            .map_err(ShimError::EngineUnavailable)?;
        Ok(Self::new(Arc::new(engine), options))
    }

    pub fn options(&self) -> &ShimOptions {
        &self.inner.options
    }

    pub(crate) fn engine(&self) -> &dyn ContainerEngine {
        self.inner.engine.as_ref()
    }
}

impl std::fmt::Debug for PodShim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodShim")
            .field("engine", &self.inner.engine.name())
            .field("home_dir", &self.inner.options.home_dir)
            .finish()
    }
}

// ============================================================================
// THREAD SAFETY ASSERTIONS
// ============================================================================

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<PodShim>;
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_open_rejects_relative_home() {
        let options = ShimOptions {
            home_dir: PathBuf::from("relative/home"),
            ..Default::default()
        };
        let err = PodShim::open(options).unwrap_err();
        assert!(matches!(err, ShimError::InvalidConfig(_)));
    }

    #[test]
    fn test_open_creates_record_db() {
        let dir = TempDir::new().unwrap();
        let options = ShimOptions {
            home_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let shim = PodShim::open(options.clone()).unwrap();
        assert!(options.db_path().exists());
        assert_eq!(shim.engine().name(), "local");
    }
}
