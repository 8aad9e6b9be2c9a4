//! Shim configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable overriding the default home directory.
pub const HOME_ENV: &str = "PODSHIM_HOME";

/// Default infra image run by sandbox records.
pub const DEFAULT_SANDBOX_IMAGE: &str = "registry.k8s.io/pause:3.9";

/// Default grace period for sandbox-wide stops.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Options for [`crate::PodShim::open`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimOptions {
    /// Root for the record database and logs. Must be absolute.
    pub home_dir: PathBuf,
    /// Image used for sandbox records.
    pub sandbox_image: String,
    /// Grace period used when stopping a sandbox's containers.
    #[serde(with = "duration_secs")]
    pub default_stop_grace: Duration,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ShimOptions {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            sandbox_image: DEFAULT_SANDBOX_IMAGE.to_string(),
            default_stop_grace: DEFAULT_STOP_GRACE,
            log_filter: "info".to_string(),
        }
    }
}

impl ShimOptions {
    pub fn db_path(&self) -> PathBuf {
        self.home_dir.join("db").join("records.db")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join("logs")
    }
}

/// `$PODSHIM_HOME`, else `~/.podshim`.
fn default_home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".podshim")
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
