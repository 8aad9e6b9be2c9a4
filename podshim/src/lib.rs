//! podshim: a pod lifecycle shim over a generic container engine.
//!
//! Pod sandboxes and their containers are stored as plain engine records.
//! Everything the engine does not model itself (pod identity, container
//! name and attempt, the sandbox a container belongs to) travels in reserved
//! record labels, so the shim stays stateless and every status is read back
//! from the engine.
//!
//! ```no_run
//! # async fn demo() -> podshim::ShimResult<()> {
//! use podshim::{PodShim, ShimOptions};
//!
//! let shim = PodShim::open(ShimOptions::default())?;
//! for container in shim.list_containers(None).await? {
//!     println!("{} {}", container.id, container.state);
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod db;
pub mod engine;
pub mod errors;
pub mod labels;
pub mod logging;
pub mod runtime;

pub use clock::{Clock, FakeClock, SharedClock, SystemClock};
#[cfg(feature = "docker")]
pub use engine::DockerEngine;
pub use engine::{
    ContainerEngine, CreateParams, EngineError, EngineRecord, EngineResult, EngineState,
    LocalEngine, MemoryStore, RecordStore,
};
pub use errors::{ShimError, ShimResult};
pub use runtime::options::ShimOptions;
pub use runtime::{
    Container, ContainerConfig, ContainerFilter, ContainerMetadata, ContainerState,
    ContainerStatus, Labels, Mount, PodSandbox, PodSandboxFilter, PodSandboxState,
    PodSandboxStatus, PodShim, SandboxConfig, SandboxMetadata, reasons,
};
