//! Lifecycle translation between pod/container requests and engine records.

mod container;
mod core;
mod list;
pub mod options;
mod sandbox;
pub mod types;

pub use container::reasons;
pub use self::core::PodShim;
pub use options::ShimOptions;
pub use types::*;
