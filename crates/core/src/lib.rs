//! stevedore-core: dependency-aware container image building.
//!
//! This crate discovers the dependency graph between a configuration's
//! images by scanning their Dockerfiles, arranges them into topological
//! layers, and builds each layer with bounded parallelism against an
//! external build backend.

mod config;
mod error;
mod executor;
mod graph;
mod scanner;
mod schedule;
mod sink;

#[cfg(test)]
mod testutil;

pub use config::{BuildConfiguration, FolderSpec, Image};
pub use error::BuildError;
pub use executor::{BuildBackend, Report, build_image, ensure_directories};
pub use graph::{DependencyMaps, ExecutionPlan, build_execution_plan, scan_dependencies};
pub use scanner::scan_dockerfile;
pub use schedule::build_images;
pub use sink::LogSink;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, BuildError>;
