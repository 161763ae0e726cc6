//! Error types for stevedore-core.

use thiserror::Error;

use crate::executor::Report;

/// Errors that can occur while scanning, layering or building images.
#[derive(Debug, Error)]
pub enum BuildError {
  /// Two images in the configuration canonicalize to the same name.
  #[error("image [{0}] is declared more than once")]
  DuplicateImage(String),

  /// An image's Dockerfile is missing or unreadable.
  #[error("failed to read Dockerfile for [{name}]: {source}")]
  BuildFileUnreadable {
    name: String,
    #[source]
    source: std::io::Error,
  },

  /// A Dockerfile contains no FROM directive at all. A valid Dockerfile
  /// always names at least one base image, so this usually means the wrong
  /// file was passed in.
  #[error("no base image references found in Dockerfile for [{name}]")]
  NoDependenciesFound { name: String },

  /// The dependency graph contains a cycle, or references an internal
  /// image that could not be placed into a layer.
  #[error("unable to sort the dependency graph")]
  GraphNotSortable,

  /// A folder spec has more than two `:`-separated components.
  #[error("wrong folder format: [{0}]")]
  FolderSpec(String),

  /// A declared folder source is missing or is not a directory.
  #[error("[{0}] is not a directory")]
  NotADirectory(String),

  /// I/O error outside of a per-image build.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The build configuration file could not be deserialized.
  #[error("configuration error: {0}")]
  Yaml(#[from] serde_yaml::Error),

  /// A worker task went away while jobs were still outstanding.
  #[error("build worker terminated unexpectedly")]
  WorkerLost,

  /// At least one image in a completed layer failed. Reports for every
  /// build attempted before the stop are retained, successes included.
  #[error("at least {failed} out of {total} jobs failed")]
  LayerFailed {
    failed: usize,
    total: usize,
    reports: Vec<Report>,
  },
}
