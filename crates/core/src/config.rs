//! Build configuration model.
//!
//! A configuration declares a list of images to build plus a parallelism
//! hint. Images are identified by their canonical name (`name:tag`, tag
//! defaulting to `latest`), which is the key used by all dependency maps.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::BuildError;

/// One image declaration from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
  /// Name the built image is tagged with, optionally carrying a tag.
  #[serde(rename = "containerName")]
  pub container_name: String,

  /// Directory holding the image's Dockerfile, used as the build context.
  pub dockerpath: PathBuf,

  /// Extra folders staged into the build context, as `source[:target]` specs.
  #[serde(default)]
  pub folders: Vec<String>,

  /// Disable layer caching for this image.
  #[serde(default, rename = "noCache")]
  pub no_cache: bool,
}

impl Image {
  /// The name used for map keys and for tagging the built image.
  /// A declaration without an explicit tag is pinned to `latest`.
  pub fn canonical_name(&self) -> String {
    if self.container_name.contains(':') {
      self.container_name.clone()
    } else {
      format!("{}:latest", self.container_name)
    }
  }

  /// Read this image's Dockerfile as text.
  pub fn dockerfile(&self) -> Result<String> {
    let path = self.dockerpath.join("Dockerfile");
    fs::read_to_string(&path).map_err(|source| BuildError::BuildFileUnreadable {
      name: self.canonical_name(),
      source,
    })
  }
}

/// A `source[:target]` pair describing one staged folder.
///
/// When no target is given, the last path component of the source becomes
/// the target directory name inside the build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSpec {
  pub source: PathBuf,
  pub target: String,
}

impl FolderSpec {
  pub fn parse(spec: &str) -> Result<Self> {
    let parts: Vec<&str> = spec.split(':').collect();
    match parts.as_slice() {
      [source, target] => Ok(Self {
        source: PathBuf::from(source),
        target: (*target).to_string(),
      }),
      [source] => {
        let target = Path::new(source)
          .file_name()
          .and_then(|name| name.to_str())
          .ok_or_else(|| BuildError::FolderSpec(spec.to_string()))?;
        Ok(Self {
          source: PathBuf::from(source),
          target: target.to_string(),
        })
      }
      _ => Err(BuildError::FolderSpec(spec.to_string())),
    }
  }
}

/// The full build configuration: images plus a worker-count hint.
///
/// Loaded once and read-only afterwards. Images are kept sorted by
/// canonical name so that scanning and layering are deterministic for a
/// fixed configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfiguration {
  pub images: Vec<Image>,

  /// Worker-pool size. Zero means "use the host's available parallelism".
  #[serde(default)]
  pub threads: usize,
}

impl BuildConfiguration {
  /// Deserialize a configuration from YAML text.
  pub fn from_yaml(text: &str) -> Result<Self> {
    let mut config: Self = serde_yaml::from_str(text)?;
    config.sort_images();
    Ok(config)
  }

  /// Deserialize a configuration from a YAML file.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let text = fs::read_to_string(path)?;
    Self::from_yaml(&text)
  }

  /// Number of images to build.
  pub fn job_count(&self) -> usize {
    self.images.len()
  }

  fn sort_images(&mut self) {
    self.images.sort_by_key(Image::canonical_name);
  }

  /// Index of declared images by canonical name.
  ///
  /// Fails if two declarations collapse to the same canonical name,
  /// regardless of their build-context paths.
  pub fn names_map(&self) -> Result<BTreeMap<String, Image>> {
    let mut map = BTreeMap::new();
    for image in &self.images {
      let name = image.canonical_name();
      if map.insert(name.clone(), image.clone()).is_some() {
        return Err(BuildError::DuplicateImage(name));
      }
    }
    Ok(map)
  }

  /// Canonical image names in sorted order.
  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.images.iter().map(Image::canonical_name).collect();
    names.sort();
    names
  }
}
