//! Build executor: stages the build context and invokes the external
//! build backend for a single image.
//!
//! Backend stdout and stderr are streamed to the sink line by line while
//! the build runs, so progress stays visible and memory use stays bounded
//! for long builds.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::Result;
use crate::config::{FolderSpec, Image};
use crate::error::BuildError;
use crate::sink::LogSink;

/// The external build backend.
///
/// Invocation shape: `<program> build [--no-cache] -t <canonical-name>
/// <context-path>`. Defaults to `docker`; tests substitute a script.
#[derive(Debug, Clone)]
pub struct BuildBackend {
  pub program: PathBuf,
}

impl Default for BuildBackend {
  fn default() -> Self {
    Self {
      program: PathBuf::from("docker"),
    }
  }
}

/// Outcome of one attempted image build.
///
/// Produced exactly once per attempt and never mutated afterwards. Build
/// output is streamed to the sink rather than buffered, so `log` only
/// carries the failure diagnostic.
#[derive(Debug, Clone)]
pub struct Report {
  pub container_name: String,
  pub log: String,
  pub error: Option<String>,
  pub success: bool,
}

impl Report {
  fn succeeded(container_name: String) -> Self {
    Self {
      container_name,
      log: String::new(),
      error: None,
      success: true,
    }
  }

  fn failed(container_name: String, message: String) -> Self {
    Self {
      container_name,
      log: message.clone(),
      error: Some(message),
      success: false,
    }
  }
}

/// Check that every given path exists and is a directory.
pub fn ensure_directories<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
  for path in paths {
    let path = path.as_ref();
    let metadata = fs::metadata(path)?;
    if !metadata.is_dir() {
      return Err(BuildError::NotADirectory(path.display().to_string()));
    }
  }
  Ok(())
}

/// Recursively copy a directory tree.
///
/// Symlinks are recreated as links rather than copied through; a link to a
/// directory has no file content to copy.
fn copy_tree(source: &Path, target: &Path) -> Result<()> {
  for entry in WalkDir::new(source) {
    let entry = entry.map_err(io::Error::from)?;
    let relative = entry
      .path()
      .strip_prefix(source)
      .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let destination = target.join(relative);

    let file_type = entry.file_type();
    if file_type.is_dir() {
      fs::create_dir_all(&destination)?;
    } else if file_type.is_symlink() {
      let link_target = fs::read_link(entry.path())?;
      symlink(&link_target, &destination)?;
    } else {
      fs::copy(entry.path(), &destination)?;
    }
  }
  Ok(())
}

/// Copy an image's declared folders plus its own Dockerfile-bearing
/// directory into `root`.
pub(crate) fn stage_context(root: &Path, image: &Image) -> Result<()> {
  for spec in &image.folders {
    let folder = FolderSpec::parse(spec)?;
    copy_tree(&folder.source, &root.join(&folder.target))?;
  }

  // The build-context directory itself lands under its own last path
  // component, next to the staged folders.
  let target = image
    .dockerpath
    .file_name()
    .and_then(|name| name.to_str())
    .ok_or_else(|| BuildError::FolderSpec(image.dockerpath.display().to_string()))?;
  copy_tree(&image.dockerpath, &root.join(target))
}

fn stage(image: &Image) -> Result<TempDir> {
  let staged = tempfile::Builder::new().suffix("-build").tempdir()?;
  stage_context(staged.path(), image)?;
  debug!(image = %image.canonical_name(), path = %staged.path().display(), "staged build context");
  Ok(staged)
}

/// Build one image, producing exactly one report.
///
/// A staging failure yields a failed report without invoking the backend.
/// A non-zero backend exit or a spawn error also yields a failed report;
/// structural problems never originate here.
pub async fn build_image(image: &Image, backend: &BuildBackend, sink: &LogSink) -> Report {
  let name = image.canonical_name();

  let mut staged = None;
  let context = if image.folders.is_empty() {
    image.dockerpath.clone()
  } else {
    match stage(image) {
      Ok(dir) => {
        let path = dir.path().to_path_buf();
        staged = Some(dir);
        path
      }
      Err(err) => return Report::failed(name, format!("staging failed: {err}")),
    }
  };

  let report = invoke_backend(name, image, backend, &context, sink).await;

  // The staged context is only removed once the backend has finished.
  drop(staged);
  report
}

async fn invoke_backend(
  name: String,
  image: &Image,
  backend: &BuildBackend,
  context: &Path,
  sink: &LogSink,
) -> Report {
  let mut command = Command::new(&backend.program);
  command.arg("build");
  if image.no_cache {
    command.arg("--no-cache");
  }
  command
    .arg("-t")
    .arg(&name)
    .arg(context)
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  info!(image = %name, context = %context.display(), "invoking build backend");

  let mut child = match command.spawn() {
    Ok(child) => child,
    Err(err) => return Report::failed(name, format!("failed to spawn build backend: {err}")),
  };

  let stdout = child.stdout.take().map(|pipe| {
    let sink = sink.clone();
    tokio::spawn(stream_lines(pipe, sink))
  });
  let stderr = child.stderr.take().map(|pipe| {
    let sink = sink.clone();
    tokio::spawn(stream_lines(pipe, sink))
  });

  let status = child.wait().await;

  // Both pipes hit EOF once the child is gone; wait for the tail lines.
  if let Some(task) = stdout {
    let _ = task.await;
  }
  if let Some(task) = stderr {
    let _ = task.await;
  }

  match status {
    Ok(status) if status.success() => Report::succeeded(name),
    Ok(status) => Report::failed(name, format!("build backend exited with {status}")),
    Err(err) => Report::failed(name, format!("build backend failed: {err}")),
  }
}

async fn stream_lines(pipe: impl AsyncRead + Unpin, sink: LogSink) {
  let mut lines = BufReader::new(pipe).lines();
  while let Ok(Some(line)) = lines.next_line().await {
    sink.line(&line);
  }
}
