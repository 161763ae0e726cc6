//! Shared helpers for the crate's tests.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::Image;

/// Create `<root>/<name>/Dockerfile` with one FROM line per base and
/// return the matching image declaration.
pub(crate) fn write_image(root: &Path, name: &str, bases: &[&str]) -> Image {
  let dir = root.join(name);
  fs::create_dir_all(&dir).unwrap();

  let mut dockerfile = String::new();
  for base in bases {
    dockerfile.push_str(&format!("FROM {base}\n"));
  }
  dockerfile.push_str("RUN true\n");
  fs::write(dir.join("Dockerfile"), dockerfile).unwrap();

  Image {
    container_name: name.to_string(),
    dockerpath: dir,
    folders: vec![],
    no_cache: false,
  }
}

/// Write an executable shell script standing in for the build backend.
///
/// The script sees the regular invocation arguments: `build [--no-cache]
/// -t <name> <context>`.
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
  fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// Writer appending to a shared buffer, for sink assertions.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl SharedBuffer {
  pub(crate) fn contents(&self) -> String {
    String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
  }
}
