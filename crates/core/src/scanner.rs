//! Dockerfile dependency scanner.
//!
//! Extracts base-image references from a Dockerfile, in document order.
//! Only the `FROM` directive matters here; everything else in the file is
//! opaque to the orchestrator.

use crate::Result;
use crate::error::BuildError;

/// Extract the base-image references a Dockerfile declares.
///
/// Matching is case-insensitive and in document order. References without
/// an explicit tag are normalized to `:latest`. Multi-stage files
/// contribute one reference per `FROM` directive; duplicates are preserved
/// and left to the caller's map structures to collapse.
///
/// An empty result is an error: a valid Dockerfile always names at least
/// one base image, so finding none means the file probably is not a
/// Dockerfile at all.
pub fn scan_dockerfile(name: &str, content: &str) -> Result<Vec<String>> {
  let mut deps = Vec::new();

  for line in content.lines() {
    let Some(reference) = from_reference(line) else {
      continue;
    };
    deps.push(canonicalize(reference));
  }

  if deps.is_empty() {
    return Err(BuildError::NoDependenciesFound {
      name: name.to_string(),
    });
  }

  Ok(deps)
}

/// The base-image reference on a `FROM` line, or `None` for any other line.
fn from_reference(line: &str) -> Option<&str> {
  let trimmed = line.trim_start();
  let (directive, rest) = trimmed.split_at_checked(4)?;
  if !directive.eq_ignore_ascii_case("from") {
    return None;
  }
  // Require a separator so e.g. a FROMAGE instruction does not match.
  if !rest.starts_with(|c: char| c.is_ascii_whitespace()) {
    return None;
  }
  rest.split_ascii_whitespace().next()
}

fn canonicalize(reference: &str) -> String {
  if reference.contains(':') {
    reference.to_string()
  } else {
    format!("{reference}:latest")
  }
}
