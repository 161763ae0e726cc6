//! Dependency graph construction and topological layering.
//!
//! The graph builder reads every declared image's Dockerfile and splits its
//! base-image references into external dependencies (images that must
//! already exist) and internal ones (images built by this very
//! configuration). The layering engine then groups images into ordered
//! layers: everything in layer L only depends on layers strictly before L,
//! so a whole layer can be built in parallel.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::Result;
use crate::config::{BuildConfiguration, Image};
use crate::error::BuildError;
use crate::scanner::scan_dockerfile;

/// Forward and backward dependency maps, keyed by canonical image name.
///
/// All three maps carry an entry (possibly empty) for every declared
/// image, so consumers never need existence checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyMaps {
  /// Base images not built by this configuration.
  pub external: BTreeMap<String, Vec<String>>,
  /// Base images that are themselves declared in this configuration.
  pub internal: BTreeMap<String, Vec<String>>,
  /// Reverse of `internal`: the declared images depending on this one.
  pub dependents: BTreeMap<String, Vec<String>>,
}

/// Read and scan every image's Dockerfile and classify its references.
///
/// Images are processed in canonical-name order. Fails on duplicate image
/// names, unreadable Dockerfiles, or a Dockerfile without any `FROM`
/// directive; no partial maps are returned.
pub fn scan_dependencies(config: &BuildConfiguration) -> Result<DependencyMaps> {
  let names_map = config.names_map()?;

  let mut maps = DependencyMaps::default();
  for name in names_map.keys() {
    maps.external.insert(name.clone(), vec![]);
    maps.internal.insert(name.clone(), vec![]);
    maps.dependents.insert(name.clone(), vec![]);
  }

  for (name, image) in &names_map {
    let dockerfile = image.dockerfile()?;
    let deps = scan_dockerfile(name, &dockerfile)?;
    debug!(image = %name, ?deps, "scanned Dockerfile");

    for dep in deps {
      if names_map.contains_key(&dep) {
        maps.dependents.entry(dep.clone()).or_default().push(name.clone());
        maps.internal.entry(name.clone()).or_default().push(dep);
      } else {
        maps.external.entry(name.clone()).or_default().push(dep);
      }
    }
  }

  Ok(maps)
}

/// Ordered build layers: layer L may only start once every layer before it
/// has completed.
///
/// Layers are tight: each image sits in the earliest layer at which all of
/// its internal dependencies are satisfied. Within a layer, images keep
/// the canonical-name sort order, so dispatch is deterministic for a fixed
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
  layers: Vec<Vec<Image>>,
}

impl ExecutionPlan {
  pub fn layers(&self) -> &[Vec<Image>] {
    &self.layers
  }

  pub fn layer_count(&self) -> usize {
    self.layers.len()
  }

  /// Total number of images across all layers.
  pub fn job_count(&self) -> usize {
    self.layers.iter().map(Vec::len).sum()
  }
}

impl fmt::Display for ExecutionPlan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (index, layer) in self.layers.iter().enumerate() {
      let names: Vec<String> = layer.iter().map(Image::canonical_name).collect();
      writeln!(f, "layer {}: {}", index, names.join(", "))?;
    }
    Ok(())
  }
}

/// Compute the execution plan for a configuration without building anything.
///
/// Kahn-style wave leveling over the internal dependency graph: wave 0 is
/// every image without internal dependencies, and each later image lands
/// one past its deepest dependency's layer. If not every image can be
/// placed the graph has a cycle, and no partial plan is returned.
pub fn build_execution_plan(config: &BuildConfiguration) -> Result<ExecutionPlan> {
  let names_map = config.names_map()?;
  let maps = scan_dependencies(config)?;

  let mut graph = DiGraph::<String, ()>::new();
  let mut nodes: BTreeMap<&str, NodeIndex> = BTreeMap::new();

  // Nodes are added in canonical-name order, so ascending node indices
  // reproduce the configuration's sort order inside each layer.
  for name in names_map.keys() {
    nodes.insert(name.as_str(), graph.add_node(name.clone()));
  }

  for (name, deps) in &maps.internal {
    for dep in deps {
      // Edge from dependency to dependent.
      graph.add_edge(nodes[dep.as_str()], nodes[name.as_str()], ());
    }
  }

  let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
  for idx in graph.node_indices() {
    in_degree.insert(idx, graph.neighbors_directed(idx, Direction::Incoming).count());
  }

  let mut remaining: HashSet<NodeIndex> = graph.node_indices().collect();
  let mut layers: Vec<Vec<Image>> = Vec::new();

  while !remaining.is_empty() {
    let mut ready: Vec<NodeIndex> = remaining
      .iter()
      .filter(|&&idx| in_degree[&idx] == 0)
      .copied()
      .collect();

    if ready.is_empty() {
      // Every remaining image still waits on another remaining image.
      return Err(BuildError::GraphNotSortable);
    }

    ready.sort();

    let mut layer = Vec::with_capacity(ready.len());
    for &idx in &ready {
      remaining.remove(&idx);
      for neighbor in graph.neighbors_directed(idx, Direction::Outgoing) {
        if let Some(degree) = in_degree.get_mut(&neighbor) {
          *degree = degree.saturating_sub(1);
        }
      }
      layer.push(names_map[&graph[idx]].clone());
    }

    layers.push(layer);
  }

  let plan = ExecutionPlan { layers };
  debug!(layers = plan.layer_count(), jobs = plan.job_count(), "computed execution plan");
  Ok(plan)
}
