//! Layered build scheduler.
//!
//! A fixed pool of worker tasks is created once per invocation, each with
//! its own job channel; a single shared result channel collects reports.
//! Layers are dispatched one at a time and fully drained before the next
//! one starts, so layer N always observes layer N−1 as materialized in the
//! backend's image store.

use std::thread;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::Result;
use crate::config::BuildConfiguration;
use crate::error::BuildError;
use crate::executor::{BuildBackend, Report, build_image};
use crate::graph::{ExecutionPlan, build_execution_plan};
use crate::sink::LogSink;

/// Scan, layer and build every image in the configuration.
///
/// Succeeds only if every image across every layer built successfully; any
/// failure within a layer halts all later layers and surfaces as
/// [`BuildError::LayerFailed`] carrying every report gathered so far.
pub async fn build_images(
  config: &BuildConfiguration,
  backend: &BuildBackend,
  sink: &LogSink,
) -> Result<Vec<Report>> {
  let plan = build_execution_plan(config)?;
  run_plan(&plan, worker_count(config.threads), backend, sink).await
}

/// Pool size: the configured thread count, falling back to the host's
/// available parallelism when unset.
fn worker_count(threads: usize) -> usize {
  if threads >= 1 {
    threads
  } else {
    thread::available_parallelism().map(|count| count.get()).unwrap_or(1)
  }
}

async fn run_plan(
  plan: &ExecutionPlan,
  workers: usize,
  backend: &BuildBackend,
  sink: &LogSink,
) -> Result<Vec<Report>> {
  let total = plan.job_count();

  // Buffered to the job count so workers never block reporting.
  let (report_tx, mut report_rx) = mpsc::channel::<Report>(total.max(1));

  let mut job_queues = Vec::with_capacity(workers);
  for _ in 0..workers {
    let (job_tx, mut job_rx) = mpsc::channel(1);
    let reports = report_tx.clone();
    let backend = backend.clone();
    let sink = sink.clone();

    // Worker: one image at a time until the scheduler hangs up.
    tokio::spawn(async move {
      while let Some(image) = job_rx.recv().await {
        let report = build_image(&image, &backend, &sink).await;
        if reports.send(report).await.is_err() {
          break;
        }
      }
    });
    job_queues.push(job_tx);
  }
  drop(report_tx);

  let mut reports = Vec::with_capacity(total);
  let mut failed = 0usize;
  let mut dispatch_counter = 0usize;

  for (index, layer) in plan.layers().iter().enumerate() {
    info!(layer = index, images = layer.len(), "dispatching layer");

    let mut dispatched = 0usize;
    for image in layer {
      let queue = &job_queues[dispatch_counter % workers];
      if queue.send(image.clone()).await.is_err() {
        return Err(BuildError::WorkerLost);
      }
      dispatch_counter += 1;
      dispatched += 1;
    }

    // Hard barrier: drain exactly as many reports as were dispatched
    // before considering the next layer.
    for _ in 0..dispatched {
      let Some(report) = report_rx.recv().await else {
        return Err(BuildError::WorkerLost);
      };
      if !report.success {
        warn!(image = %report.container_name, error = ?report.error, "build failed");
        failed += 1;
      }
      reports.push(report);
    }

    if failed > 0 {
      // Later layers never run; reports from this and earlier layers are
      // kept, successes included.
      return Err(BuildError::LayerFailed {
        failed,
        total,
        reports,
      });
    }
  }

  Ok(reports)
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;
  use crate::testutil::{write_image, write_script};

  fn config(images: Vec<crate::config::Image>, threads: usize) -> BuildConfiguration {
    let mut config = BuildConfiguration { images, threads };
    config.images.sort_by_key(|image| image.canonical_name());
    config
  }

  #[test]
  fn worker_count_is_clamped_to_at_least_one() {
    assert_eq!(worker_count(3), 3);
    assert!(worker_count(0) >= 1);
  }

  #[tokio::test]
  async fn independent_images_build_in_one_layer() {
    let root = TempDir::new().unwrap();
    let backend = BuildBackend {
      program: write_script(root.path(), "backend", "exit 0"),
    };
    let config = config(
      vec![
        write_image(root.path(), "image1", &["ubuntu:20.04"]),
        write_image(root.path(), "image2", &["alpine"]),
        write_image(root.path(), "image3", &["nginx"]),
      ],
      2,
    );

    let reports = build_images(&config, &backend, &LogSink::stdout()).await.unwrap();

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|report| report.success));
  }

  #[tokio::test]
  async fn failing_layer_halts_later_layers_but_keeps_sibling_reports() {
    let root = TempDir::new().unwrap();
    // image1 fails, its layer sibling image3 succeeds, image2 (depending
    // on image1) must never be dispatched.
    let backend = BuildBackend {
      program: write_script(
        root.path(),
        "backend",
        "if [ \"$3\" = \"image1:latest\" ]; then exit 1; fi\nexit 0",
      ),
    };
    let config = config(
      vec![
        write_image(root.path(), "image1", &["ubuntu:20.04"]),
        write_image(root.path(), "image2", &["image1"]),
        write_image(root.path(), "image3", &["nginx"]),
      ],
      2,
    );

    let err = build_images(&config, &backend, &LogSink::stdout()).await.unwrap_err();

    let BuildError::LayerFailed {
      failed,
      total,
      reports,
    } = err
    else {
      panic!("expected LayerFailed, got {err:?}");
    };
    assert_eq!(failed, 1);
    assert_eq!(total, 3);

    // Both layer-0 reports are present, image2 never ran.
    assert_eq!(reports.len(), 2);
    let image1 = reports.iter().find(|r| r.container_name == "image1:latest").unwrap();
    let image3 = reports.iter().find(|r| r.container_name == "image3:latest").unwrap();
    assert!(!image1.success);
    assert!(image3.success);
    assert!(!reports.iter().any(|r| r.container_name == "image2:latest"));
  }

  #[tokio::test]
  async fn dependent_layers_build_in_order_with_a_single_worker() {
    let root = TempDir::new().unwrap();
    // Record build order through a shared file; a single worker also
    // exercises the round-robin dispatch with modulus one.
    let order_file = root.path().join("order");
    let backend = BuildBackend {
      program: write_script(
        root.path(),
        "backend",
        &format!("echo \"$3\" >> {}\nexit 0", order_file.display()),
      ),
    };
    let config = config(
      vec![
        write_image(root.path(), "base", &["ubuntu:20.04"]),
        write_image(root.path(), "middle", &["base"]),
        write_image(root.path(), "top", &["middle:latest"]),
      ],
      1,
    );

    let reports = build_images(&config, &backend, &LogSink::stdout()).await.unwrap();
    assert_eq!(reports.len(), 3);

    let order = std::fs::read_to_string(&order_file).unwrap();
    let built: Vec<&str> = order.lines().collect();
    assert_eq!(built, vec!["base:latest", "middle:latest", "top:latest"]);
  }

  #[tokio::test]
  async fn structural_errors_abort_before_any_build() {
    let root = TempDir::new().unwrap();
    let marker = root.path().join("ran");
    let backend = BuildBackend {
      program: write_script(root.path(), "backend", &format!("touch {}\nexit 0", marker.display())),
    };
    let config = config(
      vec![
        write_image(root.path(), "image1", &["image2"]),
        write_image(root.path(), "image2", &["image1"]),
      ],
      1,
    );

    let err = build_images(&config, &backend, &LogSink::stdout()).await.unwrap_err();
    assert!(matches!(err, BuildError::GraphNotSortable));
    assert!(!marker.exists(), "no build may run when layering fails");
  }
}
