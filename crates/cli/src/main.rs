use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use stevedore_core::{
    BuildBackend, BuildConfiguration, Image, LogSink, build_execution_plan, build_images,
    ensure_directories,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// stevedore - builds interdependent Docker images in topological order
#[derive(Parser)]
#[command(name = "stevedore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the build configuration file
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Directory holding a single Dockerfile (alternative to --file)
    #[arg(long, requires = "name")]
    dockerfile: Option<PathBuf>,

    /// Image name, required with --dockerfile
    #[arg(long)]
    name: Option<String>,

    /// Comma-separated folders to include in the build context
    #[arg(long)]
    folders: Option<String>,

    /// Compute and print the layered build plan without building
    #[arg(short = 'd', long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_configuration(&cli)?;
    info!(
        images = config.job_count(),
        threads = config.threads,
        "loaded build configuration"
    );

    if cli.dry_run {
        let plan = build_execution_plan(&config)?;
        print!("{plan}");
        return Ok(());
    }

    info!("starting image builds");
    let reports = build_images(&config, &BuildBackend::default(), &LogSink::stdout()).await?;
    println!("Successfully built {} images", reports.len());
    Ok(())
}

fn load_configuration(cli: &Cli) -> Result<BuildConfiguration> {
    if let Some(file) = &cli.file {
        validate_config_path(file)?;
        Ok(BuildConfiguration::from_file(file)?)
    } else if let Some(dockerfile) = &cli.dockerfile {
        // clap enforces --name via `requires`, but keep the check explicit.
        let Some(name) = cli.name.clone() else {
            bail!("--name must be specified");
        };

        let folders: Vec<String> = match &cli.folders {
            Some(list) => list.split(',').map(str::to_string).collect(),
            None => vec![],
        };
        if !folders.is_empty() {
            ensure_directories(&folders)?;
        }

        // Single-Dockerfile mode: synthesize a one-image configuration.
        Ok(BuildConfiguration {
            images: vec![Image {
                container_name: name,
                dockerpath: dockerfile.clone(),
                folders,
                no_cache: false,
            }],
            threads: 0,
        })
    } else {
        bail!("neither --file nor --dockerfile was specified");
    }
}

fn validate_config_path(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("cannot read build configuration [{}]", path.display()))?;
    if metadata.is_dir() {
        bail!("build configuration must be a file, but got a directory instead");
    }
    Ok(())
}
