//! CLI glue for gcs-deploy: argument parsing, config loading and the async `run` entrypoint.
//!
//! All pipeline logic lives in [`crate::deploy`]; this module only maps command-line input onto
//! a [`DeployPlugin`] and a [`Compilation`], and reports the outcome.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::deploy::{BuildOutput, Compilation, DeployPlugin};
use crate::load_config::load_config;

/// CLI for gcs-deploy: publish build artifacts to a Google Cloud Storage bucket.
#[derive(Parser)]
#[clap(
    name = "gcs-deploy",
    version,
    about = "Upload build output to a Google Cloud Storage bucket with filtering, CDN rewriting and priority ordering"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload the build output using the given config file
    Deploy {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Output directory to upload (overrides `directory` from the config)
        #[clap(long)]
        directory: Option<PathBuf>,
        /// Build manifest JSON (`outputPath` + `assets`) to upload instead of a directory
        #[clap(long, conflicts_with = "directory")]
        manifest: Option<PathBuf>,
        /// Target bucket (overrides the config)
        #[clap(long)]
        bucket: Option<String>,
        /// Storage key prefix (overrides the config)
        #[clap(long)]
        base_path: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AssetRef {
    Name(String),
    Object { name: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestFile {
    output_path: PathBuf,
    assets: Vec<AssetRef>,
}

/// Reads a build manifest in the `{ "outputPath": ..., "assets": [...] }` shape.
pub fn load_manifest(path: &Path) -> Result<BuildOutput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {:?}", path))?;
    let manifest: ManifestFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest JSON {:?}", path))?;
    tracing::info!(
        assets = manifest.assets.len(),
        output_path = %manifest.output_path.display(),
        "Loaded build manifest"
    );
    Ok(BuildOutput::Manifest {
        assets: manifest
            .assets
            .into_iter()
            .map(|asset| match asset {
                AssetRef::Name(name) | AssetRef::Object { name } => name,
            })
            .collect(),
        output_path: manifest.output_path,
    })
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Deploy {
            config,
            directory,
            manifest,
            bucket,
            base_path,
        } => {
            let mut options = load_config(config)?;
            if let Some(bucket) = bucket {
                options.bucket = Some(bucket);
            }
            if let Some(base_path) = base_path {
                options.base_path = base_path;
            }
            if let Some(directory) = directory {
                options.directory = Some(directory);
            }

            let output = match &manifest {
                Some(path) => load_manifest(path)?,
                None => BuildOutput::Directory(
                    options
                        .directory
                        .clone()
                        .unwrap_or_else(|| PathBuf::from(".")),
                ),
            };
            // A manifest describes the build output on its own.
            if manifest.is_some() {
                options.directory = None;
            }

            tracing::info!(command = "deploy", "Starting deploy");
            println!("Deploy starting...");
            let plugin = DeployPlugin::new(options)?;
            let mut compilation = Compilation::new(output);

            match plugin.apply(&mut compilation).await {
                Ok(report) => {
                    tracing::info!(command = "deploy", ?report, "Deploy complete");
                    println!(
                        "Deploy complete: {} file(s) uploaded under {:?} in {} wave(s).",
                        report.uploaded.len(),
                        report.base_path,
                        report.waves
                    );
                    Ok(())
                }
                Err(e) => {
                    for build_error in &compilation.errors {
                        eprintln!("[ERROR] {build_error}");
                    }
                    tracing::error!(command = "deploy", error = %e, "Deploy failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}
