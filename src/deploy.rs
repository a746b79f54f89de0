//! Post-build deploy pipeline: discover → rewrite → filter → schedule → upload.
//!
//! [`DeployPlugin`] is the build-hook boundary. The build tool hands it a [`Compilation`] once the
//! build is done; the plugin uploads the artifacts and records any failure in
//! [`Compilation::errors`], the build tool's error collection.
//!
//! # Responsibilities
//! - Selects directory mode or manifest mode for file discovery
//! - Resolves the base path exactly once per run, before the first upload
//! - Owns the storage client, created lazily on first use and reused afterwards
//! - Fails fast: the first error of any stage ends the run, nothing is rolled back
//!
//! # Navigation
//! - Entrypoint: [`DeployPlugin::apply`]
//! - Output: [`DeployReport`]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::catalog::{self, FileEntry};
use crate::config::DeployOptions;
use crate::error::{DeployError, Result};
use crate::filter::Filter;
use crate::path_util::{normalize_local_path, normalize_storage_key};
use crate::rewrite::ContentRewriter;
use crate::schedule::UploadScheduler;
use crate::storage::{Credentials, GcsStorage, ObjectStorage};
use crate::upload::ObjectUploader;

pub const PLUGIN_NAME: &str = "GcsPlugin";

/// Options that must be present before anything is uploaded.
pub const REQUIRED_OPTIONS: &[&str] = &["bucket"];

type Connector = dyn Fn(&Credentials) -> Result<Arc<dyn ObjectStorage>> + Send + Sync;

/// What the build tool produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutput {
    /// Artifacts were written below this directory.
    Directory(PathBuf),
    /// Emitted asset names, to be found below `output_path`.
    Manifest {
        assets: Vec<String>,
        output_path: PathBuf,
    },
}

/// The finished build, as seen by the plugin.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub output: BuildOutput,
    pub errors: Vec<String>,
}

impl Compilation {
    pub fn new(output: BuildOutput) -> Self {
        Self {
            output,
            errors: Vec::new(),
        }
    }
}

/// Where the candidate files of a run come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Directory(PathBuf),
    Manifest {
        assets: Vec<String>,
        output_path: PathBuf,
    },
}

impl FileSource {
    /// An explicit `directory` option wins; otherwise the build's own output decides.
    pub fn resolve(directory: Option<&Path>, output: &BuildOutput) -> Self {
        match (directory, output) {
            (Some(dir), _) => FileSource::Directory(dir.to_path_buf()),
            (None, BuildOutput::Directory(dir)) => FileSource::Directory(dir.clone()),
            (None, BuildOutput::Manifest { assets, output_path }) => FileSource::Manifest {
                assets: assets.clone(),
                output_path: output_path.clone(),
            },
        }
    }

    /// Directory that extra HTML files are resolved against.
    pub fn root(&self) -> &Path {
        match self {
            FileSource::Directory(dir) => dir,
            FileSource::Manifest { output_path, .. } => output_path,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub base_path: String,
    pub uploaded: Vec<String>,
    pub waves: usize,
}

pub struct DeployPlugin {
    options: DeployOptions,
    rewriter: ContentRewriter,
    filter: Filter,
    client: OnceCell<Arc<dyn ObjectStorage>>,
    connector: Arc<Connector>,
}

impl DeployPlugin {
    /// Builds a plugin that talks to Google Cloud Storage.
    pub fn new(options: DeployOptions) -> Result<Self> {
        Self::build(options, OnceCell::new())
    }

    /// Builds a plugin around an already connected storage client.
    pub fn with_storage(options: DeployOptions, client: Arc<dyn ObjectStorage>) -> Result<Self> {
        Self::build(options, OnceCell::new_with(Some(client)))
    }

    fn build(mut options: DeployOptions, client: OnceCell<Arc<dyn ObjectStorage>>) -> Result<Self> {
        if let Some(cdn) = &options.cdn {
            cdn.validate()?;
        }
        options.base_path = normalize_storage_key(&options.base_path);

        let rewriter = ContentRewriter::new(options.cdn.clone());
        let filter = Filter::new(options.include.clone(), options.exclude.clone());
        let connector: Arc<Connector> = Arc::new(|credentials: &Credentials| {
            Ok(Arc::new(GcsStorage::connect(credentials.clone())) as Arc<dyn ObjectStorage>)
        });

        Ok(Self {
            options,
            rewriter,
            filter,
            client,
            connector,
        })
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    fn missing_options(&self) -> Vec<&'static str> {
        REQUIRED_OPTIONS
            .iter()
            .copied()
            .filter(|opt| match *opt {
                "bucket" => self.options.bucket.as_deref().map_or(true, str::is_empty),
                _ => false,
            })
            .collect()
    }

    /// Storage client of this plugin instance, connected on first call.
    pub async fn client(&self) -> Result<Arc<dyn ObjectStorage>> {
        self.client
            .get_or_try_init(|| async { (self.connector)(&self.options.credentials) })
            .await
            .cloned()
    }

    /// Hook called once the build is done.
    ///
    /// Every failure is pushed onto `compilation.errors` as one line and also returned.
    pub async fn apply(&self, compilation: &mut Compilation) -> Result<DeployReport> {
        let missing = self.missing_options();
        if !missing.is_empty() {
            let message = format!("{PLUGIN_NAME}-RequiredGcsOpts: {}", REQUIRED_OPTIONS.join(", "));
            error!(missing = ?missing, "[DEPLOY][ERROR] Required options missing");
            compilation.errors.push(message.clone());
            return Err(DeployError::configuration(message));
        }

        let source = FileSource::resolve(self.options.directory.as_deref(), &compilation.output);
        info!(source = ?source, "[DEPLOY] Starting deploy");

        match self.run(&source).await {
            Ok(report) => {
                info!(
                    uploaded = report.uploaded.len(),
                    waves = report.waves,
                    base_path = %report.base_path,
                    "[DEPLOY] Deploy complete"
                );
                Ok(report)
            }
            Err(e) => self.handle_errors(e, compilation),
        }
    }

    fn handle_errors(&self, e: DeployError, compilation: &mut Compilation) -> Result<DeployReport> {
        error!(error = %e, "[DEPLOY][ERROR] Deploy failed");
        compilation.errors.push(format!("{PLUGIN_NAME}: {e}"));
        Err(e)
    }

    async fn run(&self, source: &FileSource) -> Result<DeployReport> {
        let files = match source {
            FileSource::Directory(dir) => {
                let root = PathBuf::from(normalize_local_path(&dir.to_string_lossy()));
                catalog::from_directory(&root).await?
            }
            FileSource::Manifest {
                assets,
                output_path,
            } => catalog::from_build_manifest(assets, output_path),
        };
        self.handle_files(files, source.root()).await
    }

    /// Rewrites, filters and uploads an already discovered candidate set.
    pub async fn handle_files(&self, files: Vec<FileEntry>, root: &Path) -> Result<DeployReport> {
        let files = self
            .rewriter
            .rewrite(files, &self.options.html_files, root)
            .await?;
        let files = self.filter.filter(files)?;
        self.upload_files(files).await
    }

    /// Applies the configured transform to the base path and normalizes the result.
    pub async fn transform_base_path(&self) -> Result<String> {
        let base_path = match &self.options.base_path_transform {
            Some(transform) => transform.transform(&self.options.base_path).await?,
            None => self.options.base_path.clone(),
        };
        Ok(normalize_storage_key(&base_path))
    }

    async fn upload_files(&self, files: Vec<FileEntry>) -> Result<DeployReport> {
        let base_path = self.transform_base_path().await?;
        info!(base_path = %base_path, files = files.len(), "[DEPLOY] Resolved base path");

        let bucket = self.options.bucket.clone().unwrap_or_default();
        let uploader = ObjectUploader::new(
            self.client().await?,
            bucket,
            base_path.clone(),
            self.options.metadata.clone(),
            self.options.predefined_acl,
        );
        let scheduler = UploadScheduler::new(uploader, self.options.priority.clone());
        let waves = scheduler.upload(&files).await?;

        Ok(DeployReport {
            base_path,
            uploaded: files.into_iter().map(|f| f.name).collect(),
            waves,
        })
    }
}
