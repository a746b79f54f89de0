//! Discovery of candidate files, either from an output directory or from the build manifest.

use regex::RegexSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::error::{DeployError, Result};
use crate::path_util::{to_storage_name, STORAGE_SEP};

/// Names that are never uploaded. Each entry is a regular expression.
pub const UPLOAD_IGNORES: &[&str] = &[".DS_Store"];

static IGNORES: LazyLock<RegexSet> =
    LazyLock::new(|| RegexSet::new(UPLOAD_IGNORES).expect("static ignore patterns"));

/// True if `name` matches any entry of [`UPLOAD_IGNORES`].
pub fn is_ignored(name: &str) -> bool {
    IGNORES.is_match(name)
}

/// One candidate artifact.
///
/// `name` is the storage-relative key and always uses `/`; `path` is where the bytes live locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Recursively lists every file below `root`.
///
/// Walking happens on the blocking pool. Names are relative to `root` and use the
/// storage separator; ignored names are dropped here already.
pub async fn from_directory(root: &Path) -> Result<Vec<FileEntry>> {
    let root = root.to_path_buf();
    info!(root = %root.display(), "[DEPLOY] Listing files in directory");

    let walk_root = root.clone();
    let files = tokio::task::spawn_blocking(move || walk(&walk_root))
        .await
        .map_err(|e| DeployError::Discovery {
            path: root.clone(),
            source: std::io::Error::other(e),
        })??;

    info!(root = %root.display(), count = files.len(), "[DEPLOY] Directory listing complete");
    Ok(files)
}

fn walk(root: &Path) -> Result<Vec<FileEntry>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            error!(error = ?e, root = %root.display(), "[DEPLOY][ERROR] Directory walk failed");
            DeployError::Discovery {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                source: e.into(),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = match path.strip_prefix(root) {
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => continue,
        };
        let name = to_storage_name(&relative);
        if is_ignored(&name) {
            debug!(name = %name, "Skipping ignored file");
            continue;
        }
        files.push(FileEntry::new(name, path));
    }
    Ok(files)
}

/// Maps the build's emitted asset names onto files below `output_path`.
///
/// The resulting paths are not checked; a missing file surfaces as a transfer error later.
pub fn from_build_manifest<S: AsRef<str>>(assets: &[S], output_path: &Path) -> Vec<FileEntry> {
    let prefix = output_path.to_string_lossy();
    let files: Vec<FileEntry> = assets
        .iter()
        .map(|name| {
            let name = name.as_ref();
            FileEntry::new(name, format!("{prefix}{STORAGE_SEP}{name}"))
        })
        .collect();
    info!(count = files.len(), output_path = %prefix, "[DEPLOY] Collected files from build manifest");
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_list_is_a_pattern_match() {
        assert!(is_ignored(".DS_Store"));
        assert!(is_ignored("img/.DS_Store"));
        assert!(!is_ignored("index.html"));
    }

    #[test]
    fn manifest_paths_are_synthesized() {
        let files = from_build_manifest(&["main.js", "css/app.css"], Path::new("/out"));
        assert_eq!(
            files,
            vec![
                FileEntry::new("main.js", "/out/main.js"),
                FileEntry::new("css/app.css", "/out/css/app.css"),
            ]
        );
    }
}
