//! Per-object upload: destination key, metadata and the hand-off to the storage client.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::MetadataValue;
use crate::error::{DeployError, Result};
use crate::path_util::STORAGE_SEP;
use crate::storage::{canonical_field, ObjectMetadata, ObjectStorage, PredefinedAcl, PutObjectRequest};

/// Joins the base path and the object name.
///
/// Exactly one leading `/` is removed from the result so the bucket never gets an unnamed
/// top-level folder. Doubled separators in the middle are left alone.
pub fn resolve_destination(base_path: &str, name: &str) -> String {
    let destination = format!("{base_path}{name}");
    match destination.strip_prefix(STORAGE_SEP) {
        Some(rest) => rest.to_string(),
        None => destination,
    }
}

/// Evaluates every configured metadata field for one file.
///
/// A content type is derived from the file extension unless one was configured. Types that
/// cannot be guessed are left out.
pub fn resolve_metadata(
    fields: &BTreeMap<String, MetadataValue>,
    name: &str,
    path: &str,
) -> ObjectMetadata {
    let mut metadata: ObjectMetadata = fields
        .iter()
        .map(|(field, value)| (field.clone(), value.resolve(name, path)))
        .collect();

    let has_content_type = metadata
        .keys()
        .any(|field| canonical_field(field) == "contenttype");
    if !has_content_type {
        if let Some(mime) = mime_guess::from_path(name).first() {
            metadata.insert("contentType".to_string(), mime.essence_str().to_string());
        }
    }
    metadata
}

/// Uploads single files into one bucket through a shared storage client.
#[derive(Clone)]
pub struct ObjectUploader {
    client: Arc<dyn ObjectStorage>,
    bucket: String,
    base_path: String,
    metadata: BTreeMap<String, MetadataValue>,
    predefined_acl: Option<PredefinedAcl>,
}

impl ObjectUploader {
    /// `base_path` must already be resolved and normalized for the run.
    pub fn new(
        client: Arc<dyn ObjectStorage>,
        bucket: impl Into<String>,
        base_path: impl Into<String>,
        metadata: BTreeMap<String, MetadataValue>,
        predefined_acl: Option<PredefinedAcl>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            base_path: base_path.into(),
            metadata,
            predefined_acl,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Uploads one file. Failures are returned as-is, never retried here.
    pub async fn upload(&self, name: &str, path: &Path) -> Result<()> {
        let destination = resolve_destination(&self.base_path, name);
        let metadata = resolve_metadata(&self.metadata, name, &path.to_string_lossy());
        debug!(name, destination = %destination, ?metadata, "[DEPLOY][UPLOAD] Uploading file");

        let request = PutObjectRequest {
            destination: destination.clone(),
            metadata,
            predefined_acl: self.predefined_acl,
        };
        match self.client.put_object(&self.bucket, path, request).await {
            Ok(()) => {
                info!(name, destination = %destination, "[DEPLOY][UPLOAD] Upload succeeded");
                Ok(())
            }
            Err(e) => {
                error!(name, destination = %destination, error = ?e, "[DEPLOY][ERROR][UPLOAD] Upload failed");
                Err(DeployError::Transfer {
                    path: path.to_path_buf(),
                    destination,
                    source: e,
                })
            }
        }
    }
}
