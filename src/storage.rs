//! # storage: object storage client boundary
//!
//! This module defines the single trait ([`ObjectStorage`]) the uploader talks to, the request
//! type it sends, and the Google Cloud Storage implementation used by the binary.
//!
//! - Transport, retries and authentication belong to the client, not to the pipeline.
//! - The trait is annotated for `mockall`, so tests can script uploads with `MockObjectStorage`.
//! - Destination keys are stored verbatim. A key the backend cannot represent is an error,
//!   never a silently rewritten key.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, ClientOptions, ObjectStore, PutMode, PutOptions, PutPayload,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

/// Field name -> value, as sent along with an object.
pub type ObjectMetadata = BTreeMap<String, String>;

/// Request header carrying the canned ACL on GCS uploads.
pub const ACL_HEADER: &str = "x-goog-acl";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid object key {key:?}: {source}")]
    InvalidKey {
        key: String,
        #[source]
        source: object_store::path::Error,
    },
    #[error(transparent)]
    Backend(#[from] object_store::Error),
    #[error("{0}")]
    Other(String),
}

/// Canned access control applied to uploaded objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PredefinedAcl {
    AuthenticatedRead,
    BucketOwnerFullControl,
    BucketOwnerRead,
    Private,
    ProjectPrivate,
    #[default]
    PublicRead,
}

impl PredefinedAcl {
    /// Value of the [`ACL_HEADER`] request header.
    pub fn header_value(self) -> &'static str {
        match self {
            PredefinedAcl::AuthenticatedRead => "authenticated-read",
            PredefinedAcl::BucketOwnerFullControl => "bucket-owner-full-control",
            PredefinedAcl::BucketOwnerRead => "bucket-owner-read",
            PredefinedAcl::Private => "private",
            PredefinedAcl::ProjectPrivate => "project-private",
            PredefinedAcl::PublicRead => "public-read",
        }
    }
}

/// Everything the client needs to store one local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectRequest {
    pub destination: String,
    pub metadata: ObjectMetadata,
    pub predefined_acl: Option<PredefinedAcl>,
}

/// Credentials and endpoint selection for the storage client.
///
/// The project is implied by the bucket and the service account; GCS uploads take no project id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Path to a service account JSON key. Falls back to the standard Google env vars.
    #[serde(default)]
    pub service_account_path: Option<PathBuf>,
    /// Custom endpoint URL, e.g. a fake GCS server.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Trait for storing local files in a bucket.
///
/// Implementors own transport, retry and authentication. The trait is `Send + Sync` so a
/// single handle can serve all concurrent uploads of a run.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload the file at `local_path` into `bucket` under `request.destination`.
    async fn put_object(
        &self,
        bucket: &str,
        local_path: &Path,
        request: PutObjectRequest,
    ) -> Result<(), StorageError>;
}

type StoreKey = (String, Option<PredefinedAcl>);

/// Google Cloud Storage client built on `object_store`.
///
/// One store is created per bucket and ACL on first use and cached for the lifetime of the
/// client. The ACL travels as a default [`ACL_HEADER`] on that store's requests.
pub struct GcsStorage {
    credentials: Credentials,
    fixed: Option<Arc<dyn ObjectStore>>,
    stores: Mutex<HashMap<StoreKey, Arc<dyn ObjectStore>>>,
}

impl GcsStorage {
    pub fn connect(credentials: Credentials) -> Self {
        info!(
            endpoint = credentials.endpoint.as_deref().unwrap_or("<default>"),
            service_account = credentials.service_account_path.is_some(),
            "Initialised GCS storage client"
        );
        Self {
            credentials,
            fixed: None,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Client that writes every bucket into `store`. ACLs are left to that store.
    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            credentials: Credentials::default(),
            fixed: Some(store),
            stores: Mutex::new(HashMap::new()),
        }
    }

    fn store(
        &self,
        bucket: &str,
        acl: Option<PredefinedAcl>,
    ) -> Result<Arc<dyn ObjectStore>, StorageError> {
        if let Some(store) = &self.fixed {
            return Ok(store.clone());
        }

        let key = (bucket.to_string(), acl);
        let mut stores = self.stores.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(store) = stores.get(&key) {
            return Ok(store.clone());
        }

        let mut builder = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .with_client_options(ClientOptions::new().with_default_headers(acl_headers(acl)));
        if let Some(key_path) = &self.credentials.service_account_path {
            builder = builder.with_service_account_path(key_path.to_string_lossy());
        }
        if let Some(endpoint) = &self.credentials.endpoint {
            builder = builder.with_url(endpoint);
        }
        let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
        debug!(bucket, ?acl, "Connected to GCS bucket");
        stores.insert(key, store.clone());
        Ok(store)
    }
}

/// Default request headers of a store uploading with `acl`.
pub fn acl_headers(acl: Option<PredefinedAcl>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(acl) = acl {
        headers.insert(ACL_HEADER, HeaderValue::from_static(acl.header_value()));
    }
    headers
}

/// Maps metadata fields onto `object_store` attributes.
///
/// Well-known HTTP fields become their dedicated attribute; everything else is custom metadata.
pub fn to_attributes(metadata: &ObjectMetadata) -> Attributes {
    let mut attributes = Attributes::new();
    for (field, value) in metadata {
        let attribute = match canonical_field(field).as_str() {
            "contenttype" => Attribute::ContentType,
            "cachecontrol" => Attribute::CacheControl,
            "contentencoding" => Attribute::ContentEncoding,
            "contentdisposition" => Attribute::ContentDisposition,
            "contentlanguage" => Attribute::ContentLanguage,
            _ => Attribute::Metadata(field.clone().into()),
        };
        attributes.insert(attribute, value.clone().into());
    }
    attributes
}

/// `Content-Type`, `content_type` and `contentType` all name the same field.
pub fn canonical_field(field: &str) -> String {
    field
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

#[async_trait]
impl ObjectStorage for GcsStorage {
    async fn put_object(
        &self,
        bucket: &str,
        local_path: &Path,
        request: PutObjectRequest,
    ) -> Result<(), StorageError> {
        let location =
            ObjectPath::parse(&request.destination).map_err(|source| StorageError::InvalidKey {
                key: request.destination.clone(),
                source,
            })?;
        let store = self.store(bucket, request.predefined_acl)?;
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::Io {
                path: local_path.to_path_buf(),
                source: e,
            })?;
        let size = data.len();

        let opts = PutOptions {
            mode: PutMode::Overwrite,
            attributes: to_attributes(&request.metadata),
            ..Default::default()
        };
        store
            .put_opts(&location, PutPayload::from(Bytes::from(data)), opts)
            .await?;

        info!(bucket, destination = %request.destination, size, "Uploaded object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_are_canonicalised() {
        assert_eq!(canonical_field("Content-Type"), "contenttype");
        assert_eq!(canonical_field("cache_control"), "cachecontrol");
        assert_eq!(canonical_field("cacheControl"), "cachecontrol");
    }

    #[test]
    fn known_fields_map_to_attributes() {
        let metadata = ObjectMetadata::from([
            ("contentType".to_string(), "text/html".to_string()),
            ("x-origin".to_string(), "build".to_string()),
        ]);
        let attributes = to_attributes(&metadata);
        assert_eq!(
            attributes.get(&Attribute::ContentType).map(|v| v.to_string()),
            Some("text/html".to_string())
        );
        assert_eq!(
            attributes
                .get(&Attribute::Metadata("x-origin".into()))
                .map(|v| v.to_string()),
            Some("build".to_string())
        );
    }

    #[test]
    fn acl_becomes_a_request_header() {
        let headers = acl_headers(Some(PredefinedAcl::default()));
        assert_eq!(
            headers.get(ACL_HEADER).and_then(|v| v.to_str().ok()),
            Some("public-read")
        );
        let headers = acl_headers(Some(PredefinedAcl::BucketOwnerFullControl));
        assert_eq!(
            headers.get(ACL_HEADER).and_then(|v| v.to_str().ok()),
            Some("bucket-owner-full-control")
        );
        assert!(acl_headers(None).is_empty());
    }

    #[test]
    fn keys_are_parsed_verbatim() {
        for key in ["js/vendors~main.chunk.js", "img/[hash].png", "a%20b.css"] {
            assert_eq!(ObjectPath::parse(key).unwrap().as_ref(), key);
        }
        assert!(ObjectPath::parse("v1//app.js").is_err());
    }
}
