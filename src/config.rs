use async_trait::async_trait;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use crate::error::{DeployError, Result};
use crate::rewrite::CdnOptions;
use crate::rule::Rule;
use crate::storage::{Credentials, PredefinedAcl};

/// Options of one deploy plugin instance. Immutable once the plugin is built.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub bucket: Option<String>,
    pub directory: Option<PathBuf>,
    pub include: Option<Rule>,
    pub exclude: Option<Rule>,
    pub base_path: String,
    pub base_path_transform: Option<Arc<dyn BasePathTransform>>,
    pub html_files: Vec<String>,
    pub priority: Option<Vec<Rule>>,
    pub cdn: Option<CdnOptions>,
    pub metadata: BTreeMap<String, MetadataValue>,
    pub predefined_acl: Option<PredefinedAcl>,
    pub credentials: Credentials,
}

impl DeployOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            predefined_acl: Some(PredefinedAcl::default()),
            ..Default::default()
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            bucket = self.bucket.as_deref().unwrap_or("<missing>"),
            directory = ?self.directory,
            base_path = %self.base_path,
            priority_rules = self.priority.as_ref().map_or(0, Vec::len),
            cdn = self.cdn.is_some(),
            metadata_fields = self.metadata.len(),
            "Loaded DeployOptions"
        );
        debug!(?self, "DeployOptions loaded (full debug)");
    }
}

/// A metadata field value: fixed, or computed per file from `(name, path)`.
#[derive(Clone)]
pub enum MetadataValue {
    Static(String),
    Computed(Arc<dyn Fn(&str, &str) -> String + Send + Sync>),
}

impl fmt::Debug for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Static(v) => f.debug_tuple("Static").field(v).finish(),
            MetadataValue::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

impl MetadataValue {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        MetadataValue::Computed(Arc::new(f))
    }

    /// Values containing `{name}` or `{path}` become computed; anything else stays static.
    pub fn from_template(template: &str) -> Self {
        if !(template.contains("{name}") || template.contains("{path}")) {
            return MetadataValue::Static(template.to_string());
        }
        let template = template.to_string();
        MetadataValue::computed(move |name, path| {
            template.replace("{name}", name).replace("{path}", path)
        })
    }

    pub fn resolve(&self, name: &str, path: &str) -> String {
        match self {
            MetadataValue::Static(v) => v.clone(),
            MetadataValue::Computed(f) => f(name, path),
        }
    }
}

/// Computes the effective base path once per run, before any upload starts.
#[async_trait]
pub trait BasePathTransform: Send + Sync + fmt::Debug {
    async fn transform(&self, base_path: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

#[async_trait]
impl BasePathTransform for Identity {
    async fn transform(&self, base_path: &str) -> Result<String> {
        Ok(base_path.to_string())
    }
}

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern"));

/// Expands `${VAR}` from the process environment. Unset variables are a configuration error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpandEnv;

#[async_trait]
impl BasePathTransform for ExpandEnv {
    async fn transform(&self, base_path: &str) -> Result<String> {
        let mut missing = None;
        let expanded = ENV_VAR.replace_all(base_path, |caps: &Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            })
        });
        match missing {
            Some(var) => Err(DeployError::configuration(format!(
                "base path references unset environment variable {var}"
            ))),
            None => Ok(expanded.into_owned()),
        }
    }
}

/// Adapts an async closure into a [`BasePathTransform`].
pub struct TransformFn<F>(pub F);

impl<F> fmt::Debug for TransformFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransformFn(<fn>)")
    }
}

#[async_trait]
impl<F, Fut> BasePathTransform for TransformFn<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    async fn transform(&self, base_path: &str) -> Result<String> {
        (self.0)(base_path.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_become_computed() {
        let value = MetadataValue::from_template("origin={name}@{path}");
        assert!(matches!(value, MetadataValue::Computed(_)));
        assert_eq!(value.resolve("a.js", "/d/a.js"), "origin=a.js@/d/a.js");

        let value = MetadataValue::from_template("public, max-age=60");
        assert!(matches!(value, MetadataValue::Static(_)));
    }

    #[tokio::test]
    async fn closure_transform_runs() {
        let transform =
            TransformFn(|base: String| async move { Ok::<_, DeployError>(format!("{base}v2")) });
        assert_eq!(transform.transform("assets/").await.unwrap(), "assets/v2");
    }
}
