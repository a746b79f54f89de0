/// `load_config` module: loads a static YAML deploy config and adapts it into [`DeployOptions`].
///
/// This is the only place where user-supplied YAML is parsed. Loosely typed values (rule
/// strings and lists, metadata templates, transform names) are mapped onto the strongly typed
/// options here, so configuration mistakes surface before any file is touched.
///
/// Secrets are not expected in the file: the bucket may come from the
/// environment (`GCS_BUCKET`), and the storage client reads Google's standard
/// credential variables itself.
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{BasePathTransform, DeployOptions, ExpandEnv, Identity, MetadataValue};
use crate::rewrite::CdnOptions;
use crate::rule::Rule;
use crate::storage::{Credentials, PredefinedAcl};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TransformKind {
    #[default]
    Identity,
    Env,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    directory: Option<PathBuf>,
    #[serde(default)]
    base_path: Option<String>,
    #[serde(default)]
    base_path_transform: TransformKind,
    #[serde(default)]
    include: Option<Value>,
    #[serde(default)]
    exclude: Option<Value>,
    #[serde(default)]
    html_files: Option<OneOrMany>,
    #[serde(default)]
    priority: Option<Vec<Value>>,
    #[serde(default)]
    cdn: Option<CdnOptions>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default = "default_acl")]
    acl: Option<PredefinedAcl>,
    #[serde(default)]
    credentials: Credentials,
}

// An absent `acl` means the default; an explicit `acl: null` means no ACL header at all.
fn default_acl() -> Option<PredefinedAcl> {
    Some(PredefinedAcl::default())
}

/// Loads the YAML config at `path` and fills a missing bucket from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DeployOptions> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let options = parse_config(&config_content)?;
    info!(config_path = ?path_ref, "Config loaded and merged successfully");
    Ok(options)
}

/// Parses YAML config content into [`DeployOptions`].
pub fn parse_config(content: &str) -> Result<DeployOptions> {
    let raw: RawConfig = match serde_yaml::from_str(content) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let bucket = raw
        .bucket
        .or_else(|| std::env::var("GCS_BUCKET").ok())
        .filter(|b| !b.is_empty());

    let include = raw
        .include
        .as_ref()
        .map(Rule::from_value)
        .transpose()
        .context("Invalid include rule")?;
    let exclude = raw
        .exclude
        .as_ref()
        .map(Rule::from_value)
        .transpose()
        .context("Invalid exclude rule")?;
    let priority = raw
        .priority
        .map(|rules| rules.iter().map(Rule::from_value).collect::<Result<Vec<_>, _>>())
        .transpose()
        .context("Invalid priority rule")?;

    if let Some(cdn) = &raw.cdn {
        cdn.validate().context("Invalid cdn section")?;
    }

    let base_path_transform: Arc<dyn BasePathTransform> = match raw.base_path_transform {
        TransformKind::Identity => Arc::new(Identity),
        TransformKind::Env => Arc::new(ExpandEnv),
    };

    let metadata = raw
        .metadata
        .iter()
        .map(|(field, value)| (field.clone(), MetadataValue::from_template(value)))
        .collect();

    let options = DeployOptions {
        bucket,
        directory: raw.directory,
        include,
        exclude,
        base_path: raw.base_path.unwrap_or_default(),
        base_path_transform: Some(base_path_transform),
        html_files: raw.html_files.map(OneOrMany::into_vec).unwrap_or_default(),
        priority,
        cdn: raw.cdn,
        metadata,
        predefined_acl: raw.acl,
        credentials: raw.credentials,
    };
    options.trace_loaded();
    Ok(options)
}
