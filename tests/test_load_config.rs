use gcs_deploy::config::{BasePathTransform, MetadataValue};
use gcs_deploy::load_config::{load_config, parse_config};
use gcs_deploy::storage::PredefinedAcl;
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A complete config file maps onto typed options.
#[tokio::test]
#[serial]
async fn test_load_config_success_maps_every_section() {
    let config_yaml = r#"
bucket: assets-bucket
directory: ./dist
base_path: static
include:
  - { regex: "\\.(js|css|html)$" }
  - app
exclude: vendor
html_files:
  - index.html
  - about.html
priority:
  - { regex: "\\.html$" }
cdn:
  base: https://cdn.example.com
  relative_root: public
metadata:
  cacheControl: "public, max-age=31536000"
  x-origin: "{name}"
acl: projectPrivate
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let options = load_config(config_file.path()).expect("Config should load");

    assert_eq!(options.bucket.as_deref(), Some("assets-bucket"));
    assert_eq!(options.directory, Some(PathBuf::from("./dist")));
    assert_eq!(options.base_path, "static");
    assert_eq!(options.html_files, vec!["index.html", "about.html"]);
    assert_eq!(options.priority.as_ref().map(Vec::len), Some(1));
    assert_eq!(options.predefined_acl, Some(PredefinedAcl::ProjectPrivate));

    let include = options.include.as_ref().unwrap();
    assert!(include.matches("app.js").unwrap());
    assert!(!include.matches("lib.js").unwrap());
    assert!(!include.matches("app.png").unwrap());
    assert!(options.exclude.as_ref().unwrap().matches("vendor/x.js").unwrap());

    let cdn = options.cdn.as_ref().unwrap();
    assert_eq!(cdn.base, "https://cdn.example.com");
    assert_eq!(cdn.relative_root, "public");

    assert!(matches!(
        options.metadata["cacheControl"],
        MetadataValue::Static(_)
    ));
    assert_eq!(
        options.metadata["x-origin"].resolve("app.js", "/dist/app.js"),
        "app.js"
    );
}

/// The bucket falls back to the environment when the file leaves it out.
#[tokio::test]
#[serial]
async fn test_load_config_reads_bucket_from_env() {
    env::set_var("GCS_BUCKET", "env-bucket");

    let options = parse_config("directory: ./dist\n").expect("Config should parse");

    env::remove_var("GCS_BUCKET");

    assert_eq!(options.bucket.as_deref(), Some("env-bucket"));
}

#[tokio::test]
#[serial]
async fn test_credentials_section_is_mapped() {
    let options = parse_config(
        "bucket: b\ncredentials:\n  service_account_path: ./key.json\n  endpoint: http://localhost:4443\n",
    )
    .unwrap();
    assert_eq!(
        options.credentials.service_account_path,
        Some(PathBuf::from("./key.json"))
    );
    assert_eq!(
        options.credentials.endpoint.as_deref(),
        Some("http://localhost:4443")
    );
}

/// `acl: null` turns the ACL header off for buckets with uniform access control.
#[tokio::test]
#[serial]
async fn test_explicit_null_acl_disables_the_acl() {
    let options = parse_config("bucket: b\nacl: null\n").unwrap();
    assert_eq!(options.predefined_acl, None);
}

/// The file wins over the environment.
#[tokio::test]
#[serial]
async fn test_load_config_prefers_file_bucket() {
    env::set_var("GCS_BUCKET", "env-bucket");
    let options = parse_config("bucket: file-bucket\n").unwrap();
    env::remove_var("GCS_BUCKET");

    assert_eq!(options.bucket.as_deref(), Some("file-bucket"));
}

/// Without any bucket the config still loads; the deploy reports the missing option.
#[tokio::test]
#[serial]
async fn test_load_config_without_bucket_leaves_it_unset() {
    env::remove_var("GCS_BUCKET");
    let options = parse_config("base_path: assets\n").unwrap();
    assert!(options.bucket.is_none());
    assert_eq!(options.predefined_acl, Some(PredefinedAcl::PublicRead));
}

#[tokio::test]
#[serial]
async fn test_single_html_file_string_is_accepted() {
    let options = parse_config("bucket: b\nhtml_files: index.html\n").unwrap();
    assert_eq!(options.html_files, vec!["index.html"]);
}

#[tokio::test]
#[serial]
async fn test_invalid_rule_is_rejected() {
    let err = parse_config("bucket: b\ninclude: { glob: \"*.js\" }\n").unwrap_err();
    assert!(
        format!("{err:#}").contains("Invalid include rule"),
        "unexpected error: {err:#}"
    );

    let err = parse_config("bucket: b\nexclude: \"(unclosed\"\n").unwrap_err();
    assert!(format!("{err:#}").contains("Invalid exclude rule"));
}

#[tokio::test]
#[serial]
async fn test_relative_cdn_base_is_rejected() {
    let err = parse_config("bucket: b\ncdn:\n  base: cdn.example.com\n").unwrap_err();
    assert!(format!("{err:#}").contains("Invalid cdn section"));
}

#[tokio::test]
#[serial]
async fn test_env_base_path_transform_expands_variables() {
    env::set_var("RELEASE_TAG", "v7");
    let options = parse_config("bucket: b\nbase_path: \"releases/${RELEASE_TAG}\"\nbase_path_transform: env\n")
        .unwrap();
    let transformed = options
        .base_path_transform
        .as_ref()
        .unwrap()
        .transform(&options.base_path)
        .await;
    env::remove_var("RELEASE_TAG");

    assert_eq!(transformed.unwrap(), "releases/v7");
}

/// If the config file is not valid YAML, loading fails and says so.
#[tokio::test]
#[serial]
async fn test_load_config_errors_for_invalid_file() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "bucket: [unterminated").unwrap();

    let err = load_config(config_file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"), "{err}");
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_for_missing_file() {
    let err = load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"), "{err}");
}
