#![doc = "gcs-deploy: uploads build artifacts to a Google Cloud Storage bucket after a build."]

//! The pipeline runs once per build: discover files ([`catalog`]), optionally rewrite
//! HTML/CSS URLs to a CDN ([`rewrite`]), filter ([`filter`]), then upload in priority order with
//! bounded concurrency ([`schedule`], [`upload`]) through a storage client ([`storage`]).
//!
//! [`deploy::DeployPlugin`] ties the stages together and is the build-hook entrypoint.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod deploy;
pub mod error;
pub mod filter;
pub mod load_config;
pub mod path_util;
pub mod rewrite;
pub mod rule;
pub mod schedule;
pub mod storage;
pub mod upload;

pub use cli::{run, Cli, Commands};
pub use deploy::{BuildOutput, Compilation, DeployPlugin, DeployReport};
pub use error::{DeployError, Result};
