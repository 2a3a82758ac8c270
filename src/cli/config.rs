//! Conversion of CLI arguments into a [`RemovalConfig`]

use crate::cli::main_impl::{Cli, CliBackend};
use crate::{
    config::{BackendType, RemovalConfig},
    models::{ModelKind, ModelSpec},
};
use anyhow::{Context, Result};
use std::time::Duration;

/// Convert CLI arguments to a validated [`RemovalConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from `--config` (or defaults) and apply every flag that was given
    pub(crate) fn from_cli(cli: &Cli) -> Result<RemovalConfig> {
        let mut config = match &cli.config {
            Some(path) => RemovalConfig::from_json_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => RemovalConfig::default(),
        };

        if let Some(path) = &cli.model_path {
            config.model_spec = ModelSpec::external(path);
        } else if let Some(name) = &cli.model {
            let kind = name.parse::<ModelKind>().context("Invalid --model")?;
            config.model_spec = ModelSpec::builtin(kind);
        }
        if let Some(digest) = &cli.model_sha256 {
            config.model_spec.sha256 = Some(digest.clone());
        }

        if let Some(backend) = cli.backend {
            config.backend = Self::backend_type(backend);
        }
        if let Some(threads) = cli.threads {
            config.intra_threads = threads;
        }
        if let Some(secs) = cli.timeout {
            config.service_timeout_ms = Some(Duration::from_secs(secs).as_millis() as u64);
        }
        if let Some(dir) = &cli.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if cli.no_download {
            config.auto_download = false;
        }

        config.validate().context("Configuration validation failed")?;
        Ok(config)
    }

    fn backend_type(backend: CliBackend) -> BackendType {
        match backend {
            CliBackend::Tract => BackendType::Tract,
            CliBackend::Onnx => BackendType::Onnx,
        }
    }
}
