//! alphacut command line tool
//!
//! Removes the background of one image. The main thread plays the part of a
//! UI thread: it submits the work to a [`TaskRunner`], shows a spinner while
//! the runner works and applies the completion to a [`Session`] before
//! exporting.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, ModelCache, CACHE_DIR_ENV},
    download::ModelDownloader,
    models::{ModelKind, ModelSource},
    runner::TaskRunner,
    services::ModelRemovalService,
    session::Session,
    tracing_config::{TracingConfig, TracingFormat},
    RemovalConfig,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// Remove the background of an image and save a transparent PNG
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "alphacut")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image (JPEG, PNG, WebP, BMP, TIFF)
    #[arg(value_name = "INPUT", required_unless_present_any = &["list_models", "only_download", "clear_cache", "show_cache_dir"])]
    pub input: Option<PathBuf>,

    /// Output PNG [default: <INPUT stem>_cutout.png next to the input]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Also write the alpha mask as a grayscale PNG
    #[arg(long, value_name = "MASK")]
    pub mask: Option<PathBuf>,

    /// Built-in model (u2net, u2netp, silueta, isnet-general-use)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Use a local ONNX model file instead of a built-in model
    #[arg(long, value_name = "PATH", conflicts_with = "model")]
    pub model_path: Option<PathBuf>,

    /// Expected SHA-256 of the model file, checked after download and before loading
    #[arg(long, value_name = "HEX")]
    pub model_sha256: Option<String>,

    /// Inference backend
    #[arg(short, long, value_enum)]
    pub backend: Option<CliBackend>,

    /// Number of inference threads (0 = auto)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Give up waiting for the model after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// JSON configuration file; command line flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Use custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Fail instead of downloading a model that is not cached
    #[arg(long)]
    pub no_download: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE for alphacut, -vvv: TRACE everywhere)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Tracing filter directive (e.g. "alphacut::runner=trace"), overrides -v
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// List built-in models and their cache status, then exit
    #[arg(long)]
    pub list_models: bool,

    /// Download the model (default or --model) and exit
    #[arg(long)]
    pub only_download: bool,

    /// Clear cached models (combine with --model to clear one model)
    #[arg(long)]
    pub clear_cache: bool,

    /// Show current cache directory
    #[arg(long)]
    pub show_cache_dir: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Tract,
    Onnx,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Entry point of the `alphacut` binary
pub fn main() -> Result<()> {
    let cli = Cli::parse();
    let _session = init_tracing(&cli)
        .context("Failed to initialize tracing")?
        .entered();

    if cli.list_models {
        return list_models(&cli);
    }
    if cli.show_cache_dir {
        return show_cache_dir(&cli);
    }
    if cli.clear_cache {
        return clear_cache(&cli);
    }
    if cli.only_download {
        return download_only(&cli);
    }

    let input = cli
        .input
        .clone()
        .context("An input image is required")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    run(&cli, &input, &config)
}

fn init_tracing(cli: &Cli) -> Result<tracing::Span> {
    let format = match cli.log_format {
        CliLogFormat::Console => TracingFormat::Console,
        CliLogFormat::Compact => TracingFormat::Compact,
        #[cfg(feature = "tracing-json")]
        CliLogFormat::Json => TracingFormat::Json,
    };

    let mut tracing_config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(format)
        .with_session_id(uuid::Uuid::new_v4().to_string());
    if let Some(filter) = &cli.log_filter {
        tracing_config = tracing_config.with_env_filter(filter.clone());
    }
    tracing_config.init()
}

fn run(cli: &Cli, input: &Path, config: &RemovalConfig) -> Result<()> {
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(input));

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        model = %config.model_spec.source.display_name(),
        backend = %config.backend,
        "starting background removal"
    );

    ensure_model_available(config)?;

    let service = Arc::new(ModelRemovalService::new(config.clone())?);
    let mut runner = TaskRunner::new(service)?.with_service_timeout(config.service_timeout());
    let session = Rc::new(RefCell::new(Session::new()));

    let spinner = create_spinner(input);
    let id = Session::submit(&session, &mut runner, input);
    runner.wait_for(id, None);
    spinner.finish_and_clear();

    let session = session.borrow();
    if let Some(failure) = session.last_error() {
        anyhow::bail!("{} failure: {}", failure.kind, failure.reason);
    }
    let result = session
        .current()
        .context("Background removal finished without a result")?;

    session
        .export_png(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    if let Some(mask_path) = &cli.mask {
        session
            .export_mask_png(mask_path)
            .with_context(|| format!("Failed to write {}", mask_path.display()))?;
    }

    let (width, height) = result.dimensions();
    let stats = result.mask_statistics();
    println!(
        "{} -> {} ({}x{}, {:.1}% foreground)",
        input.display(),
        output.display(),
        width,
        height,
        stats.foreground_ratio * 100.0
    );
    if let Some(mask_path) = &cli.mask {
        println!("mask -> {}", mask_path.display());
    }
    if cli.verbose > 0 {
        println!("{}", result.timings().summary());
    }
    Ok(())
}

/// Download a missing built-in model up front so the user sees a progress bar
fn ensure_model_available(config: &RemovalConfig) -> Result<()> {
    let ModelSource::Builtin(kind) = config.model_spec.source else {
        return Ok(());
    };
    let cache = open_cache(config.cache_dir.as_deref())?;
    if cache.is_model_cached(kind) || !config.auto_download {
        return Ok(());
    }

    println!("Downloading model {} ({})", kind, kind.description());
    ModelDownloader::with_cache(cache)?
        .with_progress(true)
        .with_expected_sha256(config.model_spec.sha256.clone())
        .download_blocking(kind)
        .with_context(|| format!("Failed to download model {}", kind))?;
    Ok(())
}

fn create_spinner(input: &Path) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message(format!(
        "Removing background from {}",
        input.file_name().unwrap_or_default().to_string_lossy()
    ));
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn open_cache(cache_dir: Option<&Path>) -> Result<ModelCache> {
    match cache_dir {
        Some(dir) => ModelCache::with_custom_cache_dir(dir)
            .context("Failed to create cache with custom directory"),
        None => ModelCache::new().context("Failed to create model cache"),
    }
}

fn selected_model(cli: &Cli) -> Result<ModelKind> {
    match &cli.model {
        Some(name) => name.parse::<ModelKind>().context("Invalid --model"),
        None => Ok(ModelKind::default()),
    }
}

/// List built-in models with their cache status
fn list_models(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli.cache_dir.as_deref())?;
    let cached = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    println!("Built-in models (cache: {})", cache.cache_dir().display());
    for kind in ModelKind::all() {
        let status = cached
            .iter()
            .find(|m| m.kind == *kind)
            .map_or_else(|| "not downloaded".to_string(), |m| format!("cached, {}", format_size(m.size_bytes)));
        let marker = if *kind == ModelKind::default() { " (default)" } else { "" };
        println!("  {:<18} {}{}", kind.id(), kind.description(), marker);
        println!("  {:<18} input {}px, {}", "", kind.preprocessing().target_size, status);
    }
    Ok(())
}

fn download_only(cli: &Cli) -> Result<()> {
    let kind = selected_model(cli)?;
    let cache = open_cache(cli.cache_dir.as_deref())?;

    if cache.is_model_cached(kind) {
        println!("Model {} is already cached at {}", kind, cache.model_path(kind).display());
        return Ok(());
    }

    println!("Downloading model {} from {}", kind, kind.download_url());
    let path = ModelDownloader::with_cache(cache)?
        .with_progress(true)
        .with_expected_sha256(cli.model_sha256.clone())
        .download_blocking(kind)
        .with_context(|| format!("Failed to download model {}", kind))?;
    println!("Model {} stored at {}", kind, path.display());
    Ok(())
}

fn clear_cache(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli.cache_dir.as_deref())?;

    if cli.model.is_some() {
        let kind = selected_model(cli)?;
        if cache.clear_specific_model(kind)? {
            println!("Removed model {}", kind);
        } else {
            println!("Model {} was not cached", kind);
        }
    } else {
        let removed = cache.clear_all_models().context("Failed to clear cache")?;
        if removed.is_empty() {
            println!("Cache was already empty");
        } else {
            println!("Removed {} model(s): {}", removed.len(), removed.join(", "));
        }
    }
    println!("Cache location: {}", cache.cache_dir().display());
    Ok(())
}

fn show_cache_dir(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli.cache_dir.as_deref())?;
    println!("{}", cache.cache_dir().display());

    let source = if cli.cache_dir.is_some() {
        "--cache-dir flag".to_string()
    } else if std::env::var(CACHE_DIR_ENV).is_ok() {
        format!("{} environment variable", CACHE_DIR_ENV)
    } else {
        "platform cache directory".to_string()
    };
    println!("Source: {}", source);
    Ok(())
}

/// `<dir>/<stem>_cutout.png` for `<dir>/<stem>.<ext>`
pub(crate) fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().to_string());
    input.with_file_name(format!("{}_cutout.png", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/photos/cat.jpg")),
            PathBuf::from("/photos/cat_cutout.png")
        );
        assert_eq!(
            default_output_path(Path::new("dog.PNG")),
            PathBuf::from("dog_cutout.png")
        );
        assert_eq!(
            default_output_path(Path::new("archive.tar.png")),
            PathBuf::from("archive.tar_cutout.png")
        );
    }

    #[test]
    fn test_input_required_without_maintenance_flag() {
        assert!(Cli::try_parse_from(["alphacut"]).is_err());
        assert!(Cli::try_parse_from(["alphacut", "--list-models"]).is_ok());
        assert!(Cli::try_parse_from(["alphacut", "--show-cache-dir"]).is_ok());
    }

    #[test]
    fn test_model_and_model_path_conflict() {
        let result = Cli::try_parse_from([
            "alphacut",
            "in.jpg",
            "--model",
            "u2netp",
            "--model-path",
            "custom.onnx",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_full_flag_set() {
        let cli = Cli::try_parse_from([
            "alphacut",
            "in.jpg",
            "-o",
            "out.png",
            "--mask",
            "mask.png",
            "-m",
            "silueta",
            "-b",
            "onnx",
            "-t",
            "4",
            "--timeout",
            "30",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.input, Some(PathBuf::from("in.jpg")));
        assert_eq!(cli.output, Some(PathBuf::from("out.png")));
        assert_eq!(cli.mask, Some(PathBuf::from("mask.png")));
        assert_eq!(cli.backend, Some(CliBackend::Onnx));
        assert_eq!(cli.threads, Some(4));
        assert_eq!(cli.timeout, Some(30));
        assert_eq!(cli.verbose, 2);
        assert_eq!(selected_model(&cli).unwrap(), ModelKind::Silueta);
    }
}
