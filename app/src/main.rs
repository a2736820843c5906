use std::env;
use std::error::Error;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tabula_core::config::{AppConfig, ConfigError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_ENV: &str = "TABULA_LOG_FILE";
const LOG_FILTER_ENV: &str = "TABULA_LOG";
const DEFAULT_LOG_FILTER: &str = "info";

/// `TABULA_LOG` wins over the config file; blank values are ignored.
fn log_filter(env_filter: Option<String>, config: &AppConfig) -> String {
    env_filter
        .filter(|filter| !filter.trim().is_empty())
        .or_else(|| config.log_filter.clone())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

/// The terminal belongs to the TUI, so logs only go to a file.
fn init_logging(log_file: &Path, filter: &str) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = log_file.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(file)
        .with_filter(EnvFilter::try_new(filter)?);
    tracing_subscriber::registry().with(file_layer).try_init()?;
    Ok(())
}

fn run_app(
    config: Result<AppConfig, ConfigError>,
    run_tui: impl FnOnce(AppConfig) -> Result<(), tabula_tui::TuiError>,
) -> Result<(), Box<dyn Error>> {
    let config = match config {
        Ok(config) => config,
        Err(error) => {
            tracing::warn!(%error, "config ignored, using defaults");
            AppConfig::default()
        }
    };
    tracing::info!(
        ui = tabula_tui::ui_name(),
        database = %config.default_database.display(),
        "starting"
    );
    run_tui(config)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load_default();
    if let Some(log_file) = env::var_os(LOG_FILE_ENV).map(PathBuf::from) {
        let defaults = AppConfig::default();
        let filter = log_filter(
            env::var(LOG_FILTER_ENV).ok(),
            config.as_ref().unwrap_or(&defaults),
        );
        init_logging(&log_file, &filter)?;
    }
    run_app(config, tabula_tui::run)
}
