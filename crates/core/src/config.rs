use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::export::ExportSettings;

pub const DEFAULT_DATABASE: &str = "my_database.db";
const DEFAULT_SCHEMA_CACHE_TTL_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to locate a config directory")]
    ConfigDirUnavailable,
    #[error("failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// User-authored settings. The application never writes this file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub default_database: PathBuf,
    pub schema_cache_ttl_secs: u64,
    /// TrueType font for PDF export; Helvetica when unset.
    pub pdf_font_path: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub export: ExportSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_database: PathBuf::from(DEFAULT_DATABASE),
            schema_cache_ttl_secs: DEFAULT_SCHEMA_CACHE_TTL_SECS,
            pdf_font_path: None,
            log_filter: None,
            export: ExportSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path()?;
        Self::load_from_path(path)
    }

    /// A missing or empty file yields the defaults.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn schema_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_cache_ttl_secs)
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(custom) = env::var_os("TABULA_CONFIG_DIR") {
        return Ok(PathBuf::from(custom).join("config.toml"));
    }

    let base_dir = if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ConfigError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ConfigError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("tabula").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, DEFAULT_DATABASE};
    use crate::export::ThumbnailSize;

    #[test]
    fn missing_or_empty_file_loads_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("config.toml");

        let config = AppConfig::load_from_path(&path).expect("missing file");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.default_database.to_str(), Some(DEFAULT_DATABASE));

        fs::write(&path, "  \n").expect("write");
        assert_eq!(
            AppConfig::load_from_path(&path).expect("empty file"),
            AppConfig::default()
        );
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "default_database = \"shop.db\"\nschema_cache_ttl_secs = 5\n\n[export]\nthumbnail_size = \"large\"\n",
        )
        .expect("write");

        let config = AppConfig::load_from_path(&path).expect("config");
        assert_eq!(config.default_database.to_str(), Some("shop.db"));
        assert_eq!(config.schema_cache_ttl(), Duration::from_secs(5));
        assert_eq!(config.export.thumbnail_size, ThumbnailSize::Large);
        assert!(config.export.include_images);
        assert!(config.pdf_font_path.is_none());
    }

    #[test]
    fn malformed_file_reports_path() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "schema_cache_ttl_secs = \"soon\"").expect("write");

        let err = AppConfig::load_from_path(&path).expect_err("bad type");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }
}
