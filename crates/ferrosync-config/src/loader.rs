//! Configuration loader utilities

use crate::{Config, ConfigBuilder, ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Prefix of the environment variables read by the loader
pub const ENV_PREFIX: &str = "FERROSYNC";

/// Configuration loader with common loading patterns
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the first default location that exists
    pub fn load_default() -> ConfigResult<Config> {
        let mut builder = ConfigBuilder::new().add_defaults();

        if let Some(path) = Self::config_exists() {
            builder = builder.add_source_file(path);
        }

        builder.add_env_prefix(ENV_PREFIX).build()
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Configuration file not found",
                ),
            });
        }

        ConfigBuilder::new()
            .add_defaults()
            .add_source_file(path)
            .add_env_prefix(ENV_PREFIX)
            .build()
    }

    /// Save configuration to a file, in the format its extension names
    pub fn save_to_file<P: AsRef<Path>>(config: &Config, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::to_string_pretty(config).map_err(|e| {
                ConfigError::serialization(format!("Failed to serialize to TOML: {}", e))
            })?,
            Some("json") => serde_json::to_string_pretty(config).map_err(|e| {
                ConfigError::serialization(format!("Failed to serialize to JSON: {}", e))
            })?,
            _ => serde_yaml::to_string(config)?,
        };

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Generate a default configuration file
    pub fn generate_default_config<P: AsRef<Path>>(path: P) -> ConfigResult<()> {
        Self::save_to_file(&Config::default(), path)
    }

    /// Default configuration file paths in order of preference
    pub fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("ferrosync.yaml"),
            PathBuf::from("ferrosync.yml"),
            PathBuf::from("ferrosync.toml"),
            PathBuf::from(".ferrosync.yaml"),
            PathBuf::from(".ferrosync.toml"),
        ];

        if let Some(config_dir) = user_config_dir() {
            let ferrosync_dir = config_dir.join("ferrosync");
            paths.push(ferrosync_dir.join("config.yaml"));
            paths.push(ferrosync_dir.join("config.toml"));
        }

        #[cfg(unix)]
        {
            paths.push(PathBuf::from("/etc/ferrosync/config.yaml"));
            paths.push(PathBuf::from("/etc/ferrosync/config.toml"));
        }

        paths
    }

    /// First default configuration file that exists
    pub fn config_exists() -> Option<PathBuf> {
        Self::default_config_paths()
            .into_iter()
            .find(|path| path.exists())
    }
}

fn user_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME").ok().map(|home| {
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
        })
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("config.yaml")]
    #[case("config.toml")]
    #[case("config.json")]
    fn test_save_and_load(#[case] name: &str) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(name);

        let mut original = Config::default();
        original.sync.source_path = Some(PathBuf::from("/data/source"));
        original.sync.interval_secs = 42;
        ConfigLoader::save_to_file(&original, &config_path).unwrap();

        let loaded = ConfigLoader::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.sync.source_path, original.sync.source_path);
        assert_eq!(loaded.sync.interval_secs, 42);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigLoader::load_from_file("/nonexistent/ferrosync.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_generate_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("default.yaml");

        ConfigLoader::generate_default_config(&config_path).unwrap();
        assert!(config_path.exists());

        let config = ConfigLoader::load_from_file(&config_path).unwrap();
        assert_eq!(config.sync.interval_secs, 60);
    }

    #[test]
    fn test_default_paths_prefer_current_directory() {
        let paths = ConfigLoader::default_config_paths();
        assert_eq!(paths[0], PathBuf::from("ferrosync.yaml"));
    }
}
