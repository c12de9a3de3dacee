//! Layered configuration loading

use crate::{Config, ConfigError, ConfigResult};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use ferrosync_types::BufferSize;
use std::path::{Path, PathBuf};

const ENV_SEPARATOR: &str = "__";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration builder for loading configuration from multiple sources
///
/// Sources are layered in the order they are added, later ones overriding
/// earlier ones. Defaults always sit at the bottom.
#[derive(Debug)]
pub struct ConfigBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<ConfigSource>,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File { path: PathBuf, format: FileFormat },
    Defaults,
    Environment { prefix: String },
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
        }
    }

    /// Add default configuration values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source, skipped when the file does not exist
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix
    ///
    /// Nested keys are separated by `__`, so `FERROSYNC__SYNC__INTERVAL_SECS=5`
    /// sets `sync.interval_secs`.
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Build and validate the configuration
    pub fn build(mut self) -> ConfigResult<Config> {
        let defaults_value = serde_yaml::to_value(Config::default())
            .map_err(|e| ConfigError::other(format!("Failed to serialize defaults: {}", e)))?;
        self.inner = self
            .inner
            .add_source(config::Config::try_from(&defaults_value)?);

        for source in &self.sources {
            match source {
                ConfigSource::File { path, format } => {
                    if path.exists() {
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                ConfigSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix)
                            .separator(ENV_SEPARATOR)
                            .try_parsing(true),
                    );
                }
                ConfigSource::Defaults => {}
            }
        }

        let config = self.inner.build()?;
        let result: Config = config.try_deserialize()?;
        Self::validate(&result)?;

        Ok(result)
    }

    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    /// Validate the configuration
    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.sync.interval_secs == 0 {
            return Err(ConfigError::validation(
                "Sync interval must be greater than 0 seconds",
            ));
        }

        BufferSize::new(config.verification.buffer_size).map_err(ConfigError::validation)?;

        if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrosync_types::DigestAlgorithm;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
        let mut temp_file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(temp_file, "{contents}").unwrap();
        temp_file
    }

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().add_defaults().build().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_builder_yaml_file() {
        let temp_file = write_config(
            ".yaml",
            r#"
sync:
  source_path: /data/source
  interval_secs: 15
verification:
  algorithm: sha256
"#,
        );

        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(temp_file.path())
            .build()
            .unwrap();

        assert_eq!(config.sync.source_path, Some(PathBuf::from("/data/source")));
        assert_eq!(config.sync.interval_secs, 15);
        assert!(config.sync.preserve_timestamps);
        assert_eq!(config.verification.algorithm, DigestAlgorithm::Sha256);
    }

    #[test]
    fn test_builder_toml_file() {
        let temp_file = write_config(
            ".toml",
            r#"
[sync]
replica_path = "/data/replica"
dry_run = true

[logging]
level = "debug"
"#,
        );

        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(temp_file.path())
            .build()
            .unwrap();

        assert_eq!(config.sync.replica_path, Some(PathBuf::from("/data/replica")));
        assert!(config.sync.dry_run);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file("/nonexistent/ferrosync.yaml")
            .build()
            .unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_environment_overrides_file() {
        let temp_file = write_config(".yaml", "sync:\n  interval_secs: 15\n");
        std::env::set_var("FERROSYNC_BUILDER_TEST__SYNC__INTERVAL_SECS", "7");

        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(temp_file.path())
            .add_env_prefix("FERROSYNC_BUILDER_TEST")
            .build();
        std::env::remove_var("FERROSYNC_BUILDER_TEST__SYNC__INTERVAL_SECS");

        assert_eq!(config.unwrap().sync.interval_secs, 7);
    }

    #[rstest]
    #[case("sync:\n  interval_secs: 0\n", "Sync interval")]
    #[case("verification:\n  buffer_size: 1000\n", "Buffer size")]
    #[case("logging:\n  level: loud\n", "Log level")]
    fn test_builder_validation(#[case] contents: &str, #[case] expected: &str) {
        let temp_file = write_config(".yaml", contents);

        let result = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(temp_file.path())
            .build();

        let message = result.unwrap_err().to_string();
        assert!(message.contains(expected), "unexpected error: {message}");
    }
}
