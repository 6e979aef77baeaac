//! Layered configuration.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults;
//! 2. `veil.toml`, `veil.yaml` or `veil.json` in the platform config
//!    directory, or a single file given explicitly;
//! 3. `VEIL_*` environment variables, with `__` separating sections
//!    (`VEIL_DATABASE__PATH`, `VEIL_DEFERRED__MAX_ATTEMPTS`, `VEIL_LOG_LEVEL`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const APPLICATION: &str = "veil";
const ENV_PREFIX: &str = "VEIL_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub deferred: DeferredConfig,
    /// An `EnvFilter` directive, used when `RUST_LOG` is unset.
    pub log_level: String,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
            deferred: DeferredConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = ProjectDirs::from("", "", APPLICATION)
            .map(|dirs| dirs.data_dir().join("veil.db"))
            .unwrap_or_else(|| PathBuf::from("veil.db"));
        Self { path, max_connections: 5, busy_timeout_ms: 5_000 }
    }
}
impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Users recomputed at once after a library sync.
    pub concurrency: usize,
}
impl Default for EngineConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeferredConfig {
    pub max_attempts: u32,
    pub sweep_interval_secs: u64,
}
impl Default for DeferredConfig {
    fn default() -> Self {
        Self { max_attempts: 5, sweep_interval_secs: 60 }
    }
}
impl DeferredConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Config {
    /// Load from the platform config directory and the environment.
    pub fn load() -> Result<Self> {
        Loader::default().load()
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.database.max_connections == 0, "database.max_connections must be at least 1"),
            (self.database.busy_timeout_ms == 0, "database.busy_timeout_ms must be at least 1"),
            (self.database.path.as_os_str().is_empty(), "database.path must not be empty"),
            (self.engine.concurrency == 0, "engine.concurrency must be at least 1"),
            (self.deferred.max_attempts == 0, "deferred.max_attempts must be at least 1"),
            (self.deferred.sweep_interval_secs == 0, "deferred.sweep_interval_secs must be at least 1"),
            (self.log_level.trim().is_empty(), "log_level must not be empty"),
        ];
        if let Some((_, message)) = checks.into_iter().find(|(failed, _)| *failed) {
            exn::bail!(ErrorKind::Validation(message));
        }
        Ok(())
    }
}

/// Where to look for configuration files.
#[derive(Debug, Clone)]
pub struct Loader {
    search_dir: Option<PathBuf>,
    file: Option<PathBuf>,
}
impl Default for Loader {
    fn default() -> Self {
        let search_dir = ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().to_path_buf());
        Self { search_dir, file: None }
    }
}
impl Loader {
    /// Look for `veil.{toml,yaml,json}` in `dir` instead of the platform
    /// config directory.
    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = Some(dir.into());
        self
    }

    /// Read exactly this file, which must exist, instead of searching.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn figment(&self) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = &self.file {
            figment = merge_file(figment, path)?;
        } else if let Some(dir) = &self.search_dir {
            debug!(dir = %dir.display(), "searching for config files");
            // Missing files are skipped by the providers.
            figment = figment
                .merge(Toml::file(dir.join("veil.toml")))
                .merge(Yaml::file(dir.join("veil.yaml")))
                .merge(Json::file(dir.join("veil.json")));
        }
        // `VEIL_CONFIG` names the file itself.
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__")))
    }

    pub fn load(&self) -> Result<Config> {
        let config: Config = self.figment()?.extract().or_raise(|| ErrorKind::Invalid)?;
        config.validate()?;
        debug!(database = %config.database.path.display(), "configuration loaded");
        Ok(config)
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    if !path.is_file() {
        exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
    }
    debug!(path = %path.display(), "reading config file");
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_search_dir_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "veil.toml",
                r#"
                log_level = "debug"

                [database]
                path = "/srv/veil/library.db"
                max_connections = 8

                [engine]
                concurrency = 2
                "#,
            )?;
            jail.set_env("VEIL_ENGINE__CONCURRENCY", "16");
            jail.set_env("VEIL_DEFERRED__MAX_ATTEMPTS", "9");

            let config = Loader::default().search_dir(jail.directory()).load().unwrap();
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.database.path, PathBuf::from("/srv/veil/library.db"));
            assert_eq!(config.database.max_connections, 8);
            assert_eq!(config.database.busy_timeout_ms, 5_000);
            assert_eq!(config.engine.concurrency, 16);
            assert_eq!(config.deferred.max_attempts, 9);
            assert_eq!(config.deferred.sweep_interval(), Duration::from_secs(60));
            Ok(())
        });
    }

    #[test]
    fn test_yaml_in_search_dir() {
        Jail::expect_with(|jail| {
            jail.create_file("veil.yaml", "deferred:\n  sweep_interval_secs: 5\n")?;
            let config = Loader::default().search_dir(jail.directory()).load().unwrap();
            assert_eq!(config.deferred.sweep_interval_secs, 5);
            Ok(())
        });
    }

    #[rstest]
    #[case("veil.toml", "[database]\nbusy_timeout_ms = 250\n")]
    #[case("veil.yml", "database:\n  busy_timeout_ms: 250\n")]
    #[case("veil.json", r#"{"database": {"busy_timeout_ms": 250}}"#)]
    fn test_explicit_file(#[case] name: &str, #[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let config = Loader::default().file(jail.directory().join(name)).load().unwrap();
            assert_eq!(config.database.busy_timeout(), Duration::from_millis(250));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_skips_search_dir() {
        Jail::expect_with(|jail| {
            jail.create_file("veil.toml", "log_level = \"trace\"\n")?;
            jail.create_dir("other")?;
            jail.create_file("other/custom.toml", "log_level = \"warn\"\n")?;
            let config = Loader::default()
                .search_dir(jail.directory())
                .file(jail.directory().join("other/custom.toml"))
                .load()
                .unwrap();
            assert_eq!(config.log_level, "warn");
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_must_exist() {
        Jail::expect_with(|jail| {
            let err = Loader::default().file(jail.directory().join("missing.toml")).load().unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("veil.ini", "log_level = debug")?;
            let err = Loader::default().file(jail.directory().join("veil.ini")).load().unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("veil.toml", "[engine]\nthreads = 3\n")?;
            let err = Loader::default().search_dir(jail.directory()).load().unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid));
            Ok(())
        });
    }

    #[rstest]
    #[case("VEIL_DATABASE__MAX_CONNECTIONS", "database.max_connections")]
    #[case("VEIL_DATABASE__BUSY_TIMEOUT_MS", "database.busy_timeout_ms")]
    #[case("VEIL_ENGINE__CONCURRENCY", "engine.concurrency")]
    #[case("VEIL_DEFERRED__MAX_ATTEMPTS", "deferred.max_attempts")]
    #[case("VEIL_DEFERRED__SWEEP_INTERVAL_SECS", "deferred.sweep_interval_secs")]
    fn test_zero_values_are_rejected(#[case] variable: &str, #[case] field: &str) {
        Jail::expect_with(|jail| {
            jail.set_env(variable, "0");
            let err = Loader::default().search_dir(jail.directory()).load().unwrap_err();
            let ErrorKind::Validation(message) = &*err else {
                panic!("expected a validation error, got {err:?}");
            };
            assert!(message.starts_with(field), "{message}");
            Ok(())
        });
    }
}
