//! `tint.toml` configuration.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, error};

pub const CONFIG_FILE_NAME: &str = "tint.toml";
pub const CONFIG_ENV: &str = "TINT_CONFIG";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub log: LogConfig,
    pub hooks: HookConfig,
    pub effects: EffectConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive, for example `info` or `tint=debug`.
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HookConfig {
    pub d3d9: bool,
    pub d3d11: bool,
    pub vulkan: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            d3d9: true,
            d3d11: true,
            vulkan: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EffectConfig {
    pub search_paths: Vec<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    /// Upper bound of compile workers. `0` uses every available core.
    pub max_compile_threads: usize,
    /// `NAME=VALUE` pairs passed to the effect preprocessor.
    pub preprocessor_definitions: Vec<String>,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            search_paths: vec![PathBuf::from("effects")],
            cache_dir: None,
            max_compile_threads: 0,
            preprocessor_definitions: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        toml::from_str(source).context("invalid tint configuration")
    }

    /// Reads the file named by `TINT_CONFIG`, or `tint.toml` in `module_dir`.
    ///
    /// A missing file yields the defaults. So does an unreadable or invalid one, after logging the error.
    pub fn load(module_dir: Option<&Path>) -> Self {
        let path = match env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => match module_dir {
                Some(dir) => dir.join(CONFIG_FILE_NAME),
                None => PathBuf::from(CONFIG_FILE_NAME),
            },
        };

        match Self::load_file(&path) {
            Ok(Some(config)) => {
                debug!("configuration loaded from {}", path.display());
                config
            }
            Ok(None) => {
                debug!("no configuration at {}, using defaults", path.display());
                Self::default()
            }
            Err(err) => {
                error!("failed to load {}. err: {err:?}", path.display());
                Self::default()
            }
        }
    }

    fn load_file(path: &Path) -> anyhow::Result<Option<Self>> {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).context("cannot read configuration file"),
        };

        Self::from_toml_str(&source).map(Some)
    }

    /// Compile worker count for a machine with `available` cores.
    pub fn compile_threads(&self, available: usize) -> usize {
        self.effects.compile_threads(available)
    }
}

impl EffectConfig {
    pub fn compile_threads(&self, available: usize) -> usize {
        match self.max_compile_threads {
            0 => available.max(1),
            max => max.min(available).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [hooks]
            d3d9 = false

            [effects]
            max_compile_threads = 2
            preprocessor_definitions = ["QUALITY=1"]
            "#,
        )
        .unwrap();

        assert!(!config.hooks.d3d9);
        assert!(config.hooks.d3d11);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.effects.preprocessor_definitions, ["QUALITY=1"]);
        assert_eq!(config.compile_threads(8), 2);
        assert_eq!(config.compile_threads(1), 1);
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(Config::from_toml_str("[hooks]\nopengl = true\n").is_err());
    }

    #[test]
    fn missing_and_invalid_files_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_file(&dir.path().join(CONFIG_FILE_NAME)).unwrap().is_none());

        fs::write(dir.path().join(CONFIG_FILE_NAME), "log = 3").unwrap();
        assert!(Config::load_file(&dir.path().join(CONFIG_FILE_NAME)).is_err());
    }
}
