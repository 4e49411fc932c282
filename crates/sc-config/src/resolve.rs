//! Configuration resolution.
//!
//! Order: explicit `--config` path → `SENSOR_CLEAN_CONFIG` → XDG config dir
//! → built-in defaults. Relative directories inside a config file resolve
//! against the file's own directory.

use crate::pipeline::PipelineConfig;
use crate::validate::{ValidationError, ValidationResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file.
pub const ENV_CONFIG: &str = "SENSOR_CLEAN_CONFIG";

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "SENSOR_CLEAN_DATA";

const DIR_NAME: &str = "sensor_clean";
const CONFIG_FILE: &str = "config.toml";

/// Paths supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub config_file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigSource {
    Explicit(PathBuf),
    Env(PathBuf),
    Xdg(PathBuf),
    Defaults,
}

/// Validated configuration plus provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: PipelineConfig,
    pub source: ConfigSource,
}

/// Resolve against the process environment.
pub fn resolve_config(paths: &ConfigPaths) -> ValidationResult<ResolvedConfig> {
    resolve_config_with(paths, |key| std::env::var(key).ok())
}

/// Resolve with an injectable environment lookup.
pub fn resolve_config_with<F>(paths: &ConfigPaths, env: F) -> ValidationResult<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let (mut config, source) = if let Some(path) = &paths.config_file {
        (load_required(path)?, ConfigSource::Explicit(path.clone()))
    } else if let Some(path) = env(ENV_CONFIG).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(path);
        (load_required(&path)?, ConfigSource::Env(path))
    } else {
        match xdg_config_file(&env).filter(|p| p.exists()) {
            Some(path) => (load_required(&path)?, ConfigSource::Xdg(path)),
            None => (PipelineConfig::default(), ConfigSource::Defaults),
        }
    };

    if let Some(dir) = &paths.data_dir {
        config.data_dir = dir.clone();
    } else if let Some(dir) = env(ENV_DATA_DIR).filter(|d| !d.is_empty()) {
        config.data_dir = PathBuf::from(dir);
    }

    config.validate()?;
    Ok(ResolvedConfig { config, source })
}

fn load_required(path: &Path) -> ValidationResult<PipelineConfig> {
    let config = PipelineConfig::from_file(path)?;
    let base = path.parent().filter(|p| !p.as_os_str().is_empty());
    Ok(match base {
        Some(base) => config.rebased(base),
        None => config,
    })
}

fn xdg_config_file<F>(env: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(xdg) = env("XDG_CONFIG_HOME").filter(|x| !x.is_empty()) {
        return Some(PathBuf::from(xdg).join(DIR_NAME).join(CONFIG_FILE));
    }
    dirs::config_dir().map(|base| base.join(DIR_NAME).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn no_sources_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let env = env_of(&[("XDG_CONFIG_HOME", tmp.path().display().to_string())]);
        let resolved = resolve_config_with(&ConfigPaths::default(), env).unwrap();
        assert_eq!(resolved.source, ConfigSource::Defaults);
        assert_eq!(resolved.config, PipelineConfig::default());
    }

    #[test]
    fn explicit_file_wins_and_rebases() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("site.toml");
        std::fs::write(&path, "source_dir = \"incoming\"\n").unwrap();
        let env = env_of(&[(ENV_CONFIG, "/nonexistent.toml".to_string())]);
        let paths = ConfigPaths {
            config_file: Some(path.clone()),
            data_dir: None,
        };
        let resolved = resolve_config_with(&paths, env).unwrap();
        assert_eq!(resolved.source, ConfigSource::Explicit(path));
        assert_eq!(resolved.config.source_dir, tmp.path().join("incoming"));
    }

    #[test]
    fn env_config_used_when_no_flag() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cfg.json");
        std::fs::write(&path, r#"{"source_prefix": "farm_"}"#).unwrap();
        let env = env_of(&[(ENV_CONFIG, path.display().to_string())]);
        let resolved = resolve_config_with(&ConfigPaths::default(), env).unwrap();
        assert_eq!(resolved.config.source_prefix, "farm_");
        assert_eq!(resolved.source, ConfigSource::Env(path));
    }

    #[test]
    fn xdg_file_is_discovered() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(DIR_NAME);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE), "imputation_window = \"last_1d\"\n").unwrap();
        let env = env_of(&[("XDG_CONFIG_HOME", tmp.path().display().to_string())]);
        let resolved = resolve_config_with(&ConfigPaths::default(), env).unwrap();
        assert!(matches!(resolved.source, ConfigSource::Xdg(_)));
        assert_eq!(
            resolved.config.imputation_window,
            sc_common::WindowLabel::Last1d
        );
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let paths = ConfigPaths {
            config_file: Some(PathBuf::from("/definitely/not/here.toml")),
            data_dir: None,
        };
        let err = resolve_config_with(&paths, |_| None).unwrap_err();
        assert!(matches!(err, ValidationError::Io { .. }));
    }

    #[test]
    fn data_dir_flag_overrides_env() {
        let tmp = TempDir::new().unwrap();
        let env = env_of(&[
            ("XDG_CONFIG_HOME", tmp.path().display().to_string()),
            (ENV_DATA_DIR, "/from/env".to_string()),
        ]);
        let paths = ConfigPaths {
            config_file: None,
            data_dir: Some(PathBuf::from("/from/flag")),
        };
        let resolved = resolve_config_with(&paths, env).unwrap();
        assert_eq!(resolved.config.data_dir, PathBuf::from("/from/flag"));
    }

    #[test]
    fn invalid_file_fails_validation() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "source_prefix = \"\"\n").unwrap();
        let paths = ConfigPaths {
            config_file: Some(path),
            data_dir: None,
        };
        let err = resolve_config_with(&paths, |_| None).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyPrefix));
    }
}
