//! Configuration for the `reqtrack` binary.
//!
//! Settings come from, in decreasing priority: command-line flags, the
//! `REQTRACK_STORE` / `REQTRACK_ACTOR` environment variables, a TOML file,
//! and built-in defaults.
//!
//! # Example
//!
//! ```toml
//! store = "reqtrack-data.json"
//! actor = "clerk@school.example"
//!
//! [log]
//! filter = "info"
//!
//! [allocation]
//! max_attempts = 5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "reqtrack.toml";
pub const DEFAULT_STORE: &str = "reqtrack-data.json";
pub const DEFAULT_LOG_FILTER: &str = "warn";
pub const STORE_ENV: &str = "REQTRACK_STORE";
pub const ACTOR_ENV: &str = "REQTRACK_ACTOR";

// ── Types ─────────────────────────────────────────────────────────────────────

/// Contents of `reqtrack.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub store: Option<PathBuf>,
    pub actor: Option<String>,
    #[serde(default)]
    pub log: LogSection,
    #[serde(default)]
    pub allocation: AllocationSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// An `EnvFilter` directive such as `info` or `reqtrack_executor=debug`.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationSection {
    pub max_attempts: Option<u32>,
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub store: Option<PathBuf>,
    pub actor: Option<String>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub store: PathBuf,
    pub actor: String,
    pub log_filter: String,
    pub max_attempts: u32,
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Read and parse a config file.
pub fn read_config(path: &Path) -> Result<FileConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

/// Resolve settings from flags, the process environment and the config file.
///
/// An explicit `--config` must exist; the default `reqtrack.toml` is read
/// only when present.
pub fn load(overrides: &Overrides) -> Result<Settings, String> {
    let file = match &overrides.config {
        Some(path) => read_config(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                read_config(default)?
            } else {
                FileConfig::default()
            }
        }
    };
    resolve(overrides, |key| std::env::var(key).ok(), file)
}

/// Merge the layers. `env` looks up one variable; blank values count as unset.
pub fn resolve(
    overrides: &Overrides,
    env: impl Fn(&str) -> Option<String>,
    file: FileConfig,
) -> Result<Settings, String> {
    let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    let store = overrides
        .store
        .clone()
        .or_else(|| env(STORE_ENV).map(PathBuf::from))
        .or(file.store)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE));
    let actor = overrides
        .actor
        .clone()
        .or_else(|| env(ACTOR_ENV))
        .or(file.actor)
        .unwrap_or_default();
    let max_attempts = file.allocation.max_attempts.unwrap_or(5);
    if max_attempts == 0 {
        return Err("allocation.max_attempts must be at least 1".to_string());
    }

    Ok(Settings {
        store,
        actor,
        log_filter: file
            .log
            .filter
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        max_attempts,
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_without_any_source() {
        let settings = resolve(&Overrides::default(), no_env, FileConfig::default()).unwrap();
        assert_eq!(settings.store, PathBuf::from("reqtrack-data.json"));
        assert_eq!(settings.actor, "");
        assert_eq!(settings.log_filter, "warn");
        assert_eq!(settings.max_attempts, 5);
    }

    #[test]
    fn flag_beats_env_beats_file() {
        let file: FileConfig = toml::from_str(
            r#"
            store = "file.json"
            actor = "file@school.example"
            [log]
            filter = "debug"
            [allocation]
            max_attempts = 2
            "#,
        )
        .unwrap();
        let env = |key: &str| match key {
            STORE_ENV => Some("env.json".to_string()),
            ACTOR_ENV => Some("env@school.example".to_string()),
            _ => None,
        };

        let from_env = resolve(&Overrides::default(), env, file.clone()).unwrap();
        assert_eq!(from_env.store, PathBuf::from("env.json"));
        assert_eq!(from_env.actor, "env@school.example");
        assert_eq!(from_env.log_filter, "debug");
        assert_eq!(from_env.max_attempts, 2);

        let flags = Overrides {
            config: None,
            store: Some(PathBuf::from("flag.json")),
            actor: Some("guest".to_string()),
        };
        let from_flags = resolve(&flags, env, file.clone()).unwrap();
        assert_eq!(from_flags.store, PathBuf::from("flag.json"));
        assert_eq!(from_flags.actor, "guest");

        let from_file = resolve(&Overrides::default(), no_env, file).unwrap();
        assert_eq!(from_file.store, PathBuf::from("file.json"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let env = |_: &str| Some("  ".to_string());
        let settings = resolve(&Overrides::default(), env, FileConfig::default()).unwrap();
        assert_eq!(settings.store, PathBuf::from("reqtrack-data.json"));
    }

    #[test]
    fn unknown_keys_and_zero_attempts_are_rejected() {
        assert!(toml::from_str::<FileConfig>("colour = \"blue\"").is_err());

        let file: FileConfig = toml::from_str("[allocation]\nmax_attempts = 0").unwrap();
        assert!(resolve(&Overrides::default(), no_env, file).is_err());
    }

    #[test]
    fn read_config_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reqtrack.toml");
        std::fs::write(&path, "store = [").unwrap();
        let err = read_config(&path).unwrap_err();
        assert!(err.contains("reqtrack.toml"));
    }
}
