//! Runtime configuration: a small struct with defaults, overridable by an
//! optional `xlpatch.yaml` file and then by `XLPATCH_*` environment
//! variables. Grounded on the teacher's `ServerConfig`/`PartialConfig`
//! file-then-env merge in `crates/spreadsheet-kit/src/config.rs` — the
//! teacher parses its config file as YAML or JSON, so this reuses the
//! `serde_yaml` the rest of the crate already depends on rather than
//! adding a format the pack never reaches for.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub default_recalc_mode: String,
    pub default_backup: bool,
    pub lock_wait: Duration,
    pub policy_search_path: Option<String>,
    pub server_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_recalc_mode: "none".to_string(),
            default_backup: false,
            lock_wait: Duration::from_secs(10),
            policy_search_path: None,
            server_cache_capacity: 8,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    recalc_mode: Option<String>,
    backup: Option<bool>,
    lock_wait_secs: Option<u64>,
    policy_path: Option<String>,
    cache_capacity: Option<usize>,
}

fn read_config_file(path: &Path) -> Option<PartialConfig> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&text).ok()
}

impl Config {
    /// Starts from defaults, merges in `./xlpatch.yaml` if present, then
    /// applies `XLPATCH_*` environment overrides.
    pub fn load() -> Self {
        Config::load_from(Path::new("."))
    }

    /// Same as `load`, but reads `xlpatch.yaml` from `directory` rather than
    /// the process's current directory — split out so tests don't depend on
    /// cwd.
    pub fn load_from(directory: &Path) -> Self {
        let mut cfg = Config::default();

        if let Some(file) = read_config_file(&directory.join("xlpatch.yaml")) {
            if let Some(v) = file.recalc_mode {
                cfg.default_recalc_mode = v;
            }
            if let Some(v) = file.backup {
                cfg.default_backup = v;
            }
            if let Some(v) = file.lock_wait_secs {
                cfg.lock_wait = Duration::from_secs(v);
            }
            if let Some(v) = file.policy_path {
                cfg.policy_search_path = Some(v);
            }
            if let Some(v) = file.cache_capacity {
                cfg.server_cache_capacity = v;
            }
        }

        if let Ok(v) = std::env::var("XLPATCH_RECALC_MODE") {
            cfg.default_recalc_mode = v;
        }
        if let Ok(v) = std::env::var("XLPATCH_BACKUP") {
            cfg.default_backup = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("XLPATCH_LOCK_WAIT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                cfg.lock_wait = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("XLPATCH_POLICY_PATH") {
            cfg.policy_search_path = Some(v);
        }
        if let Ok(v) = std::env::var("XLPATCH_CACHE_CAPACITY") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.server_cache_capacity = n;
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.default_recalc_mode, "none");
        assert!(!cfg.default_backup);
        assert_eq!(cfg.lock_wait, Duration::from_secs(10));
    }

    #[test]
    fn xlpatch_yaml_is_merged_under_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("xlpatch.yaml"), "backup: true\ncache_capacity: 3\n").unwrap();

        let cfg = Config::load_from(dir.path());
        assert!(cfg.default_backup, "file value applies when env is silent");
        assert_eq!(cfg.server_cache_capacity, 3);
    }

    #[test]
    fn missing_xlpatch_yaml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(dir.path());
        assert_eq!(cfg.server_cache_capacity, 8);
    }
}
