//! Engine configuration: multi-log routing table and behavior knobs.
//!
//! Loaded from `config.toml` under the store root; every field has a spec
//! default so a missing file yields a fully usable configuration.

use crate::core::error::ScribeError;
use crate::core::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-log definition: where the log lives, how lines are formatted, and
/// which metadata keys every entry must carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Path template; `{docs_dir}` and `{key}` placeholders are expanded
    /// against the project. The `progress` log prefers the project's
    /// `progress_log_path` when set.
    pub path_template: String,
    /// Named line formatter. Only `standard` (the canonical grammar) exists.
    pub template: String,
    pub required_metadata: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path_template: "{docs_dir}/logs/{key}.md".to_string(),
            template: "standard".to_string(),
            required_metadata: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSettings {
    /// Advisory threshold surfaced as a reminder; never auto-enforced.
    pub threshold_entries: u64,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            threshold_entries: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeSettings {
    /// Must stay true: the normalizer never rewrites fenced code.
    pub ignore_code_fences: bool,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            ignore_code_fences: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TocSettings {
    pub marker_start: String,
    pub marker_end: String,
}

impl Default for TocSettings {
    fn default() -> Self {
        Self {
            marker_start: "<!-- TOC:start -->".to_string(),
            marker_end: "<!-- TOC:end -->".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    /// Disable only in tests.
    pub fsync: bool,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self { fsync: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub timeout_seconds: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self { timeout_seconds: 30 }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScribeConfig {
    /// Server-level identity folded into every entry id.
    pub repo_slug: String,
    /// Ordered mapping of log keys to definitions.
    pub logs: BTreeMap<String, LogConfig>,
    pub rotation: RotationSettings,
    pub normalize: NormalizeSettings,
    pub toc: TocSettings,
    pub writer: WriterSettings,
    pub lock: LockSettings,
}

impl Default for ScribeConfig {
    fn default() -> Self {
        Self {
            repo_slug: "scribe".to_string(),
            logs: default_logs(),
            rotation: RotationSettings::default(),
            normalize: NormalizeSettings::default(),
            toc: TocSettings::default(),
            writer: WriterSettings::default(),
            lock: LockSettings::default(),
        }
    }
}

fn default_logs() -> BTreeMap<String, LogConfig> {
    let mut logs = BTreeMap::new();
    logs.insert(
        "progress".to_string(),
        LogConfig {
            path_template: "{docs_dir}/progress/PROGRESS_LOG.md".to_string(),
            template: "standard".to_string(),
            required_metadata: Vec::new(),
        },
    );
    logs.insert(
        "doc_updates".to_string(),
        LogConfig {
            path_template: "{docs_dir}/progress/DOC_UPDATES.md".to_string(),
            template: "standard".to_string(),
            required_metadata: vec![
                "doc".to_string(),
                "section".to_string(),
                "action".to_string(),
            ],
        },
    );
    logs.insert(
        "security".to_string(),
        LogConfig {
            path_template: "{docs_dir}/progress/SECURITY_LOG.md".to_string(),
            template: "standard".to_string(),
            required_metadata: vec!["severity".to_string()],
        },
    );
    logs.insert(
        "bugs".to_string(),
        LogConfig {
            path_template: "{docs_dir}/progress/BUG_LOG.md".to_string(),
            template: "standard".to_string(),
            required_metadata: vec!["status".to_string()],
        },
    );
    logs
}

impl ScribeConfig {
    /// Load from `<store>/config.toml`, falling back to defaults when the
    /// file is absent. Unknown top-level keys and unknown formatters are
    /// configuration errors, not silent defaults.
    pub fn load(store: &Store) -> Result<Self, ScribeError> {
        let path = store.config_path();
        let config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str::<ScribeConfig>(&raw)
                .map_err(|e| ScribeError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            ScribeConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ScribeError> {
        if !self.normalize.ignore_code_fences {
            return Err(ScribeError::Config(
                "normalize.ignore_code_fences must be true".to_string(),
            ));
        }
        for (key, log) in &self.logs {
            if log.template != "standard" {
                return Err(ScribeError::Config(format!(
                    "log '{}' names unknown formatter '{}'",
                    key, log.template
                )));
            }
        }
        Ok(())
    }

    pub fn log(&self, key: &str) -> Result<&LogConfig, ScribeError> {
        self.logs
            .get(key)
            .ok_or_else(|| ScribeError::Config(format!("no log definition for key '{}'", key)))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_cover_the_standard_log_set() {
        let cfg = ScribeConfig::default();
        for key in ["progress", "doc_updates", "security", "bugs"] {
            assert!(cfg.logs.contains_key(key), "missing default log {key}");
        }
        assert_eq!(
            cfg.log("doc_updates").unwrap().required_metadata,
            vec!["doc", "section", "action"]
        );
        assert_eq!(cfg.rotation.threshold_entries, 200);
        assert_eq!(cfg.lock.timeout_seconds, 30);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let tmp = tempdir().unwrap();
        let store = Store::new(tmp.path());
        let cfg = ScribeConfig::load(&store).unwrap();
        assert_eq!(cfg.repo_slug, "scribe");
    }

    #[test]
    fn test_partial_file_overlays_defaults() {
        let tmp = tempdir().unwrap();
        let store = Store::new(tmp.path());
        std::fs::write(
            store.config_path(),
            "repo_slug = \"acme\"\n\n[lock]\ntimeout_seconds = 5\n",
        )
        .unwrap();
        let cfg = ScribeConfig::load(&store).unwrap();
        assert_eq!(cfg.repo_slug, "acme");
        assert_eq!(cfg.lock.timeout_seconds, 5);
        assert!(cfg.logs.contains_key("progress"));
    }

    #[test]
    fn test_unknown_formatter_is_rejected() {
        let tmp = tempdir().unwrap();
        let store = Store::new(tmp.path());
        std::fs::write(
            store.config_path(),
            "[logs.custom]\npath_template = \"{docs_dir}/x.md\"\ntemplate = \"fancy\"\n",
        )
        .unwrap();
        assert!(ScribeConfig::load(&store).is_err());
    }
}
