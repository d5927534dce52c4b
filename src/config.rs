//! Project configuration: `ccaudit.toml` plus the in-memory `Settings` that
//! every other component reads from.
//!
//! A TOML document with every field defaulted, so an empty file is a valid,
//! inert config.

use crate::error::{AnalysisError, Result};
use crate::types::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn default_max_configs() -> usize {
    12
}

fn default_severities() -> Vec<Severity> {
    vec![
        Severity::Error,
        Severity::Warning,
        Severity::Style,
        Severity::Performance,
        Severity::Portability,
        Severity::Information,
    ]
}

fn default_template() -> String {
    "{file}:{line}:{column}: {severity}: {message} [{id}]".to_string()
}

/// Engine-wide settings, loadable from a TOML project file and overridable
/// by CLI flags (the CLI driver applies overrides after [`Settings::load`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cap on the number of preprocessor configurations analyzed per file
    /// before `toomanyconfigs` fires (spec §4.4 step 3).
    #[serde(rename = "max-configs", default = "default_max_configs")]
    pub max_configs: usize,

    /// When set, analysis of exactly this configuration is forced and
    /// `enumerate_configs` is bypassed (spec §4.1).
    #[serde(rename = "force-config")]
    pub force_config: Option<String>,

    /// Wall-clock budget in seconds for the checker loop of a single file
    /// (spec §4.3 `checks_max_time`, §5 timeouts).
    #[serde(rename = "checks-max-time-seconds")]
    pub checks_max_time_seconds: Option<u64>,

    /// Escalates suppressed critical-id findings per spec §4.7 step 4.
    #[serde(default)]
    pub safety: bool,

    /// Disables the sink's deduplication-on-rendered-text step (spec §3.3
    /// invariant 2, §8 dedup property).
    #[serde(rename = "emit-duplicates", default)]
    pub emit_duplicates: bool,

    /// Incremental build directory enabling the Analyzer-Info Store (F).
    #[serde(rename = "build-dir")]
    pub build_dir: Option<PathBuf>,

    /// Result-cache directory enabling the Result Cache (G).
    #[serde(rename = "cache-dir")]
    pub cache_dir: Option<PathBuf>,

    #[serde(rename = "enabled-severities", default = "default_severities")]
    pub enabled_severities: Vec<Severity>,

    /// User `NAME=value` preprocessor defines, folded into the fingerprint.
    #[serde(default)]
    pub defines: BTreeMap<String, String>,

    /// Suppression files (line-form `.txt` or XML-form `.xml`), spec §6.
    #[serde(rename = "suppression-files", default)]
    pub suppression_files: Vec<PathBuf>,

    /// Auxiliary list consulted at sink step 8 (spec §4.7).
    #[serde(rename = "nofail-suppression-file")]
    pub nofail_suppression_file: Option<PathBuf>,

    #[serde(default = "default_template")]
    pub template: String,

    /// Worker thread count for the executor (spec §5). 0 means "auto".
    #[serde(default)]
    pub jobs: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_configs: default_max_configs(),
            force_config: None,
            checks_max_time_seconds: None,
            safety: false,
            emit_duplicates: false,
            build_dir: None,
            cache_dir: None,
            enabled_severities: default_severities(),
            defines: BTreeMap::new(),
            suppression_files: Vec::new(),
            nofail_suppression_file: None,
            template: default_template(),
            jobs: 0,
        }
    }
}

impl Settings {
    /// Loads from a TOML file. A missing or malformed file is an error;
    /// callers that want a silent fallback to defaults should check
    /// existence themselves before calling this.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(AnalysisError::Io)?;
        toml::from_str(&text).map_err(|e| AnalysisError::Config(format!("{}: {e}", path.display())))
    }

    pub fn is_severity_enabled(&self, severity: Severity) -> bool {
        self.enabled_severities.contains(&severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_valid() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.max_configs, 12);
        assert!(!settings.safety);
    }

    #[test]
    fn overrides_round_trip() {
        let toml_text = r#"
            max-configs = 4
            safety = true
            emit-duplicates = true
        "#;
        let settings: Settings = toml::from_str(toml_text).unwrap();
        assert_eq!(settings.max_configs, 4);
        assert!(settings.safety);
        assert!(settings.emit_duplicates);
    }

    #[test]
    fn default_severities_exclude_debug_and_internal() {
        let settings = Settings::default();
        assert!(!settings.is_severity_enabled(Severity::Debug));
        assert!(!settings.is_severity_enabled(Severity::Internal));
        assert!(settings.is_severity_enabled(Severity::Error));
    }
}
