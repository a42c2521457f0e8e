use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::ipc::BootstrapPaths;

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "RuntimeConfig::default_script_extension")]
    pub script_extension: String,
    #[serde(default = "RuntimeConfig::default_tracker_file")]
    pub tracker_file: String,
    #[serde(default = "RuntimeConfig::default_settings_extension")]
    pub settings_extension: String,
    /// Engine operation budget per call. Unlimited unless set; a script that never returns blocks the host.
    #[serde(default)]
    pub max_operations: Option<u64>,
    #[serde(default)]
    pub max_call_levels: Option<usize>,
    /// Paths to bootstrap with when the host does not send them.
    #[serde(default)]
    pub bootstrap: Option<BootstrapPaths>,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigOverrides {
    pub bootstrap: Option<BootstrapPaths>,
    pub script_extension: Option<String>,
}

impl RuntimeConfig {
    fn default_script_extension() -> String {
        "rhai".to_string()
    }

    fn default_tracker_file() -> String {
        "tracker.json".to_string()
    }

    fn default_settings_extension() -> String {
        "json".to_string()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &RuntimeConfigOverrides) {
        if let Some(bootstrap) = &overrides.bootstrap {
            self.bootstrap = Some(bootstrap.clone());
        }
        if let Some(extension) = &overrides.script_extension {
            self.script_extension = extension.clone();
        }
    }

    /// File-name suffix that marks a script, dot included.
    pub fn script_suffix(&self) -> String {
        format!(".{}", self.script_extension.trim_start_matches('.'))
    }

    /// Name of the settings file that belongs to a script file.
    pub fn settings_file_name(&self, script_name: &str) -> String {
        let stem = script_name.strip_suffix(&self.script_suffix()).unwrap_or(script_name);
        format!("{stem}.{}", self.settings_extension.trim_start_matches('.'))
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            script_extension: Self::default_script_extension(),
            tracker_file: Self::default_tracker_file(),
            settings_extension: Self::default_settings_extension(),
            max_operations: None,
            max_call_levels: None,
            bootstrap: None,
        }
    }
}

impl RuntimeConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.bootstrap.is_none() && self.script_extension.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.bootstrap.is_some() {
            fields.push("bootstrap");
        }
        if self.script_extension.is_some() {
            fields.push("script_extension");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_fields_use_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str(r#"{ "max_operations": 50000 }"#).expect("parse config");
        assert_eq!(cfg.script_extension, "rhai");
        assert_eq!(cfg.tracker_file, "tracker.json");
        assert_eq!(cfg.max_operations, Some(50_000));
        assert!(cfg.bootstrap.is_none());
    }

    #[test]
    fn bootstrap_paths_use_host_field_names() {
        let cfg: RuntimeConfig = serde_json::from_str(
            r#"{ "bootstrap": { "userscriptsPath": "/data/scripts", "userscriptPrefsPath": "/data/prefs" } }"#,
        )
        .expect("parse config");
        let bootstrap = cfg.bootstrap.expect("bootstrap paths");
        assert_eq!(bootstrap.userscripts_path, PathBuf::from("/data/scripts"));
        assert_eq!(bootstrap.userscript_prefs_path, PathBuf::from("/data/prefs"));
    }

    #[test]
    fn settings_file_replaces_script_extension() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.settings_file_name("zoom.rhai"), "zoom.json");
        assert_eq!(cfg.settings_file_name("my.rhai.rhai"), "my.rhai.json");
        assert_eq!(cfg.script_suffix(), ".rhai");
    }

    #[test]
    fn overrides_replace_fields() {
        let mut cfg = RuntimeConfig::default();
        let overrides = RuntimeConfigOverrides { bootstrap: None, script_extension: Some("js".into()) };
        assert_eq!(overrides.applied_fields(), ["script_extension"]);
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.script_suffix(), ".js");
        assert_eq!(cfg.settings_file_name("aim.js"), "aim.json");
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let cfg = RuntimeConfig::load_or_default("/definitely/not/here.json");
        assert_eq!(cfg.script_extension, "rhai");
    }
}
