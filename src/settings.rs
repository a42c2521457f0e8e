use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use indexmap::IndexMap;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Map, AST};
use serde_json::Value;
use tracing::debug;

use crate::userscript::SettingsMap;

pub type SavedSettings = IndexMap<String, Value>;

/// A setting a script exposes through its `settings` map. Everything except `changed` is owned by
/// the script; `type`, `min`, `max` and `opts` are read only for validation.
#[derive(Clone)]
pub struct SettingDescriptor {
    fields: Map,
    ast: Rc<AST>,
}

impl SettingDescriptor {
    pub fn new(value: Dynamic, ast: Rc<AST>) -> Self {
        let fields = value.flatten().try_cast::<Map>().unwrap_or_default();
        Self { fields, ast }
    }

    pub fn field(&self, key: &str) -> Option<&Dynamic> {
        self.fields.get(key)
    }

    pub fn changed_fn(&self) -> Option<FnPtr> {
        self.field("changed").and_then(|value| value.clone().flatten().try_cast::<FnPtr>())
    }

    pub fn kind(&self) -> Option<String> {
        self.field("type").and_then(|value| value.clone().flatten().into_string().ok())
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        let value = self.field(key)?.clone().flatten();
        value.as_float().ok().or_else(|| value.as_int().ok().map(|int| int as f64))
    }

    pub fn options(&self) -> Vec<Value> {
        let Some(opts) = self.field("opts") else {
            return Vec::new();
        };
        opts.clone()
            .flatten()
            .into_array()
            .unwrap_or_default()
            .iter()
            .filter_map(|opt| rhai::serde::from_dynamic::<Value>(opt).ok())
            .collect()
    }

    /// Calls the script's `changed` callback with a saved value.
    pub fn changed(&self, engine: &Engine, value: &Value) -> Result<(), Box<EvalAltResult>> {
        let callback = self.changed_fn().ok_or_else(|| Box::<EvalAltResult>::from("setting has no 'changed' callback"))?;
        let arg = rhai::serde::to_dynamic(value)?;
        let _ = callback.call::<Dynamic>(engine, &self.ast, (arg,))?;
        Ok(())
    }
}

impl fmt::Debug for SettingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingDescriptor")
            .field("type", &self.kind())
            .field("changed", &self.changed_fn().is_some())
            .finish()
    }
}

/// Decides whether a saved value may be handed to a setting's `changed` callback.
pub trait SettingValidator {
    fn is_well_formed(&self, key: &str, settings: &SettingsMap, saved: &SavedSettings) -> bool;
}

/// Accepts a saved value when the setting exists, can be notified, and the value fits the declared
/// `type` (`bool`, `num` with optional `min`/`max`, `sel` with `opts`, `text`, `color`).
/// Settings without a `type` accept any value.
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptorValidator;

impl SettingValidator for DescriptorValidator {
    fn is_well_formed(&self, key: &str, settings: &SettingsMap, saved: &SavedSettings) -> bool {
        let (Some(descriptor), Some(value)) = (settings.get(key), saved.get(key)) else {
            return false;
        };
        if descriptor.changed_fn().is_none() {
            return false;
        }
        match descriptor.kind().as_deref() {
            None => true,
            Some("bool") => value.is_boolean(),
            Some("num") => match value.as_f64() {
                Some(number) => {
                    descriptor.number("min").map_or(true, |min| number >= min)
                        && descriptor.number("max").map_or(true, |max| number <= max)
                }
                None => false,
            },
            Some("sel") => value.is_string() && descriptor.options().contains(value),
            Some("text") | Some("color") => value.is_string(),
            Some(_) => false,
        }
    }
}

/// Reads a script's saved settings. A missing, unreadable or corrupt file counts as "nothing saved".
pub fn read_saved_settings(path: &Path) -> Option<SavedSettings> {
    if !path.exists() {
        return None;
    }
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            debug!(path = %path.display(), "ignoring unreadable settings file: {err}");
            return None;
        }
    };
    match serde_json::from_str::<SavedSettings>(&text) {
        Ok(saved) => Some(saved),
        Err(err) => {
            debug!(path = %path.display(), "ignoring corrupt settings file: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptors(script: &str) -> SettingsMap {
        let engine = Engine::new();
        let ast = Rc::new(engine.compile(script).expect("compile settings script"));
        let map = engine.eval_ast::<Map>(&ast).expect("settings map");
        map.into_iter().map(|(key, value)| (key.to_string(), SettingDescriptor::new(value, ast.clone()))).collect()
    }

    fn saved(value: Value) -> SavedSettings {
        serde_json::from_value(value).expect("saved settings object")
    }

    #[test]
    fn validator_checks_declared_types() {
        let settings = descriptors(
            r#"
                #{
                    fov: #{ "type": "num", min: 60, max: 120, changed: |v| v },
                    mode: #{ "type": "sel", opts: ["fast", "slow"], changed: |v| v },
                    enabled: #{ "type": "bool", changed: |v| v },
                    anything: #{ changed: |v| v },
                    silent: #{ "type": "bool" },
                }
            "#,
        );
        let ok = saved(json!({ "fov": 90, "mode": "slow", "enabled": true, "anything": [1, 2], "silent": true }));
        let validator = DescriptorValidator;
        assert!(validator.is_well_formed("fov", &settings, &ok));
        assert!(validator.is_well_formed("mode", &settings, &ok));
        assert!(validator.is_well_formed("enabled", &settings, &ok));
        assert!(validator.is_well_formed("anything", &settings, &ok));
        assert!(!validator.is_well_formed("silent", &settings, &ok), "settings without changed are skipped");
        assert!(!validator.is_well_formed("unknown", &settings, &saved(json!({ "unknown": 1 }))));

        let bad = saved(json!({ "fov": 200, "mode": "medium", "enabled": "yes" }));
        assert!(!validator.is_well_formed("fov", &settings, &bad));
        assert!(!validator.is_well_formed("mode", &settings, &bad));
        assert!(!validator.is_well_formed("enabled", &settings, &bad));
    }

    #[test]
    fn corrupt_settings_file_reads_as_absent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").expect("write settings");
        assert!(read_saved_settings(&path).is_none());
        assert!(read_saved_settings(&dir.path().join("missing.json")).is_none());
    }

    #[test]
    fn saved_settings_keep_file_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("ordered.json");
        fs::write(&path, r#"{ "zeta": 1, "alpha": 2 }"#).expect("write settings");
        let saved = read_saved_settings(&path).expect("settings parse");
        assert_eq!(saved.keys().collect::<Vec<_>>(), ["zeta", "alpha"]);
    }
}
