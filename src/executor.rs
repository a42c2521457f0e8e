use std::rc::Rc;

use rhai::{Dynamic, Engine, EvalAltResult, ParseError};
use thiserror::Error;
use tracing::{error, info};

use crate::config::RuntimeConfig;
use crate::host::HostServices;
use crate::scripts::{build_engine, invocation_scope, ScriptExports, UnloadHook};
use crate::settings::{read_saved_settings, SettingDescriptor};
use crate::userscript::{SettingsMap, Userscript};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("SyntaxError: {0}")]
    Compile(#[from] ParseError),
    #[error("{0}")]
    Runtime(#[from] Box<EvalAltResult>),
    #[error("setting '{key}' rejected its saved value: {source}")]
    Setting {
        key: String,
        #[source]
        source: Box<EvalAltResult>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Failed,
}

/// Runs userscripts on one shared engine.
pub struct Executor {
    engine: Engine,
}

impl Executor {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self { engine: build_engine(config) }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Evaluates the script, keeps what it exports and applies its saved settings.
    ///
    /// Errors never escape: the operator gets an alert naming the script and the record keeps
    /// `has_run == false`.
    pub fn load(&self, script: &mut Userscript, host: &HostServices) -> LoadOutcome {
        match self.try_load(script, host) {
            Ok(()) => {
                info!(script = %script.name, "[cs]{} ran '{}'", script.strict_label(), script.name);
                script.has_run = true;
                LoadOutcome::Loaded
            }
            Err(err) => {
                script.settings.clear();
                host.alerter.alert(&error_alert_text(&script.name, &err));
                error!(script = %script.name, "userscript failed: {err}");
                LoadOutcome::Failed
            }
        }
    }

    /// Calls the unload hook a script exported, if any. Returns whether a hook ran.
    pub fn unload(&self, script: &Userscript) -> Result<bool, LoadError> {
        let Some(hook) = &script.unload else {
            return Ok(false);
        };
        hook.invoke(&self.engine)?;
        Ok(true)
    }

    fn try_load(&self, script: &mut Userscript, host: &HostServices) -> Result<(), LoadError> {
        let ast = Rc::new(self.engine.compile(&script.content)?);
        let mut scope = invocation_scope(&script.name, host.css.clone());
        let exported = self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast)?;

        let exports = ScriptExports::from_value(exported);
        if let Some(callback) = exports.unload {
            script.unload = Some(UnloadHook::new(callback, ast.clone()));
        }
        if let Some(settings) = exports.settings {
            script.settings = settings
                .into_iter()
                .map(|(key, value)| (key.to_string(), SettingDescriptor::new(value, ast.clone())))
                .collect::<SettingsMap>();
        }

        self.apply_saved_settings(script, host)
    }

    fn apply_saved_settings(&self, script: &Userscript, host: &HostServices) -> Result<(), LoadError> {
        if script.settings.is_empty() {
            return Ok(());
        }
        let Some(saved) = read_saved_settings(&script.settings_path) else {
            return Ok(());
        };
        for (key, value) in &saved {
            if !host.validator.is_well_formed(key, &script.settings, &saved) {
                continue;
            }
            let Some(descriptor) = script.settings.get(key) else {
                continue;
            };
            descriptor
                .changed(&self.engine, value)
                .map_err(|source| LoadError::Setting { key: key.clone(), source })?;
        }
        Ok(())
    }
}

pub fn error_alert_text(name: &str, err: &LoadError) -> String {
    format!(
        "Userscript '{name}' had an error:\n\n{err}\n\nPlease fix the error, disable the userscript in the 'tracker.json' file or delete it.\nFeel free to check console for stack trace"
    )
}
