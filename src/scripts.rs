use std::rc::Rc;

use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Map, Scope, AST};
use tracing::{debug, error, info, warn};

use crate::config::RuntimeConfig;
use crate::host::CssToggle;

pub const CONSOLE_VAR: &str = "console";
pub const CSS_VAR: &str = "css";
pub const UNLOAD_VAR: &str = "unload";
pub const SETTINGS_VAR: &str = "settings";

/// Restricted logging facade handed to scripts as `console`.
#[derive(Clone)]
pub struct ScriptConsole {
    script: Rc<str>,
}

impl ScriptConsole {
    pub fn new(script: &str) -> Self {
        Self { script: Rc::from(script) }
    }

    fn log(&mut self, message: Dynamic) {
        info!(target: "userscript", script = %self.script, "{message}");
    }

    fn warn(&mut self, message: Dynamic) {
        warn!(target: "userscript", script = %self.script, "{message}");
    }

    fn error(&mut self, message: Dynamic) {
        error!(target: "userscript", script = %self.script, "{message}");
    }

    fn trace(&mut self, message: Dynamic) {
        debug!(target: "userscript", script = %self.script, "{message}");
    }
}

/// Stylesheet facade handed to scripts as `css`.
#[derive(Clone)]
pub struct CssHandle {
    toggle: Rc<dyn CssToggle>,
}

impl CssHandle {
    pub fn new(toggle: Rc<dyn CssToggle>) -> Self {
        Self { toggle }
    }

    fn set(&mut self, identifier: &str, css: &str, enabled: bool) -> bool {
        self.toggle.toggle(identifier, css, Some(enabled))
    }

    fn flip(&mut self, identifier: &str, css: &str) -> bool {
        self.toggle.toggle(identifier, css, None)
    }
}

/// Deactivation callback a script returned as `unload`.
#[derive(Clone)]
pub struct UnloadHook {
    callback: FnPtr,
    ast: Rc<AST>,
}

impl UnloadHook {
    pub fn new(callback: FnPtr, ast: Rc<AST>) -> Self {
        Self { callback, ast }
    }

    pub fn fn_name(&self) -> &str {
        self.callback.fn_name()
    }

    pub fn invoke(&self, engine: &Engine) -> Result<(), Box<EvalAltResult>> {
        let _ = self.callback.call::<Dynamic>(engine, &self.ast, ())?;
        Ok(())
    }
}

/// What a script handed back from its top-level evaluation.
#[derive(Default)]
pub struct ScriptExports {
    pub unload: Option<FnPtr>,
    pub settings: Option<Map>,
}

impl ScriptExports {
    /// Picks `unload` and `settings` out of an object map; anything else exports nothing.
    pub fn from_value(value: Dynamic) -> Self {
        let Some(map) = value.flatten().try_cast::<Map>() else {
            return Self::default();
        };
        let unload = map.get(UNLOAD_VAR).and_then(|value| value.clone().flatten().try_cast::<FnPtr>());
        let settings = map.get(SETTINGS_VAR).and_then(|value| value.clone().flatten().try_cast::<Map>());
        Self { unload, settings }
    }
}

pub fn build_engine(config: &RuntimeConfig) -> Engine {
    let mut engine = Engine::new();
    if let Some(limit) = config.max_operations {
        engine.set_max_operations(limit);
    }
    if let Some(levels) = config.max_call_levels {
        engine.set_max_call_levels(levels);
    }
    engine.on_print(|text| info!(target: "userscript", "{text}"));
    engine.on_debug(|text, source, pos| debug!(target: "userscript", source = source.unwrap_or("-"), "{pos:?} {text}"));
    register_api(&mut engine);
    engine
}

/// Scope a script body runs in: the two mutable slots plus the console and css facades.
pub fn invocation_scope(script: &str, css: Rc<dyn CssToggle>) -> Scope<'static> {
    let mut scope = Scope::new();
    scope.push(UNLOAD_VAR, false);
    scope.push(SETTINGS_VAR, Map::new());
    scope.push(CONSOLE_VAR, ScriptConsole::new(script));
    scope.push(CSS_VAR, CssHandle::new(css));
    scope
}

fn register_api(engine: &mut Engine) {
    engine.register_type_with_name::<ScriptConsole>("Console");
    engine.register_fn("log", ScriptConsole::log);
    engine.register_fn("info", ScriptConsole::log);
    engine.register_fn("warn", ScriptConsole::warn);
    engine.register_fn("error", ScriptConsole::error);
    engine.register_fn("trace", ScriptConsole::trace);

    engine.register_type_with_name::<CssHandle>("Css");
    engine.register_fn("toggle", CssHandle::set);
    engine.register_fn("toggle", CssHandle::flip);
}
