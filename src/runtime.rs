use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::events::DocumentReady;
use crate::executor::{Executor, LoadError, LoadOutcome};
use crate::host::HostServices;
use crate::ipc::{BootstrapPaths, HostMessage};
use crate::scheduler::{Dispatch, Scheduler};
use crate::tracker::{Tracker, TrackerStore};
use crate::userscript::Userscript;

/// Absolute locations the runtime works with after bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub userscripts: PathBuf,
    pub tracker: PathBuf,
    pub prefs: PathBuf,
}

/// Everything the userscript loader shares between bootstrap, dispatch and the ready signal.
pub struct Runtime {
    config: RuntimeConfig,
    executor: Executor,
    host: HostServices,
    ready: DocumentReady,
    paths: Option<RuntimePaths>,
    userscripts: Vec<Userscript>,
    tracker: Tracker,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, host: HostServices) -> Self {
        let executor = Executor::new(&config);
        Self {
            config,
            executor,
            host,
            ready: DocumentReady::new(),
            paths: None,
            userscripts: Vec::new(),
            tracker: Tracker::default(),
        }
    }

    pub fn handle_message(&mut self, message: HostMessage) -> Result<Vec<Dispatch>> {
        debug!(channel = message.channel(), "host message");
        match message {
            HostMessage::InitializeUserscripts(paths) => self.bootstrap(&paths),
        }
    }

    /// Discovers the scripts, reconciles the tracker and dispatches every enabled script.
    ///
    /// An unreadable script or a missing/malformed tracker aborts the whole bootstrap before any
    /// script runs.
    pub fn bootstrap(&mut self, paths: &BootstrapPaths) -> Result<Vec<Dispatch>> {
        let userscripts_dir = std::path::absolute(&paths.userscripts_path)
            .with_context(|| format!("resolving '{}'", paths.userscripts_path.display()))?;
        let prefs_dir = std::path::absolute(&paths.userscript_prefs_path)
            .with_context(|| format!("resolving '{}'", paths.userscript_prefs_path.display()))?;
        let runtime_paths = RuntimePaths {
            tracker: userscripts_dir.join(&self.config.tracker_file),
            userscripts: userscripts_dir,
            prefs: prefs_dir,
        };

        let userscripts = self.discover(&runtime_paths)?;
        let store = TrackerStore::new(&runtime_paths.tracker);
        let tracker = store.reconcile(userscripts.iter().map(|script| script.name.as_str()))?;
        info!(
            discovered = userscripts.len(),
            enabled = userscripts.iter().filter(|script| tracker.is_enabled(&script.name)).count(),
            "userscripts initialized from {}",
            runtime_paths.userscripts.display()
        );

        self.paths = Some(runtime_paths);
        self.userscripts = userscripts;
        self.tracker = tracker;
        Ok(Scheduler::dispatch(&mut self.userscripts, &self.tracker, &self.executor, &self.host, &mut self.ready))
    }

    /// Fires the document-ready signal and runs every queued script in registration order.
    pub fn document_ready(&mut self) -> Vec<(String, LoadOutcome)> {
        let mut outcomes = Vec::new();
        for listener in self.ready.fire() {
            let Some(script) = self.userscripts.iter_mut().find(|script| script.name == listener.script()) else {
                debug!(listener = %listener, "ready listener without a script");
                continue;
            };
            let outcome = self.executor.load(script, &self.host);
            outcomes.push((script.name.clone(), outcome));
        }
        outcomes
    }

    /// Flips a script's tracker entry and persists it. Takes effect on the next bootstrap.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let Some(paths) = &self.paths else {
            bail!("userscripts are not initialized yet");
        };
        self.tracker.set_enabled(name, enabled);
        TrackerStore::new(&paths.tracker).save(&self.tracker)
    }

    pub fn unload(&self, name: &str) -> Result<bool, LoadError> {
        match self.userscript(name) {
            Some(script) => self.executor.unload(script),
            None => Ok(false),
        }
    }

    pub fn userscripts(&self) -> &[Userscript] {
        &self.userscripts
    }

    pub fn userscript(&self, name: &str) -> Option<&Userscript> {
        self.userscripts.iter().find(|script| script.name == name)
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn paths(&self) -> Option<&RuntimePaths> {
        self.paths.as_ref()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn ready(&self) -> &DocumentReady {
        &self.ready
    }

    fn discover(&self, paths: &RuntimePaths) -> Result<Vec<Userscript>> {
        let names = discover_script_names(&paths.userscripts, &self.config.script_suffix())?;
        names
            .into_iter()
            .map(|name| {
                let settings_path = paths.prefs.join(self.config.settings_file_name(&name));
                let path = paths.userscripts.join(&name);
                Userscript::from_file(name, path, settings_path)
            })
            .collect()
    }
}

/// File names directly inside `dir` that end in `suffix`, sorted by name.
pub fn discover_script_names(dir: &Path, suffix: &str) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).with_context(|| format!("reading userscripts directory '{}'", dir.display()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing '{}'", dir.display()))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.ends_with(suffix) && entry.path().is_file() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
