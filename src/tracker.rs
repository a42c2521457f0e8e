use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Enabled state per script file name, in the order it is written to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tracker {
    entries: IndexMap<String, bool>,
}

impl Tracker {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.entries.get(name).copied().unwrap_or(false)
    }

    pub fn set_enabled(&mut self, name: impl Into<String>, enabled: bool) {
        self.entries.insert(name.into(), enabled);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(name, enabled)| (name.as_str(), *enabled))
    }

    /// Every name known to be present, disabled until the persisted state says otherwise.
    pub fn seeded<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self { entries: names.into_iter().map(|name| (name.to_string(), false)).collect() }
    }

    /// Persisted values win; names only present in `persisted` are appended.
    pub fn overlay(&mut self, persisted: Tracker) {
        self.entries.extend(persisted.entries);
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing userscript tracker")
    }
}

/// The `tracker.json` file next to the scripts.
#[derive(Debug, Clone)]
pub struct TrackerStore {
    path: PathBuf,
}

impl TrackerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted tracker. A missing or malformed file is an error.
    pub fn load(&self) -> Result<Tracker> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading userscript tracker '{}'", self.path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing userscript tracker '{}'", self.path.display()))
    }

    pub fn save(&self, tracker: &Tracker) -> Result<()> {
        let json = tracker.to_pretty_json()?;
        fs::write(&self.path, json)
            .with_context(|| format!("writing userscript tracker '{}'", self.path.display()))
    }

    /// Merges the discovered scripts with the persisted state and writes the result back.
    ///
    /// New scripts start disabled, entries for scripts that no longer exist are kept, and the file
    /// is rewritten on every call so it always lists the current scripts.
    pub fn reconcile<'a>(&self, discovered: impl IntoIterator<Item = &'a str>) -> Result<Tracker> {
        let mut tracker = Tracker::seeded(discovered);
        tracker.overlay(self.load()?);
        self.save(&tracker)?;
        Ok(tracker)
    }
}
