use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::warn;

use crate::metadata::{extract_metadata, ScriptMetadata};
use crate::settings::SettingDescriptor;
use crate::scripts::UnloadHook;

pub const STRICT_PRAGMA: &str = "\"use strict\"";
pub const RUN_AT_DIRECTIVE: &str = "run-at";
pub const PRIORITY_DIRECTIVE: &str = "priority";
pub const DOCUMENT_START_LITERAL: &str = "document.start";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunAt {
    DocumentStart,
    #[default]
    DocumentEnd,
}

impl RunAt {
    pub fn label(self) -> &'static str {
        match self {
            RunAt::DocumentStart => "document-start",
            RunAt::DocumentEnd => "document-end",
        }
    }

    fn from_metadata(meta: &ScriptMetadata) -> Self {
        match meta.get(RUN_AT_DIRECTIVE) {
            Some(DOCUMENT_START_LITERAL) => RunAt::DocumentStart,
            _ => RunAt::DocumentEnd,
        }
    }
}

impl fmt::Display for RunAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub type SettingsMap = IndexMap<String, SettingDescriptor>;

/// A discovered script and the state it picks up once loaded.
pub struct Userscript {
    pub name: String,
    pub path: PathBuf,
    pub content: String,
    pub metadata: Option<ScriptMetadata>,
    pub settings_path: PathBuf,
    /// Set after a successful load so a settings UI can ask for a reload when a value changes.
    pub has_run: bool,
    pub unload: Option<UnloadHook>,
    pub settings: SettingsMap,
    run_at: RunAt,
    priority: i64,
    strict_mode: bool,
}

impl Userscript {
    pub fn from_file(name: impl Into<String>, path: impl AsRef<Path>, settings_path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("reading userscript '{}'", path.display()))?;
        Ok(Self::from_source(name, path, settings_path, content))
    }

    pub fn from_source(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        settings_path: impl Into<PathBuf>,
        content: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let content = content.into();
        let strict_mode = content.starts_with(STRICT_PRAGMA);
        let metadata = extract_metadata(&content);
        let (run_at, priority) = match &metadata {
            Some(meta) => (RunAt::from_metadata(meta), priority_from_metadata(&name, meta)),
            None => (RunAt::default(), 0),
        };
        Self {
            name,
            path: path.into(),
            content,
            metadata,
            settings_path: settings_path.into(),
            has_run: false,
            unload: None,
            settings: SettingsMap::new(),
            run_at,
            priority,
            strict_mode,
        }
    }

    pub fn run_at(&self) -> RunAt {
        self.run_at
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    pub fn strict_label(&self) -> &'static str {
        if self.strict_mode {
            "[strict]"
        } else {
            "[non-strict]"
        }
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref().and_then(|meta| meta.get(key))
    }
}

impl fmt::Debug for Userscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Userscript")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("run_at", &self.run_at)
            .field("priority", &self.priority)
            .field("has_run", &self.has_run)
            .field("settings", &self.settings.keys().collect::<Vec<_>>())
            .field("unload", &self.unload.is_some())
            .finish()
    }
}

fn priority_from_metadata(name: &str, meta: &ScriptMetadata) -> i64 {
    let Some(raw) = meta.get(PRIORITY_DIRECTIVE) else {
        return 0;
    };
    match parse_int_prefix(raw) {
        Some(priority) => priority,
        None => {
            warn!(script = %name, value = %raw, "userscript priority is not a number, using 0");
            0
        }
    }
}

/// Reads an optionally signed run of leading decimal digits, ignoring anything after it.
/// Returns `None` when there are no digits or the number does not fit.
pub fn parse_int_prefix(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    let magnitude = rest[..digits_len].parse::<i64>().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_with_header(directives: &[&str]) -> Userscript {
        let mut source = String::from("// ==UserScript==\n");
        for directive in directives {
            source.push_str("// ");
            source.push_str(directive);
            source.push('\n');
        }
        source.push_str("// ==/UserScript==\nlet answer = 42;\n");
        Userscript::from_source("test.rhai", "/scripts/test.rhai", "/prefs/test.json", source)
    }

    #[test]
    fn priority_parses_integers_and_falls_back_to_zero() {
        assert_eq!(script_with_header(&["@priority 7"]).priority(), 7);
        assert_eq!(script_with_header(&["@priority -3"]).priority(), -3);
        assert_eq!(script_with_header(&["@priority abc"]).priority(), 0);
        assert_eq!(script_with_header(&[]).priority(), 0);
    }

    #[test]
    fn repeated_priority_uses_last_occurrence() {
        assert_eq!(script_with_header(&["@priority 1", "@priority 2", "@priority 9"]).priority(), 9);
    }

    #[test]
    fn integer_prefix_matches_lenient_parsing() {
        assert_eq!(parse_int_prefix("12px"), Some(12));
        assert_eq!(parse_int_prefix("  +5"), Some(5));
        assert_eq!(parse_int_prefix("3.9"), Some(3));
        assert_eq!(parse_int_prefix("-"), None);
        assert_eq!(parse_int_prefix(""), None);
        assert_eq!(parse_int_prefix("99999999999999999999999"), None);
    }

    #[test]
    fn run_at_requires_exact_literal() {
        assert_eq!(script_with_header(&["@run-at document.start"]).run_at(), RunAt::DocumentStart);
        assert_eq!(script_with_header(&["@run-at document-start"]).run_at(), RunAt::DocumentEnd);
        assert_eq!(script_with_header(&["@run-at document.end"]).run_at(), RunAt::DocumentEnd);
        assert_eq!(script_with_header(&[]).run_at(), RunAt::DocumentEnd);
    }

    #[test]
    fn source_without_header_defaults() {
        let script = Userscript::from_source("plain.rhai", "/s/plain.rhai", "/p/plain.json", "let x = 1;");
        assert!(script.metadata.is_none());
        assert_eq!(script.run_at(), RunAt::DocumentEnd);
        assert_eq!(script.priority(), 0);
        assert!(!script.has_run);
        assert!(script.settings.is_empty());
    }

    #[test]
    fn strict_pragma_is_a_prefix_check() {
        let strict = Userscript::from_source("a.rhai", "/a.rhai", "/a.json", "\"use strict\";\nlet x = 1;");
        let loose = Userscript::from_source("b.rhai", "/b.rhai", "/b.json", "\n\"use strict\";");
        assert!(strict.strict_mode());
        assert_eq!(strict.strict_label(), "[strict]");
        assert!(!loose.strict_mode());
        assert_eq!(loose.strict_label(), "[non-strict]");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = Userscript::from_file("gone.rhai", dir.path().join("gone.rhai"), dir.path().join("gone.json"))
            .unwrap_err();
        assert!(err.to_string().contains("gone.rhai"));
    }
}
