use indexmap::IndexMap;

pub const HEADER_START: &str = "// ==UserScript==";
pub const HEADER_END: &str = "// ==/UserScript==";

const START_TAG: &str = "==UserScript==";
const END_TAG: &str = "==/UserScript==";
const COMMENT_PREFIX: &str = "//";

/// Value of a directive as it appears in the header, before repeated directives are collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Single(String),
    Multiple(Vec<String>),
}

impl MetaValue {
    fn push(&mut self, value: String) {
        match self {
            MetaValue::Single(first) => {
                let first = std::mem::take(first);
                *self = MetaValue::Multiple(vec![first, value]);
            }
            MetaValue::Multiple(values) => values.push(value),
        }
    }
}

pub type RawMetadata = IndexMap<String, MetaValue>;

/// Directives keyed by name, in header order, one value each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptMetadata {
    entries: IndexMap<String, String>,
}

impl ScriptMetadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Parses a header block (markers included) into its directives.
///
/// Blank lines and marker lines are skipped. Each remaining line loses one leading `//`, its first
/// token minus the directive prefix becomes the key and the rest of the tokens, joined by single
/// spaces, become the value. Never fails; a header without directives yields an empty map.
pub fn parse_metadata(header: &str) -> RawMetadata {
    let mut meta = RawMetadata::new();
    for line in header.split(['\r', '\n']) {
        if line.trim().is_empty() || line.contains(START_TAG) || line.contains(END_TAG) {
            continue;
        }
        let trimmed = line.trim();
        let body = trimmed.strip_prefix(COMMENT_PREFIX).unwrap_or(trimmed).trim();
        let mut tokens = body.split_whitespace();
        let key = tokens.next().map(strip_directive_prefix).unwrap_or_default().to_string();
        let value = tokens.collect::<Vec<_>>().join(" ");
        match meta.get_mut(&key) {
            Some(existing) => existing.push(value),
            None => {
                meta.insert(key, MetaValue::Single(value));
            }
        }
    }
    meta
}

/// Replaces every repeated directive with its last occurrence.
pub fn collapse(raw: RawMetadata) -> ScriptMetadata {
    let entries = raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                MetaValue::Single(value) => value,
                MetaValue::Multiple(mut values) => values.pop().unwrap_or_default(),
            };
            (key, value)
        })
        .collect();
    ScriptMetadata { entries }
}

/// Finds the header in a script's source and returns its collapsed directives.
///
/// Both markers have to be present somewhere in the source; otherwise the script has no metadata.
/// The block runs from the first line holding the start marker to the first line holding the end
/// marker.
pub fn extract_metadata(source: &str) -> Option<ScriptMetadata> {
    if !source.contains(HEADER_START) || !source.contains(HEADER_END) {
        return None;
    }
    let lines = source.split('\n').collect::<Vec<_>>();
    let start = lines.iter().position(|line| line.contains(HEADER_START))?;
    let end = lines.iter().position(|line| line.contains(HEADER_END))?;
    // An end marker above the start marker leaves nothing between them.
    let block = if end >= start { lines[start..=end].join("\n") } else { String::new() };
    Some(collapse(parse_metadata(&block)))
}

fn strip_directive_prefix(token: &str) -> &str {
    let mut chars = token.chars();
    chars.next();
    chars.as_str()
}
