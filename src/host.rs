use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::settings::{DescriptorValidator, SettingValidator};

/// Blocking notification addressed to whoever operates the host.
pub trait Alerter {
    fn alert(&self, message: &str);
}

/// Switches a named stylesheet rule on or off. `enabled: None` flips the current state.
/// Returns whether the rule is active afterwards.
pub trait CssToggle {
    fn toggle(&self, identifier: &str, css: &str, enabled: Option<bool>) -> bool;
}

/// Collaborators handed to every script load. Built once at bootstrap.
#[derive(Clone)]
pub struct HostServices {
    pub alerter: Rc<dyn Alerter>,
    pub css: Rc<dyn CssToggle>,
    pub validator: Rc<dyn SettingValidator>,
}

impl HostServices {
    pub fn new(alerter: Rc<dyn Alerter>, css: Rc<dyn CssToggle>, validator: Rc<dyn SettingValidator>) -> Self {
        Self { alerter, css, validator }
    }

    pub fn with_alerter(alerter: Rc<dyn Alerter>) -> Self {
        Self::new(alerter, Rc::new(StyleSheet::default()), Rc::new(DescriptorValidator))
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self::with_alerter(Rc::new(StderrAlert))
    }
}

pub struct StderrAlert;

impl Alerter for StderrAlert {
    fn alert(&self, message: &str) {
        eprintln!("[alert] {message}");
    }
}

/// Keeps every alert so callers can inspect them afterwards.
#[derive(Default)]
pub struct RecordingAlert {
    messages: RefCell<Vec<String>>,
}

impl RecordingAlert {
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }
}

impl Alerter for RecordingAlert {
    fn alert(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub css: String,
    pub enabled: bool,
}

/// In-process stylesheet: rules keyed by identifier, in the order they were first toggled.
#[derive(Default)]
pub struct StyleSheet {
    rules: RefCell<IndexMap<String, StyleRule>>,
}

impl StyleSheet {
    pub fn rule(&self, identifier: &str) -> Option<StyleRule> {
        self.rules.borrow().get(identifier).cloned()
    }

    pub fn is_enabled(&self, identifier: &str) -> bool {
        self.rules.borrow().get(identifier).is_some_and(|rule| rule.enabled)
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.rules.borrow().keys().cloned().collect()
    }

    pub fn active_css(&self) -> String {
        self.rules
            .borrow()
            .values()
            .filter(|rule| rule.enabled)
            .map(|rule| rule.css.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl CssToggle for StyleSheet {
    fn toggle(&self, identifier: &str, css: &str, enabled: Option<bool>) -> bool {
        let mut rules = self.rules.borrow_mut();
        let rule = rules
            .entry(identifier.to_string())
            .or_insert_with(|| StyleRule { css: css.to_string(), enabled: false });
        rule.css = css.to_string();
        rule.enabled = enabled.unwrap_or(!rule.enabled);
        rule.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stylesheet_toggles_and_flips() {
        let sheet = StyleSheet::default();
        assert!(sheet.toggle("hide-ads", ".ad { display: none }", Some(true)));
        assert!(sheet.is_enabled("hide-ads"));
        assert!(!sheet.toggle("hide-ads", ".ad { display: none }", None));
        assert!(!sheet.is_enabled("hide-ads"));
        assert!(sheet.toggle("hide-ads", ".ad { display: none }", None));
        assert_eq!(sheet.active_css(), ".ad { display: none }");
    }

    #[test]
    fn stylesheet_keeps_first_toggle_order() {
        let sheet = StyleSheet::default();
        sheet.toggle("b", "", Some(true));
        sheet.toggle("a", "", Some(true));
        sheet.toggle("b", "", Some(false));
        assert_eq!(sheet.identifiers(), ["b", "a"]);
    }

    #[test]
    fn recording_alert_collects_messages() {
        let alert = RecordingAlert::default();
        assert!(alert.is_empty());
        alert.alert("first");
        alert.alert("second");
        assert_eq!(alert.len(), 2);
        assert_eq!(alert.messages(), ["first", "second"]);
    }
}
