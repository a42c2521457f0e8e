use std::fmt;

/// One-shot subscription to the document-ready signal, identified by the script it will run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadyListener {
    script: String,
}

impl ReadyListener {
    pub fn new(script: impl Into<String>) -> Self {
        Self { script: script.into() }
    }

    pub fn script(&self) -> &str {
        &self.script
    }
}

impl fmt::Display for ReadyListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ready:{}", self.script)
    }
}

/// Host lifecycle source the scheduler defers late scripts to.
pub trait ReadySignal {
    /// Registers a listener that fires once, after every listener registered before it.
    fn add_listener(&mut self, listener: ReadyListener);

    /// Drops a pending listener equal to `listener`. Returns whether one was registered.
    fn remove_listener(&mut self, listener: &ReadyListener) -> bool;
}

/// In-process document-ready signal.
///
/// `fire` hands back the pending listeners in registration order and forgets them, so each runs
/// once. Listeners added after the document is ready wait for the next `fire`.
#[derive(Debug, Default)]
pub struct DocumentReady {
    listeners: Vec<ReadyListener>,
    fired: bool,
}

impl DocumentReady {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.fired
    }

    pub fn pending(&self) -> &[ReadyListener] {
        &self.listeners
    }

    pub fn fire(&mut self) -> Vec<ReadyListener> {
        self.fired = true;
        std::mem::take(&mut self.listeners)
    }
}

impl ReadySignal for DocumentReady {
    fn add_listener(&mut self, listener: ReadyListener) {
        self.listeners.push(listener);
    }

    fn remove_listener(&mut self, listener: &ReadyListener) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|pending| pending != listener);
        self.listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_drains_in_registration_order_once() {
        let mut ready = DocumentReady::new();
        ready.add_listener(ReadyListener::new("b.rhai"));
        ready.add_listener(ReadyListener::new("a.rhai"));
        assert!(!ready.is_ready());
        let fired = ready.fire();
        assert_eq!(fired.iter().map(ReadyListener::script).collect::<Vec<_>>(), ["b.rhai", "a.rhai"]);
        assert!(ready.is_ready());
        assert!(ready.fire().is_empty(), "listeners are one-shot");
    }

    #[test]
    fn remove_then_add_does_not_duplicate() {
        let mut ready = DocumentReady::new();
        let listener = ReadyListener::new("late.rhai");
        assert!(!ready.remove_listener(&listener));
        ready.add_listener(listener.clone());
        assert!(ready.remove_listener(&listener));
        ready.add_listener(listener.clone());
        assert_eq!(ready.pending(), [listener]);
    }
}
