use tracing::debug;

use crate::events::{ReadyListener, ReadySignal};
use crate::executor::Executor;
use crate::host::HostServices;
use crate::tracker::Tracker;
use crate::userscript::{RunAt, Userscript};

/// One enabled script and when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub index: usize,
    pub name: String,
    pub run_at: RunAt,
    pub priority: i64,
}

pub struct Scheduler;

impl Scheduler {
    /// Enabled scripts, highest priority first. Equal priorities keep discovery order.
    pub fn plan(scripts: &[Userscript], tracker: &Tracker) -> Vec<Dispatch> {
        let mut plan = scripts
            .iter()
            .enumerate()
            .filter(|(_, script)| tracker.is_enabled(&script.name))
            .map(|(index, script)| Dispatch {
                index,
                name: script.name.clone(),
                run_at: script.run_at(),
                priority: script.priority(),
            })
            .collect::<Vec<_>>();
        // stable
        plan.sort_by(|a, b| b.priority.cmp(&a.priority));
        plan
    }

    /// Runs document-start scripts now and queues document-end scripts on `ready`.
    pub fn dispatch<S: ReadySignal>(
        scripts: &mut [Userscript],
        tracker: &Tracker,
        executor: &Executor,
        host: &HostServices,
        ready: &mut S,
    ) -> Vec<Dispatch> {
        let plan = Self::plan(scripts, tracker);
        for step in &plan {
            match step.run_at {
                RunAt::DocumentStart => {
                    executor.load(&mut scripts[step.index], host);
                }
                RunAt::DocumentEnd => {
                    let listener = ReadyListener::new(step.name.clone());
                    if ready.remove_listener(&listener) {
                        debug!(script = %step.name, "replaced an existing ready listener");
                    }
                    ready.add_listener(listener);
                }
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::events::DocumentReady;

    fn script(name: &str, priority: i64, run_at: &str) -> Userscript {
        let source = format!(
            "// ==UserScript==\n// @priority {priority}\n// @run-at {run_at}\n// ==/UserScript==\nlet loaded = true;\n"
        );
        Userscript::from_source(name, format!("/scripts/{name}"), format!("/prefs/{name}.json"), source)
    }

    fn all_enabled(scripts: &[Userscript]) -> Tracker {
        let mut tracker = Tracker::default();
        for script in scripts {
            tracker.set_enabled(script.name.clone(), true);
        }
        tracker
    }

    #[test]
    fn plan_sorts_descending_with_stable_ties() {
        let scripts = vec![
            script("A", 5, "document.end"),
            script("B", 10, "document.end"),
            script("C", 10, "document.end"),
            script("D", 1, "document.end"),
        ];
        let plan = Scheduler::plan(&scripts, &all_enabled(&scripts));
        let order = plan.iter().map(|step| step.name.as_str()).collect::<Vec<_>>();
        assert_eq!(order, ["B", "C", "A", "D"]);
    }

    #[test]
    fn disabled_scripts_are_left_out() {
        let scripts = vec![script("on", 0, "document.end"), script("off", 99, "document.end")];
        let mut tracker = all_enabled(&scripts);
        tracker.set_enabled("off", false);
        let plan = Scheduler::plan(&scripts, &tracker);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name, "on");
    }

    #[test]
    fn start_scripts_run_now_and_end_scripts_wait() {
        let mut scripts = vec![script("early", 0, "document.start"), script("late", 5, "document.end")];
        let tracker = all_enabled(&scripts);
        let executor = Executor::new(&RuntimeConfig::default());
        let host = HostServices::default();
        let mut ready = DocumentReady::new();

        Scheduler::dispatch(&mut scripts, &tracker, &executor, &host, &mut ready);
        assert!(scripts[0].has_run);
        assert!(!scripts[1].has_run);
        assert_eq!(ready.pending(), [ReadyListener::new("late")]);
    }

    #[test]
    fn dispatching_twice_keeps_one_listener_per_script() {
        let mut scripts = vec![script("x", 1, "document.end"), script("y", 2, "document.end")];
        let tracker = all_enabled(&scripts);
        let executor = Executor::new(&RuntimeConfig::default());
        let host = HostServices::default();
        let mut ready = DocumentReady::new();

        Scheduler::dispatch(&mut scripts, &tracker, &executor, &host, &mut ready);
        Scheduler::dispatch(&mut scripts, &tracker, &executor, &host, &mut ready);
        let pending = ready.pending().iter().map(ReadyListener::script).collect::<Vec<_>>();
        assert_eq!(pending, ["y", "x"]);
    }
}
