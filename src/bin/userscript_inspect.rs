use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::Serialize;
use userscript_runtime::config::RuntimeConfig;
use userscript_runtime::runtime::discover_script_names;
use userscript_runtime::tracker::TrackerStore;
use userscript_runtime::Userscript;

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("[userscript-inspect] error: {err:?}");
        std::process::exit(1);
    }
}

#[derive(Serialize)]
struct ScriptReport {
    name: String,
    enabled: Option<bool>,
    run_at: &'static str,
    priority: i64,
    strict: bool,
    metadata: Vec<(String, String)>,
    settings_path: PathBuf,
}

fn run_cli() -> Result<()> {
    let opts = parse_args()?;
    let config = match &opts.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    let scripts_dir = std::path::absolute(&opts.scripts)?;
    let prefs_dir = match &opts.prefs {
        Some(path) => std::path::absolute(path)?,
        None => scripts_dir.clone(),
    };
    // Read-only: the tracker is never rewritten here.
    let tracker = TrackerStore::new(scripts_dir.join(&config.tracker_file)).load().ok();

    let mut reports = Vec::new();
    for name in discover_script_names(&scripts_dir, &config.script_suffix())? {
        let settings_path = prefs_dir.join(config.settings_file_name(&name));
        let script = Userscript::from_file(name.clone(), scripts_dir.join(&name), settings_path)?;
        reports.push(ScriptReport {
            enabled: tracker.as_ref().and_then(|tracker| tracker.contains(&name).then(|| tracker.is_enabled(&name))),
            run_at: script.run_at().label(),
            priority: script.priority(),
            strict: script.strict_mode(),
            metadata: script
                .metadata
                .iter()
                .flat_map(|meta| meta.iter())
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            settings_path: script.settings_path.clone(),
            name,
        });
    }

    if opts.json {
        serde_json::to_writer_pretty(std::io::stdout(), &reports)?;
        println!();
        return Ok(());
    }
    for report in &reports {
        let state = match report.enabled {
            Some(true) => "enabled",
            Some(false) => "disabled",
            None => "untracked",
        };
        println!("{:<32} {:<9} {:<15} priority {}", report.name, state, report.run_at, report.priority);
        for (key, value) in &report.metadata {
            println!("    @{key} {value}");
        }
    }
    Ok(())
}

struct CliOptions {
    scripts: PathBuf,
    prefs: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
}

fn parse_args() -> Result<CliOptions> {
    let mut scripts = None;
    let mut prefs = None;
    let mut config = None;
    let mut json = false;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--scripts" | "-s" => scripts = args.next().map(PathBuf::from),
            "--prefs" | "-p" => prefs = args.next().map(PathBuf::from),
            "--config" | "-c" => config = args.next().map(PathBuf::from),
            "--json" => json = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                return Err(anyhow!("unknown argument '{other}'"));
            }
        }
    }
    let scripts = scripts.ok_or_else(|| anyhow!("--scripts <dir> is required"))?;
    Ok(CliOptions { scripts, prefs, config, json })
}

fn print_help() {
    println!(
        "Usage: userscript_inspect --scripts <dir> [--prefs <dir>] [--config <file>] [--json]\n\n\
         Lists the userscripts in <dir> with their header directives, run timing, priority and tracker state\n\
         without running them or touching tracker.json."
    );
}
