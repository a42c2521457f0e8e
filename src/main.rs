use anyhow::{anyhow, Context, Result};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use userscript_runtime::cli::CliOverrides;
use userscript_runtime::config::RuntimeConfig;
use userscript_runtime::host::HostServices;
use userscript_runtime::ipc::{self, HostMessage};
use userscript_runtime::Runtime;

const DEFAULT_CONFIG_PATH: &str = "config/userscripts.json";

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "userscript_runtime=info,userscript=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!("[cli] {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(cli) {
        tracing::error!("Userscript bootstrap failed: {err:?}");
        std::process::exit(1);
    }
}

fn run(cli: CliOverrides) -> Result<()> {
    let mut config = match cli.config_path() {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::load_or_default(DEFAULT_CONFIG_PATH),
    };
    let wants_ipc = cli.wants_ipc();
    let overrides = cli.into_config_overrides();
    if !overrides.is_empty() {
        tracing::info!("[cli] overriding config fields: {}", overrides.applied_fields().join(", "));
    }
    config.apply_overrides(&overrides);

    let message = if wants_ipc {
        ipc::recv_message(&mut io::stdin().lock())
            .context("reading bootstrap message from stdin")?
            .ok_or_else(|| anyhow!("host closed the channel before sending '{}'", ipc::INITIALIZE_CHANNEL))?
    } else {
        let paths = config
            .bootstrap
            .clone()
            .ok_or_else(|| anyhow!("no userscript paths: pass --scripts/--prefs, --ipc, or set 'bootstrap' in the config"))?;
        HostMessage::InitializeUserscripts(paths)
    };

    let mut runtime = Runtime::new(config, HostServices::default());
    let plan = runtime.handle_message(message)?;
    let deferred = runtime.document_ready();

    println!("[userscripts] {} discovered, {} scheduled, {} deferred until ready", runtime.userscripts().len(), plan.len(), deferred.len());
    for step in &plan {
        let ran = runtime.userscript(&step.name).is_some_and(|script| script.has_run);
        println!(
            "  {:<32} priority {:>4}  {:<15} {}",
            step.name,
            step.priority,
            step.run_at.label(),
            if ran { "ran" } else { "failed" }
        );
    }
    Ok(())
}
