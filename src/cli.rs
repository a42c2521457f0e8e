use crate::config::RuntimeConfigOverrides;
use crate::ipc::BootstrapPaths;
use anyhow::{anyhow, bail, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    scripts: Option<PathBuf>,
    prefs: Option<PathBuf>,
    config: Option<PathBuf>,
    extension: Option<String>,
    ipc: bool,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. Use --scripts/--prefs/--config/--ext with values or --ipc.");
            }
            let key = &flag[2..];
            if key == "ipc" {
                overrides.ipc = true;
                continue;
            }
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "scripts" => overrides.scripts = Some(PathBuf::from(value)),
                "prefs" => overrides.prefs = Some(PathBuf::from(value)),
                "config" => overrides.config = Some(PathBuf::from(value)),
                "ext" => overrides.extension = Some(value.trim_start_matches('.').to_string()),
                _ => bail!("Unknown flag '{flag}'. Supported flags: --scripts, --prefs, --config, --ext, --ipc."),
            }
        }
        if overrides.scripts.is_some() != overrides.prefs.is_some() {
            bail!("--scripts and --prefs must be given together");
        }
        if overrides.ipc && overrides.scripts.is_some() {
            bail!("--ipc cannot be combined with --scripts/--prefs");
        }
        Ok(overrides)
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    /// Whether the bootstrap message should be read from stdin.
    pub fn wants_ipc(&self) -> bool {
        self.ipc
    }

    pub fn into_config_overrides(self) -> RuntimeConfigOverrides {
        let bootstrap = match (self.scripts, self.prefs) {
            (Some(userscripts_path), Some(userscript_prefs_path)) => {
                Some(BootstrapPaths { userscripts_path, userscript_prefs_path })
            }
            _ => None,
        };
        RuntimeConfigOverrides { bootstrap, script_extension: self.extension }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paths_into_bootstrap() {
        let args = ["app", "--scripts", "/data/us", "--prefs", "/data/us/prefs", "--ext", ".js"];
        let overrides = CliOverrides::parse(args).expect("parse overrides").into_config_overrides();
        let bootstrap = overrides.bootstrap.expect("bootstrap paths");
        assert_eq!(bootstrap.userscripts_path, PathBuf::from("/data/us"));
        assert_eq!(bootstrap.userscript_prefs_path, PathBuf::from("/data/us/prefs"));
        assert_eq!(overrides.script_extension.as_deref(), Some("js"));
    }

    #[test]
    fn latest_flag_wins() {
        let args = ["app", "--config", "a.json", "--config", "b.json"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.config_path(), Some(&PathBuf::from("b.json")));
        assert!(!overrides.wants_ipc());
    }

    #[test]
    fn ipc_flag_takes_no_value() {
        let overrides = CliOverrides::parse(["app", "--ipc", "--config", "c.json"]).expect("parse overrides");
        assert!(overrides.wants_ipc());
        assert!(overrides.into_config_overrides().is_empty());
    }

    #[test]
    fn missing_value_errors() {
        let err = CliOverrides::parse(["app", "--scripts"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn scripts_without_prefs_errors() {
        let err = CliOverrides::parse(["app", "--scripts", "/data/us"]).unwrap_err();
        assert!(err.to_string().contains("together"));
    }

    #[test]
    fn rejects_unknown_flags() {
        let err = CliOverrides::parse(["app", "--foo", "bar"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"), "unknown flags should error");
    }
}
