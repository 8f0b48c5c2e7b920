pub mod config;
pub mod controller;
pub mod errors;
pub mod fixture;
pub mod http;
pub mod interaction;
pub mod interceptor;
pub mod logging;
pub mod matcher;
pub mod runtime;
pub mod store;
pub mod types;

use clap::{error::ErrorKind, Parser, Subcommand};
use config::{load_config, resolve_mode, CliOverrides, EnvMap};
use errors::DvrError;
use runtime::ProductionRuntime;
use serde_json::json;
use store::Store;

pub use config::DvrConfig;
pub use controller::ModeController;
pub use interceptor::Interceptor;
pub use runtime::Transport;
pub use types::Mode;

#[derive(Debug, Clone, Parser)]
#[command(name = "dvr")]
#[command(about = "Record and replay HTTP interactions for deterministic tests")]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
    #[arg(long, global = true)]
    pub file: Option<std::path::PathBuf>,
    #[arg(long, global = true)]
    pub log: Option<std::path::PathBuf>,
    #[arg(long, global = true, default_value_t = false)]
    pub record: bool,
    #[arg(long, global = true, default_value_t = false)]
    pub replay: bool,
    #[arg(long, global = true, default_value_t = false)]
    pub passthrough: bool,
    #[arg(long, global = true, default_value_t = false)]
    pub default_replay: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the mode and fixture the current settings resolve to.
    Mode,
    /// List the interactions stored in the fixture.
    Inspect {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

pub fn run() -> Result<i32, DvrError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &env, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    runtime: &ProductionRuntime,
) -> Result<i32, DvrError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(DvrError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        fixture_path: cli.file.clone(),
        log_path: cli.log.clone(),
        record: cli.record,
        replay: cli.replay,
        passthrough: cli.passthrough,
        default_replay: cli.default_replay,
    };
    let cfg = load_config(
        &overrides,
        &env_to_map(env),
        runtime.file_system.as_ref(),
        runtime.clock.as_ref(),
    )?;

    match cli.command {
        Command::Mode => {
            runtime.terminal.write_line(&format!(
                "mode={} fixture={}",
                resolve_mode(&cfg).as_str(),
                cfg.fixture_path.display()
            ))?;
        }
        Command::Inspect { json } => inspect(&cfg, runtime, json)?,
    }
    Ok(0)
}

fn inspect(cfg: &DvrConfig, runtime: &ProductionRuntime, as_json: bool) -> Result<(), DvrError> {
    let store = Store::load(&cfg.fixture_path)?;
    let records = store.snapshot();

    if as_json {
        let interactions = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                json!({
                    "index": index,
                    "method": record.method(),
                    "url": record.url_string(),
                    "status": record.status(),
                    "fingerprint": record.request_fingerprint(),
                    "recorded_at_unix_ms": record.recorded_at_unix_ms,
                })
            })
            .collect::<Vec<_>>();
        let summary = json!({
            "fixture": cfg.fixture_path.display().to_string(),
            "version": store.version(),
            "interactions": interactions,
        });
        let text =
            serde_json::to_string_pretty(&summary).map_err(|e| DvrError::Io(e.to_string()))?;
        return runtime.terminal.write_line(&text);
    }

    for (index, record) in records.iter().enumerate() {
        let status = record
            .status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        runtime.terminal.write_line(&format!(
            "#{index} {} {} -> {status} {}",
            record.method(),
            record.url_string(),
            record.request_fingerprint()
        ))?;
    }
    let oldest = store
        .oldest_recorded_at_unix_ms()
        .map(|ms| ms.to_string())
        .unwrap_or_else(|| "-".to_string());
    runtime.terminal.write_line(&format!(
        "fixture={} version={} interactions={} oldest_recorded_at_unix_ms={oldest}",
        cfg.fixture_path.display(),
        store.version(),
        store.len()
    ))
}

fn env_to_map(env: &[(std::ffi::OsString, std::ffi::OsString)]) -> EnvMap {
    let mut map = EnvMap::new();
    for (key, value) in env {
        if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}
