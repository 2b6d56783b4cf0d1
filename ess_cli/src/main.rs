use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

mod cli;
mod error_fmt;
mod run;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{InvalidConfiguration, exit_code_for_error, format_error_json, humanize};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    match real_main(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            ExitCode::from(exit_code_for_error(&e))
        }
    }
}

fn real_main(cli: Cli) -> Result<()> {
    let sources = ess_config::Sources {
        config_file: cli.config.clone(),
        env_file: cli.env_file.clone(),
    };
    let cfg = ess_config::load(&sources).wrap_err(InvalidConfiguration)?;
    // Held until the command returns so the file sink is flushed.
    let _file_guard = init_tracing(&cli, &cfg.logging)?;

    match cli.cmd {
        Commands::Run {
            dry_run,
            sim,
            cycles,
        } => {
            let opts = run::RunOpts {
                dry_run,
                sim,
                cycles,
            };
            run::run_daemon(&cfg, &opts, cli.json).map(|_| ())
        }
        Commands::Check => run::check(&cfg, cli.json),
        Commands::Probe { sim } => run::probe(&cfg, sim, cli.json),
    }
}

/// Console on stderr (pretty or JSON), plus an optional JSON file sink.
///
/// Filter precedence: `--log-level`, then `RUST_LOG`, then `logging.level`, then `info`.
fn init_tracing(cli: &Cli, logging: &ess_config::Logging) -> Result<Option<WorkerGuard>> {
    let filter = match (&cli.log_level, std::env::var("RUST_LOG").ok(), &logging.level) {
        (Some(level), _, _) => EnvFilter::try_new(level)
            .wrap_err_with(|| format!("invalid --log-level {level:?}"))?,
        (None, Some(env), _) if !env.is_empty() => {
            EnvFilter::try_new(&env).wrap_err("invalid RUST_LOG")?
        }
        (None, _, Some(level)) => EnvFilter::try_new(level)
            .wrap_err_with(|| format!("invalid logging.level {level:?}"))
            .wrap_err(InvalidConfiguration)?,
        _ => EnvFilter::new("info"),
    };

    let (pretty, json) = if cli.json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    let mut guard = None;
    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file must name a file"))
                .wrap_err(InvalidConfiguration)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, g) = tracing_appender::non_blocking(appender);
            guard = Some(g);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("failed to install logger: {e}"))?;
    Ok(guard)
}
