//! Entry point (SPEC_FULL.md §6): parse flags, validate configuration
//! before anything is forked, and hand off to the arbiter.

mod cli;
mod config;
mod daemonize;
mod error;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use cli::Cli;
use error::WardenError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.daemon {
        if let Err(e) = daemonize::daemonize() {
            eprintln!("failed to daemonize: {e}");
            return ExitCode::from(2);
        }
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), WardenError> {
    let snapshot = config::load_config(&cli, 0)?;

    let tracing_handle = Arc::new(logging::init(&snapshot.log_level, snapshot.error_logfile.as_deref()));

    if cli.reload {
        tracing::warn!("--reload accepted but no source-change file watcher is started; use SIGHUP to reload");
    }

    let app: Arc<dyn warden_http::AppHandler> = Arc::new(warden_http::EchoApp);
    let reload_fn = Some(config::make_reload_fn(cli));
    let on_reopen_logs: Option<warden_arbiter::ReopenLogsFn> = Some(Box::new({
        let handle = tracing_handle.clone();
        move || handle.reopen()
    }));

    warden_arbiter::Arbiter::new(snapshot, app, reload_fn, on_reopen_logs)?.run()?;
    Ok(())
}
