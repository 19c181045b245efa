//! CLI-flags-over-config-file merge (SPEC_FULL.md §4.7): turns a [`Cli`]
//! into the `RawConfig` intermediate `warden-core` already knows how to
//! validate and collapse into a [`ConfigSnapshot`].

use warden_core::{ConfigError, ConfigSnapshot, RawConfig};

use crate::cli::Cli;

/// Overlay `cli`'s flags on top of its optional `--config` file and
/// validate into one snapshot, stamped with `generation`.
pub fn load_config(cli: &Cli, generation: u64) -> Result<ConfigSnapshot, ConfigError> {
    let file_raw = match &cli.config {
        Some(path) => RawConfig::from_file(path)?,
        None => RawConfig::default(),
    };
    cli_to_raw(cli)?.merge_over(file_raw).into_snapshot(generation)
}

fn cli_to_raw(cli: &Cli) -> Result<RawConfig, ConfigError> {
    let umask = cli.umask.as_deref().map(parse_umask).transpose()?;
    Ok(RawConfig {
        bind: (!cli.bind.is_empty()).then(|| cli.bind.clone()),
        workers: cli.workers,
        worker_class: cli.worker_class.clone(),
        timeout: cli.timeout,
        graceful_timeout: cli.graceful_timeout,
        keep_alive: cli.keep_alive,
        max_requests: cli.max_requests,
        worker_connections: cli.worker_connections,
        pidfile: cli.pidfile.clone(),
        user: cli.user.clone(),
        group: cli.group.clone(),
        umask,
        daemon: cli.daemon.then_some(true),
        log_level: cli.log_level.clone(),
        access_logfile: cli.access_logfile.clone(),
        error_logfile: cli.error_logfile.clone(),
    })
}

fn parse_umask(raw: &str) -> Result<u32, ConfigError> {
    u32::from_str_radix(raw, 8).map_err(|_| ConfigError::InvalidUmask(raw.to_string()))
}

/// A closure the arbiter calls on every soft reload to re-run this same
/// merge-and-validate pipeline from scratch (SPEC_FULL.md §4.6a, §4.7).
/// `generation` advances on every call so each reloaded snapshot carries
/// a distinct, increasing id.
pub fn make_reload_fn(cli: Cli) -> warden_arbiter::ReloadFn {
    let mut generation: u64 = 1;
    Box::new(move || {
        let snapshot = load_config(&cli, generation)?;
        generation += 1;
        Ok(snapshot)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_cli() -> Cli {
        Cli {
            bind: Vec::new(),
            workers: None,
            worker_class: None,
            timeout: None,
            graceful_timeout: None,
            keep_alive: None,
            max_requests: None,
            worker_connections: None,
            pidfile: None,
            user: None,
            group: None,
            umask: None,
            daemon: false,
            reload: false,
            config: None,
            log_level: None,
            access_logfile: None,
            error_logfile: None,
        }
    }

    #[test]
    fn cli_only_uses_built_in_defaults_for_unset_fields() {
        let snapshot = load_config(&bare_cli(), 0).unwrap();
        assert_eq!(snapshot.workers, 1);
        assert_eq!(snapshot.generation, 0);
    }

    #[test]
    fn cli_workers_overrides_default() {
        let cli = Cli { workers: Some(4), ..bare_cli() };
        let snapshot = load_config(&cli, 0).unwrap();
        assert_eq!(snapshot.workers, 4);
    }

    #[test]
    fn umask_parses_as_octal() {
        let cli = Cli { umask: Some("022".into()), ..bare_cli() };
        let snapshot = load_config(&cli, 0).unwrap();
        assert_eq!(snapshot.umask, Some(0o22));
    }

    #[test]
    fn invalid_umask_is_rejected() {
        let cli = Cli { umask: Some("not-octal".into()), ..bare_cli() };
        assert!(matches!(load_config(&cli, 0), Err(ConfigError::InvalidUmask(_))));
    }

    #[test]
    fn reload_fn_advances_its_generation_each_call() {
        let mut reload_fn = make_reload_fn(bare_cli());
        let first = reload_fn().unwrap();
        let second = reload_fn().unwrap();
        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
    }
}
