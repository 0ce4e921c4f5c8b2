//! Map parsed CLI arguments to an action.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, auth, rate_limit};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .filter(|dsn| !dsn.trim().is_empty())
        .cloned();

    let auth_opts = auth::Options::parse(matches)?;
    let rate_limit_opts = rate_limit::Options::parse(matches);

    if auth_opts.session_refresh_seconds > i64::from(auth_opts.session_ttl_seconds) {
        return Err(anyhow::anyhow!(
            "--{} must not exceed --{}",
            auth::ARG_SESSION_REFRESH_SECONDS,
            auth::ARG_SESSION_TTL_SECONDS
        ));
    }

    Ok(Action::Server(Args {
        port,
        dsn,
        session_key: auth_opts.session_key,
        verifier_key: auth_opts.verifier_key,
        frontend_base_url: auth_opts.frontend_base_url,
        app_name: auth_opts.app_name,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        session_window_seconds: auth_opts.session_window_seconds,
        session_refresh_seconds: auth_opts.session_refresh_seconds,
        verifier_ttl_seconds: auth_opts.verifier_ttl_seconds,
        rate_limit: rate_limit_opts.config,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    #[test]
    fn builds_server_action() {
        temp_env::with_vars(
            [
                ("TESSERA_DSN", None::<&str>),
                ("TESSERA_SESSION_KEY", Some(SESSION_KEY)),
                ("TESSERA_VERIFIER_KEY", Some(SESSION_KEY)),
                ("TESSERA_PORT", Some("8081")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["tessera"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 8081);
                    assert!(args.dsn.is_none());
                    assert_eq!(args.verifier_ttl_seconds, 925);
                }
            },
        );
    }

    #[test]
    fn refresh_longer_than_ttl_is_rejected() {
        temp_env::with_vars(
            [
                ("TESSERA_SESSION_KEY", Some(SESSION_KEY)),
                ("TESSERA_VERIFIER_KEY", Some(SESSION_KEY)),
                ("TESSERA_SESSION_TTL_SECONDS", Some("3600")),
                ("TESSERA_SESSION_REFRESH_SECONDS", Some("7200")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["tessera"]);
                let result = handler(&matches);
                assert!(result.is_err());
            },
        );
    }
}
