use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SESSION_KEY: &str = "session-key";
pub const ARG_VERIFIER_KEY: &str = "verifier-key";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_APP_NAME: &str = "app-name";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_SESSION_WINDOW_SECONDS: &str = "session-window-seconds";
pub const ARG_SESSION_REFRESH_SECONDS: &str = "session-refresh-seconds";
pub const ARG_VERIFIER_TTL_SECONDS: &str = "verifier-ttl-seconds";

pub struct Options {
    pub session_key: SecretString,
    pub verifier_key: SecretString,
    pub frontend_base_url: String,
    pub app_name: String,
    pub session_ttl_seconds: u32,
    pub session_window_seconds: i64,
    pub session_refresh_seconds: i64,
    pub verifier_ttl_seconds: u32,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a key is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_secret = |id: &str| -> anyhow::Result<SecretString> {
            matches
                .get_one::<String>(id)
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::from(v.clone()))
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            session_key: read_secret(ARG_SESSION_KEY)?,
            verifier_key: read_secret(ARG_VERIFIER_KEY)?,
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .unwrap_or_else(|| "https://tessera.dev".to_string()),
            app_name: matches
                .get_one::<String>(ARG_APP_NAME)
                .cloned()
                .unwrap_or_else(|| "Tessera".to_string()),
            session_ttl_seconds: matches
                .get_one::<u32>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(604_800),
            session_window_seconds: matches
                .get_one::<i64>(ARG_SESSION_WINDOW_SECONDS)
                .copied()
                .unwrap_or(604_800),
            session_refresh_seconds: matches
                .get_one::<i64>(ARG_SESSION_REFRESH_SECONDS)
                .copied()
                .unwrap_or(172_800),
            verifier_ttl_seconds: matches
                .get_one::<u32>(ARG_VERIFIER_TTL_SECONDS)
                .copied()
                .unwrap_or(925),
        })
    }
}

pub fn with_args(command: Command) -> Command {
    let command = with_key_args(command);
    with_session_args(command)
}

fn with_key_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_KEY)
                .long(ARG_SESSION_KEY)
                .help("Base64 encoded 32 byte key for session tokens")
                .env("TESSERA_SESSION_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_VERIFIER_KEY)
                .long(ARG_VERIFIER_KEY)
                .help("Base64 encoded 32 byte key for verifier tokens")
                .env("TESSERA_VERIFIER_KEY")
                .hide_env_values(true)
                .required(true),
        )
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for verification links")
                .env("TESSERA_FRONTEND_BASE_URL")
                .default_value("https://tessera.dev"),
        )
        .arg(
            Arg::new(ARG_APP_NAME)
                .long(ARG_APP_NAME)
                .help("Application name used in email subjects")
                .env("TESSERA_APP_NAME")
                .default_value("Tessera"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session token TTL in seconds")
                .env("TESSERA_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_SESSION_WINDOW_SECONDS)
                .long(ARG_SESSION_WINDOW_SECONDS)
                .help("Sessions issued before this many seconds ago are pruned")
                .env("TESSERA_SESSION_WINDOW_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SESSION_REFRESH_SECONDS)
                .long(ARG_SESSION_REFRESH_SECONDS)
                .help("Renew sessions that expire within this many seconds")
                .env("TESSERA_SESSION_REFRESH_SECONDS")
                .default_value("172800")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
        .arg(
            Arg::new(ARG_VERIFIER_TTL_SECONDS)
                .long(ARG_VERIFIER_TTL_SECONDS)
                .help("Verifier (email link) TTL in seconds")
                .env("TESSERA_VERIFIER_TTL_SECONDS")
                .default_value("925")
                .value_parser(clap::value_parser!(u32)),
        )
}
