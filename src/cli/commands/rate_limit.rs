use crate::auth::RateLimitConfig;
use clap::{Arg, ArgMatches, Command};

pub const ARG_RATE_LIMIT_MAX: &str = "rate-limit-max";
pub const ARG_RATE_LIMIT_WINDOW_SECONDS: &str = "rate-limit-window-seconds";
pub const ARG_RATE_LIMIT_BACKOFF_SECONDS: &str = "rate-limit-backoff-seconds";
pub const ARG_RATE_LIMIT_MAX_BACKOFF_SECONDS: &str = "rate-limit-max-backoff-seconds";

pub struct Options {
    pub config: RateLimitConfig,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let defaults = RateLimitConfig::default();
        let read = |id: &str, default: i64| matches.get_one::<i64>(id).copied().unwrap_or(default);

        Self {
            config: RateLimitConfig {
                max_count: read(ARG_RATE_LIMIT_MAX, defaults.max_count),
                window_seconds: read(ARG_RATE_LIMIT_WINDOW_SECONDS, defaults.window_seconds),
                backoff_seconds: read(ARG_RATE_LIMIT_BACKOFF_SECONDS, defaults.backoff_seconds),
                max_backoff_seconds: read(
                    ARG_RATE_LIMIT_MAX_BACKOFF_SECONDS,
                    defaults.max_backoff_seconds,
                ),
            },
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_MAX)
                .long(ARG_RATE_LIMIT_MAX)
                .help("Verifier emails allowed per address within one window")
                .env("TESSERA_RATE_LIMIT_MAX")
                .default_value("3")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .long(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .help("Rate limit window in seconds")
                .env("TESSERA_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_BACKOFF_SECONDS)
                .long(ARG_RATE_LIMIT_BACKOFF_SECONDS)
                .help("Seconds the window start moves forward on every limited attempt")
                .env("TESSERA_RATE_LIMIT_BACKOFF_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_MAX_BACKOFF_SECONDS)
                .long(ARG_RATE_LIMIT_MAX_BACKOFF_SECONDS)
                .help("Upper bound on how far past now the window start may move")
                .env("TESSERA_RATE_LIMIT_MAX_BACKOFF_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
}
