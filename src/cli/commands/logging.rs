use clap::{Arg, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order, index 0 is the default.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accept either a level name or a verbosity count (0-5).
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(|level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        LEVELS
            .iter()
            .position(|name| name.eq_ignore_ascii_case(level))
            .and_then(|index| u8::try_from(index).ok())
            .ok_or_else(|| format!("invalid log level, expected one of: {}", LEVELS.join(", ")))
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("TESSERA_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_flags() -> Result<(), clap::Error> {
        temp_env::with_vars([("TESSERA_LOG_LEVEL", None::<&str>)], || {
            let matches = with_args(Command::new("tessera"))
                .try_get_matches_from(vec!["tessera", "-vvv"])?;
            assert_eq!(matches.get_one::<u8>(ARG_VERBOSITY).copied(), Some(3));
            Ok(())
        })
    }

    #[test]
    fn level_names_from_env() {
        for (index, level) in LEVELS.iter().enumerate() {
            temp_env::with_vars([("TESSERA_LOG_LEVEL", Some(level.to_uppercase()))], || {
                let matches = with_args(Command::new("tessera")).get_matches_from(vec!["tessera"]);
                assert_eq!(
                    matches.get_one::<u8>(ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }
}
