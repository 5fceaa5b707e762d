//! Configuration errors and the string parsers shared by the config file and
//! the command line.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Read(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A collector file under `collector_path` did not parse.
    #[error("malformed collector file '{}': {source}", path.display())]
    CollectorFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// Parsed fine but a value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Parse a humantime duration such as `500ms`, `30s` or `1h30m`.
///
/// ```
/// use chartpoll::config::parse_duration;
///
/// assert_eq!(parse_duration("1h30m").unwrap().as_secs(), 5400);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    match s.trim() {
        "" => Err("empty duration".to_string()),
        s => humantime::parse_duration(s).map_err(|e| format!("'{s}': {e}")),
    }
}

/// Parse the collection interval handed to an external plugin.
///
/// A bare integer is a number of seconds (`5`); anything else goes through
/// [`parse_duration`] (`500ms`, `1m`). Zero is rejected.
///
/// ```
/// use chartpoll::config::parse_update_every;
///
/// assert_eq!(parse_update_every("5").unwrap().as_secs(), 5);
/// assert_eq!(parse_update_every("2m").unwrap().as_secs(), 120);
/// ```
pub fn parse_update_every(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let interval = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => parse_duration(s)?,
    };
    if interval.is_zero() {
        return Err("update_every must be positive".to_string());
    }
    Ok(interval)
}

fn env_reference() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").ok())
        .as_ref()
}

/// Substitute `${VAR}` and `${VAR:-fallback}` references from the process
/// environment. Unset variables without a fallback become empty.
pub fn expand_env_vars(input: &str) -> String {
    let Some(pattern) = env_reference() else {
        return input.to_owned();
    };
    pattern
        .replace_all(input, |caps: &Captures| {
            std::env::var(&caps[1])
                .unwrap_or_else(|_| caps.get(2).map_or("", |m| m.as_str()).to_owned())
        })
        .into_owned()
}
