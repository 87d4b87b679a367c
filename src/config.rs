//! Runtime configuration from the process environment, optionally seeded
//! from a dotenv-style file.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use crate::models::device::{DeviceIdentity, Generation};

pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_POLL_SECS: u64 = 30;
const TIMEOUT_RANGE: (u64, u64) = (3, 120);
const POLL_RANGE: (u64, u64) = (10, 300);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// IP address or host name of the thermostat.
    pub host: String,
    pub serial: String,
    /// `None` means detect by pairing at startup.
    pub generation: Option<Generation>,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get("TERNEO_HOST").ok_or_else(|| "Missing TERNEO_HOST (thermostat IP or host name)".to_string())?;
        let serial = get("TERNEO_SERIAL").ok_or_else(|| "Missing TERNEO_SERIAL (device serial number)".to_string())?;
        let generation = get("TERNEO_GENERATION")
            .map(|s| s.parse::<Generation>())
            .transpose()
            .map_err(|e| format!("TERNEO_GENERATION: {}", e))?;
        let timeout = seconds(get("TERNEO_TIMEOUT_SECS"), "TERNEO_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS, TIMEOUT_RANGE)?;
        let poll_interval = seconds(get("POLL_INTERVAL_SECS"), "POLL_INTERVAL_SECS", DEFAULT_POLL_SECS, POLL_RANGE)?;

        Ok(Config {
            host,
            serial,
            generation,
            timeout,
            poll_interval,
        })
    }

    /// Identity for the client once the generation is known.
    pub fn identity(&self, generation: Generation) -> DeviceIdentity {
        DeviceIdentity::new(self.serial.clone(), self.host.clone(), generation)
    }
}

fn seconds(raw: Option<String>, key: &str, default: u64, (lo, hi): (u64, u64)) -> Result<Duration, String> {
    let secs = match raw {
        None => default,
        Some(s) => s
            .parse::<u64>()
            .map_err(|_| format!("{} must be a whole number of seconds, got {:?}", key, s))?,
    };
    if secs < lo || secs > hi {
        return Err(format!("{} must be between {} and {} seconds, got {}", key, lo, hi, secs));
    }
    Ok(Duration::from_secs(secs))
}

/// Export every assignment in `path` that the process environment does not already define.
pub fn load_env_file(path: &Path) -> Result<usize, String> {
    let file = std::fs::File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let mut exported = 0;
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| format!("{}:{}: {}", path.display(), n + 1, e))?;
        let Some((key, value)) = parse_env_line(&line).map_err(|e| format!("{}:{}: {}", path.display(), n + 1, e))?
        else {
            continue;
        };
        if std::env::var_os(&key).is_none() {
            // SAFETY: called from `main` before any other thread is spawned.
            unsafe {
                std::env::set_var(&key, value);
            }
            exported += 1;
        }
    }
    Ok(exported)
}

/// One `KEY=value` line. Blank lines and `#` comments yield `None`.
///
/// Values may be bare (trailing ` #` comment stripped), `'single'` (literal)
/// or `"double"` quoted (`\n`, `\t`, `\\` and `\"` escapes).
pub fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
    let (key, raw) = line.split_once('=').ok_or_else(|| "expected KEY=value".to_string())?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("invalid variable name {:?}", key));
    }
    Ok(Some((key.to_string(), unquote(raw.trim())?)))
}

fn unquote(raw: &str) -> Result<String, String> {
    let Some(quote) = raw.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        let bare = match raw.find(" #") {
            Some(i) => &raw[..i],
            None => raw,
        };
        return Ok(bare.trim_end().to_string());
    };

    let mut value = String::new();
    let mut chars = raw[1..].char_indices();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            let rest = raw[1 + i + 1..].trim_start();
            if !rest.is_empty() && !rest.starts_with('#') {
                return Err("unexpected text after closing quote".to_string());
            }
            return Ok(value);
        }
        if c == '\\' && quote == '"' {
            let (_, escaped) = chars.next().ok_or_else(|| "dangling escape".to_string())?;
            value.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
            continue;
        }
        value.push(c);
    }
    Err(format!("unterminated {} quote", quote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply() {
        let cfg = Config::from_lookup(lookup(&[("TERNEO_HOST", "192.168.1.50"), ("TERNEO_SERIAL", "ABC")])).unwrap();
        assert_eq!(cfg.host, "192.168.1.50");
        assert_eq!(cfg.generation, None);
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.identity(Generation::Old).generation, Generation::Old);
    }

    #[test]
    fn explicit_values_and_ranges() {
        let cfg = Config::from_lookup(lookup(&[
            ("TERNEO_HOST", "terneo.local"),
            ("TERNEO_SERIAL", "ABC"),
            ("TERNEO_GENERATION", "NEW"),
            ("TERNEO_TIMEOUT_SECS", "10"),
            ("POLL_INTERVAL_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(cfg.generation, Some(Generation::New));
        assert_eq!(cfg.timeout, Duration::from_secs(10));

        let too_fast = Config::from_lookup(lookup(&[
            ("TERNEO_HOST", "h"),
            ("TERNEO_SERIAL", "s"),
            ("POLL_INTERVAL_SECS", "5"),
        ]));
        assert!(too_fast.unwrap_err().contains("POLL_INTERVAL_SECS"));
    }

    #[test]
    fn missing_or_bad_values_fail() {
        assert!(Config::from_lookup(lookup(&[("TERNEO_SERIAL", "s")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TERNEO_HOST", "h"), ("TERNEO_SERIAL", "  ")])).is_err());
        assert!(
            Config::from_lookup(lookup(&[
                ("TERNEO_HOST", "h"),
                ("TERNEO_SERIAL", "s"),
                ("TERNEO_GENERATION", "v3"),
            ]))
            .is_err()
        );
        assert!(
            Config::from_lookup(lookup(&[
                ("TERNEO_HOST", "h"),
                ("TERNEO_SERIAL", "s"),
                ("TERNEO_TIMEOUT_SECS", "soon"),
            ]))
            .is_err()
        );
    }

    #[test]
    fn env_lines() {
        assert_eq!(parse_env_line("  # comment").unwrap(), None);
        assert_eq!(parse_env_line("").unwrap(), None);
        assert_eq!(
            parse_env_line("export TERNEO_HOST=10.0.0.7 # office").unwrap(),
            Some(("TERNEO_HOST".to_string(), "10.0.0.7".to_string()))
        );
        assert_eq!(
            parse_env_line(r#"RUST_LOG="terneo_lan=debug\tx""#).unwrap(),
            Some(("RUST_LOG".to_string(), "terneo_lan=debug\tx".to_string()))
        );
        assert_eq!(
            parse_env_line(r"KEY='a\n#b'").unwrap(),
            Some(("KEY".to_string(), r"a\n#b".to_string()))
        );
        assert_eq!(parse_env_line("EMPTY=").unwrap(), Some(("EMPTY".to_string(), String::new())));
        assert!(parse_env_line("NO_EQUALS").is_err());
        assert!(parse_env_line("BAD KEY=1").is_err());
        assert!(parse_env_line(r#"K="open"#).is_err());
        assert!(parse_env_line(r#"K="a" trailing"#).is_err());
    }
}
