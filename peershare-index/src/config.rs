//! Load config from file and environment.

use serde::Deserialize;
use tracing::warn;

/// Index service configuration. File: ~/.config/peershare/index.toml or /etc/peershare/index.toml.
/// Env override: PEERSHARE_INDEX_PORT. A port given on the command line wins over both.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// UDP listen port (default 3000).
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = peershare_core::config::load_file::<Config>("index.toml").unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("PEERSHARE_INDEX_PORT") {
        match s.parse::<u16>() {
            Ok(p) => c.port = p,
            Err(_) => warn!("ignoring PEERSHARE_INDEX_PORT={:?}: not a port", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_3000() {
        assert_eq!(Config::default().port, 3000);
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn file_and_env_override() {
        let mut c: Config = toml::from_str("port = 4000").unwrap();
        assert_eq!(c.port, 4000);
        apply_env(&mut c, |k| (k == "PEERSHARE_INDEX_PORT").then(|| "5000".to_string()));
        assert_eq!(c.port, 5000);
        apply_env(&mut c, |_| Some("not-a-port".to_string()));
        assert_eq!(c.port, 5000);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("prot = 1").is_err());
    }
}
