//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Peer node configuration. File: ~/.config/peershare/peer.toml or /etc/peershare/peer.toml.
/// Env overrides: PEERSHARE_INDEX_HOST, PEERSHARE_INDEX_PORT, PEERSHARE_REQUEST_TIMEOUT_MS,
/// PEERSHARE_DOWNLOAD_DIR. Host and port given on the command line win over all of these.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Index service host name or IPv4 address (default "localhost").
    #[serde(default = "default_index_host")]
    pub index_host: String,
    /// Index service UDP port (default 3000).
    #[serde(default = "default_index_port")]
    pub index_port: u16,
    /// How long to wait for an index reply. Unset waits indefinitely.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Where downloaded content is written (default: current directory).
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_index_host() -> String {
    "localhost".to_string()
}

fn default_index_port() -> u16 {
    3000
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_host: default_index_host(),
            index_port: default_index_port(),
            request_timeout_ms: None,
            download_dir: default_download_dir(),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = peershare_core::config::load_file::<Config>("peer.toml").unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("PEERSHARE_INDEX_HOST") {
        if !s.is_empty() {
            c.index_host = s;
        }
    }
    if let Some(s) = var("PEERSHARE_INDEX_PORT") {
        match s.parse::<u16>() {
            Ok(p) => c.index_port = p,
            Err(_) => warn!("ignoring PEERSHARE_INDEX_PORT={:?}: not a port", s),
        }
    }
    if let Some(s) = var("PEERSHARE_REQUEST_TIMEOUT_MS") {
        match s.parse::<u64>() {
            Ok(ms) => c.request_timeout_ms = Some(ms),
            Err(_) => warn!("ignoring PEERSHARE_REQUEST_TIMEOUT_MS={:?}", s),
        }
    }
    if let Some(s) = var("PEERSHARE_DOWNLOAD_DIR") {
        if !s.is_empty() {
            c.download_dir = PathBuf::from(s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.index_host, "localhost");
        assert_eq!(c.index_port, 3000);
        assert_eq!(c.request_timeout(), None);
        assert_eq!(c.download_dir, PathBuf::from("."));
        assert_eq!(toml::from_str::<Config>("").unwrap(), c);
    }

    #[test]
    fn file_values() {
        let c: Config = toml::from_str(
            "index_host = \"10.0.0.5\"\nindex_port = 4000\nrequest_timeout_ms = 2500\ndownload_dir = \"/tmp/dl\"",
        )
        .unwrap();
        assert_eq!(c.index_host, "10.0.0.5");
        assert_eq!(c.index_port, 4000);
        assert_eq!(c.request_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(c.download_dir, PathBuf::from("/tmp/dl"));
    }

    #[test]
    fn env_overrides_file() {
        let mut c: Config = toml::from_str("index_port = 4000").unwrap();
        apply_env(&mut c, |k| match k {
            "PEERSHARE_INDEX_HOST" => Some("index.lan".to_string()),
            "PEERSHARE_INDEX_PORT" => Some("bogus".to_string()),
            "PEERSHARE_REQUEST_TIMEOUT_MS" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(c.index_host, "index.lan");
        assert_eq!(c.index_port, 4000);
        // zero means no timeout
        assert_eq!(c.request_timeout(), None);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("index = \"x\"").is_err());
    }
}
