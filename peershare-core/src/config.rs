//! Config file lookup shared by the daemons: the first existing of
//! `~/.config/peershare/<file>` and `/etc/peershare/<file>`, parsed as TOML.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::warn;

pub fn config_paths(file_name: &str) -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/peershare").join(file_name));
    }
    out.push(Path::new("/etc/peershare").join(file_name));
    out
}

/// Load `file_name` from the standard locations. `None` if absent or unusable.
pub fn load_file<T: DeserializeOwned>(file_name: &str) -> Option<T> {
    load_first(&config_paths(file_name))
}

/// Parse the first path that exists. Later paths are not consulted even when that
/// one is unreadable or invalid.
pub fn load_first<T: DeserializeOwned>(paths: &[PathBuf]) -> Option<T> {
    let p = paths.iter().find(|p| p.exists())?;
    match std::fs::read_to_string(p) {
        Ok(s) => match toml::from_str::<T>(&s) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("ignoring {}: {}", p.display(), e);
                None
            }
        },
        Err(e) => {
            warn!("cannot read {}: {}", p.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        port: u16,
    }

    #[test]
    fn user_file_comes_first() {
        let paths = config_paths("peer.toml");
        assert!(paths.last().unwrap().ends_with("peershare/peer.toml"));
        assert!(paths[0].ends_with("peershare/peer.toml"));
    }

    #[test]
    fn first_existing_file_wins() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.toml");
        let b = dir.path().join("b.toml");
        std::fs::write(&b, "port = 2").unwrap();
        let paths = vec![a.clone(), b.clone()];
        assert_eq!(load_first::<Sample>(&paths), Some(Sample { port: 2 }));
        std::fs::write(&a, "port = 1").unwrap();
        assert_eq!(load_first::<Sample>(&paths), Some(Sample { port: 1 }));
    }

    #[test]
    fn invalid_file_yields_none() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.toml");
        let b = dir.path().join("b.toml");
        std::fs::write(&a, "port = \"nope\"").unwrap();
        std::fs::write(&b, "port = 2").unwrap();
        assert_eq!(load_first::<Sample>(&[a, b]), None);
        assert_eq!(load_first::<Sample>(&[dir.path().join("missing")]), None);
    }
}
