//! Content registry: which peers serve which content, with least-used selection.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::net::SocketAddrV4;

use crate::protocol::Name;
use crate::wire::MAX_PAYLOAD;

/// Reply text for `list()` when nothing is registered.
pub const EMPTY_LISTING: &str = "No content registered";

/// One (peer, content) publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub peer: Name,
    pub content: Name,
    pub addr: SocketAddrV4,
    pub usage: u64,
}

impl Entry {
    fn matches(&self, peer: &Name, content: &Name) -> bool {
        self.peer == *peer && self.content == *content
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("peer {peer} already registered content {content}")]
    Duplicate { peer: Name, content: Name },
}

/// Entries in most-recent-first order. Owned by a single coordinator; no locking.
#[derive(Debug, Default)]
pub struct Registry {
    entries: VecDeque<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in traversal (most-recent-first) order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn contains(&self, peer: &Name, content: &Name) -> bool {
        self.entries.iter().any(|e| e.matches(peer, content))
    }

    /// Insert at the front with usage 0. Rejects an existing (peer, content) pair.
    pub fn add(
        &mut self,
        peer: Name,
        content: Name,
        addr: SocketAddrV4,
    ) -> Result<(), RegistryError> {
        if self.contains(&peer, &content) {
            return Err(RegistryError::Duplicate { peer, content });
        }
        self.entries.push_front(Entry {
            peer,
            content,
            addr,
            usage: 0,
        });
        Ok(())
    }

    /// Select the entry for `content` with the lowest usage. Among ties the first one
    /// in traversal order (the most recently registered) wins. Does not touch usage.
    pub fn find_least_used(&self, content: &Name) -> Option<&Entry> {
        let mut best: Option<&Entry> = None;
        for entry in self.entries.iter().filter(|e| e.content == *content) {
            match best {
                Some(b) if entry.usage >= b.usage => {}
                _ => best = Some(entry),
            }
        }
        best
    }

    /// Commit one use of the (peer, content) entry. Returns false if absent.
    pub fn increment_usage(&mut self, peer: &Name, content: &Name) -> bool {
        match self.entries.iter_mut().find(|e| e.matches(peer, content)) {
            Some(entry) => {
                entry.usage += 1;
                true
            }
            None => false,
        }
    }

    /// Remove the exact (peer, content) pair.
    pub fn remove(&mut self, peer: &Name, content: &Name) -> bool {
        match self.entries.iter().position(|e| e.matches(peer, content)) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// Listing sized for one text PDU.
    pub fn list(&self) -> String {
        self.list_text(MAX_PAYLOAD - 1)
    }

    /// `peer|content|ip:port;` per entry, most recent first. Only whole records are
    /// appended while they fit in `max_len` bytes.
    pub fn list_text(&self, max_len: usize) -> String {
        if self.entries.is_empty() {
            return EMPTY_LISTING.to_string();
        }
        let mut out = String::new();
        let mut record = String::new();
        for e in &self.entries {
            record.clear();
            let _ = write!(record, "{}|{}|{};", e.peer, e.content, e.addr);
            if out.len() + record.len() > max_len {
                break;
            }
            out.push_str(&record);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn name(s: &str) -> Name {
        Name::new(s).unwrap()
    }

    fn addr(last: u8, port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, last), port)
    }

    /// Select and commit, like the index does for a search.
    fn search(reg: &mut Registry, content: &str) -> Option<String> {
        let content = name(content);
        let peer = reg.find_least_used(&content)?.peer.clone();
        assert!(reg.increment_usage(&peer, &content));
        Some(peer.to_string())
    }

    #[test]
    fn duplicate_rejected_until_removed() {
        let mut reg = Registry::new();
        reg.add(name("alice"), name("doc"), addr(1, 5000)).unwrap();
        assert_eq!(
            reg.add(name("alice"), name("doc"), addr(1, 5001)),
            Err(RegistryError::Duplicate {
                peer: name("alice"),
                content: name("doc")
            })
        );
        // same content from another peer is fine
        reg.add(name("bob"), name("doc"), addr(2, 5000)).unwrap();
        assert!(reg.remove(&name("alice"), &name("doc")));
        reg.add(name("alice"), name("doc"), addr(1, 5002)).unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn newest_entry_is_first() {
        let mut reg = Registry::new();
        reg.add(name("a"), name("x"), addr(1, 1)).unwrap();
        reg.add(name("b"), name("y"), addr(2, 2)).unwrap();
        let peers: Vec<&str> = reg.iter().map(|e| e.peer.as_str()).collect();
        assert_eq!(peers, vec!["b", "a"]);
        assert_eq!(reg.iter().next().unwrap().usage, 0);
    }

    #[test]
    fn least_used_tie_goes_to_most_recent() {
        let mut reg = Registry::new();
        reg.add(name("A"), name("doc"), addr(1, 1)).unwrap();
        reg.add(name("B"), name("doc"), addr(2, 2)).unwrap();
        reg.add(name("C"), name("doc"), addr(3, 3)).unwrap();
        reg.increment_usage(&name("A"), &name("doc"));
        reg.increment_usage(&name("A"), &name("doc"));

        // usage A=2, B=0, C=0
        assert_eq!(search(&mut reg, "doc").as_deref(), Some("C"));
        assert_eq!(search(&mut reg, "doc").as_deref(), Some("B"));
        // A=2, B=1, C=1: tie between C and B, C is newer
        assert_eq!(search(&mut reg, "doc").as_deref(), Some("C"));
        assert_eq!(search(&mut reg, "doc").as_deref(), Some("B"));
        // all at 2: C, B, A in traversal order
        assert_eq!(search(&mut reg, "doc").as_deref(), Some("C"));
        assert_eq!(search(&mut reg, "doc").as_deref(), Some("B"));
        assert_eq!(search(&mut reg, "doc").as_deref(), Some("A"));
    }

    #[test]
    fn find_is_a_dry_run() {
        let mut reg = Registry::new();
        reg.add(name("A"), name("doc"), addr(1, 1)).unwrap();
        reg.add(name("B"), name("doc"), addr(2, 2)).unwrap();
        for _ in 0..3 {
            assert_eq!(reg.find_least_used(&name("doc")).unwrap().peer, name("B"));
        }
        assert!(reg.iter().all(|e| e.usage == 0));
        assert!(reg.find_least_used(&name("other")).is_none());
    }

    #[test]
    fn remove_needs_exact_pair() {
        let mut reg = Registry::new();
        reg.add(name("A"), name("doc"), addr(1, 1)).unwrap();
        assert!(!reg.remove(&name("A"), &name("doc2")));
        assert!(!reg.remove(&name("B"), &name("doc")));
        assert!(!reg.increment_usage(&name("B"), &name("doc")));
        assert!(reg.remove(&name("A"), &name("doc")));
        assert!(reg.is_empty());
        assert!(!reg.remove(&name("A"), &name("doc")));
    }

    #[test]
    fn listing_format() {
        let mut reg = Registry::new();
        assert_eq!(reg.list(), EMPTY_LISTING);
        reg.add(
            name("peer1"),
            name("fileA"),
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 5000),
        )
        .unwrap();
        reg.add(
            name("peer2"),
            name("fileB"),
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 11), 6000),
        )
        .unwrap();
        assert_eq!(
            reg.list(),
            "peer2|fileB|192.168.1.11:6000;peer1|fileA|192.168.1.10:5000;"
        );
    }

    #[test]
    fn listing_keeps_whole_records_only() {
        let mut reg = Registry::new();
        for i in 0..10u8 {
            reg.add(name(&format!("peer{}", i)), name("content"), addr(i, 4000))
                .unwrap();
        }
        let text = reg.list();
        assert!(text.len() <= MAX_PAYLOAD - 1);
        assert!(text.ends_with(';'));
        assert!(text.starts_with("peer9|content|10.0.0.9:4000;"));
        assert!(text.split(';').filter(|r| !r.is_empty()).count() < 10);
    }

    #[test]
    fn random_operations_keep_pairs_unique() {
        use rand::Rng;
        use std::collections::HashSet;

        let peers = ["a", "b", "c"];
        let contents = ["x", "y"];
        let mut rng = rand::thread_rng();
        let mut reg = Registry::new();
        let mut model: HashSet<(usize, usize)> = HashSet::new();
        for _ in 0..500 {
            let (p, c) = (rng.gen_range(0..peers.len()), rng.gen_range(0..contents.len()));
            let (peer, content) = (name(peers[p]), name(contents[c]));
            if rng.gen_bool(0.5) {
                let added = reg.add(peer, content, addr(p as u8, 1000)).is_ok();
                assert_eq!(added, model.insert((p, c)));
            } else {
                assert_eq!(reg.remove(&peer, &content), model.remove(&(p, c)));
            }
            assert_eq!(reg.len(), model.len());
        }
    }
}
