use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::{ConnectionId, UserId};

/// Live connection state of one stream
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub host: Option<ConnectionId>,
    pub viewers: BTreeSet<ConnectionId>,
    pub owner_user_id: UserId,
    pub private_key: String,
}

impl RegistryEntry {
    fn new(owner_user_id: UserId, private_key: String) -> Self {
        Self {
            host: None,
            viewers: BTreeSet::new(),
            owner_user_id,
            private_key,
        }
    }

    fn is_abandoned(&self) -> bool {
        self.host.is_none() && self.viewers.is_empty()
    }
}

/// Streams a connection takes part in, for disconnect cleanup
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectionStreams {
    pub hosting: BTreeSet<String>,
    pub viewing: BTreeSet<String>,
}

impl ConnectionStreams {
    fn is_empty(&self) -> bool {
        self.hosting.is_empty() && self.viewing.is_empty()
    }
}

/// Outcome of `add_viewer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerJoin {
    pub count: usize,
    /// `false` for a repeated join or for the host joining its own stream
    pub inserted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub live_streams: usize,
    pub hosted_streams: usize,
    pub viewer_connections: usize,
}

/// Which connections are relaying which stream
///
/// Keyed by public id, with a reverse index from connection to streams so a
/// disconnect never scans every entry. Plain data, no I/O; callers hold the
/// surrounding lock for the whole of one relay operation.
///
/// Streams whose end is still being persisted are kept as tombstones so no
/// entry can be opened for them in the meantime.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    entries: HashMap<String, RegistryEntry>,
    connections: HashMap<ConnectionId, ConnectionStreams>,
    ending: HashSet<String>,
}

impl StreamRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, public_id: &str) -> bool {
        self.entries.contains_key(public_id)
    }

    #[must_use]
    pub fn get(&self, public_id: &str) -> Option<&RegistryEntry> {
        self.entries.get(public_id)
    }

    #[must_use]
    pub fn host_of(&self, public_id: &str) -> Option<&ConnectionId> {
        self.entries.get(public_id)?.host.as_ref()
    }

    #[must_use]
    pub fn viewer_count(&self, public_id: &str) -> usize {
        self.entries.get(public_id).map_or(0, |e| e.viewers.len())
    }

    #[must_use]
    pub fn is_viewer(&self, public_id: &str, conn: &ConnectionId) -> bool {
        self.entries
            .get(public_id)
            .is_some_and(|e| e.viewers.contains(conn))
    }

    /// Host first, then viewers
    #[must_use]
    pub fn participants(&self, public_id: &str) -> Vec<ConnectionId> {
        let Some(entry) = self.entries.get(public_id) else {
            return Vec::new();
        };
        entry
            .host
            .iter()
            .chain(entry.viewers.iter())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn viewers(&self, public_id: &str) -> Vec<ConnectionId> {
        self.entries
            .get(public_id)
            .map(|e| e.viewers.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn streams_for(&self, conn: &ConnectionId) -> ConnectionStreams {
        self.connections.get(conn).cloned().unwrap_or_default()
    }

    /// Create a host-less entry if none exists; returns whether one was created
    pub fn open(&mut self, public_id: &str, owner: &UserId, private_key: &str) -> bool {
        if self.entries.contains_key(public_id) {
            return false;
        }
        self.entries.insert(
            public_id.to_string(),
            RegistryEntry::new(owner.clone(), private_key.to_string()),
        );
        true
    }

    /// Make `host` the host of `public_id`, keeping any existing viewers
    ///
    /// Returns the replaced host connection, if it was a different one.
    pub fn register_host(
        &mut self,
        public_id: &str,
        host: ConnectionId,
        owner: &UserId,
        private_key: &str,
    ) -> Option<ConnectionId> {
        self.open(public_id, owner, private_key);

        let entry = self.entries.get_mut(public_id)?;
        entry.owner_user_id = owner.clone();
        entry.private_key = private_key.to_string();
        let was_viewer = entry.viewers.remove(&host);
        let previous = entry.host.replace(host.clone()).filter(|prev| prev != &host);

        if was_viewer {
            self.unindex(&host, |s| s.viewing.remove(public_id));
        }
        if let Some(prev) = &previous {
            self.unindex(prev, |s| s.hosting.remove(public_id));
        }
        self.connections
            .entry(host)
            .or_default()
            .hosting
            .insert(public_id.to_string());

        previous
    }

    /// `None` without an entry; the host is never counted as a viewer
    pub fn add_viewer(&mut self, public_id: &str, conn: ConnectionId) -> Option<ViewerJoin> {
        let entry = self.entries.get_mut(public_id)?;
        let inserted = entry.host.as_ref() != Some(&conn) && entry.viewers.insert(conn.clone());
        if inserted {
            self.connections
                .entry(conn)
                .or_default()
                .viewing
                .insert(public_id.to_string());
        }
        Some(ViewerJoin {
            count: entry.viewers.len(),
            inserted,
        })
    }

    /// Returns the viewer count after removal, or `None` if `conn` was not viewing
    ///
    /// An entry left with neither host nor viewers is deleted.
    pub fn remove_viewer(&mut self, public_id: &str, conn: &ConnectionId) -> Option<usize> {
        let entry = self.entries.get_mut(public_id)?;
        if !entry.viewers.remove(conn) {
            return None;
        }
        let remaining = entry.viewers.len();
        if entry.is_abandoned() {
            self.entries.remove(public_id);
        }
        self.unindex(conn, |s| s.viewing.remove(public_id));
        Some(remaining)
    }

    /// Delete the entry and every reverse-index reference to it
    pub fn remove(&mut self, public_id: &str) -> Option<RegistryEntry> {
        let entry = self.entries.remove(public_id)?;
        if let Some(host) = &entry.host {
            self.unindex(host, |s| s.hosting.remove(public_id));
        }
        for viewer in &entry.viewers {
            self.unindex(viewer, |s| s.viewing.remove(public_id));
        }
        Some(entry)
    }

    /// Remove the entry and refuse new ones until `finish_ending`
    pub fn begin_ending(&mut self, public_id: &str) -> Option<RegistryEntry> {
        let entry = self.remove(public_id)?;
        self.ending.insert(public_id.to_string());
        Some(entry)
    }

    #[must_use]
    pub fn is_ending(&self, public_id: &str) -> bool {
        self.ending.contains(public_id)
    }

    pub fn finish_ending(&mut self, public_id: &str) {
        self.ending.remove(public_id);
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live_streams: self.entries.len(),
            hosted_streams: self.entries.values().filter(|e| e.host.is_some()).count(),
            viewer_connections: self
                .connections
                .values()
                .filter(|s| !s.viewing.is_empty())
                .count(),
        }
    }

    fn unindex<F>(&mut self, conn: &ConnectionId, update: F)
    where
        F: FnOnce(&mut ConnectionStreams) -> bool,
    {
        if let Some(streams) = self.connections.get_mut(conn) {
            update(streams);
            if streams.is_empty() {
                self.connections.remove(conn);
            }
        }
    }

    #[cfg(test)]
    fn indexed_connections(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn as_set(ids: Vec<ConnectionId>) -> HashSet<ConnectionId> {
        ids.into_iter().collect()
    }

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    fn registry_with_host(public_id: &str, host: &str) -> StreamRegistry {
        let mut registry = StreamRegistry::new();
        registry.register_host(public_id, conn(host), &UserId::from("owner"), "key");
        registry
    }

    #[test]
    fn test_viewer_counts_follow_joins_and_leaves() {
        let mut registry = registry_with_host("abc", "host");

        assert_eq!(registry.add_viewer("abc", conn("a")).map(|j| j.count), Some(1));
        assert_eq!(registry.add_viewer("abc", conn("b")).map(|j| j.count), Some(2));
        assert_eq!(
            registry.add_viewer("abc", conn("a")),
            Some(ViewerJoin { count: 2, inserted: false })
        );
        assert_eq!(registry.remove_viewer("abc", &conn("a")), Some(1));
        assert_eq!(registry.remove_viewer("abc", &conn("a")), None);
        assert_eq!(registry.viewer_count("abc"), 1);
    }

    #[test]
    fn test_add_viewer_requires_entry() {
        let mut registry = StreamRegistry::new();
        assert_eq!(registry.add_viewer("missing", conn("a")), None);
        assert!(registry.is_empty());
        assert_eq!(registry.indexed_connections(), 0);
    }

    #[test]
    fn test_host_reregistration_keeps_viewers() {
        let mut registry = registry_with_host("abc", "host-1");
        registry.add_viewer("abc", conn("a"));

        let previous = registry.register_host("abc", conn("host-2"), &UserId::from("owner"), "key");
        assert_eq!(previous, Some(conn("host-1")));
        assert_eq!(registry.host_of("abc"), Some(&conn("host-2")));
        assert_eq!(registry.viewer_count("abc"), 1);
        assert!(registry.streams_for(&conn("host-1")).hosting.is_empty());

        let same = registry.register_host("abc", conn("host-2"), &UserId::from("owner"), "key");
        assert_eq!(same, None);
    }

    #[test]
    fn test_last_viewer_leaving_hostless_entry_deletes_it() {
        let mut registry = StreamRegistry::new();
        assert!(registry.open("abc", &UserId::from("owner"), "key"));
        assert!(!registry.open("abc", &UserId::from("owner"), "key"));
        registry.add_viewer("abc", conn("a"));

        assert_eq!(registry.remove_viewer("abc", &conn("a")), Some(0));
        assert!(!registry.contains("abc"));
        assert_eq!(registry.indexed_connections(), 0);
    }

    #[test]
    fn test_remove_clears_reverse_index() {
        let mut registry = registry_with_host("abc", "host");
        registry.add_viewer("abc", conn("a"));
        registry.add_viewer("abc", conn("b"));

        let entry = registry.remove("abc").unwrap();
        assert_eq!(entry.viewers.len(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.indexed_connections(), 0);
        assert!(registry.remove("abc").is_none());
    }

    #[test]
    fn test_streams_for_tracks_both_roles() {
        let mut registry = registry_with_host("abc", "x");
        registry.register_host("def", conn("host-2"), &UserId::from("other"), "key");
        registry.add_viewer("def", conn("x"));

        let streams = registry.streams_for(&conn("x"));
        assert!(streams.hosting.contains("abc"));
        assert!(streams.viewing.contains("def"));
    }

    #[test]
    fn test_participants_include_host_and_viewers() {
        let mut registry = registry_with_host("abc", "host");
        registry.add_viewer("abc", conn("a"));

        let participants = registry.participants("abc");
        assert_eq!(participants[0], conn("host"));
        assert_eq!(as_set(participants), as_set(vec![conn("host"), conn("a")]));
        assert!(registry.participants("missing").is_empty());
    }

    #[test]
    fn test_host_cannot_be_counted_as_viewer() {
        let mut registry = registry_with_host("abc", "host");
        assert_eq!(
            registry.add_viewer("abc", conn("host")),
            Some(ViewerJoin { count: 0, inserted: false })
        );
        assert!(registry.streams_for(&conn("host")).viewing.is_empty());
    }

    #[test]
    fn test_ending_tombstone_outlives_entry() {
        let mut registry = registry_with_host("abc", "host");
        registry.add_viewer("abc", conn("a"));

        let entry = registry.begin_ending("abc").unwrap();
        assert_eq!(entry.viewers.len(), 1);
        assert!(!registry.contains("abc"));
        assert!(registry.is_ending("abc"));
        assert_eq!(registry.indexed_connections(), 0);

        registry.finish_ending("abc");
        assert!(!registry.is_ending("abc"));
        assert!(registry.begin_ending("abc").is_none());
        assert!(!registry.is_ending("abc"));
    }

    #[test]
    fn test_stats() {
        let mut registry = registry_with_host("abc", "host");
        registry.open("def", &UserId::from("other"), "key");
        registry.add_viewer("def", conn("a"));
        registry.add_viewer("abc", conn("a"));

        assert_eq!(
            registry.stats(),
            RegistryStats {
                live_streams: 2,
                hosted_streams: 1,
                viewer_connections: 1,
            }
        );
    }
}
