//! Shared directory cache. One instance per context; engines on the
//! same server see each other's listings.

use chrono::NaiveDateTime;
use dashmap::DashMap;
use listing::DirectoryListing;
use protocol::{Protocol, Server, ServerPath};
use std::time::Instant;

/// Cache identity of a server: enough to make two sessions share
/// listings iff they really observe the same remote tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerKey {
    protocol: Protocol,
    host: String,
    port: u16,
    user: String,
}

impl ServerKey {
    /// Derives the cache identity from a server.
    #[must_use]
    pub fn of(server: &Server) -> Self {
        Self {
            protocol: server.protocol,
            host: server.host.clone(),
            port: server.port,
            user: server.logon_user().to_owned(),
        }
    }
}

#[derive(Clone)]
struct CacheEntry {
    listing: DirectoryListing,
    stored: Instant,
    outdated: bool,
}

/// Result of a cache lookup.
pub struct CacheHit {
    /// The cached listing.
    pub listing: DirectoryListing,
    /// Entry was invalidated by a peer and needs a refresh.
    pub outdated: bool,
    /// Entries carry unsure parse bits.
    pub unsure: bool,
}

/// Process-wide listing cache with interior synchronisation.
#[derive(Default)]
pub struct DirectoryCache {
    entries: DashMap<(ServerKey, String), CacheEntry>,
}

impl DirectoryCache {
    fn key(server: &ServerKey, path: &ServerPath) -> (ServerKey, String) {
        (server.clone(), path.to_string())
    }

    /// Looks a directory up.
    #[must_use]
    pub fn lookup(&self, server: &ServerKey, path: &ServerPath) -> Option<CacheHit> {
        let entry = self.entries.get(&Self::key(server, path))?;
        Some(CacheHit {
            listing: entry.listing.clone(),
            outdated: entry.outdated,
            unsure: entry.listing.has_unsure_entries(),
        })
    }

    /// Stores a listing; returns `true` when the content differs from
    /// what was cached before (peers should redraw).
    pub fn store(&self, server: &ServerKey, listing: DirectoryListing) -> bool {
        let key = Self::key(server, &listing.path);
        let modified = self
            .entries
            .get(&key)
            .is_none_or(|previous| previous.listing.entries != listing.entries);
        self.entries.insert(
            key,
            CacheEntry {
                listing,
                stored: Instant::now(),
                outdated: false,
            },
        );
        modified
    }

    /// Refreshes the store timestamp without replacing content; used
    /// when a peer reports the directory unchanged.
    pub fn touch(&self, server: &ServerKey, path: &ServerPath) {
        if let Some(mut entry) = self.entries.get_mut(&Self::key(server, path)) {
            entry.stored = Instant::now();
            entry.outdated = false;
        }
    }

    /// Marks one directory as needing a refresh.
    pub fn mark_outdated(&self, server: &ServerKey, path: &ServerPath) {
        if let Some(mut entry) = self.entries.get_mut(&Self::key(server, path)) {
            entry.outdated = true;
        }
    }

    /// Updates one file's size (and optionally time) in place after a
    /// successful transfer.
    pub fn update_file(
        &self,
        server: &ServerKey,
        path: &ServerPath,
        name: &str,
        size: i64,
        time: Option<NaiveDateTime>,
    ) {
        if let Some(mut entry) = self.entries.get_mut(&Self::key(server, path)) {
            let updated = entry
                .listing
                .entries
                .iter_mut()
                .find(|e| e.name == name)
                .map(|file| {
                    file.size = size;
                    if let Some(time) = time {
                        file.time = Some(listing::EntryTime::from_date_time(
                            time.date(),
                            time.time(),
                            true,
                        ));
                    }
                })
                .is_some();
            // A file the listing did not know about: the directory
            // content is stale now.
            if !updated {
                entry.outdated = true;
            }
        }
    }

    /// Removes one file entry after a delete.
    pub fn remove_file(&self, server: &ServerKey, path: &ServerPath, name: &str) {
        if let Some(mut entry) = self.entries.get_mut(&Self::key(server, path)) {
            entry.listing.entries.retain(|e| e.name != name);
        }
    }

    /// Drops a directory and its whole subtree (rmdir, rename of a
    /// directory), and removes the entry from the parent listing.
    pub fn invalidate_subtree(&self, server: &ServerKey, path: &ServerPath) {
        self.entries.retain(|(key_server, key_path), _| {
            if key_server != server {
                return true;
            }
            let Some(parsed) = ServerPath::parse(path.syntax(), key_path) else {
                return true;
            };
            !(parsed.same_dir(path) || parsed.is_subdir_of(path))
        });
        if let (Some(parent), Some(name)) = (path.parent(), path.last_segment()) {
            self.remove_file(server, &parent, name);
            self.mark_outdated(server, &parent);
        }
    }

    /// Age of a cached directory, for freshness decisions.
    #[must_use]
    pub fn age(&self, server: &ServerKey, path: &ServerPath) -> Option<std::time::Duration> {
        self.entries
            .get(&Self::key(server, path))
            .map(|entry| entry.stored.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listing::ListingEntry;
    use protocol::PathSyntax;

    fn server_key() -> ServerKey {
        ServerKey::of(&Server {
            host: "example.com".into(),
            port: 21,
            ..Server::default()
        })
    }

    fn listing_with(path: &str, names: &[&str]) -> DirectoryListing {
        DirectoryListing {
            path: ServerPath::parse(PathSyntax::Unix, path).expect("valid path"),
            entries: names
                .iter()
                .map(|name| ListingEntry {
                    name: (*name).to_owned(),
                    ..ListingEntry::default()
                })
                .collect(),
        }
    }

    #[test]
    fn store_reports_modification() {
        let cache = DirectoryCache::default();
        let key = server_key();
        assert!(cache.store(&key, listing_with("/a", &["x"])));
        assert!(!cache.store(&key, listing_with("/a", &["x"])));
        assert!(cache.store(&key, listing_with("/a", &["x", "y"])));
    }

    #[test]
    fn subtree_invalidation_removes_children_and_parent_entry() {
        let cache = DirectoryCache::default();
        let key = server_key();
        cache.store(&key, listing_with("/a", &["b"]));
        cache.store(&key, listing_with("/a/b", &["c"]));
        cache.store(&key, listing_with("/a/b/c", &[]));
        cache.store(&key, listing_with("/other", &[]));

        let doomed = ServerPath::parse(PathSyntax::Unix, "/a/b").expect("valid path");
        cache.invalidate_subtree(&key, &doomed);

        assert!(cache.lookup(&key, &doomed).is_none());
        let grandchild = ServerPath::parse(PathSyntax::Unix, "/a/b/c").expect("valid path");
        assert!(cache.lookup(&key, &grandchild).is_none());
        let parent = ServerPath::parse(PathSyntax::Unix, "/a").expect("valid path");
        let hit = cache.lookup(&key, &parent).expect("parent stays cached");
        assert!(hit.outdated);
        assert!(hit.listing.entries.is_empty());
        let other = ServerPath::parse(PathSyntax::Unix, "/other").expect("valid path");
        assert!(cache.lookup(&key, &other).is_some());
    }

    #[test]
    fn file_updates_apply_in_place() {
        let cache = DirectoryCache::default();
        let key = server_key();
        cache.store(&key, listing_with("/a", &["f"]));
        let path = ServerPath::parse(PathSyntax::Unix, "/a").expect("valid path");
        cache.update_file(&key, &path, "f", 42, None);
        let hit = cache.lookup(&key, &path).expect("cached");
        assert_eq!(hit.listing.entries[0].size, 42);

        cache.remove_file(&key, &path, "f");
        let hit = cache.lookup(&key, &path).expect("cached");
        assert!(hit.listing.entries.is_empty());
    }
}
