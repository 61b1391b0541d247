//! In-memory registry of shared catalogs.
//!
//! Maps each online user to the catalog they currently advertise. Catalogs
//! live only as long as the owner's control session: every `share` replaces
//! the catalog wholesale, an empty `share` evicts the user, and disconnect
//! removes the entry. The registry never touches the files themselves.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::debug;

use wirelay_core::protocol::{SearchResult, SharedFile};

/// Registry of all catalogs advertised by online users.
///
/// One lock covers queries and mutations alike; catalogs are small and
/// queries infrequent. The user map is a `BTreeMap` so iteration order, and
/// with it search-result order, is deterministic.
pub struct FileRegistry {
    catalogs: Mutex<BTreeMap<String, Vec<SharedFile>>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self {
            catalogs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replace `nickname`'s catalog. An empty list evicts the entry
    /// entirely: users sharing nothing are not addressable for downloads.
    pub fn replace(&self, nickname: &str, files: Vec<SharedFile>) {
        let mut catalogs = self.catalogs.lock().unwrap_or_else(|e| e.into_inner());
        if files.is_empty() {
            catalogs.remove(nickname);
            debug!(nickname, "cleared shared catalog");
        } else {
            debug!(nickname, count = files.len(), "updated shared catalog");
            catalogs.insert(nickname.to_string(), files);
        }
    }

    /// Evict `nickname`'s catalog (e.g. on disconnect).
    pub fn remove(&self, nickname: &str) {
        let mut catalogs = self.catalogs.lock().unwrap_or_else(|e| e.into_inner());
        catalogs.remove(nickname);
    }

    /// Case-insensitive substring search over non-directory entries across
    /// all users. Empty or whitespace-only queries yield nothing.
    pub fn search(&self, query: &str) -> Vec<SearchResult> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let catalogs = self.catalogs.lock().unwrap_or_else(|e| e.into_inner());
        let mut results = Vec::new();
        for (nickname, files) in catalogs.iter() {
            for file in files {
                if !file.is_dir && file.name.to_lowercase().contains(&query) {
                    results.push(SearchResult {
                        file_name: file.name.clone(),
                        size: file.size,
                        peer: nickname.clone(),
                    });
                }
            }
        }
        results
    }

    /// The `limit` largest non-directory entries, size descending. Ties
    /// break on file name, then peer, so the order is stable.
    pub fn top(&self, limit: usize) -> Vec<SearchResult> {
        let catalogs = self.catalogs.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<SearchResult> = catalogs
            .iter()
            .flat_map(|(nickname, files)| {
                files.iter().filter(|f| !f.is_dir).map(|f| SearchResult {
                    file_name: f.name.clone(),
                    size: f.size,
                    peer: nickname.clone(),
                })
            })
            .collect();

        all.sort_by(|a, b| {
            b.size
                .cmp(&a.size)
                .then_with(|| a.file_name.cmp(&b.file_name))
                .then_with(|| a.peer.cmp(&b.peer))
        });
        all.truncate(limit);
        all
    }

    /// Whether `owner` currently advertises a file with exactly this name.
    pub fn owns(&self, filename: &str, owner: &str) -> bool {
        self.lookup(filename, owner).is_some()
    }

    /// The descriptor for `filename` if `owner` advertises it.
    pub fn lookup(&self, filename: &str, owner: &str) -> Option<SharedFile> {
        let catalogs = self.catalogs.lock().unwrap_or_else(|e| e.into_inner());
        catalogs
            .get(owner)?
            .iter()
            .find(|f| f.name == filename)
            .cloned()
    }

    /// Total descriptors across all catalogs (for the status snapshot).
    pub fn total_files(&self) -> usize {
        let catalogs = self.catalogs.lock().unwrap_or_else(|e| e.into_inner());
        catalogs.values().map(Vec::len).sum()
    }
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size: u64) -> SharedFile {
        SharedFile {
            name: name.into(),
            size,
            is_dir: false,
        }
    }

    fn dir(name: &str) -> SharedFile {
        SharedFile {
            name: name.into(),
            size: 0,
            is_dir: true,
        }
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let registry = FileRegistry::new();
        registry.replace("alice", vec![file("song.flac", 1_048_576)]);

        let results = registry.search("SONG");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_name, "song.flac");
        assert_eq!(results[0].size, 1_048_576);
        assert_eq!(results[0].peer, "alice");
    }

    #[test]
    fn search_empty_and_whitespace_yield_nothing() {
        let registry = FileRegistry::new();
        registry.replace("alice", vec![file("a", 1)]);
        assert!(registry.search("").is_empty());
        assert!(registry.search("   ").is_empty());
    }

    #[test]
    fn search_skips_directories() {
        let registry = FileRegistry::new();
        registry.replace("alice", vec![dir("music"), file("music.mp3", 9)]);
        let results = registry.search("music");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_name, "music.mp3");
    }

    #[test]
    fn search_order_is_deterministic() {
        let registry = FileRegistry::new();
        registry.replace("bob", vec![file("x.txt", 1)]);
        registry.replace("alice", vec![file("x.txt", 2)]);

        let first = registry.search("x");
        let second = registry.search("x");
        assert_eq!(first, second);
        // BTreeMap iteration: alice before bob.
        assert_eq!(first[0].peer, "alice");
        assert_eq!(first[1].peer, "bob");
    }

    #[test]
    fn empty_share_evicts_user() {
        let registry = FileRegistry::new();
        registry.replace("alice", vec![file("a", 1)]);
        registry.replace("alice", vec![]);
        assert!(registry.search("a").is_empty());
        assert!(!registry.owns("a", "alice"));
    }

    #[test]
    fn remove_evicts_user() {
        let registry = FileRegistry::new();
        registry.replace("alice", vec![file("a", 1)]);
        registry.remove("alice");
        assert!(registry.search("a").is_empty());
        assert_eq!(registry.total_files(), 0);
    }

    #[test]
    fn replace_is_wholesale() {
        let registry = FileRegistry::new();
        registry.replace("alice", vec![file("old", 1), file("both", 2)]);
        registry.replace("alice", vec![file("new", 3)]);
        assert!(!registry.owns("old", "alice"));
        assert!(!registry.owns("both", "alice"));
        assert!(registry.owns("new", "alice"));
    }

    #[test]
    fn top_orders_by_size_with_stable_ties() {
        let registry = FileRegistry::new();
        registry.replace("alice", vec![file("big", 100), file("tie-a", 50)]);
        registry.replace("bob", vec![file("tie-a", 50), file("small", 1), dir("huge")]);

        let top = registry.top(3);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].file_name, "big");
        // Same size and name: peer breaks the tie.
        assert_eq!((top[1].peer.as_str(), top[2].peer.as_str()), ("alice", "bob"));
    }

    #[test]
    fn top_respects_limit() {
        let registry = FileRegistry::new();
        registry.replace(
            "alice",
            (0..10).map(|i| file(&format!("f{i}"), i)).collect(),
        );
        assert_eq!(registry.top(3).len(), 3);
        assert_eq!(registry.top(0).len(), 0);
        assert_eq!(registry.top(100).len(), 10);
    }

    #[test]
    fn lookup_requires_exact_name_and_owner() {
        let registry = FileRegistry::new();
        registry.replace("alice", vec![file("song.flac", 5)]);

        assert!(registry.lookup("song.flac", "alice").is_some());
        assert!(registry.lookup("SONG.FLAC", "alice").is_none());
        assert!(registry.lookup("song.flac", "bob").is_none());
        assert!(registry.owns("song.flac", "alice"));
    }

    #[test]
    fn total_files_counts_directories_too() {
        let registry = FileRegistry::new();
        registry.replace("alice", vec![file("a", 1), dir("d")]);
        registry.replace("bob", vec![file("b", 2)]);
        assert_eq!(registry.total_files(), 3);
    }
}
