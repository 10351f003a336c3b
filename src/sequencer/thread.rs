//! Source thread key to destination root id mapping.

use std::collections::HashMap;

use tokio::sync::Mutex;

/// The outcome of resolving one message into its thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPost {
    /// Destination id recorded for the thread's root message
    pub root_id: String,
    /// Destination id of the message this call posted
    pub message_id: String,
    /// Whether this call posted the thread root (as opposed to a reply)
    pub posted_root: bool,
}

/// Write-once mapping from source thread keys to destination root ids.
///
/// Entries are first-writer-wins: once a key maps to a root id, later
/// [`record`](ThreadMapping::record) calls for the same key leave the entry
/// alone and return the recorded winner. If two workers race to post the
/// root for the same unseen key, both root posts go out and the loser's
/// message remains as a duplicate root on the destination; only the mapping
/// table is deduplicated. That duplicate is a known gap, kept rather than
/// papered over.
///
/// Scoped to one run: construct fresh at run start, discard at run end.
#[derive(Debug, Default)]
pub struct ThreadMapping {
    roots: Mutex<HashMap<String, String>>,
}

impl ThreadMapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// The destination root id recorded for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.roots.lock().await.get(key).cloned()
    }

    /// Record `root_id` for `key` unless a winner already exists.
    ///
    /// Returns the id that is now recorded, which is the earlier writer's on
    /// a race.
    pub async fn record(&self, key: &str, root_id: String) -> String {
        let mut roots = self.roots.lock().await;
        roots.entry(key.to_string()).or_insert(root_id).clone()
    }

    /// Number of threads mapped so far.
    pub async fn len(&self) -> usize {
        self.roots.lock().await.len()
    }

    /// Whether no threads have been mapped yet.
    pub async fn is_empty(&self) -> bool {
        self.roots.lock().await.is_empty()
    }
}
