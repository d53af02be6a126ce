//! Reference-passing handle stores.
//!
//! A [`HandleStore`] maps opaque reference strings to decoded media handles so
//! that a chain of tool calls can hand a derived clip from one tool to the
//! next without re-reading it from disk.
//!
//! # Resolution
//!
//! [`HandleStore::load`] accepts either a reference issued by
//! [`HandleStore::store`] or a filesystem path. The string is first looked up
//! as a key; on a miss it is handed to the store's [`MediaDecoder`] verbatim.
//! There is no "unknown reference" error: a stale or mistyped reference is
//! decoded as a path and fails with [`Error::Decode`].
//!
//! A user path that happens to equal a live reference resolves to the stored
//! handle, not the file. References are UUID v4 strings, so this only happens
//! when a caller deliberately names a file after one.
//!
//! Stores never evict. Entries leave only through [`HandleStore::clear`].

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;
use video_edit_mcp_common::error::Error;

/// Opens a path on disk as a decoded media handle.
#[async_trait]
pub trait MediaDecoder: Send + Sync + 'static {
    /// The handle type produced by this decoder.
    type Handle: Send + Sync + 'static;

    /// Decode the media at `path`.
    ///
    /// # Errors
    /// Returns [`Error::Decode`] when the path is missing or not decodable
    /// as this kind of media.
    async fn decode(&self, path: &str) -> Result<Self::Handle, Error>;
}

/// Registry of reference → handle for one kind of media.
pub struct HandleStore<D: MediaDecoder> {
    kind: &'static str,
    decoder: D,
    entries: RwLock<HashMap<String, Arc<D::Handle>>>,
}

impl<D: MediaDecoder> HandleStore<D> {
    /// Create an empty store. `kind` labels log lines ("video", "audio").
    pub fn new(kind: &'static str, decoder: D) -> Self {
        Self {
            kind,
            decoder,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The label this store was created with.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The decoder used for path resolution.
    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Insert a handle and return a fresh reference to it.
    pub async fn store(&self, handle: D::Handle) -> String {
        self.store_shared(Arc::new(handle)).await
    }

    /// Insert an already shared handle and return a fresh reference to it.
    ///
    /// The returned reference is unique among the references live in this
    /// store, even when the same handle is stored twice.
    pub async fn store_shared(&self, handle: Arc<D::Handle>) -> String {
        let mut entries = self.entries.write().await;
        let reference = loop {
            let candidate = Uuid::new_v4().to_string();
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };
        entries.insert(reference.clone(), handle);
        debug!(store = self.kind, reference = %reference, live = entries.len(), "Stored handle");
        reference
    }

    /// Resolve a reference or a path to a handle.
    ///
    /// A live reference returns the stored handle without copying it.
    /// Anything else is decoded as a path. Decoding happens outside the map
    /// lock, and a failed decode leaves the map untouched.
    ///
    /// # Errors
    /// Propagates the decoder's error unchanged.
    #[instrument(level = "debug", skip(self), fields(store = self.kind))]
    pub async fn load(&self, reference_or_path: &str) -> Result<Arc<D::Handle>, Error> {
        if let Some(handle) = self.entries.read().await.get(reference_or_path) {
            debug!("Resolved live reference");
            return Ok(Arc::clone(handle));
        }

        debug!("Not a live reference, decoding as path");
        let handle = self.decoder.decode(reference_or_path).await?;
        Ok(Arc::new(handle))
    }

    /// Whether `reference` is currently live in this store.
    pub async fn contains(&self, reference: &str) -> bool {
        self.entries.read().await.contains_key(reference)
    }

    /// Drop every entry, returning how many were removed.
    ///
    /// Handles still held by in-flight callers stay alive until those
    /// callers release them.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        debug!(store = self.kind, dropped, "Cleared store");
        dropped
    }

    /// Number of live references.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no references.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Point-in-time view of the store, sorted by reference.
    ///
    /// Intended for operator inspection only.
    pub async fn snapshot(&self) -> BTreeMap<String, Arc<D::Handle>> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(reference, handle)| (reference.clone(), Arc::clone(handle)))
            .collect()
    }
}
