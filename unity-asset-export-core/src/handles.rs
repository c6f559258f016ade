//! Preview handles
//!
//! Cached previews are exposed to the UI through revocable handles. Every
//! handle that is created must be revoked exactly once, when the cache entry
//! holding it is evicted or the cache is cleared.

use crate::unity_types::PreviewHandle;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use tracing::warn;

/// Issues and revokes externally visible handles
pub trait HandleRegistry: Send + Sync {
    fn create(&self, data: Bytes, mime: &str) -> PreviewHandle;

    fn revoke(&self, handle: &PreviewHandle);
}

/// In-process registry: handles resolve to their payload until revoked
#[derive(Debug, Default)]
pub struct LocalHandleRegistry {
    next_id: AtomicU64,
    live: RwLock<HashMap<PreviewHandle, (Bytes, String)>>,
    revoked: AtomicUsize,
}

impl LocalHandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload and MIME type of a live handle
    pub fn resolve(&self, handle: &PreviewHandle) -> Option<(Bytes, String)> {
        self.live.read().ok()?.get(handle).cloned()
    }

    /// Number of handles not yet revoked
    pub fn live_count(&self) -> usize {
        self.live.read().map(|live| live.len()).unwrap_or(0)
    }

    /// Number of revocations performed so far
    pub fn revoked_count(&self) -> usize {
        self.revoked.load(Ordering::Relaxed)
    }
}

impl HandleRegistry for LocalHandleRegistry {
    fn create(&self, data: Bytes, mime: &str) -> PreviewHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = PreviewHandle::new(format!("blob:local/{}", id));
        if let Ok(mut live) = self.live.write() {
            live.insert(handle.clone(), (data, mime.to_string()));
        }
        handle
    }

    fn revoke(&self, handle: &PreviewHandle) {
        let removed = self
            .live
            .write()
            .map(|mut live| live.remove(handle).is_some())
            .unwrap_or(false);
        if removed {
            self.revoked.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!("revoking unknown handle {}", handle);
        }
    }
}
