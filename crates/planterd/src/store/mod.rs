//! Realtime key/value store abstraction.
//!
//! The planter firmware and the panel never talk to each other directly; both
//! read and write a shared hierarchical store. This module defines the subset
//! of store behaviour the panel relies on (point reads, point writes, atomic
//! multi-path updates and change subscriptions) so the backend can be swapped
//! for an in-process one in tests.

#[cfg(feature = "store_firebase")]
mod firebase;
mod memory;
#[cfg(feature = "store_firebase")]
mod sse;
pub mod tree;

use async_trait::async_trait;
#[cfg(feature = "store_firebase")]
pub use firebase::FirebaseStore;
pub use memory::MemoryStore;
pub use memory::Write;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Errors returned by store backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid store path '{0}'")]
    InvalidPath(String),

    #[cfg(feature = "store_firebase")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("read rejected: {0}")]
    Unavailable(String),
}

/// Operations the panel needs from the shared store.
///
/// Paths are slash-separated (`smart_planter/controls`); leading and trailing
/// slashes are ignored and the empty path names the root.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the value at `path`. Returns `None` if nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the value at `path`. Writing `null` deletes it.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Apply several point writes as a single atomic update: either all of
    /// them become visible or none do.
    async fn update_paths(&self, updates: &[(String, Value)]) -> Result<(), StoreError>;

    /// Subscribe to `path` and everything below it.
    ///
    /// The first notification carries the current value (`null` if absent);
    /// later ones are sent whenever the subtree changes.
    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;
}

/// Handle to a live subscription.
///
/// Values arrive through [`Subscription::next`]. The background task feeding
/// it is stopped by [`Subscription::unsubscribe`] or when the handle is
/// dropped.
#[derive(Debug)]
pub struct Subscription {
    path: String,
    rx: mpsc::UnboundedReceiver<Value>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(path: String, rx: mpsc::UnboundedReceiver<Value>, task: JoinHandle<()>) -> Self {
        Self {
            path,
            rx,
            task: Some(task),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the next value. Returns `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::debug!("Unsubscribing from '{}'", self.path);
            task.abort();
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Split a store path into its segments, rejecting characters the store does
/// not allow in keys.
pub fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for segment in &segments {
        if segment
            .chars()
            .any(|c| matches!(c, '.' | '#' | '$' | '[' | ']') || c.is_control())
        {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
    }
    Ok(segments)
}

/// Join a parent path and a child key.
pub fn child(parent: &str, key: &str) -> String {
    let parent = parent.trim_matches('/');
    let key = key.trim_matches('/');
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", parent, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments() {
        assert_eq!(
            segments("/smart_planter/controls/").unwrap(),
            vec!["smart_planter", "controls"]
        );
        assert!(segments("").unwrap().is_empty());
        assert!(segments("/").unwrap().is_empty());
        assert!(matches!(
            segments("bad.key"),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(segments("a/$b").is_err());
    }

    #[test]
    fn test_child() {
        assert_eq!(child("smart_planter/controls", "pump_status"), "smart_planter/controls/pump_status");
        assert_eq!(child("/", "toAltera"), "toAltera");
        assert_eq!(child("", "camIp"), "camIp");
    }
}
