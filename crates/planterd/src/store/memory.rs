use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tracing::debug;

use super::Store;
use super::StoreError;
use super::Subscription;
use super::segments;
use super::tree;

/// Capacity of the change fan-out. Subscribers that fall further behind than
/// this re-read their subtree instead of replaying every change.
const CHANGE_CHANNEL_SIZE: usize = 256;

/// A write issued through the [`Store`] interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub path: String,
    pub value: Value,
}

#[derive(Debug, Default)]
struct Inner {
    root: Value,
    journal: Vec<Write>,
    write_failure: Option<String>,
    read_failure: Option<String>,
}

/// In-process store with the same semantics as the hosted one.
///
/// Cloning gives another handle to the same tree. Writes made through the
/// [`Store`] trait are journaled; [`MemoryStore::external_set`] writes the way
/// the device would, without touching the journal.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    changes: broadcast::Sender<Vec<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_root(Value::Null)
    }

    /// Create a store pre-populated with `root`.
    pub fn with_root(root: Value) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                root: tree::normalize(root),
                ..Inner::default()
            })),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write as another party (e.g. the firmware) would.
    pub fn external_set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = segments(path)?;
        {
            let mut inner = self.lock();
            tree::set(&mut inner.root, &segments, value);
        }
        self.notify(vec![owned(&segments)]);
        Ok(())
    }

    /// Snapshot of the whole tree.
    pub fn root(&self) -> Value {
        self.lock().root.clone()
    }

    /// Writes issued through the [`Store`] trait, oldest first.
    pub fn journal(&self) -> Vec<Write> {
        self.lock().journal.clone()
    }

    /// Number of live subscriptions on this tree.
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    /// Make every subsequent write fail with `reason`.
    pub fn fail_writes(&self, reason: impl Into<String>) {
        self.lock().write_failure = Some(reason.into());
    }

    /// Make every subsequent read fail with `reason`.
    pub fn fail_reads(&self, reason: impl Into<String>) {
        self.lock().read_failure = Some(reason.into());
    }

    /// Clear injected failures.
    pub fn heal(&self) {
        let mut inner = self.lock();
        inner.write_failure = None;
        inner.read_failure = None;
    }

    fn notify(&self, changed: Vec<Vec<String>>) {
        // No receivers just means nobody is subscribed yet.
        let _ = self.changes.send(changed);
    }

    fn read_at(inner: &Mutex<Inner>, target: &[String]) -> Value {
        let target: Vec<&str> = target.iter().map(String::as_str).collect();
        let inner = inner.lock().unwrap_or_else(|e| e.into_inner());
        tree::get(&inner.root, &target)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn owned(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = segments(path)?;
        let inner = self.lock();
        if let Some(reason) = &inner.read_failure {
            return Err(StoreError::Unavailable(reason.clone()));
        }
        Ok(tree::get(&inner.root, &segments).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = segments(path)?;
        {
            let mut inner = self.lock();
            if let Some(reason) = &inner.write_failure {
                return Err(StoreError::Rejected(reason.clone()));
            }
            inner.journal.push(Write {
                path: segments.join("/"),
                value: value.clone(),
            });
            tree::set(&mut inner.root, &segments, value);
        }
        debug!("set '{}'", path);
        self.notify(vec![owned(&segments)]);
        Ok(())
    }

    async fn update_paths(&self, updates: &[(String, Value)]) -> Result<(), StoreError> {
        let mut parsed = Vec::with_capacity(updates.len());
        for (path, value) in updates {
            parsed.push((segments(path)?, value));
        }
        for (i, (a, _)) in parsed.iter().enumerate() {
            for (b, _) in &parsed[i + 1..] {
                if tree::overlaps(a, b) {
                    return Err(StoreError::InvalidPath(format!(
                        "'{}' overlaps '{}' in a multi-path update",
                        a.join("/"),
                        b.join("/")
                    )));
                }
            }
        }

        {
            let mut inner = self.lock();
            if let Some(reason) = &inner.write_failure {
                return Err(StoreError::Rejected(reason.clone()));
            }
            for (segments, value) in &parsed {
                inner.journal.push(Write {
                    path: segments.join("/"),
                    value: (*value).clone(),
                });
                tree::set(&mut inner.root, segments, (*value).clone());
            }
        }
        debug!("updated {} paths atomically", parsed.len());
        self.notify(parsed.iter().map(|(s, _)| owned(s)).collect());
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let target = owned(&segments(path)?);
        let mut changes = self.changes.subscribe();
        let initial = Self::read_at(&self.inner, &target);
        let inner = self.inner.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut last = initial.clone();
            if tx.send(initial).is_err() {
                return;
            }
            let target_ref: Vec<&str> = target.iter().map(String::as_str).collect();
            loop {
                match changes.recv().await {
                    Ok(changed) => {
                        let relevant = changed.iter().any(|p| {
                            let p: Vec<&str> = p.iter().map(String::as_str).collect();
                            tree::overlaps(&target_ref, &p)
                        });
                        if !relevant {
                            continue;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                let current = Self::read_at(&inner, &target);
                if current == last {
                    continue;
                }
                last = current.clone();
                if tx.send(current).is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(path.to_string(), rx, task))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("TEMP").await.unwrap(), None);

        store.set("/TEMP", json!(21.5)).await.unwrap();
        assert_eq!(store.get("TEMP").await.unwrap(), Some(json!(21.5)));
        assert_eq!(
            store.journal(),
            vec![Write {
                path: "TEMP".to_string(),
                value: json!(21.5)
            }]
        );
    }

    #[tokio::test]
    async fn test_update_paths_is_all_or_nothing() {
        let store = MemoryStore::new();
        let updates = vec![
            ("toAltera".to_string(), json!(129)),
            ("smart_planter/controls/pump_status".to_string(), json!(1)),
        ];
        store.update_paths(&updates).await.unwrap();
        assert_eq!(
            store.root(),
            json!({"toAltera": 129, "smart_planter": {"controls": {"pump_status": 1}}})
        );

        store.fail_writes("offline");
        let updates = vec![
            ("toAltera".to_string(), json!(128)),
            ("smart_planter/controls/pump_status".to_string(), json!(0)),
        ];
        let err = store.update_paths(&updates).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert_eq!(store.get("toAltera").await.unwrap(), Some(json!(129)));
        assert_eq!(store.journal().len(), 2);
    }

    #[tokio::test]
    async fn test_update_paths_rejects_overlap() {
        let store = MemoryStore::new();
        let updates = vec![
            ("a".to_string(), json!({"b": 1})),
            ("a/b".to_string(), json!(2)),
        ];
        let err = store.update_paths(&updates).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
        assert_eq!(store.root(), Value::Null);
    }

    #[tokio::test]
    async fn test_read_failure() {
        let store = MemoryStore::with_root(json!({"TEMP": 20}));
        store.fail_reads("timeout");
        assert!(matches!(
            store.get("TEMP").await,
            Err(StoreError::Unavailable(_))
        ));
        store.heal();
        assert_eq!(store.get("TEMP").await.unwrap(), Some(json!(20)));
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_then_changes() {
        let store = MemoryStore::with_root(json!({"fromAltera": {"A": 1}}));
        let mut sub = store.subscribe("fromAltera").await.unwrap();
        assert_eq!(sub.next().await, Some(json!({"A": 1})));

        // Unrelated path: no notification.
        store.external_set("TEMP", json!(22)).unwrap();
        store.external_set("fromAltera/B", json!(40)).unwrap();
        assert_eq!(sub.next().await, Some(json!({"A": 1, "B": 40})));

        // Writing an identical value does not notify.
        store.external_set("fromAltera/B", json!(40)).unwrap();
        store.external_set("fromAltera", json!({"C": 7})).unwrap();
        assert_eq!(sub.next().await, Some(json!({"C": 7})));
    }

    #[tokio::test]
    async fn test_subscribe_absent_path_starts_null() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("camIp").await.unwrap();
        assert_eq!(sub.path(), "camIp");
        assert_eq!(sub.next().await, Some(Value::Null));

        store.external_set("camIp", json!("10.0.0.2")).unwrap();
        assert_eq!(sub.next().await, Some(json!("10.0.0.2")));
        assert!(store.journal().is_empty());
    }

    async fn wait_for_subscribers(store: &MemoryStore, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.subscriber_count() != count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscriber count never settled");
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_task() {
        let store = MemoryStore::new();
        let first = store.subscribe("TEMP").await.unwrap();
        let second = store.subscribe("HUMIDITY").await.unwrap();
        assert_eq!(store.subscriber_count(), 2);

        first.unsubscribe();
        wait_for_subscribers(&store, 1).await;

        drop(second);
        wait_for_subscribers(&store, 0).await;

        // Nothing is listening anymore; writes still succeed.
        store.set("TEMP", json!(1)).await.unwrap();
    }
}
