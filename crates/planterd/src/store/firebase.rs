//! Firebase Realtime Database backend using its REST protocol.
//!
//! Point reads and writes map to `GET`/`PUT` on `{base}/{path}.json`. A
//! multi-path update is a `PATCH` on the root whose keys are full paths, which
//! the database applies atomically. Subscriptions stream
//! `text/event-stream` responses and replay `put`/`patch` events into a local
//! copy of the subscribed subtree.

use std::io;
use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::TryStreamExt;
use reqwest::Client;
use reqwest::Response;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Store;
use super::StoreError;
use super::Subscription;
use super::segments;
use super::sse::SseDecoder;
use super::sse::SseEvent;
use super::tree;

/// Store client for a Firebase Realtime Database instance.
#[derive(Debug, Clone)]
pub struct FirebaseStore {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl FirebaseStore {
    /// Create a client for the database at `base_url`
    /// (e.g. `https://my-planter-default-rtdb.firebaseio.com`).
    ///
    /// `timeout` bounds every request except subscription streams.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, segments: &[&str]) -> String {
        format!("{}/{}.json", self.base_url, segments.join("/"))
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Store for FirebaseStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let url = self.url(&segments(path)?);
        let response = self.client.get(&url).timeout(self.timeout).send().await?;
        let value: Value = Self::check(response).await?.json().await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let url = self.url(&segments(path)?);
        let response = self
            .client
            .put(&url)
            .timeout(self.timeout)
            .json(&value)
            .send()
            .await?;
        Self::check(response).await?;
        debug!("PUT {}", url);
        Ok(())
    }

    async fn update_paths(&self, updates: &[(String, Value)]) -> Result<(), StoreError> {
        let mut body = Map::new();
        for (path, value) in updates {
            body.insert(format!("/{}", segments(path)?.join("/")), value.clone());
        }

        let url = self.url(&[]);
        let response = self
            .client
            .patch(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        debug!("PATCH {} ({} paths)", url, updates.len());
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let url = self.url(&segments(path)?);
        let request = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream");
        let (tx, rx) = mpsc::unbounded_channel();
        let name = path.to_string();

        let task = tokio::spawn(async move {
            let response = match request.send().await {
                Ok(response) => match Self::check(response).await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Subscription to '{}' refused: {}", name, e);
                        return;
                    }
                },
                Err(e) => {
                    warn!("Subscription to '{}' failed: {}", name, e);
                    return;
                }
            };
            info!("Streaming changes for '{}'", name);

            let body = response.bytes_stream().map_err(io::Error::other);
            let mut events = pin!(FramedRead::new(StreamReader::new(body), SseDecoder::new()));
            let mut cache = Value::Null;
            let mut last: Option<Value> = None;
            loop {
                let event = match events.next().await {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        warn!("Stream for '{}' failed: {}", name, e);
                        break;
                    }
                    None => {
                        info!("Stream for '{}' ended", name);
                        break;
                    }
                };

                match apply_event(&mut cache, &event) {
                    Ok(StreamUpdate::Changed) => {
                        if last.as_ref() == Some(&cache) {
                            continue;
                        }
                        last = Some(cache.clone());
                        if tx.send(cache.clone()).is_err() {
                            return;
                        }
                    }
                    Ok(StreamUpdate::Unchanged) => {}
                    Ok(StreamUpdate::Closed(reason)) => {
                        warn!("Stream for '{}' closed by server: {}", name, reason);
                        return;
                    }
                    Err(e) => {
                        warn!("Ignoring malformed '{}' event on '{}': {}", event.event, name, e);
                    }
                }
            }
        });

        Ok(Subscription::new(path.to_string(), rx, task))
    }
}

/// Body of `put` and `patch` stream events.
#[derive(Debug, Deserialize)]
struct StreamPayload {
    path: String,
    data: Value,
}

#[derive(Debug, PartialEq)]
enum StreamUpdate {
    Changed,
    Unchanged,
    Closed(String),
}

/// Replay one stream event into `cache`, the local copy of the subscribed
/// subtree. Event paths are relative to the subscription.
fn apply_event(cache: &mut Value, event: &SseEvent) -> Result<StreamUpdate, StoreError> {
    match event.event.as_str() {
        "put" => {
            let payload: StreamPayload = serde_json::from_str(&event.data)?;
            tree::set(cache, &segments(&payload.path)?, payload.data);
            Ok(StreamUpdate::Changed)
        }
        "patch" => {
            let payload: StreamPayload = serde_json::from_str(&event.data)?;
            let Value::Object(patch) = payload.data else {
                return Err(StoreError::InvalidPath(payload.path));
            };
            tree::merge(cache, &segments(&payload.path)?, patch);
            Ok(StreamUpdate::Changed)
        }
        "cancel" => Ok(StreamUpdate::Closed(format!("cancelled ({})", event.data))),
        "auth_revoked" => Ok(StreamUpdate::Closed("credential revoked".to_string())),
        _ => Ok(StreamUpdate::Unchanged),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use axum::Json;
    use axum::Router;
    use axum::extract::State;
    use axum::http::Method;
    use axum::http::StatusCode;
    use axum::http::Uri;
    use axum::http::header;
    use axum::response::IntoResponse;
    use axum::response::Response as HttpResponse;
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    const SENSOR_STREAM: &str = concat!(
        "event: put\n",
        "data: {\"path\":\"/\",\"data\":{\"A\":1}}\n\n",
        "event: keep-alive\n",
        "data: null\n\n",
        "event: patch\n",
        "data: {\"path\":\"/\",\"data\":{\"B\":2}}\n\n",
        "event: patch\n",
        "data: {\"path\":\"/\",\"data\":{\"B\":2}}\n\n",
        "event: put\n",
        "data: {\"path\":\"/A\",\"data\":null}\n\n",
    );

    /// Requests seen by the fake database: method, path, body.
    type Requests = Arc<Mutex<Vec<(Method, String, String)>>>;

    async fn fake_database(
        State(requests): State<Requests>,
        method: Method,
        uri: Uri,
        body: String,
    ) -> HttpResponse {
        requests
            .lock()
            .unwrap()
            .push((method.clone(), uri.path().to_string(), body.clone()));

        match (method, uri.path()) {
            (Method::GET, "/TEMP.json") => Json(Value::Null).into_response(),
            (Method::GET, "/HUMIDITY.json") => Json(json!(55)).into_response(),
            (Method::PUT, "/smart_planter/controls.json") => body.into_response(),
            (Method::PATCH, "/.json") => body.into_response(),
            (Method::GET, "/fromAltera.json") => {
                ([(header::CONTENT_TYPE, "text/event-stream")], SENSOR_STREAM).into_response()
            }
            _ => (StatusCode::UNAUTHORIZED, r#"{"error":"Permission denied"}"#).into_response(),
        }
    }

    async fn serve_fake_database() -> (FirebaseStore, Requests) {
        let requests = Requests::default();
        let app = Router::new()
            .fallback(fake_database)
            .with_state(requests.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let store = FirebaseStore::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        (store, requests)
    }

    #[tokio::test]
    async fn test_point_reads_and_writes() {
        let (store, requests) = serve_fake_database().await;

        assert_eq!(store.get("TEMP").await.unwrap(), None);
        assert_eq!(store.get("/HUMIDITY/").await.unwrap(), Some(json!(55)));

        store
            .set(
                "smart_planter/controls",
                json!({"pump_status": 0, "fan_status": 0}),
            )
            .await
            .unwrap();
        let (method, path, body) = requests.lock().unwrap().last().cloned().unwrap();
        assert_eq!(method, Method::PUT);
        assert_eq!(path, "/smart_planter/controls.json");
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({"pump_status": 0, "fan_status": 0})
        );

        match store.get("camIp").await {
            Err(StoreError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("Permission denied"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_paths_patches_root() {
        let (store, requests) = serve_fake_database().await;

        store
            .update_paths(&[
                ("toAltera".to_string(), json!(129)),
                ("smart_planter/controls/pump_status".to_string(), json!(1)),
            ])
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (method, path, body) = &requests[0];
        assert_eq!(*method, Method::PATCH);
        assert_eq!(path, "/.json");
        assert_eq!(
            serde_json::from_str::<Value>(body).unwrap(),
            json!({"/toAltera": 129, "/smart_planter/controls/pump_status": 1})
        );
    }

    #[tokio::test]
    async fn test_subscription_replays_stream() {
        let (store, requests) = serve_fake_database().await;

        let mut sub = store.subscribe("fromAltera").await.unwrap();
        assert_eq!(sub.next().await, Some(json!({"A": 1})));
        assert_eq!(sub.next().await, Some(json!({"A": 1, "B": 2})));
        // The repeated patch changes nothing, so the next value is the delete.
        assert_eq!(sub.next().await, Some(json!({"B": 2})));
        // The server closed the stream.
        assert_eq!(sub.next().await, None);

        let (method, path, _) = requests.lock().unwrap()[0].clone();
        assert_eq!(method, Method::GET);
        assert_eq!(path, "/fromAltera.json");
    }

    #[tokio::test]
    async fn test_refused_subscription_ends_immediately() {
        let (store, _) = serve_fake_database().await;
        let mut sub = store.subscribe("TEMP/missing").await.unwrap();
        assert_eq!(sub.next().await, None);
    }

    fn event(name: &str, data: &str) -> SseEvent {
        SseEvent {
            event: name.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_url() {
        let store = FirebaseStore::new(
            "https://planter-default-rtdb.firebaseio.com/",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            store.url(&["smart_planter", "controls"]),
            "https://planter-default-rtdb.firebaseio.com/smart_planter/controls.json"
        );
        assert_eq!(
            store.url(&[]),
            "https://planter-default-rtdb.firebaseio.com/.json"
        );
    }

    #[test]
    fn test_initial_put_replaces_cache() {
        let mut cache = Value::Null;
        let update = apply_event(
            &mut cache,
            &event("put", r#"{"path":"/","data":{"A":12,"B":40}}"#),
        )
        .unwrap();
        assert_eq!(update, StreamUpdate::Changed);
        assert_eq!(cache, json!({"A": 12, "B": 40}));
    }

    #[test]
    fn test_nested_put_and_patch() {
        let mut cache = json!({"A": 12, "B": 40});
        apply_event(&mut cache, &event("put", r#"{"path":"/A","data":15}"#)).unwrap();
        assert_eq!(cache, json!({"A": 15, "B": 40}));

        apply_event(
            &mut cache,
            &event("patch", r#"{"path":"/","data":{"B":null,"C":300}}"#),
        )
        .unwrap();
        assert_eq!(cache, json!({"A": 15, "C": 300}));
    }

    #[test]
    fn test_absent_path_put_null() {
        let mut cache = Value::Null;
        let update = apply_event(&mut cache, &event("put", r#"{"path":"/","data":null}"#)).unwrap();
        assert_eq!(update, StreamUpdate::Changed);
        assert_eq!(cache, Value::Null);
    }

    #[test]
    fn test_control_events() {
        let mut cache = json!(1);
        assert_eq!(
            apply_event(&mut cache, &event("keep-alive", "null")).unwrap(),
            StreamUpdate::Unchanged
        );
        assert!(matches!(
            apply_event(&mut cache, &event("cancel", "null")).unwrap(),
            StreamUpdate::Closed(_)
        ));
        assert!(matches!(
            apply_event(&mut cache, &event("auth_revoked", "null")).unwrap(),
            StreamUpdate::Closed(_)
        ));
        assert_eq!(cache, json!(1));
    }

    #[test]
    fn test_malformed_patch() {
        let mut cache = Value::Null;
        assert!(apply_event(&mut cache, &event("patch", r#"{"path":"/","data":5}"#)).is_err());
        assert!(apply_event(&mut cache, &event("put", "not json")).is_err());
    }
}
