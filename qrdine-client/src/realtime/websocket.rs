//! Websocket change feed
//!
//! Speaks the hosted realtime service's channel protocol: one channel per
//! restaurant, joined with a `postgres_changes` config listing every table
//! of the filter, kept alive with a periodic heartbeat on the `phoenix`
//! topic.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use shared::message::{ChangeEvent, ChangeKind, ResourceTable, SubscriptionFilter};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{RealtimeError, RealtimeSource, Subscription};
use crate::{ClientConfig, SharedToken};

const JOIN_REF: &str = "1";
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Change feed over the backend's realtime websocket
///
/// The access token is read when a channel is joined, so a token slot
/// shared with [`crate::HttpClient`] follows sign-in and sign-out.
#[derive(Debug, Clone)]
pub struct WebSocketRealtime {
    endpoint: String,
    api_key: Option<String>,
    token: SharedToken,
    heartbeat: Duration,
}

impl WebSocketRealtime {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            token: SharedToken::default(),
            heartbeat: Duration::from_secs(25),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            endpoint: config.realtime_endpoint(),
            api_key: Some(config.api_key.clone()),
            token: Arc::new(RwLock::new(config.token.clone())),
            heartbeat: Duration::from_secs(config.heartbeat_interval.max(1)),
        }
    }

    pub fn with_access_token(self, token: impl Into<String>) -> Self {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
        self
    }

    /// Read the token from a slot owned elsewhere (normally the HTTP client's)
    pub fn with_shared_token(mut self, token: SharedToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = interval;
        self
    }

    /// Token sent with the next join: the user's, else the API key
    pub fn access_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .or_else(|| self.api_key.clone())
    }
}

/// Channel join request for a filter
fn join_message(filter: &SubscriptionFilter, access_token: Option<&str>) -> Value {
    let changes: Vec<Value> = filter
        .tables
        .iter()
        .map(|table| {
            let mut change = json!({
                "event": "*",
                "schema": "public",
                "table": table.as_str(),
            });
            if let Some(row_filter) = filter.row_filter_for(*table) {
                change["filter"] = json!(row_filter);
            }
            change
        })
        .collect();

    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": changes,
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = json!(token);
    }

    json!({
        "topic": filter.topic(),
        "event": "phx_join",
        "payload": payload,
        "ref": JOIN_REF,
        "join_ref": JOIN_REF,
    })
}

fn heartbeat_message(msg_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
}

fn leave_message(filter: &SubscriptionFilter, msg_ref: u64) -> Value {
    json!({
        "topic": filter.topic(),
        "event": "phx_leave",
        "payload": {},
        "ref": msg_ref.to_string(),
        "join_ref": JOIN_REF,
    })
}

/// Convert a `postgres_changes` frame into a [`ChangeEvent`]
///
/// Returns `None` for any other frame (replies, presence, system messages)
/// and for changes on tables this client does not track.
pub fn parse_postgres_change(frame: &Value) -> Option<ChangeEvent> {
    if frame.get("event")?.as_str()? != "postgres_changes" {
        return None;
    }
    let data = frame.get("payload")?.get("data")?;
    let table = ResourceTable::from_name(data.get("table")?.as_str()?)?;
    let kind = match data.get("type")?.as_str()? {
        "INSERT" => ChangeKind::Insert,
        "UPDATE" => ChangeKind::Update,
        "DELETE" => ChangeKind::Delete,
        _ => return None,
    };

    let non_empty = |v: Option<&Value>| {
        v.filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
            .cloned()
    };

    Some(ChangeEvent {
        table,
        kind,
        record: non_empty(data.get("record")),
        old_record: non_empty(data.get("old_record")),
        commit_timestamp: data
            .get("commit_timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&chrono::Utc)),
    })
}

/// Whether a frame is the reply to our join, and if so whether it succeeded
fn join_reply(frame: &Value) -> Option<Result<(), String>> {
    if frame.get("event")?.as_str()? != "phx_reply" || frame.get("ref")?.as_str()? != JOIN_REF {
        return None;
    }
    let payload = frame.get("payload")?;
    match payload.get("status").and_then(|s| s.as_str()) {
        Some("ok") => Some(Ok(())),
        _ => Some(Err(payload
            .get("response")
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string()))),
    }
}

/// Read frames until the join reply arrives
async fn await_join<S>(read: &mut S) -> Result<(), RealtimeError>
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = read.next().await {
        let frame = frame.map_err(|e| RealtimeError::Connection(e.to_string()))?;
        if let Message::Text(text) = frame {
            let value: Value = serde_json::from_str(text.as_str())?;
            if let Some(result) = join_reply(&value) {
                return result.map_err(RealtimeError::JoinRejected);
            }
        }
    }
    Err(RealtimeError::Connection(
        "socket closed before join reply".to_string(),
    ))
}

#[async_trait]
impl RealtimeSource for WebSocketRealtime {
    async fn subscribe(&self, filter: SubscriptionFilter) -> Result<Subscription, RealtimeError> {
        let (ws, _) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| RealtimeError::Connection(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        let access_token = self.access_token();
        let join = join_message(&filter, access_token.as_deref());
        write
            .send(Message::text(join.to_string()))
            .await
            .map_err(|e| RealtimeError::Connection(e.to_string()))?;

        // 等待加入确认
        tokio::time::timeout(JOIN_TIMEOUT, await_join(&mut read))
            .await
            .map_err(|_| RealtimeError::Connection("join timed out".to_string()))??;

        tracing::info!(topic = %filter.topic(), "Realtime channel joined");

        let (tx, token, sub) = Subscription::channel(filter.clone());
        let heartbeat_every = self.heartbeat;

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(heartbeat_every);
            heartbeat.tick().await;
            let mut msg_ref: u64 = 1;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        msg_ref += 1;
                        let leave = leave_message(&filter, msg_ref);
                        let _ = write.send(Message::text(leave.to_string())).await;
                        let _ = write.close().await;
                        break;
                    }
                    _ = heartbeat.tick() => {
                        msg_ref += 1;
                        let beat = heartbeat_message(msg_ref);
                        if let Err(e) = write.send(Message::text(beat.to_string())).await {
                            tracing::warn!("Realtime heartbeat failed: {}", e);
                            break;
                        }
                    }
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let value: Value = match serde_json::from_str(text.as_str()) {
                                Ok(v) => v,
                                Err(e) => {
                                    tracing::warn!("Invalid realtime frame: {}", e);
                                    continue;
                                }
                            };
                            if let Some(event) = parse_postgres_change(&value)
                                && tx.send(event).await.is_err()
                            {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::warn!(topic = %filter.topic(), "Realtime socket closed by server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("Realtime socket error: {}", e);
                            break;
                        }
                    },
                }
            }
            tracing::debug!(topic = %filter.topic(), "Realtime channel task ended");
        });

        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_message_lists_all_tables() {
        let filter = SubscriptionFilter::for_restaurant("r-1");
        let join = join_message(&filter, Some("jwt"));

        assert_eq!(join["topic"], "realtime:restaurant-r-1");
        assert_eq!(join["event"], "phx_join");
        assert_eq!(join["payload"]["access_token"], "jwt");

        let changes = join["payload"]["config"]["postgres_changes"]
            .as_array()
            .unwrap();
        assert_eq!(changes.len(), 4);
        for change in changes {
            if change["table"] == "order_items" {
                assert!(change.get("filter").is_none());
            } else {
                assert_eq!(change["filter"], "restaurant_id=eq.r-1");
            }
        }
        assert!(changes.iter().any(|c| c["table"] == "order_items"));
    }

    #[test]
    fn test_access_token_follows_shared_slot() {
        let config = ClientConfig::new("http://localhost:54321", "anon");
        let http = crate::HttpClient::new(&config).unwrap();
        let realtime = WebSocketRealtime::from_config(&config).with_shared_token(http.token_handle());

        assert_eq!(realtime.access_token().as_deref(), Some("anon"));
        http.set_token(Some("jwt".into()));
        assert_eq!(realtime.access_token().as_deref(), Some("jwt"));
        http.set_token(None);
        assert_eq!(realtime.access_token().as_deref(), Some("anon"));
    }

    #[test]
    fn test_parse_postgres_change() {
        let frame = json!({
            "topic": "realtime:restaurant-r-1",
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "schema": "public",
                    "table": "orders",
                    "type": "UPDATE",
                    "commit_timestamp": "2026-10-01T12:00:00Z",
                    "record": {"id": "o-1", "restaurant_id": "r-1", "status": "ready"},
                    "old_record": {"id": "o-1"}
                },
                "ids": [1]
            },
            "ref": null
        });

        let event = parse_postgres_change(&frame).unwrap();
        assert_eq!(event.table, ResourceTable::Orders);
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.record_id(), Some("o-1"));
        assert!(event.commit_timestamp.is_some());
    }

    #[test]
    fn test_parse_ignores_other_frames() {
        let reply = json!({"event": "phx_reply", "ref": "1", "payload": {"status": "ok"}});
        assert!(parse_postgres_change(&reply).is_none());
        assert_eq!(join_reply(&reply), Some(Ok(())));

        let unknown_table = json!({
            "event": "postgres_changes",
            "payload": {"data": {"table": "profiles", "type": "INSERT", "record": {"id": "u"}}}
        });
        assert!(parse_postgres_change(&unknown_table).is_none());

        let delete = json!({
            "event": "postgres_changes",
            "payload": {"data": {"table": "menu_items", "type": "DELETE", "record": {}, "old_record": {"id": "m-1"}}}
        });
        let event = parse_postgres_change(&delete).unwrap();
        assert!(event.record.is_none());
        assert_eq!(event.record_id(), Some("m-1"));
    }

    #[test]
    fn test_join_reply_error() {
        let reply = json!({
            "event": "phx_reply",
            "ref": "1",
            "payload": {"status": "error", "response": {"reason": "unauthorized"}}
        });
        assert!(matches!(join_reply(&reply), Some(Err(_))));
    }
}
