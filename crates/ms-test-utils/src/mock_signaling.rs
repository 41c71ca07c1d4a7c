//! Scripted signaling channel for media session testing.
//!
//! Every request is answered with a well-formed default acknowledgement
//! unless a test scripts something else:
//! - `respond` replaces the ack for an event until changed
//! - `respond_once` queues a one-shot ack ahead of the default
//! - `fail_consume` rejects `consumeMedia` for one producer id
//! - `hold` parks requests for an event until `release`
//!
//! Every request is recorded in order and can be inspected afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! use ms_test_utils::MockSignaling;
//! use signaling_protocol::events;
//!
//! let signaling = MockSignaling::new().with_owner(true);
//! signaling.respond(events::CONNECT_TRANSPORT, json!("error"));
//!
//! // ... drive the session ...
//! assert_eq!(signaling.count(events::LEAVE_ROOM), 1);
//! ```

use crate::fixtures;
use async_trait::async_trait;
use media_session::signaling::SignalingTransport;
use serde_json::{json, Value};
use signaling_protocol::{events, SignalingError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Mock signaling channel.
#[derive(Debug, Clone)]
pub struct MockSignaling {
    inner: Arc<Mutex<MockSignalingInner>>,
}

#[derive(Debug, Default)]
struct MockSignalingInner {
    /// Sticky ack per event
    sticky: HashMap<String, Value>,
    /// One-shot acks per event, consumed before the sticky/default ack
    queued: HashMap<String, VecDeque<Value>>,
    /// Events answered with a timeout instead of an ack
    timeouts: HashMap<String, bool>,
    /// consumeMedia acks per producer id
    consume_acks: HashMap<String, Value>,
    /// Gates per event
    gates: HashMap<String, Arc<Semaphore>>,
    /// Every request emitted, in order
    emitted: Vec<(String, Value)>,
    is_owner: bool,
    next_producer: u64,
    next_transport: u64,
}

impl Default for MockSignaling {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSignaling {
    /// Create a mock answering every request successfully.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockSignalingInner::default())),
        }
    }

    /// Make the default join ack report room ownership.
    #[must_use]
    pub fn with_owner(self, is_owner: bool) -> Self {
        self.inner.lock().unwrap().is_owner = is_owner;
        self
    }

    /// Answer `event` with `ack` until changed.
    pub fn respond(&self, event: &str, ack: Value) {
        self.inner
            .lock()
            .unwrap()
            .sticky
            .insert(event.to_string(), ack);
    }

    /// Answer the next `event` with `ack`.
    pub fn respond_once(&self, event: &str, ack: Value) {
        self.inner
            .lock()
            .unwrap()
            .queued
            .entry(event.to_string())
            .or_default()
            .push_back(ack);
    }

    /// Report every `event` as timed out.
    pub fn time_out(&self, event: &str) {
        self.inner
            .lock()
            .unwrap()
            .timeouts
            .insert(event.to_string(), true);
    }

    /// Answer `consumeMedia` for producer `pid` with `ack`
    /// (for example `"cannotConsume"`).
    pub fn fail_consume(&self, pid: &str, ack: Value) {
        self.inner
            .lock()
            .unwrap()
            .consume_acks
            .insert(pid.to_string(), ack);
    }

    /// Park every `event` request until [`MockSignaling::release`].
    ///
    /// Requests are recorded before they park.
    pub fn hold(&self, event: &str) {
        self.inner
            .lock()
            .unwrap()
            .gates
            .insert(event.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Let every parked and future `event` request through.
    pub fn release(&self, event: &str) {
        let gate = self.inner.lock().unwrap().gates.remove(event);
        if let Some(gate) = gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Every request emitted so far, in order.
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.inner.lock().unwrap().emitted.clone()
    }

    /// Event names emitted so far, in order.
    pub fn events(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .emitted
            .iter()
            .map(|(event, _)| event.clone())
            .collect()
    }

    /// Payloads emitted under `event`, in order.
    pub fn payloads(&self, event: &str) -> Vec<Value> {
        self.inner
            .lock()
            .unwrap()
            .emitted
            .iter()
            .filter(|(e, _)| e == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// How many times `event` was emitted.
    pub fn count(&self, event: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .emitted
            .iter()
            .filter(|(e, _)| e == event)
            .count()
    }

    /// Wait until `event` has been emitted at least `count` times.
    ///
    /// # Panics
    ///
    /// Panics after five seconds.
    pub async fn wait_for(&self, event: &str, count: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while self.count(event) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(
            waited.is_ok(),
            "timed out waiting for {count} x {event}, saw {:?}",
            self.events()
        );
    }

    fn default_ack(inner: &mut MockSignalingInner, event: &str, payload: &Value) -> Value {
        match event {
            events::JOIN => fixtures::join_ack(inner.is_owner),
            events::REQUEST_TRANSPORT => {
                inner.next_transport += 1;
                fixtures::transport_params(&format!("transport-{}", inner.next_transport))
            }
            events::CONNECT_TRANSPORT => json!("success"),
            events::START_PRODUCING => {
                inner.next_producer += 1;
                json!({ "id": format!("local-{}", inner.next_producer) })
            }
            events::CONSUME_MEDIA => {
                let pid = payload["pid"].as_str().unwrap_or_default().to_string();
                if let Some(ack) = inner.consume_acks.get(&pid) {
                    return ack.clone();
                }
                fixtures::consumer_params(&pid, payload["kind"].as_str().unwrap_or("audio"))
            }
            _ => json!("success"),
        }
    }
}

#[async_trait]
impl SignalingTransport for MockSignaling {
    async fn emit_with_ack(&self, event: &str, payload: Value) -> Result<Value, SignalingError> {
        let (ack, gate, timed_out) = {
            let mut inner = self.inner.lock().unwrap();
            inner.emitted.push((event.to_string(), payload.clone()));

            let queued = inner
                .queued
                .get_mut(event)
                .and_then(VecDeque::pop_front);
            let sticky = inner.sticky.get(event).cloned();
            let ack = match queued.or(sticky) {
                Some(ack) => ack,
                None => Self::default_ack(&mut inner, event, &payload),
            };
            let timed_out = inner.timeouts.get(event).copied().unwrap_or(false);
            (ack, inner.gates.get(event).cloned(), timed_out)
        };

        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        if timed_out {
            return Err(SignalingError::Timeout {
                event: event.to_string(),
            });
        }
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_acks_are_well_formed() {
        let signaling = MockSignaling::new();

        let ack = signaling
            .emit_with_ack(events::START_PRODUCING, json!({}))
            .await
            .unwrap();
        assert_eq!(ack, json!({ "id": "local-1" }));

        let ack = signaling
            .emit_with_ack(events::CONSUME_MEDIA, json!({ "pid": "p1", "kind": "video" }))
            .await
            .unwrap();
        assert_eq!(ack["producerId"], json!("p1"));
        assert_eq!(ack["kind"], json!("video"));

        assert_eq!(signaling.count(events::START_PRODUCING), 1);
    }

    #[tokio::test]
    async fn test_queued_ack_precedes_sticky() {
        let signaling = MockSignaling::new();
        signaling.respond(events::CONNECT_TRANSPORT, json!("error"));
        signaling.respond_once(events::CONNECT_TRANSPORT, json!("success"));

        let first = signaling
            .emit_with_ack(events::CONNECT_TRANSPORT, Value::Null)
            .await
            .unwrap();
        let second = signaling
            .emit_with_ack(events::CONNECT_TRANSPORT, Value::Null)
            .await
            .unwrap();
        assert_eq!(first, json!("success"));
        assert_eq!(second, json!("error"));
    }

    #[tokio::test]
    async fn test_hold_parks_until_release() {
        let signaling = MockSignaling::new();
        signaling.hold(events::LEAVE_ROOM);

        let emitter = signaling.clone();
        let task =
            tokio::spawn(async move { emitter.emit_with_ack(events::LEAVE_ROOM, Value::Null).await });

        signaling.wait_for(events::LEAVE_ROOM, 1).await;
        assert!(!task.is_finished());

        signaling.release(events::LEAVE_ROOM);
        assert!(task.await.unwrap().is_ok());
    }
}
