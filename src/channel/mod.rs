//! Channel — framed request/response multiplexer over one secure message
//! connection (spec §4.B).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::net;
use crate::request::Request;
use crate::tls::TlsContextCache;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Per-channel handshake parameters (spec §4.B `open(endpoint, options)`).
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Client-application identifier sent in the `connect` handshake frame.
    pub application: String,
    /// Key/value pairs serialized into the handshake's semicolon-delimited
    /// `props` string.
    pub properties: Vec<(String, String)>,
    /// Handshake timeout (spec §5 "channel-open uses a handshake timeout
    /// (10 s default)").
    pub handshake_timeout: Duration,
}

impl ChannelOptions {
    pub fn new(application: impl Into<String>) -> Self {
        ChannelOptions {
            application: application.into(),
            properties: Vec::new(),
            handshake_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    fn props_string(&self) -> String {
        self.properties
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        ChannelOptions::new("ibmigw-core")
    }
}

/// Channel lifecycle state (spec §3 "Channel").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    NotStarted,
    Ready,
    Busy,
    Ended,
}

const LIFECYCLE_NOT_STARTED: u8 = 0;
const LIFECYCLE_STARTED: u8 = 1;
const LIFECYCLE_ENDED: u8 = 2;

type Waiters = Mutex<HashMap<String, oneshot::Sender<Result<Value>>>>;

/// One persistent secure message connection, multiplexing logically
/// independent requests by correlation ID (spec §4.B).
pub struct Channel {
    id: u64,
    lifecycle: AtomicU8,
    send: tokio::sync::Mutex<net::SendHalf>,
    waiters: Waiters,
    next_correlation: AtomicU64,
    job_id: Mutex<Option<String>>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    /// Establishes the secure connection (spec §4.A), performs the
    /// `connect` handshake, and returns a Channel in `Ready` state — or
    /// tears the socket down and returns an error.
    pub async fn open(
        endpoint: Endpoint,
        options: ChannelOptions,
        tls_cache: &TlsContextCache,
    ) -> Result<Arc<Channel>> {
        let tls = tls_cache.get_context(&endpoint)?;

        let (send, recv) = tokio::time::timeout(options.handshake_timeout, net::connect(&endpoint, tls))
            .await
            .map_err(|_| Error::Handshake("handshake timed out".to_string()))??;

        let channel = Arc::new(Channel {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            lifecycle: AtomicU8::new(LIFECYCLE_NOT_STARTED),
            send: tokio::sync::Mutex::new(send),
            waiters: Mutex::new(HashMap::new()),
            next_correlation: AtomicU64::new(0),
            job_id: Mutex::new(None),
            receive_task: Mutex::new(None),
        });

        let loop_channel = channel.clone();
        let task = tokio::spawn(async move {
            Channel::receive_loop(loop_channel, recv).await;
        });
        *channel.receive_task.lock().unwrap() = Some(task);

        let handshake = Request::connect(options.application.clone(), options.props_string());
        let response = match channel.send_request(handshake).await {
            Ok(response) => response,
            Err(e) => {
                channel.close().await.ok();
                return Err(e);
            }
        };

        let success = response.get("success").and_then(Value::as_bool).unwrap_or(false);
        if !success {
            let message = response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("gateway rejected the connect handshake")
                .to_string();
            channel.close().await.ok();
            return Err(Error::Handshake(message));
        }

        let job_id = response.get("job").and_then(Value::as_str).map(str::to_string);
        *channel.job_id.lock().unwrap() = job_id;
        channel.lifecycle.store(LIFECYCLE_STARTED, Ordering::Release);

        Ok(channel)
    }

    /// This Channel's process-local numeric identifier (used by the Pool's
    /// `by_id`/`busy_heap`, spec §4.H — not the protocol correlation ID).
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn job_id(&self) -> Option<String> {
        self.job_id.lock().unwrap().clone()
    }

    pub fn status(&self) -> ChannelStatus {
        match self.lifecycle.load(Ordering::Acquire) {
            LIFECYCLE_NOT_STARTED => ChannelStatus::NotStarted,
            LIFECYCLE_ENDED => ChannelStatus::Ended,
            _ if self.running_count() > 0 => ChannelStatus::Busy,
            _ => ChannelStatus::Ready,
        }
    }

    pub fn running_count(&self) -> usize {
        self.waiters.lock().unwrap().len()
    }

    /// Assigns a fresh correlation ID, registers a waiter, writes the
    /// framed request, and awaits its resolution (spec §4.B
    /// `send_request`).
    pub async fn send_request(&self, request: Request) -> Result<Value> {
        if self.lifecycle.load(Ordering::Acquire) == LIFECYCLE_ENDED {
            return Err(Error::ChannelClosed);
        }

        let correlation_id = format!(
            "{}{}",
            request.id_prefix(),
            self.next_correlation.fetch_add(1, Ordering::Relaxed)
        );

        let mut payload = serde_json::to_value(&request)?;
        if let Value::Object(map) = &mut payload {
            map.insert("id".to_string(), Value::String(correlation_id.clone()));
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().unwrap().insert(correlation_id.clone(), tx);

        let write_result = self.send.lock().await.send_json(&payload).await;
        if let Err(e) = write_result {
            self.waiters.lock().unwrap().remove(&correlation_id);
            return Err(e);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::ChannelClosed),
        }
    }

    /// Transitions to `Ended`, closes the underlying socket, and fails
    /// every outstanding waiter. Idempotent after the first call (spec §8
    /// "Idempotence: `close()`... called repeatedly is a no-op").
    pub async fn close(&self) -> Result<()> {
        if self.lifecycle.swap(LIFECYCLE_ENDED, Ordering::AcqRel) == LIFECYCLE_ENDED {
            return Ok(());
        }

        let _ = self.send.lock().await.close().await;
        self.fail_all_waiters();

        if let Some(task) = self.receive_task.lock().unwrap().take() {
            task.abort();
        }

        Ok(())
    }

    fn fail_all_waiters(&self) {
        let waiters: Vec<_> = self.waiters.lock().unwrap().drain().collect();
        for (_, tx) in waiters {
            let _ = tx.send(Err(Error::ChannelClosed));
        }
    }

    async fn receive_loop(channel: Arc<Channel>, mut recv: net::RecvHalf) {
        loop {
            match recv.recv_json().await {
                Ok(Some(value)) => {
                    let id = value.get("id").and_then(Value::as_str).map(str::to_string);
                    match id {
                        Some(id) => {
                            let waiter = channel.waiters.lock().unwrap().remove(&id);
                            match waiter {
                                Some(tx) => {
                                    let _ = tx.send(Ok(value));
                                }
                                None => {
                                    tracing::debug!(channel = channel.id, id = %id, "unmatched correlation id, discarding frame");
                                }
                            }
                        }
                        None => {
                            tracing::debug!(channel = channel.id, "inbound frame missing id, discarding");
                        }
                    }
                }
                Ok(None) => {
                    tracing::debug!(channel = channel.id, "peer closed the connection");
                    break;
                }
                Err(e) => {
                    tracing::warn!(channel = channel.id, error = %e, "receive loop failed, tearing down channel");
                    break;
                }
            }
        }

        channel.lifecycle.store(LIFECYCLE_ENDED, Ordering::Release);
        channel.fail_all_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn props_string_joins_key_value_pairs_with_semicolons() {
        let options = ChannelOptions::new("test-app")
            .with_property("a", "1")
            .with_property("b", "2");
        assert_eq!(options.props_string(), "a=1;b=2");
    }

    #[test]
    fn default_handshake_timeout_is_ten_seconds() {
        assert_eq!(ChannelOptions::default().handshake_timeout, Duration::from_secs(10));
    }
}
