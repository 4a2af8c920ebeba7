//! Push receiver: the platform POSTs event frames to a local HTTP route.
//!
//! Each body is decoded by the [`Codec`], then checked in order:
//!
//! 1. `d.verify_token` must match the configured secret
//! 2. the webhook challenge handshake is answered with `{"challenge": ...}`
//! 3. a `sn` already accepted inside the dedup window is dropped
//!
//! Rejections still answer an empty `200 OK` so the platform does not retry.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use bronze_core::{
    ChannelType, EventSender, Frame, MessageType, Receiver, Secret, TransportError,
    TransportResult,
};

use crate::codec::Codec;
use crate::dedup::{DEFAULT_WINDOW, DedupWindow};

/// Configuration of the push receiver.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Route path, starting with `/`.
    pub path: String,
    /// Expected `d.verify_token`.
    pub verify_token: Secret,
    /// Envelope decryption key.
    pub encrypt_key: Option<Secret>,
    /// Whether bodies are zlib-compressed.
    pub compress: bool,
    /// Deduplication window.
    pub dedup_window: Duration,
    /// Interval of the background dedup sweep.
    pub sweep_interval: Duration,
}

impl PushConfig {
    /// Creates a config with default host, path and timings.
    pub fn new(port: u16, verify_token: impl Into<Secret>) -> Self {
        Self {
            host: "0.0.0.0".into(),
            port,
            path: "/khl-wh".into(),
            verify_token: verify_token.into(),
            encrypt_key: None,
            compress: true,
            dedup_window: DEFAULT_WINDOW,
            sweep_interval: Duration::from_secs(60),
        }
    }

    /// Returns `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Why a request was not enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The body could not be decoded.
    Malformed,
    /// `verify_token` did not match.
    BadToken,
    /// `sn` was already seen within the window.
    Duplicate,
    /// Not an event frame.
    NotAnEvent,
}

/// Result of processing one request body.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Deliver this payload.
    Enqueue(Value),
    /// Answer the verification handshake.
    Challenge(String),
    /// Drop silently.
    Rejected(Rejection),
}

/// The push-mode receiver.
///
/// Cheap to clone; clones share the dedup window.
#[derive(Debug, Clone)]
pub struct PushReceiver {
    inner: Arc<PushInner>,
}

#[derive(Debug)]
struct PushInner {
    config: PushConfig,
    codec: Codec,
    dedup: Mutex<DedupWindow>,
}

impl PushReceiver {
    /// Creates a receiver from its config.
    pub fn new(config: PushConfig) -> Self {
        let codec = Codec::new(config.compress, config.encrypt_key.as_ref());
        let dedup = Mutex::new(DedupWindow::new(config.dedup_window));
        Self {
            inner: Arc::new(PushInner {
                config,
                codec,
                dedup,
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PushConfig {
        &self.inner.config
    }

    /// Classifies one request body received at `now`.
    pub fn process(&self, body: &[u8], now: Instant) -> PushOutcome {
        let value = match self.inner.codec.decode(body) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, len = body.len(), "Failed to decode push body");
                return PushOutcome::Rejected(Rejection::Malformed);
            }
        };
        let frame: Frame = match serde_json::from_value(value) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Push body is not a frame");
                return PushOutcome::Rejected(Rejection::Malformed);
            }
        };

        let token = frame.d.get("verify_token").and_then(Value::as_str);
        if token != Some(self.inner.config.verify_token.expose()) {
            trace!("Push frame with wrong verify token dropped");
            return PushOutcome::Rejected(Rejection::BadToken);
        }

        if is_challenge(&frame.d) {
            let challenge = frame
                .d
                .get("challenge")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            debug!("Answering webhook challenge");
            return PushOutcome::Challenge(challenge);
        }

        if !frame.is_event() {
            trace!(s = frame.s, "Non-event push frame ignored");
            return PushOutcome::Rejected(Rejection::NotAnEvent);
        }

        if let Some(sn) = frame.sn
            && !self.inner.dedup.lock().check_and_record(sn, now)
        {
            return PushOutcome::Rejected(Rejection::Duplicate);
        }

        PushOutcome::Enqueue(frame.d)
    }

    /// Runs one dedup sweep.
    pub fn sweep(&self, now: Instant) -> usize {
        self.inner.dedup.lock().sweep(now)
    }

    /// Builds the axum router serving the configured path.
    pub fn router(&self, events: EventSender) -> Router {
        let state = Arc::new(PushState {
            receiver: self.clone(),
            events,
        });
        Router::new()
            .route(&self.inner.config.path, post(push_handler))
            .with_state(state)
    }
}

fn is_challenge(d: &Value) -> bool {
    let is_system = d.get("type").and_then(Value::as_i64) == Some(MessageType::System.code());
    let channel_type = d
        .get("channel_type")
        .cloned()
        .and_then(|v| serde_json::from_value::<ChannelType>(v).ok());
    is_system && channel_type == Some(ChannelType::WebhookChallenge)
}

struct PushState {
    receiver: PushReceiver,
    events: EventSender,
}

async fn push_handler(State(state): State<Arc<PushState>>, body: Bytes) -> Response {
    trace!(len = body.len(), "Received push request");

    match state.receiver.process(&body, Instant::now()) {
        PushOutcome::Enqueue(payload) => {
            if state.events.send(payload).is_err() {
                warn!("Event queue closed, push frame dropped");
            }
            StatusCode::OK.into_response()
        }
        PushOutcome::Challenge(challenge) => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        PushOutcome::Rejected(_) => StatusCode::OK.into_response(),
    }
}

#[async_trait]
impl Receiver for PushReceiver {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn start(&self, events: EventSender, cancel: CancellationToken) -> TransportResult<()> {
        let receiver = self.clone();
        let config = receiver.config();
        let span = info_span!("push_receiver", path = %config.path);

        let listener = tokio::net::TcpListener::bind(config.bind_addr())
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                url: config.bind_addr(),
                reason: e.to_string(),
            })?;
        let local: SocketAddr = listener.local_addr()?;
        span.in_scope(|| info!(addr = %local, "Push receiver listening"));

        let sweeper = {
            let receiver = receiver.clone();
            let cancel = cancel.clone();
            let interval = config.sweep_interval;
            tokio::spawn(
                async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.tick().await;
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = ticker.tick() => {
                                let removed = receiver.sweep(Instant::now());
                                if removed > 0 {
                                    trace!(removed, "Dedup window swept");
                                }
                            }
                        }
                    }
                }
                .instrument(span.clone()),
            )
        };

        let router = receiver.router(events);
        let shutdown = cancel.clone();
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .into_future()
            .instrument(span.clone())
            .await;

        sweeper.abort();
        span.in_scope(|| info!("Push receiver stopped"));

        result.map_err(|e| {
            error!(error = %e, "Push receiver failed");
            TransportError::Io(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{deflate, encrypt};
    use axum::body::Body;
    use axum::http::Request;
    use bronze_core::event_channel;
    use tower::ServiceExt;

    fn config(compress: bool) -> PushConfig {
        let mut config = PushConfig::new(0, "vt");
        config.compress = compress;
        config
    }

    fn event_body(sn: u64, token: &str) -> Vec<u8> {
        json!({
            "s": 0,
            "sn": sn,
            "d": {"type": 1, "channel_type": "GROUP", "content": "hi", "verify_token": token}
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn duplicate_sn_is_enqueued_once_per_window() {
        let receiver = PushReceiver::new(config(false));
        let t0 = Instant::now();

        let first = receiver.process(&event_body(5, "vt"), t0);
        assert!(matches!(first, PushOutcome::Enqueue(_)));

        let second = receiver.process(&event_body(5, "vt"), t0 + Duration::from_secs(30));
        assert_eq!(second, PushOutcome::Rejected(Rejection::Duplicate));

        let third = receiver.process(&event_body(5, "vt"), t0 + Duration::from_secs(601));
        assert!(matches!(third, PushOutcome::Enqueue(_)));
    }

    #[test]
    fn wrong_token_is_rejected() {
        let receiver = PushReceiver::new(config(false));
        assert_eq!(
            receiver.process(&event_body(1, "nope"), Instant::now()),
            PushOutcome::Rejected(Rejection::BadToken)
        );
    }

    #[test]
    fn encrypted_compressed_body_is_accepted() {
        let mut config = config(true);
        config.encrypt_key = Some(Secret::new("key"));
        let receiver = PushReceiver::new(config);

        let inner = String::from_utf8(event_body(9, "vt")).unwrap();
        let envelope = json!({ "encrypt": encrypt("key", &inner) }).to_string();
        let body = deflate(envelope.as_bytes());

        match receiver.process(&body, Instant::now()) {
            PushOutcome::Enqueue(d) => assert_eq!(d["content"], "hi"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn router_answers_challenge() {
        let receiver = PushReceiver::new(config(false));
        let (tx, mut rx) = event_channel();
        let app = receiver.router(tx);

        let body = json!({
            "s": 0,
            "d": {
                "type": 255,
                "channel_type": "WEBHOOK_CHALLENGE",
                "challenge": "abc123",
                "verify_token": "vt"
            }
        })
        .to_string();
        let response = app
            .oneshot(
                Request::post("/khl-wh")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"challenge": "abc123"}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn router_enqueues_and_returns_empty_ok() {
        let receiver = PushReceiver::new(config(false));
        let (tx, mut rx) = event_channel();
        let app = receiver.router(tx);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::post("/khl-wh")
                        .body(Body::from(event_body(3, "vt")))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            assert!(bytes.is_empty());
        }

        assert_eq!(rx.try_recv().unwrap()["content"], "hi");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_request_still_returns_ok() {
        let receiver = PushReceiver::new(config(false));
        let (tx, mut rx) = event_channel();
        let response = receiver
            .router(tx)
            .oneshot(
                Request::post("/khl-wh")
                    .body(Body::from("garbage"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(rx.try_recv().is_err());
    }
}
