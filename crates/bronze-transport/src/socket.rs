//! Socket receiver: an outbound websocket session with heartbeats and
//! automatic reconnection.
//!
//! One session is:
//!
//! 1. look up a fresh gateway URL through the requester (`gateway/index`)
//! 2. connect and split the stream
//! 3. spawn exactly one heartbeat task owning the write half
//! 4. read frames until the stream fails, the server asks for a reconnect,
//!    or the receiver is cancelled
//! 5. stop the heartbeat task and wait for it to finish
//!
//! Sessions are retried with bounded exponential backoff; the delay resets
//! once a session delivers an event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use bronze_core::{
    EventSender, Frame, Method, Receiver, Requester, Secret, Signal, TransportError,
    TransportResult,
};

use crate::codec::Codec;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

// =============================================================================
// Configuration
// =============================================================================

/// Reconnection policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound of the delay.
    pub max_delay: Duration,
    /// Factor applied after each consecutive failure.
    pub multiplier: f64,
    /// Consecutive failures tolerated before giving up; `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_retries: None,
        }
    }
}

/// Backoff state derived from a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
    current: Duration,
}

impl Backoff {
    /// Starts a fresh backoff.
    pub fn new(policy: RetryPolicy) -> Self {
        let current = policy.initial_delay;
        Self {
            policy,
            attempts: 0,
            current,
        }
    }

    /// Returns the delay before the next attempt, or `None` once retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_retries
            && self.attempts >= max
        {
            return None;
        }
        let delay = self.current;
        self.attempts += 1;
        self.current = Duration::from_secs_f64(
            (self.current.as_secs_f64() * self.policy.multiplier)
                .min(self.policy.max_delay.as_secs_f64()),
        );
        Some(delay)
    }

    /// Consecutive failures so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Resets after a healthy session.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.policy.initial_delay;
    }
}

/// Configuration of the socket receiver.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Ask the gateway for zlib-compressed binary frames.
    pub compress: bool,
    /// Interval between heartbeats.
    pub heartbeat_interval: Duration,
    /// Reconnection policy.
    pub retry: RetryPolicy,
    /// Envelope decryption key, if frames are encrypted.
    pub encrypt_key: Option<Secret>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            compress: true,
            heartbeat_interval: Duration::from_secs(26),
            retry: RetryPolicy::default(),
            encrypt_key: None,
        }
    }
}

// =============================================================================
// Heartbeat
// =============================================================================

/// Decrements the live-heartbeat counter when the task ends, however it ends.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The single heartbeat task of a session; aborted on drop.
struct Heartbeat(Option<JoinHandle<()>>);

impl Heartbeat {
    fn spawn(
        mut sink: WsSink,
        interval: Duration,
        last_sn: Arc<AtomicU64>,
        live: Arc<AtomicUsize>,
    ) -> Self {
        let guard = LiveGuard::new(live);
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                let mut ticker =
                    tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
                loop {
                    ticker.tick().await;
                    let ping = Frame::ping(last_sn.load(Ordering::SeqCst));
                    let text = match serde_json::to_string(&ping) {
                        Ok(text) => text,
                        Err(e) => {
                            error!(error = %e, "Failed to encode heartbeat");
                            break;
                        }
                    };
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        trace!("Connection closed, heartbeat stopped");
                        break;
                    }
                    trace!(sn = ping.sn, "Heartbeat sent");
                }
            }
            .in_current_span(),
        );
        Self(Some(handle))
    }

    /// Aborts the task and waits until it has been torn down.
    async fn stop(mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

// =============================================================================
// Receiver
// =============================================================================

/// How a session ended.
#[derive(Debug)]
enum SessionEnd {
    /// The receiver was cancelled or the event queue closed.
    Stopped,
    /// The session should be replaced.
    Reconnect {
        /// Why.
        reason: String,
        /// Whether the session delivered at least one event.
        delivered: bool,
    },
}

/// What to do after one frame.
enum FrameAction {
    Continue,
    Delivered,
    Reconnect(String),
    Stop,
}

/// The socket-mode receiver.
pub struct SocketReceiver {
    config: SocketConfig,
    codec: Codec,
    requester: Arc<dyn Requester>,
    last_sn: Arc<AtomicU64>,
    live_heartbeats: Arc<AtomicUsize>,
}

impl std::fmt::Debug for SocketReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketReceiver")
            .field("config", &self.config)
            .field("last_sn", &self.last_sn.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SocketReceiver {
    /// Creates a receiver that looks up gateway URLs through `requester`.
    pub fn new(config: SocketConfig, requester: Arc<dyn Requester>) -> Self {
        // Text frames are never compressed; binary frames are when requested.
        let codec = Codec::new(config.compress, config.encrypt_key.as_ref());
        Self {
            config,
            codec,
            requester,
            last_sn: Arc::new(AtomicU64::new(0)),
            live_heartbeats: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of heartbeat tasks currently alive.
    pub fn live_heartbeats(&self) -> usize {
        self.live_heartbeats.load(Ordering::SeqCst)
    }

    /// Last sequence number seen.
    pub fn last_sn(&self) -> u64 {
        self.last_sn.load(Ordering::SeqCst)
    }

    async fn lookup_gateway(&self) -> TransportResult<String> {
        let compress = u8::from(self.config.compress);
        let data = self
            .requester
            .request(Method::Get, "gateway/index", json!({ "compress": compress }))
            .await?;
        data.get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TransportError::ConnectionFailed {
                url: "gateway/index".into(),
                reason: "response carries no url".into(),
            })
    }

    async fn run_session(
        &self,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> TransportResult<SessionEnd> {
        let url = self.lookup_gateway().await?;
        debug!(url = %url, "Connecting to gateway");

        let (stream, _) =
            connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
        info!("Gateway connected");

        let (sink, mut source) = stream.split();
        let heartbeat = Heartbeat::spawn(
            sink,
            self.config.heartbeat_interval,
            self.last_sn.clone(),
            self.live_heartbeats.clone(),
        );

        let mut delivered = false;
        let end = loop {
            let decoded = tokio::select! {
                _ = cancel.cancelled() => break SessionEnd::Stopped,
                msg = source.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => self.codec.decode_text(text.as_str()),
                    Some(Ok(WsMessage::Binary(bytes))) => self.codec.decode(&bytes),
                    Some(Ok(WsMessage::Close(frame))) => {
                        let reason = frame.map_or_else(|| "closed".to_string(), |f| f.reason.to_string());
                        break SessionEnd::Reconnect { reason, delivered };
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break SessionEnd::Reconnect { reason: e.to_string(), delivered },
                    None => break SessionEnd::Reconnect { reason: "stream ended".into(), delivered },
                },
            };

            let value = match decoded {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, "Failed to decode frame");
                    continue;
                }
            };

            match self.handle_frame(value, events) {
                FrameAction::Continue => {}
                FrameAction::Delivered => delivered = true,
                FrameAction::Reconnect(reason) => break SessionEnd::Reconnect { reason, delivered },
                FrameAction::Stop => break SessionEnd::Stopped,
            }
        };

        heartbeat.stop().await;
        Ok(end)
    }

    fn handle_frame(&self, value: Value, events: &EventSender) -> FrameAction {
        let frame: Frame = match serde_json::from_value(value) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Frame has unexpected shape");
                return FrameAction::Continue;
            }
        };

        match frame.signal() {
            Some(Signal::Event) => {
                if let Some(sn) = frame.sn {
                    self.last_sn.store(sn, Ordering::SeqCst);
                }
                trace!(sn = frame.sn, "Event frame");
                if events.send(frame.d).is_err() {
                    debug!("Event queue closed");
                    return FrameAction::Stop;
                }
                FrameAction::Delivered
            }
            Some(Signal::Hello) => {
                let code = frame.d.get("code").and_then(Value::as_i64).unwrap_or(0);
                if code != 0 {
                    return FrameAction::Reconnect(format!("handshake refused with code {code}"));
                }
                let session = frame.d.get("session_id").and_then(Value::as_str).unwrap_or("");
                info!(session_id = session, "Gateway handshake complete");
                FrameAction::Continue
            }
            Some(Signal::Pong) => {
                trace!("Heartbeat acknowledged");
                FrameAction::Continue
            }
            Some(Signal::Reconnect) => {
                self.last_sn.store(0, Ordering::SeqCst);
                FrameAction::Reconnect("server requested reconnect".into())
            }
            Some(Signal::ResumeAck) => {
                debug!("Resume acknowledged");
                FrameAction::Continue
            }
            other => {
                trace!(s = frame.s, signal = ?other, "Control frame ignored");
                FrameAction::Continue
            }
        }
    }
}

#[async_trait]
impl Receiver for SocketReceiver {
    fn name(&self) -> &'static str {
        "socket"
    }

    async fn start(&self, events: EventSender, cancel: CancellationToken) -> TransportResult<()> {
        let span = info_span!("socket_receiver");
        let mut backoff = Backoff::new(self.config.retry.clone());

        async move {
            loop {
                if cancel.is_cancelled() {
                    return Ok(());
                }

                let reason = match self.run_session(&events, &cancel).await {
                    Ok(SessionEnd::Stopped) => {
                        info!("Socket receiver stopped");
                        return Ok(());
                    }
                    Ok(SessionEnd::Reconnect { reason, delivered }) => {
                        if delivered {
                            backoff.reset();
                        }
                        reason
                    }
                    Err(e) => e.to_string(),
                };

                let Some(delay) = backoff.next_delay() else {
                    error!(attempts = backoff.attempts(), reason = %reason, "Giving up on gateway");
                    return Err(TransportError::ConnectionFailed {
                        url: "gateway/index".into(),
                        reason,
                    });
                };
                warn!(reason = %reason, delay_ms = delay.as_millis() as u64, "Session ended, reconnecting");

                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        .instrument(span)
        .await
    }
}
