//! Consumer side of the control stream.
//!
//! Validates incoming frames, keeps a clamped and smoothed copy of the latest
//! value, and reconnects with capped exponential backoff when the stream
//! drops.

use crate::error::{Result, StreamError};
use crate::frame::{CONTROL_KIND, CONTROL_SCHEMA_VERSION};
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, info, warn};

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8765/ws";
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const BASE_RECONNECT_DELAY_MS: u64 = 1_000;
pub const MAX_RECONNECT_DELAY_MS: u64 = 10_000;
pub const SMOOTHING_FACTOR: f64 = 0.2;
pub const SNAP_EPSILON: f64 = 0.0001;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub max_reconnect_attempts: u32,
    pub base_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Backoff before reconnect attempt `attempt`, or `None` once the
    /// attempts are used up.
    pub fn reconnect_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_reconnect_attempts {
            return None;
        }
        let delay = self
            .base_reconnect_delay
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(self.max_reconnect_delay);
        Some(delay.min(self.max_reconnect_delay))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            base_reconnect_delay: Duration::from_millis(BASE_RECONNECT_DELAY_MS),
            max_reconnect_delay: Duration::from_millis(MAX_RECONNECT_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Error,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlStreamState {
    pub connection: ConnectionState,
    pub last_control_x: f64,
    pub smoothed_control_x: f64,
    pub status_message: Option<String>,
    pub reconnect_attempts: u32,
    pub retry_delay: Option<Duration>,
    pub can_retry: bool,
    pub received_frames: u64,
}

impl Default for ControlStreamState {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Closed,
            last_control_x: 0.0,
            smoothed_control_x: 0.0,
            status_message: None,
            reconnect_attempts: 0,
            retry_delay: None,
            can_retry: false,
            received_frames: 0,
        }
    }
}

/// What a single inbound text message turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    Control(f64),
    /// Valid JSON but not a control frame.
    Ignored,
    IncompatibleSchema,
    Invalid,
}

pub fn decode_frame(text: &str) -> FrameEvent {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        return FrameEvent::Invalid;
    };
    if frame.get("kind").and_then(Value::as_str) != Some(CONTROL_KIND) {
        return FrameEvent::Ignored;
    }
    let schema_version = frame.get("schema_version").and_then(Value::as_u64);
    if schema_version != Some(u64::from(CONTROL_SCHEMA_VERSION)) {
        return FrameEvent::IncompatibleSchema;
    }
    FrameEvent::Control(clamp_control(frame.get("control_x")))
}

/// Non-numeric values read as 0; numbers are clamped to [-1, 1].
pub fn clamp_control(value: Option<&Value>) -> f64 {
    match value.and_then(Value::as_f64) {
        Some(x) if x.is_nan() => 0.0,
        Some(x) => x.clamp(-1.0, 1.0),
        None => 0.0,
    }
}

/// One easing step from `current` toward `target`, snapping when close.
pub fn smooth_towards(current: f64, target: f64) -> f64 {
    let eased = current + (target - current) * SMOOTHING_FACTOR;
    if (eased - target).abs() < SNAP_EPSILON {
        return target;
    }
    eased.clamp(-1.0, 1.0)
}

pub struct ControlStreamClient {
    config: ClientConfig,
    state: ControlStreamState,
}

impl ControlStreamClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: ControlStreamState::default(),
        }
    }

    pub fn state(&self) -> &ControlStreamState {
        &self.state
    }

    /// Fold one text message into the state.
    pub fn apply_text(&mut self, text: &str) -> FrameEvent {
        let event = decode_frame(text);
        match event {
            FrameEvent::Control(x) => {
                self.state.last_control_x = x;
                self.state.received_frames += 1;
            }
            FrameEvent::IncompatibleSchema => {
                self.state.status_message = Some("Incompatible control schema version".into());
            }
            FrameEvent::Invalid => {
                self.state.status_message = Some("Invalid frame received".into());
            }
            FrameEvent::Ignored => {}
        }
        event
    }

    pub fn smooth_step(&mut self) -> f64 {
        self.state.smoothed_control_x =
            smooth_towards(self.state.smoothed_control_x, self.state.last_control_x);
        self.state.smoothed_control_x
    }

    /// Connect and consume frames, reconnecting on loss.
    ///
    /// Returns `Ok` once `frame_limit` control frames have arrived, or
    /// `ReconnectExhausted` when the backoff gives up. The attempt count keeps
    /// growing across successful opens, so a server that keeps dropping the
    /// stream still exhausts it.
    pub async fn run<F>(&mut self, frame_limit: Option<u64>, mut on_frame: F) -> Result<()>
    where
        F: FnMut(&ControlStreamState),
    {
        let mut attempt = 0;

        loop {
            self.state.connection = ConnectionState::Connecting;
            self.state.status_message = Some("Connecting…".into());
            self.state.retry_delay = None;
            self.state.can_retry = false;
            info!(url = %self.config.url, attempt, "connecting to control stream");

            match connect_async(self.config.url.as_str()).await {
                Ok((mut ws, _response)) => {
                    self.state.connection = ConnectionState::Open;
                    self.state.status_message = None;
                    self.state.reconnect_attempts = 0;
                    info!(url = %self.config.url, "control stream open");

                    match self.consume(&mut ws, frame_limit, &mut on_frame).await {
                        Ok(true) => {
                            let _ = ws.close(None).await;
                            self.state.connection = ConnectionState::Closed;
                            return Ok(());
                        }
                        Ok(false) => info!("control stream closed by server"),
                        Err(e) => warn!(error = %e, "control stream failed"),
                    }
                    self.state.connection = ConnectionState::Error;
                    self.state.status_message = Some("Connection lost".into());
                }
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "failed to open control stream");
                    self.state.connection = ConnectionState::Error;
                    self.state.status_message = Some(e.to_string());
                }
            }

            attempt += 1;
            self.state.reconnect_attempts = attempt;
            let Some(delay) = self.config.reconnect_delay(attempt) else {
                self.state.connection = ConnectionState::Closed;
                self.state.status_message = Some("Disconnected – manual retry required".into());
                self.state.can_retry = true;
                return Err(StreamError::ReconnectExhausted { attempts: attempt });
            };

            self.state.retry_delay = Some(delay);
            self.state.status_message = Some(format!(
                "Disconnected – retrying in {}s",
                delay.as_secs_f64().ceil()
            ));
            debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
            sleep(delay).await;
        }
    }

    /// Read until the limit is hit (`true`) or the peer goes away (`false`).
    pub async fn consume<S, F>(
        &mut self,
        ws: &mut WebSocketStream<S>,
        frame_limit: Option<u64>,
        on_frame: &mut F,
    ) -> Result<bool>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        F: FnMut(&ControlStreamState),
    {
        while let Some(msg) = ws.next().await {
            let msg = match msg.map_err(StreamError::from_transport) {
                Ok(msg) => msg,
                Err(StreamError::PeerDisconnected) => return Ok(false),
                Err(e) => return Err(e),
            };

            match msg {
                Message::Text(text) => match self.apply_text(text.as_str()) {
                    FrameEvent::Control(_) => {
                        self.smooth_step();
                        on_frame(&self.state);
                        if frame_limit.is_some_and(|limit| self.state.received_frames >= limit) {
                            return Ok(true);
                        }
                    }
                    other => debug!(event = ?other, "skipped message"),
                },
                Message::Close(_) => return Ok(false),
                _ => {}
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_control_frames() {
        let text = r#"{"kind": "control", "schema_version": 1, "control_x": 0.42}"#;
        assert_eq!(decode_frame(text), FrameEvent::Control(0.42));
    }

    #[test]
    fn skips_other_kinds_and_rejects_bad_input() {
        assert_eq!(
            decode_frame(r#"{"kind": "telemetry", "schema_version": 1}"#),
            FrameEvent::Ignored
        );
        assert_eq!(decode_frame("null"), FrameEvent::Ignored);
        assert_eq!(
            decode_frame(r#"{"kind": "control", "schema_version": 2, "control_x": 0.1}"#),
            FrameEvent::IncompatibleSchema
        );
        assert_eq!(decode_frame("{not json"), FrameEvent::Invalid);
    }

    #[test]
    fn clamps_and_defaults_control_values() {
        assert_eq!(clamp_control(Some(&json!(3.5))), 1.0);
        assert_eq!(clamp_control(Some(&json!(-2))), -1.0);
        assert_eq!(clamp_control(Some(&json!("0.5"))), 0.0);
        assert_eq!(clamp_control(None), 0.0);
    }

    #[test]
    fn smoothing_eases_then_snaps() {
        assert!((smooth_towards(0.0, 1.0) - 0.2).abs() < 1e-12);
        let mut x = 0.0;
        for _ in 0..100 {
            x = smooth_towards(x, -0.5);
        }
        assert_eq!(x, -0.5);
    }

    #[test]
    fn backoff_doubles_caps_and_gives_up() {
        let config = ClientConfig::default();
        let delays: Vec<_> = (0..6).map(|a| config.reconnect_delay(a)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(4)),
                Some(Duration::from_secs(8)),
                Some(Duration::from_secs(10)),
                None,
            ]
        );
    }

    #[test]
    fn apply_text_updates_state() {
        let mut client = ControlStreamClient::new(ClientConfig::default());
        client.apply_text(r#"{"kind": "control", "schema_version": 1, "control_x": 0.8}"#);
        assert_eq!(client.state().last_control_x, 0.8);
        assert_eq!(client.state().received_frames, 1);

        client.apply_text(r#"{"kind": "control", "schema_version": 9, "control_x": 0.1}"#);
        assert_eq!(client.state().received_frames, 1);
        assert_eq!(
            client.state().status_message.as_deref(),
            Some("Incompatible control schema version")
        );

        client.apply_text("garbage");
        assert_eq!(
            client.state().status_message.as_deref(),
            Some("Invalid frame received")
        );
        assert_eq!(client.state().last_control_x, 0.8);
    }
}
