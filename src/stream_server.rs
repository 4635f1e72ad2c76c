use crate::config::ServerConfig;
use crate::control_signal::ControlSignal;
use crate::error::{Result, StreamError};
use crate::frame::ControlFrame;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, error, info, warn};

pub struct ControlStreamServer {
    config: ServerConfig,
    listener: TcpListener,
    epoch: Instant, // shared sine phase for every connection
    next_connection_id: usize,
}

impl ControlStreamServer {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        Ok(Self {
            config,
            listener,
            epoch: Instant::now(),
            next_connection_id: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one streaming task per client.
    pub async fn run(mut self) -> Result<()> {
        info!(
            addr = %self.local_addr()?,
            rate_hz = self.config.frame_rate_hz(),
            "control stream listening"
        );

        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => {
                    let connection_id = self.next_connection_id;
                    self.next_connection_id += 1;
                    debug!(connection_id, %addr, "accepted tcp connection");

                    spawn(handle_client_connection(
                        connection_id,
                        socket,
                        addr,
                        ControlSignal::new(self.epoch),
                        self.config.frame_interval,
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        spawn(self.run())
    }
}

async fn handle_client_connection(
    connection_id: usize,
    socket: TcpStream,
    addr: SocketAddr,
    signal: ControlSignal,
    cadence: Duration,
) {
    if let Err(e) = socket.set_nodelay(true) {
        warn!(connection_id, error = %e, "failed to set TCP_NODELAY");
    }

    let ws = match accept_async(socket).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(connection_id, %addr, error = %e, "websocket handshake failed");
            return;
        }
    };
    info!(connection_id, %addr, "client connected");

    let mut connection = ConnectionLoop::new(connection_id, ws, signal, cadence);
    match connection.run().await {
        Ok(summary) => {
            info!(
                connection_id,
                frames_sent = summary.frames_sent,
                "client disconnected"
            );
        }
        Err(e) => {
            error!(
                connection_id,
                frames_sent = connection.frames_sent(),
                error = %e,
                "connection loop failed"
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Streaming,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub connection_id: usize,
    pub frames_sent: u64,
}

/// Streams control frames to a single peer until it goes away.
///
/// Anything the peer sends is read and dropped; reading is also how a close
/// frame from the peer gets noticed between ticks.
pub struct ConnectionLoop<S> {
    connection_id: usize,
    ws: WebSocketStream<S>,
    signal: ControlSignal,
    cadence: Duration,
    state: LoopState,
    frames_sent: u64,
}

impl<S> ConnectionLoop<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        connection_id: usize,
        ws: WebSocketStream<S>,
        signal: ControlSignal,
        cadence: Duration,
    ) -> Self {
        Self {
            connection_id,
            ws,
            signal,
            cadence,
            state: LoopState::Streaming,
            frames_sent: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Runs until the peer disconnects (`Ok`) or the transport fails (`Err`).
    /// The loop is `Closed` afterwards either way.
    pub async fn run(&mut self) -> Result<LoopSummary> {
        let outcome = self.stream_frames().await;
        self.state = LoopState::Closed;

        match outcome {
            Ok(()) | Err(StreamError::PeerDisconnected) => Ok(LoopSummary {
                connection_id: self.connection_id,
                frames_sent: self.frames_sent,
            }),
            Err(e) => Err(e),
        }
    }

    async fn stream_frames(&mut self) -> Result<()> {
        let mut ticker = interval(self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.send_frame().await?;
                }
                inbound = self.ws.next() => match inbound {
                    None => return Err(StreamError::PeerDisconnected),
                    Some(Ok(Message::Close(reason))) => {
                        debug!(connection_id = self.connection_id, ?reason, "peer sent close");
                        // Flush the queued close reply; the peer may already be gone
                        let _ = self.ws.close(None).await;
                        return Ok(());
                    }
                    Some(Ok(msg)) => {
                        debug!(
                            connection_id = self.connection_id,
                            len = msg.len(),
                            "ignoring inbound message"
                        );
                    }
                    Some(Err(e)) => return Err(StreamError::from_transport(e)),
                },
            }
        }
    }

    async fn send_frame(&mut self) -> Result<()> {
        let frame = ControlFrame::new(self.signal.next_value());
        let text = frame.to_text()?;
        self.ws.send(Message::text(text)).await?;
        self.frames_sent += 1;

        info!(
            connection_id = self.connection_id,
            seq = self.frames_sent,
            control_x = frame.control_x,
            "sent control frame"
        );
        Ok(())
    }
}
