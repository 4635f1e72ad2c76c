pub mod client;
pub mod config;
pub mod control_signal;
pub mod error;
pub mod frame;
pub mod stream_server;

// Re-export commonly used types and functions for convenience
pub use client::{
    decode_frame, ClientConfig, ConnectionState, ControlStreamClient, ControlStreamState,
    FrameEvent,
};
pub use config::{ServerConfig, DEFAULT_PORT, FRAME_INTERVAL_MS};
pub use control_signal::{control_value, ControlSignal, JITTER_AMPLITUDE};
pub use error::{Result, StreamError};
pub use frame::{ControlFrame, CONTROL_KIND, CONTROL_SCHEMA_VERSION};
pub use stream_server::{ConnectionLoop, ControlStreamServer, LoopState, LoopSummary};
