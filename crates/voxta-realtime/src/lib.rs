//! Client session layer for the Voxta conversational service.
//!
//! - [`bus`]: typed fan-out of inbound events plus one-shot correlated waits.
//! - [`client`]: the connection session and command surface.
//! - [`chat`]: per-session chat state and streamed reply assembly.
//! - [`transport`]: the duplex link, with WebSocket hub and in-memory implementations.
//! - [`audio`]: the per-session audio upload stream.

pub mod audio;
pub mod bus;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;

pub use bus::{EventBus, PendingWait, Subscription, WaitOptions};
pub use chat::{Chat, ChatEvent, ChatPhase, ChatTracker, CompletedReply, ReplyOutcome};
pub use client::{ConnectionEvent, ConnectionPhase, VoxtaClient};
pub use config::{ClientConfig, ConfigError};
pub use error::{Error, Result};
pub use voxta_types;
