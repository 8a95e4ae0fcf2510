//! Message vocabulary of the Voxta conversational service.
//!
//! - `client`: commands the client sends, one [`ClientMessage`] enum tagged by `$type`.
//! - `server`: events the service pushes, one [`ServerMessage`] enum over a closed set
//!   of discriminators.
//! - `shared`: payload types used on both sides.

pub mod client;
pub mod server;
pub mod shared;

pub use client::ClientMessage;
pub use server::{ServerMessage, ServerMessageType};
pub use shared::Guid;
