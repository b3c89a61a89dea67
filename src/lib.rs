//! Multi-room line-oriented chat server library
//!
//! Clients connect over TCP, claim a unique username, pick or create a
//! named room from the lobby, and exchange broadcast text lines with the
//! other members of that room.
//!
//! # Architecture
//! Uses the Actor pattern with bounded `mpsc` channels:
//! - `Registry` owns the global username and room registries
//! - Each connection goes through a registration `handler`, a `LobbyWorker`
//!   and finally a room `Session`
//! - Each room runs a `RoomManager` (sole owner of membership, processes
//!   joins and leaves one at a time) and a `Broadcaster` (fan-out)
//! - No locks needed - all shared state is reached through message passing
//!
//! # Example
//! ```ignore
//! use roomchat::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::bind(ServerConfig::default()).await.unwrap();
//!     server.run().await;
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod lobby;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::run_client;
pub use config::{Mode, ServerConfig};
pub use connection::Connection;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{ChatMessage, LobbyCommand, ServerMessage};
pub use registry::{RegistryHandle, RegistryStats};
pub use room::{Chatroom, RoomHandle, RoomState};
pub use server::Server;
pub use types::{ConnectionId, RoomName};
