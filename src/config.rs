//! Server configuration and command line mode
//!
//! The binary takes one positional mode argument (`server`, anything else
//! is treated as `client`) and an optional positional address.

/// Default listen / dial address
pub const DEFAULT_ADDR: &str = "127.0.0.1:7777";

/// Name of the room that exists from startup and is never torn down
pub const DEFAULT_ROOM: &str = "default";

/// Default room capacity, also used by `create` without an explicit size
pub const DEFAULT_MAX_USERS: usize = 64;

/// Capacity of every internal queue (join, leave, inbox, roster, registry, lobby)
pub const QUEUE_CAPACITY: usize = 128;

/// Capacity of each connection's outbound line queue
pub const OUTBOUND_CAPACITY: usize = 64;

/// Longest line accepted from a client, in bytes
pub const MAX_LINE_LENGTH: usize = 4096;

/// Tunables shared by every component of the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    /// Name of the persistent room
    pub default_room: String,
    /// Capacity of the default room and of rooms created without a size
    pub max_users: usize,
    /// Capacity of internal queues; producers wait when a queue is full
    pub queue_capacity: usize,
    /// Capacity of each connection's outbound queue; broadcasts drop when full
    pub outbound_capacity: usize,
    /// Longest accepted client line
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            default_room: DEFAULT_ROOM.to_string(),
            max_users: DEFAULT_MAX_USERS,
            queue_capacity: QUEUE_CAPACITY,
            outbound_capacity: OUTBOUND_CAPACITY,
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Default configuration listening on `addr`
    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }
}

/// Process mode selected by the first positional argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Server { addr: String },
    Client { addr: String },
}

impl Mode {
    /// Parse `<server|client> [addr]` from the arguments after the program name
    pub fn from_args<I>(mut args: I) -> Self
    where
        I: Iterator<Item = String>,
    {
        let mode = args.next();
        let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_string());

        match mode.as_deref() {
            Some("server") => Mode::Server { addr },
            _ => Mode::Client { addr },
        }
    }
}
