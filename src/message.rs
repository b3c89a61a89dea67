//! Line protocol definitions
//!
//! Every frame on the wire is one UTF-8 line. Clients send lobby commands
//! (`LobbyCommand`) or chat text; the server answers with `ServerMessage`
//! lines, whose `Display` impl is the exact text written to the socket.

use std::fmt;

use crate::error::AppError;

/// Sentinel line that ends the session in every stage
pub const END: &str = "end";

/// A chat line travelling from a session worker to its room's broadcaster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Username of the member who sent the line
    pub sender: String,
    /// Rendered text, `"<sender>: <line>"`
    pub text: String,
}

impl ChatMessage {
    pub fn new(sender: &str, line: &str) -> Self {
        Self {
            sender: sender.to_string(),
            text: format!("{}: {}", sender, line),
        }
    }
}

/// Client → Server command, while in the lobby
///
/// The first whitespace-delimited token selects the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyCommand {
    /// List every known room, one per line
    List,
    /// Join an existing room
    Join { room: String },
    /// Create a room and join it. `max_users` is `None` when not given,
    /// `Some(0)` when given but not a valid number.
    Create {
        room: String,
        max_users: Option<usize>,
    },
    /// Leave the server
    End,
}

impl LobbyCommand {
    /// Parse one lobby line
    ///
    /// Wrong arity for `create`/`join` yields `AppError::InvalidCommand`,
    /// an unrecognized first token yields `AppError::UnknownCommand` carrying
    /// the whole line.
    pub fn parse(line: &str) -> Result<Self, AppError> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts.as_slice() {
            [END] => Ok(LobbyCommand::End),
            ["list", ..] => Ok(LobbyCommand::List),
            ["join", room] => Ok(LobbyCommand::Join {
                room: room.to_string(),
            }),
            ["join", ..] => Err(AppError::InvalidCommand("join")),
            ["create", room, rest @ ..] => Ok(LobbyCommand::Create {
                room: room.to_string(),
                max_users: rest.first().map(|n| n.parse().unwrap_or(0)),
            }),
            ["create"] => Err(AppError::InvalidCommand("create")),
            _ => Err(AppError::UnknownCommand(line.to_string())),
        }
    }
}

/// Server → Client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Registration prompt, sent on connect
    SelectUsername,
    /// Registration rejected, client may retry
    UsernameInUse,
    /// Lobby banner
    Welcome,
    /// Lobby command summary
    Actions,
    /// One entry of a `list` reply
    RoomListing(String),
    /// `create` accepted
    Creating(String),
    /// Admitted to a room
    Joining(String),
    /// `create` for a name already taken
    RoomExists(String),
    /// `join` for an unknown room
    RoomNotFound(String),
    /// `join` for a room at capacity
    RoomFull(String),
    /// Known command with the wrong arity
    InvalidCommand(&'static str),
    /// Unrecognized lobby command
    UnknownCommand(String),
    /// A broadcast chat line
    Chat(String),
    /// Server is about to exit
    ShuttingDown,
    /// Anything else that went wrong on the server side
    Internal,
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::SelectUsername => write!(f, "Select username"),
            ServerMessage::UsernameInUse => write!(f, "Username already in use"),
            ServerMessage::Welcome => write!(f, "Welcome to the Lobby"),
            ServerMessage::Actions => write!(
                f,
                "actions: list, join <CHATROOM>, create <CHATROOM> [MAX_USERS], end"
            ),
            ServerMessage::RoomListing(room) => write!(f, "{}", room),
            ServerMessage::Creating(room) => write!(f, "Creating chatroom {}", room),
            ServerMessage::Joining(room) => write!(f, "Joining {}", room),
            ServerMessage::RoomExists(room) => write!(f, "Chatroom {} already exists", room),
            ServerMessage::RoomNotFound(room) => write!(f, "Chatroom {} doesn't exist", room),
            ServerMessage::RoomFull(room) => write!(f, "{}: At max capacity, can't join", room),
            ServerMessage::InvalidCommand(command) => write!(f, "Invalid {} command", command),
            ServerMessage::UnknownCommand(text) => write!(f, "Command {} doesn't exist", text),
            ServerMessage::Chat(text) => write!(f, "{}", text),
            ServerMessage::ShuttingDown => write!(f, "Server shutting down"),
            ServerMessage::Internal => write!(f, "Internal error"),
        }
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        match err {
            AppError::UsernameInUse(_) => ServerMessage::UsernameInUse,
            AppError::RoomNotFound(room) | AppError::RoomClosed(room) => {
                ServerMessage::RoomNotFound(room)
            }
            AppError::RoomExists(room) => ServerMessage::RoomExists(room),
            AppError::RoomFull(room) => ServerMessage::RoomFull(room),
            AppError::InvalidCommand(command) => ServerMessage::InvalidCommand(command),
            AppError::UnknownCommand(text) => ServerMessage::UnknownCommand(text),
            // Fatal errors are not typically converted (connection closes)
            _ => ServerMessage::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_prefix() {
        let msg = ChatMessage::new("alice", "hello there");
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.text, "alice: hello there");
    }

    #[test]
    fn test_parse_create() {
        assert_eq!(
            LobbyCommand::parse("create tavern").unwrap(),
            LobbyCommand::Create {
                room: "tavern".to_string(),
                max_users: None
            }
        );
        assert_eq!(
            LobbyCommand::parse("create tavern 2").unwrap(),
            LobbyCommand::Create {
                room: "tavern".to_string(),
                max_users: Some(2)
            }
        );
    }

    #[test]
    fn test_parse_create_bad_size_falls_back_to_zero() {
        assert_eq!(
            LobbyCommand::parse("create tavern lots").unwrap(),
            LobbyCommand::Create {
                room: "tavern".to_string(),
                max_users: Some(0)
            }
        );
    }

    #[test]
    fn test_parse_wrong_arity() {
        assert!(matches!(
            LobbyCommand::parse("create"),
            Err(AppError::InvalidCommand("create"))
        ));
        assert!(matches!(
            LobbyCommand::parse("join"),
            Err(AppError::InvalidCommand("join"))
        ));
        assert!(matches!(
            LobbyCommand::parse("join a b"),
            Err(AppError::InvalidCommand("join"))
        ));
    }

    #[test]
    fn test_parse_list_join_end() {
        assert_eq!(LobbyCommand::parse("list").unwrap(), LobbyCommand::List);
        assert_eq!(LobbyCommand::parse("end").unwrap(), LobbyCommand::End);
        assert_eq!(
            LobbyCommand::parse("join  tavern ").unwrap(),
            LobbyCommand::Join {
                room: "tavern".to_string()
            }
        );
    }

    #[test]
    fn test_parse_unknown_keeps_whole_line() {
        match LobbyCommand::parse("frobnicate now") {
            Err(AppError::UnknownCommand(text)) => assert_eq!(text, "frobnicate now"),
            other => panic!("Wrong result: {:?}", other),
        }
        assert!(matches!(
            LobbyCommand::parse("end now"),
            Err(AppError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_server_message_lines() {
        assert_eq!(ServerMessage::SelectUsername.to_string(), "Select username");
        assert_eq!(
            ServerMessage::UsernameInUse.to_string(),
            "Username already in use"
        );
        assert_eq!(
            ServerMessage::UnknownCommand("frobnicate".to_string()).to_string(),
            "Command frobnicate doesn't exist"
        );
        assert_eq!(
            ServerMessage::Joining("tavern".to_string()).to_string(),
            "Joining tavern"
        );
    }

    #[test]
    fn test_error_to_server_message() {
        let msg: ServerMessage = AppError::RoomFull("tavern".to_string()).into();
        assert!(msg.to_string().contains("At max capacity"));

        let msg: ServerMessage = AppError::RoomClosed("tavern".to_string()).into();
        assert_eq!(msg.to_string(), "Chatroom tavern doesn't exist");

        let msg: ServerMessage = AppError::ChannelSend.into();
        assert_eq!(msg, ServerMessage::Internal);
    }
}
