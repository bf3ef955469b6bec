use thiserror::Error;

/// Problems with a line typed at the prompt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: /{0} (try /help)")]
    UnknownCommand(String),

    #[error("Missing {what}. Usage: {usage}")]
    MissingArgument {
        what: &'static str,
        usage: &'static str,
    },

    #[error("Not a number: {0:?}")]
    InvalidNumber(String),

    #[error("Not a room id: {0:?}")]
    InvalidRoomId(String),
}
