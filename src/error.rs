use crate::resp::RespError;

#[derive(Debug, thiserror::Error)]
pub enum ScarletError {
    /// The server sent bytes that violate RESP framing. Fatal: the stream
    /// cannot be resynchronized, so the connection is torn down and every
    /// in-flight request fails with `Disconnected`.
    #[error("protocol framing error: {0}")]
    Framing(String),

    /// An error reply (`-WRONGTYPE ...`) from the server. Routine; the
    /// connection stays up.
    #[error("{kind} {message}")]
    Server { kind: String, message: String },

    /// The caller attempted an operation the connection mode forbids
    /// (regular command in pub/sub mode, nested MULTI). Nothing was written.
    #[error("invalid operation: {0}")]
    Misuse(String),

    /// The connection is closed, or closed while the request was in flight.
    #[error("connection closed")]
    Disconnected,

    /// The surrounding transaction was discarded before EXEC completed.
    #[error("transaction aborted")]
    TransactionAborted,

    /// A reply arrived with a shape the typed command wrapper did not expect.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScarletError {
    /// Build a `Server` error from the text of a `-` reply, splitting the
    /// leading error-kind token (`WRONGTYPE`, `ERR`, ...) from the message.
    pub fn from_error_reply(text: &str) -> Self {
        match text.split_once(' ') {
            Some((kind, message)) => ScarletError::Server {
                kind: kind.to_string(),
                message: message.to_string(),
            },
            None => ScarletError::Server {
                kind: text.to_string(),
                message: String::new(),
            },
        }
    }
}

impl From<RespError> for ScarletError {
    fn from(e: RespError) -> Self {
        ScarletError::Framing(e.to_string())
    }
}

pub type ScarletResult<T> = Result<T, ScarletError>;
