use thiserror::Error;

/// Everything that can go wrong in a single exchange with the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    /// The request never produced a response: unreachable host, timeout, or a
    /// body that could not be read.
    #[error("{0}")]
    Transport(String),
    /// The server answered with a non-success status. Carries the response
    /// body, or the status text if the body was empty.
    #[error("{0}")]
    ServerRejected(String),
    /// The body did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Caught before any request was sent.
    #[error("{0}")]
    LocalValidation(String),
}

/// Result type alias.
pub type ConsoleResult<T> = Result<T, ConsoleError>;

impl From<serde_json::Error> for ConsoleError {
    fn from(e: serde_json::Error) -> Self {
        ConsoleError::MalformedResponse(e.to_string())
    }
}

/// Return a local validation error with the given message if the provided
/// condition is false.
macro_rules! validate_or_error {
    ($condition:expr, $message:expr) => {{
        if !$condition {
            return Err(ConsoleError::LocalValidation($message.into()));
        }
    }};
}
