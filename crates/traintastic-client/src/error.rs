//! Client error taxonomy

use thiserror::Error;

use traintastic_core::{CoreError, ErrorCode};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// The server answered with an error response.
    #[error("server error: {0:?}")]
    ErrorResponse(ErrorCode),

    /// The request was cancelled locally; the server side is not cancelled.
    #[error("request cancelled")]
    Cancelled,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Protocol(&'static str),
}

pub type Result<T> = std::result::Result<T, ClientError>;
