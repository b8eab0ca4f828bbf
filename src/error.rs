use thiserror::Error;

/// Result type alias for ptun operations
pub type PtunResult<T> = Result<T, PtunError>;

/// Error types for the ptun library
#[derive(Error, Debug)]
pub enum PtunError {
    /// Malformed or incomplete tunnel configuration; fatal before any attempt starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential resolution or SSH handshake failure; aborts the current attempt
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The local listener could not be created; aborts the current attempt
    #[error("Bind error: {0}")]
    Bind(String),

    /// The accept loop failed; ends the current attempt
    #[error("Accept error: {0}")]
    Accept(String),

    /// Remote-target dial failed for one inbound connection
    #[error("Dial error: {0}")]
    Dial(String),

    /// A read/write fault mid-stream on one forwarded connection
    #[error("Connection error: {0}")]
    Copy(String),

    /// Too many missed keep-alive probes; the transport was force-closed
    #[error("SSH keep-alive termination")]
    KeepAliveTimeout,

    /// SSH transport errors
    #[error("SSH error: {0}")]
    Ssh(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<russh::Error> for PtunError {
    fn from(err: russh::Error) -> Self {
        PtunError::Ssh(err.to_string())
    }
}
