use thiserror::Error;

/// Errors produced at the crate boundary. Record emission itself is
/// infallible; everything here surfaces either at configuration time or on
/// the output sink.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed IPv4 address or CIDR prefix.
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),
    /// A configuration value that fails validation.
    #[error("invalid configuration: {0}")]
    Precondition(String),
    /// A traffic-class tag the registry does not know.
    #[error("unknown pattern type: {0}")]
    UnknownPattern(String),
    /// I/O failure on the record sink.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
    /// Shutdown was observed before the requested generation completed.
    #[error("generation cancelled before completion")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
