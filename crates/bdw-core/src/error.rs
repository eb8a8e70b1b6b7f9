use thiserror::Error;

/// Errors that cross the worker boundary.
///
/// Every variant carries only plain data, so a host that knows nothing about
/// the worker's internal types can still rebuild it from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("access denied")]
    AccessDenied,
    #[error("command canceled")]
    Canceled,
    #[error("{origin}: {message}")]
    TransportFailure { origin: String, message: String },
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl GatewayError {
    pub fn transport(origin: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::TransportFailure {
            origin: origin.into(),
            message: message.into(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
