/// Failure of a call against the remote service.
///
/// The interactive engine shows every variant the same way: as a single
/// human-readable message.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Not authenticated. Add a server and API token to servers.yaml first.")]
    NotAuthenticated,
    #[error("{message}")]
    Status {
        status: u16,
        message: String,
    },
    #[error("{0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{0} has no identifier")]
    MissingId(String),
}

impl ServiceError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        ServiceError::Status { status, message: message.into() }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Decode(err.to_string())
    }
}
