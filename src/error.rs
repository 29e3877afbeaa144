use axum::http::StatusCode;
use std::io;

/// Every way a webhook request or the server setup can fail.
///
/// The `Display` text of the request-level variants is what the operator sees
/// as the last line of the plain-text response, so it never carries internals.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("{0}")]
    Misconfigured(String),

    #[error("Web hook event ({header} header) is missing from request.")]
    MissingEventHeader { header: &'static str },

    #[error("Received {event} event, ignoring.")]
    UnsupportedEvent { event: String },

    #[error("Don't know what to do with {content_type} content type.")]
    UnsupportedContentType { content_type: String },

    #[error("{message}")]
    EmptyBody {
        message: &'static str,
        status: StatusCode,
    },

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Invalid payload ({0}).")]
    InvalidPayload(String),

    #[error("Invalid ref field \"{0}\" (expected something like refs/heads/<branch>).")]
    InvalidRef(String),

    #[error("Project list is not available: {0}")]
    RegistryUnavailable(String),

    #[error("Deploy command could not be started: {0}")]
    DispatchFailure(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

impl HookError {
    /// HTTP status reported when this error terminates a webhook request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HookError::MissingEventHeader { .. }
            | HookError::UnsupportedEvent { .. }
            | HookError::UnsupportedContentType { .. }
            | HookError::InvalidPayload(_)
            | HookError::InvalidRef(_) => StatusCode::BAD_REQUEST,
            HookError::EmptyBody { status, .. } => *status,
            HookError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            HookError::Forbidden(_) => StatusCode::FORBIDDEN,
            HookError::Misconfigured(_)
            | HookError::RegistryUnavailable(_)
            | HookError::DispatchFailure(_)
            | HookError::ConfigError(_)
            | HookError::IoError(_)
            | HookError::TomlParseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Helper type for Results that use HookError
pub type Result<T> = std::result::Result<T, HookError>;
