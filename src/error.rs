//! Error types for identity resolution and authorization.

use std::fmt;

use http::StatusCode;

/// Errors that can occur while resolving an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// A backend answered with something other than 200 OK.
    RemoteStatus {
        /// What was being fetched ("profile" or "groups")
        context: String,
        code: StatusCode,
    },
    /// A 200 response body did not have the expected JSON shape.
    RemoteDecode { context: String, detail: String },
    /// The expected field was absent or not a scalar.
    FieldMissing { field: String },
    /// The request could not be sent or the response could not be read.
    Transport { context: String, detail: String },
    /// Invalid configuration value.
    Config { detail: String },
    /// Authenticated, but not a member of any allowed group.
    NotAuthorized,
}

impl GateError {
    pub fn remote_status(context: impl Into<String>, code: StatusCode) -> Self {
        Self::RemoteStatus {
            context: context.into(),
            code,
        }
    }

    pub fn remote_decode(context: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::RemoteDecode {
            context: context.into(),
            detail: detail.to_string(),
        }
    }

    pub fn field_missing(field: impl Into<String>) -> Self {
        Self::FieldMissing {
            field: field.into(),
        }
    }

    pub fn transport(context: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::Transport {
            context: context.into(),
            detail: detail.to_string(),
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    /// Whether this error is an authorization decision rather than a
    /// failure of a backend or of the configuration.
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::NotAuthorized)
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteStatus { context, code } => {
                write!(f, "Unexpected status from {} endpoint: got {}", context, code.as_u16())
            }
            Self::RemoteDecode { context, detail } => {
                write!(f, "Failed to decode {} response: {}", context, detail)
            }
            Self::FieldMissing { field } => write!(f, "Missing field: {}", field),
            Self::Transport { context, detail } => {
                write!(f, "Request to {} endpoint failed: {}", context, detail)
            }
            Self::Config { detail } => write!(f, "Invalid configuration: {}", detail),
            Self::NotAuthorized => write!(f, "Not a member of any allowed group"),
        }
    }
}

impl std::error::Error for GateError {}

/// Result type for gate operations.
pub type GateResult<T> = Result<T, GateError>;
