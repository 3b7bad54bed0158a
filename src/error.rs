use http::StatusCode;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Failure payload carried by a routing context while it is failing.
///
/// Wraps an HTTP status code plus an optional message and source error. This
/// is what failure handlers observe via `RoutingContext::failure()` and what
/// the default failure responder turns into a status-coded response.
#[derive(Debug)]
pub struct HttpError {
    /// HTTP status code for the failure (500 when the cause carries none)
    pub status: StatusCode,
    /// Optional human-readable message
    pub message: Option<String>,
    /// Underlying cause, if the failure originated from another error
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HttpError {
    /// Failure with a bare status code.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: None,
            source: None,
        }
    }

    /// Failure with a status code and message.
    #[must_use]
    pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            source: None,
        }
    }

    /// Internal server error (500) with a message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Wrap an arbitrary error as a 500 failure, keeping it as the source.
    #[must_use]
    pub fn from_cause(cause: Box<dyn StdError + Send + Sync>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: Some(cause.to_string()),
            source: Some(cause),
        }
    }

    /// Numeric status code helper for log fields and responses.
    #[must_use]
    pub fn status_u16(&self) -> u16 {
        self.status.as_u16()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.status),
            None => write!(f, "{}", self.status),
        }
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<StatusCode> for HttpError {
    fn from(status: StatusCode) -> Self {
        Self::new(status)
    }
}

/// Errors raised while registering or mutating routes.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Route paths must begin with `/`
    #[error("path must start with '/': {0:?}")]
    InvalidPath(String),
    /// A `:name` token is used more than once in one path pattern
    #[error("cannot use identifier {0:?} more than once in pattern string")]
    DuplicateParam(String),
    /// The supplied regular expression failed to compile
    #[error("invalid route regex")]
    InvalidRegex(#[from] regex::Error),
    /// Mount prefixes are plain paths; the wildcard is implied
    #[error("don't include '*' when mounting a sub router")]
    WildcardInMountPoint,
    /// Sub-routers can only be mounted on literal or prefix paths
    #[error("sub routers must be mounted on literal paths")]
    InvalidMountRoute,
    /// A route hosting a sub-router accepts no other handlers
    #[error("route is exclusively used by a sub router")]
    ExclusiveRoute,
}
