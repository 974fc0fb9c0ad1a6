//! Error types for request parsing, response sending and handler
//! dispatch.
//!
//! [`ParseError`] covers everything the request parser can reject; each
//! variant knows the status code the peer should see. [`SendError`]
//! covers response serialization and the write path. [`HttpError`] is
//! the typed error a handler returns when it wants a specific status
//! line on the wire; any other handler error is turned into a 500.

use crate::protocol::StatusCode;
use std::error::Error;
use std::io;
use thiserror::Error;

/// Errors raised while parsing a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The request line does not start with a known method.
    #[error("Unknown HTTP request method")]
    UnknownMethod,

    /// The byte after the method token was not a space.
    #[error("Malformed HTTP request after Method, expected SP")]
    MalformedRequestLine,

    /// The version token is not `HTTP/1.0` or `HTTP/1.1`.
    #[error("Encountered invalid HTTP version")]
    InvalidVersion,

    /// The request did not fit into the parser buffer.
    #[error("Request exceeded maximum buffer size")]
    PayloadTooLarge,

    /// A `Transfer-Encoding` header was present.
    #[error("Transfer-Encoding is not implemented")]
    UnsupportedTransferEncoding,

    /// A registered header failed to parse.
    #[error("invalid {name} header: {reason}")]
    InvalidHeader { name: String, reason: String },
}

impl ParseError {
    pub fn invalid_header<S: ToString>(name: &str, reason: S) -> Self {
        Self::InvalidHeader { name: name.to_string(), reason: reason.to_string() }
    }

    /// The status code reported to the peer for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::PayloadTooLarge => StatusCode::RequestEntityTooLarge,
            ParseError::UnsupportedTransferEncoding => StatusCode::NotImplemented,
            _ => StatusCode::BadRequest,
        }
    }
}

/// Errors raised while serializing or writing a response.
#[derive(Error, Debug)]
pub enum SendError {
    /// The serialized response did not fit into the output buffer.
    #[error("Could not write to stream: insufficient space")]
    InsufficientSpace,

    /// The peer went away before the response was sent.
    #[error("Broken pipe")]
    BrokenPipe,

    /// I/O error on the peer socket.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// A typed handler error carrying the status line to put on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct HttpError {
    pub code: StatusCode,
    pub reason: String,
}

impl HttpError {
    pub fn new<S: Into<String>>(code: StatusCode, reason: S) -> Self {
        Self { code, reason: reason.into() }
    }
}

impl From<ParseError> for HttpError {
    fn from(e: ParseError) -> Self {
        Self { code: e.status(), reason: e.to_string() }
    }
}

/// What a [`Handler`](crate::handler::Handler) may fail with.
///
/// Typed failures keep their status code; anything else becomes a 500
/// carrying the error's message.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("{0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl HandlerError {
    pub fn other<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self::Other(e.into())
    }
}

impl From<Box<dyn Error + Send + Sync>> for HandlerError {
    fn from(e: Box<dyn Error + Send + Sync>) -> Self {
        Self::Other(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_status_mapping() {
        assert_eq!(ParseError::UnknownMethod.status(), StatusCode::BadRequest);
        assert_eq!(ParseError::InvalidVersion.status(), StatusCode::BadRequest);
        assert_eq!(ParseError::PayloadTooLarge.status(), StatusCode::RequestEntityTooLarge);
        assert_eq!(
            ParseError::UnsupportedTransferEncoding.status(),
            StatusCode::NotImplemented
        );
    }

    #[test]
    fn test_parse_error_reasons() {
        assert_eq!(ParseError::UnknownMethod.to_string(), "Unknown HTTP request method");
        assert_eq!(ParseError::InvalidVersion.to_string(), "Encountered invalid HTTP version");
    }

    #[test]
    fn test_http_error_from_parse_error() {
        let err = HttpError::from(ParseError::InvalidVersion);
        assert_eq!(err.code, StatusCode::BadRequest);
        assert_eq!(err.reason, "Encountered invalid HTTP version");
    }
}
