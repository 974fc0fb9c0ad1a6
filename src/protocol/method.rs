use crate::protocol::ParseError;
use std::fmt;

/// HTTP request methods.
///
/// The set is closed: anything outside it fails request-line parsing
/// with a 400 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Get,
    Post,
    Head,
    Put,
    Patch,
    Delete,
    Trace,
    Connect,
}

impl Method {
    /// Every supported method, in the order the parser tries them.
    pub const ALL: [Method; 9] = [
        Method::Options,
        Method::Get,
        Method::Post,
        Method::Head,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Trace,
        Method::Connect,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

impl Default for Method {
    fn default() -> Self {
        Method::Get
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Method {
    type Error = ParseError;

    fn try_from(str: &str) -> Result<Self, Self::Error> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == str)
            .ok_or(ParseError::UnknownMethod)
    }
}
