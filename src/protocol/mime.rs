use crate::protocol::ParseError;
use std::fmt;

/// A MIME media type, as carried by `Content-Type`.
///
/// The well-known types the framework itself produces get dedicated
/// variants; anything else round-trips through [`MediaType::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    TextPlain,
    TextHtml,
    ApplicationJson,
    ApplicationOctetStream,
    Other(String),
}

impl MediaType {
    pub fn as_str(&self) -> &str {
        match self {
            MediaType::TextPlain => "text/plain",
            MediaType::TextHtml => "text/html",
            MediaType::ApplicationJson => "application/json",
            MediaType::ApplicationOctetStream => "application/octet-stream",
            MediaType::Other(s) => s.as_str(),
        }
    }

    /// Parses a raw header value. A media type must contain exactly one
    /// `/` separating a non-empty type and subtype.
    pub fn from_bytes(raw: &[u8]) -> Result<MediaType, ParseError> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| ParseError::invalid_header("Content-Type", "not valid UTF-8"))?;

        let mut parts = text.splitn(2, '/');
        let top = parts.next().unwrap_or("");
        let sub = parts.next().unwrap_or("");
        if top.is_empty() || sub.is_empty() {
            return Err(ParseError::invalid_header(
                "Content-Type",
                "expected type/subtype",
            ));
        }

        Ok(match text {
            "text/plain" => MediaType::TextPlain,
            "text/html" => MediaType::TextHtml,
            "application/json" => MediaType::ApplicationJson,
            "application/octet-stream" => MediaType::ApplicationOctetStream,
            _ => MediaType::Other(text.to_string()),
        })
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known() {
        assert_eq!(MediaType::from_bytes(b"text/plain"), Ok(MediaType::TextPlain));
        assert_eq!(MediaType::TextPlain.as_str(), "text/plain");
    }

    #[test]
    fn test_other_round_trips() {
        let mime = MediaType::from_bytes(b"image/png").unwrap();
        assert_eq!(mime, MediaType::Other("image/png".to_string()));
        assert_eq!(mime.as_str(), "image/png");
    }

    #[test]
    fn test_invalid() {
        assert!(MediaType::from_bytes(b"textplain").is_err());
        assert!(MediaType::from_bytes(b"/plain").is_err());
        assert!(MediaType::from_bytes(b"text/").is_err());
    }
}
