//! Header collection and the typed header registry.
//!
//! Headers arrive as raw `(name, value)` byte spans. Names that the
//! registry knows are parsed into a typed [`Header`] at decode time;
//! everything else is stored verbatim as a [`Raw`] pair. Lookup is
//! case-insensitive, storage preserves the received spelling.

use crate::protocol::{MediaType, ParseError};
use std::fmt;

/// A typed, parsed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    ContentLength(u64),
    ContentType(MediaType),
    TransferEncoding(String),
    Host(String),
}

impl Header {
    pub const fn name(&self) -> &'static str {
        match self {
            Header::ContentLength(_) => "Content-Length",
            Header::ContentType(_) => "Content-Type",
            Header::TransferEncoding(_) => "Transfer-Encoding",
            Header::Host(_) => "Host",
        }
    }

    /// Serialized header value, as written on the wire.
    pub fn write_value(&self, f: &mut dyn fmt::Write) -> fmt::Result {
        match self {
            Header::ContentLength(n) => write!(f, "{n}"),
            Header::ContentType(mime) => f.write_str(mime.as_str()),
            Header::TransferEncoding(v) => f.write_str(v),
            Header::Host(v) => f.write_str(v),
        }
    }
}

/// Whether `name` belongs to the typed registry.
pub fn is_registered(name: &[u8]) -> bool {
    const REGISTERED: [&[u8]; 4] =
        [b"Content-Length", b"Content-Type", b"Transfer-Encoding", b"Host"];
    REGISTERED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// Parses a raw value into the typed header registered under `name`.
///
/// Callers must check [`is_registered`] first; an unregistered name is
/// reported as an invalid header.
pub fn parse_registered(name: &[u8], raw: &[u8]) -> Result<Header, ParseError> {
    let text = |header: &str| {
        std::str::from_utf8(raw).map_err(|_| ParseError::invalid_header(header, "not valid UTF-8"))
    };

    if name.eq_ignore_ascii_case(b"Content-Length") {
        let length = text("Content-Length")?
            .trim()
            .parse::<u64>()
            .map_err(|_| {
                ParseError::invalid_header("Content-Length", "value is not an unsigned integer")
            })?;
        Ok(Header::ContentLength(length))
    } else if name.eq_ignore_ascii_case(b"Content-Type") {
        Ok(Header::ContentType(MediaType::from_bytes(raw)?))
    } else if name.eq_ignore_ascii_case(b"Transfer-Encoding") {
        Ok(Header::TransferEncoding(text("Transfer-Encoding")?.to_string()))
    } else if name.eq_ignore_ascii_case(b"Host") {
        Ok(Header::Host(text("Host")?.to_string()))
    } else {
        Err(ParseError::invalid_header(
            &String::from_utf8_lossy(name),
            "not a registered header",
        ))
    }
}

/// An unregistered header, stored byte for byte as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raw {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl Raw {
    pub fn new(name: Vec<u8>, value: Vec<u8>) -> Self {
        Self { name, value }
    }
}

/// The header collection attached to requests and responses.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    typed: Vec<Header>,
    raw: Vec<Raw>,
}

impl Headers {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, header: Header) {
        self.typed.push(header);
    }

    pub fn add_raw(&mut self, raw: Raw) {
        self.raw.push(raw);
    }

    /// Typed lookup by header name, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&Header> {
        self.typed.iter().find(|h| h.name().eq_ignore_ascii_case(name))
    }

    /// Raw lookup by header name, case-insensitive.
    pub fn get_raw<K: AsRef<[u8]>>(&self, name: K) -> Option<&[u8]> {
        let name = name.as_ref();
        self.raw
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .map(|r| r.value.as_slice())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.typed.iter().find_map(|h| match h {
            Header::ContentLength(n) => Some(*n),
            _ => None,
        })
    }

    pub fn content_type(&self) -> Option<&MediaType> {
        self.typed.iter().find_map(|h| match h {
            Header::ContentType(mime) => Some(mime),
            _ => None,
        })
    }

    pub(crate) fn content_type_mut(&mut self) -> Option<&mut MediaType> {
        self.typed.iter_mut().find_map(|h| match h {
            Header::ContentType(mime) => Some(mime),
            _ => None,
        })
    }

    pub fn transfer_encoding(&self) -> Option<&str> {
        self.typed.iter().find_map(|h| match h {
            Header::TransferEncoding(v) => Some(v.as_str()),
            _ => None,
        })
    }

    pub fn host(&self) -> Option<&str> {
        self.typed.iter().find_map(|h| match h {
            Header::Host(v) => Some(v.as_str()),
            _ => None,
        })
    }

    /// Typed headers, in insertion order.
    pub fn list(&self) -> impl Iterator<Item = &Header> {
        self.typed.iter()
    }

    /// Raw headers, in insertion order.
    pub fn raw_list(&self) -> impl Iterator<Item = &Raw> {
        self.raw.iter()
    }

    pub fn len(&self) -> usize {
        self.typed.len() + self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.typed.is_empty() && self.raw.is_empty()
    }

    pub fn clear(&mut self) {
        self.typed.clear();
        self.raw.clear();
    }
}
