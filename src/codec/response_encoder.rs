//! Response serialization into a bounded output slab.
//!
//! The whole response (status line, headers, body) is formatted into a
//! single contiguous buffer of `2 * MAX_BUFFER` bytes. Running out of
//! room aborts the serialization with
//! [`SendError::InsufficientSpace`]; nothing is ever written past the
//! slab.

use crate::ensure;
use crate::protocol::{Headers, MediaType, SendError, StatusCode};
use crate::MAX_BUFFER;
use bytes::{BufMut, BytesMut};
use std::fmt::{self, Write};

pub(crate) const RESPONSE_BUFFER_SIZE: usize = MAX_BUFFER * 2;

/// Output buffer with a hard capacity.
struct OutBuf {
    buf: BytesMut,
    capacity: usize,
}

impl OutBuf {
    fn with_capacity(capacity: usize) -> Self {
        Self { buf: BytesMut::with_capacity(capacity), capacity }
    }

    fn put_slice(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        ensure!(self.buf.len() + bytes.len() <= self.capacity, SendError::InsufficientSpace);
        self.buf.put_slice(bytes);
        Ok(())
    }

    fn into_inner(self) -> BytesMut {
        self.buf
    }
}

impl fmt::Write for OutBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.put_slice(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// Formats a complete response. `content_type` carries a media type
/// that is not part of the header collection and is written as its own
/// `Content-Type` header.
pub(crate) fn encode(
    status: StatusCode,
    headers: &Headers,
    content_type: Option<&MediaType>,
    body: &[u8],
) -> Result<BytesMut, SendError> {
    let mut out = OutBuf::with_capacity(RESPONSE_BUFFER_SIZE);

    write_head(&mut out, status, headers, content_type, body.len())
        .map_err(|_| SendError::InsufficientSpace)?;
    out.put_slice(body)?;

    Ok(out.into_inner())
}

fn write_head(
    out: &mut OutBuf,
    status: StatusCode,
    headers: &Headers,
    content_type: Option<&MediaType>,
    body_len: usize,
) -> fmt::Result {
    // responses always carry HTTP/1.1, whatever the request version was
    write!(out, "HTTP/1.1 {} {}\r\n", status.as_u16(), status.reason())?;

    if let Some(mime) = content_type {
        write!(out, "Content-Type: {mime}\r\n")?;
    }

    for header in headers.list() {
        write!(out, "{}: ", header.name())?;
        header.write_value(out)?;
        out.write_str("\r\n")?;
    }
    for raw in headers.raw_list() {
        out.put_slice(&raw.name).map_err(|_| fmt::Error)?;
        out.write_str(": ")?;
        out.put_slice(&raw.value).map_err(|_| fmt::Error)?;
        out.write_str("\r\n")?;
    }

    if body_len > 0 {
        write!(out, "Content-Length: {body_len}\r\n\r\n")?;
    } else {
        out.write_str("\r\n")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;

    #[test]
    fn test_minimal_response() {
        let out = encode(StatusCode::Ok, &Headers::new(), None, b"").unwrap();
        assert_eq!(&out[..], b"HTTP/1.1 200 OK\r\n\r\n");
    }

    #[test]
    fn test_body_with_mime() {
        let out = encode(
            StatusCode::Ok,
            &Headers::new(),
            Some(&MediaType::TextPlain),
            b"hi",
        )
        .unwrap();

        let text = std::str::from_utf8(&out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.contains("Content-Length: 2\r\n\r\nhi"));
    }

    #[test]
    fn test_headers_are_enumerated() {
        let mut headers = Headers::new();
        headers.add(Header::ContentType(MediaType::ApplicationJson));
        headers.add_raw(crate::protocol::header::Raw::new(
            b"X-Trace".to_vec(),
            b"abc".to_vec(),
        ));

        let out = encode(StatusCode::NotFound, &headers, None, b"{}").unwrap();
        let text = std::str::from_utf8(&out).unwrap();

        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("X-Trace: abc\r\n"));
        assert!(text.ends_with("Content-Length: 2\r\n\r\n{}"));
    }

    #[test]
    fn test_oversized_body_is_rejected() {
        let body = vec![b'x'; RESPONSE_BUFFER_SIZE + 1];
        let result = encode(StatusCode::Ok, &Headers::new(), None, &body);
        assert!(matches!(result, Err(SendError::InsufficientSpace)));
    }
}
