//! The streaming HTTP request parser.
//!
//! A request is recognised by a three-step pipeline: request line,
//! headers, body. Each step consumes bytes from the cursor and reports
//! one of three outcomes:
//!
//! - [`State::Next`]: the step completed, move on
//! - [`State::Again`]: the step ran out of bytes; the cursor and the
//!   request under construction are rolled back so the step re-runs
//!   verbatim once more input has been fed
//! - [`State::Done`]: the whole request is parsed (body step only)
//!
//! The [`Parser`] is the driver: it owns the buffer, the persistent
//! cursor position and the step index, and is safe to re-enter after
//! every `feed`.

use crate::codec::stream::{Buffer, Revert, StreamCursor};
use crate::protocol::header::{self, Raw};
use crate::protocol::{Headers, Method, ParseError, Query, Request, Version};

/// Outcome of a single parse step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// More bytes are needed before the current step can complete.
    Again,
    /// The current step completed; the next one may run.
    Next,
    /// The request is fully parsed.
    Done,
}

const STEP_REQUEST_LINE: usize = 0;
const STEP_HEADERS: usize = 1;
const STEP_BODY: usize = 2;

/// Step 1: `METHOD SP resource [? query] SP "HTTP/" version CRLF`.
fn request_line_step(
    cursor: &mut StreamCursor<'_>,
    request: &mut Request,
) -> Result<State, ParseError> {
    let mut cursor = Revert::new(cursor);

    // Method. No method name is a prefix of another, so a full match is
    // unambiguous; a buffer that ends inside a candidate name means the
    // verdict needs more bytes.
    let mut found = None;
    let mut truncated = false;
    for method in Method::ALL {
        let literal = method.as_str().as_bytes();
        if cursor.match_literal(literal) {
            found = Some(method);
            break;
        }
        if cursor.remaining() < literal.len() && literal.starts_with(cursor.rest()) {
            truncated = true;
        }
    }
    let method = match found {
        Some(method) => method,
        None if truncated => return Ok(State::Again),
        None => return Err(ParseError::UnknownMethod),
    };

    if cursor.eof() {
        return Ok(State::Again);
    }
    if cursor.current() != b' ' {
        return Err(ParseError::MalformedRequestLine);
    }
    if !cursor.advance(1) {
        return Ok(State::Again);
    }

    // Resource, up to '?' or SP
    let resource_token = cursor.token();
    let mut byte;
    loop {
        if cursor.eof() {
            return Ok(State::Again);
        }
        byte = cursor.current();
        if byte == b'?' || byte == b' ' {
            break;
        }
        if !cursor.advance(1) {
            return Ok(State::Again);
        }
    }
    let resource = resource_token.text(&cursor).to_vec();

    // Query parameters, verbatim, until SP
    let mut query = Query::new();
    if byte == b'?' {
        if !cursor.advance(1) {
            return Ok(State::Again);
        }

        loop {
            if cursor.eof() {
                return Ok(State::Again);
            }
            if cursor.current() == b' ' {
                break;
            }

            let key_token = cursor.token();
            if !cursor.match_until(&[b'=']) {
                return Ok(State::Again);
            }
            let key = key_token.text(&cursor).to_vec();

            if !cursor.advance(1) {
                return Ok(State::Again);
            }

            let value_token = cursor.token();
            if !cursor.match_until(&[b' ', b'&']) {
                return Ok(State::Again);
            }
            let value = value_token.text(&cursor).to_vec();

            query.add(key, value);
            if cursor.current() == b'&' {
                if !cursor.advance(1) {
                    return Ok(State::Again);
                }
            }
        }
    }

    // SP
    if !cursor.advance(1) {
        return Ok(State::Again);
    }

    // HTTP version, up to CRLF, matched exactly
    let version_token = cursor.token();
    while !cursor.eol() {
        if !cursor.advance(1) {
            return Ok(State::Again);
        }
    }
    let version = Version::from_token(version_token.text(&cursor))
        .ok_or(ParseError::InvalidVersion)?;

    if !cursor.advance(2) {
        return Ok(State::Again);
    }

    request.method = method;
    request.resource = resource;
    request.query = query;
    request.version = version;

    cursor.ignore();
    Ok(State::Next)
}

/// Step 2: header lines until the empty line.
///
/// The empty-line CRLF itself is left for the body step, since spotting
/// it is what terminates the loop. Parsed headers are committed to the
/// request only when the whole block completed, so an `Again` leaves no
/// residue behind.
fn headers_step(cursor: &mut StreamCursor<'_>, request: &mut Request) -> Result<State, ParseError> {
    let mut cursor = Revert::new(cursor);
    let mut headers = Headers::new();

    while !cursor.eol() {
        let mut header_cursor = Revert::new(&mut cursor);

        // Name, up to ':'
        let name_token = header_cursor.token();
        if !header_cursor.match_until(&[b':']) {
            return Ok(State::Again);
        }
        let name = name_token.text(&header_cursor).to_vec();

        if !header_cursor.advance(1) {
            return Ok(State::Again);
        }

        // Leading spaces before the value are not part of it
        loop {
            if header_cursor.eof() {
                return Ok(State::Again);
            }
            if header_cursor.current() != b' ' {
                break;
            }
            if !header_cursor.advance(1) {
                return Ok(State::Again);
            }
        }

        // Value, up to CRLF
        let value_token = header_cursor.token();
        while !header_cursor.eol() {
            if !header_cursor.advance(1) {
                return Ok(State::Again);
            }
        }
        let raw_value = value_token.text(&header_cursor);

        if header::is_registered(&name) {
            headers.add(header::parse_registered(&name, raw_value)?);
        } else {
            headers.add_raw(Raw::new(name, raw_value.to_vec()));
        }

        if !header_cursor.advance(2) {
            return Ok(State::Again);
        }

        header_cursor.ignore();
    }

    request.headers = headers;

    cursor.ignore();
    Ok(State::Next)
}

/// Step 3: the payload, sized by `Content-Length`.
///
/// Unlike the earlier steps this one keeps what it reads: available
/// payload bytes are appended to the request body and accounted in
/// `bytes_read`, so resumption picks up mid-body instead of replaying.
fn body_step(
    cursor: &mut StreamCursor<'_>,
    request: &mut Request,
    bytes_read: &mut usize,
) -> Result<State, ParseError> {
    if request.headers.transfer_encoding().is_some() {
        return Err(ParseError::UnsupportedTransferEncoding);
    }

    let content_length = match request.headers.content_length() {
        // a payload that can never fit the buffer is rejected up front
        Some(length) if length > crate::MAX_BUFFER as u64 => {
            return Err(ParseError::PayloadTooLarge)
        }
        Some(length) => length as usize,
        None => return Ok(State::Done),
    };

    if *bytes_read > 0 {
        // Part of the payload was read on an earlier pass
        let remaining = content_length - *bytes_read;
        let start = cursor.token();

        if !cursor.advance(remaining) {
            let available = cursor.remaining();
            request.body.extend_from_slice(cursor.rest());
            *bytes_read += available;

            cursor.advance(available);
            return Ok(State::Again);
        }

        request.body.extend_from_slice(start.text(cursor));
    } else {
        // First pass: consume the CRLF that terminated the header block
        let mut cursor = Revert::new(cursor);
        if !cursor.advance(2) {
            return Ok(State::Again);
        }

        request.body.reserve(content_length);
        let start = cursor.token();

        if !cursor.advance(content_length) {
            let available = cursor.remaining();
            if available == 0 {
                // No payload byte arrived yet. Leave the CRLF unconsumed
                // so re-entry still sees a first pass; `bytes_read` is
                // what distinguishes the passes.
                return Ok(State::Again);
            }

            request.body.extend_from_slice(cursor.rest());
            *bytes_read += available;

            cursor.advance(available);
            cursor.ignore();
            return Ok(State::Again);
        }

        request.body.extend_from_slice(start.text(&cursor));
        cursor.ignore();
    }

    *bytes_read = 0;
    Ok(State::Done)
}

/// The resumable request parser: a buffer, a cursor position, a step
/// index and the request being built.
#[derive(Debug)]
pub struct Parser {
    buffer: Buffer,
    pos: usize,
    current_step: usize,
    bytes_read: usize,
    request: Request,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buffer: Buffer::new(),
            pos: 0,
            current_step: STEP_REQUEST_LINE,
            bytes_read: 0,
            request: Request::default(),
        }
    }

    /// Appends freshly arrived bytes. Returns `false` when the request
    /// would exceed the buffer capacity; the buffer is unchanged then.
    pub fn feed(&mut self, data: &[u8]) -> bool {
        self.buffer.feed(data)
    }

    /// Drives the step pipeline as far as the buffered bytes allow.
    pub fn parse(&mut self) -> Result<State, ParseError> {
        let Parser { buffer, pos, current_step, bytes_read, request } = self;
        let mut cursor = StreamCursor::new(buffer.as_slice(), *pos);

        let state = loop {
            let state = match *current_step {
                STEP_REQUEST_LINE => request_line_step(&mut cursor, request)?,
                STEP_HEADERS => headers_step(&mut cursor, request)?,
                STEP_BODY => body_step(&mut cursor, request, bytes_read)?,
                step => unreachable!("parser step out of range: {step}"),
            };

            match state {
                State::Next => *current_step += 1,
                state => break state,
            }
        };

        *pos = cursor.position();
        Ok(state)
    }

    /// The request built by the last completed parse.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Index of the step the parser is currently in.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Returns the parser to its initial state, dropping buffered bytes
    /// and everything accumulated in the request.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.pos = 0;
        self.current_step = STEP_REQUEST_LINE;
        self.bytes_read = 0;
        self.request.reset();
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StatusCode;

    fn parse_all(input: &[u8]) -> (Parser, Result<State, ParseError>) {
        let mut parser = Parser::new();
        assert!(parser.feed(input));
        let state = parser.parse();
        (parser, state)
    }

    #[test]
    fn test_simple_get() {
        let (parser, state) = parse_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(state, Ok(State::Done));

        let request = parser.request();
        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.resource(), b"/hello");
        assert_eq!(request.version(), Version::Http11);
        assert_eq!(request.headers().host(), Some("x"));
        assert!(request.query().is_empty());
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_post_with_query_and_body() {
        let (parser, state) =
            parse_all(b"POST /x?a=1&b=two HTTP/1.0\r\nContent-Length: 5\r\n\r\nhello");
        assert_eq!(state, Ok(State::Done));

        let request = parser.request();
        assert_eq!(request.method(), Method::Post);
        assert_eq!(request.resource(), b"/x");
        assert_eq!(request.version(), Version::Http10);
        assert_eq!(request.query().get("a"), Some(&b"1"[..]));
        assert_eq!(request.query().get("b"), Some(&b"two"[..]));
        assert_eq!(request.body(), b"hello");
    }

    #[test]
    fn test_single_byte_fragments() {
        let input: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";

        let mut parser = Parser::new();
        let mut done = 0;
        for fragment in input.chunks(1) {
            assert!(parser.feed(fragment));
            match parser.parse().unwrap() {
                State::Done => done += 1,
                State::Again => {}
                State::Next => unreachable!("driver never surfaces Next"),
            }
        }

        assert_eq!(done, 1);
        let request = parser.request();
        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.resource(), b"/");
        assert_eq!(request.headers().host(), Some("x"));
    }

    #[test]
    fn test_every_split_point_agrees() {
        let input: &[u8] = b"POST /r?k=v HTTP/1.1\r\nHost: h\r\nContent-Length: 3\r\n\r\nabc";

        let (reference, state) = parse_all(input);
        assert_eq!(state, Ok(State::Done));

        for split in 1..input.len() {
            let mut parser = Parser::new();
            assert!(parser.feed(&input[..split]));
            assert_eq!(parser.parse().unwrap(), State::Again, "split at {split}");
            assert!(parser.feed(&input[split..]));
            assert_eq!(parser.parse().unwrap(), State::Done, "split at {split}");

            let request = parser.request();
            assert_eq!(request.resource(), reference.request().resource());
            assert_eq!(request.query().get("k"), Some(&b"v"[..]));
            assert_eq!(request.headers().host(), Some("h"));
            assert_eq!(request.body(), reference.request().body());
        }
    }

    #[test]
    fn test_unknown_method() {
        let (_, state) = parse_all(b"BREW /pot HTTP/1.1\r\n\r\n");
        assert_eq!(state, Err(ParseError::UnknownMethod));
    }

    #[test]
    fn test_partial_method_waits_for_more() {
        let mut parser = Parser::new();
        assert!(parser.feed(b"GE"));
        assert_eq!(parser.parse(), Ok(State::Again));
        assert!(parser.feed(b"T / HTTP/1.1\r\n\r\n"));
        assert_eq!(parser.parse(), Ok(State::Done));
        assert_eq!(parser.request().method(), Method::Get);
    }

    #[test]
    fn test_missing_space_after_method() {
        let (_, state) = parse_all(b"GET/ HTTP/1.1\r\n\r\n");
        assert_eq!(state, Err(ParseError::MalformedRequestLine));
    }

    #[test]
    fn test_invalid_version() {
        let (_, state) = parse_all(b"GET / HTTP/2.0\r\n\r\n");
        assert_eq!(state, Err(ParseError::InvalidVersion));
        assert_eq!(
            ParseError::InvalidVersion.to_string(),
            "Encountered invalid HTTP version"
        );
    }

    #[test]
    fn test_repeated_query_keys() {
        let (parser, state) = parse_all(b"GET /s?a=1&a=2&b=3 HTTP/1.1\r\n\r\n");
        assert_eq!(state, Ok(State::Done));

        let query = parser.request().query();
        assert_eq!(query.get("a"), Some(&b"1"[..]));
        assert_eq!(query.get_all("a").unwrap(), &[b"1".to_vec(), b"2".to_vec()]);
        assert_eq!(query.get("b"), Some(&b"3"[..]));
    }

    #[test]
    fn test_header_names_survive_verbatim() {
        let (parser, state) = parse_all(b"GET / HTTP/1.1\r\nX-CuStOm: yes\r\n\r\n");
        assert_eq!(state, Ok(State::Done));

        let headers = parser.request().headers();
        assert_eq!(headers.get_raw("x-custom"), Some(&b"yes"[..]));
        assert_eq!(headers.raw_list().next().unwrap().name, b"X-CuStOm");
    }

    #[test]
    fn test_non_utf8_bytes_survive_verbatim() {
        let (parser, state) =
            parse_all(b"GET /p\xff?k\xfe=v\xfd HTTP/1.1\r\nX-Bin\xfc: v\xfb\r\n\r\n");
        assert_eq!(state, Ok(State::Done));

        let request = parser.request();
        assert_eq!(request.resource(), b"/p\xff");
        assert_eq!(request.query().get(b"k\xfe"), Some(&b"v\xfd"[..]));

        let raw = request.headers().raw_list().next().unwrap();
        assert_eq!(raw.name, b"X-Bin\xfc");
        assert_eq!(raw.value, b"v\xfb");
    }

    #[test]
    fn test_registered_header_lookup_is_case_insensitive() {
        let (parser, state) =
            parse_all(b"POST / HTTP/1.1\r\ncontent-length: 2\r\n\r\nok");
        assert_eq!(state, Ok(State::Done));
        assert_eq!(parser.request().headers().content_length(), Some(2));
        assert_eq!(parser.request().body(), b"ok");
    }

    #[test]
    fn test_body_arrives_in_pieces() {
        let mut parser = Parser::new();
        assert!(parser.feed(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n1234"));
        assert_eq!(parser.parse(), Ok(State::Again));
        assert!(parser.feed(b"5678"));
        assert_eq!(parser.parse(), Ok(State::Again));
        assert!(parser.feed(b"90"));
        assert_eq!(parser.parse(), Ok(State::Done));
        assert_eq!(parser.request().body(), b"1234567890");
    }

    #[test]
    fn test_content_length_exactness() {
        // bytes past the declared length are not part of the body
        let (parser, state) =
            parse_all(b"POST / HTTP/1.1\r\nContent-Length: 2\r\n\r\nhiEXTRA");
        assert_eq!(state, Ok(State::Done));
        assert_eq!(parser.request().body(), b"hi");
    }

    #[test]
    fn test_transfer_encoding_is_rejected() {
        let (_, state) = parse_all(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");
        let err = state.unwrap_err();
        assert_eq!(err, ParseError::UnsupportedTransferEncoding);
        assert_eq!(err.status(), StatusCode::NotImplemented);
    }

    #[test]
    fn test_unfittable_content_length_is_rejected() {
        let (_, state) = parse_all(b"POST / HTTP/1.1\r\nContent-Length: 999999\r\n\r\n");
        assert_eq!(state, Err(ParseError::PayloadTooLarge));
    }

    #[test]
    fn test_feed_rejects_oversized_request() {
        let mut parser = Parser::new();
        let huge = vec![b'a'; crate::MAX_BUFFER + 1];
        assert!(!parser.feed(&huge));
    }

    #[test]
    fn test_reset_leaves_no_residue() {
        let mut parser = Parser::new();
        assert!(parser.feed(b"POST /old?x=1 HTTP/1.0\r\nContent-Length: 3\r\n\r\nabc"));
        assert_eq!(parser.parse(), Ok(State::Done));

        parser.reset();
        assert_eq!(parser.current_step(), 0);

        assert!(parser.feed(b"GET /new HTTP/1.1\r\n\r\n"));
        assert_eq!(parser.parse(), Ok(State::Done));

        let request = parser.request();
        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.resource(), b"/new");
        assert_eq!(request.version(), Version::Http11);
        assert!(request.headers().is_empty());
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_step_index_is_monotonic() {
        let mut parser = Parser::new();
        let mut last = parser.current_step();
        for fragment in b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nwxyz".chunks(3) {
            assert!(parser.feed(fragment));
            let _ = parser.parse().unwrap();
            assert!(parser.current_step() >= last);
            last = parser.current_step();
        }
    }
}
