use crate::codec;
use crate::connection::Peer;
use crate::protocol::{Header, Headers, MediaType, SendError, StatusCode};
use futures::future::{self, Ready};
use std::sync::{Arc, Weak};

/// The future a send returns: resolved with the number of bytes put on
/// the wire, or rejected with the reason the response never made it.
pub type SendFuture = Ready<Result<usize, SendError>>;

/// An outgoing response, bound to the peer it will be written to.
///
/// The peer binding is weak: if the connection closes before the send,
/// the send is rejected with a broken pipe. Sending consumes the
/// response, so each instance goes on the wire at most once.
pub struct Response {
    headers: Headers,
    peer: Weak<Peer>,
}

impl Response {
    pub(crate) fn new(peer: &Arc<Peer>) -> Self {
        Self { headers: Headers::new(), peer: Arc::downgrade(peer) }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Adds a `Content-Type` header to the collection.
    pub fn set_mime(&mut self, mime: MediaType) {
        self.headers.add(Header::ContentType(mime));
    }

    /// Sends a bodyless response with the given status.
    pub fn send(self, code: StatusCode) -> SendFuture {
        self.send_body(code, "", None)
    }

    /// Serializes status line, headers and body, and hands the result
    /// to the peer's send primitive.
    ///
    /// A supplied media type updates an existing `Content-Type` header
    /// or, failing that, is written as one.
    pub fn send_body(
        mut self,
        code: StatusCode,
        body: impl AsRef<[u8]>,
        mime: impl Into<Option<MediaType>>,
    ) -> SendFuture {
        let peer = match self.peer.upgrade() {
            Some(peer) => peer,
            None => return future::ready(Err(SendError::BrokenPipe)),
        };

        let mut extra_content_type = None;
        if let Some(mime) = mime.into() {
            match self.headers.content_type_mut() {
                Some(existing) => *existing = mime,
                None => extra_content_type = Some(mime),
            }
        }

        let out = match codec::encode(code, &self.headers, extra_content_type.as_ref(), body.as_ref())
        {
            Ok(out) => out,
            Err(e) => return future::ready(Err(e)),
        };

        peer.send(&out)
    }
}
