//! Per-peer state and the glue between readable events and user code.
//!
//! A [`Peer`] wraps the connected socket: it owns the file descriptor,
//! offers the synchronous-but-promise-shaped send primitive responses
//! are written through, and carries a small typed bag for user state. A
//! [`Connection`] pairs a peer with its request parser and implements
//! the dispatch cycle: feed newly arrived bytes, drive the parser,
//! invoke the handler on a finished request, synthesize an error
//! response when parsing or the handler fails.

use crate::codec::{Parser, State};
use crate::handler::Handler;
use crate::protocol::{HandlerError, ParseError, Response, SendError, SendFuture, StatusCode};
use futures::future;
use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// A connected peer. Owns the socket for the connection's lifetime;
/// the descriptor is closed when the last reference goes away.
pub struct Peer {
    fd: RawFd,
    address: SocketAddr,
    data: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl Peer {
    pub(crate) fn new(fd: RawFd, address: SocketAddr) -> Arc<Peer> {
        Arc::new(Peer { fd, address, data: Mutex::new(HashMap::new()) })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    /// Stashes a value under `key`. Handlers use this to attach state
    /// that should live as long as the connection.
    pub fn put_data<T: Any + Send + Sync>(&self, key: &str, value: T) {
        let mut data = self.data.lock().unwrap();
        data.insert(key.to_string(), Arc::new(value));
    }

    /// Retrieves a value stashed under `key`, if the type matches.
    pub fn get_data<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let data = self.data.lock().unwrap();
        data.get(key).cloned().and_then(|value| value.downcast::<T>().ok())
    }

    /// Writes the whole slab to the socket and resolves the returned
    /// future with the byte count. The socket is non-blocking; a
    /// would-block mid-response is waited out on this descriptor alone.
    pub fn send(&self, data: &[u8]) -> SendFuture {
        future::ready(self.write_all(data))
    }

    fn write_all(&self, data: &[u8]) -> Result<usize, SendError> {
        let mut written = 0;
        while written < data.len() {
            let rest = &data[written..];
            let n = unsafe { libc::write(self.fd, rest.as_ptr() as *const _, rest.len()) };

            if n > 0 {
                written += n as usize;
                continue;
            }
            if n == 0 {
                return Err(SendError::Io { source: io::ErrorKind::WriteZero.into() });
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => self.wait_writable()?,
                io::ErrorKind::Interrupted => {}
                io::ErrorKind::BrokenPipe => return Err(SendError::BrokenPipe),
                _ => return Err(err.into()),
            }
        }

        Ok(written)
    }

    fn wait_writable(&self) -> Result<(), SendError> {
        let mut pollfd = libc::pollfd { fd: self.fd, events: libc::POLLOUT, revents: 0 };
        let rc = unsafe { libc::poll(&mut pollfd, 1, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err.into());
            }
        }
        Ok(())
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer").field("fd", &self.fd).field("address", &self.address).finish()
    }
}

/// Per-connection record: the peer plus the parser feeding on its
/// bytes.
pub struct Connection {
    peer: Arc<Peer>,
    parser: Parser,
}

impl Connection {
    pub(crate) fn new(peer: Arc<Peer>) -> Self {
        Self { peer, parser: Parser::new() }
    }

    pub(crate) fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    /// Runs one feed/parse cycle over freshly arrived bytes.
    ///
    /// A finished request is dispatched to the handler; a parse failure
    /// or handler error turns into a synthesized error response. In
    /// every terminal case the parser is reset, so the connection stays
    /// usable for the next request.
    pub(crate) fn handle_input<H: Handler>(&mut self, data: &[u8], handler: &H) {
        if !self.parser.feed(data) {
            self.parser.reset();
            let e = ParseError::PayloadTooLarge;
            self.send_error(e.status(), &e.to_string());
            return;
        }

        match self.parser.parse() {
            Ok(State::Done) => {
                let response = Response::new(&self.peer);
                if let Err(e) = handler.on_request(self.parser.request(), response) {
                    match e {
                        HandlerError::Http(err) => self.send_error(err.code, &err.reason),
                        HandlerError::Other(err) => {
                            self.send_error(StatusCode::InternalServerError, &err.to_string())
                        }
                    }
                }
                self.parser.reset();
            }

            // more input needed; the parser resumes on the next batch
            Ok(_) => {}

            Err(e) => {
                debug!(peer = %self.peer.address(), cause = %e, "rejecting request");
                self.send_error(e.status(), &e.to_string());
                self.parser.reset();
            }
        }
    }

    fn send_error(&self, code: StatusCode, reason: &str) {
        let response = Response::new(&self.peer);
        if let Err(e) = response.send_body(code, reason, None).into_inner() {
            error!(peer = %self.peer.address(), cause = %e, "failed to send error response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HttpError, MediaType, Request};

    fn socketpair() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        (fds[0], fds[1])
    }

    fn read_available(fd: RawFd) -> Vec<u8> {
        let mut buf = [0u8; 8192];
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        assert!(n > 0);
        buf[..n as usize].to_vec()
    }

    fn close(fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }

    struct EchoHandler;

    impl Handler for EchoHandler {
        fn on_request(&self, request: &Request, response: Response) -> Result<(), HandlerError> {
            let resource = String::from_utf8_lossy(request.resource());
            let body = format!("{} {}", request.method(), resource);
            response
                .send_body(StatusCode::Ok, body, MediaType::TextPlain)
                .into_inner()
                .map_err(HandlerError::other)?;
            Ok(())
        }
    }

    #[test]
    fn test_request_is_dispatched() {
        let (server_fd, client_fd) = socketpair();
        let mut conn = Connection::new(Peer::new(server_fd, "127.0.0.1:0".parse().unwrap()));

        conn.handle_input(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n", &EchoHandler);

        let reply = read_available(client_fd);
        let text = String::from_utf8(reply).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.ends_with("\r\n\r\nGET /hello"));

        close(client_fd);
    }

    #[test]
    fn test_fragmented_input_dispatches_once() {
        let (server_fd, client_fd) = socketpair();
        let mut conn = Connection::new(Peer::new(server_fd, "127.0.0.1:0".parse().unwrap()));

        for fragment in b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".chunks(1) {
            conn.handle_input(fragment, &EchoHandler);
        }

        let text = String::from_utf8(read_available(client_fd)).unwrap();
        assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 1);

        close(client_fd);
    }

    #[test]
    fn test_invalid_version_yields_400() {
        let (server_fd, client_fd) = socketpair();
        let mut conn = Connection::new(Peer::new(server_fd, "127.0.0.1:0".parse().unwrap()));

        conn.handle_input(b"GET / HTTP/2.0\r\n\r\n", &EchoHandler);

        let text = String::from_utf8(read_available(client_fd)).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.ends_with("Encountered invalid HTTP version"));

        close(client_fd);
    }

    #[test]
    fn test_oversized_request_yields_413() {
        let (server_fd, client_fd) = socketpair();
        let mut conn = Connection::new(Peer::new(server_fd, "127.0.0.1:0".parse().unwrap()));

        let oversized = vec![b'a'; crate::MAX_BUFFER + 1];
        conn.handle_input(&oversized, &EchoHandler);

        let text = String::from_utf8(read_available(client_fd)).unwrap();
        assert!(text.starts_with("HTTP/1.1 413 Request Entity Too Large\r\n"));

        close(client_fd);
    }

    #[test]
    fn test_typed_handler_error_keeps_its_code() {
        struct Rejecting;
        impl Handler for Rejecting {
            fn on_request(&self, _: &Request, _: Response) -> Result<(), HandlerError> {
                Err(HttpError::new(StatusCode::NotFound, "no such thing").into())
            }
        }

        let (server_fd, client_fd) = socketpair();
        let mut conn = Connection::new(Peer::new(server_fd, "127.0.0.1:0".parse().unwrap()));

        conn.handle_input(b"GET /missing HTTP/1.1\r\n\r\n", &Rejecting);

        let text = String::from_utf8(read_available(client_fd)).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.ends_with("no such thing"));

        close(client_fd);
    }

    #[test]
    fn test_untyped_handler_error_becomes_500() {
        struct Failing;
        impl Handler for Failing {
            fn on_request(&self, _: &Request, _: Response) -> Result<(), HandlerError> {
                Err(HandlerError::other("database went away"))
            }
        }

        let (server_fd, client_fd) = socketpair();
        let mut conn = Connection::new(Peer::new(server_fd, "127.0.0.1:0".parse().unwrap()));

        conn.handle_input(b"GET / HTTP/1.1\r\n\r\n", &Failing);

        let text = String::from_utf8(read_available(client_fd)).unwrap();
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(text.ends_with("database went away"));

        close(client_fd);
    }

    #[test]
    fn test_connection_survives_bad_request() {
        let (server_fd, client_fd) = socketpair();
        let mut conn = Connection::new(Peer::new(server_fd, "127.0.0.1:0".parse().unwrap()));

        conn.handle_input(b"GET / HTTP/2.0\r\n\r\n", &EchoHandler);
        let _ = read_available(client_fd);

        conn.handle_input(b"GET /ok HTTP/1.1\r\n\r\n", &EchoHandler);
        let text = String::from_utf8(read_available(client_fd)).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));

        close(client_fd);
    }

    #[test]
    fn test_send_after_peer_gone_is_broken_pipe() {
        let (server_fd, client_fd) = socketpair();
        let peer = Peer::new(server_fd, "127.0.0.1:0".parse().unwrap());
        let response = Response::new(&peer);
        drop(peer);

        let result = response.send(StatusCode::Ok).into_inner();
        assert!(matches!(result, Err(SendError::BrokenPipe)));

        close(client_fd);
    }

    #[test]
    fn test_peer_data_bag() {
        let (server_fd, client_fd) = socketpair();
        let peer = Peer::new(server_fd, "127.0.0.1:0".parse().unwrap());

        peer.put_data("counter", 41u32);
        assert_eq!(peer.get_data::<u32>("counter").as_deref(), Some(&41));
        assert!(peer.get_data::<String>("counter").is_none());
        assert!(peer.get_data::<u32>("missing").is_none());

        close(client_fd);
    }
}
