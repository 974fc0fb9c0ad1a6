//! A small HTTP/1.x server framework built around an edge-triggered
//! readiness loop and a resumable streaming request parser.
//!
//! The crate is organised in layers:
//!
//! - [`poller`]: thin façade over `epoll`, owning the readiness handle
//! - [`codec`]: the byte-level machinery: a bounded buffer, a
//!   backtrackable stream cursor and the three-step request parser
//! - [`protocol`]: wire value types (method, version, status, headers,
//!   query, request, response) and the error hierarchy
//! - [`connection`]: per-peer state binding a parser to a socket and
//!   dispatching parsed requests into user code
//! - [`handler`]: the [`handler::Handler`] trait implemented by user code
//! - [`server`]: the accept loop and the per-worker reactor

pub mod codec;
pub mod connection;
pub mod handler;
pub mod poller;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;

/// Maximum number of bytes a single request may occupy in the parser
/// buffer. `Buffer::feed` rejects input past this limit and the peer
/// receives a 413 response.
pub const MAX_BUFFER: usize = 4096;
