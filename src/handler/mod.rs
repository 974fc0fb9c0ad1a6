use crate::connection::Peer;
use crate::protocol::{HandlerError, Request, Response};
use std::sync::Arc;

/// The interface the framework exposes to user code.
///
/// `on_request` runs on the worker that owns the connection, once per
/// fully parsed request; it must not block. The lifecycle hooks default
/// to no-ops.
pub trait Handler: Send + Sync + 'static {
    fn on_request(&self, request: &Request, response: Response) -> Result<(), HandlerError>;

    /// Called once per accepted connection, before any input arrives.
    fn on_connection(&self, _peer: &Arc<Peer>) {}

    /// Called once when the connection goes away.
    fn on_disconnection(&self, _peer: &Arc<Peer>) {}
}

/// Adapter turning a closure into a [`Handler`].
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&Request, Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn on_request(&self, request: &Request, response: Response) -> Result<(), HandlerError> {
        (self.f)(request, response)
    }
}

pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&Request, Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    HandlerFn { f }
}
