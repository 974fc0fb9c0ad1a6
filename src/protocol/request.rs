use crate::protocol::{Headers, Method, Query, Version};
use bytes::BytesMut;

/// A fully parsed HTTP request, immutable from the handler's point of
/// view. Built up incrementally by the request parser.
#[derive(Debug, Default)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) resource: Vec<u8>,
    pub(crate) query: Query,
    pub(crate) version: Version,
    pub(crate) headers: Headers,
    pub(crate) body: BytesMut,
}

impl Request {
    pub fn method(&self) -> Method {
        self.method
    }

    /// The path component of the request URI, verbatim bytes.
    pub fn resource(&self) -> &[u8] {
        &self.resource
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Drops everything a finished request accumulated. Method, version
    /// and query are left behind to be overwritten by the next parse.
    pub(crate) fn reset(&mut self) {
        self.headers.clear();
        self.body.clear();
        self.resource.clear();
    }
}
