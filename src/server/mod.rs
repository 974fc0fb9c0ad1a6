//! The accept loop and server configuration.
//!
//! [`Server::run`] spawns the configured number of worker threads, each
//! running its own readiness loop, then blocks accepting connections.
//! Accepted sockets are made non-blocking and sharded round-robin to a
//! worker; from then on all I/O and handler work for that connection is
//! single-threaded on the owning worker.

mod worker;

use crate::handler::Handler;
use crate::server::worker::{Command, Worker};
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, IntoRawFd};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

/// Server tuning knobs, builder-style.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    threads: usize,
    backlog: i32,
    max_events: usize,
    poll_timeout_ms: i32,
}

impl ServerOptions {
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of worker threads, each with its own poller. Default 1.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Listen backlog applied to the bound socket. Default 128.
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Upper bound on events harvested per poll. Default 1024.
    pub fn max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    /// Worker wake-up interval in milliseconds; governs how promptly a
    /// worker notices it should stop idling, nothing else. Default 500.
    pub fn poll_timeout_ms(mut self, poll_timeout_ms: i32) -> Self {
        self.poll_timeout_ms = poll_timeout_ms;
        self
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { threads: 1, backlog: 128, max_events: 1024, poll_timeout_ms: 500 }
    }
}

/// The HTTP server: a bound listener plus its options.
pub struct Server {
    listener: TcpListener,
    options: ServerOptions,
}

impl Server {
    pub fn bind<A: ToSocketAddrs>(addr: A, options: ServerOptions) -> io::Result<Server> {
        let listener = TcpListener::bind(addr)?;

        // std listens with its own backlog; a second listen(2) on the
        // already-listening socket applies the configured one
        let rc = unsafe { libc::listen(listener.as_raw_fd(), options.backlog) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Server { listener, options })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop, blocking the calling thread.
    pub fn run<H: Handler>(self, handler: Arc<H>) -> io::Result<()> {
        let threads = self.options.threads.max(1);

        let mut shards = Vec::with_capacity(threads);
        for id in 0..threads {
            let (worker, sender, waker) = Worker::new(
                id,
                handler.clone(),
                self.options.max_events,
                self.options.poll_timeout_ms,
            )?;
            thread::Builder::new()
                .name(format!("ember-worker-{id}"))
                .spawn(move || worker.run())?;
            shards.push((sender, waker));
        }

        info!(address = %self.listener.local_addr()?, workers = threads, "server running");

        let mut next = 0;
        loop {
            let (stream, address) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            if let Err(e) = stream.set_nonblocking(true) {
                warn!(peer = %address, cause = %e, "failed to make socket non-blocking");
                continue;
            }

            let (sender, waker) = &shards[next];
            next = (next + 1) % shards.len();

            let fd = stream.into_raw_fd();
            if sender.send(Command::Register(fd, address)).is_err() {
                // the worker is gone (fatal poll failure); don't leak the fd
                error!(peer = %address, "worker channel closed, dropping connection");
                unsafe {
                    libc::close(fd);
                }
                continue;
            }
            waker.wake();
        }
    }
}
