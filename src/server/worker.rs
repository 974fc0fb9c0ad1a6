//! The per-worker reactor loop.
//!
//! Each worker exclusively owns a [`Poller`] and a connection table;
//! after a socket is sharded to a worker, every readable edge, every
//! handler invocation and the teardown all happen on that worker's
//! thread. Connections are addressed by a tag packing the table slot
//! with a generation counter, so an event that was already in flight
//! when its connection died is recognised as stale and dropped.

use crate::connection::{Connection, Peer};
use crate::handler::Handler;
use crate::poller::{Event, Fd, Interest, PollMode, Poller, Tag, Waker};
use std::io;
use std::net::SocketAddr;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// What the accept loop hands to a worker.
pub(crate) enum Command {
    Register(Fd, SocketAddr),
}

struct Slot {
    conn: Option<Connection>,
    generation: u32,
}

fn make_tag(index: usize, generation: u32) -> Tag {
    Tag::new(((generation as u64) << 32) | index as u64)
}

fn split_tag(tag: Tag) -> (usize, u32) {
    ((tag.value() & 0xffff_ffff) as usize, (tag.value() >> 32) as u32)
}

pub(crate) struct Worker<H> {
    id: usize,
    poller: Poller,
    handler: Arc<H>,
    receiver: Receiver<Command>,
    slots: Vec<Slot>,
    free: Vec<usize>,
    max_events: usize,
    poll_timeout_ms: i32,
}

impl<H: Handler> Worker<H> {
    pub(crate) fn new(
        id: usize,
        handler: Arc<H>,
        max_events: usize,
        poll_timeout_ms: i32,
    ) -> io::Result<(Worker<H>, Sender<Command>, Arc<Waker>)> {
        let poller = Poller::new(max_events)?;
        let waker = poller.waker();
        let (sender, receiver) = channel();

        let worker = Worker {
            id,
            poller,
            handler,
            receiver,
            slots: Vec::new(),
            free: Vec::new(),
            max_events,
            poll_timeout_ms,
        };

        Ok((worker, sender, waker))
    }

    /// The readiness loop. Poll failure is fatal to this worker; every
    /// other error is contained to the connection it happened on.
    pub(crate) fn run(mut self) {
        let mut events = Vec::with_capacity(self.max_events);

        loop {
            self.drain_commands();

            events.clear();
            match self.poller.poll(&mut events, self.max_events, self.poll_timeout_ms) {
                Ok(0) => continue,
                Ok(count) => {
                    trace!(worker = self.id, count, "dispatching readiness events");
                    for event in &events {
                        self.handle_event(*event);
                    }
                }
                Err(e) => {
                    error!(worker = self.id, cause = %e, "poll failed, stopping worker");
                    return;
                }
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.receiver.try_recv() {
            match command {
                Command::Register(fd, address) => self.register_peer(fd, address),
            }
        }
    }

    fn register_peer(&mut self, fd: Fd, address: SocketAddr) {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot { conn: None, generation: 0 });
                self.slots.len() - 1
            }
        };

        let peer = Peer::new(fd, address);
        self.handler.on_connection(&peer);

        let conn = Connection::new(peer);
        let tag = make_tag(index, self.slots[index].generation);
        let interest = Interest::READ | Interest::HANGUP;

        if let Err(e) = self.poller.add_fd(fd, interest, tag, PollMode::Edge) {
            error!(worker = self.id, peer = %address, cause = %e, "failed to register peer");
            self.handler.on_disconnection(conn.peer());
            self.free.push(index);
            return;
        }

        self.slots[index].conn = Some(conn);
        debug!(worker = self.id, peer = %address, "connection registered");
    }

    fn handle_event(&mut self, event: Event) {
        let (index, generation) = split_tag(event.tag);

        // events for connections that are already gone are dropped here
        let slot = match self.slots.get_mut(index) {
            Some(slot) if slot.generation == generation => slot,
            _ => return,
        };
        let conn = match slot.conn.as_mut() {
            Some(conn) => conn,
            None => return,
        };

        let mut closed = false;
        if event.flags.contains(Interest::READ) {
            closed = Self::drain_readable(conn, &self.handler);
        }

        if closed || event.flags.contains(Interest::HANGUP) {
            self.teardown(index);
        }
    }

    /// Edge-triggered read: the socket must be drained to would-block
    /// before the worker returns to the poller. Returns `true` once the
    /// peer is gone.
    fn drain_readable(conn: &mut Connection, handler: &Arc<H>) -> bool {
        let fd = conn.peer().fd();
        let mut buf = [0u8; crate::MAX_BUFFER];

        loop {
            let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };

            if n > 0 {
                conn.handle_input(&buf[..n as usize], handler.as_ref());
                continue;
            }
            if n == 0 {
                return true;
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => return false,
                io::ErrorKind::Interrupted => continue,
                _ => {
                    warn!(cause = %err, "read failed, closing connection");
                    return true;
                }
            }
        }
    }

    fn teardown(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        let conn = match slot.conn.take() {
            Some(conn) => conn,
            None => return,
        };
        slot.generation = slot.generation.wrapping_add(1);

        let _ = self.poller.remove_fd(conn.peer().fd());
        self.handler.on_disconnection(conn.peer());
        debug!(worker = self.id, peer = %conn.peer().address(), "connection closed");

        self.free.push(index);
    }
}
