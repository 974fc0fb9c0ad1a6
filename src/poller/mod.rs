//! Thin façade over Linux `epoll`.
//!
//! The poller owns one epoll instance plus an internal `eventfd` used
//! as a wake-up signal, so another thread can interrupt a blocking
//! [`Poller::poll`]. Registrations pair a file descriptor with an
//! interest set, an opaque [`Tag`] and a [`PollMode`]; every readiness
//! event comes back carrying the tag verbatim.
//!
//! In [`PollMode::Edge`] the kernel only reports transitions: the owner
//! of the descriptor must drain it until it would block before going
//! back to `poll`, or the event is lost.

use libc::{
    epoll_create1, epoll_ctl, epoll_event, epoll_wait, EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN,
    EPOLLONESHOT, EPOLLOUT, EPOLLRDHUP, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL,
    EPOLL_CTL_MOD,
};
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::os::unix::io::RawFd;
use std::sync::Arc;

/// A file descriptor registered with the poller.
pub type Fd = RawFd;

/// Opaque correlation value attached to a registration and returned on
/// every event for that descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(u64);

impl Tag {
    pub const fn new(value: u64) -> Self {
        Tag(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

/// Set of readiness conditions a registration subscribes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interest(u8);

impl Interest {
    pub const READ: Interest = Interest(0b001);
    pub const WRITE: Interest = Interest(0b010);
    pub const HANGUP: Interest = Interest(0b100);

    pub const fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

/// Level- or edge-triggered notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    Level,
    Edge,
}

/// A readiness event: the registration's tag plus the conditions that
/// fired.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub tag: Tag,
    pub flags: Interest,
}

/// Reserved tag for the internal wake eventfd. Never collides with
/// worker tags, which are slab-index based.
const WAKE_TAG: u64 = u64::MAX;

/// Handle for interrupting a blocking poll from another thread.
pub struct Waker(RawFd);

impl Waker {
    /// Wakes the poller by bumping the eventfd counter.
    pub fn wake(&self) {
        let increment: u64 = 1;
        unsafe {
            libc::write(self.0, &increment as *const _ as *const _, 8);
        }
    }
}

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}

/// The epoll façade.
pub struct Poller {
    epoll: RawFd,
    buf: Vec<epoll_event>,
    waker: Arc<Waker>,
}

impl Poller {
    /// Creates the epoll instance and its wake eventfd. `max_hint` only
    /// sizes the internal event buffer.
    pub fn new(max_hint: usize) -> io::Result<Poller> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let eventfd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if eventfd < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(epoll) };
            return Err(err);
        }

        let mut event = epoll_event { events: EPOLLIN as u32, u64: WAKE_TAG };
        let rc = unsafe { epoll_ctl(epoll, EPOLL_CTL_ADD, eventfd, &mut event) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(eventfd);
                libc::close(epoll);
            }
            return Err(err);
        }

        Ok(Poller { epoll, buf: Vec::with_capacity(max_hint.max(1)), waker: Arc::new(Waker(eventfd)) })
    }

    /// A handle other threads can use to interrupt [`poll`](Self::poll).
    pub fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Registers `fd`; events for it will carry `tag`.
    pub fn add_fd(&self, fd: Fd, interest: Interest, tag: Tag, mode: PollMode) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, to_epoll_events(interest, mode), tag)
    }

    /// Registers `fd` for a single event; after delivery the
    /// registration is disarmed until [`rearm_fd`](Self::rearm_fd).
    pub fn add_fd_oneshot(
        &self,
        fd: Fd,
        interest: Interest,
        tag: Tag,
        mode: PollMode,
    ) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, to_epoll_events(interest, mode) | EPOLLONESHOT as u32, tag)
    }

    /// Atomically replaces the registration for `fd`.
    pub fn rearm_fd(&self, fd: Fd, interest: Interest, tag: Tag, mode: PollMode) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, to_epoll_events(interest, mode), tag)
    }

    /// Deregisters `fd`. Events already in flight may still be
    /// delivered; callers match tags against their own tables.
    pub fn remove_fd(&self, fd: Fd) -> io::Result<()> {
        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn ctl(&self, op: i32, fd: Fd, events: u32, tag: Tag) -> io::Result<()> {
        let mut event = epoll_event { events, u64: tag.value() };
        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Waits up to `timeout_ms` for readiness and appends at most
    /// `max_events` events to `out`, returning how many were appended.
    ///
    /// A zero timeout probes without blocking; a negative timeout
    /// blocks until something fires. Wake-ups through the [`Waker`] are
    /// drained internally and count as an empty result.
    pub fn poll(
        &mut self,
        out: &mut Vec<Event>,
        max_events: usize,
        timeout_ms: i32,
    ) -> io::Result<usize> {
        let max_events = max_events.max(1);
        self.buf.resize(max_events, epoll_event { events: 0, u64: 0 });

        let ready = loop {
            let rc = unsafe {
                epoll_wait(self.epoll, self.buf.as_mut_ptr(), max_events as i32, timeout_ms)
            };
            if rc >= 0 {
                break rc as usize;
            }

            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        };

        let mut appended = 0;
        for ev in &self.buf[..ready] {
            if ev.u64 == WAKE_TAG {
                let mut counter = 0u64;
                unsafe {
                    libc::read(self.waker.0, &mut counter as *mut _ as *mut _, 8);
                }
                continue;
            }

            out.push(Event { tag: Tag::new(ev.u64), flags: to_interest(ev.events) });
            appended += 1;
        }

        Ok(appended)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.waker.0);
            libc::close(self.epoll);
        }
    }
}

unsafe impl Send for Poller {}

fn to_epoll_events(interest: Interest, mode: PollMode) -> u32 {
    let mut events = 0;

    if interest.contains(Interest::READ) {
        events |= EPOLLIN;
    }
    if interest.contains(Interest::WRITE) {
        events |= EPOLLOUT;
    }
    if interest.contains(Interest::HANGUP) {
        events |= EPOLLHUP | EPOLLRDHUP;
    }
    if let PollMode::Edge = mode {
        events |= EPOLLET;
    }

    events as u32
}

fn to_interest(events: u32) -> Interest {
    let mut flags = Interest::default();

    if events & EPOLLIN as u32 != 0 {
        flags |= Interest::READ;
    }
    if events & EPOLLOUT as u32 != 0 {
        flags |= Interest::WRITE;
    }
    // EPOLLERR means the socket is unusable; surface it as a hangup
    if events & (EPOLLHUP | EPOLLRDHUP | EPOLLERR) as u32 != 0 {
        flags |= Interest::HANGUP;
    }

    flags
}
