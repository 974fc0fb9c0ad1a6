//! Backtrackable lexing over a growing byte stream.
//!
//! [`Buffer`] is an append-only byte region with a hard capacity.
//! [`StreamCursor`] is a read position over a buffer snapshot, with
//! checkpointing ([`Revert`]) and span capture ([`Token`]). Together
//! they are the substrate the request parser resumes on: a parse step
//! that runs out of bytes rolls the cursor back and is re-run verbatim
//! once more input has been fed.

use crate::MAX_BUFFER;
use bytes::BytesMut;
use std::ops::{Deref, DerefMut};

/// Growable byte buffer with a fixed maximum capacity.
#[derive(Debug)]
pub struct Buffer {
    data: BytesMut,
    capacity: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: BytesMut::with_capacity(capacity), capacity }
    }

    /// Appends `data`. Returns `false`, leaving the buffer untouched,
    /// when the append would exceed the capacity.
    pub fn feed(&mut self, data: &[u8]) -> bool {
        if self.data.len() + data.len() > self.capacity {
            return false;
        }

        self.data.extend_from_slice(data);
        true
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Drops all buffered bytes.
    pub fn reset(&mut self) {
        self.data.clear();
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A read position within a byte slice.
#[derive(Debug)]
pub struct StreamCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StreamCursor<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        debug_assert!(pos <= data.len());
        Self { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn eof(&self) -> bool {
        self.pos == self.data.len()
    }

    /// True iff the next two bytes are CR LF.
    pub fn eol(&self) -> bool {
        self.remaining() >= 2 && self.data[self.pos] == b'\r' && self.data[self.pos + 1] == b'\n'
    }

    /// The byte under the cursor. Callers must check [`eof`](Self::eof)
    /// first.
    pub fn current(&self) -> u8 {
        debug_assert!(!self.eof());
        self.data[self.pos]
    }

    /// Moves forward by `n` bytes. Returns `false`, without moving,
    /// when fewer than `n` bytes remain.
    pub fn advance(&mut self, n: usize) -> bool {
        if self.remaining() < n {
            return false;
        }

        self.pos += n;
        true
    }

    /// Consumes `literal` if the stream continues with exactly those
    /// bytes. Too few or mismatching bytes leave the cursor in place.
    pub fn match_literal(&mut self, literal: &[u8]) -> bool {
        if self.remaining() < literal.len() {
            return false;
        }

        if &self.data[self.pos..self.pos + literal.len()] != literal {
            return false;
        }

        self.pos += literal.len();
        true
    }

    /// Advances until the current byte is one of `delimiters`, leaving
    /// the cursor on the delimiter. Returns `false` when the stream is
    /// exhausted before a delimiter shows up.
    pub fn match_until(&mut self, delimiters: &[u8]) -> bool {
        while !self.eof() {
            if delimiters.contains(&self.current()) {
                return true;
            }
            self.pos += 1;
        }
        false
    }

    /// The unread remainder of the stream.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Captures the current position for later span extraction.
    pub fn token(&self) -> Token {
        Token { start: self.pos }
    }
}

/// A captured start offset; the span runs from capture to the cursor's
/// current position.
#[derive(Debug, Clone, Copy)]
pub struct Token {
    start: usize,
}

impl Token {
    pub fn text<'a>(&self, cursor: &StreamCursor<'a>) -> &'a [u8] {
        &cursor.data[self.start..cursor.pos]
    }

    pub fn size(&self, cursor: &StreamCursor<'_>) -> usize {
        cursor.pos - self.start
    }
}

/// Checkpoint guard over a cursor.
///
/// Dereferences to the cursor it wraps. On drop the cursor is restored
/// to the position captured at construction, unless the guard was
/// released with [`ignore`](Revert::ignore).
#[derive(Debug)]
pub struct Revert<'c, 'a> {
    cursor: &'c mut StreamCursor<'a>,
    saved: usize,
    restore: bool,
}

impl<'c, 'a> Revert<'c, 'a> {
    pub fn new(cursor: &'c mut StreamCursor<'a>) -> Self {
        let saved = cursor.pos;
        Self { cursor, saved, restore: true }
    }

    /// Releases the checkpoint: the cursor keeps its current position.
    pub fn ignore(mut self) {
        self.restore = false;
    }
}

impl<'a> Deref for Revert<'_, 'a> {
    type Target = StreamCursor<'a>;

    fn deref(&self) -> &Self::Target {
        self.cursor
    }
}

impl DerefMut for Revert<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.cursor
    }
}

impl Drop for Revert<'_, '_> {
    fn drop(&mut self) {
        if self.restore {
            self.cursor.pos = self.saved;
        }
    }
}
