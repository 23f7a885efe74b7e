//! Pending-request registry.
//!
//! Requests written to the socket wait here for their replies. The server
//! is required to reply in submission order, so the registry is a FIFO
//! queue: a reply must match the xid at the front, and anything else is a
//! protocol violation that forces a reconnect.
//!
//! Xids are assigned here, at write time, from a counter that lives for the
//! whole session. They are strictly positive and strictly increasing; the
//! counter survives reconnects so a resumed session never reuses an xid.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use rookery_common::{OpCode, Result, RookeryError};

use crate::watch::WatchRegistration;

/// One operation travelling through the client.
///
/// Carries the pre-encoded body, the completion handle the caller awaits,
/// and the watch to install if the server accepts the operation.
pub struct RequestSubmission {
    pub op: OpCode,
    /// Client-namespace path, for error reporting.
    pub client_path: Option<String>,
    pub body: Vec<u8>,
    pub watch: Option<WatchRegistration>,
    pub tx: oneshot::Sender<Result<Vec<u8>>>,
}

impl RequestSubmission {
    /// Completes the caller. A dropped receiver means the caller cancelled;
    /// the reply is discarded without ceremony.
    pub fn complete(self, result: Result<Vec<u8>>) {
        let _ = self.tx.send(result);
    }
}

impl std::fmt::Debug for RequestSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSubmission")
            .field("op", &self.op)
            .field("client_path", &self.client_path)
            .field("body_len", &self.body.len())
            .field("watch", &self.watch)
            .finish()
    }
}

/// A request that has been written and not yet answered.
#[derive(Debug)]
pub struct InFlight {
    pub xid: i32,
    pub submission: RequestSubmission,
}

/// FIFO registry of written-but-unanswered requests.
#[derive(Debug)]
pub struct PendingQueue {
    queue: VecDeque<InFlight>,
    next_xid: i32,
}

impl PendingQueue {
    pub fn new() -> PendingQueue {
        PendingQueue {
            queue: VecDeque::new(),
            next_xid: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The xid the next [`push`](Self::push) will assign. Lets the writer
    /// build the envelope without cloning the body out of the entry.
    pub fn next_xid(&self) -> i32 {
        self.next_xid
    }

    /// Assigns the next xid and appends the entry. Returns the xid the
    /// envelope must carry.
    pub fn push(&mut self, submission: RequestSubmission) -> i32 {
        let xid = self.next_xid;
        self.next_xid += 1;
        self.queue.push_back(InFlight { xid, submission });
        xid
    }

    /// Matches a reply against the front of the queue.
    ///
    /// # Errors
    ///
    /// Any xid other than the front entry's is a protocol violation: either
    /// the server replied out of order or the stream is corrupt. The caller
    /// must tear the connection down.
    pub fn match_reply(&mut self, xid: i32) -> Result<InFlight> {
        match self.queue.front() {
            Some(front) if front.xid == xid => Ok(self.queue.pop_front().unwrap()),
            Some(front) => Err(RookeryError::Protocol(format!(
                "reply xid {xid} does not match expected xid {}",
                front.xid
            ))),
            None => Err(RookeryError::Protocol(format!(
                "reply xid {xid} with no request in flight"
            ))),
        }
    }

    /// Completes every entry with an error built per entry.
    pub fn drain(&mut self, make_err: impl Fn() -> RookeryError) {
        for entry in self.queue.drain(..) {
            entry.submission.complete(Err(make_err()));
        }
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        PendingQueue::new()
    }
}
