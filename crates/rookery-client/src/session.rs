//! Session engine.
//!
//! Single owner of the TCP socket and of the session state variable. The
//! engine runs as one task whose lifecycle is a reconnect loop: pick the
//! next endpoint, run the handshake, then multiplex caller submissions,
//! socket frames, and heartbeat timers over the live connection until it
//! dies or the client closes.
//!
//! # Request lifecycle across reconnects
//!
//! Requests reach the engine through a bounded channel. An entry is only
//! assigned an xid, and only enters the pending registry, at the moment it
//! is written to the socket. When a connection dies:
//!
//! - entries already written but not yet answered are completed with
//!   `ConnectionLoss` (or `OperationTimeout` when the read deadline tripped)
//!   because the server may or may not have applied them, and it will not
//!   replay the answers on the resumed session;
//! - entries still sitting in the channel were never written, so they are
//!   carried over and written transparently once the next connection is up.
//!
//! # Heartbeats
//!
//! A ping is written once the outbound side has been idle for a third of
//! the negotiated timeout. The connection is declared dead when nothing at
//! all has arrived for two thirds of it.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, sleep_until, timeout, Instant};

use rookery_common::protocol::records::{
    AuthPacket, ConnectRequest, ReplyHeader, RequestHeader, WatcherEvent,
};
use rookery_common::protocol::wire::{WireReader, WireWriter};
use rookery_common::protocol::xid;
use rookery_common::{ErrorCode, FrameConnection, OpCode, Result, RookeryError};

use crate::config::ClientConfig;
use crate::dispatcher::{DispatchEvent, EventDispatcher};
use crate::hosts::HostList;
use crate::pending::{PendingQueue, RequestSubmission};
use crate::sasl::SaslClient;
use crate::watch::{KeeperState, WatchRegistry};

/// Connection lifecycle state, readable from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    NotConnected = 0,
    Connecting = 1,
    Associating = 2,
    Connected = 3,
    Closed = 4,
    AuthFailed = 5,
}

impl SessionState {
    /// Terminal states accept no further traffic.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::AuthFailed)
    }
}

/// Atomic cell holding the current [`SessionState`].
///
/// Written only by the session engine; read by every caller.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(initial: SessionState) -> StateCell {
        StateCell(AtomicU8::new(initial as u8))
    }

    pub fn load(&self) -> SessionState {
        match self.0.load(Ordering::SeqCst) {
            0 => SessionState::NotConnected,
            1 => SessionState::Connecting,
            2 => SessionState::Associating,
            3 => SessionState::Connected,
            4 => SessionState::Closed,
            _ => SessionState::AuthFailed,
        }
    }

    pub fn store(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// The server-assigned session identity, shared with the façade for
/// introspection. Mutated only by the engine.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub id: i64,
    pub password: Vec<u8>,
    pub negotiated_timeout: Duration,
    pub last_zxid: i64,
}

impl Session {
    pub fn new(id: i64, password: Vec<u8>) -> Session {
        Session {
            id,
            password,
            negotiated_timeout: Duration::ZERO,
            last_zxid: 0,
        }
    }
}

/// What the façade pushes into the engine's channel.
pub(crate) enum Submission {
    Request(RequestSubmission),
    AddAuth(AuthPacket),
    Close,
}

/// Why the connected loop ended.
enum ConnOutcome {
    /// User close, or every client handle was dropped.
    Closed,
    /// The server declared the session dead.
    Expired,
    /// The server rejected our credentials.
    AuthFailed,
    /// Transport or protocol failure; the session may still be resumable.
    Lost(RookeryError),
}

enum FrameDisposition {
    Continue,
    Expired,
    AuthFailed,
}

pub(crate) struct SessionEngine {
    pub config: ClientConfig,
    pub hosts: HostList,
    pub state: Arc<StateCell>,
    pub session: Arc<Mutex<Session>>,
    pub submit_rx: mpsc::Receiver<Submission>,
    pub pending: PendingQueue,
    pub auth_backlog: Vec<AuthPacket>,
    pub events: EventDispatcher,
    pub registry: Arc<Mutex<WatchRegistry>>,
    pub sasl: Option<Arc<dyn SaslClient>>,
    pub close_requested: Arc<AtomicBool>,
}

impl SessionEngine {
    /// Runs the reconnect loop until the session reaches a terminal state.
    pub async fn run(mut self) {
        loop {
            // A dropped channel means every client handle is gone; the
            // finalizer path and explicit close converge here.
            if self.close_requested.load(Ordering::SeqCst) || self.submit_rx.is_closed() {
                self.shutdown_closed().await;
                return;
            }
            if let Some(delay) = self.hosts.backoff() {
                tracing::debug!(delay_ms = delay.as_millis() as u64, "backing off before next host");
                sleep(delay).await;
            }

            let addr = self.hosts.next_server();
            self.state.store(SessionState::Connecting);
            let connect_timeout = self.connect_timeout();

            let stream = match timeout(connect_timeout, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::debug!(addr = %addr, error = %e, "connect failed");
                    continue;
                }
                Err(_) => {
                    tracing::debug!(addr = %addr, "connect timed out");
                    continue;
                }
            };
            let _ = stream.set_nodelay(true);
            let mut conn = FrameConnection::with_max_frame(stream, self.config.max_frame_bytes);

            self.state.store(SessionState::Associating);
            let (had_session, request) = self.build_connect_request();
            let response = match timeout(connect_timeout, conn.connect_handshake(&request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    if had_session && is_disconnection(&e) {
                        // The server hung up on a session we believed was
                        // live: it has already forgotten us.
                        self.expire().await;
                        return;
                    }
                    tracing::debug!(addr = %addr, error = %e, "handshake failed");
                    continue;
                }
                Err(_) => {
                    tracing::debug!(addr = %addr, "handshake timed out");
                    continue;
                }
            };

            if response.session_id == 0 {
                self.expire().await;
                return;
            }

            {
                let mut session = self
                    .session
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                session.id = response.session_id;
                session.password = response.password.clone();
                session.negotiated_timeout =
                    Duration::from_millis(response.timeout_ms.max(0) as u64);
            }
            self.state.store(SessionState::Connected);
            self.hosts.record_success();
            tracing::info!(
                addr = %addr,
                session_id = response.session_id,
                negotiated_timeout_ms = response.timeout_ms,
                "session established"
            );
            self.emit_state(KeeperState::SyncConnected).await;

            if let Some(sasl) = self.sasl.clone() {
                if let Err(e) = sasl.authenticate(&mut conn, response.session_id).await {
                    tracing::warn!(error = %e, "SASL handshake failed");
                    self.auth_failed().await;
                    return;
                }
            }

            let (read_half, write_half) = conn.into_inner().into_split();
            let reader = FrameConnection::with_max_frame(read_half, self.config.max_frame_bytes);
            let mut writer =
                FrameConnection::with_max_frame(write_half, self.config.max_frame_bytes);

            match self.connected_loop(reader, &mut writer).await {
                ConnOutcome::Closed => {
                    // Best effort; the server also reaps the session on timeout.
                    let _ =
                        write_envelope(&mut writer, xid::CLOSE_SESSION, OpCode::CloseSession, &[])
                            .await;
                    self.shutdown_closed().await;
                    return;
                }
                ConnOutcome::Expired => {
                    self.expire().await;
                    return;
                }
                ConnOutcome::AuthFailed => {
                    self.auth_failed().await;
                    return;
                }
                ConnOutcome::Lost(err) => {
                    tracing::warn!(
                        addr = %addr,
                        error = %err,
                        in_flight = self.pending.len(),
                        "connection lost"
                    );
                    self.state.store(SessionState::NotConnected);
                    self.emit_state(KeeperState::Disconnected).await;
                    match err {
                        RookeryError::OperationTimeout => {
                            self.pending.drain(|| RookeryError::OperationTimeout)
                        }
                        _ => self.pending.drain(|| RookeryError::ConnectionLoss),
                    }
                }
            }
        }
    }

    /// Multiplexes socket frames, caller submissions, and heartbeat timers
    /// over one live connection.
    async fn connected_loop(
        &mut self,
        mut reader: FrameConnection<OwnedReadHalf>,
        writer: &mut FrameConnection<OwnedWriteHalf>,
    ) -> ConnOutcome {
        let negotiated = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .negotiated_timeout;
        let ping_after = (negotiated / 3).max(Duration::from_millis(1));
        let dead_after = (negotiated * 2 / 3).max(Duration::from_millis(2));

        // Credentials go out ahead of any user traffic on every connection.
        for packet in &self.auth_backlog {
            if let Err(e) = write_envelope(writer, xid::AUTH, OpCode::Auth, &packet.to_bytes()).await
            {
                return ConnOutcome::Lost(e);
            }
        }

        let mut last_write = Instant::now();
        let mut last_read = Instant::now();

        let SessionEngine {
            submit_rx,
            pending,
            auth_backlog,
            events,
            registry,
            session,
            ..
        } = self;

        loop {
            let ping_deadline = last_write + ping_after;
            let read_deadline = last_read + dead_after;

            tokio::select! {
                frame = reader.read_frame() => {
                    let frame = match frame {
                        Ok(frame) => frame,
                        Err(e) => return ConnOutcome::Lost(e),
                    };
                    last_read = Instant::now();
                    match handle_frame(&frame, pending, events, registry, session).await {
                        Ok(FrameDisposition::Continue) => {}
                        Ok(FrameDisposition::Expired) => return ConnOutcome::Expired,
                        Ok(FrameDisposition::AuthFailed) => return ConnOutcome::AuthFailed,
                        Err(e) => return ConnOutcome::Lost(e),
                    }
                }
                submission = submit_rx.recv() => {
                    match submission {
                        None | Some(Submission::Close) => return ConnOutcome::Closed,
                        Some(Submission::AddAuth(packet)) => {
                            if let Err(e) = write_envelope(
                                writer, xid::AUTH, OpCode::Auth, &packet.to_bytes(),
                            ).await {
                                auth_backlog.push(packet);
                                return ConnOutcome::Lost(e);
                            }
                            auth_backlog.push(packet);
                            last_write = Instant::now();
                        }
                        Some(Submission::Request(submission)) => {
                            // The entry joins the registry even when the
                            // write fails: bytes may have reached the wire,
                            // so the request is ambiguous, not unsent.
                            let next = pending.next_xid();
                            let written = write_envelope(
                                writer, next, submission.op, &submission.body,
                            ).await;
                            pending.push(submission);
                            if let Err(e) = written {
                                return ConnOutcome::Lost(e);
                            }
                            last_write = Instant::now();
                        }
                    }
                }
                _ = sleep_until(read_deadline) => {
                    return ConnOutcome::Lost(RookeryError::OperationTimeout);
                }
                _ = sleep_until(ping_deadline) => {
                    if let Err(e) = write_envelope(writer, xid::PING, OpCode::Ping, &[]).await {
                        return ConnOutcome::Lost(e);
                    }
                    last_write = Instant::now();
                }
            }
        }
    }

    fn build_connect_request(&self) -> (bool, ConnectRequest) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let had_session = session.id != 0;
        let requested = if had_session {
            session.negotiated_timeout
        } else {
            self.config.session_timeout
        };
        let timeout_ms = requested.as_millis().min(i32::MAX as u128) as i32;
        (
            had_session,
            ConnectRequest::new(session.last_zxid, timeout_ms, session.id, session.password.clone()),
        )
    }

    /// Per-host connect budget: a fraction of the session timeout, but never
    /// so small that a healthy host cannot answer.
    fn connect_timeout(&self) -> Duration {
        let hosts = self.hosts.len().max(1) as u32;
        (self.config.session_timeout / hosts).max(Duration::from_secs(1))
    }

    async fn expire(&mut self) {
        let session_id = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .id;
        tracing::warn!(session_id, "session expired");
        self.state.store(SessionState::Closed);
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.emit_state(KeeperState::Expired).await;
        self.pending.drain(|| RookeryError::SessionExpired);
        self.reject_queued(|| RookeryError::SessionExpired);
    }

    async fn auth_failed(&mut self) {
        self.state.store(SessionState::AuthFailed);
        self.emit_state(KeeperState::AuthFailed).await;
        self.pending.drain(|| RookeryError::AuthFailed);
        self.reject_queued(|| RookeryError::AuthFailed);
    }

    /// Emits a state event and waits until the default watcher has seen it,
    /// so state transitions are observable before any completion that
    /// depends on them. Watchers are synchronous by contract and must not
    /// block on client operations.
    async fn emit_state(&self, state: KeeperState) {
        let (ack, acked) = oneshot::channel();
        self.events.send(DispatchEvent::State { state, ack }).await;
        let _ = acked.await;
    }

    async fn shutdown_closed(&mut self) {
        tracing::debug!("session closed");
        self.pending.drain(|| RookeryError::ConnectionLoss);
        self.state.store(SessionState::Closed);
        self.reject_queued(|| RookeryError::ConnectionLoss);
    }

    /// Fails every submission still queued in the channel. Called once the
    /// engine has decided to stop; without this, queued callers would wait
    /// for a reply that can never come.
    fn reject_queued(&mut self, make_err: impl Fn() -> RookeryError) {
        while let Ok(submission) = self.submit_rx.try_recv() {
            if let Submission::Request(request) = submission {
                request.complete(Err(make_err()));
            }
        }
    }
}

/// Routes one inbound frame by its xid.
async fn handle_frame(
    frame: &[u8],
    pending: &mut PendingQueue,
    events: &EventDispatcher,
    registry: &Arc<Mutex<WatchRegistry>>,
    session: &Arc<Mutex<Session>>,
) -> Result<FrameDisposition> {
    let mut r = WireReader::new(frame);
    let header = ReplyHeader::decode(&mut r)?;

    match header.xid {
        xid::NOTIFICATION => {
            let event = WatcherEvent::decode(&mut r)?;
            tracing::debug!(
                event_type = event.event_type,
                path = %event.path,
                "watch notification"
            );
            events.send(DispatchEvent::Node(event)).await;
            Ok(FrameDisposition::Continue)
        }
        xid::PING => {
            tracing::trace!("ping reply");
            Ok(FrameDisposition::Continue)
        }
        xid::AUTH => {
            if header.err != 0 {
                tracing::warn!(err = header.err, "server rejected auth credentials");
                return Ok(FrameDisposition::AuthFailed);
            }
            Ok(FrameDisposition::Continue)
        }
        user_xid => {
            let entry = pending.match_reply(user_xid)?;

            if header.zxid > 0 {
                let mut session = session
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if header.zxid > session.last_zxid {
                    session.last_zxid = header.zxid;
                }
            }

            let code = ErrorCode::from_i32(header.err);
            if code == ErrorCode::SessionExpired {
                entry.submission.complete(Err(RookeryError::SessionExpired));
                return Ok(FrameDisposition::Expired);
            }

            if let Some(watch) = &entry.submission.watch {
                if watch.installs_on(code) {
                    registry
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .install(watch.clone());
                }
            }

            if code == ErrorCode::Ok {
                entry.submission.complete(Ok(r.rest().to_vec()));
            } else {
                let path = entry.submission.client_path.clone();
                entry.submission.complete(Err(RookeryError::server(code, path)));
            }
            Ok(FrameDisposition::Continue)
        }
    }
}

/// Writes one `(xid, opcode) ++ body` envelope as a frame.
async fn write_envelope<S: AsyncWrite + Unpin>(
    conn: &mut FrameConnection<S>,
    xid: i32,
    op: OpCode,
    body: &[u8],
) -> Result<()> {
    let mut w = WireWriter::with_capacity(8 + body.len());
    RequestHeader::new(xid, op).encode(&mut w);
    w.write_raw(body);
    conn.write_frame(&w.into_bytes()).await
}

fn is_disconnection(err: &RookeryError) -> bool {
    match err {
        RookeryError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_cell_round_trip() {
        let cell = StateCell::new(SessionState::Connecting);
        assert_eq!(cell.load(), SessionState::Connecting);
        for state in [
            SessionState::NotConnected,
            SessionState::Associating,
            SessionState::Connected,
            SessionState::Closed,
            SessionState::AuthFailed,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::AuthFailed.is_terminal());
        assert!(!SessionState::Connected.is_terminal());
        assert!(!SessionState::NotConnected.is_terminal());
    }

    #[test]
    fn test_disconnection_classification() {
        let eof = RookeryError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "eof",
        ));
        assert!(is_disconnection(&eof));
        assert!(!is_disconnection(&RookeryError::Protocol("x".into())));
    }
}
