//! The endpoint: one datagram socket plus its session registry.
//!
//! Sessions are keyed by a stable numeric [`SessionId`]; a separate index
//! maps remote addresses to ids. All state is owned by the endpoint and
//! mutated only from the caller's thread — there is no locking and no
//! global registry, so independent endpoints can coexist in one process.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use crate::error::TransportError;
use crate::session::{Session, SessionState, KEEPALIVE_IDLE_SECS, SESSION_TIMEOUT_SECS};
use crate::socket::DatagramSocket;
use crate::wire::{parse_frame, Frame, FrameType, ParseOutcome, HEADER_LEN, MAX_PAYLOAD_LEN};

/// Stable identifier of a session within one endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to do with a session after applying one frame.
enum FrameAction {
    Keep,
    Drop,
}

/// A reliable-transport endpoint over one datagram socket.
pub struct Endpoint<S: DatagramSocket> {
    socket: S,
    sessions: HashMap<SessionId, Session>,
    by_addr: HashMap<SocketAddr, SessionId>,
    next_id: u64,
    recv_buf: Vec<u8>,
}

impl<S: DatagramSocket> Endpoint<S> {
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            sessions: HashMap::new(),
            by_addr: HashMap::new(),
            next_id: 0,
            recv_buf: vec![0u8; HEADER_LEN + MAX_PAYLOAD_LEN],
        }
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Open (or reuse) a session to `remote` and send INIT.
    pub fn open(&mut self, remote: SocketAddr, now: u64) -> SessionId {
        if let Some(id) = self.by_addr.get(&remote) {
            return *id;
        }
        let id = self.insert_session(remote, now);
        if let Some(session) = self.sessions.get_mut(&id) {
            session.init_sent = true;
        }
        send_frame(&self.socket, remote, &Frame::control(FrameType::Init));
        tracing::debug!(session = %id, %remote, "opened session, sent INIT");
        id
    }

    /// Resolve the session for a remote address, if one exists.
    pub fn session_for_addr(&self, addr: SocketAddr) -> Option<SessionId> {
        self.by_addr.get(&addr).copied()
    }

    pub fn peer_addr(&self, id: SessionId) -> Option<SocketAddr> {
        self.sessions.get(&id).map(|s| s.remote)
    }

    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.sessions.get(&id).map(|s| s.state)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Read one datagram from the socket and process any complete frames.
    ///
    /// Returns `Ok(false)` when the socket had nothing pending. With a
    /// level-triggered readiness source, call in a loop until `false`.
    pub fn on_datagram(&mut self, now: u64) -> Result<bool, TransportError> {
        let (mut len, from) = match self.socket.try_recv_from(&mut self.recv_buf) {
            Ok(ok) => ok,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let id = match self.by_addr.get(&from) {
            Some(id) => *id,
            None => {
                let id = self.insert_session(from, now);
                tracing::debug!(session = %id, remote = %from, "session created by inbound datagram");
                id
            }
        };

        let mut drop_session = false;
        loop {
            let Self {
                socket,
                sessions,
                recv_buf,
                ..
            } = self;
            let Some(session) = sessions.get_mut(&id) else {
                break;
            };
            // Append the datagram once, then drain complete frames.
            if len > 0 {
                session.rx_buf.extend_from_slice(&recv_buf[..len]);
                len = 0;
            }
            match parse_frame(&session.rx_buf) {
                ParseOutcome::NeedMore => break,
                ParseOutcome::Malformed(violation) => {
                    tracing::warn!(session = %id, ?violation, "protocol violation");
                    if session.state == SessionState::Uninitialized {
                        send_frame(socket, session.remote, &Frame::control(FrameType::Reset));
                        drop_session = true;
                    } else {
                        session.state = SessionState::Closed;
                    }
                    break;
                }
                ParseOutcome::Complete { frame, consumed } => {
                    session.rx_buf.drain(..consumed);
                    match apply_frame(socket, id, session, frame, now) {
                        FrameAction::Keep => {}
                        FrameAction::Drop => {
                            drop_session = true;
                            break;
                        }
                    }
                }
            }
        }
        if drop_session {
            self.remove_session(id);
        }
        Ok(true)
    }

    /// Scan sessions for one that is ready: newly closed (reported once) or
    /// holding the next in-order payload. Also drives keepalive and
    /// stale-session expiry as a side effect. No fairness beyond scan order;
    /// callers must re-poll until `None` to drain everything ready.
    pub fn poll(&mut self, now: u64) -> Option<SessionId> {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            let mut expire = false;
            {
                let Self {
                    socket, sessions, ..
                } = &mut *self;
                let Some(session) = sessions.get_mut(&id) else {
                    continue;
                };

                if session.state == SessionState::Closed {
                    if !session.closed_notified {
                        session.closed_notified = true;
                        return Some(id);
                    }
                    continue;
                }

                let idle = session.idle_secs(now);
                if idle >= SESSION_TIMEOUT_SECS {
                    if session.state == SessionState::Closing {
                        tracing::debug!(session = %id, "closing session timed out, tearing down");
                        expire = true;
                    } else {
                        tracing::debug!(session = %id, idle, "session timed out, marking closed");
                        session.state = SessionState::Closed;
                        session.closed_notified = true;
                        return Some(id);
                    }
                } else if session.state == SessionState::Established {
                    if idle >= KEEPALIVE_IDLE_SECS && !session.keepalive_pending {
                        send_frame(socket, session.remote, &Frame::control(FrameType::Ping));
                        session.keepalive_pending = true;
                    }
                    if session.next_ready() {
                        return Some(id);
                    }
                }
            }
            if expire {
                self.remove_session(id);
            }
        }
        None
    }

    /// Deliver the next in-order payload into `buf`.
    ///
    /// `Ok(0)` means end of stream (session closed or closing);
    /// `Err(WouldBlock)` means nothing in-order is ready yet.
    pub fn read(&mut self, id: SessionId, buf: &mut [u8]) -> Result<usize, TransportError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(TransportError::UnknownSession(id))?;
        match session.state {
            SessionState::Closing | SessionState::Closed => Ok(0),
            _ => session.read_in_order(buf).ok_or(TransportError::WouldBlock),
        }
    }

    /// Send `data` as sequenced PAYLOAD frames, retaining each until ACKed.
    ///
    /// `Ok(0)` means the session is closed or closing. Payloads larger than
    /// one frame are split across consecutive sequences. Acceptance is
    /// unconditional — there is no backpressure policy (see DESIGN.md).
    pub fn write(&mut self, id: SessionId, data: &[u8]) -> Result<usize, TransportError> {
        let Self {
            socket, sessions, ..
        } = self;
        let session = sessions
            .get_mut(&id)
            .ok_or(TransportError::UnknownSession(id))?;
        if matches!(session.state, SessionState::Closing | SessionState::Closed) {
            return Ok(0);
        }
        let mut sent = 0;
        for chunk in data.chunks(MAX_PAYLOAD_LEN) {
            let seq = session.out_seq;
            session.unacked.insert(seq, chunk.to_vec());
            session.out_seq = session.out_seq.wrapping_add(1);
            send_frame(
                socket,
                session.remote,
                &Frame::new(FrameType::Payload, seq, chunk.to_vec()),
            );
            sent += chunk.len();
        }
        Ok(sent)
    }

    /// Request teardown of a session.
    ///
    /// If the peer has already signalled closed, resources are released
    /// immediately. Otherwise `clean` selects between the CLOSE/CLOSED
    /// handshake (teardown deferred until the peer answers or the keepalive
    /// timeout fires) and a unilateral RESET with immediate teardown.
    pub fn close(&mut self, id: SessionId, clean: bool) {
        let mut remove = false;
        {
            let Self {
                socket, sessions, ..
            } = &mut *self;
            let Some(session) = sessions.get_mut(&id) else {
                return;
            };
            match session.state {
                SessionState::Closed => {
                    // Peer already signalled teardown; release immediately.
                    remove = true;
                }
                SessionState::Closing => {}
                _ if clean => {
                    session.state = SessionState::Closing;
                    send_frame(socket, session.remote, &Frame::control(FrameType::Close));
                    tracing::debug!(session = %id, "sent CLOSE, awaiting CLOSED");
                }
                _ => {
                    send_frame(socket, session.remote, &Frame::control(FrameType::Reset));
                    remove = true;
                }
            }
        }
        if remove {
            self.remove_session(id);
        }
    }

    fn insert_session(&mut self, remote: SocketAddr, now: u64) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(id, Session::new(remote, now));
        self.by_addr.insert(remote, id);
        id
    }

    fn remove_session(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.remove(&id) {
            self.by_addr.remove(&session.remote);
            tracing::debug!(session = %id, remote = %session.remote, "session removed");
        }
    }
}

/// Send one frame, logging rather than failing on socket errors — a lost
/// datagram and a failed send look the same to the protocol.
fn send_frame<S: DatagramSocket>(socket: &S, remote: SocketAddr, frame: &Frame) {
    if let Err(e) = socket.send_to(&frame.encode(), remote) {
        tracing::warn!(%remote, frame_type = ?frame.frame_type, error = %e, "datagram send failed");
    }
}

/// Apply one parsed frame to a session, emitting any protocol replies.
fn apply_frame<S: DatagramSocket>(
    socket: &S,
    id: SessionId,
    session: &mut Session,
    frame: Frame,
    now: u64,
) -> FrameAction {
    session.touch(now);

    // A session we have marked closed ignores everything further.
    if session.state == SessionState::Closed {
        return FrameAction::Keep;
    }

    // While closing, only the peer's CLOSED is of interest.
    if session.state == SessionState::Closing {
        if frame.frame_type == FrameType::Closed {
            tracing::debug!(session = %id, "received CLOSED, tearing down");
            return FrameAction::Drop;
        }
        return FrameAction::Keep;
    }

    if session.state == SessionState::Uninitialized {
        return match frame.frame_type {
            FrameType::Init if frame.sequence == 0 && frame.payload.is_empty() => {
                session.state = SessionState::Established;
                if !session.init_sent {
                    send_frame(socket, session.remote, &Frame::control(FrameType::Init));
                    session.init_sent = true;
                }
                tracing::debug!(session = %id, "session established");
                FrameAction::Keep
            }
            _ => {
                // Half-open traffic from an unknown peer is discarded.
                tracing::debug!(session = %id, frame_type = ?frame.frame_type, "unexpected frame before INIT, resetting");
                send_frame(socket, session.remote, &Frame::control(FrameType::Reset));
                FrameAction::Drop
            }
        };
    }

    match frame.frame_type {
        FrameType::Init => {
            if !(frame.sequence == 0 && frame.payload.is_empty()) {
                // Established peer violating the protocol: observe teardown.
                tracing::warn!(session = %id, "malformed INIT on established session");
                session.state = SessionState::Closed;
            }
            FrameAction::Keep
        }
        FrameType::Ack => {
            if let Ok(bytes) = <[u8; 2]>::try_from(frame.payload.as_slice()) {
                session.acknowledge(u16::from_le_bytes(bytes));
            } else {
                tracing::warn!(session = %id, len = frame.payload.len(), "ACK payload has wrong size");
            }
            FrameAction::Keep
        }
        FrameType::Resend => {
            for bytes in frame.payload.chunks_exact(2) {
                let seq = u16::from_le_bytes([bytes[0], bytes[1]]);
                if let Some(data) = session.unacked.get(&seq) {
                    tracing::debug!(session = %id, seq, "retransmitting on request");
                    send_frame(
                        socket,
                        session.remote,
                        &Frame::new(FrameType::Payload, seq, data.clone()),
                    );
                }
            }
            FrameAction::Keep
        }
        FrameType::Payload => {
            // Always acknowledge, in or out of order, duplicate or not.
            let ack = Frame::new(FrameType::Ack, 0, frame.sequence.to_le_bytes().to_vec());
            send_frame(socket, session.remote, &ack);
            if let Some(missing) = session.accept_payload(frame.sequence, frame.payload) {
                if !missing.is_empty() {
                    let mut list = Vec::with_capacity(missing.len() * 2);
                    for seq in &missing {
                        list.extend_from_slice(&seq.to_le_bytes());
                    }
                    tracing::debug!(session = %id, gaps = missing.len(), "requesting resend");
                    send_frame(socket, session.remote, &Frame::new(FrameType::Resend, 0, list));
                }
            }
            FrameAction::Keep
        }
        FrameType::Close => {
            session.state = SessionState::Closed;
            send_frame(socket, session.remote, &Frame::control(FrameType::Closed));
            tracing::debug!(session = %id, "received CLOSE, answered CLOSED");
            FrameAction::Keep
        }
        FrameType::Closed => FrameAction::Keep, // not closing locally: stray, ignore
        FrameType::Ping => {
            send_frame(socket, session.remote, &Frame::control(FrameType::Pong));
            session.keepalive_pending = false;
            FrameAction::Keep
        }
        FrameType::Pong => {
            session.keepalive_pending = false;
            FrameAction::Keep
        }
        FrameType::Reset => {
            tracing::debug!(session = %id, "peer reset the session");
            session.state = SessionState::Closed;
            FrameAction::Keep
        }
    }
}
