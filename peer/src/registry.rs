//! The peer registry: secure channels over transport sessions, command
//! dispatch, and the collaborator-facing send/broadcast interface.
//!
//! All state is owned by one [`PeerNetwork`] value — no globals — so
//! independent nodes can coexist in a process. Handlers never mutate the
//! registry directly while it is mid-dispatch; they queue [`Effect`]s that
//! are applied once dispatch returns, the same queue-then-drain shape the
//! outbound broadcast path uses.

use std::collections::HashMap;
use std::io::Write;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;

use lattice_crypto::LocalIdentity;
use lattice_transport::{DatagramSocket, Endpoint, SessionId, SessionState, TransportError};
use lattice_types::PeerId;

use crate::channel::{SecureChannel, MAX_RECORD_PLAINTEXT};
use crate::command::{encode_command, CommandFrame, CommandReader};

/// Command issued automatically when an outbound handshake completes.
const BOOTSTRAP_COMMAND: &str = "getpeers";

/// A snapshot of one handshake-complete peer, as seen by handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addr: SocketAddr,
    /// The peer-count the peer last reported about itself.
    pub reported_peer_count: u16,
}

/// Deferred actions queued by command handlers during dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Send {
        target: PeerId,
        command: String,
        payload: Vec<u8>,
    },
    Broadcast {
        command: String,
        payload: Vec<u8>,
    },
    Connect(SocketAddr),
    SetSenderPeerCount(u16),
}

/// What a handler sees while processing one inbound command.
pub struct CommandContext<'a> {
    /// The peer the command came from.
    pub sender: PeerInfo,
    /// Our own identity fingerprint.
    pub local_id: PeerId,
    /// Snapshot of all handshake-complete peers (the sender included).
    pub peers: &'a [PeerInfo],
    /// Unix seconds, as passed into `handle_socket`.
    pub now: u64,
    effects: &'a mut Vec<Effect>,
}

impl<'a> CommandContext<'a> {
    /// Build a context by hand — for driving handlers outside a live
    /// dispatch (handler unit tests, embedders).
    pub fn new(
        sender: PeerInfo,
        local_id: PeerId,
        peers: &'a [PeerInfo],
        now: u64,
        effects: &'a mut Vec<Effect>,
    ) -> Self {
        Self {
            sender,
            local_id,
            peers,
            now,
            effects,
        }
    }

    /// Send a command back to the sender.
    pub fn reply(&mut self, command: &str, payload: Vec<u8>) {
        let target = self.sender.id;
        self.send_to(target, command, payload);
    }

    /// Send a command to a specific peer.
    pub fn send_to(&mut self, target: PeerId, command: &str, payload: Vec<u8>) {
        self.effects.push(Effect::Send {
            target,
            command: command.to_string(),
            payload,
        });
    }

    /// Send a command to every handshake-complete peer.
    pub fn broadcast(&mut self, command: &str, payload: Vec<u8>) {
        self.effects.push(Effect::Broadcast {
            command: command.to_string(),
            payload,
        });
    }

    /// Request an outbound connection to a new address.
    pub fn connect(&mut self, addr: SocketAddr) {
        self.effects.push(Effect::Connect(addr));
    }

    /// Record the peer-count the sender reported about itself.
    pub fn set_sender_peer_count(&mut self, count: u16) {
        self.effects.push(Effect::SetSenderPeerCount(count));
    }
}

/// A registered command handler. Several handlers may share one name; all
/// of them run for each matching frame.
pub trait CommandHandler {
    fn handle(&mut self, ctx: &mut CommandContext<'_>, payload: &[u8]);
}

/// Per-peer state: one secure channel and its command framer.
struct Peer {
    addr: SocketAddr,
    channel: SecureChannel,
    reader: CommandReader,
    reported_peer_count: u16,
    initiator: bool,
}

/// The secure session layer over one transport endpoint.
pub struct PeerNetwork<S: DatagramSocket> {
    endpoint: Endpoint<S>,
    identity: LocalIdentity,
    peers: HashMap<SessionId, Peer>,
    commands: Vec<(String, Box<dyn CommandHandler>)>,
}

impl<S: DatagramSocket> PeerNetwork<S> {
    pub fn new(socket: S, identity: LocalIdentity) -> Self {
        Self {
            endpoint: Endpoint::new(socket),
            identity,
            peers: HashMap::new(),
            commands: Vec::new(),
        }
    }

    /// Our identity fingerprint.
    pub fn local_id(&self) -> PeerId {
        self.identity.id
    }

    pub fn endpoint(&self) -> &Endpoint<S> {
        &self.endpoint
    }

    /// Register a handler for a command name. Appending is the only
    /// operation; multiple handlers per name all run, in registration order.
    pub fn register_command(&mut self, name: &str, handler: Box<dyn CommandHandler>) {
        self.commands.push((name.to_string(), handler));
    }

    /// Open a connection to `addr` as initiator. Connecting to an address
    /// we already have a session for is a no-op returning the existing id.
    pub fn connect(&mut self, addr: SocketAddr, now: u64) -> SessionId {
        if let Some(existing) = self.endpoint.session_for_addr(addr) {
            return existing;
        }
        let sid = self.endpoint.open(addr, now);
        self.install_channel(sid, addr, true, now);
        sid
    }

    /// Feed one inbound datagram from the socket into the stack.
    /// Returns `Ok(false)` when the socket had nothing pending.
    pub fn on_datagram(&mut self, now: u64) -> Result<bool, TransportError> {
        self.endpoint.on_datagram(now)
    }

    /// Drain the transport readiness queue: advance handshakes, decrypt,
    /// parse command frames, and dispatch them to registered handlers.
    pub fn handle_socket(&mut self, now: u64) {
        while let Some(sid) = self.endpoint.poll(now) {
            self.service_session(sid, now);
        }
    }

    /// Number of handshake-complete peers.
    pub fn peer_count(&self) -> usize {
        self.peers
            .values()
            .filter(|p| p.channel.is_established())
            .count()
    }

    /// Snapshot of all handshake-complete peers.
    pub fn connected_peers(&self) -> Vec<PeerInfo> {
        self.peers
            .values()
            .filter(|p| p.channel.is_established())
            .map(|p| PeerInfo {
                id: p.channel.remote_id(),
                addr: p.addr,
                reported_peer_count: p.reported_peer_count,
            })
            .collect()
    }

    /// Linear lookup among handshake-complete peers.
    pub fn find_by_id(&self, id: &PeerId) -> Option<PeerInfo> {
        self.connected_peers().into_iter().find(|p| p.id == *id)
    }

    /// Send `command` to one peer, or to every handshake-complete peer when
    /// `target` is `None`. Per-peer failures are logged, never propagated.
    pub fn send(&mut self, target: Option<&PeerId>, command: &str, payload: &[u8]) {
        match target {
            Some(id) => {
                if let Some(sid) = self.session_by_peer_id(id) {
                    self.send_session(sid, command, payload);
                } else {
                    tracing::debug!(peer = %id, command, "send target not connected");
                }
            }
            None => self.broadcast(command, payload),
        }
    }

    /// Send `command` to every handshake-complete peer.
    pub fn broadcast(&mut self, command: &str, payload: &[u8]) {
        let targets: Vec<SessionId> = self
            .peers
            .iter()
            .filter(|(_, p)| p.channel.is_established())
            .map(|(sid, _)| *sid)
            .collect();
        for sid in targets {
            self.send_session(sid, command, payload);
        }
    }

    /// Tear down a peer. `clean` sends a close notice over the secure
    /// channel and runs the transport CLOSE/CLOSED handshake; otherwise the
    /// transport session is reset outright.
    pub fn disconnect(&mut self, id: &PeerId, clean: bool) {
        if let Some(sid) = self.session_by_peer_id(id) {
            self.disconnect_session(sid, clean);
        }
    }

    /// Connect to a newline-delimited `host:port` list. Malformed entries
    /// and resolution failures are skipped.
    pub fn bootstrap(&mut self, list: &str, now: u64) {
        for entry in list.lines() {
            let entry = entry.trim();
            if entry.is_empty() || !entry.contains(':') {
                continue;
            }
            match entry.to_socket_addrs() {
                Ok(mut addrs) => {
                    if let Some(addr) = addrs.next() {
                        tracing::debug!(%addr, "bootstrapping to peer");
                        self.connect(addr, now);
                    }
                }
                Err(e) => {
                    tracing::debug!(entry, error = %e, "skipping unresolvable bootstrap entry");
                }
            }
        }
    }

    /// Write `ip:port` lines for the currently connected peers, suitable
    /// for seeding a later bootstrap.
    pub fn export_peers(&self, path: &Path) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        for peer in self.connected_peers() {
            writeln!(file, "{}", peer.addr)?;
        }
        Ok(())
    }

    // -- Internal ------------------------------------------------------------

    fn session_by_peer_id(&self, id: &PeerId) -> Option<SessionId> {
        self.peers
            .iter()
            .find(|(_, p)| p.channel.is_established() && p.channel.remote_id() == *id)
            .map(|(sid, _)| *sid)
    }

    /// Create the secure channel for a session and send our hello.
    fn install_channel(&mut self, sid: SessionId, addr: SocketAddr, initiator: bool, now: u64) {
        let channel = SecureChannel::new(&self.identity, now);
        let hello = channel.hello_bytes().to_vec();
        self.peers.insert(
            sid,
            Peer {
                addr,
                channel,
                reader: CommandReader::new(),
                reported_peer_count: 0,
                initiator,
            },
        );
        if let Err(e) = self.endpoint.write(sid, &hello) {
            tracing::warn!(session = %sid, error = %e, "failed to send handshake hello");
        }
    }

    /// Process one session reported ready by the transport poll.
    fn service_session(&mut self, sid: SessionId, now: u64) {
        match self.endpoint.state(sid) {
            None => {
                self.peers.remove(&sid);
                return;
            }
            Some(SessionState::Closed) => {
                // Transport teardown observed: drop the peer with it.
                if let Some(peer) = self.peers.remove(&sid) {
                    tracing::info!(peer = %peer.channel.remote_id(), addr = %peer.addr, "peer transport closed");
                }
                self.endpoint.close(sid, true);
                return;
            }
            _ => {}
        }

        // Inbound session we have not seen: act as handshake acceptor.
        if !self.peers.contains_key(&sid) {
            if let Some(addr) = self.endpoint.peer_addr(sid) {
                tracing::debug!(session = %sid, %addr, "accepting inbound secure session");
                self.install_channel(sid, addr, false, now);
            } else {
                return;
            }
        }

        // Pull transport bytes into the channel and advance it.
        let initiator = self.peers.get(&sid).map(|p| p.initiator).unwrap_or(false);
        let mut established_now = false;
        let mut close_notify = false;
        let mut fatal = false;
        let mut frames: Vec<CommandFrame> = Vec::new();
        {
            let Some(peer) = self.peers.get_mut(&sid) else {
                return;
            };
            let mut buf = [0u8; 4096];
            loop {
                match self.endpoint.read(sid, &mut buf) {
                    Ok(0) => break,
                    Ok(n) => peer.channel.feed(&buf[..n]),
                    Err(TransportError::WouldBlock) => break,
                    Err(e) => {
                        tracing::warn!(session = %sid, error = %e, "transport read failed");
                        fatal = true;
                        break;
                    }
                }
            }

            if !fatal {
                match peer.channel.advance(&self.identity, now) {
                    Ok(progress) => {
                        established_now = progress.established;
                        close_notify = progress.close_notify;
                        let plaintext = peer.channel.take_plaintext();
                        if !plaintext.is_empty() {
                            peer.reader.feed(&plaintext);
                        }
                        loop {
                            match peer.reader.next_frame() {
                                Ok(Some(frame)) => frames.push(frame),
                                Ok(None) => break,
                                Err(e) => {
                                    tracing::warn!(session = %sid, error = %e, "command framing violation");
                                    fatal = true;
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(session = %sid, error = %e, "secure handshake failed");
                        fatal = true;
                    }
                }
            }
        }

        if fatal {
            self.disconnect_session(sid, false);
            return;
        }

        if established_now {
            if let Some(peer) = self.peers.get(&sid) {
                tracing::info!(
                    peer = %peer.channel.remote_id(),
                    addr = %peer.addr,
                    "peer handshake complete"
                );
            }
            // Bootstrap the overlay: ask a fresh outbound peer who it knows.
            if initiator {
                self.send_session(sid, BOOTSTRAP_COMMAND, &[]);
            }
        }

        for frame in frames {
            self.dispatch(sid, frame, now);
        }

        if close_notify {
            tracing::debug!(session = %sid, "peer sent close notice");
            self.disconnect_session(sid, true);
        }
    }

    /// Run every handler registered for the frame's name, then apply the
    /// effects they queued. Unknown commands are silently ignored.
    fn dispatch(&mut self, sid: SessionId, frame: CommandFrame, now: u64) {
        let Some(peer) = self.peers.get(&sid) else {
            return;
        };
        if !peer.channel.is_established() {
            return;
        }
        let sender = PeerInfo {
            id: peer.channel.remote_id(),
            addr: peer.addr,
            reported_peer_count: peer.reported_peer_count,
        };
        tracing::debug!(
            peer = %sender.id,
            command = %String::from_utf8_lossy(&frame.name),
            len = frame.payload.len(),
            "received command"
        );

        let snapshot = self.connected_peers();
        let mut effects = Vec::new();
        let mut commands = std::mem::take(&mut self.commands);
        {
            let mut ctx = CommandContext {
                sender,
                local_id: self.identity.id,
                peers: &snapshot,
                now,
                effects: &mut effects,
            };
            for (name, handler) in commands.iter_mut() {
                if name.as_bytes() == frame.name.as_slice() {
                    handler.handle(&mut ctx, &frame.payload);
                }
            }
        }
        self.commands = commands;
        self.apply_effects(sid, effects, now);
    }

    fn apply_effects(&mut self, sender_sid: SessionId, effects: Vec<Effect>, now: u64) {
        for effect in effects {
            match effect {
                Effect::Send {
                    target,
                    command,
                    payload,
                } => {
                    self.send(Some(&target), &command, &payload);
                }
                Effect::Broadcast { command, payload } => {
                    self.broadcast(&command, &payload);
                }
                Effect::Connect(addr) => {
                    self.connect(addr, now);
                }
                Effect::SetSenderPeerCount(count) => {
                    if let Some(peer) = self.peers.get_mut(&sender_sid) {
                        peer.reported_peer_count = count;
                    }
                }
            }
        }
    }

    /// Frame, encrypt, and write one command as coalesced records.
    fn send_session(&mut self, sid: SessionId, command: &str, payload: &[u8]) {
        let Some(peer) = self.peers.get_mut(&sid) else {
            return;
        };
        if !peer.channel.is_established() {
            return;
        }
        let frame = match encode_command(command, payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(command, error = %e, "refusing to send unframable command");
                return;
            }
        };
        // Each record goes to the transport as a single write so a whole
        // command (up to the record size) shares one datagram.
        for chunk in frame.chunks(MAX_RECORD_PLAINTEXT) {
            match peer.channel.seal(chunk) {
                Ok(record) => {
                    if let Err(e) = self.endpoint.write(sid, &record) {
                        tracing::warn!(session = %sid, error = %e, "transport write failed");
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(session = %sid, error = %e, "record encryption failed");
                    return;
                }
            }
        }
    }

    fn disconnect_session(&mut self, sid: SessionId, clean: bool) {
        if let Some(mut peer) = self.peers.remove(&sid) {
            if clean && peer.channel.is_established() {
                if let Ok(notice) = peer.channel.seal_close_notify() {
                    let _ = self.endpoint.write(sid, &notice);
                }
            }
            tracing::info!(
                peer = %peer.channel.remote_id(),
                addr = %peer.addr,
                clean,
                "disconnecting peer"
            );
        }
        self.endpoint.close(sid, clean);
    }
}
