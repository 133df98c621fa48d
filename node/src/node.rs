//! The node: one owned stack of endpoint, peer layer, and discovery.

use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lattice_discovery::register_discovery;
use lattice_peer::{CommandHandler, PeerInfo, PeerNetwork};
use lattice_types::PeerId;

use crate::config::NodeConfig;
use crate::error::NodeError;

/// A running lattice node over one UDP socket.
pub struct Node {
    config: NodeConfig,
    network: PeerNetwork<tokio::net::UdpSocket>,
}

impl Node {
    /// Bind the socket, load or create the identity, and register the
    /// built-in discovery commands.
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        let identity =
            lattice_crypto::LocalIdentity::load_or_generate(&config.identity_key_path())?;
        let socket = tokio::net::UdpSocket::bind(&config.listen).await?;
        tracing::info!(
            id = %identity.id,
            listen = %socket.local_addr()?,
            "node starting"
        );
        let mut network = PeerNetwork::new(socket, identity);
        register_discovery(&mut network);
        Ok(Self { config, network })
    }

    /// Our identity fingerprint — the discovery target other nodes search for.
    pub fn local_id(&self) -> PeerId {
        self.network.local_id()
    }

    /// The bound socket address.
    pub fn local_addr(&self) -> Result<SocketAddr, NodeError> {
        Ok(self.network.endpoint().local_addr()?)
    }

    // -- Collaborator interface ----------------------------------------------

    pub fn register_command(&mut self, name: &str, handler: Box<dyn CommandHandler>) {
        self.network.register_command(name, handler);
    }

    /// Send to one peer, or broadcast when `target` is `None`.
    pub fn send(&mut self, target: Option<&PeerId>, command: &str, payload: &[u8]) {
        self.network.send(target, command, payload);
    }

    pub fn find_by_id(&self, id: &PeerId) -> Option<PeerInfo> {
        self.network.find_by_id(id)
    }

    /// Originate a flood search asking `target` to connect back to us.
    pub fn find_peer(&mut self, target: &PeerId) {
        lattice_discovery::find_peer(&mut self.network, target);
    }

    pub fn disconnect(&mut self, id: &PeerId, clean: bool) {
        self.network.disconnect(id, clean);
    }

    /// Connect to a newline-delimited `host:port` list.
    pub fn bootstrap(&mut self, list: &str) {
        self.network.bootstrap(list, unix_now());
    }

    pub fn export_peers(&self, path: &Path) -> std::io::Result<()> {
        self.network.export_peers(path)
    }

    pub fn peer_count(&self) -> usize {
        self.network.peer_count()
    }

    pub fn connected_peers(&self) -> Vec<PeerInfo> {
        self.network.connected_peers()
    }

    /// Direct access to the peer layer, for embedders needing more than the
    /// collaborator surface.
    pub fn network(&mut self) -> &mut PeerNetwork<tokio::net::UdpSocket> {
        &mut self.network
    }

    // -- Event loop ----------------------------------------------------------

    /// Connect to the configured bootstrap peers and any cached peers from
    /// a previous run.
    pub fn bootstrap_from_config(&mut self) {
        let configured = self.config.bootstrap_peers.join("\n");
        if !configured.is_empty() {
            self.network.bootstrap(&configured, unix_now());
        }
        match std::fs::read_to_string(self.config.peer_cache_path()) {
            Ok(cached) => self.network.bootstrap(&cached, unix_now()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(error = %e, "could not read peer cache"),
        }
    }

    /// Drain pending datagrams and ready sessions once.
    ///
    /// Useful for embedders that drive the node from their own loop; `run`
    /// calls this between readiness waits.
    pub fn pump(&mut self) -> Result<(), NodeError> {
        let now = unix_now();
        while self.network.on_datagram(now)? {}
        self.network.handle_socket(now);
        Ok(())
    }

    /// Run the node until cancelled.
    ///
    /// Single-task, single-owner: socket readiness drives datagram intake,
    /// and a one-second tick drives the keepalive/expiry scan even when the
    /// network is silent.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        self.bootstrap_from_config();
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            self.pump()?;
            tokio::select! {
                ready = self.network.endpoint().socket().readable() => {
                    ready?;
                }
                _ = tick.tick() => {}
            }
        }
    }

    /// Persist connected peers and close every session cleanly.
    pub fn shutdown(&mut self) {
        let cache = self.config.peer_cache_path();
        if let Some(parent) = cache.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = self.network.export_peers(&cache) {
            tracing::warn!(error = %e, "failed to export peer cache");
        }
        for peer in self.network.connected_peers() {
            self.network.disconnect(&peer.id, true);
        }
        tracing::info!("node shut down");
    }
}

/// Current UNIX timestamp in seconds.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
