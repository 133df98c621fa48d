//! Discovery gossip: two protocols built as commands on the peer layer.
//!
//! - **Peer exchange** (`getpeers`/`peers`): ask connected peers for their
//!   neighbour lists and connect to the least-connected candidates until the
//!   registry reaches its target size.
//! - **Flood search** (`findpeer`): a TTL-bounded broadcast looking for one
//!   specific identity, with a freshness-windowed cache suppressing
//!   propagation loops.

pub mod cache;
pub mod exchange;
pub mod findpeer;

pub use cache::SearchCache;
pub use exchange::{GetPeersHandler, PeersHandler, TARGET_PEER_COUNT};
pub use findpeer::{find_peer, FindPeerHandler, INITIAL_TTL};

use lattice_peer::PeerNetwork;
use lattice_transport::DatagramSocket;

/// Register the built-in discovery commands on a peer network.
pub fn register_discovery<S: DatagramSocket>(network: &mut PeerNetwork<S>) {
    network.register_command("getpeers", Box::new(GetPeersHandler));
    network.register_command("peers", Box::new(PeersHandler));
    network.register_command("findpeer", Box::new(FindPeerHandler::new()));
}
