//! End-to-end discovery scenarios over the in-memory network.

use std::net::SocketAddr;

use lattice_crypto::LocalIdentity;
use lattice_discovery::{find_peer, register_discovery};
use lattice_peer::PeerNetwork;
use lattice_transport::{MemoryNet, MemorySocket};

fn addr(port: u16) -> SocketAddr {
    format!("10.2.0.1:{port}").parse().unwrap()
}

fn node(net: &MemoryNet, port: u16, name: &str) -> PeerNetwork<MemorySocket> {
    let dir = tempfile::tempdir().unwrap();
    let identity = LocalIdentity::load_or_generate(&dir.path().join(format!("{name}.pem"))).unwrap();
    let mut network = PeerNetwork::new(net.bind(addr(port)), identity);
    register_discovery(&mut network);
    network
}

/// Shuttle datagrams among all nodes until the network goes quiet.
fn pump(nodes: &mut [&mut PeerNetwork<MemorySocket>], now: u64) {
    for _ in 0..40 {
        let mut moved = false;
        for node in nodes.iter_mut() {
            while node.on_datagram(now).unwrap() {
                moved = true;
            }
        }
        for node in nodes.iter_mut() {
            node.handle_socket(now);
        }
        if !moved {
            break;
        }
    }
}

#[test]
fn fresh_pair_exchanges_empty_peer_list_and_stays_at_one() {
    let net = MemoryNet::new();
    let mut a = node(&net, 1, "a");
    let mut b = node(&net, 2, "b");

    // A opens a session to B; INIT answered by INIT; handshake completes;
    // A's automatic getpeers is answered by B's (empty) neighbour list.
    a.connect(addr(2), 0);
    pump(&mut [&mut a, &mut b], 0);

    assert_eq!(a.peer_count(), 1);
    assert_eq!(b.peer_count(), 1);
    assert_eq!(a.connected_peers()[0].id, b.local_id());
}

#[test]
fn peer_exchange_spreads_connections_through_a_hub() {
    let net = MemoryNet::new();
    let mut hub = node(&net, 1, "hub");
    let mut b = node(&net, 2, "b");
    let mut c = node(&net, 3, "c");

    // The hub knows both b and c.
    hub.connect(addr(2), 0);
    pump(&mut [&mut hub, &mut b], 0);
    hub.connect(addr(3), 0);
    pump(&mut [&mut hub, &mut b, &mut c], 0);
    assert_eq!(hub.peer_count(), 2);
    assert_eq!(b.peer_count(), 1);

    // A newcomer dials the hub; the hub's peers response leads it to b and c.
    let mut d = node(&net, 4, "d");
    d.connect(addr(1), 1);
    pump(&mut [&mut hub, &mut b, &mut c, &mut d], 1);

    assert_eq!(d.peer_count(), 3);
    assert!(d.find_by_id(&b.local_id()).is_some());
    assert!(d.find_by_id(&c.local_id()).is_some());
    assert_eq!(b.peer_count(), 2);
}

#[test]
fn flood_search_reaches_indirect_target_which_connects_back() {
    let net = MemoryNet::new();
    let mut a = node(&net, 1, "a");
    let mut b = node(&net, 2, "b");
    let mut c = node(&net, 3, "c");

    // Chain topology: a - b - c, with no direct a - c link.
    a.connect(addr(2), 0);
    pump(&mut [&mut a, &mut b], 0);
    b.connect(addr(3), 0);
    pump(&mut [&mut a, &mut b, &mut c], 0);

    let c_id = c.local_id();
    assert!(a.find_by_id(&c_id).is_none());

    // A floods a search for C. B fills in A's observed address and relays;
    // C sees its own id and connects back to the claimed address.
    find_peer(&mut a, &c_id);
    pump(&mut [&mut a, &mut b, &mut c], 1);

    assert!(a.find_by_id(&c_id).is_some());
    assert!(c.find_by_id(&a.local_id()).is_some());
}

#[test]
fn search_for_unknown_identity_changes_nothing() {
    let net = MemoryNet::new();
    let mut a = node(&net, 1, "a");
    let mut b = node(&net, 2, "b");

    a.connect(addr(2), 0);
    pump(&mut [&mut a, &mut b], 0);

    let ghost = lattice_types::PeerId::new([0xFE; 32]);
    find_peer(&mut a, &ghost);
    pump(&mut [&mut a, &mut b], 1);

    assert_eq!(a.peer_count(), 1);
    assert_eq!(b.peer_count(), 1);
    assert!(a.find_by_id(&ghost).is_none());
}
