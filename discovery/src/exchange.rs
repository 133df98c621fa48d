//! Peer exchange: `getpeers` requests and `peers` responses.
//!
//! A `peers` response lists every handshake-complete neighbour as
//! `{u16 LE addr_len}{addr utf-8}{u16 LE reported_peer_count}`. The
//! receiver connects to candidates lowest-reported-count-first until its
//! registry reaches [`TARGET_PEER_COUNT`], biasing new links toward
//! less-connected nodes to keep the overlay's degree distribution balanced.

use std::net::SocketAddr;

use lattice_peer::{CommandContext, CommandHandler, PeerInfo};

/// Registry size at which we stop hunting for more peers.
pub const TARGET_PEER_COUNT: usize = 20;

/// Encode a peer list for a `peers` response.
pub fn encode_peer_list(peers: &[PeerInfo]) -> Vec<u8> {
    let mut out = Vec::new();
    for peer in peers {
        let addr = peer.addr.to_string();
        out.extend_from_slice(&(addr.len() as u16).to_le_bytes());
        out.extend_from_slice(addr.as_bytes());
        out.extend_from_slice(&peer.reported_peer_count.to_le_bytes());
    }
    out
}

/// Decode a `peers` payload. Truncated tails and unparsable addresses are
/// skipped silently; whatever decodes cleanly is returned.
pub fn decode_peer_list(mut payload: &[u8]) -> Vec<(SocketAddr, u16)> {
    let mut entries = Vec::new();
    while payload.len() > 2 {
        let addr_len = u16::from_le_bytes([payload[0], payload[1]]) as usize;
        if payload.len() < 2 + addr_len + 2 {
            break;
        }
        let addr_bytes = &payload[2..2 + addr_len];
        let count = u16::from_le_bytes([payload[2 + addr_len], payload[2 + addr_len + 1]]);
        if let Some(addr) = std::str::from_utf8(addr_bytes)
            .ok()
            .and_then(|s| s.parse().ok())
        {
            entries.push((addr, count));
        }
        payload = &payload[2 + addr_len + 2..];
    }
    entries
}

/// Answers `getpeers` with our current neighbour list.
pub struct GetPeersHandler;

impl CommandHandler for GetPeersHandler {
    fn handle(&mut self, ctx: &mut CommandContext<'_>, _payload: &[u8]) {
        // The requester already knows itself; share everyone else.
        let others: Vec<PeerInfo> = ctx
            .peers
            .iter()
            .filter(|p| p.id != ctx.sender.id)
            .cloned()
            .collect();
        tracing::debug!(peer = %ctx.sender.id, count = others.len(), "answering getpeers");
        ctx.reply("peers", encode_peer_list(&others));
    }
}

/// Handles `peers` responses: connect to the least-connected candidates.
pub struct PeersHandler;

impl CommandHandler for PeersHandler {
    fn handle(&mut self, ctx: &mut CommandContext<'_>, payload: &[u8]) {
        let mut candidates = decode_peer_list(payload);
        // The number of entries a peer shares is the peer-count it reports
        // about itself.
        ctx.set_sender_peer_count(candidates.len() as u16);

        let mut registry_size = ctx.peers.len();
        while registry_size < TARGET_PEER_COUNT && !candidates.is_empty() {
            // Lowest reported count first; ties go to the earliest entry.
            let lowest = candidates
                .iter()
                .enumerate()
                .min_by_key(|(_, (_, count))| *count)
                .map(|(i, _)| i)
                .expect("candidates is non-empty");
            let (addr, count) = candidates.swap_remove(lowest);

            if ctx.peers.iter().any(|p| p.addr == addr) {
                continue;
            }
            tracing::debug!(%addr, reported = count, "connecting to exchanged peer");
            ctx.connect(addr);
            registry_size += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_peer::Effect;
    use lattice_types::PeerId;

    fn peer(port: u16, count: u16) -> PeerInfo {
        PeerInfo {
            id: PeerId::new([port as u8; 32]),
            addr: format!("10.0.0.{port}:7000").parse().unwrap(),
            reported_peer_count: count,
        }
    }

    fn run_handler(
        handler: &mut dyn CommandHandler,
        connected: &[PeerInfo],
        payload: &[u8],
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut ctx = CommandContext::new(
            peer(1, 0),
            PeerId::new([0xEE; 32]),
            connected,
            0,
            &mut effects,
        );
        handler.handle(&mut ctx, payload);
        effects
    }

    #[test]
    fn peer_list_roundtrip() {
        let peers = vec![peer(1, 5), peer(2, 0)];
        let encoded = encode_peer_list(&peers);
        let decoded = decode_peer_list(&encoded);
        assert_eq!(
            decoded,
            vec![
                ("10.0.0.1:7000".parse().unwrap(), 5),
                ("10.0.0.2:7000".parse().unwrap(), 0),
            ]
        );
    }

    #[test]
    fn decode_skips_truncated_tail() {
        let mut encoded = encode_peer_list(&[peer(1, 5)]);
        encoded.extend_from_slice(&100u16.to_le_bytes()); // bogus trailer
        let decoded = decode_peer_list(&encoded);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn decode_empty_payload_is_empty_list() {
        assert!(decode_peer_list(&[]).is_empty());
    }

    #[test]
    fn getpeers_replies_with_neighbour_list_excluding_requester() {
        let connected = vec![peer(1, 3), peer(2, 7)];
        let effects = run_handler(&mut GetPeersHandler, &connected, &[]);
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            Effect::Send {
                target,
                command,
                payload,
            } => {
                assert_eq!(*target, PeerId::new([1; 32]));
                assert_eq!(command, "peers");
                let listed = decode_peer_list(payload);
                assert_eq!(listed.len(), 1);
                assert_eq!(listed[0].0, peer(2, 7).addr);
                assert_eq!(listed[0].1, 7);
            }
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn selection_is_lowest_count_first_and_stops_at_target() {
        // Registry currently at 17/20; candidates report [5,1,3,1,9].
        let connected: Vec<PeerInfo> = (1..=17).map(|i| peer(i, 0)).collect();
        let candidates = vec![
            (addr_of(101), 5u16),
            (addr_of(102), 1),
            (addr_of(103), 3),
            (addr_of(104), 1),
            (addr_of(105), 9),
        ];
        let payload = encode_candidates(&candidates);

        let effects = run_handler(&mut PeersHandler, &connected, &payload);
        let connects: Vec<SocketAddr> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Connect(addr) => Some(*addr),
                _ => None,
            })
            .collect();
        // Three slots free: both count-1 candidates, then the count-3 one.
        assert_eq!(connects.len(), 3);
        assert!(connects.contains(&addr_of(102)));
        assert!(connects.contains(&addr_of(104)));
        assert!(connects.contains(&addr_of(103)));
    }

    #[test]
    fn sender_reported_count_is_entry_count() {
        let candidates = vec![(addr_of(101), 4u16), (addr_of(102), 2)];
        let payload = encode_candidates(&candidates);
        let effects = run_handler(&mut PeersHandler, &[], &payload);
        assert!(effects.contains(&Effect::SetSenderPeerCount(2)));
    }

    #[test]
    fn already_connected_addresses_are_skipped() {
        let connected = vec![peer(1, 0)];
        let candidates = vec![(connected[0].addr, 0u16), (addr_of(102), 5)];
        let payload = encode_candidates(&candidates);
        let effects = run_handler(&mut PeersHandler, &connected, &payload);
        let connects: Vec<SocketAddr> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Connect(addr) => Some(*addr),
                _ => None,
            })
            .collect();
        assert_eq!(connects, vec![addr_of(102)]);
    }

    #[test]
    fn full_registry_connects_to_nobody() {
        let connected: Vec<PeerInfo> = (1..=20).map(|i| peer(i, 0)).collect();
        let payload = encode_candidates(&[(addr_of(101), 0u16)]);
        let effects = run_handler(&mut PeersHandler, &connected, &payload);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Connect(_))));
    }

    fn addr_of(host: u16) -> SocketAddr {
        format!("10.9.{}.1:7000", host % 256).parse().unwrap()
    }

    fn encode_candidates(candidates: &[(SocketAddr, u16)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (addr, count) in candidates {
            let addr = addr.to_string();
            out.extend_from_slice(&(addr.len() as u16).to_le_bytes());
            out.extend_from_slice(addr.as_bytes());
            out.extend_from_slice(&count.to_le_bytes());
        }
        out
    }
}
