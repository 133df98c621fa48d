//! Targeted flood search for a specific identity.
//!
//! Request layout: `{target: 32}{ttl: u16 LE}[{u16 LE addr_len}{addr}]`.
//! The address suffix is the address the searching node can be reached at.
//! The originator cannot know its own externally visible address, so it
//! sends the request without one and the first relay fills in the sender's
//! observed transport address on its behalf.

use std::net::SocketAddr;

use lattice_peer::{CommandContext, CommandHandler, PeerNetwork};
use lattice_transport::DatagramSocket;
use lattice_types::PeerId;

use crate::cache::SearchCache;

/// Hop budget for a freshly originated search.
pub const INITIAL_TTL: u16 = 8;

/// Encode a `findpeer` request.
pub fn encode_findpeer(target: &PeerId, ttl: u16, addr: Option<&SocketAddr>) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 2);
    out.extend_from_slice(target.as_bytes());
    out.extend_from_slice(&ttl.to_le_bytes());
    if let Some(addr) = addr {
        let addr = addr.to_string();
        out.extend_from_slice(&(addr.len() as u16).to_le_bytes());
        out.extend_from_slice(addr.as_bytes());
    }
    out
}

/// Decode a `findpeer` request. `None` means the payload is malformed and
/// must be dropped silently.
pub fn decode_findpeer(payload: &[u8]) -> Option<(PeerId, u16, Option<SocketAddr>)> {
    if payload.len() < 34 {
        return None;
    }
    let target = PeerId::from_slice(&payload[0..32])?;
    let ttl = u16::from_le_bytes([payload[32], payload[33]]);
    let rest = &payload[34..];
    if rest.is_empty() {
        return Some((target, ttl, None));
    }
    if rest.len() < 2 {
        return None;
    }
    let addr_len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
    if rest.len() != 2 + addr_len {
        return None;
    }
    let addr = std::str::from_utf8(&rest[2..]).ok()?.parse().ok()?;
    Some((target, ttl, Some(addr)))
}

/// Handles `findpeer` requests: relay with loop suppression, or connect
/// back when the search is for us.
pub struct FindPeerHandler {
    cache: SearchCache,
}

impl FindPeerHandler {
    pub fn new() -> Self {
        Self {
            cache: SearchCache::new(),
        }
    }
}

impl Default for FindPeerHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler for FindPeerHandler {
    fn handle(&mut self, ctx: &mut CommandContext<'_>, payload: &[u8]) {
        let Some((target, ttl, claimed)) = decode_findpeer(payload) else {
            return;
        };
        let ttl = ttl.saturating_sub(1);
        if ttl == 0 {
            tracing::trace!(target = %target, "search expired (ttl)");
            return;
        }
        // A request without an address is from a direct neighbour that
        // cannot see its own externally visible address; we can.
        let claimed = claimed.unwrap_or(ctx.sender.addr);

        if self.cache.check_and_record(&target, claimed, ctx.now) {
            tracing::trace!(target = %target, %claimed, "search already handled, dropping");
            return;
        }

        if target == ctx.local_id {
            tracing::debug!(%claimed, "we are the search target, connecting back");
            ctx.connect(claimed);
        } else {
            tracing::trace!(target = %target, ttl, "relaying search");
            ctx.broadcast("findpeer", encode_findpeer(&target, ttl, Some(&claimed)));
        }
    }
}

/// Originate a search for `target`, asking it to connect back to us.
pub fn find_peer<S: DatagramSocket>(network: &mut PeerNetwork<S>, target: &PeerId) {
    network.send(None, "findpeer", &encode_findpeer(target, INITIAL_TTL, None));
}
