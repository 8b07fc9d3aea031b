//! Line - per-peer session record
//!
//! Tracks the handshake counters, byte accounting, neighbor cache and
//! visibility of one remote endpoint. Lines are owned by the
//! [`LineTable`](crate::table::LineTable) and mutated through the handshake
//! validator, the distance router and the extension handlers.

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::handlers::tap::TapRule;
use crate::identifier::Identifier;

/// Maximum number of identifiers kept in a line's neighbor cache.
pub const NEIGHBOR_CAP: usize = 5;

/// Upper bound (inclusive) of a valid ring token.
pub const RING_MAX: i64 = 32768;

/// Bounded set of identifiers believed to be nearest to a line's endpoint.
///
/// When full, a new identifier displaces the entry farthest from the owner
/// only if it is strictly closer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborSet {
    entries: Vec<Identifier>,
}

impl NeighborSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `id`; returns `true` if the set changed.
    pub fn insert(&mut self, owner: &Identifier, id: Identifier) -> bool {
        if self.entries.contains(&id) {
            return false;
        }
        if self.entries.len() < NEIGHBOR_CAP {
            self.entries.push(id);
            return true;
        }

        let farthest = self
            .entries
            .iter()
            .enumerate()
            .max_by_key(|(_, entry)| owner.distance(entry))
            .map(|(idx, entry)| (idx, owner.distance(entry)));

        match farthest {
            Some((idx, dist)) if owner.distance(&id) < dist => {
                self.entries[idx] = id;
                true
            }
            _ => false,
        }
    }

    /// Replace the whole set with the first [`NEIGHBOR_CAP`] distinct ids.
    pub fn replace_with<I: IntoIterator<Item = Identifier>>(&mut self, ids: I) {
        self.entries.clear();
        for id in ids {
            if self.entries.len() == NEIGHBOR_CAP {
                break;
            }
            if !self.entries.contains(&id) {
                self.entries.push(id);
            }
        }
    }

    pub fn remove(&mut self, id: &Identifier) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry != id);
        before != self.entries.len()
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.entries.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Identifier> {
        self.entries.clone()
    }
}

/// Session state for one remote endpoint.
#[derive(Debug, Clone)]
pub struct Line {
    pub(crate) endpoint: SocketAddr,
    pub(crate) end: Identifier,
    pub(crate) line_id: u64,
    pub(crate) line_established_at: u64,
    pub(crate) ring_out: u32,
    pub(crate) ring_in: u32,
    pub(crate) bytes_received: u64,
    pub(crate) bytes_received_last_reported: u64,
    pub(crate) bytes_sent_last_acked: u64,
    pub(crate) last_seen_at: u64,
    pub(crate) created_at: u64,
    pub(crate) visible: bool,
    pub(crate) advertised: bool,
    pub(crate) neighbors: NeighborSet,
    pub(crate) taps: Vec<TapRule>,
}

impl Line {
    /// Create an unestablished line with a caller-chosen ring.
    ///
    /// Lines owned by a switch come from
    /// [`LineTable::get_or_create`](crate::table::LineTable::get_or_create),
    /// which keeps rings unique across live lines.
    pub fn with_ring(endpoint: SocketAddr, ring_out: u32, now: u64) -> Self {
        Self {
            endpoint,
            end: Identifier::of(&endpoint),
            line_id: 0,
            line_established_at: 0,
            ring_out,
            ring_in: 0,
            bytes_received: 0,
            bytes_received_last_reported: 0,
            bytes_sent_last_acked: 0,
            last_seen_at: 0,
            created_at: now,
            visible: false,
            advertised: false,
            neighbors: NeighborSet::new(),
            taps: Vec::new(),
        }
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn end(&self) -> &Identifier {
        &self.end
    }

    pub fn line_id(&self) -> u64 {
        self.line_id
    }

    pub fn line_established_at(&self) -> u64 {
        self.line_established_at
    }

    pub fn is_established(&self) -> bool {
        self.line_established_at > 0
    }

    pub fn ring_out(&self) -> u32 {
        self.ring_out
    }

    pub fn ring_in(&self) -> u32 {
        self.ring_in
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn bytes_received_last_reported(&self) -> u64 {
        self.bytes_received_last_reported
    }

    pub fn bytes_sent_last_acked(&self) -> u64 {
        self.bytes_sent_last_acked
    }

    pub fn last_seen_at(&self) -> u64 {
        self.last_seen_at
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn neighbors(&self) -> &NeighborSet {
        &self.neighbors
    }

    /// Add `id` to this line's neighbor cache, subject to the cap.
    pub fn add_neighbor(&mut self, id: Identifier) -> bool {
        let owner = self.end;
        self.neighbors.insert(&owner, id)
    }

    pub fn taps(&self) -> &[TapRule] {
        &self.taps
    }

    /// Fix the line identifier. Has no effect once the line is established.
    pub(crate) fn establish(&mut self, ring_in: u32, line_id: u64, now: u64) {
        if self.is_established() {
            return;
        }
        self.ring_in = ring_in;
        self.line_id = line_id;
        // A zero timestamp would read as "unestablished".
        self.line_established_at = now.max(1);
    }

    /// Silent for longer than `timeout_secs`, or never heard from and
    /// created more than `timeout_secs` ago.
    pub fn is_stale(&self, now: u64, timeout_secs: u64) -> bool {
        let reference = if self.last_seen_at == 0 {
            self.created_at
        } else {
            self.last_seen_at
        };
        now.saturating_sub(reference) > timeout_secs
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
