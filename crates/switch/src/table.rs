//! Line table - concurrent Identifier -> Line mapping
//!
//! The map itself sits behind a read/write lock while every line carries its
//! own mutex, so concurrent datagrams from different peers only contend on
//! the brief map lookup.

use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::SwitchResult;
use crate::identifier::Identifier;
use crate::line::{Line, RING_MAX};

/// Shared handle to one line.
pub type LineRef = Arc<Mutex<Line>>;

/// Draws attempted before accepting a ring already held by a live line.
const RING_DRAW_ATTEMPTS: usize = 64;

#[derive(Debug, Default)]
struct Inner {
    lines: HashMap<Identifier, LineRef>,
    rings_in_use: HashSet<u32>,
}

/// Lines indexed by end identifier.
#[derive(Debug, Default)]
pub struct LineTable {
    inner: RwLock<Inner>,
}

impl LineTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Identifier) -> SwitchResult<Option<LineRef>> {
        Ok(self.inner.read()?.lines.get(id).cloned())
    }

    pub fn get_by_endpoint(&self, endpoint: &SocketAddr) -> SwitchResult<Option<LineRef>> {
        self.get(&Identifier::of(endpoint))
    }

    pub fn contains(&self, id: &Identifier) -> SwitchResult<bool> {
        Ok(self.inner.read()?.lines.contains_key(id))
    }

    /// Fetch the line for `endpoint`, creating it if absent.
    ///
    /// Returns the line and whether it was created by this call.
    pub fn get_or_create(&self, endpoint: SocketAddr, now: u64) -> SwitchResult<(LineRef, bool)> {
        let id = Identifier::of(&endpoint);
        if let Some(line) = self.inner.read()?.lines.get(&id) {
            return Ok((line.clone(), false));
        }

        let mut inner = self.inner.write()?;
        // Another datagram may have created it between the two locks.
        if let Some(line) = inner.lines.get(&id) {
            return Ok((line.clone(), false));
        }

        let ring_out = draw_ring(&inner.rings_in_use);
        inner.rings_in_use.insert(ring_out);
        let line = Arc::new(Mutex::new(Line::with_ring(endpoint, ring_out, now)));
        inner.lines.insert(id, line.clone());
        debug!(endpoint = %endpoint, id = %id, ring_out, "Created line");
        Ok((line, true))
    }

    /// Insert a prepared line, replacing any line for the same endpoint.
    pub fn insert(&self, line: Line) -> SwitchResult<LineRef> {
        let id = *line.end();
        let ring_out = line.ring_out();
        let line = Arc::new(Mutex::new(line));
        let mut inner = self.inner.write()?;
        if let Some(previous) = inner.lines.insert(id, line.clone()) {
            let previous_ring = previous.lock()?.ring_out();
            inner.rings_in_use.remove(&previous_ring);
        }
        inner.rings_in_use.insert(ring_out);
        Ok(line)
    }

    pub fn remove(&self, id: &Identifier) -> SwitchResult<Option<LineRef>> {
        let mut inner = self.inner.write()?;
        let removed = inner.lines.remove(id);
        if let Some(line) = &removed {
            let ring_out = line.lock()?.ring_out();
            inner.rings_in_use.remove(&ring_out);
        }
        Ok(removed)
    }

    /// Remove the line only if `condition` holds for it.
    ///
    /// The condition is evaluated under the map write lock and the line's
    /// own lock, so no update to the line can land between the check and the
    /// removal.
    pub fn remove_if<F>(&self, id: &Identifier, condition: F) -> SwitchResult<Option<LineRef>>
    where
        F: FnOnce(&Line) -> bool,
    {
        let mut inner = self.inner.write()?;
        let Some(line) = inner.lines.get(id).cloned() else {
            return Ok(None);
        };
        let ring_out = {
            let guard = line.lock()?;
            if !condition(&guard) {
                return Ok(None);
            }
            guard.ring_out()
        };
        inner.lines.remove(id);
        inner.rings_in_use.remove(&ring_out);
        Ok(Some(line))
    }

    /// Snapshot of every line handle.
    pub fn lines(&self) -> SwitchResult<Vec<LineRef>> {
        Ok(self.inner.read()?.lines.values().cloned().collect())
    }

    /// Snapshot of every identifier.
    pub fn ids(&self) -> SwitchResult<Vec<Identifier>> {
        Ok(self.inner.read()?.lines.keys().copied().collect())
    }

    pub fn len(&self) -> SwitchResult<usize> {
        Ok(self.inner.read()?.lines.len())
    }

    pub fn is_empty(&self) -> SwitchResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn draw_ring(in_use: &HashSet<u32>) -> u32 {
    let mut rng = rand::thread_rng();
    let mut ring = rng.gen_range(1..=RING_MAX) as u32;
    for _ in 0..RING_DRAW_ATTEMPTS {
        if !in_use.contains(&ring) {
            return ring;
        }
        ring = rng.gen_range(1..=RING_MAX) as u32;
    }
    warn!(ring, live = in_use.len(), "Ring space crowded, reusing a live ring");
    ring
}
