//! Extension handler contract and registry
//!
//! Handlers declare the telex keys they care about; the switch hands every
//! admitted telex to each handler whose keys intersect the telex's keys, in
//! registration order. Several handlers may match the same telex, and all
//! of them validate it before any of them runs.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::SwitchResult;
use crate::switch::Switch;
use crate::table::LineRef;
use crate::telex::Telex;

/// Payload-specific logic plugged into a [`Switch`].
pub trait TelexHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Keys this handler wants to see.
    fn matching_keys(&self) -> &[&'static str];

    /// Check the shape of the keys this handler reads.
    ///
    /// Runs for every matching handler before the telex touches any line;
    /// an error discards the telex.
    fn validate(&self, _telex: &Telex) -> SwitchResult<()> {
        Ok(())
    }

    /// Process a telex admitted on `line`.
    ///
    /// An error discards the rest of the telex's dispatch.
    fn handle(&self, switch: &Switch, line: &LineRef, telex: &Telex) -> SwitchResult<()>;

    fn matches(&self, keys: &BTreeSet<&str>) -> bool {
        self.matching_keys().iter().any(|key| keys.contains(key))
    }
}

/// Token returned by [`HandlerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Ordered, runtime-mutable list of handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Vec<(HandlerId, Arc<dyn TelexHandler>)>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Arc<dyn TelexHandler>) -> SwitchResult<HandlerId> {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write()?.push((id, handler));
        Ok(id)
    }

    /// Remove a handler; returns `false` if it was not registered.
    pub fn deregister(&self, id: HandlerId) -> SwitchResult<bool> {
        let mut handlers = self.handlers.write()?;
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        Ok(handlers.len() != before)
    }

    /// Handlers matching `keys`, in registration order.
    ///
    /// Returns a snapshot so handlers may (de)register while being run.
    pub fn matching(&self, keys: &BTreeSet<&str>) -> SwitchResult<Vec<Arc<dyn TelexHandler>>> {
        Ok(self
            .handlers
            .read()?
            .iter()
            .filter(|(_, handler)| handler.matches(keys))
            .map(|(_, handler)| handler.clone())
            .collect())
    }

    pub fn len(&self) -> SwitchResult<usize> {
        Ok(self.handlers.read()?.len())
    }

    pub fn is_empty(&self) -> SwitchResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&'static str> = self
            .handlers
            .read()
            .map(|handlers| handlers.iter().map(|(_, h)| h.name()).collect())
            .unwrap_or_default();
        f.debug_struct("HandlerRegistry").field("handlers", &names).finish()
    }
}
