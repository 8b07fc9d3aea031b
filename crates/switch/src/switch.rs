//! Switch - session state machine and telex dispatch
//!
//! A switch starts OFFLINE, moves to SEEDING once it has asked a bootstrap
//! switch about itself, and becomes CONNECTED when the first reply tells it
//! which address the rest of the network sees it at. Every telex admitted
//! while connected is relayed to matching taps and then handed to the
//! registered extension handlers.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, trace};

use hashline_core::Config;

use crate::error::{SwitchError, SwitchResult};
use crate::handler::{HandlerRegistry, TelexHandler};
use crate::handlers::{EndHandler, SeeHandler, TapHandler, TapRule};
use crate::handshake::{self, Rejection};
use crate::identifier::Identifier;
use crate::line::unix_now;
use crate::router::DistanceRouter;
use crate::table::{LineRef, LineTable};
use crate::telex::{format_endpoint, Telex, END_KEY, HOP_KEY, POP_KEY, SEE_KEY, TAP_KEY};
use crate::transport::Transport;

/// Connection state of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStatus {
    Offline,
    Seeding,
    Connected,
}

/// What happened to an inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Arrived while offline
    Ignored,
    /// Undecodable, or a field had the wrong shape
    Malformed,
    /// Failed line admission
    Rejected(Rejection),
    /// Admitted and handed to this many handlers
    Delivered { handlers: usize },
}

/// Outcome of a liveness sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub purged: usize,
    pub pinged: usize,
}

#[derive(Debug)]
struct SelfState {
    status: SwitchStatus,
    endpoint: Option<SocketAddr>,
    id: Option<Identifier>,
}

/// A switch: line table, handler registry and outbound transport.
pub struct Switch {
    state: RwLock<SelfState>,
    lines: LineTable,
    handlers: HandlerRegistry,
    transport: Arc<dyn Transport>,
    max_hops: usize,
}

impl Switch {
    /// Create a switch with no handlers registered.
    pub fn new(transport: Arc<dyn Transport>, max_hops: usize) -> Self {
        Self {
            state: RwLock::new(SelfState {
                status: SwitchStatus::Offline,
                endpoint: None,
                id: None,
            }),
            lines: LineTable::new(),
            handlers: HandlerRegistry::new(),
            transport,
            max_hops,
        }
    }

    /// Create a switch with the `.see`, `.tap` and `+end` handlers.
    pub fn with_default_handlers(transport: Arc<dyn Transport>, max_hops: usize) -> SwitchResult<Self> {
        let switch = Self::new(transport, max_hops);
        switch.handlers.register(Arc::new(SeeHandler))?;
        switch.handlers.register(Arc::new(TapHandler))?;
        switch.handlers.register(Arc::new(EndHandler))?;
        Ok(switch)
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &Config) -> SwitchResult<Self> {
        Self::with_default_handlers(transport, config.routing.max_hops)
    }

    pub fn status(&self) -> SwitchResult<SwitchStatus> {
        Ok(self.state.read()?.status)
    }

    /// Our endpoint as seen by the network, once connected.
    pub fn self_endpoint(&self) -> SwitchResult<Option<SocketAddr>> {
        Ok(self.state.read()?.endpoint)
    }

    pub fn self_id(&self) -> SwitchResult<Option<Identifier>> {
        Ok(self.state.read()?.id)
    }

    pub fn lines(&self) -> &LineTable {
        &self.lines
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn router(&self) -> DistanceRouter<'_> {
        DistanceRouter::new(&self.lines, self.max_hops)
    }

    /// Nearest visible peers to `target` from our own vantage.
    ///
    /// Empty until connected.
    pub fn nearest_to(&self, target: &Identifier) -> SwitchResult<Vec<Identifier>> {
        match self.self_endpoint()? {
            Some(endpoint) => self.router().nearest_to(target, endpoint),
            None => Ok(Vec::new()),
        }
    }

    /// Ask `bootstrap` who is near it, which also makes it tell us our own
    /// address.
    pub fn seed(&self, bootstrap: SocketAddr) -> SwitchResult<()> {
        // Before sending, so a fast reply is not dropped as offline.
        self.state.write()?.status = SwitchStatus::Seeding;
        let telex = Telex::to(&bootstrap).with(END_KEY, Identifier::of(&bootstrap).to_string());
        self.send(telex)?;
        info!(bootstrap = %bootstrap, "Seeding");
        Ok(())
    }

    /// Stamp the handshake fields for the destination line and send.
    pub fn send(&self, mut telex: Telex) -> SwitchResult<()> {
        let to = telex.to_endpoint()?;
        let (line, _) = self.lines.get_or_create(to, unix_now())?;
        handshake::stamp(&mut *line.lock()?, &mut telex);
        let payload = telex.encode()?;
        trace!(to = %to, bytes = payload.len(), "Sending telex");
        self.transport.send(to, payload);
        Ok(())
    }

    /// Ping `endpoint` with our own identifier, opening a line to it.
    pub fn dial(&self, endpoint: SocketAddr) -> SwitchResult<()> {
        let self_id = self.self_id()?.ok_or(SwitchError::NotConnected)?;
        debug!(endpoint = %endpoint, "Dialing");
        self.send(Telex::to(&endpoint).with(END_KEY, self_id.to_string()))
    }

    /// Add `id` to our own line's neighbor cache.
    pub fn remember_neighbor(&self, id: Identifier) -> SwitchResult<bool> {
        let Some(self_id) = self.self_id()? else {
            return Ok(false);
        };
        if id == self_id {
            return Ok(false);
        }
        match self.lines.get(&self_id)? {
            Some(line) => Ok(line.lock()?.add_neighbor(id)),
            None => Ok(false),
        }
    }

    /// Handle one inbound datagram from `from`.
    pub fn receive(&self, from: SocketAddr, bytes: &[u8]) -> SwitchResult<Disposition> {
        let telex = match Telex::decode(bytes) {
            Ok(telex) => telex,
            Err(e) => {
                debug!(from = %from, error = %e, "Discarding undecodable telex");
                return Ok(Disposition::Malformed);
            }
        };
        trace!(from = %from, keys = ?telex.keys(), "Received telex");

        match self.status()? {
            SwitchStatus::Offline => {
                debug!(from = %from, "Offline, ignoring telex");
                Ok(Disposition::Ignored)
            }
            SwitchStatus::Seeding => self.complete_bootstrap(from, &telex, bytes.len()),
            SwitchStatus::Connected => self.process(from, &telex, bytes.len()),
        }
    }

    fn complete_bootstrap(&self, from: SocketAddr, telex: &Telex, len: usize) -> SwitchResult<Disposition> {
        let endpoint = match telex.to_endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                debug!(from = %from, error = %e, "Seed reply without a usable _to");
                return Ok(Disposition::Malformed);
            }
        };

        let fixed = {
            let mut state = self.state.write()?;
            // A concurrent reply may have completed the bootstrap already.
            if state.status == SwitchStatus::Seeding {
                let id = Identifier::of(&endpoint);
                state.status = SwitchStatus::Connected;
                state.endpoint = Some(endpoint);
                state.id = Some(id);
                info!(endpoint = %endpoint, id = %id, "Connected");
                true
            } else {
                false
            }
        };

        if fixed {
            let (line, _) = self.lines.get_or_create(endpoint, unix_now())?;
            line.lock()?.set_visible(true);
            if endpoint == from {
                info!("We're the seed");
            }
        }

        self.process(from, telex, len)
    }

    fn process(&self, from: SocketAddr, telex: &Telex, len: usize) -> SwitchResult<Disposition> {
        let handlers = self.handlers.matching(&telex.keys())?;
        // Validated before any line is touched so a malformed telex changes
        // nothing.
        for handler in &handlers {
            if let Err(e) = handler.validate(telex) {
                debug!(from = %from, handler = handler.name(), error = %e, "Discarding malformed telex");
                return Ok(Disposition::Malformed);
            }
        }

        let now = unix_now();
        let (line, _) = self.lines.get_or_create(from, now)?;

        let admission = handshake::check(&mut *line.lock()?, &telex.handshake_fields(), len as u64, now);
        if let Err(reason) = admission {
            trace!(from = %from, ?reason, "Telex not admitted");
            return Ok(Disposition::Rejected(reason));
        }

        self.relay_to_taps(from, telex)?;
        self.dispatch(&handlers, &line, telex)
    }

    fn dispatch(
        &self,
        handlers: &[Arc<dyn TelexHandler>],
        line: &LineRef,
        telex: &Telex,
    ) -> SwitchResult<Disposition> {
        let mut delivered = 0;
        for handler in handlers {
            match handler.handle(self, line, telex) {
                Ok(()) => delivered += 1,
                Err(e @ SwitchError::LockPoisoned(_)) => return Err(e),
                Err(e) => {
                    debug!(handler = handler.name(), error = %e, "Discarding telex");
                    return Ok(Disposition::Malformed);
                }
            }
        }
        Ok(Disposition::Delivered { handlers: delivered })
    }

    /// Relay the signals of `telex` to every other line with a matching tap.
    fn relay_to_taps(&self, from: SocketAddr, telex: &Telex) -> SwitchResult<usize> {
        if telex.get(HOP_KEY).is_some() {
            return Ok(0);
        }
        let self_endpoint = self.self_endpoint()?;

        let mut targets = Vec::new();
        for line in self.lines.lines()? {
            let line = line.lock()?;
            let endpoint = line.endpoint();
            if endpoint == from || Some(endpoint) == self_endpoint {
                continue;
            }
            if line.taps().iter().any(|rule| rule.matches(telex)) {
                targets.push(endpoint);
            }
        }

        for endpoint in &targets {
            let mut relayed = Telex::to(endpoint).with(HOP_KEY, 1);
            for (key, value) in telex.signals() {
                relayed.fields.insert(key.clone(), value.clone());
            }
            debug!(from = %from, to = %endpoint, "Relaying to tap");
            self.send(relayed)?;
        }
        Ok(targets.len())
    }

    /// Purge stale lines and, when connected, ping the survivors.
    ///
    /// Our own line is never purged. Each surviving line receives a `+end`
    /// for our identifier, a `.tap` for `+pop` signals addressed to us, and
    /// once per line a `.see` advertising our endpoint.
    pub fn scan_lines(&self, now: u64, timeout_secs: u64) -> SwitchResult<ScanReport> {
        let (status, self_endpoint, self_id) = {
            let state = self.state.read()?;
            (state.status, state.endpoint, state.id)
        };

        let mut report = ScanReport::default();
        let mut survivors = Vec::new();
        for id in self.lines.ids()? {
            if Some(id) == self_id {
                continue;
            }
            // Staleness is re-checked under the line lock so a datagram
            // arriving mid-sweep keeps its line.
            if let Some(line) = self.lines.remove_if(&id, |line| line.is_stale(now, timeout_secs))? {
                let line = line.lock()?;
                info!(endpoint = %line.endpoint(), last_seen_at = line.last_seen_at(), "Purged stale line");
                report.purged += 1;
            } else if let Some(line) = self.lines.get(&id)? {
                let endpoint = line.lock()?.endpoint();
                survivors.push((line, endpoint));
            }
        }

        let (SwitchStatus::Connected, Some(self_endpoint), Some(self_id)) = (status, self_endpoint, self_id) else {
            return Ok(report);
        };

        let tap = serde_json::to_value(vec![TapRule::signal(END_KEY, self_id.to_string(), &[POP_KEY])])?;
        for (line, endpoint) in survivors {
            let first_advert = {
                let mut line = line.lock()?;
                !std::mem::replace(&mut line.advertised, true)
            };
            let mut telex = Telex::to(&endpoint)
                .with(END_KEY, self_id.to_string())
                .with(TAP_KEY, tap.clone());
            if first_advert {
                telex = telex.with(SEE_KEY, vec![format_endpoint(&self_endpoint)]);
            }
            self.send(telex)?;
            report.pinged += 1;
        }

        debug!(purged = report.purged, pinged = report.pinged, "Scanned lines");
        Ok(report)
    }
}

impl std::fmt::Debug for Switch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switch")
            .field("state", &self.state)
            .field("lines", &self.lines.len().unwrap_or_default())
            .field("handlers", &self.handlers)
            .field("max_hops", &self.max_hops)
            .finish()
    }
}
