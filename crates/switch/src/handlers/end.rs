//! `+end` - discovery queries

use tracing::debug;

use crate::error::{SwitchError, SwitchResult};
use crate::handler::TelexHandler;
use crate::identifier::Identifier;
use crate::line::NEIGHBOR_CAP;
use crate::switch::Switch;
use crate::table::LineRef;
use crate::telex::{format_endpoint, Telex, END_KEY, SEE_KEY};

/// Answers "who is near this identifier?" with a `.see` list.
///
/// The answer ranks the router's result together with ourselves, so a peer
/// asking about our own identifier always learns our endpoint.
#[derive(Debug, Default)]
pub struct EndHandler;

impl TelexHandler for EndHandler {
    fn name(&self) -> &'static str {
        "end"
    }

    fn matching_keys(&self) -> &[&'static str] {
        &[END_KEY]
    }

    fn validate(&self, telex: &Telex) -> SwitchResult<()> {
        query_target(telex).map(|_| ())
    }

    fn handle(&self, switch: &Switch, line: &LineRef, telex: &Telex) -> SwitchResult<()> {
        let target = query_target(telex)?;
        let self_id = switch.self_id()?.ok_or(SwitchError::NotConnected)?;
        let sender = line.lock()?.endpoint();

        let mut nearest = switch.nearest_to(&target)?;
        if !nearest.contains(&self_id) {
            nearest.push(self_id);
        }
        nearest.sort_by_key(|id| target.distance(id));
        nearest.truncate(NEIGHBOR_CAP);

        let mut seen = Vec::with_capacity(nearest.len());
        for id in &nearest {
            if let Some(peer) = switch.lines().get(id)? {
                seen.push(format_endpoint(&peer.lock()?.endpoint()));
            }
        }

        debug!(sender = %sender, target = %target, answers = seen.len(), "Answering discovery query");
        switch.send(Telex::to(&sender).with(SEE_KEY, seen))
    }
}

fn query_target(telex: &Telex) -> SwitchResult<Identifier> {
    telex.str_field(END_KEY)?.parse()
}
