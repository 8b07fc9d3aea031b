//! `.see` - neighbor advertisements

use std::net::SocketAddr;
use tracing::{debug, trace};

use crate::error::{SwitchError, SwitchResult};
use crate::handler::TelexHandler;
use crate::identifier::Identifier;
use crate::switch::Switch;
use crate::table::LineRef;
use crate::telex::{parse_endpoint, Telex, SEE_KEY};

/// Learns from a list of endpoints the sender claims to know.
///
/// The sender listing itself makes it visible and a neighbor of ours. Every
/// other endpoint except our own joins the sender's neighbor cache, and
/// endpoints we have no line to yet are dialed.
#[derive(Debug, Default)]
pub struct SeeHandler;

impl TelexHandler for SeeHandler {
    fn name(&self) -> &'static str {
        "see"
    }

    fn matching_keys(&self) -> &[&'static str] {
        &[SEE_KEY]
    }

    fn validate(&self, telex: &Telex) -> SwitchResult<()> {
        seen_endpoints(telex).map(|_| ())
    }

    fn handle(&self, switch: &Switch, line: &LineRef, telex: &Telex) -> SwitchResult<()> {
        let seen = seen_endpoints(telex)?;
        let (sender, sender_id) = {
            let line = line.lock()?;
            (line.endpoint(), *line.end())
        };
        let self_endpoint = switch.self_endpoint()?;

        for endpoint in seen {
            if Some(endpoint) == self_endpoint {
                continue;
            }
            if endpoint == sender {
                line.lock()?.set_visible(true);
                if switch.remember_neighbor(sender_id)? {
                    debug!(sender = %sender, "Sender advertised itself");
                }
                continue;
            }

            let id = Identifier::of(&endpoint);
            line.lock()?.add_neighbor(id);
            if !switch.lines().contains(&id)? {
                trace!(sender = %sender, endpoint = %endpoint, "Dialing advertised endpoint");
                switch.dial(endpoint)?;
            }
        }
        Ok(())
    }
}

/// Parse the whole list up front so a bad entry leaves no partial effects.
fn seen_endpoints(telex: &Telex) -> SwitchResult<Vec<SocketAddr>> {
    telex
        .array_field(SEE_KEY)?
        .iter()
        .map(|entry| {
            let raw = entry.as_str().ok_or_else(|| SwitchError::MalformedField {
                field: SEE_KEY.to_string(),
                reason: format!("expected ip:port strings, got {entry}"),
            })?;
            parse_endpoint(raw)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::DEFAULT_MAX_HOPS;
    use crate::telex::END_KEY;
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use std::sync::Arc;

    const ME: &str = "127.0.0.1:5000";
    const SENDER: &str = "127.0.0.1:6000";

    fn connected() -> (Switch, Arc<MemoryTransport>, LineRef) {
        let transport = Arc::new(MemoryTransport::new());
        let switch = Switch::new(transport.clone(), DEFAULT_MAX_HOPS);
        switch.seed("127.0.0.1:1".parse().unwrap()).unwrap();
        let reply = Telex::decode(format!(r#"{{"_to":"{ME}"}}"#).as_bytes()).unwrap();
        switch
            .receive("127.0.0.1:1".parse().unwrap(), &reply.encode().unwrap())
            .unwrap();
        let (line, _) = switch.lines().get_or_create(SENDER.parse().unwrap(), 1).unwrap();
        transport.take();
        (switch, transport, line)
    }

    #[test]
    fn test_sender_listing_itself_becomes_visible_neighbor() {
        let (switch, _, line) = connected();
        let telex = Telex::default().with(SEE_KEY, json!([SENDER]));

        SeeHandler.handle(&switch, &line, &telex).unwrap();

        assert!(line.lock().unwrap().is_visible());
        let own = switch.lines().get_by_endpoint(&ME.parse().unwrap()).unwrap().unwrap();
        assert!(own
            .lock()
            .unwrap()
            .neighbors()
            .contains(&Identifier::of_str(SENDER)));
    }

    #[test]
    fn test_other_endpoints_join_sender_cache_and_get_dialed() {
        let (switch, transport, line) = connected();
        let other: SocketAddr = "127.0.0.1:6001".parse().unwrap();
        let telex = Telex::default().with(SEE_KEY, json!([ME, "127.0.0.1:6001"]));

        SeeHandler.handle(&switch, &line, &telex).unwrap();

        let cached = line.lock().unwrap().neighbors().to_vec();
        assert_eq!(cached, vec![Identifier::of(&other)]);
        assert!(!line.lock().unwrap().is_visible());

        let sent = transport.take_telexes();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, other);
        assert_eq!(
            sent[0].1.str_field(END_KEY).unwrap(),
            Identifier::of_str(ME).to_string()
        );
        assert!(switch.lines().contains(&Identifier::of(&other)).unwrap());
    }

    #[test]
    fn test_known_endpoints_are_not_redialed() {
        let (switch, transport, line) = connected();
        switch
            .lines()
            .get_or_create("127.0.0.1:6001".parse().unwrap(), 1)
            .unwrap();

        let telex = Telex::default().with(SEE_KEY, json!(["127.0.0.1:6001"]));
        SeeHandler.handle(&switch, &line, &telex).unwrap();
        assert!(transport.take().is_empty());
    }

    #[test]
    fn test_bad_entry_has_no_partial_effect() {
        let (switch, transport, line) = connected();
        let telex = Telex::default().with(SEE_KEY, json!(["127.0.0.1:6001", 42]));

        assert!(matches!(
            SeeHandler.handle(&switch, &line, &telex),
            Err(SwitchError::MalformedField { .. })
        ));
        assert!(line.lock().unwrap().neighbors().is_empty());
        assert!(transport.take().is_empty());

        let unparsable = Telex::default().with(SEE_KEY, json!(["somewhere"]));
        assert!(matches!(
            SeeHandler.handle(&switch, &line, &unparsable),
            Err(SwitchError::InvalidEndpoint(_))
        ));
        assert!(SeeHandler.validate(&unparsable).is_err());
        assert!(SeeHandler.validate(&Telex::default().with(SEE_KEY, 42)).is_err());
        assert!(SeeHandler
            .validate(&Telex::default().with(SEE_KEY, json!(["127.0.0.1:6001"])))
            .is_ok());
    }
}
