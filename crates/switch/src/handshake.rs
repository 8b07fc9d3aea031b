//! Line handshake and admission control
//!
//! Either side may open a line without prior coordination: each side offers
//! a random ring, and the line identifier is the product of both rings.
//! After the line has been stable for [`STRICT_AFTER_SECS`] the exact line
//! identifier becomes mandatory on every telex, and the byte budget bounds
//! how far a (possibly spoofed) peer can run ahead of our acknowledgements.
//!
//! Ring and line tokens may arrive in either order over UDP; both paths
//! converge on the same line identifier and fix it only once.

use tracing::trace;

use crate::line::{Line, RING_MAX};
use crate::telex::{HandshakeFields, Telex};

/// Seconds after establishment during which ringing is still tolerated.
pub const STRICT_AFTER_SECS: u64 = 10;

/// Bytes a peer may send beyond what we last acknowledged.
pub const MAX_UNACKED_BYTES: u64 = 12000;

/// Why an inbound telex was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Line is stable and the telex lacks the exact line token
    StrictLineMismatch,
    /// Line token arrived but we never offered a ring
    NoRingOffered,
    /// Line token is not positive
    InvalidLineToken,
    /// Line token conflicts with the established line
    LineConflict,
    /// Line token is not a multiple of our ring
    NotRingProduct,
    /// Second ring that disagrees with the recorded one
    RingConflict,
    /// Ring outside `(0, RING_MAX]`
    RingOutOfRange,
    /// Line token implies a ring too large to record
    ImpliedRingOverflow,
    /// Peer sent too far past our last acknowledgement
    FloodLimit,
}

/// Outcome of [`check`].
pub type Admission = Result<(), Rejection>;

/// Validate the handshake fields of an inbound telex against `line`.
///
/// Mutates `line` on acceptance and on partial progress: a line or ring
/// token may establish the line even if a later step rejects the telex.
pub fn check(line: &mut Line, fields: &HandshakeFields, bytes: u64, now: u64) -> Admission {
    // Stable lines require the exact line token, no more ringing.
    if line.line_established_at > 0
        && now.saturating_sub(line.line_established_at) > STRICT_AFTER_SECS
        && fields.line != Some(line.line_id as i64)
    {
        return Err(Rejection::StrictLineMismatch);
    }

    if let Some(token) = fields.line {
        if line.ring_out == 0 {
            return Err(Rejection::NoRingOffered);
        }
        if token <= 0 {
            return Err(Rejection::InvalidLineToken);
        }
        let token = token as u64;
        if line.line_id != 0 && token != line.line_id {
            return Err(Rejection::LineConflict);
        }
        let ring_out = u64::from(line.ring_out);
        if token % ring_out != 0 {
            return Err(Rejection::NotRingProduct);
        }
        if !line.is_established() {
            let ring_in =
                u32::try_from(token / ring_out).map_err(|_| Rejection::ImpliedRingOverflow)?;
            line.establish(ring_in, token, now);
        }
    }

    // Rings may trail the line token they produced.
    if let Some(ring) = fields.ring {
        if line.ring_in != 0 && ring != i64::from(line.ring_in) {
            return Err(Rejection::RingConflict);
        }
        if ring <= 0 || ring > RING_MAX {
            return Err(Rejection::RingOutOfRange);
        }
        if !line.is_established() {
            let ring_in = ring as u32;
            line.establish(ring_in, u64::from(ring_in) * u64::from(line.ring_out), now);
        }
    }

    line.bytes_received += bytes;
    if let Some(reported) = fields.br {
        line.bytes_received_last_reported = reported.max(0) as u64;
    }
    trace!(
        endpoint = %line.endpoint,
        received = line.bytes_received,
        acked = line.bytes_sent_last_acked,
        "Byte accounting"
    );

    if line.bytes_received.saturating_sub(line.bytes_sent_last_acked) > MAX_UNACKED_BYTES {
        return Err(Rejection::FloodLimit);
    }

    line.last_seen_at = now;
    Ok(())
}

/// Stamp the handshake fields of an outbound telex for `line`.
///
/// Established lines carry the line token, otherwise our ring is offered.
/// The byte count we report becomes our new acknowledgement mark.
pub fn stamp(line: &mut Line, telex: &mut Telex) {
    if line.is_established() {
        telex.line = Some(line.line_id as i64);
        telex.ring = None;
    } else {
        telex.ring = Some(i64::from(line.ring_out));
        telex.line = None;
    }
    telex.br = Some(line.bytes_received as i64);
    line.bytes_sent_last_acked = line.bytes_received;
}
