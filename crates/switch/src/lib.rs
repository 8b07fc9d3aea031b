//! Hashline Switch - self-organizing overlay of UDP switches
//!
//! Every switch is addressed by the BLAKE3 hash of the `ip:port` the rest of
//! the network sees it at. Switches exchange JSON telexes over UDP, keep one
//! [`Line`] per peer, and find each other with a greedy XOR-distance walk
//! over the small neighbor caches those lines carry.
//!
//! # Core Components
//!
//! - **Identifiers**: endpoint hashes and the XOR distance metric
//! - **Line Table**: concurrent per-peer session records
//! - **Handshake**: ring/line token negotiation and flood limiting
//! - **Distance Router**: nearest-neighbor walk and neighbor linking
//! - **Switch**: OFFLINE/SEEDING/CONNECTED state machine and handler dispatch
//! - **Node**: tokio runtime driving a switch over a UDP socket
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use hashline_core::Config;
//! use hashline_switch::Node;
//!
//! # async fn run() -> Result<(), hashline_switch::SwitchError> {
//! let mut config = Config::default_config();
//! config.network.seed = Some("203.0.113.10:42424".to_string());
//!
//! let handle = Node::bind(config).await?.start()?;
//! println!("Status: {:?}", handle.switch().status()?);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod handler;
pub mod handlers;
pub mod handshake;
pub mod identifier;
pub mod line;
pub mod node;
pub mod router;
pub mod switch;
pub mod table;
pub mod telex;
pub mod transport;

pub use error::{SwitchError, SwitchResult};
pub use handler::{HandlerId, HandlerRegistry, TelexHandler};
pub use handlers::{EndHandler, SeeHandler, TapHandler, TapRule};
pub use handshake::{Admission, Rejection};
pub use identifier::Identifier;
pub use line::{Line, NeighborSet};
pub use node::{Node, NodeHandle};
pub use router::{DistanceRouter, Walk};
pub use switch::{Disposition, ScanReport, Switch, SwitchStatus};
pub use table::{LineRef, LineTable};
pub use telex::{format_endpoint, parse_endpoint, Telex};
pub use transport::{MemoryTransport, Transport, UdpTransport};
