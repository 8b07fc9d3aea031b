//! Built-in extension handlers
//!
//! - `+end`: answer a discovery query with the nearest known endpoints
//! - `.see`: learn neighbors and visibility from an advertisement
//! - `.tap`: record a peer's standing tap rules

pub mod end;
pub mod see;
pub mod tap;

pub use end::EndHandler;
pub use see::SeeHandler;
pub use tap::{TapHandler, TapRule, MAX_TAP_RULES};
