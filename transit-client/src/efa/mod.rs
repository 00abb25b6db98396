//! The EFA protocol family.
//!
//! EFA backends answer XML (`XML_TRIP_REQUEST2`, `XML_DM_REQUEST`,
//! `XML_STOPFINDER_REQUEST`, `XML_COORD_REQUEST`) plus a compact JSON
//! variant of the stop finder used by mobile deployments. Sessions are
//! server-side: paging and refresh continue a (sessionID, requestID) pair
//! instead of replaying the search.

mod parse;
mod provider;
mod types;

pub use provider::{EfaEndpoints, EfaProvider, EfaQuirks};
