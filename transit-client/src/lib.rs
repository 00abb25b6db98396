//! Client library for heterogeneous public-transit backends.
//!
//! Two wire-protocol families are supported: the EFA XML/JSON family
//! (endpoints like `XML_TRIP_REQUEST2`) and the HAFAS client interface
//! (the `mgate.exe` JSON envelope). Both are normalized into one shared
//! domain model (locations, lines, trips, legs, departures, fares), so
//! callers never see protocol-specific shapes.
//!
//! Key characteristics:
//! - All query results are closed enums: backend answers that need caller
//!   handling (ambiguous location, no trips, session expired, ...) are
//!   variants, not errors. Transport and parse failures are `Err`.
//! - Pagination and refresh round-trip through serializable continuation
//!   contexts; the host application may persist them between sessions.
//! - Normalization itself is synchronous and side-effect-free; only the
//!   [`transport::Transport`] seam performs IO.

pub mod classifier;
pub mod context;
pub mod domain;
pub mod efa;
pub mod error;
pub mod hafas;
pub mod polyline;
pub mod provider;
pub mod transport;

pub use context::{QueryJourneyDetailContext, QueryTripsContext, RefreshTripContext};
pub use error::{Error, ParseError};
pub use provider::{
    NearbyLocationsResult, QueryDeparturesResult, QueryJourneyDetailResult, QueryTripsResult,
    SuggestLocationsResult, TransitProvider, TripOptions,
};
pub use transport::{FetchResponse, HttpTransport, Transport, TransportError};
