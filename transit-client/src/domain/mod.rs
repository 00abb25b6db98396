//! The shared domain model.
//!
//! Every entity here is an immutable value object, created fresh per
//! response. Construction enforces the invariants (a coordinate location
//! must carry coordinates, ids may not be empty, ...), so any value that
//! exists is valid.

mod departure;
mod line;
mod location;
mod point;
mod position;
mod stop;
mod trip;

pub use departure::{Departure, StationDepartures, SuggestedLocation};
pub use line::{Line, LineAttr, Product};
pub use location::{InvalidLocation, Location, LocationType};
pub use point::Point;
pub use position::Position;
pub use stop::Stop;
pub use trip::{Fare, FareType, IndividualLeg, IndividualType, Leg, PublicLeg, Trip};
