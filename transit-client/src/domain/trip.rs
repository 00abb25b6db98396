//! Trips, legs and fares.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::context::{QueryJourneyDetailContext, RefreshTripContext};

use super::line::Line;
use super::location::Location;
use super::point::Point;
use super::stop::Stop;

/// One continuous segment of a trip on a single vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicLeg {
    pub line: Line,
    /// Headsign destination, where the backend supplied one.
    pub destination: Option<Location>,
    pub departure: Stop,
    pub arrival: Stop,
    /// Stops strictly between departure and arrival, in travel order.
    pub intermediate_stops: Vec<Stop>,
    pub message: Option<String>,
    /// Travelled path snapshot; not necessarily restartable.
    pub path: Vec<Point>,
    /// Token to fetch the full journey detail for this vehicle run.
    pub journey_context: Option<QueryJourneyDetailContext>,
}

impl PublicLeg {
    pub fn departure_time(&self) -> Option<NaiveDateTime> {
        self.departure.departure_time()
    }

    pub fn arrival_time(&self) -> Option<NaiveDateTime> {
        self.arrival.arrival_time()
    }

    /// Whether either end of the leg is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.departure.departure_cancelled || self.arrival.arrival_cancelled
    }
}

/// How an individual (non-vehicle) leg is covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndividualType {
    Walk,
    Bike,
    Car,
    Transfer,
}

/// A leg covered without a scheduled vehicle: walking, cycling, driving,
/// or an in-station transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualLeg {
    pub kind: IndividualType,
    pub departure: Location,
    pub departure_time: NaiveDateTime,
    pub arrival: Location,
    pub arrival_time: NaiveDateTime,
    pub distance_m: u32,
    pub path: Vec<Point>,
}

impl IndividualLeg {
    /// Extend this leg with a directly following leg of the same kind.
    ///
    /// Backends split a single walk into several around synthetic markers;
    /// the merged leg keeps the first departure and last arrival and
    /// concatenates the paths.
    pub fn merged_with(mut self, next: IndividualLeg) -> IndividualLeg {
        self.arrival = next.arrival;
        self.arrival_time = next.arrival_time;
        self.distance_m += next.distance_m;
        self.path.extend(next.path);
        self
    }
}

/// A segment of an itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "leg", rename_all = "lowercase")]
pub enum Leg {
    Public(PublicLeg),
    Individual(IndividualLeg),
}

impl Leg {
    pub fn departure_time(&self) -> Option<NaiveDateTime> {
        match self {
            Leg::Public(leg) => leg.departure_time(),
            Leg::Individual(leg) => Some(leg.departure_time),
        }
    }

    pub fn arrival_time(&self) -> Option<NaiveDateTime> {
        match self {
            Leg::Public(leg) => leg.arrival_time(),
            Leg::Individual(leg) => Some(leg.arrival_time),
        }
    }

    pub fn departure_location(&self) -> &Location {
        match self {
            Leg::Public(leg) => &leg.departure.location,
            Leg::Individual(leg) => &leg.departure,
        }
    }

    pub fn arrival_location(&self) -> &Location {
        match self {
            Leg::Public(leg) => &leg.arrival.location,
            Leg::Individual(leg) => &leg.arrival,
        }
    }

    pub fn path(&self) -> &[Point] {
        match self {
            Leg::Public(leg) => &leg.path,
            Leg::Individual(leg) => &leg.path,
        }
    }
}

/// Rider category a fare applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FareType {
    Adult,
    Child,
    Bike,
}

/// A price for one trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fare {
    pub network: String,
    pub fare_type: FareType,
    /// ISO 4217 code.
    pub currency: String,
    pub fare: f64,
    /// Zone-system unit name ("Zonen", "Ringe"), if any.
    pub units_name: Option<String>,
    pub units: Option<String>,
}

/// A complete itinerary from one location to another.
///
/// The `id` is often empty: trip identity is not stable across
/// earlier/later pagination because the backend's route indices shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub from: Location,
    pub to: Location,
    /// Continuous chain: each leg's arrival feeds the next leg's departure.
    pub legs: Vec<Leg>,
    pub fares: Vec<Fare>,
    pub refresh_context: Option<RefreshTripContext>,
}

impl Trip {
    pub fn departure_time(&self) -> Option<NaiveDateTime> {
        self.legs.first().and_then(Leg::departure_time)
    }

    pub fn arrival_time(&self) -> Option<NaiveDateTime> {
        self.legs.last().and_then(Leg::arrival_time)
    }

    pub fn first_public_leg(&self) -> Option<&PublicLeg> {
        self.legs.iter().find_map(|leg| match leg {
            Leg::Public(p) => Some(p),
            Leg::Individual(_) => None,
        })
    }

    /// Number of vehicle changes: public legs minus one, floored at zero.
    pub fn num_changes(&self) -> usize {
        self.legs
            .iter()
            .filter(|leg| matches!(leg, Leg::Public(_)))
            .count()
            .saturating_sub(1)
    }
}
