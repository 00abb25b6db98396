//! Departure-board entities.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::context::QueryJourneyDetailContext;

use super::line::Line;
use super::location::Location;
use super::position::Position;

/// A single departure (or arrival) event at a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Departure {
    pub planned_time: Option<NaiveDateTime>,
    pub predicted_time: Option<NaiveDateTime>,
    pub line: Line,
    pub position: Option<Position>,
    pub planned_position: Option<Position>,
    pub destination: Option<Location>,
    /// Load factor 0..=100 where the backend reports one.
    pub capacity: Option<u32>,
    pub message: Option<String>,
    pub journey_context: Option<QueryJourneyDetailContext>,
}

impl Departure {
    /// Best known time, preferring real-time data.
    pub fn time(&self) -> Option<NaiveDateTime> {
        self.predicted_time.or(self.planned_time)
    }
}

/// All departures observed at one station, with the serving lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationDepartures {
    pub location: Location,
    pub departures: Vec<Departure>,
    /// Deduplicated by (product, label).
    pub lines: Vec<Line>,
}

/// A location suggestion with its backend-assigned quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedLocation {
    pub location: Location,
    /// Higher is better; used to order suggestion lists.
    pub priority: i32,
}
