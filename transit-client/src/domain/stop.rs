//! A single stop within a journey.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::location::Location;
use super::position::Position;

/// One stop of a public-transit leg: where, when (planned and predicted,
/// independently for arrival and departure), and on which platform.
///
/// A missing predicted time means "no real-time data"; cancellation is a
/// separate signal and never inferred from missing predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub location: Location,

    pub planned_arrival: Option<NaiveDateTime>,
    pub predicted_arrival: Option<NaiveDateTime>,
    pub planned_arrival_position: Option<Position>,
    pub predicted_arrival_position: Option<Position>,
    pub arrival_cancelled: bool,

    pub planned_departure: Option<NaiveDateTime>,
    pub predicted_departure: Option<NaiveDateTime>,
    pub planned_departure_position: Option<Position>,
    pub predicted_departure_position: Option<Position>,
    pub departure_cancelled: bool,

    pub message: Option<String>,
}

impl Stop {
    /// A stop with no time or platform data yet.
    pub fn new(location: Location) -> Self {
        Self {
            location,
            planned_arrival: None,
            predicted_arrival: None,
            planned_arrival_position: None,
            predicted_arrival_position: None,
            arrival_cancelled: false,
            planned_departure: None,
            predicted_departure: None,
            planned_departure_position: None,
            predicted_departure_position: None,
            departure_cancelled: false,
            message: None,
        }
    }

    /// Best known arrival time, preferring real-time data.
    pub fn arrival_time(&self) -> Option<NaiveDateTime> {
        self.predicted_arrival.or(self.planned_arrival)
    }

    /// Best known departure time, preferring real-time data.
    pub fn departure_time(&self) -> Option<NaiveDateTime> {
        self.predicted_departure.or(self.planned_departure)
    }

    /// Best known arrival platform, preferring real-time data.
    pub fn arrival_position(&self) -> Option<&Position> {
        self.predicted_arrival_position
            .as_ref()
            .or(self.planned_arrival_position.as_ref())
    }

    /// Best known departure platform, preferring real-time data.
    pub fn departure_position(&self) -> Option<&Position> {
        self.predicted_departure_position
            .as_ref()
            .or(self.planned_departure_position.as_ref())
    }

    /// Mark both halves of the stop cancelled.
    pub fn cancel(&mut self) {
        self.arrival_cancelled = true;
        self.departure_cancelled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn stop() -> Stop {
        Stop::new(Location::station("de:08111:6056").unwrap())
    }

    #[test]
    fn predicted_preferred_over_planned() {
        let mut s = stop();
        s.planned_departure = Some(dt(10, 0));
        assert_eq!(s.departure_time(), Some(dt(10, 0)));

        s.predicted_departure = Some(dt(10, 5));
        assert_eq!(s.departure_time(), Some(dt(10, 5)));
    }

    #[test]
    fn no_realtime_means_none_predicted() {
        let mut s = stop();
        s.planned_arrival = Some(dt(9, 30));
        assert!(s.predicted_arrival.is_none());
        assert!(!s.arrival_cancelled);
        assert_eq!(s.arrival_time(), Some(dt(9, 30)));
    }

    #[test]
    fn cancellation_is_independent_of_prediction() {
        let mut s = stop();
        s.planned_departure = Some(dt(10, 0));
        s.departure_cancelled = true;
        // Cancelled but with no real-time estimate: both facts hold.
        assert!(s.predicted_departure.is_none());
        assert!(s.departure_cancelled);
    }

    #[test]
    fn position_preference() {
        let mut s = stop();
        s.planned_departure_position = Position::parse("Gleis 4");
        assert_eq!(s.departure_position().unwrap().name(), "4");
        s.predicted_departure_position = Position::parse("Gleis 7");
        assert_eq!(s.departure_position().unwrap().name(), "7");
    }

    #[test]
    fn cancel_marks_both() {
        let mut s = stop();
        s.cancel();
        assert!(s.arrival_cancelled && s.departure_cancelled);
    }
}
