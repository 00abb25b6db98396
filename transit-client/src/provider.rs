//! The public query surface and its closed result types.
//!
//! Every backend answer a caller must handle differently — ambiguous
//! location, no trips, expired session — is a result variant, not an error.
//! Only transport failures and wire-contract violations travel as `Err`.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::context::{QueryJourneyDetailContext, QueryTripsContext, RefreshTripContext};
use crate::domain::{
    Location, LocationType, Product, PublicLeg, StationDepartures, SuggestedLocation, Trip,
};
use crate::error::Error;

/// What a trip search should optimize for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Optimize {
    LeastDuration,
    LeastChanges,
    LeastWalking,
}

/// Assumed walking pace for footway legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkSpeed {
    Slow,
    Normal,
    Fast,
}

/// Barrier-free routing requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    Neutral,
    Limited,
    Barrier,
}

/// Boolean trip-search switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripFlag {
    Bike,
    NoSolidStairs,
    NoEscalators,
    NoElevators,
}

/// Options for a trip search. Serializable because the HAFAS "query more"
/// replay carries the original options inside its continuation context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripOptions {
    /// Allowed products; `None` means all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<BTreeSet<Product>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize: Option<Optimize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub walk_speed: Option<WalkSpeed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<Accessibility>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub flags: BTreeSet<TripFlag>,
    /// Minimum change time in minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_change_time: Option<u32>,
}

/// Answer to [`TransitProvider::suggest_locations`].
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestLocationsResult {
    /// Ordered by descending priority.
    pub suggestions: Vec<SuggestedLocation>,
}

/// Answer to [`TransitProvider::query_nearby_locations`].
#[derive(Debug, Clone, PartialEq)]
pub enum NearbyLocationsResult {
    Success(Vec<Location>),
    InvalidStation,
}

/// Answer to a trip search, "query more" or refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTripsResult {
    Success {
        /// Absent only when the backend returned no continuation tokens.
        context: Option<QueryTripsContext>,
        from: Location,
        via: Option<Location>,
        to: Location,
        trips: Vec<Trip>,
        /// Response-level notices that apply to the whole answer rather
        /// than a single leg.
        messages: Vec<String>,
    },

    /// One or more endpoints matched several places. Slots that resolved
    /// uniquely carry empty candidate lists; the caller re-prompts for the
    /// ambiguous ones. Never a partial success.
    Ambiguous {
        from: Vec<Location>,
        via: Vec<Location>,
        to: Vec<Location>,
    },

    /// Origin and destination are too close to route between.
    TooClose,

    UnknownFrom,
    UnknownVia,
    UnknownTo,

    /// The backend searched and found nothing. A valid answer.
    NoTrips,

    /// The backend rejected the requested date.
    InvalidDate,

    /// The continuation tokens no longer identify server-side state.
    SessionExpired,
}

/// Answer to [`TransitProvider::query_departures`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryDeparturesResult {
    Success(Vec<StationDepartures>),
    InvalidStation,
}

/// Answer to [`TransitProvider::query_journey_detail`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryJourneyDetailResult {
    Success(PublicLeg),
    InvalidId,
}

/// The query surface every protocol engine implements.
///
/// Engines are concrete types generic over [`crate::transport::Transport`];
/// this trait exists so application code can be written against either
/// protocol family.
pub trait TransitProvider {
    /// Autocomplete locations matching a free-text constraint.
    fn suggest_locations(
        &self,
        constraint: &str,
        types: Option<&[LocationType]>,
        max_results: usize,
    ) -> impl Future<Output = Result<SuggestLocationsResult, Error>> + Send;

    /// Stations (or other locations) around a point.
    fn query_nearby_locations(
        &self,
        location: &Location,
        types: Option<&[LocationType]>,
        max_distance_m: u32,
        max_results: usize,
    ) -> impl Future<Output = Result<NearbyLocationsResult, Error>> + Send;

    /// Search trips between two (optionally three) locations.
    fn query_trips(
        &self,
        from: &Location,
        via: Option<&Location>,
        to: &Location,
        when: NaiveDateTime,
        dep: bool,
        options: &TripOptions,
    ) -> impl Future<Output = Result<QueryTripsResult, Error>> + Send;

    /// Page an earlier/later window of a previous trip search.
    fn query_more_trips(
        &self,
        context: &QueryTripsContext,
        later: bool,
    ) -> impl Future<Output = Result<QueryTripsResult, Error>> + Send;

    /// Re-fetch a single previously returned trip with current real-time data.
    fn refresh_trip(
        &self,
        context: &RefreshTripContext,
    ) -> impl Future<Output = Result<QueryTripsResult, Error>> + Send;

    /// The station board: departures when `departures` is true, arrivals
    /// otherwise.
    fn query_departures(
        &self,
        station_id: &str,
        departures: bool,
        when: Option<NaiveDateTime>,
        max_departures: usize,
        equivs: bool,
    ) -> impl Future<Output = Result<QueryDeparturesResult, Error>> + Send;

    /// The full stop sequence of one vehicle run.
    fn query_journey_detail(
        &self,
        context: &QueryJourneyDetailContext,
    ) -> impl Future<Output = Result<QueryJourneyDetailResult, Error>> + Send;
}
