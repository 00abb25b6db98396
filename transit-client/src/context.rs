//! Continuation contexts.
//!
//! These are the opaque token bundles that round-trip between query calls:
//! pagination cursors, trip-refresh reconstruction tokens and journey-detail
//! lookup tokens. Host applications serialize them between sessions, so the
//! serialized form carries an explicit protocol discriminant and must
//! round-trip exactly; malformed input fails deserialization instead of
//! producing a half-initialized context.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::Location;
use crate::provider::TripOptions;

/// An EFA session/request token pair for one pagination direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EfaPagination {
    pub session_id: String,
    pub request_id: String,
}

/// Continuation for `query_more_trips`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum QueryTripsContext {
    /// EFA keeps server-side session state; paging is a stateful
    /// continuation keyed by (session, request) per direction.
    Efa {
        earlier: Option<EfaPagination>,
        later: Option<EfaPagination>,
    },

    /// A HAFAS "more" call is a fresh search replay: it needs the original
    /// query parameters plus the scroll cursor of the requested direction.
    /// A missing cursor means that direction is exhausted.
    Hafas {
        from: Location,
        #[serde(skip_serializing_if = "Option::is_none")]
        via: Option<Location>,
        to: Location,
        when: NaiveDateTime,
        dep: bool,
        options: TripOptions,
        #[serde(skip_serializing_if = "Option::is_none")]
        earlier_cursor: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        later_cursor: Option<String>,
    },
}

impl QueryTripsContext {
    pub fn can_query_earlier(&self) -> bool {
        match self {
            QueryTripsContext::Efa { earlier, .. } => earlier.is_some(),
            QueryTripsContext::Hafas { earlier_cursor, .. } => earlier_cursor.is_some(),
        }
    }

    pub fn can_query_later(&self) -> bool {
        match self {
            QueryTripsContext::Efa { later, .. } => later.is_some(),
            QueryTripsContext::Hafas { later_cursor, .. } => later_cursor.is_some(),
        }
    }

    /// Fold a freshly returned EFA (session, request) pair into a context.
    ///
    /// On the initial search (`queried = None`) both directions start from
    /// the new pair. On a "query more" call only the direction actually
    /// queried is replaced; the opposite direction's token is carried
    /// forward untouched, so paging can continue both ways indefinitely.
    pub fn efa_merged(
        previous: Option<&QueryTripsContext>,
        pair: EfaPagination,
        queried: Option<bool>,
    ) -> QueryTripsContext {
        match (previous, queried) {
            (Some(QueryTripsContext::Efa { earlier, .. }), Some(true)) => {
                QueryTripsContext::Efa {
                    earlier: earlier.clone(),
                    later: Some(pair),
                }
            }
            (Some(QueryTripsContext::Efa { later, .. }), Some(false)) => {
                QueryTripsContext::Efa {
                    earlier: Some(pair),
                    later: later.clone(),
                }
            }
            _ => QueryTripsContext::Efa {
                earlier: Some(pair.clone()),
                later: Some(pair),
            },
        }
    }
}

/// Continuation for `refresh_trip`: re-fetch one already-returned trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum RefreshTripContext {
    /// EFA re-selects the trip by its index within the session's result.
    Efa {
        session_id: String,
        request_id: String,
        route_index: u32,
    },

    /// HAFAS reconstructs the trip from an opaque token.
    Hafas { reconstruction_token: String },
}

/// Continuation for `query_journey_detail`: the full stop sequence of one
/// vehicle run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum QueryJourneyDetailContext {
    /// EFA addresses a run by stop, trip code and line.
    Efa {
        station_id: String,
        trip_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        line_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_offset: Option<i32>,
    },

    /// HAFAS addresses a run by an opaque journey id.
    Hafas { journey_id: String },
}
