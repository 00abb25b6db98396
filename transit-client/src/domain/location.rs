//! Places: stations, points of interest, addresses, bare coordinates.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::line::Product;
use super::point::Point;

/// What kind of place a [`Location`] identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    /// A transit stop or station with a backend id.
    Station,
    /// A point of interest.
    Poi,
    /// A street address.
    Address,
    /// A bare coordinate with no backend identity.
    Coord,
    /// An unresolved free-text hint; the backend must disambiguate it.
    Any,
}

/// Error returned when a [`Location`] would violate its invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidLocation {
    #[error("location id must not be empty")]
    EmptyId,

    #[error("coord-typed location must carry coordinates")]
    CoordWithoutCoordinates,

    #[error("any-typed location must not carry an id")]
    AnyWithId,
}

/// A place, as identified by a transit backend.
///
/// Valid by construction: use [`Location::new`] or the shorthand
/// constructors. Equality prefers the backend id when both sides have one,
/// then falls back to type+place+name, then to exact coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawLocation", into = "RawLocation")]
pub struct Location {
    loc_type: LocationType,
    id: Option<String>,
    coord: Option<Point>,
    place: Option<String>,
    name: Option<String>,
    products: Option<Vec<Product>>,
}

impl Location {
    /// Construct a location, checking the type invariants.
    pub fn new(
        loc_type: LocationType,
        id: Option<String>,
        coord: Option<Point>,
        place: Option<String>,
        name: Option<String>,
        products: Option<Vec<Product>>,
    ) -> Result<Self, InvalidLocation> {
        if let Some(id) = &id
            && id.is_empty()
        {
            return Err(InvalidLocation::EmptyId);
        }
        if loc_type == LocationType::Coord && coord.is_none() {
            return Err(InvalidLocation::CoordWithoutCoordinates);
        }
        if loc_type == LocationType::Any && id.is_some() {
            return Err(InvalidLocation::AnyWithId);
        }
        Ok(Self {
            loc_type,
            id,
            coord,
            place,
            name,
            products,
        })
    }

    /// A station identified only by its backend id.
    pub fn station(id: impl Into<String>) -> Result<Self, InvalidLocation> {
        Location::new(
            LocationType::Station,
            Some(id.into()),
            None,
            None,
            None,
            None,
        )
    }

    /// A bare coordinate.
    pub fn coord(point: Point) -> Self {
        Self {
            loc_type: LocationType::Coord,
            id: None,
            coord: Some(point),
            place: None,
            name: None,
            products: None,
        }
    }

    /// An unresolved free-text hint.
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            loc_type: LocationType::Any,
            id: None,
            coord: None,
            place: None,
            name: Some(name.into()),
            products: None,
        }
    }

    pub fn loc_type(&self) -> LocationType {
        self.loc_type
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn point(&self) -> Option<Point> {
        self.coord
    }

    pub fn place(&self) -> Option<&str> {
        self.place.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn products(&self) -> Option<&[Product]> {
        self.products.as_deref()
    }

    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }

    pub fn has_coord(&self) -> bool {
        self.coord.is_some()
    }

    /// Whether the backend can use this location directly, without a
    /// disambiguation round trip first.
    pub fn is_identified(&self) -> bool {
        self.has_id() || self.has_coord()
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (&self.id, &other.id) {
            return a == b;
        }
        if self.loc_type == other.loc_type
            && self.place == other.place
            && self.name == other.name
            && (self.place.is_some() || self.name.is_some())
        {
            return true;
        }
        match (self.coord, other.coord) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Location {}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.place, &self.name) {
            (Some(place), Some(name)) => write!(f, "{place}, {name}"),
            (None, Some(name)) => f.write_str(name),
            _ => match (&self.id, &self.coord) {
                (Some(id), _) => f.write_str(id),
                (None, Some(coord)) => write!(f, "{coord}"),
                (None, None) => f.write_str("?"),
            },
        }
    }
}

/// Serialized shape; deserialization funnels through [`Location::new`] so
/// persisted contexts cannot smuggle in invalid locations.
#[derive(Serialize, Deserialize)]
struct RawLocation {
    #[serde(rename = "type")]
    loc_type: LocationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    coord: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    place: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    products: Option<Vec<Product>>,
}

impl TryFrom<RawLocation> for Location {
    type Error = InvalidLocation;

    fn try_from(raw: RawLocation) -> Result<Self, Self::Error> {
        Location::new(
            raw.loc_type,
            raw.id,
            raw.coord,
            raw.place,
            raw.name,
            raw.products,
        )
    }
}

impl From<Location> for RawLocation {
    fn from(loc: Location) -> Self {
        RawLocation {
            loc_type: loc.loc_type,
            id: loc.id,
            coord: loc.coord,
            place: loc.place,
            name: loc.name,
            products: loc.products,
        }
    }
}
