//! Normalization of EFA XML (and mobile JSON) responses.
//!
//! EFA responses are one big `itdRequest` document; the session and request
//! ids ride on the root element and every sub-request nests its own
//! resolution state. Parsing is a straight recursive descent over the tree:
//! anything the protocol guarantees but the document lacks is a
//! [`ParseError`], not a default.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use roxmltree::{Document, Node};
use tracing::warn;

use crate::classifier::RawLine;
use crate::context::{
    EfaPagination, QueryJourneyDetailContext, QueryTripsContext, RefreshTripContext,
};
use crate::domain::{
    Departure, Fare, FareType, IndividualLeg, IndividualType, Leg, Line, Location, LocationType,
    Point, Position, PublicLeg, StationDepartures, Stop, SuggestedLocation, Trip,
};
use crate::error::ParseError;
use crate::provider::{
    QueryDeparturesResult, QueryJourneyDetailResult, QueryTripsResult, SuggestLocationsResult,
};

use super::provider::EfaQuirks;
use super::types::{JsonPoint, JsonPoints, JsonStopFinderResponse};

// ---------------------------------------------------------------------------
// Tree-walking helpers

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn req_child<'a, 'i>(node: Node<'a, 'i>, name: &'static str) -> Result<Node<'a, 'i>, ParseError> {
    child(node, name).ok_or(ParseError::MissingField(name))
}

fn children<'a, 'i>(node: Node<'a, 'i>, name: &'a str) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(move |n| n.has_tag_name(name))
}

fn req_attr<'a>(node: Node<'a, '_>, name: &'static str) -> Result<&'a str, ParseError> {
    node.attribute(name).ok_or(ParseError::MissingField(name))
}

/// Attribute as trimmed non-empty text.
fn attr_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name).map(str::trim).filter(|s| !s.is_empty())
}

fn attr_i32(node: Node<'_, '_>, name: &'static str) -> Result<Option<i32>, ParseError> {
    match attr_text(node, name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ParseError::UnexpectedValue {
                field: name,
                value: raw.to_string(),
            }),
    }
}

/// The (sessionID, requestID) pair on the document root, when present.
fn session(doc: &Document<'_>) -> Option<EfaPagination> {
    let root = doc.root_element();
    Some(EfaPagination {
        session_id: attr_text(root, "sessionID")?.to_string(),
        request_id: attr_text(root, "requestID")?.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Dates, times, coordinates

/// An `itdDateTime` (or `itdRTDateTime`) element. A zeroed date marks
/// "no data" on several installations and maps to `None`.
fn parse_date_time(node: Node<'_, '_>) -> Result<Option<NaiveDateTime>, ParseError> {
    let date = req_child(node, "itdDate")?;
    let time = req_child(node, "itdTime")?;

    let year = attr_i32(date, "year")?.unwrap_or(0);
    let month = attr_i32(date, "month")?.unwrap_or(0);
    let day = attr_i32(date, "day")?.unwrap_or(0);
    if year <= 0 || month <= 0 || day <= 0 {
        return Ok(None);
    }

    let hour = attr_i32(time, "hour")?.unwrap_or(0);
    let minute = attr_i32(time, "minute")?.unwrap_or(0);

    let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .ok_or_else(|| ParseError::InvalidDate(format!("{year}-{month}-{day}")))?;
    // Hour 24 wraps into the next day on some installations.
    let (extra_days, hour) = if hour == 24 { (1, 0) } else { (0, hour) };
    let time = date
        .and_hms_opt(hour as u32, minute as u32, 0)
        .ok_or_else(|| ParseError::InvalidDate(format!("{hour}:{minute}")))?;
    Ok(Some(time + Duration::days(extra_days)))
}

/// Coordinates ride as `x` (longitude) / `y` (latitude) micro-degree
/// attributes. Some installations emit them with a decimal fraction.
fn coord_from_attrs(node: Node<'_, '_>) -> Option<Point> {
    let x = attr_text(node, "x")?;
    let y = attr_text(node, "y")?;
    let lon: f64 = x.parse().ok()?;
    let lat: f64 = y.parse().ok()?;
    if lon == 0.0 && lat == 0.0 {
        return None;
    }
    Some(Point::from_1e6(lat.round() as i32, lon.round() as i32))
}

/// An `itdCoordinateString` payload: whitespace-separated `lon,lat` pairs.
fn parse_coordinate_string(raw: &str) -> Result<Vec<Point>, ParseError> {
    let mut points = Vec::new();
    for pair in raw.split_whitespace() {
        let (lon, lat) = pair
            .split_once(',')
            .ok_or_else(|| ParseError::InvalidCoordinate(pair.to_string()))?;
        let lon: f64 = lon
            .parse()
            .map_err(|_| ParseError::InvalidCoordinate(pair.to_string()))?;
        let lat: f64 = lat
            .parse()
            .map_err(|_| ParseError::InvalidCoordinate(pair.to_string()))?;
        points.push(Point::from_1e6(lat.round() as i32, lon.round() as i32));
    }
    Ok(points)
}

/// Travelled path under an `itdPathCoordinates` child, if any.
fn parse_path(node: Node<'_, '_>) -> Result<Vec<Point>, ParseError> {
    let Some(path) = child(node, "itdPathCoordinates") else {
        return Ok(Vec::new());
    };
    let Some(coords) = child(path, "itdCoordinateString") else {
        return Ok(Vec::new());
    };
    parse_coordinate_string(coords.text().unwrap_or(""))
}

// ---------------------------------------------------------------------------
// Locations

fn location_type_from_any_type(
    any_type: Option<&str>,
    has_id: bool,
) -> Result<LocationType, ParseError> {
    match any_type {
        Some("stop") => Ok(LocationType::Station),
        Some("poi") => Ok(LocationType::Poi),
        Some("street" | "address" | "singlehouse" | "buildingname" | "loc" | "locality") => {
            Ok(LocationType::Address)
        }
        Some("coord") => Ok(LocationType::Coord),
        Some(other) => Err(ParseError::UnexpectedValue {
            field: "anyType",
            value: other.to_string(),
        }),
        None if has_id => Ok(LocationType::Station),
        None => Ok(LocationType::Any),
    }
}

fn location_from_odv_name_elem(node: Node<'_, '_>) -> Result<Location, ParseError> {
    let id = attr_text(node, "stateless").or_else(|| attr_text(node, "id"));
    let loc_type = location_type_from_any_type(attr_text(node, "anyType"), id.is_some())?;
    let coord = coord_from_attrs(node);
    let place = attr_text(node, "locality").map(str::to_owned);
    let name = node
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| attr_text(node, "objectName"))
        .map(str::to_owned);

    // An id-less "any" match keeps only its text; an id-less coord match
    // degenerates to the bare point.
    let id = match loc_type {
        LocationType::Any | LocationType::Coord => None,
        _ => id.map(str::to_owned),
    };
    Location::new(loc_type, id, coord, place, name, None)
        .map_err(|e| ParseError::Other(e.to_string()))
}

/// A leg endpoint or stop-sequence entry (`itdPoint`).
fn location_from_point(node: Node<'_, '_>) -> Result<Location, ParseError> {
    let id = attr_text(node, "stopID").filter(|id| *id != "0" && *id != "-1");
    let name = attr_text(node, "name").map(str::to_owned);
    let place = attr_text(node, "place")
        .or_else(|| attr_text(node, "locality"))
        .map(str::to_owned);
    let coord = coord_from_attrs(node);
    let loc_type = if id.is_some() {
        LocationType::Station
    } else if coord.is_some() {
        LocationType::Coord
    } else {
        LocationType::Any
    };
    Location::new(loc_type, id.map(str::to_owned), coord, place, name, None)
        .map_err(|e| ParseError::Other(e.to_string()))
}

// ---------------------------------------------------------------------------
// Odv slot resolution

enum OdvOutcome {
    Identified(Location),
    Ambiguous(Vec<Location>),
    Unknown,
}

/// Resolve one `itdOdv` request slot by its `itdOdvName` state.
fn resolve_odv(odv: Node<'_, '_>) -> Result<OdvOutcome, ParseError> {
    let name = req_child(odv, "itdOdvName")?;
    match req_attr(name, "state")? {
        "identified" => {
            let elem = req_child(name, "odvNameElem")?;
            Ok(OdvOutcome::Identified(location_from_odv_name_elem(elem)?))
        }
        "list" => {
            let candidates = children(name, "odvNameElem")
                .map(location_from_odv_name_elem)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(OdvOutcome::Ambiguous(candidates))
        }
        "notidentified" | "empty" => Ok(OdvOutcome::Unknown),
        other => Err(ParseError::UnexpectedValue {
            field: "itdOdvName state",
            value: other.to_string(),
        }),
    }
}

fn find_odv<'a, 'i>(parent: Node<'a, 'i>, usage: &str) -> Option<Node<'a, 'i>> {
    parent
        .children()
        .find(|n| n.has_tag_name("itdOdv") && n.attribute("usage") == Some(usage))
}

// ---------------------------------------------------------------------------
// Lines

/// Classify an `itdServingLine` element.
fn line_from_serving_line(node: Node<'_, '_>, quirks: &EfaQuirks) -> Line {
    let no_train = child(node, "itdNoTrain");
    let raw = RawLine {
        id: attr_text(node, "stateless"),
        network: quirks.network_id.as_deref(),
        mot: attr_text(node, "motType"),
        symbol: attr_text(node, "symbol"),
        name: attr_text(node, "number"),
        long_name: attr_text(node, "name"),
        train_type: attr_text(node, "trainType"),
        train_num: attr_text(node, "trainNum"),
        train_name: attr_text(node, "trainName")
            .or_else(|| no_train.and_then(|n| attr_text(n, "name"))),
    };
    let mut line = quirks.classify(&raw);
    if let Some(direction) = attr_text(node, "direction") {
        line.direction = Some(direction.to_string());
    }
    line
}

/// Classify an `itdMeansOfTransport` element of a public partial route.
fn line_from_means(node: Node<'_, '_>, quirks: &EfaQuirks) -> Line {
    let raw = RawLine {
        id: attr_text(node, "stateless"),
        network: quirks.network_id.as_deref(),
        mot: attr_text(node, "motType").or_else(|| attr_text(node, "type")),
        symbol: attr_text(node, "symbol").or_else(|| attr_text(node, "shortname")),
        name: attr_text(node, "shortname"),
        long_name: attr_text(node, "name"),
        train_type: attr_text(node, "trainType"),
        train_num: attr_text(node, "trainNum"),
        train_name: attr_text(node, "trainName"),
    };
    let mut line = quirks.classify(&raw);
    if let Some(direction) = attr_text(node, "destination") {
        line.direction = Some(direction.to_string());
    }
    line
}

// ---------------------------------------------------------------------------
// Stop finder

pub(crate) fn parse_stop_finder_xml(xml: &str) -> Result<SuggestLocationsResult, ParseError> {
    let doc = Document::parse(xml)?;
    let request = doc
        .descendants()
        .find(|n| n.has_tag_name("itdStopFinderRequest"))
        .ok_or(ParseError::MissingField("itdStopFinderRequest"))?;
    let odv = find_odv(request, "sf").ok_or(ParseError::MissingField("itdOdv"))?;
    let name = req_child(odv, "itdOdvName")?;

    let mut suggestions = Vec::new();
    match req_attr(name, "state")? {
        "identified" | "list" => {
            for elem in children(name, "odvNameElem") {
                let priority = attr_i32(elem, "matchQuality")?.unwrap_or(0);
                suggestions.push(SuggestedLocation {
                    location: location_from_odv_name_elem(elem)?,
                    priority,
                });
            }
        }
        "notidentified" | "empty" => {}
        other => {
            return Err(ParseError::UnexpectedValue {
                field: "itdOdvName state",
                value: other.to_string(),
            });
        }
    }
    suggestions.sort_by_key(|s| std::cmp::Reverse(s.priority));
    Ok(SuggestLocationsResult { suggestions })
}

fn location_from_json_point(point: &JsonPoint) -> Result<Location, ParseError> {
    let id = point.stateless.as_deref();
    let loc_type = location_type_from_any_type(point.point_type.as_deref(), id.is_some())?;
    let reference = point.reference.as_ref();
    let coord = reference
        .and_then(|r| r.coords.as_deref())
        .and_then(|coords| {
            let (lon, lat) = coords.split_once(',')?;
            Some(Point::from_1e6(
                lat.trim().parse::<f64>().ok()?.round() as i32,
                lon.trim().parse::<f64>().ok()?.round() as i32,
            ))
        });
    let place = point
        .posttown
        .clone()
        .or_else(|| reference.and_then(|r| r.place.clone()));
    let name = point.object.clone().or_else(|| point.name.clone());
    let id = match loc_type {
        LocationType::Any | LocationType::Coord => None,
        _ => id.map(str::to_owned),
    };
    Location::new(loc_type, id, coord, place, name, None)
        .map_err(|e| ParseError::Other(e.to_string()))
}

pub(crate) fn parse_stop_finder_json(body: &str) -> Result<SuggestLocationsResult, ParseError> {
    let response: JsonStopFinderResponse = serde_json::from_str(body)?;
    let finder = response.stop_finder;
    let points: Vec<JsonPoint> = match (finder.points, finder.point) {
        (Some(JsonPoints::List(list)), _) => list,
        (Some(JsonPoints::One { point }), _) => vec![point],
        (None, Some(point)) => vec![point],
        (None, None) => Vec::new(),
    };

    let mut suggestions = Vec::new();
    for point in &points {
        let priority = point
            .quality
            .as_ref()
            .and_then(|q| q.as_i64())
            .unwrap_or(0) as i32;
        suggestions.push(SuggestedLocation {
            location: location_from_json_point(point)?,
            priority,
        });
    }
    suggestions.sort_by_key(|s| std::cmp::Reverse(s.priority));
    Ok(SuggestLocationsResult { suggestions })
}

// ---------------------------------------------------------------------------
// Coord (nearby) request

pub(crate) fn parse_coord_locations(xml: &str) -> Result<Vec<Location>, ParseError> {
    let doc = Document::parse(xml)?;
    let info = doc
        .descendants()
        .find(|n| n.has_tag_name("itdCoordInfo"))
        .ok_or(ParseError::MissingField("itdCoordInfo"))?;
    let list = req_child(info, "coordInfoItemList")?;

    let mut locations = Vec::new();
    for item in children(list, "coordInfoItem") {
        let loc_type = match attr_text(item, "type") {
            Some("STOP") | None => LocationType::Station,
            Some("POI_POINT" | "POI_AREA") => LocationType::Poi,
            Some(other) => {
                return Err(ParseError::UnexpectedValue {
                    field: "coordInfoItem type",
                    value: other.to_string(),
                });
            }
        };
        let id = attr_text(item, "stateless")
            .or_else(|| attr_text(item, "id"))
            .map(str::to_owned);
        let coord = match parse_path(item)?.first() {
            Some(point) => Some(*point),
            None => coord_from_attrs(item),
        };
        let location = Location::new(
            loc_type,
            id,
            coord,
            attr_text(item, "locality").map(str::to_owned),
            attr_text(item, "name").map(str::to_owned),
            None,
        )
        .map_err(|e| ParseError::Other(e.to_string()))?;
        locations.push(location);
    }
    Ok(locations)
}

// ---------------------------------------------------------------------------
// Departure monitor

/// Realtime delay sentinel values.
const DELAY_CANCELLED: i32 = -9999;
const DELAY_UNKNOWN: i32 = -1;

fn departure_journey_context(
    departure: Node<'_, '_>,
    serving_line: Node<'_, '_>,
) -> Option<QueryJourneyDetailContext> {
    let station_id = attr_text(departure, "stopID")?;
    let trip_code = attr_text(serving_line, "key")?;
    Some(QueryJourneyDetailContext::Efa {
        station_id: station_id.to_string(),
        trip_code: trip_code.to_string(),
        line_id: attr_text(serving_line, "stateless").map(str::to_owned),
        time_offset: attr_text(departure, "countdown").and_then(|c| c.parse().ok()),
    })
}

fn parse_departure(
    node: Node<'_, '_>,
    quirks: &EfaQuirks,
) -> Result<Departure, ParseError> {
    let serving_line = req_child(node, "itdServingLine")?;
    let line = line_from_serving_line(serving_line, quirks);

    let planned = parse_date_time(req_child(node, "itdDateTime")?)?;
    let mut predicted = match child(node, "itdRTDateTime") {
        Some(rt) => parse_date_time(rt)?,
        None => None,
    };

    let delay = child(serving_line, "itdNoTrain")
        .map(|n| attr_i32(n, "delay"))
        .transpose()?
        .flatten();
    let mut message = None;
    match delay {
        Some(DELAY_CANCELLED) => {
            predicted = None;
            message = Some("Trip cancelled".to_string());
        }
        Some(DELAY_UNKNOWN) | None => {}
        Some(minutes) => {
            if predicted.is_none() {
                predicted = planned.map(|p| p + Duration::minutes(minutes.into()));
            }
        }
    }

    let destination = match attr_text(serving_line, "direction") {
        Some(direction) => Some(match attr_text(serving_line, "destID") {
            Some(id) if id != "0" => Location::new(
                LocationType::Station,
                Some(id.to_string()),
                None,
                None,
                Some(direction.to_string()),
                None,
            )
            .map_err(|e| ParseError::Other(e.to_string()))?,
            _ => Location::any(direction),
        }),
        None => None,
    };

    Ok(Departure {
        planned_time: planned,
        predicted_time: predicted,
        line,
        position: attr_text(node, "platformName").and_then(Position::parse),
        planned_position: attr_text(node, "platform").and_then(Position::parse),
        destination,
        capacity: None,
        message,
        journey_context: departure_journey_context(node, serving_line),
    })
}

pub(crate) fn parse_departures(
    xml: &str,
    quirks: &EfaQuirks,
    max_departures: usize,
) -> Result<QueryDeparturesResult, ParseError> {
    let doc = Document::parse(xml)?;
    // The mobile installations answer with the compact `<efa>` tree.
    if doc.root_element().has_tag_name("efa") {
        return parse_mobile_departures(&doc, quirks, max_departures);
    }
    let request = doc
        .descendants()
        .find(|n| n.has_tag_name("itdDepartureMonitorRequest"))
        .ok_or(ParseError::MissingField("itdDepartureMonitorRequest"))?;

    let odv = find_odv(request, "dm").ok_or(ParseError::MissingField("itdOdv"))?;
    let location = match resolve_odv(odv)? {
        OdvOutcome::Identified(location) => location,
        OdvOutcome::Ambiguous(_) | OdvOutcome::Unknown => {
            return Ok(QueryDeparturesResult::InvalidStation);
        }
    };

    // The serving-lines list is advisory; a malformed entry is skipped, not
    // fatal to the whole board.
    let mut lines: Vec<Line> = Vec::new();
    if let Some(serving_lines) = child(request, "itdServingLines") {
        for node in children(serving_lines, "itdServingLine") {
            let line = line_from_serving_line(node, quirks);
            if line.product.is_none() && line.label.is_none() {
                warn!("skipping unclassifiable serving line");
                continue;
            }
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
    }

    // An arrival board serves the same element shape under different names.
    let mut departures = Vec::new();
    let entries = child(request, "itdDepartureList")
        .into_iter()
        .flat_map(|list| children(list, "itdDeparture"))
        .chain(
            child(request, "itdArrivalList")
                .into_iter()
                .flat_map(|list| children(list, "itdArrival")),
        );
    for node in entries {
        if departures.len() >= max_departures && max_departures > 0 {
            break;
        }
        departures.push(parse_departure(node, quirks)?);
    }

    Ok(QueryDeparturesResult::Success(vec![StationDepartures {
        location,
        departures,
        lines,
    }]))
}

/// Trimmed non-empty text of a named child element.
fn elem_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Mobile timestamps split into a `yyyyMMdd` date and a `HHmm` time element.
fn parse_mobile_date_time(
    date: Option<&str>,
    time: Option<&str>,
) -> Result<Option<NaiveDateTime>, ParseError> {
    let (Some(date), Some(time)) = (date, time) else {
        return Ok(None);
    };
    NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M")
        .map(Some)
        .map_err(|_| ParseError::InvalidDate(format!("{date} {time}")))
}

/// The mobile compact tree: `<efa><dps><dp>` entries where `st` carries the
/// times, `m` the means of transport and `r` the stop reference.
fn parse_mobile_departures(
    doc: &Document<'_>,
    quirks: &EfaQuirks,
    max_departures: usize,
) -> Result<QueryDeparturesResult, ParseError> {
    let Some(dps) = doc.descendants().find(|n| n.has_tag_name("dps")) else {
        return Ok(QueryDeparturesResult::InvalidStation);
    };

    let mut location: Option<Location> = None;
    let mut departures = Vec::new();
    for dp in children(dps, "dp") {
        if departures.len() >= max_departures && max_departures > 0 {
            break;
        }
        let st = req_child(dp, "st")?;
        let planned = parse_mobile_date_time(elem_text(st, "da"), elem_text(st, "t"))?;
        let predicted = parse_mobile_date_time(elem_text(st, "rda"), elem_text(st, "rt"))?;

        let m = req_child(dp, "m")?;
        let line = quirks.classify(&RawLine {
            mot: elem_text(m, "co"),
            symbol: elem_text(m, "sy"),
            name: elem_text(m, "n"),
            train_num: elem_text(m, "nu"),
            train_name: elem_text(m, "ty"),
            ..RawLine::default()
        });

        let reference = child(dp, "r");
        if location.is_none()
            && let Some(id) = reference.and_then(|r| elem_text(r, "id"))
        {
            location =
                Some(Location::station(id).map_err(|e| ParseError::Other(e.to_string()))?);
        }

        departures.push(Departure {
            planned_time: planned,
            predicted_time: predicted,
            line,
            position: reference
                .and_then(|r| elem_text(r, "pl"))
                .and_then(Position::parse),
            planned_position: None,
            destination: elem_text(m, "des").map(Location::any),
            capacity: None,
            message: None,
            journey_context: None,
        });
    }

    let Some(location) = location else {
        return Ok(QueryDeparturesResult::InvalidStation);
    };
    Ok(QueryDeparturesResult::Success(vec![StationDepartures {
        location,
        departures,
        lines: Vec::new(),
    }]))
}

// ---------------------------------------------------------------------------
// Trips

/// Leg-level realtime state from `itdRBLControlled`.
struct RblState {
    departure_delay: Option<i32>,
    arrival_delay: Option<i32>,
}

impl RblState {
    /// The cancellation sentinel on either end cancels the whole leg.
    fn cancelled(&self) -> bool {
        self.departure_delay == Some(DELAY_CANCELLED)
            || self.arrival_delay == Some(DELAY_CANCELLED)
    }
}

fn parse_rbl(partial: Node<'_, '_>) -> Result<RblState, ParseError> {
    let Some(rbl) = child(partial, "itdRBLControlled") else {
        return Ok(RblState {
            departure_delay: None,
            arrival_delay: None,
        });
    };
    let departure_delay = attr_i32(rbl, "delayMinutes")?;
    let arrival_delay = attr_i32(rbl, "delayMinutesArr")?.or(departure_delay);
    Ok(RblState {
        departure_delay,
        arrival_delay,
    })
}

fn apply_delay(planned: Option<NaiveDateTime>, delay: Option<i32>) -> Option<NaiveDateTime> {
    match delay {
        Some(DELAY_CANCELLED) | Some(DELAY_UNKNOWN) | None => None,
        Some(minutes) => planned.map(|p| p + Duration::minutes(minutes.into())),
    }
}

/// A leg endpoint: location, planned time, platform.
fn parse_leg_point(
    point: Node<'_, '_>,
    departure: bool,
    delay: Option<i32>,
) -> Result<Stop, ParseError> {
    let location = location_from_point(point)?;
    let planned = match child(point, "itdDateTime") {
        Some(dt) => parse_date_time(dt)?,
        None => None,
    };
    let position = attr_text(point, "platformName")
        .or_else(|| attr_text(point, "platform"))
        .and_then(Position::parse);

    let mut stop = Stop::new(location);
    let cancelled = delay == Some(DELAY_CANCELLED);
    if departure {
        stop.planned_departure = planned;
        stop.predicted_departure = apply_delay(planned, delay);
        stop.planned_departure_position = position;
        stop.departure_cancelled = cancelled;
    } else {
        stop.planned_arrival = planned;
        stop.predicted_arrival = apply_delay(planned, delay);
        stop.planned_arrival_position = position;
        stop.arrival_cancelled = cancelled;
    }
    Ok(stop)
}

/// A stop-sequence entry carries up to two `itdDateTime` children:
/// arrival first, departure second. A single one serves as both.
fn parse_seq_stop(point: Node<'_, '_>, rbl: &RblState) -> Result<Stop, ParseError> {
    let mut stop = Stop::new(location_from_point(point)?);
    let times: Vec<Option<NaiveDateTime>> = children(point, "itdDateTime")
        .map(parse_date_time)
        .collect::<Result<_, _>>()?;
    match times.as_slice() {
        [] => {}
        [both] => {
            stop.planned_arrival = *both;
            stop.planned_departure = *both;
        }
        [arrival, departure, ..] => {
            stop.planned_arrival = *arrival;
            stop.planned_departure = *departure;
        }
    }
    // Leg-level delay propagates to stops without their own realtime data.
    stop.predicted_arrival = apply_delay(stop.planned_arrival, rbl.arrival_delay);
    stop.predicted_departure = apply_delay(stop.planned_departure, rbl.departure_delay);
    if let Some(position) = attr_text(point, "platformName").and_then(Position::parse) {
        stop.planned_arrival_position = Some(position.clone());
        stop.planned_departure_position = Some(position);
    }
    if rbl.cancelled() {
        stop.cancel();
    }
    Ok(stop)
}

/// The intermediate stops of a public leg. The sequence includes the leg
/// endpoints; they must match and are trimmed off.
fn parse_intermediate_stops(
    partial: Node<'_, '_>,
    departure: &Stop,
    arrival: &Stop,
    rbl: &RblState,
) -> Result<Vec<Stop>, ParseError> {
    let Some(seq) = child(partial, "itdStopSeq") else {
        return Ok(Vec::new());
    };
    let mut stops: Vec<Stop> = children(seq, "itdPoint")
        .map(|p| parse_seq_stop(p, rbl))
        .collect::<Result<_, _>>()?;
    if stops.is_empty() {
        return Ok(Vec::new());
    }
    if stops.len() < 2
        || stops[0].location != departure.location
        || stops[stops.len() - 1].location != arrival.location
    {
        return Err(ParseError::Other(
            "stop sequence does not span the leg endpoints".into(),
        ));
    }
    stops.remove(0);
    stops.pop();
    Ok(stops)
}

fn parse_info_texts(partial: Node<'_, '_>) -> Option<String> {
    let list = child(partial, "itdInfoTextList")?;
    let texts: Vec<&str> = children(list, "infoTextListElem")
        .filter_map(|n| n.text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

fn append_message(target: &mut Option<String>, extra: &str) {
    match target {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(extra);
        }
        None => *target = Some(extra.to_string()),
    }
}

/// One parsed partial route, before leg merging.
enum LegPiece {
    Public(Box<PublicLeg>),
    Individual(IndividualLeg),
    /// Type-97 "do not change" pseudo leg: a message for the neighbors.
    DoNotChange(Option<String>),
    /// Type-98 secured connection: carries no rider-visible information.
    Dropped,
}

fn parse_partial_route(
    partial: Node<'_, '_>,
    quirks: &EfaQuirks,
) -> Result<LegPiece, ParseError> {
    let means = req_child(partial, "itdMeansOfTransport")?;
    let type_raw = req_attr(means, "type")?;
    let type_code: i32 = type_raw.parse().map_err(|_| ParseError::UnexpectedValue {
        field: "itdMeansOfTransport type",
        value: type_raw.to_string(),
    })?;

    let rbl = parse_rbl(partial)?;
    let dep_point = partial
        .children()
        .find(|n| n.has_tag_name("itdPoint") && n.attribute("usage") == Some("departure"))
        .ok_or(ParseError::MissingField("itdPoint usage=departure"))?;
    let arr_point = partial
        .children()
        .find(|n| n.has_tag_name("itdPoint") && n.attribute("usage") == Some("arrival"))
        .ok_or(ParseError::MissingField("itdPoint usage=arrival"))?;

    match type_code {
        0..=16 => {
            let line = line_from_means(means, quirks);
            let mut departure = parse_leg_point(dep_point, true, rbl.departure_delay)?;
            let mut arrival = parse_leg_point(arr_point, false, rbl.arrival_delay)?;
            if rbl.cancelled() {
                departure.departure_cancelled = true;
                arrival.arrival_cancelled = true;
            }
            let intermediate_stops =
                parse_intermediate_stops(partial, &departure, &arrival, &rbl)?;
            let destination = match attr_text(means, "destination") {
                Some(direction) => Some(match attr_text(means, "destID") {
                    Some(id) if id != "0" => Location::new(
                        LocationType::Station,
                        Some(id.to_string()),
                        None,
                        None,
                        Some(direction.to_string()),
                        None,
                    )
                    .map_err(|e| ParseError::Other(e.to_string()))?,
                    _ => Location::any(direction),
                }),
                None => None,
            };
            let journey_context = departure
                .location
                .id()
                .zip(attr_text(means, "key"))
                .map(|(station_id, trip_code)| QueryJourneyDetailContext::Efa {
                    station_id: station_id.to_string(),
                    trip_code: trip_code.to_string(),
                    line_id: attr_text(means, "stateless").map(str::to_owned),
                    time_offset: None,
                });
            Ok(LegPiece::Public(Box::new(PublicLeg {
                line,
                destination,
                departure,
                arrival,
                intermediate_stops,
                message: parse_info_texts(partial),
                path: parse_path(partial)?,
                journey_context,
            })))
        }
        97 => Ok(LegPiece::DoNotChange(parse_info_texts(partial))),
        98 => Ok(LegPiece::Dropped),
        99 | 100 | 105 => {
            let kind = if type_code == 105 {
                IndividualType::Car
            } else {
                IndividualType::Walk
            };
            let departure = location_from_point(dep_point)?;
            let departure_time = child(dep_point, "itdDateTime")
                .map(parse_date_time)
                .transpose()?
                .flatten()
                .ok_or(ParseError::MissingField("itdDateTime"))?;
            let arrival = location_from_point(arr_point)?;
            let arrival_time = child(arr_point, "itdDateTime")
                .map(parse_date_time)
                .transpose()?
                .flatten()
                .ok_or(ParseError::MissingField("itdDateTime"))?;
            let distance_m = attr_i32(partial, "distance")?.unwrap_or(0).max(0) as u32;
            Ok(LegPiece::Individual(IndividualLeg {
                kind,
                departure,
                departure_time,
                arrival,
                arrival_time,
                distance_m,
                path: parse_path(partial)?,
            }))
        }
        other => Err(ParseError::UnexpectedValue {
            field: "itdMeansOfTransport type",
            value: other.to_string(),
        }),
    }
}

/// Fold leg pieces into the final chain: drop secured connections, merge
/// "do not change" messages into the preceding public leg, and splice
/// consecutive same-kind individual legs.
fn assemble_legs(pieces: Vec<LegPiece>) -> Vec<Leg> {
    let mut legs: Vec<Leg> = Vec::new();
    let mut pending_message: Option<String> = None;

    for piece in pieces {
        match piece {
            LegPiece::Dropped => {}
            LegPiece::DoNotChange(message) => {
                let text = message.unwrap_or_else(|| "Do not change".to_string());
                match legs.iter_mut().rev().find_map(|l| match l {
                    Leg::Public(p) => Some(p),
                    Leg::Individual(_) => None,
                }) {
                    Some(public) => append_message(&mut public.message, &text),
                    None => append_message(&mut pending_message, &text),
                }
            }
            LegPiece::Public(mut public) => {
                if let Some(text) = pending_message.take() {
                    append_message(&mut public.message, &text);
                }
                legs.push(Leg::Public(*public));
            }
            LegPiece::Individual(leg) => match legs.last_mut() {
                Some(Leg::Individual(previous)) if previous.kind == leg.kind => {
                    let merged = previous.clone().merged_with(leg);
                    *previous = merged;
                }
                _ => legs.push(Leg::Individual(leg)),
            },
        }
    }
    legs
}

fn parse_fares(route: Node<'_, '_>) -> Result<Vec<Fare>, ParseError> {
    let Some(fare) = child(route, "itdFare") else {
        return Ok(Vec::new());
    };
    let Some(ticket) = child(fare, "itdSingleTicket") else {
        return Ok(Vec::new());
    };
    let network = attr_text(ticket, "net").unwrap_or("").to_uppercase();
    let currency = attr_text(ticket, "currency").unwrap_or("EUR").to_string();
    let units_name = attr_text(ticket, "unitName").map(str::to_owned);

    let mut fares = Vec::new();
    let mut push = |fare_type: FareType, amount: Option<&str>, units: Option<&str>| {
        if let Some(amount) = amount
            && let Ok(value) = amount.parse::<f64>()
            && value > 0.0
        {
            fares.push(Fare {
                network: network.clone(),
                fare_type,
                currency: currency.clone(),
                fare: value,
                units_name: units_name.clone(),
                units: units.map(str::to_owned),
            });
        }
    };
    push(
        FareType::Adult,
        attr_text(ticket, "fareAdult"),
        attr_text(ticket, "unitsAdult"),
    );
    push(
        FareType::Child,
        attr_text(ticket, "fareChild"),
        attr_text(ticket, "unitsChild"),
    );
    Ok(fares)
}

/// Trip-request message codes that are outcomes, not errors.
const CODE_NO_TRIPS: &[i32] = &[-4000, -4001, -4002];
const CODE_SESSION_EXPIRED: i32 = -2;
const CODE_INVALID_DATE: i32 = -10;

pub(crate) fn parse_trips(
    xml: &str,
    quirks: &EfaQuirks,
    previous: Option<&QueryTripsContext>,
    queried: Option<bool>,
) -> Result<QueryTripsResult, ParseError> {
    let doc = Document::parse(xml)?;
    let session = session(&doc);
    let request = doc
        .descendants()
        .find(|n| n.has_tag_name("itdTripRequest"))
        .ok_or(ParseError::MissingField("itdTripRequest"))?;

    let mut messages: Vec<String> = Vec::new();
    for message in children(request, "itdMessage") {
        if let Some(code) = attr_i32(message, "code")? {
            if CODE_NO_TRIPS.contains(&code) {
                return Ok(QueryTripsResult::NoTrips);
            }
            if code == CODE_SESSION_EXPIRED {
                return Ok(QueryTripsResult::SessionExpired);
            }
            if code == CODE_INVALID_DATE {
                return Ok(QueryTripsResult::InvalidDate);
            }
        }
        // Anything that is not a recognized outcome code is a notice for
        // the whole answer.
        if let Some(text) = message.text().map(str::trim).filter(|t| !t.is_empty())
            && !messages.iter().any(|m| m == text)
        {
            messages.push(text.to_string());
        }
    }

    let origin = find_odv(request, "origin").ok_or(ParseError::MissingField("itdOdv origin"))?;
    let destination =
        find_odv(request, "destination").ok_or(ParseError::MissingField("itdOdv destination"))?;
    let via = find_odv(request, "via");

    let origin = resolve_odv(origin)?;
    let destination = resolve_odv(destination)?;
    let via = via.map(resolve_odv).transpose()?;

    if matches!(origin, OdvOutcome::Unknown) {
        return Ok(QueryTripsResult::UnknownFrom);
    }
    if matches!(via, Some(OdvOutcome::Unknown)) {
        return Ok(QueryTripsResult::UnknownVia);
    }
    if matches!(destination, OdvOutcome::Unknown) {
        return Ok(QueryTripsResult::UnknownTo);
    }

    // All ambiguous slots are reported in one answer; resolved slots ride
    // along as empty candidate lists.
    let ambiguous = matches!(origin, OdvOutcome::Ambiguous(_))
        || matches!(destination, OdvOutcome::Ambiguous(_))
        || matches!(via, Some(OdvOutcome::Ambiguous(_)));
    if ambiguous {
        let candidates = |outcome: OdvOutcome| match outcome {
            OdvOutcome::Ambiguous(list) => list,
            _ => Vec::new(),
        };
        return Ok(QueryTripsResult::Ambiguous {
            from: candidates(origin),
            via: via.map(candidates).unwrap_or_default(),
            to: candidates(destination),
        });
    }

    let (OdvOutcome::Identified(from), OdvOutcome::Identified(to)) = (origin, destination) else {
        unreachable!("unknown and ambiguous slots were handled above");
    };
    let via = match via {
        Some(OdvOutcome::Identified(location)) => Some(location),
        Some(_) => unreachable!("unknown and ambiguous slots were handled above"),
        None => None,
    };

    let mut trips = Vec::new();
    if let Some(itinerary) = child(request, "itdItinerary")
        && let Some(route_list) = child(itinerary, "itdRouteList")
    {
        for (index, route) in children(route_list, "itdRoute").enumerate() {
            let pieces: Vec<LegPiece> = child(route, "itdPartialRouteList")
                .map(|list| {
                    children(list, "itdPartialRoute")
                        .map(|p| parse_partial_route(p, quirks))
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?
                .unwrap_or_default();
            let legs = assemble_legs(pieces);
            if legs.is_empty() {
                continue;
            }
            let refresh_context = session.as_ref().map(|pair| RefreshTripContext::Efa {
                session_id: pair.session_id.clone(),
                request_id: pair.request_id.clone(),
                route_index: index as u32,
            });
            trips.push(Trip {
                id: String::new(),
                from: from.clone(),
                to: to.clone(),
                legs,
                fares: parse_fares(route)?,
                refresh_context,
            });
        }
    }

    if trips.is_empty() {
        return Ok(QueryTripsResult::NoTrips);
    }

    let context = session.map(|pair| QueryTripsContext::efa_merged(previous, pair, queried));
    Ok(QueryTripsResult::Success {
        context,
        from,
        via,
        to,
        trips,
        messages,
    })
}

// ---------------------------------------------------------------------------
// Journey detail

pub(crate) fn parse_journey_detail(
    xml: &str,
    quirks: &EfaQuirks,
) -> Result<QueryJourneyDetailResult, ParseError> {
    let doc = Document::parse(xml)?;
    let Some(request) = doc
        .descendants()
        .find(|n| n.has_tag_name("itdStopSeqCoordRequest"))
    else {
        return Ok(QueryJourneyDetailResult::InvalidId);
    };

    let line = match request
        .descendants()
        .find(|n| n.has_tag_name("itdServingLine") || n.has_tag_name("itdMeansOfTransport"))
    {
        Some(node) if node.has_tag_name("itdServingLine") => {
            line_from_serving_line(node, quirks)
        }
        Some(node) => line_from_means(node, quirks),
        None => return Ok(QueryJourneyDetailResult::InvalidId),
    };

    let rbl = RblState {
        departure_delay: None,
        arrival_delay: None,
    };
    let stops: Vec<Stop> = request
        .descendants()
        .filter(|n| n.has_tag_name("itdPoint"))
        .map(|p| parse_seq_stop(p, &rbl))
        .collect::<Result<_, _>>()?;
    if stops.len() < 2 {
        return Ok(QueryJourneyDetailResult::InvalidId);
    }

    let mut stops = stops;
    let arrival = stops.pop().ok_or(ParseError::MissingField("itdPoint"))?;
    let departure = stops.remove(0);
    let destination = line.direction.clone().map(Location::any);
    Ok(QueryJourneyDetailResult::Success(PublicLeg {
        line,
        destination,
        departure,
        arrival,
        intermediate_stops: stops,
        message: None,
        path: Vec::new(),
        journey_context: None,
    }))
}
