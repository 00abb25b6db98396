//! Normalization of HAFAS client-interface responses.
//!
//! All entity cross-references are eagerly resolved against the `common`
//! lookup tables while parsing; an index outside its table is a
//! [`ParseError::IndexOutOfRange`], never a silently skipped entity.
//! Backend error codes split into expected outcomes (no trips, too close,
//! bad location) and genuine contract violations.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::context::{QueryJourneyDetailContext, QueryTripsContext, RefreshTripContext};
use crate::domain::{
    Departure, Fare, FareType, IndividualLeg, IndividualType, Leg, Line, LineAttr, Location,
    LocationType, Point, Position, PublicLeg, StationDepartures, Stop, SuggestedLocation, Trip,
};
use crate::error::ParseError;
use crate::polyline;
use crate::provider::{
    NearbyLocationsResult, QueryDeparturesResult, QueryJourneyDetailResult, QueryTripsResult,
    SuggestLocationsResult, TripOptions,
};

use super::provider::HafasQuirks;
use super::types::{
    Common, HafasResponse, Jny, JnyStop, Loc, OutCon, Pltf, Prod, Rem, Res, Sec,
};

// ---------------------------------------------------------------------------
// Envelope

/// Backend error codes that are outcomes rather than failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    NoTrips,
    TooClose,
    InvalidDate,
    SessionExpired,
    Location,
}

fn classify_err(code: &str) -> Option<Failure> {
    match code {
        "H890" | "H891" | "H892" | "H9220" | "H9240" => Some(Failure::NoTrips),
        "H895" | "H9380" => Some(Failure::TooClose),
        "H9360" => Some(Failure::InvalidDate),
        "LOCATION" => Some(Failure::Location),
        "CGI_READ_FAILED" | "CGI_NO_SERVER" | "H_UNKNOWN" => Some(Failure::SessionExpired),
        _ => None,
    }
}

pub(crate) enum Extracted {
    Res(Box<Res>),
    Failed(Failure),
}

/// Unwrap the envelope down to the result of the requested method.
pub(crate) fn extract_res(body: &str, meth: &str) -> Result<Extracted, ParseError> {
    let response: HafasResponse = serde_json::from_str(body)?;

    let check = |err: Option<&str>, err_txt: Option<&str>| -> Result<(), Result<Failure, ParseError>> {
        match err {
            None | Some("OK") => Ok(()),
            Some(code) => match classify_err(code) {
                Some(failure) => Err(Ok(failure)),
                None => Err(Err(ParseError::UnexpectedValue {
                    field: "err",
                    value: format!("{code}: {}", err_txt.unwrap_or("")),
                })),
            },
        }
    };

    if let Err(outcome) = check(response.err.as_deref(), response.err_txt.as_deref()) {
        return outcome.map(Extracted::Failed);
    }
    let svc = response
        .svc_res_l
        .into_iter()
        .find(|s| s.meth == meth)
        .ok_or(ParseError::MissingField("svcResL"))?;
    if let Err(outcome) = check(svc.err.as_deref(), svc.err_txt.as_deref()) {
        return outcome.map(Extracted::Failed);
    }
    let res = svc.res.ok_or(ParseError::MissingField("res"))?;
    Ok(Extracted::Res(Box::new(res)))
}

// ---------------------------------------------------------------------------
// Lookup tables

/// A `remL` entry after classification.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Remark {
    Attr(LineAttr),
    StopCancelled,
    TripCancelled,
    Text(String),
}

fn remark_from_rem(rem: &Rem) -> Remark {
    match rem.code.as_deref() {
        Some("OB" | "RO") => return Remark::Attr(LineAttr::WheelchairAccess),
        Some("FB") => return Remark::Attr(LineAttr::BicycleCarriage),
        Some("BR") => return Remark::Attr(LineAttr::Restaurant),
        Some("WV" | "WI") => return Remark::Attr(LineAttr::Wifi),
        Some("KL") => return Remark::Attr(LineAttr::AirConditioned),
        Some("LS") => return Remark::Attr(LineAttr::PowerSockets),
        _ => {}
    }
    match rem.rem_type.as_deref() {
        Some("C") => Remark::StopCancelled,
        Some("P") => Remark::TripCancelled,
        _ => {
            let mut text = rem.txt_n.clone().unwrap_or_default();
            if !text.is_empty() && !text.ends_with(['.', '!', '?']) {
                text.push('.');
            }
            Remark::Text(text)
        }
    }
}

fn location_from_loc(loc: &Loc, quirks: &HafasQuirks) -> Result<Location, ParseError> {
    let coord = loc.crd.map(|c| Point::from_1e6(c.y, c.x));
    let id = loc.lid.clone().or_else(|| loc.ext_id.clone());
    let loc_type = match loc.loc_type.as_deref() {
        Some("S") => LocationType::Station,
        Some("P") => LocationType::Poi,
        Some("A") => LocationType::Address,
        Some(other) => {
            return Err(ParseError::UnexpectedValue {
                field: "loc type",
                value: other.to_string(),
            });
        }
        None if id.is_some() => LocationType::Station,
        None if coord.is_some() => LocationType::Coord,
        None => LocationType::Any,
    };
    let id = match loc_type {
        LocationType::Any | LocationType::Coord => None,
        _ => id,
    };
    let products = loc.p_cls.map(|cls| quirks.products_in_class(cls));
    Location::new(loc_type, id, coord, None, loc.name.clone(), products)
        .map_err(|e| ParseError::Other(e.to_string()))
}

fn line_from_prod(prod: &Prod, operators: &[super::types::Op], quirks: &HafasQuirks) -> Line {
    let ctx = prod.prod_ctx.clone().unwrap_or_default();
    let product = prod.cls.and_then(|cls| quirks.product_for_class(cls));
    // Labels like "S  2" or "ICE 75" collapse to rider-facing "S2"/"ICE75".
    let label = prod
        .name
        .clone()
        .or_else(|| ctx.name.clone())
        .map(|n| n.split_whitespace().collect::<String>());
    let operator = prod
        .opr_x
        .and_then(|index| operators.get(index))
        .and_then(|op| op.name.clone());

    let mut line = Line::new(product, label);
    line.id = ctx.line.clone().or_else(|| prod.line.clone());
    line.network = ctx
        .admin
        .clone()
        .or(operator)
        .or_else(|| quirks.network_id.clone());
    line.name = ctx.cat_out.clone().or_else(|| prod.name.clone());
    line.number = prod.number.clone().or_else(|| ctx.num.clone());
    line
}

/// The resolved `common` tables of one response.
pub(crate) struct Tables {
    locations: Vec<Location>,
    lines: Vec<Line>,
    remarks: Vec<Remark>,
    warnings: Vec<String>,
    polylines: Vec<Vec<Point>>,
}

impl Tables {
    pub(crate) fn build(common: Option<&Common>, quirks: &HafasQuirks) -> Result<Self, ParseError> {
        let Some(common) = common else {
            return Ok(Self {
                locations: Vec::new(),
                lines: Vec::new(),
                remarks: Vec::new(),
                warnings: Vec::new(),
                polylines: Vec::new(),
            });
        };
        let locations = common
            .loc_l
            .iter()
            .map(|loc| location_from_loc(loc, quirks))
            .collect::<Result<_, _>>()?;
        let lines = common
            .prod_l
            .iter()
            .map(|prod| line_from_prod(prod, &common.op_l, quirks))
            .collect();
        let remarks = common.rem_l.iter().map(remark_from_rem).collect();
        let warnings = common
            .him_l
            .iter()
            .map(|him| match (&him.head, &him.text) {
                (Some(head), Some(text)) => format!("{head}: {text}"),
                (Some(head), None) => head.clone(),
                (None, Some(text)) => text.clone(),
                (None, None) => String::new(),
            })
            .collect();
        let polylines = common
            .poly_l
            .iter()
            .map(|poly| polyline::decode(&poly.crd_enc_y_x))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            locations,
            lines,
            remarks,
            warnings,
            polylines,
        })
    }

    fn location(&self, index: usize) -> Result<Location, ParseError> {
        self.locations
            .get(index)
            .cloned()
            .ok_or(ParseError::IndexOutOfRange {
                list: "locL",
                index,
            })
    }

    fn line(&self, index: usize) -> Result<Line, ParseError> {
        self.lines
            .get(index)
            .cloned()
            .ok_or(ParseError::IndexOutOfRange {
                list: "prodL",
                index,
            })
    }

    fn remark(&self, index: usize) -> Result<&Remark, ParseError> {
        self.remarks.get(index).ok_or(ParseError::IndexOutOfRange {
            list: "remL",
            index,
        })
    }

    fn warning(&self, index: usize) -> Result<&str, ParseError> {
        self.warnings
            .get(index)
            .map(String::as_str)
            .ok_or(ParseError::IndexOutOfRange {
                list: "himL",
                index,
            })
    }

    fn polyline(&self, index: usize) -> Result<&[Point], ParseError> {
        self.polylines
            .get(index)
            .map(Vec::as_slice)
            .ok_or(ParseError::IndexOutOfRange {
                list: "polyL",
                index,
            })
    }
}

// ---------------------------------------------------------------------------
// Times

fn parse_base_date(raw: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|_| ParseError::InvalidDate(raw.to_string()))
}

/// HAFAS times are digit strings relative to the base date; eight digits
/// carry a leading day offset.
fn parse_time(base: NaiveDate, raw: &str) -> Result<NaiveDateTime, ParseError> {
    let invalid = || ParseError::InvalidDate(raw.to_string());
    if !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (days, rest) = match raw.len() {
        8 => (raw[..2].parse::<i64>().map_err(|_| invalid())?, &raw[2..]),
        2 | 4 | 6 => (0, raw),
        _ => return Err(invalid()),
    };
    let hour: u32 = rest[..2].parse().map_err(|_| invalid())?;
    let minute: u32 = if rest.len() >= 4 {
        rest[2..4].parse().map_err(|_| invalid())?
    } else {
        0
    };
    let second: u32 = if rest.len() >= 6 {
        rest[4..6].parse().map_err(|_| invalid())?
    } else {
        0
    };
    let time = base.and_hms_opt(hour, minute, second).ok_or_else(invalid)?;
    Ok(time + Duration::days(days))
}

fn opt_time(
    base: NaiveDate,
    raw: Option<&str>,
) -> Result<Option<NaiveDateTime>, ParseError> {
    raw.map(|t| parse_time(base, t)).transpose()
}

// ---------------------------------------------------------------------------
// Stops

fn platform(flat: Option<&str>, wrapped: Option<&Pltf>) -> Option<Position> {
    flat.or_else(|| wrapped.and_then(|p| p.txt.as_deref()))
        .and_then(Position::parse)
}

/// Collect the remark texts attached to one entity; attrs and cancellations
/// go to the supplied sinks.
fn apply_messages(
    msgs: &[super::types::Msg],
    tables: &Tables,
    attrs: Option<&mut Line>,
    cancelled: &mut bool,
    texts: &mut Vec<String>,
) -> Result<(), ParseError> {
    let mut line = attrs;
    for msg in msgs {
        if let Some(rem_x) = msg.rem_x {
            match tables.remark(rem_x)? {
                Remark::Attr(attr) => {
                    if let Some(line) = line.as_deref_mut() {
                        line.attrs.insert(*attr);
                    }
                }
                Remark::StopCancelled | Remark::TripCancelled => *cancelled = true,
                Remark::Text(text) => {
                    if !text.is_empty() && !texts.contains(text) {
                        texts.push(text.clone());
                    }
                }
            }
        }
        if let Some(him_x) = msg.him_x {
            let warning = tables.warning(him_x)?.to_string();
            if !warning.is_empty() && !texts.contains(&warning) {
                texts.push(warning);
            }
        }
    }
    Ok(())
}

fn stop_from_jny_stop(
    stop: &JnyStop,
    base: NaiveDate,
    tables: &Tables,
) -> Result<Stop, ParseError> {
    let loc_x = stop.loc_x.ok_or(ParseError::MissingField("locX"))?;
    let mut s = Stop::new(tables.location(loc_x)?);
    s.planned_arrival = opt_time(base, stop.a_time_s.as_deref())?;
    s.predicted_arrival = opt_time(base, stop.a_time_r.as_deref())?;
    s.planned_arrival_position = platform(stop.a_platf_s.as_deref(), stop.a_pltf_s.as_ref());
    s.predicted_arrival_position = platform(stop.a_platf_r.as_deref(), stop.a_pltf_r.as_ref());
    s.arrival_cancelled = stop.a_cncl;
    s.planned_departure = opt_time(base, stop.d_time_s.as_deref())?;
    s.predicted_departure = opt_time(base, stop.d_time_r.as_deref())?;
    s.planned_departure_position = platform(stop.d_platf_s.as_deref(), stop.d_pltf_s.as_ref());
    s.predicted_departure_position = platform(stop.d_platf_r.as_deref(), stop.d_pltf_r.as_ref());
    s.departure_cancelled = stop.d_cncl;

    let mut cancelled = false;
    let mut texts = Vec::new();
    apply_messages(&stop.msg_l, tables, None, &mut cancelled, &mut texts)?;
    if cancelled {
        s.cancel();
    }
    if !texts.is_empty() {
        s.message = Some(texts.join("\n"));
    }
    Ok(s)
}

// ---------------------------------------------------------------------------
// Legs

fn journey_path(jny: &Jny, tables: &Tables) -> Result<Vec<Point>, ParseError> {
    if let Some(poly) = &jny.poly {
        return polyline::decode(&poly.crd_enc_y_x);
    }
    let Some(poly_g) = &jny.poly_g else {
        return Ok(Vec::new());
    };
    let mut path = Vec::new();
    for &index in &poly_g.poly_x_l {
        path.extend_from_slice(tables.polyline(index)?);
    }
    Ok(path)
}

fn public_leg_from_jny(
    jny: &Jny,
    dep_fallback: &JnyStop,
    arr_fallback: &JnyStop,
    base: NaiveDate,
    tables: &Tables,
) -> Result<PublicLeg, ParseError> {
    let prod_x = jny.prod_x.ok_or(ParseError::MissingField("prodX"))?;
    let mut line = tables.line(prod_x)?;
    let base = match &jny.date {
        Some(date) => parse_base_date(date)?,
        None => base,
    };

    let mut cancelled = jny.is_cncl;
    let mut texts = Vec::new();
    apply_messages(&jny.msg_l, tables, Some(&mut line), &mut cancelled, &mut texts)?;

    let mut stops: Vec<Stop> = jny
        .stop_l
        .iter()
        .map(|s| stop_from_jny_stop(s, base, tables))
        .collect::<Result<_, _>>()?;
    let (departure, arrival, intermediate) = if stops.len() >= 2 {
        let arrival = stops.pop().ok_or(ParseError::MissingField("stopL"))?;
        let departure = stops.remove(0);
        (departure, arrival, stops)
    } else {
        (
            stop_from_jny_stop(dep_fallback, base, tables)?,
            stop_from_jny_stop(arr_fallback, base, tables)?,
            Vec::new(),
        )
    };

    let mut leg = PublicLeg {
        line,
        destination: jny.dir_txt.clone().map(Location::any),
        departure,
        arrival,
        intermediate_stops: intermediate,
        message: (!texts.is_empty()).then(|| texts.join("\n")),
        path: journey_path(jny, tables)?,
        journey_context: jny.jid.clone().map(|journey_id| {
            QueryJourneyDetailContext::Hafas { journey_id }
        }),
    };
    if cancelled {
        leg.departure.cancel();
        leg.arrival.cancel();
        for stop in &mut leg.intermediate_stops {
            stop.cancel();
        }
    }
    Ok(leg)
}

fn individual_kind(sec_type: &str) -> Result<IndividualType, ParseError> {
    match sec_type {
        "WALK" => Ok(IndividualType::Walk),
        "TRSF" | "DEVI" => Ok(IndividualType::Transfer),
        "BIKE" => Ok(IndividualType::Bike),
        "KISS" | "TAXI" => Ok(IndividualType::Car),
        other => Err(ParseError::UnexpectedValue {
            field: "sec type",
            value: other.to_string(),
        }),
    }
}

fn leg_from_sec(sec: &Sec, base: NaiveDate, tables: &Tables) -> Result<Leg, ParseError> {
    if sec.sec_type == "JNY" {
        let jny = sec.jny.as_ref().ok_or(ParseError::MissingField("jny"))?;
        return Ok(Leg::Public(public_leg_from_jny(
            jny, &sec.dep, &sec.arr, base, tables,
        )?));
    }

    let kind = individual_kind(&sec.sec_type)?;
    let dep_loc_x = sec.dep.loc_x.ok_or(ParseError::MissingField("locX"))?;
    let arr_loc_x = sec.arr.loc_x.ok_or(ParseError::MissingField("locX"))?;
    let departure_time = opt_time(base, sec.dep.d_time_r.as_deref())?
        .or(opt_time(base, sec.dep.d_time_s.as_deref())?)
        .ok_or(ParseError::MissingField("dTimeS"))?;
    let arrival_time = opt_time(base, sec.arr.a_time_r.as_deref())?
        .or(opt_time(base, sec.arr.a_time_s.as_deref())?)
        .ok_or(ParseError::MissingField("aTimeS"))?;
    Ok(Leg::Individual(IndividualLeg {
        kind,
        departure: tables.location(dep_loc_x)?,
        departure_time,
        arrival: tables.location(arr_loc_x)?,
        arrival_time,
        distance_m: sec.gis.as_ref().and_then(|g| g.dist).unwrap_or(0),
        path: Vec::new(),
    }))
}

/// Splice consecutive same-kind individual legs, as backends split walks
/// around synthetic waypoints.
fn merge_individual(legs: Vec<Leg>) -> Vec<Leg> {
    let mut merged: Vec<Leg> = Vec::new();
    for leg in legs {
        match leg {
            Leg::Individual(next) => match merged.last_mut() {
                Some(Leg::Individual(previous)) if previous.kind == next.kind => {
                    *previous = previous.clone().merged_with(next);
                }
                _ => merged.push(Leg::Individual(next)),
            },
            public => merged.push(public),
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Trips

fn fares_from_out_con(con: &OutCon, quirks: &HafasQuirks) -> Vec<Fare> {
    let Some(trf) = &con.trf_res else {
        return Vec::new();
    };
    let mut fares = Vec::new();
    for fare_set in &trf.fare_set_l {
        let network = fare_set
            .name
            .clone()
            .or_else(|| quirks.network_id.clone())
            .unwrap_or_default();
        for item in &fare_set.fare_l {
            let Some(amount) = item.amount() else {
                continue;
            };
            let name = item.name.as_deref().unwrap_or("").to_lowercase();
            let fare_type = if name.contains("kind") || name.contains("child") {
                FareType::Child
            } else if name.contains("fahrrad") || name.contains("bike") {
                FareType::Bike
            } else {
                FareType::Adult
            };
            fares.push(Fare {
                network: network.clone(),
                fare_type,
                currency: item.cur.clone().unwrap_or_else(|| "EUR".to_string()),
                fare: amount as f64 / 100.0,
                units_name: None,
                units: None,
            });
        }
    }
    fares
}

fn trip_from_out_con(
    con: &OutCon,
    tables: &Tables,
    quirks: &HafasQuirks,
) -> Result<Trip, ParseError> {
    let base = parse_base_date(con.date.as_deref().ok_or(ParseError::MissingField("date"))?)?;
    let legs: Vec<Leg> = con
        .sec_l
        .iter()
        .map(|sec| leg_from_sec(sec, base, tables))
        .collect::<Result<_, _>>()?;
    let legs = merge_individual(legs);
    if legs.is_empty() {
        return Err(ParseError::MissingField("secL"));
    }
    let from = legs
        .first()
        .map(|l| l.departure_location().clone())
        .ok_or(ParseError::MissingField("secL"))?;
    let to = legs
        .last()
        .map(|l| l.arrival_location().clone())
        .ok_or(ParseError::MissingField("secL"))?;
    let reconstruction = con
        .ctx_recon
        .clone()
        .or_else(|| con.recon.as_ref().and_then(|r| r.ctx.clone()));
    Ok(Trip {
        id: String::new(),
        from,
        to,
        legs,
        fares: fares_from_out_con(con, quirks),
        refresh_context: reconstruction
            .map(|reconstruction_token| RefreshTripContext::Hafas { reconstruction_token }),
    })
}

/// The query parameters a continuation must replay.
#[derive(Debug, Clone)]
pub(crate) struct TripQuery {
    pub from: Location,
    pub via: Option<Location>,
    pub to: Location,
    pub when: NaiveDateTime,
    pub dep: bool,
    pub options: TripOptions,
    /// Cursors from the previous page, carried forward when the new page
    /// does not re-issue a direction.
    pub earlier_cursor: Option<String>,
    pub later_cursor: Option<String>,
}

pub(crate) fn parse_trip_search(
    body: &str,
    meth: &str,
    quirks: &HafasQuirks,
    query: Option<&TripQuery>,
) -> Result<QueryTripsResult, ParseError> {
    let res = match extract_res(body, meth)? {
        Extracted::Failed(Failure::NoTrips) => return Ok(QueryTripsResult::NoTrips),
        Extracted::Failed(Failure::TooClose) => return Ok(QueryTripsResult::TooClose),
        Extracted::Failed(Failure::InvalidDate) => return Ok(QueryTripsResult::InvalidDate),
        Extracted::Failed(Failure::SessionExpired) => {
            return Ok(QueryTripsResult::SessionExpired);
        }
        // The backend rejected a location we thought was resolved; the
        // caller must disambiguate again.
        Extracted::Failed(Failure::Location) => {
            return Ok(QueryTripsResult::Ambiguous {
                from: Vec::new(),
                via: Vec::new(),
                to: Vec::new(),
            });
        }
        Extracted::Res(res) => res,
    };

    let tables = Tables::build(res.common.as_ref(), quirks)?;
    let trips: Vec<Trip> = res
        .out_con_l
        .iter()
        .map(|con| trip_from_out_con(con, &tables, quirks))
        .collect::<Result<_, _>>()?;
    if trips.is_empty() {
        return Ok(QueryTripsResult::NoTrips);
    }

    // Response-level remarks and warnings apply to the whole answer.
    let mut messages = Vec::new();
    let mut cancelled = false;
    apply_messages(&res.msg_l, &tables, None, &mut cancelled, &mut messages)?;

    // Endpoints come back through `locL`, so the reported from/to carry the
    // backend's names and coordinates rather than the bare query ids.
    let (via, context) = match query {
        Some(query) => {
            let context = QueryTripsContext::Hafas {
                from: query.from.clone(),
                via: query.via.clone(),
                to: query.to.clone(),
                when: query.when,
                dep: query.dep,
                options: query.options.clone(),
                earlier_cursor: res
                    .out_ctx_scr_b
                    .clone()
                    .or_else(|| query.earlier_cursor.clone()),
                later_cursor: res
                    .out_ctx_scr_f
                    .clone()
                    .or_else(|| query.later_cursor.clone()),
            };
            (query.via.clone(), Some(context))
        }
        // A reconstruction has no original query to replay and nothing
        // to page.
        None => (None, None),
    };

    Ok(QueryTripsResult::Success {
        context,
        from: trips[0].from.clone(),
        via,
        to: trips[0].to.clone(),
        trips,
        messages,
    })
}

// ---------------------------------------------------------------------------
// Locations

pub(crate) fn parse_loc_match(
    body: &str,
    quirks: &HafasQuirks,
) -> Result<SuggestLocationsResult, ParseError> {
    let res = match extract_res(body, "LocMatch")? {
        Extracted::Failed(Failure::Location) => {
            return Ok(SuggestLocationsResult {
                suggestions: Vec::new(),
            });
        }
        Extracted::Failed(_) => {
            return Err(ParseError::Other("unexpected error for LocMatch".into()));
        }
        Extracted::Res(res) => res,
    };
    let locs = res.match_.map(|m| m.loc_l).unwrap_or_default();
    let count = locs.len() as i32;
    let suggestions = locs
        .iter()
        .enumerate()
        .map(|(index, loc)| {
            Ok(SuggestedLocation {
                location: location_from_loc(loc, quirks)?,
                // The backend returns best-first without a quality score.
                priority: count - index as i32,
            })
        })
        .collect::<Result<_, ParseError>>()?;
    Ok(SuggestLocationsResult { suggestions })
}

pub(crate) fn parse_loc_geo_pos(
    body: &str,
    quirks: &HafasQuirks,
) -> Result<NearbyLocationsResult, ParseError> {
    let res = match extract_res(body, "LocGeoPos")? {
        Extracted::Failed(Failure::Location) => {
            return Ok(NearbyLocationsResult::InvalidStation);
        }
        Extracted::Failed(_) => {
            return Err(ParseError::Other("unexpected error for LocGeoPos".into()));
        }
        Extracted::Res(res) => res,
    };
    let locations = res
        .loc_l
        .iter()
        .map(|loc| location_from_loc(loc, quirks))
        .collect::<Result<_, _>>()?;
    Ok(NearbyLocationsResult::Success(locations))
}

// ---------------------------------------------------------------------------
// Station board

pub(crate) fn parse_station_board(
    body: &str,
    quirks: &HafasQuirks,
) -> Result<QueryDeparturesResult, ParseError> {
    let res = match extract_res(body, "StationBoard")? {
        Extracted::Failed(Failure::Location) => {
            return Ok(QueryDeparturesResult::InvalidStation);
        }
        Extracted::Failed(_) => {
            return Err(ParseError::Other("unexpected error for StationBoard".into()));
        }
        Extracted::Res(res) => res,
    };
    let tables = Tables::build(res.common.as_ref(), quirks)?;

    let mut boards: Vec<StationDepartures> = Vec::new();
    for jny in &res.jny_l {
        let stop = jny
            .stb_stop
            .as_ref()
            .ok_or(ParseError::MissingField("stbStop"))?;
        let base = parse_base_date(jny.date.as_deref().ok_or(ParseError::MissingField("date"))?)?;
        let loc_x = stop.loc_x.ok_or(ParseError::MissingField("locX"))?;
        let location = tables.location(loc_x)?;

        let prod_x = jny.prod_x.ok_or(ParseError::MissingField("prodX"))?;
        let mut line = tables.line(prod_x)?;
        let mut cancelled = jny.is_cncl || stop.d_cncl || stop.a_cncl;
        let mut texts = Vec::new();
        apply_messages(&jny.msg_l, &tables, Some(&mut line), &mut cancelled, &mut texts)?;
        if cancelled && texts.is_empty() {
            texts.push("Trip cancelled".to_string());
        }

        // An arrival board fills the a-side of the same stop object.
        let departure = Departure {
            planned_time: opt_time(
                base,
                stop.d_time_s.as_deref().or(stop.a_time_s.as_deref()),
            )?,
            predicted_time: if cancelled {
                None
            } else {
                opt_time(base, stop.d_time_r.as_deref().or(stop.a_time_r.as_deref()))?
            },
            line: line.clone(),
            position: platform(stop.d_platf_r.as_deref(), stop.d_pltf_r.as_ref())
                .or_else(|| platform(stop.a_platf_r.as_deref(), stop.a_pltf_r.as_ref())),
            planned_position: platform(stop.d_platf_s.as_deref(), stop.d_pltf_s.as_ref())
                .or_else(|| platform(stop.a_platf_s.as_deref(), stop.a_pltf_s.as_ref())),
            destination: jny.dir_txt.clone().map(Location::any),
            capacity: None,
            message: (!texts.is_empty()).then(|| texts.join("\n")),
            journey_context: jny.jid.clone().map(|journey_id| {
                QueryJourneyDetailContext::Hafas { journey_id }
            }),
        };

        match boards.iter_mut().find(|b| b.location == location) {
            Some(board) => {
                board.departures.push(departure);
                if !board.lines.contains(&line) {
                    board.lines.push(line);
                }
            }
            None => boards.push(StationDepartures {
                location,
                departures: vec![departure],
                lines: vec![line],
            }),
        }
    }
    Ok(QueryDeparturesResult::Success(boards))
}

// ---------------------------------------------------------------------------
// Journey detail

pub(crate) fn parse_journey_details(
    body: &str,
    quirks: &HafasQuirks,
) -> Result<QueryJourneyDetailResult, ParseError> {
    let res = match extract_res(body, "JourneyDetails")? {
        Extracted::Failed(_) => return Ok(QueryJourneyDetailResult::InvalidId),
        Extracted::Res(res) => res,
    };
    let Some(jny) = &res.journey else {
        return Ok(QueryJourneyDetailResult::InvalidId);
    };
    let tables = Tables::build(res.common.as_ref(), quirks)?;
    let base = parse_base_date(jny.date.as_deref().ok_or(ParseError::MissingField("date"))?)?;
    if jny.stop_l.len() < 2 {
        return Ok(QueryJourneyDetailResult::InvalidId);
    }
    let fallback = JnyStop::default();
    let leg = public_leg_from_jny(jny, &fallback, &fallback, base, &tables)?;
    Ok(QueryJourneyDetailResult::Success(leg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Product;

    fn quirks() -> HafasQuirks {
        HafasQuirks::default()
    }

    const COMMON: &str = r#"{
        "locL": [
            {"lid": "A=1@O=Berlin Hbf@L=8011160@", "type": "S", "name": "Berlin Hbf",
             "extId": "8011160", "crd": {"x": 13369549, "y": 52525589}, "pCls": 31},
            {"lid": "A=1@O=Hamburg Hbf@L=8002549@", "type": "S", "name": "Hamburg Hbf",
             "extId": "8002549", "crd": {"x": 10006909, "y": 53552736}},
            {"lid": "A=1@O=Spandau@L=8010404@", "type": "S", "name": "Berlin-Spandau",
             "extId": "8010404"}
        ],
        "prodL": [
            {"name": "ICE 802", "cls": 1,
             "prodCtx": {"name": "ICE 802", "num": "802", "catOut": "ICE", "admin": "80"}}
        ],
        "remL": [
            {"code": "FB", "type": "A"},
            {"type": "I", "txtN": "Komfort Check-in possible"},
            {"type": "P", "txtN": "Trip cancelled"}
        ],
        "himL": [
            {"head": "Construction works", "text": "Expect delays"}
        ],
        "polyL": []
    }"#;

    fn trip_body(extra_msgs: &str, cncl: &str) -> String {
        format!(
            r#"{{
            "svcResL": [{{
                "meth": "TripSearch",
                "err": "OK",
                "res": {{
                    "common": {COMMON},
                    "outConL": [{{
                        "date": "20250601",
                        "ctxRecon": "T$A=1@L=8011160@...",
                        "dep": {{"locX": 0, "dTimeS": "100000"}},
                        "arr": {{"locX": 1, "aTimeS": "125600"}},
                        "secL": [{{
                            "type": "JNY",
                            "dep": {{"locX": 0, "dTimeS": "100000"}},
                            "arr": {{"locX": 1, "aTimeS": "125600"}},
                            "jny": {{
                                "jid": "1|23456|0|80|01062025",
                                "date": "20250601",
                                "prodX": 0,
                                "dirTxt": "Hamburg-Altona",
                                "isCncl": {cncl},
                                "msgL": [{{"remX": 0}}{extra_msgs}],
                                "stopL": [
                                    {{"locX": 0, "dTimeS": "100000", "dTimeR": "100200",
                                      "dPlatfS": "7"}},
                                    {{"locX": 2, "aTimeS": "101000", "dTimeS": "101200"}},
                                    {{"locX": 1, "aTimeS": "125600", "aPlatfS": "12",
                                      "aPlatfR": "14"}}
                                ]
                            }}
                        }}]
                    }}],
                    "outCtxScrB": "EARLIER",
                    "outCtxScrF": "LATER"
                }}
            }}]
        }}"#
        )
    }

    fn query() -> TripQuery {
        TripQuery {
            from: Location::station("A=1@O=Berlin Hbf@L=8011160@").unwrap(),
            via: None,
            to: Location::station("A=1@O=Hamburg Hbf@L=8002549@").unwrap(),
            when: NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            dep: true,
            options: TripOptions::default(),
            earlier_cursor: None,
            later_cursor: None,
        }
    }

    #[test]
    fn trip_search_success() {
        let body = trip_body("", "false");
        let result = parse_trip_search(&body, "TripSearch", &quirks(), Some(&query())).unwrap();
        let QueryTripsResult::Success {
            context,
            from,
            to,
            trips,
            ..
        } = result
        else {
            panic!("expected success");
        };
        assert_eq!(from.name(), Some("Berlin Hbf"));
        assert_eq!(to.name(), Some("Hamburg Hbf"));
        assert_eq!(trips.len(), 1);

        let trip = &trips[0];
        let Leg::Public(leg) = &trip.legs[0] else {
            panic!("expected public leg");
        };
        assert_eq!(leg.line.label.as_deref(), Some("ICE802"));
        assert_eq!(leg.line.product, Some(Product::HighSpeedTrain));
        assert!(leg.line.attrs.contains(&LineAttr::BicycleCarriage));
        assert_eq!(leg.intermediate_stops.len(), 1);
        assert_eq!(
            leg.intermediate_stops[0].location.name(),
            Some("Berlin-Spandau")
        );
        assert_eq!(
            leg.departure.predicted_departure.unwrap() - leg.departure.planned_departure.unwrap(),
            Duration::minutes(2)
        );
        assert_eq!(leg.arrival.arrival_position().unwrap().name(), "14");
        assert_eq!(leg.destination.as_ref().unwrap().name(), Some("Hamburg-Altona"));
        assert!(matches!(
            leg.journey_context,
            Some(QueryJourneyDetailContext::Hafas { .. })
        ));

        assert!(matches!(
            trip.refresh_context,
            Some(RefreshTripContext::Hafas { .. })
        ));
        let Some(QueryTripsContext::Hafas {
            earlier_cursor,
            later_cursor,
            ..
        }) = context
        else {
            panic!("expected hafas context");
        };
        assert_eq!(earlier_cursor.as_deref(), Some("EARLIER"));
        assert_eq!(later_cursor.as_deref(), Some("LATER"));
    }

    #[test]
    fn trip_search_cancellation_remark() {
        let body = trip_body(r#", {"remX": 2}"#, "false");
        let result = parse_trip_search(&body, "TripSearch", &quirks(), Some(&query())).unwrap();
        let QueryTripsResult::Success { trips, .. } = result else {
            panic!("expected success");
        };
        let Leg::Public(leg) = &trips[0].legs[0] else {
            panic!("expected public leg");
        };
        assert!(leg.departure.departure_cancelled);
        assert!(leg.arrival.arrival_cancelled);
        assert!(leg.intermediate_stops[0].arrival_cancelled);
    }

    #[test]
    fn trip_search_him_warning_joined() {
        let body = trip_body(r#", {"himX": 0}, {"remX": 1}"#, "false");
        let result = parse_trip_search(&body, "TripSearch", &quirks(), Some(&query())).unwrap();
        let QueryTripsResult::Success { trips, .. } = result else {
            panic!("expected success");
        };
        let Leg::Public(leg) = &trips[0].legs[0] else {
            panic!("expected public leg");
        };
        let message = leg.message.as_deref().unwrap();
        assert!(message.contains("Construction works: Expect delays"));
        // Free-text remarks get terminal punctuation.
        assert!(message.contains("Komfort Check-in possible."));
    }

    #[test]
    fn response_level_warning_is_reported() {
        let body = trip_body("", "false")
            .replace("\"outConL\"", "\"msgL\": [{\"himX\": 0}], \"outConL\"");
        let result = parse_trip_search(&body, "TripSearch", &quirks(), Some(&query())).unwrap();
        let QueryTripsResult::Success { messages, .. } = result else {
            panic!("expected success");
        };
        assert_eq!(messages, vec!["Construction works: Expect delays".to_string()]);
    }

    #[test]
    fn trip_search_error_codes() {
        for (code, expected) in [
            ("H890", QueryTripsResult::NoTrips),
            ("H895", QueryTripsResult::TooClose),
            ("H9360", QueryTripsResult::InvalidDate),
            ("CGI_READ_FAILED", QueryTripsResult::SessionExpired),
        ] {
            let body = format!(
                r#"{{"svcResL": [{{"meth": "TripSearch", "err": "{code}", "errTxt": "x"}}]}}"#
            );
            assert_eq!(
                parse_trip_search(&body, "TripSearch", &quirks(), Some(&query())).unwrap(),
                expected,
                "code {code}"
            );
        }
    }

    #[test]
    fn unknown_error_code_is_parse_error() {
        let body = r#"{"svcResL": [{"meth": "TripSearch", "err": "H_TOTALLY_NEW"}]}"#;
        assert!(matches!(
            parse_trip_search(body, "TripSearch", &quirks(), Some(&query())),
            Err(ParseError::UnexpectedValue { .. })
        ));
    }

    #[test]
    fn out_of_range_index_is_parse_error() {
        let body = trip_body("", "false").replace(r#""prodX": 0"#, r#""prodX": 9"#);
        assert!(matches!(
            parse_trip_search(&body, "TripSearch", &quirks(), Some(&query())),
            Err(ParseError::IndexOutOfRange { list: "prodL", .. })
        ));
    }

    #[test]
    fn loc_match_preserves_order() {
        let body = r#"{"svcResL": [{"meth": "LocMatch", "err": "OK", "res": {
            "common": {},
            "match": {"locL": [
                {"lid": "A=1@L=1@", "type": "S", "name": "First"},
                {"lid": "A=1@L=2@", "type": "S", "name": "Second"}
            ]}
        }}]}"#;
        let result = parse_loc_match(body, &quirks()).unwrap();
        assert_eq!(result.suggestions.len(), 2);
        assert!(result.suggestions[0].priority > result.suggestions[1].priority);
        assert_eq!(result.suggestions[0].location.name(), Some("First"));
    }

    #[test]
    fn loc_match_location_error_is_empty() {
        let body = r#"{"svcResL": [{"meth": "LocMatch", "err": "LOCATION"}]}"#;
        assert!(parse_loc_match(body, &quirks()).unwrap().suggestions.is_empty());
    }

    #[test]
    fn geo_pos_location_error_is_invalid_station() {
        let body = r#"{"svcResL": [{"meth": "LocGeoPos", "err": "LOCATION"}]}"#;
        assert!(matches!(
            parse_loc_geo_pos(body, &quirks()).unwrap(),
            NearbyLocationsResult::InvalidStation
        ));
    }

    #[test]
    fn station_board_groups_by_station() {
        let body = format!(
            r#"{{"svcResL": [{{"meth": "StationBoard", "err": "OK", "res": {{
                "common": {COMMON},
                "jnyL": [
                    {{"jid": "1|1|0|80|", "date": "20250601", "prodX": 0,
                      "dirTxt": "Hamburg", "stbStop": {{"locX": 0,
                      "dTimeS": "100000", "dTimeR": "100500", "dPlatfS": "7"}}}},
                    {{"jid": "1|2|0|80|", "date": "20250601", "prodX": 0,
                      "dirTxt": "München", "stbStop": {{"locX": 0,
                      "dTimeS": "101500", "dCncl": true}}}}
                ]
            }}}}]}}"#
        );
        let QueryDeparturesResult::Success(boards) =
            parse_station_board(&body, &quirks()).unwrap()
        else {
            panic!("expected success");
        };
        assert_eq!(boards.len(), 1);
        let board = &boards[0];
        assert_eq!(board.departures.len(), 2);
        assert_eq!(board.lines.len(), 1);
        assert_eq!(
            board.departures[0].predicted_time.unwrap()
                - board.departures[0].planned_time.unwrap(),
            Duration::minutes(5)
        );
        assert!(board.departures[1].message.is_some());
        assert!(board.departures[1].predicted_time.is_none());
    }

    #[test]
    fn arrival_board_uses_a_side_fields() {
        let body = format!(
            r#"{{"svcResL": [{{"meth": "StationBoard", "err": "OK", "res": {{
                "common": {COMMON},
                "jnyL": [
                    {{"jid": "1|3|0|80|", "date": "20250601", "prodX": 0,
                      "dirTxt": "Berlin Hbf", "stbStop": {{"locX": 0,
                      "aTimeS": "095500", "aTimeR": "095900", "aPlatfS": "3"}}}}
                ]
            }}}}]}}"#
        );
        let QueryDeparturesResult::Success(boards) =
            parse_station_board(&body, &quirks()).unwrap()
        else {
            panic!("expected success");
        };
        let arrival = &boards[0].departures[0];
        assert_eq!(
            arrival.predicted_time.unwrap() - arrival.planned_time.unwrap(),
            Duration::minutes(4)
        );
        assert_eq!(arrival.planned_position.as_ref().unwrap().name(), "3");
    }

    #[test]
    fn journey_details_full_run() {
        let body = format!(
            r#"{{"svcResL": [{{"meth": "JourneyDetails", "err": "OK", "res": {{
                "common": {COMMON},
                "journey": {{
                    "jid": "1|23456|0|80|01062025",
                    "date": "20250601",
                    "prodX": 0,
                    "dirTxt": "Hamburg-Altona",
                    "stopL": [
                        {{"locX": 0, "dTimeS": "100000"}},
                        {{"locX": 2, "aTimeS": "101000", "dTimeS": "101200"}},
                        {{"locX": 1, "aTimeS": "125600"}}
                    ]
                }}
            }}}}]}}"#
        );
        let QueryJourneyDetailResult::Success(leg) =
            parse_journey_details(&body, &quirks()).unwrap()
        else {
            panic!("expected success");
        };
        assert_eq!(leg.departure.location.name(), Some("Berlin Hbf"));
        assert_eq!(leg.arrival.location.name(), Some("Hamburg Hbf"));
        assert_eq!(leg.intermediate_stops.len(), 1);
    }

    #[test]
    fn journey_details_missing_journey_is_invalid_id() {
        let body = r#"{"svcResL": [{"meth": "JourneyDetails", "err": "OK", "res": {}}]}"#;
        assert_eq!(
            parse_journey_details(body, &quirks()).unwrap(),
            QueryJourneyDetailResult::InvalidId
        );
    }

    #[test]
    fn time_parsing_with_day_offset() {
        let base = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(
            parse_time(base, "102300").unwrap(),
            base.and_hms_opt(10, 23, 0).unwrap()
        );
        assert_eq!(
            parse_time(base, "01002600").unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 2)
                .unwrap()
                .and_hms_opt(0, 26, 0)
                .unwrap()
        );
        assert_eq!(
            parse_time(base, "1023").unwrap(),
            base.and_hms_opt(10, 23, 0).unwrap()
        );
        assert!(parse_time(base, "abc").is_err());
        assert!(parse_time(base, "990000").is_err());
    }

    #[test]
    fn walk_sections_merged() {
        let body = r#"{"svcResL": [{"meth": "TripSearch", "err": "OK", "res": {
            "common": {"locL": [
                {"lid": "A=1@L=1@", "type": "S", "name": "A"},
                {"lid": "A=1@L=2@", "type": "S", "name": "B"},
                {"lid": "A=1@L=3@", "type": "S", "name": "C"}
            ]},
            "outConL": [{
                "date": "20250601",
                "dep": {"locX": 0, "dTimeS": "100000"},
                "arr": {"locX": 2, "aTimeS": "101500"},
                "secL": [
                    {"type": "WALK",
                     "dep": {"locX": 0, "dTimeS": "100000"},
                     "arr": {"locX": 1, "aTimeS": "100500"},
                     "gis": {"dist": 300}},
                    {"type": "WALK",
                     "dep": {"locX": 1, "dTimeS": "100500"},
                     "arr": {"locX": 2, "aTimeS": "101500"},
                     "gis": {"dist": 500}}
                ]
            }]
        }}]}"#;
        let QueryTripsResult::Success { trips, .. } =
            parse_trip_search(body, "TripSearch", &quirks(), Some(&query())).unwrap()
        else {
            panic!("expected success");
        };
        assert_eq!(trips[0].legs.len(), 1);
        let Leg::Individual(walk) = &trips[0].legs[0] else {
            panic!("expected walk");
        };
        assert_eq!(walk.distance_m, 800);
        assert_eq!(walk.arrival.name(), Some("C"));
    }
}
