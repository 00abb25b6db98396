//! The EFA query engine.
//!
//! One provider instance talks to one EFA installation. All requests are
//! plain GETs against the installation's `XML_*_REQUEST` endpoints; the
//! continuation calls additionally carry the server-side session pair. A
//! 404 on a continuation call means the session was evicted, which is an
//! outcome, not an error.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use tracing::debug;
use url::Url;

use crate::classifier::{self, RawLine};
use crate::context::{QueryJourneyDetailContext, QueryTripsContext, RefreshTripContext};
use crate::domain::{Line, Location, LocationType, Product};
use crate::error::{Error, ParseError};
use crate::provider::{
    Accessibility, NearbyLocationsResult, Optimize, QueryDeparturesResult,
    QueryJourneyDetailResult, QueryTripsResult, SuggestLocationsResult, TransitProvider,
    TripFlag, TripOptions, WalkSpeed,
};
use crate::transport::{Transport, TransportError};

use super::parse;

/// The request endpoints of one EFA installation.
#[derive(Debug, Clone)]
pub struct EfaEndpoints {
    pub trip: String,
    pub departure_monitor: String,
    pub stop_finder: String,
    pub coord: String,
    pub journey_detail: String,
}

impl EfaEndpoints {
    /// Standard endpoint names under a common API base, e.g.
    /// `https://www2.vvs.de/vvs/`.
    pub fn from_api_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            trip: format!("{base}/XML_TRIP_REQUEST2"),
            departure_monitor: format!("{base}/XML_DM_REQUEST"),
            stop_finder: format!("{base}/XML_STOPFINDER_REQUEST"),
            coord: format!("{base}/XML_COORD_REQUEST"),
            journey_detail: format!("{base}/XML_STOPSEQCOORD_REQUEST"),
        }
    }
}

/// Installation-specific deviations from baseline EFA behavior.
#[derive(Debug, Clone, Default)]
pub struct EfaQuirks {
    /// Network id stamped onto classified lines.
    pub network_id: Option<String>,
    /// Use the mobile JSON shape of the stop finder.
    pub json_stop_finder: bool,
    /// Classification override consulted before the shared cascade.
    pub line_override: Option<fn(&RawLine<'_>) -> Option<Line>>,
}

impl EfaQuirks {
    pub(crate) fn classify(&self, raw: &RawLine<'_>) -> Line {
        if let Some(hook) = self.line_override
            && let Some(line) = hook(raw)
        {
            return line;
        }
        classifier::classify(raw)
    }
}

/// A client for one EFA installation, generic over the transport.
#[derive(Debug, Clone)]
pub struct EfaProvider<T> {
    transport: T,
    endpoints: EfaEndpoints,
    quirks: EfaQuirks,
    headers: HashMap<String, String>,
}

impl<T: Transport> EfaProvider<T> {
    pub fn new(transport: T, endpoints: EfaEndpoints) -> Self {
        Self {
            transport,
            endpoints,
            quirks: EfaQuirks::default(),
            headers: HashMap::new(),
        }
    }

    pub fn with_quirks(mut self, quirks: EfaQuirks) -> Self {
        self.quirks = quirks;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn url(&self, endpoint: &str) -> Result<Url, TransportError> {
        let mut url =
            Url::parse(endpoint).map_err(|_| TransportError::InvalidUrl(endpoint.to_string()))?;
        url.query_pairs_mut()
            .append_pair("outputFormat", "XML")
            .append_pair("coordOutputFormat", "WGS84")
            .append_pair("locationServerActive", "1");
        Ok(url)
    }

    /// Address one request slot (`origin`, `destination`, `via`, `sf`, `dm`)
    /// by whatever identifies the location best.
    fn append_location(url: &mut Url, slot: &str, location: &Location) {
        let mut pairs = url.query_pairs_mut();
        if let Some(id) = location.id() {
            pairs.append_pair(&format!("type_{slot}"), "any");
            pairs.append_pair(&format!("name_{slot}"), id);
        } else if let Some(point) = location.point() {
            pairs.append_pair(&format!("type_{slot}"), "coord");
            pairs.append_pair(
                &format!("name_{slot}"),
                &format!("{:.6}:{:.6}:WGS84", point.lon_degrees(), point.lat_degrees()),
            );
        } else {
            pairs.append_pair(&format!("type_{slot}"), "any");
            pairs.append_pair(&format!("name_{slot}"), location.name().unwrap_or(""));
        }
    }

    fn append_when(url: &mut Url, when: NaiveDateTime) {
        url.query_pairs_mut()
            .append_pair("itdDate", &when.format("%Y%m%d").to_string())
            .append_pair("itdTime", &when.format("%H%M").to_string());
    }

    /// The `inclMOT_<n>` checkbox codes covering one product.
    fn mot_codes(product: Product) -> &'static [&'static str] {
        match product {
            Product::HighSpeedTrain | Product::RegionalTrain => &["0"],
            Product::SuburbanTrain => &["1"],
            Product::Subway => &["2"],
            Product::Tram => &["3", "4"],
            Product::Bus => &["5", "6", "7"],
            Product::Cablecar => &["8"],
            Product::Ferry => &["9"],
            Product::OnDemand => &["10"],
        }
    }

    fn append_options(url: &mut Url, options: &TripOptions) {
        let mut pairs = url.query_pairs_mut();
        if let Some(products) = &options.products {
            pairs.append_pair("includedMeans", "checkbox");
            for product in products {
                for code in Self::mot_codes(*product) {
                    pairs.append_pair(&format!("inclMOT_{code}"), "on");
                }
            }
        }
        if let Some(optimize) = options.optimize {
            let route_type = match optimize {
                Optimize::LeastDuration => "LEASTTIME",
                Optimize::LeastChanges => "LEASTINTERCHANGE",
                Optimize::LeastWalking => "LEASTWALKING",
            };
            pairs.append_pair("routeType", route_type);
        }
        if let Some(speed) = options.walk_speed {
            let value = match speed {
                WalkSpeed::Slow => "slow",
                WalkSpeed::Normal => "normal",
                WalkSpeed::Fast => "fast",
            };
            pairs.append_pair("changeSpeed", value);
        }
        if let Some(accessibility) = options.accessibility {
            match accessibility {
                Accessibility::Neutral => {}
                Accessibility::Limited => {
                    pairs.append_pair("imparedOptionsActive", "1");
                    pairs.append_pair("lowPlatformVhcl", "on");
                }
                Accessibility::Barrier => {
                    pairs.append_pair("imparedOptionsActive", "1");
                    pairs.append_pair("wheelchair", "on");
                    pairs.append_pair("noSolidStairs", "on");
                }
            }
        }
        for flag in &options.flags {
            match flag {
                TripFlag::Bike => pairs.append_pair("bikeTakeAlong", "1"),
                TripFlag::NoSolidStairs => pairs.append_pair("noSolidStairs", "on"),
                TripFlag::NoEscalators => pairs.append_pair("noEscalators", "on"),
                TripFlag::NoElevators => pairs.append_pair("noElevators", "on"),
            };
        }
    }

    async fn get(&self, url: Url) -> Result<String, Error> {
        debug!(url = %url, "efa request");
        let response = self.transport.fetch(url.as_str(), None, &self.headers).await?;
        Ok(response.text())
    }

    /// As [`Self::get`], but a 404 means the server dropped the session.
    async fn get_continuation(&self, url: Url) -> Result<Option<String>, Error> {
        debug!(url = %url, "efa continuation request");
        match self.transport.fetch(url.as_str(), None, &self.headers).await {
            Ok(response) => Ok(Some(response.text())),
            Err(TransportError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn stop_finder_url(
        &self,
        constraint: &str,
        max_results: usize,
    ) -> Result<Url, TransportError> {
        let mut url = self.url(&self.endpoints.stop_finder)?;
        if self.quirks.json_stop_finder {
            // Replace the XML marker set by the common builder.
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "outputFormat")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut().clear();
            for (k, v) in pairs {
                url.query_pairs_mut().append_pair(&k, &v);
            }
            url.query_pairs_mut().append_pair("outputFormat", "JSON");
        }
        url.query_pairs_mut()
            .append_pair("type_sf", "any")
            .append_pair("name_sf", constraint)
            .append_pair("anyMaxSizeHitList", &max_results.max(1).to_string());
        Ok(url)
    }

    fn nearby_url(
        &self,
        location: &Location,
        max_distance_m: u32,
        max_results: usize,
    ) -> Result<Option<Url>, TransportError> {
        let Some(point) = location.point() else {
            return Ok(None);
        };
        let mut url = self.url(&self.endpoints.coord)?;
        let radius = if max_distance_m == 0 { 1320 } else { max_distance_m };
        url.query_pairs_mut()
            .append_pair(
                "coord",
                &format!("{:.6}:{:.6}:WGS84", point.lon_degrees(), point.lat_degrees()),
            )
            .append_pair("coordListOutputFormat", "STRING")
            .append_pair("max", &max_results.max(1).to_string())
            .append_pair("inclFilter", "1")
            .append_pair("radius_1", &radius.to_string())
            .append_pair("type_1", "STOP");
        Ok(Some(url))
    }

    fn trips_url(
        &self,
        from: &Location,
        via: Option<&Location>,
        to: &Location,
        when: NaiveDateTime,
        dep: bool,
        options: &TripOptions,
    ) -> Result<Url, TransportError> {
        let mut url = self.url(&self.endpoints.trip)?;
        Self::append_location(&mut url, "origin", from);
        Self::append_location(&mut url, "destination", to);
        if let Some(via) = via {
            Self::append_location(&mut url, "via", via);
        }
        Self::append_when(&mut url, when);
        url.query_pairs_mut()
            .append_pair("itdTripDateTimeDepArr", if dep { "dep" } else { "arr" })
            .append_pair("calcNumberOfTrips", "4")
            .append_pair("ptOptionsActive", "1");
        Self::append_options(&mut url, options);
        Ok(url)
    }

    fn more_trips_url(
        &self,
        session_id: &str,
        request_id: &str,
        later: bool,
    ) -> Result<Url, TransportError> {
        let mut url = self.url(&self.endpoints.trip)?;
        url.query_pairs_mut()
            .append_pair("sessionID", session_id)
            .append_pair("requestID", request_id)
            .append_pair("command", if later { "tripNext" } else { "tripPrev" });
        Ok(url)
    }

    fn refresh_url(
        &self,
        session_id: &str,
        request_id: &str,
        route_index: u32,
    ) -> Result<Url, TransportError> {
        let mut url = self.url(&self.endpoints.trip)?;
        url.query_pairs_mut()
            .append_pair("sessionID", session_id)
            .append_pair("requestID", request_id)
            .append_pair("command", "tripSelect")
            .append_pair("tripSelector", &(route_index + 1).to_string());
        Ok(url)
    }

    fn departures_url(
        &self,
        station_id: &str,
        departures: bool,
        when: Option<NaiveDateTime>,
        max_departures: usize,
        equivs: bool,
    ) -> Result<Url, TransportError> {
        let mut url = self.url(&self.endpoints.departure_monitor)?;
        url.query_pairs_mut()
            .append_pair("type_dm", "stop")
            .append_pair("name_dm", station_id)
            .append_pair("useRealtime", "1")
            .append_pair("mode", "direct")
            .append_pair("itdDateTimeDepArr", if departures { "dep" } else { "arr" })
            .append_pair("limit", &max_departures.max(1).to_string())
            .append_pair("deleteAssignedStops_dm", if equivs { "0" } else { "1" });
        if let Some(when) = when {
            Self::append_when(&mut url, when);
        }
        Ok(url)
    }

    fn journey_detail_url(
        &self,
        station_id: &str,
        trip_code: &str,
        line_id: Option<&str>,
        time_offset: Option<i32>,
    ) -> Result<Url, TransportError> {
        let mut url = self.url(&self.endpoints.journey_detail)?;
        url.query_pairs_mut()
            .append_pair("stopID", station_id)
            .append_pair("tripCode", trip_code)
            .append_pair("useRealtime", "1")
            .append_pair("tStOTType", "all");
        if let Some(line_id) = line_id {
            url.query_pairs_mut().append_pair("line", line_id);
        }
        if let Some(offset) = time_offset {
            url.query_pairs_mut()
                .append_pair("deparr", &offset.to_string());
        }
        Ok(url)
    }
}

/// A context minted by the other protocol family was handed to this engine.
fn foreign_context() -> Error {
    Error::Parse(ParseError::Other(
        "continuation context belongs to a different protocol".into(),
    ))
}

impl<T: Transport> TransitProvider for EfaProvider<T> {
    async fn suggest_locations(
        &self,
        constraint: &str,
        types: Option<&[LocationType]>,
        max_results: usize,
    ) -> Result<SuggestLocationsResult, Error> {
        let url = self.stop_finder_url(constraint, max_results)?;
        let body = self.get(url).await?;
        let mut result = if self.quirks.json_stop_finder {
            parse::parse_stop_finder_json(&body)?
        } else {
            parse::parse_stop_finder_xml(&body)?
        };
        if let Some(types) = types {
            result
                .suggestions
                .retain(|s| types.contains(&s.location.loc_type()));
        }
        result.suggestions.truncate(max_results);
        Ok(result)
    }

    async fn query_nearby_locations(
        &self,
        location: &Location,
        types: Option<&[LocationType]>,
        max_distance_m: u32,
        max_results: usize,
    ) -> Result<NearbyLocationsResult, Error> {
        let Some(url) = self.nearby_url(location, max_distance_m, max_results)? else {
            return Ok(NearbyLocationsResult::InvalidStation);
        };
        let body = self.get(url).await?;
        let mut locations = parse::parse_coord_locations(&body)?;
        if let Some(types) = types {
            locations.retain(|l| types.contains(&l.loc_type()));
        }
        locations.truncate(max_results);
        Ok(NearbyLocationsResult::Success(locations))
    }

    async fn query_trips(
        &self,
        from: &Location,
        via: Option<&Location>,
        to: &Location,
        when: NaiveDateTime,
        dep: bool,
        options: &TripOptions,
    ) -> Result<QueryTripsResult, Error> {
        let url = self.trips_url(from, via, to, when, dep, options)?;
        let body = self.get(url).await?;
        Ok(parse::parse_trips(&body, &self.quirks, None, None)?)
    }

    async fn query_more_trips(
        &self,
        context: &QueryTripsContext,
        later: bool,
    ) -> Result<QueryTripsResult, Error> {
        let QueryTripsContext::Efa { earlier, later: later_pair } = context else {
            return Err(foreign_context());
        };
        let pair = if later { later_pair } else { earlier };
        let Some(pair) = pair else {
            return Ok(QueryTripsResult::SessionExpired);
        };
        let url = self.more_trips_url(&pair.session_id, &pair.request_id, later)?;
        let Some(body) = self.get_continuation(url).await? else {
            return Ok(QueryTripsResult::SessionExpired);
        };
        Ok(parse::parse_trips(
            &body,
            &self.quirks,
            Some(context),
            Some(later),
        )?)
    }

    async fn refresh_trip(&self, context: &RefreshTripContext) -> Result<QueryTripsResult, Error> {
        let RefreshTripContext::Efa {
            session_id,
            request_id,
            route_index,
        } = context
        else {
            return Err(foreign_context());
        };
        let url = self.refresh_url(session_id, request_id, *route_index)?;
        let Some(body) = self.get_continuation(url).await? else {
            return Ok(QueryTripsResult::SessionExpired);
        };
        Ok(parse::parse_trips(&body, &self.quirks, None, None)?)
    }

    async fn query_departures(
        &self,
        station_id: &str,
        departures: bool,
        when: Option<NaiveDateTime>,
        max_departures: usize,
        equivs: bool,
    ) -> Result<QueryDeparturesResult, Error> {
        let url = self.departures_url(station_id, departures, when, max_departures, equivs)?;
        let body = self.get(url).await?;
        Ok(parse::parse_departures(
            &body,
            &self.quirks,
            max_departures,
        )?)
    }

    async fn query_journey_detail(
        &self,
        context: &QueryJourneyDetailContext,
    ) -> Result<QueryJourneyDetailResult, Error> {
        let QueryJourneyDetailContext::Efa {
            station_id,
            trip_code,
            line_id,
            time_offset,
        } = context
        else {
            return Err(foreign_context());
        };
        let url =
            self.journey_detail_url(station_id, trip_code, line_id.as_deref(), *time_offset)?;
        let body = self.get(url).await?;
        Ok(parse::parse_journey_detail(&body, &self.quirks)?)
    }
}
