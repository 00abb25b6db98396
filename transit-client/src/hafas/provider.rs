//! The HAFAS query engine.
//!
//! One provider instance talks to one `mgate.exe` endpoint. Every call is a
//! POST of a single-request service list; the installation's version, auth
//! and client blocks ride along in the envelope. Unidentified locations are
//! resolved through `LocMatch` before a trip search, so the search itself
//! always runs on concrete location ids.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDateTime;
use serde_json::{Value, json};
use tracing::debug;

use crate::context::{QueryJourneyDetailContext, QueryTripsContext, RefreshTripContext};
use crate::domain::{Location, LocationType, Product};
use crate::error::{Error, ParseError};
use crate::provider::{
    NearbyLocationsResult, QueryDeparturesResult, QueryJourneyDetailResult, QueryTripsResult,
    SuggestLocationsResult, TransitProvider, TripOptions,
};
use crate::transport::Transport;

use super::parse::{self, TripQuery};

/// Envelope parameters of one HAFAS installation.
#[derive(Debug, Clone)]
pub struct HafasConfig {
    /// Full `mgate.exe` URL.
    pub endpoint: String,
    /// Interface version string, e.g. "1.45".
    pub ver: String,
    /// Message language, e.g. "deu" or "eng".
    pub lang: String,
    /// The `client` block the installation expects.
    pub client: Value,
    /// The `auth` block, if the installation requires one.
    pub auth: Option<Value>,
}

impl HafasConfig {
    pub fn new(endpoint: impl Into<String>, ver: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ver: ver.into(),
            lang: "deu".into(),
            client: json!({"id": "DB", "type": "AND"}),
            auth: None,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_client(mut self, client: Value) -> Self {
        self.client = client;
        self
    }

    pub fn with_auth(mut self, auth: Value) -> Self {
        self.auth = Some(auth);
        self
    }
}

/// Product assignment for the sixteen possible class bits. Installations
/// disagree on everything above bit 2, so the whole table is swappable.
pub type ClassTable = [Option<Product>; 16];

const DEFAULT_CLASSES: ClassTable = [
    Some(Product::HighSpeedTrain), // bit 0: ICE
    Some(Product::HighSpeedTrain), // bit 1: IC/EC
    Some(Product::HighSpeedTrain), // bit 2: long-distance misc
    Some(Product::RegionalTrain),
    Some(Product::SuburbanTrain),
    Some(Product::Bus),
    Some(Product::Ferry),
    Some(Product::Subway),
    Some(Product::Tram),
    Some(Product::OnDemand),
    None,
    None,
    None,
    None,
    None,
    None,
];

/// Installation-specific deviations from baseline HAFAS behavior.
#[derive(Debug, Clone)]
pub struct HafasQuirks {
    /// Network id stamped onto lines with no administration code.
    pub network_id: Option<String>,
    /// Meaning of each product-class bit.
    pub classes: ClassTable,
}

impl Default for HafasQuirks {
    fn default() -> Self {
        Self {
            network_id: None,
            classes: DEFAULT_CLASSES,
        }
    }
}

impl HafasQuirks {
    /// The product of a single-class bitmask; lowest set bit wins when the
    /// backend ORs several together.
    pub(crate) fn product_for_class(&self, cls: u32) -> Option<Product> {
        let bit = cls.trailing_zeros() as usize;
        if cls == 0 || bit >= self.classes.len() {
            return None;
        }
        self.classes[bit]
    }

    /// Every product covered by a multi-class bitmask, deduplicated.
    pub(crate) fn products_in_class(&self, cls: u32) -> Vec<Product> {
        let mut products = Vec::new();
        for (bit, product) in self.classes.iter().enumerate() {
            if cls & (1 << bit) != 0
                && let Some(product) = product
                && !products.contains(product)
            {
                products.push(*product);
            }
        }
        products
    }

    /// The bitmask covering a product selection.
    pub(crate) fn class_mask(&self, products: &BTreeSet<Product>) -> u32 {
        let mut mask = 0;
        for (bit, product) in self.classes.iter().enumerate() {
            if let Some(product) = product
                && products.contains(product)
            {
                mask |= 1 << bit;
            }
        }
        mask
    }
}

/// A client for one HAFAS installation, generic over the transport.
#[derive(Debug, Clone)]
pub struct HafasProvider<T> {
    transport: T,
    config: HafasConfig,
    quirks: HafasQuirks,
    headers: HashMap<String, String>,
}

/// Outcome of resolving one query endpoint through `LocMatch`.
enum Resolved {
    Unique(Location),
    Candidates(Vec<Location>),
    NoMatch,
}

impl<T: Transport> HafasProvider<T> {
    pub fn new(transport: T, config: HafasConfig) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            transport,
            config,
            quirks: HafasQuirks::default(),
            headers,
        }
    }

    pub fn with_quirks(mut self, quirks: HafasQuirks) -> Self {
        self.quirks = quirks;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// POST one service request and return the raw response body.
    async fn call(&self, meth: &str, req: Value) -> Result<String, Error> {
        let mut envelope = json!({
            "ver": self.config.ver,
            "lang": self.config.lang,
            "client": self.config.client,
            "svcReqL": [{"meth": meth, "req": req}],
        });
        if let Some(auth) = &self.config.auth
            && let Some(envelope) = envelope.as_object_mut()
        {
            envelope.insert("auth".to_string(), auth.clone());
        }
        let body = serde_json::to_vec(&envelope).map_err(ParseError::from)?;

        debug!(meth, "hafas request");
        let response = self
            .transport
            .fetch(&self.config.endpoint, Some(&body), &self.headers)
            .await?;
        Ok(response.text())
    }

    /// The request-side location object for an identified location.
    fn loc_json(location: &Location) -> Option<Value> {
        if let Some(id) = location.id() {
            // Full lids carry their own key=value syntax; bare ids are
            // external station numbers.
            if id.contains('@') {
                return Some(json!({"type": "S", "lid": id}));
            }
            return Some(json!({"type": "S", "extId": id}));
        }
        location.point().map(|point| {
            json!({
                "type": "C",
                "crd": {"x": point.lon_1e6(), "y": point.lat_1e6()},
            })
        })
    }

    /// As [`Self::loc_json`] for a raw station id string.
    fn station_json(station_id: &str) -> Value {
        if station_id.contains('@') {
            json!({"type": "S", "lid": station_id})
        } else {
            json!({"type": "S", "extId": station_id})
        }
    }

    /// Pin down one query endpoint. Identified locations pass through; the
    /// rest go through a name match.
    async fn resolve(&self, location: &Location) -> Result<Resolved, Error> {
        if location.is_identified() {
            return Ok(Resolved::Unique(location.clone()));
        }
        let name = location.name().unwrap_or("");
        let result = self
            .suggest_locations(name, Some(&[LocationType::Station]), 10)
            .await?;
        let mut candidates: Vec<Location> = result
            .suggestions
            .into_iter()
            .map(|s| s.location)
            .collect();
        match candidates.len() {
            0 => Ok(Resolved::NoMatch),
            1 => Ok(Resolved::Unique(candidates.remove(0))),
            _ => Ok(Resolved::Candidates(candidates)),
        }
    }

    fn trip_search_req(
        &self,
        from: &Location,
        via: Option<&Location>,
        to: &Location,
        when: NaiveDateTime,
        dep: bool,
        options: &TripOptions,
        cursor: Option<(&str, bool)>,
    ) -> Result<Value, Error> {
        let dep_loc = Self::loc_json(from).ok_or_else(unresolved_location)?;
        let arr_loc = Self::loc_json(to).ok_or_else(unresolved_location)?;

        let mut req = json!({
            "depLocL": [dep_loc],
            "arrLocL": [arr_loc],
            "outDate": when.format("%Y%m%d").to_string(),
            "outTime": when.format("%H%M%S").to_string(),
            "outFrwd": dep,
            "getPasslist": true,
            "getPolyline": true,
            "getTariff": true,
            "numF": 4,
        });
        let object = req
            .as_object_mut()
            .ok_or_else(|| Error::Parse(ParseError::Other("request not an object".into())))?;

        if let Some(via) = via {
            let via_loc = Self::loc_json(via).ok_or_else(unresolved_location)?;
            object.insert("viaLocL".to_string(), json!([{"loc": via_loc}]));
        }
        let mut filters = Vec::new();
        if let Some(products) = &options.products {
            let mask = self.quirks.class_mask(products);
            if mask != 0 {
                filters.push(json!({
                    "type": "PROD",
                    "mode": "INC",
                    "value": mask.to_string(),
                }));
            }
        }
        if options.flags.contains(&crate::provider::TripFlag::Bike) {
            filters.push(json!({"type": "BC", "mode": "INC"}));
        }
        if !filters.is_empty() {
            object.insert("jnyFltrL".to_string(), json!(filters));
        }
        if let Some(minutes) = options.min_change_time {
            object.insert("minChgTime".to_string(), json!(minutes));
        }
        if let Some((cursor, later)) = cursor {
            object.insert("ctxScr".to_string(), json!(cursor));
            object.insert("outFrwd".to_string(), json!(later));
        }
        Ok(req)
    }

    fn station_board_req(
        station_id: &str,
        departures: bool,
        when: Option<NaiveDateTime>,
        max_departures: usize,
        equivs: bool,
    ) -> Value {
        let mut req = json!({
            "type": if departures { "DEP" } else { "ARR" },
            "stbLoc": Self::station_json(station_id),
            "stbFltrEquiv": equivs,
            "maxJny": max_departures.max(1),
        });
        if let Some(when) = when
            && let Some(object) = req.as_object_mut()
        {
            object.insert("date".to_string(), json!(when.format("%Y%m%d").to_string()));
            object.insert("time".to_string(), json!(when.format("%H%M%S").to_string()));
        }
        req
    }
}

/// A context minted by the other protocol family was handed to this engine.
fn foreign_context() -> Error {
    Error::Parse(ParseError::Other(
        "continuation context belongs to a different protocol".into(),
    ))
}

fn unresolved_location() -> Error {
    Error::Parse(ParseError::Other(
        "location has neither id nor coordinates after resolution".into(),
    ))
}

impl<T: Transport> TransitProvider for HafasProvider<T> {
    async fn suggest_locations(
        &self,
        constraint: &str,
        types: Option<&[LocationType]>,
        max_results: usize,
    ) -> Result<SuggestLocationsResult, Error> {
        // The trailing "?" asks for completion matches, not exact ones.
        let req = json!({
            "input": {
                "loc": {"type": "ALL", "name": format!("{constraint}?")},
                "maxLoc": max_results.max(1),
                "field": "S",
            },
        });
        let body = self.call("LocMatch", req).await?;
        let mut result = parse::parse_loc_match(&body, &self.quirks)?;
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
        let Some(point) = location.point() else {
            return Ok(NearbyLocationsResult::InvalidStation);
        };
        let radius = if max_distance_m == 0 { 1320 } else { max_distance_m };
        let pois = types.is_none_or(|t| t.contains(&LocationType::Poi));
        let req = json!({
            "ring": {
                "cCrd": {"x": point.lon_1e6(), "y": point.lat_1e6()},
                "maxDist": radius,
            },
            "getStops": true,
            "getPOIs": pois,
            "maxLoc": max_results.max(1),
        });
        let body = self.call("LocGeoPos", req).await?;
        match parse::parse_loc_geo_pos(&body, &self.quirks)? {
            NearbyLocationsResult::Success(mut locations) => {
                if let Some(types) = types {
                    locations.retain(|l| types.contains(&l.loc_type()));
                }
                locations.truncate(max_results);
                Ok(NearbyLocationsResult::Success(locations))
            }
            other => Ok(other),
        }
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
        // Resolve every slot before reporting, so an ambiguous answer can
        // carry all candidate lists at once.
        let from = self.resolve(from).await?;
        let via = match via {
            Some(via) => Some(self.resolve(via).await?),
            None => None,
        };
        let to = self.resolve(to).await?;

        if matches!(from, Resolved::NoMatch) {
            return Ok(QueryTripsResult::UnknownFrom);
        }
        if matches!(via, Some(Resolved::NoMatch)) {
            return Ok(QueryTripsResult::UnknownVia);
        }
        if matches!(to, Resolved::NoMatch) {
            return Ok(QueryTripsResult::UnknownTo);
        }

        let candidates = |resolved: &Resolved| match resolved {
            Resolved::Candidates(list) => list.clone(),
            _ => Vec::new(),
        };
        let ambiguous = matches!(from, Resolved::Candidates(_))
            || matches!(via, Some(Resolved::Candidates(_)))
            || matches!(to, Resolved::Candidates(_));
        if ambiguous {
            return Ok(QueryTripsResult::Ambiguous {
                from: candidates(&from),
                via: via.as_ref().map(&candidates).unwrap_or_default(),
                to: candidates(&to),
            });
        }

        let (Resolved::Unique(from), Resolved::Unique(to)) = (from, to) else {
            return Err(unresolved_location());
        };
        let via = match via {
            Some(Resolved::Unique(via)) => Some(via),
            _ => None,
        };

        let req =
            self.trip_search_req(&from, via.as_ref(), &to, when, dep, options, None)?;
        let body = self.call("TripSearch", req).await?;
        let query = TripQuery {
            from,
            via,
            to,
            when,
            dep,
            options: options.clone(),
            earlier_cursor: None,
            later_cursor: None,
        };
        Ok(parse::parse_trip_search(
            &body,
            "TripSearch",
            &self.quirks,
            Some(&query),
        )?)
    }

    async fn query_more_trips(
        &self,
        context: &QueryTripsContext,
        later: bool,
    ) -> Result<QueryTripsResult, Error> {
        let QueryTripsContext::Hafas {
            from,
            via,
            to,
            when,
            dep,
            options,
            earlier_cursor,
            later_cursor,
        } = context
        else {
            return Err(foreign_context());
        };
        let cursor = if later { later_cursor } else { earlier_cursor };
        let Some(cursor) = cursor else {
            return Ok(QueryTripsResult::SessionExpired);
        };

        let req = self.trip_search_req(
            from,
            via.as_ref(),
            to,
            *when,
            *dep,
            options,
            Some((cursor, later)),
        )?;
        let body = self.call("TripSearch", req).await?;
        let query = TripQuery {
            from: from.clone(),
            via: via.clone(),
            to: to.clone(),
            when: *when,
            dep: *dep,
            options: options.clone(),
            earlier_cursor: earlier_cursor.clone(),
            later_cursor: later_cursor.clone(),
        };
        Ok(parse::parse_trip_search(
            &body,
            "TripSearch",
            &self.quirks,
            Some(&query),
        )?)
    }

    async fn refresh_trip(&self, context: &RefreshTripContext) -> Result<QueryTripsResult, Error> {
        let RefreshTripContext::Hafas {
            reconstruction_token,
        } = context
        else {
            return Err(foreign_context());
        };
        let req = json!({
            "ctxRecon": reconstruction_token,
            "getPasslist": true,
            "getPolyline": true,
            "getTariff": true,
        });
        let body = self.call("Reconstruction", req).await?;
        Ok(parse::parse_trip_search(
            &body,
            "Reconstruction",
            &self.quirks,
            None,
        )?)
    }

    async fn query_departures(
        &self,
        station_id: &str,
        departures: bool,
        when: Option<NaiveDateTime>,
        max_departures: usize,
        equivs: bool,
    ) -> Result<QueryDeparturesResult, Error> {
        let req = Self::station_board_req(station_id, departures, when, max_departures, equivs);
        let body = self.call("StationBoard", req).await?;
        Ok(parse::parse_station_board(&body, &self.quirks)?)
    }

    async fn query_journey_detail(
        &self,
        context: &QueryJourneyDetailContext,
    ) -> Result<QueryJourneyDetailResult, Error> {
        let QueryJourneyDetailContext::Hafas { journey_id } = context else {
            return Err(foreign_context());
        };
        let req = json!({
            "jid": journey_id,
            "getPasslist": true,
            "getPolyline": true,
        });
        let body = self.call("JourneyDetails", req).await?;
        Ok(parse::parse_journey_details(&body, &self.quirks)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Point;
    use crate::transport::{FetchResponse, TransportError};

    /// A transport that answers every request with one canned body.
    struct Canned(&'static str);

    impl Transport for Canned {
        async fn fetch(
            &self,
            _url: &str,
            _body: Option<&[u8]>,
            _headers: &HashMap<String, String>,
        ) -> Result<FetchResponse, TransportError> {
            Ok(FetchResponse {
                status: 200,
                body: self.0.as_bytes().to_vec(),
            })
        }
    }

    fn provider(body: &'static str) -> HafasProvider<Canned> {
        HafasProvider::new(
            Canned(body),
            HafasConfig::new("https://hafas.example/bin/mgate.exe", "1.45"),
        )
    }

    #[test]
    fn default_class_table() {
        let quirks = HafasQuirks::default();
        assert_eq!(quirks.product_for_class(1), Some(Product::HighSpeedTrain));
        assert_eq!(quirks.product_for_class(1 << 4), Some(Product::SuburbanTrain));
        assert_eq!(quirks.product_for_class(1 << 9), Some(Product::OnDemand));
        assert_eq!(quirks.product_for_class(1 << 12), None);
        assert_eq!(quirks.product_for_class(0), None);

        // 0b11111: the three long-distance bits collapse to one product.
        assert_eq!(
            quirks.products_in_class(31),
            vec![
                Product::HighSpeedTrain,
                Product::RegionalTrain,
                Product::SuburbanTrain
            ]
        );

        let mask = quirks.class_mask(&[Product::SuburbanTrain, Product::Bus].into());
        assert_eq!(mask, (1 << 4) | (1 << 5));
    }

    #[test]
    fn location_request_shapes() {
        let lid = Location::station("A=1@O=Berlin Hbf@L=8011160@").unwrap();
        assert_eq!(
            HafasProvider::<Canned>::loc_json(&lid).unwrap(),
            json!({"type": "S", "lid": "A=1@O=Berlin Hbf@L=8011160@"})
        );

        let ext = Location::station("8011160").unwrap();
        assert_eq!(
            HafasProvider::<Canned>::loc_json(&ext).unwrap(),
            json!({"type": "S", "extId": "8011160"})
        );

        let coord = Location::coord(Point::from_1e6(52_525_589, 13_369_549));
        assert_eq!(
            HafasProvider::<Canned>::loc_json(&coord).unwrap(),
            json!({"type": "C", "crd": {"x": 13_369_549, "y": 52_525_589}})
        );

        assert!(HafasProvider::<Canned>::loc_json(&Location::any("Hbf")).is_none());
    }

    #[test]
    fn trip_search_request_fields() {
        let p = provider("");
        let from = Location::station("8011160").unwrap();
        let to = Location::station("8002549").unwrap();
        let when = chrono::NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let options = TripOptions {
            products: Some([Product::SuburbanTrain].into_iter().collect()),
            min_change_time: Some(5),
            ..TripOptions::default()
        };
        let req = p
            .trip_search_req(&from, None, &to, when, true, &options, None)
            .unwrap();
        assert_eq!(req["outDate"], "20250601");
        assert_eq!(req["outTime"], "103000");
        assert_eq!(req["outFrwd"], true);
        assert_eq!(req["minChgTime"], 5);
        assert_eq!(req["jnyFltrL"][0]["type"], "PROD");
        assert_eq!(req["jnyFltrL"][0]["value"], (1u32 << 4).to_string());
        assert!(req.get("viaLocL").is_none());

        let cursor = p
            .trip_search_req(&from, None, &to, when, true, &options, Some(("SCROLL", false)))
            .unwrap();
        assert_eq!(cursor["ctxScr"], "SCROLL");
        assert_eq!(cursor["outFrwd"], false);
    }

    #[test]
    fn station_board_request_selects_direction() {
        let req = HafasProvider::<Canned>::station_board_req("8011160", true, None, 10, false);
        assert_eq!(req["type"], "DEP");
        assert_eq!(req["stbLoc"], json!({"type": "S", "extId": "8011160"}));

        let req = HafasProvider::<Canned>::station_board_req("8011160", false, None, 10, true);
        assert_eq!(req["type"], "ARR");
        assert_eq!(req["stbFltrEquiv"], true);
    }

    #[tokio::test]
    async fn foreign_context_is_rejected() {
        let p = provider("");
        let context = RefreshTripContext::Efa {
            session_id: "s".into(),
            request_id: "1".into(),
            route_index: 0,
        };
        assert!(p.refresh_trip(&context).await.is_err());
    }

    #[tokio::test]
    async fn exhausted_direction_is_session_expired() {
        let p = provider("");
        let context = QueryTripsContext::Hafas {
            from: Location::station("8011160").unwrap(),
            via: None,
            to: Location::station("8002549").unwrap(),
            when: chrono::NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            dep: true,
            options: TripOptions::default(),
            earlier_cursor: None,
            later_cursor: Some("LATER".into()),
        };
        assert_eq!(
            p.query_more_trips(&context, false).await.unwrap(),
            QueryTripsResult::SessionExpired
        );
    }

    #[tokio::test]
    async fn name_only_endpoints_resolve_to_ambiguous() {
        // Every request sees the same two-hit LocMatch answer, so both
        // endpoints come back ambiguous with their candidate lists.
        let p = provider(
            r#"{"svcResL": [{"meth": "LocMatch", "err": "OK", "res": {
                "match": {"locL": [
                    {"lid": "A=1@L=1@", "type": "S", "name": "Neustadt (Dosse)"},
                    {"lid": "A=1@L=2@", "type": "S", "name": "Neustadt (Holstein)"}
                ]}
            }}]}"#,
        );
        let when = chrono::NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let result = p
            .query_trips(
                &Location::any("Neustadt"),
                None,
                &Location::station("8011160").unwrap(),
                when,
                true,
                &TripOptions::default(),
            )
            .await
            .unwrap();
        let QueryTripsResult::Ambiguous { from, via, to } = result else {
            panic!("expected ambiguous");
        };
        assert_eq!(from.len(), 2);
        assert!(via.is_empty() && to.is_empty());
        assert_eq!(from[0].name(), Some("Neustadt (Dosse)"));
    }

    #[tokio::test]
    async fn unmatched_origin_is_unknown_from() {
        let p = provider(
            r#"{"svcResL": [{"meth": "LocMatch", "err": "OK", "res": {"match": {"locL": []}}}]}"#,
        );
        let when = chrono::NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let result = p
            .query_trips(
                &Location::any("Nirgendwo"),
                None,
                &Location::station("8011160").unwrap(),
                when,
                true,
                &TripOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result, QueryTripsResult::UnknownFrom);
    }
}
