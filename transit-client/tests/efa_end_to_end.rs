//! End-to-end tests for the EFA engine against a mock installation.

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use transit_client::domain::{Leg, Location, Product};
use transit_client::efa::{EfaEndpoints, EfaProvider};
use transit_client::{
    HttpTransport, QueryDeparturesResult, QueryTripsContext, QueryTripsResult,
    SuggestLocationsResult, TransitProvider, TripOptions,
};

fn provider(server: &MockServer) -> EfaProvider<HttpTransport> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    EfaProvider::new(
        HttpTransport::new(5).unwrap(),
        EfaEndpoints::from_api_base(&server.uri()),
    )
}

fn when() -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2025, 6, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

const STOP_FINDER_XML: &str = r#"<itdRequest>
  <itdStopFinderRequest>
    <itdOdv usage="sf">
      <itdOdvName state="identified">
        <odvNameElem stateless="de:08111:6056" anyType="stop" locality="Stuttgart"
            x="9182400" y="48783600" matchQuality="980">Hauptbahnhof</odvNameElem>
      </itdOdvName>
    </itdOdv>
  </itdStopFinderRequest>
</itdRequest>"#;

const TRIP_XML: &str = r#"<itdRequest sessionID="SESSION" requestID="7">
  <itdTripRequest>
    <itdOdv usage="origin">
      <itdOdvName state="identified">
        <odvNameElem stateless="de:08111:6056" anyType="stop"
            locality="Stuttgart">Hauptbahnhof</odvNameElem>
      </itdOdvName>
    </itdOdv>
    <itdOdv usage="destination">
      <itdOdvName state="identified">
        <odvNameElem stateless="de:08111:2599" anyType="stop"
            locality="Stuttgart">Vaihingen</odvNameElem>
      </itdOdvName>
    </itdOdv>
    <itdItinerary><itdRouteList><itdRoute>
      <itdPartialRouteList>
        <itdPartialRoute>
          <itdPoint usage="departure" stopID="de:08111:6056" name="Hauptbahnhof"
              place="Stuttgart" platformName="101">
            <itdDateTime><itdDate year="2025" month="6" day="1"/>
              <itdTime hour="10" minute="0"/></itdDateTime>
          </itdPoint>
          <itdPoint usage="arrival" stopID="de:08111:2599" name="Vaihingen" place="Stuttgart">
            <itdDateTime><itdDate year="2025" month="6" day="1"/>
              <itdTime hour="10" minute="12"/></itdDateTime>
          </itdPoint>
          <itdMeansOfTransport type="1" motType="1" symbol="S2" shortname="S2"
              destination="Filderstadt" stateless="vvs:S2" key="21"/>
          <itdStopSeq>
            <itdPoint stopID="de:08111:6056" name="Hauptbahnhof" place="Stuttgart">
              <itdDateTime><itdDate year="2025" month="6" day="1"/>
                <itdTime hour="10" minute="0"/></itdDateTime>
            </itdPoint>
            <itdPoint stopID="de:08111:2599" name="Vaihingen" place="Stuttgart">
              <itdDateTime><itdDate year="2025" month="6" day="1"/>
                <itdTime hour="10" minute="12"/></itdDateTime>
            </itdPoint>
          </itdStopSeq>
        </itdPartialRoute>
      </itdPartialRouteList>
      <itdFare><itdSingleTicket net="vvs" currency="EUR" fareAdult="3.60"
          fareChild="1.70" unitName="Zonen" unitsAdult="2"/></itdFare>
    </itdRoute></itdRouteList></itdItinerary>
  </itdTripRequest>
</itdRequest>"#;

#[tokio::test]
async fn suggest_locations_returns_identified_station() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/XML_STOPFINDER_REQUEST"))
        .and(query_param("name_sf", "Hauptbahnhof"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STOP_FINDER_XML))
        .mount(&server)
        .await;

    let SuggestLocationsResult { suggestions } = provider(&server)
        .suggest_locations("Hauptbahnhof", None, 10)
        .await
        .unwrap();

    assert_eq!(suggestions.len(), 1);
    let location = &suggestions[0].location;
    assert_eq!(location.id(), Some("de:08111:6056"));
    assert_eq!(location.place(), Some("Stuttgart"));
    assert_eq!(suggestions[0].priority, 980);
}

#[tokio::test]
async fn query_trips_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/XML_TRIP_REQUEST2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TRIP_XML))
        .mount(&server)
        .await;

    let result = provider(&server)
        .query_trips(
            &Location::station("de:08111:6056").unwrap(),
            None,
            &Location::station("de:08111:2599").unwrap(),
            when(),
            true,
            &TripOptions::default(),
        )
        .await
        .unwrap();

    let QueryTripsResult::Success { context, trips, .. } = result else {
        panic!("expected success");
    };
    assert_eq!(trips.len(), 1);
    let Leg::Public(leg) = &trips[0].legs[0] else {
        panic!("expected public leg");
    };
    assert_eq!(leg.line.label.as_deref(), Some("S2"));
    assert_eq!(leg.line.product, Some(Product::SuburbanTrain));
    assert_eq!(trips[0].fares.len(), 2);

    // Both directions page on the returned session pair.
    let context = context.unwrap();
    assert!(context.can_query_earlier() && context.can_query_later());
}

#[tokio::test]
async fn evicted_session_is_session_expired() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/XML_TRIP_REQUEST2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let context = QueryTripsContext::Efa {
        earlier: Some(transit_client::context::EfaPagination {
            session_id: "SESSION".into(),
            request_id: "7".into(),
        }),
        later: Some(transit_client::context::EfaPagination {
            session_id: "SESSION".into(),
            request_id: "7".into(),
        }),
    };
    let result = provider(&server)
        .query_more_trips(&context, true)
        .await
        .unwrap();
    assert_eq!(result, QueryTripsResult::SessionExpired);
}

#[tokio::test]
async fn departures_at_unknown_stop_is_invalid_station() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/XML_DM_REQUEST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<itdRequest><itdDepartureMonitorRequest>
              <itdOdv usage="dm"><itdOdvName state="notidentified"/></itdOdv>
            </itdDepartureMonitorRequest></itdRequest>"#,
        ))
        .mount(&server)
        .await;

    let result = provider(&server)
        .query_departures("gibberish", true, None, 10, false)
        .await
        .unwrap();
    assert_eq!(result, QueryDeparturesResult::InvalidStation);
}
