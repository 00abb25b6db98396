//! DTOs for the EFA mobile JSON stop finder.
//!
//! Only the stop finder has a JSON shape worth supporting; everything else
//! in the EFA family is XML. The `points` member is either a list or a
//! single object, so it gets a custom untagged wrapper.

use serde::Deserialize;

/// Envelope of a mobile `XML_STOPFINDER_REQUEST?outputFormat=JSON` call.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonStopFinderResponse {
    #[serde(rename = "stopFinder")]
    pub stop_finder: JsonStopFinder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonStopFinder {
    /// Plural on multi-match, singular object on an exact match.
    #[serde(default)]
    pub points: Option<JsonPoints>,
    #[serde(default)]
    pub point: Option<JsonPoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JsonPoints {
    List(Vec<JsonPoint>),
    /// Single-match deployments nest the one point one level deeper.
    One { point: JsonPoint },
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonPoint {
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(rename = "type", default)]
    pub point_type: Option<String>,
    /// Globally stable id ("de:08111:6056").
    #[serde(default)]
    pub stateless: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub posttown: Option<String>,
    /// "lon,lat" in micro-degrees, comma-separated.
    #[serde(rename = "ref", default)]
    pub reference: Option<JsonPointRef>,
    #[serde(default)]
    pub quality: Option<JsonNumber>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonPointRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub coords: Option<String>,
}

/// EFA emits numbers as strings on some installations.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JsonNumber {
    Int(i64),
    Text(String),
}

impl JsonNumber {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            JsonNumber::Int(v) => Some(*v),
            JsonNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_point_list() {
        let json = r#"{
            "stopFinder": {
                "points": [
                    {
                        "usage": "sf",
                        "type": "any",
                        "stateless": "de:08111:6056",
                        "name": "Stuttgart, Hauptbahnhof",
                        "object": "Hauptbahnhof",
                        "ref": {"place": "Stuttgart", "coords": "9182400,48783600"},
                        "quality": "980"
                    }
                ]
            }
        }"#;
        let response: JsonStopFinderResponse = serde_json::from_str(json).unwrap();
        match response.stop_finder.points.unwrap() {
            JsonPoints::List(points) => {
                assert_eq!(points.len(), 1);
                assert_eq!(points[0].stateless.as_deref(), Some("de:08111:6056"));
                assert_eq!(points[0].quality.as_ref().unwrap().as_i64(), Some(980));
            }
            JsonPoints::One { .. } => panic!("expected list"),
        }
    }

    #[test]
    fn deserialize_single_point() {
        let json = r#"{
            "stopFinder": {
                "point": {"type": "stop", "stateless": "de:08111:2599", "name": "Vaihingen"}
            }
        }"#;
        let response: JsonStopFinderResponse = serde_json::from_str(json).unwrap();
        assert!(response.stop_finder.point.is_some());
        assert!(response.stop_finder.points.is_none());
    }

    #[test]
    fn number_as_string_or_int() {
        assert_eq!(JsonNumber::Int(7).as_i64(), Some(7));
        assert_eq!(JsonNumber::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(JsonNumber::Text("abc".into()).as_i64(), None);
    }
}
