//! Encoded polyline decoding.
//!
//! Both protocol families ship travelled paths in the Google polyline
//! encoding: each coordinate is a zig-zag-signed delta, split into 5-bit
//! groups, each group offset by 63 into printable ASCII with bit 0x20 as
//! the continuation marker. The encoding carries 1E5-degree precision;
//! decoded values are scaled by ten into the micro-degrees the domain
//! model uses.

use crate::domain::Point;
use crate::error::ParseError;

/// Decode an encoded polyline into micro-degree points.
///
/// The empty string is a valid polyline with zero points, not an error.
///
/// # Examples
///
/// ```
/// use transit_client::polyline::decode;
///
/// let points = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
/// assert_eq!(points.len(), 3);
/// assert_eq!(points[0].lat_1e6(), 38_500_000);
/// assert_eq!(points[0].lon_1e6(), -120_200_000);
/// ```
pub fn decode(encoded: &str) -> Result<Vec<Point>, ParseError> {
    let mut points = Vec::new();
    let mut bytes = encoded.bytes();
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;

    loop {
        let Some(dlat) = next_varint(&mut bytes)? else {
            break;
        };
        let dlon = next_varint(&mut bytes)?.ok_or_else(|| {
            ParseError::InvalidCoordinate("polyline ends mid-coordinate".into())
        })?;

        lat += dlat;
        lon += dlon;

        let to_micro = |v: i64| -> Result<i32, ParseError> {
            i32::try_from(v * 10)
                .map_err(|_| ParseError::InvalidCoordinate(format!("polyline value {v} overflows")))
        };
        points.push(Point::from_1e6(to_micro(lat)?, to_micro(lon)?));
    }

    Ok(points)
}

/// Read one zig-zag varint; `None` at clean end of input.
fn next_varint(bytes: &mut impl Iterator<Item = u8>) -> Result<Option<i64>, ParseError> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    let mut any = false;

    for b in bytes.by_ref() {
        if !(63..=126).contains(&b) {
            return Err(ParseError::InvalidCoordinate(format!(
                "invalid polyline byte 0x{b:02x}"
            )));
        }
        any = true;
        let chunk = i64::from(b - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk & 0x20 == 0 {
            // Zig-zag back to signed.
            let value = if result & 1 != 0 {
                !(result >> 1)
            } else {
                result >> 1
            };
            return Ok(Some(value));
        }
        if shift > 60 {
            return Err(ParseError::InvalidCoordinate(
                "polyline varint too long".into(),
            ));
        }
    }

    if any {
        return Err(ParseError::InvalidCoordinate(
            "polyline ends mid-varint".into(),
        ));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero_points() {
        assert_eq!(decode("").unwrap(), Vec::new());
    }

    #[test]
    fn reference_example() {
        // The published reference vector: (38.5, -120.2), (40.7, -120.95),
        // (43.252, -126.453).
        let points = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
        assert_eq!(
            points,
            vec![
                Point::from_1e6(38_500_000, -120_200_000),
                Point::from_1e6(40_700_000, -120_950_000),
                Point::from_1e6(43_252_000, -126_453_000),
            ]
        );
    }

    #[test]
    fn single_point() {
        let points = decode("_p~iF~ps|U").unwrap();
        assert_eq!(points, vec![Point::from_1e6(38_500_000, -120_200_000)]);
    }

    #[test]
    fn truncated_varint_rejected() {
        // '_' has the continuation bit set, so the stream is incomplete.
        assert!(decode("_").is_err());
    }

    #[test]
    fn dangling_latitude_rejected() {
        // One complete varint, but no longitude to pair it with.
        assert!(matches!(
            decode("_p~iF"),
            Err(ParseError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn invalid_byte_rejected() {
        assert!(decode("_p~iF\x07").is_err());
    }

    #[test]
    fn zero_deltas() {
        // "??" encodes (0, 0).
        let points = decode("??").unwrap();
        assert_eq!(points, vec![Point::from_1e6(0, 0)]);
    }
}
