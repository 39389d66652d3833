//! Display coordinates for alert source addresses.
//!
//! This is a cosmetic hash that spreads sources across a world map. It is
//! NOT geolocation: the coordinates carry no information about where an
//! address is located.

use serde::{Deserialize, Serialize};

/// Latitude/longitude pair used only for visualization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub lat: f64,
    pub lng: f64,
}

/// Position returned for addresses that are not four dotted decimal octets.
pub const FALLBACK_POSITION: GeoPosition = GeoPosition { lat: 0.0, lng: 0.0 };

/// Latitudes are kept inside `[-80, 80)` to bias markers toward
/// populated regions.
const LAT_SPAN: f64 = 160.0;
const LNG_SPAN: f64 = 360.0;

const OCTET_WEIGHTS: [f64; 4] = [3.141_59, 2.718_28, 1.414_21, 1.732_05];

/// Project a source address onto a stable display coordinate.
///
/// The first octet pair drives latitude and the second pair longitude, each
/// pair combined with distinct irrational-like weights and reduced modulo the
/// coordinate span. The same address always yields bit-identical output.
/// Never fails: malformed input maps to [`FALLBACK_POSITION`].
pub fn project(address: &str) -> GeoPosition {
    let Some([a, b, c, d]) = parse_octets(address) else {
        return FALLBACK_POSITION;
    };

    let lat_hash = f64::from(a) * OCTET_WEIGHTS[0] + f64::from(b) * OCTET_WEIGHTS[1];
    let lng_hash = f64::from(c) * OCTET_WEIGHTS[2] + f64::from(d) * OCTET_WEIGHTS[3];

    GeoPosition {
        lat: lat_hash % LAT_SPAN - LAT_SPAN / 2.0,
        lng: lng_hash % LNG_SPAN - LNG_SPAN / 2.0,
    }
}

/// Split a dotted-quad into four octets. Each part must be 1-3 ASCII digits
/// with a value of at most 255.
fn parse_octets(address: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = address.trim().split('.');

    for slot in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }

    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}
