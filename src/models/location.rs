//! Inbound location events and point types.

use serde::{Deserialize, Serialize};

/// Geographic point (lat/lon, WGS84 degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both coordinates are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// geo uses x = lon, y = lat
    pub fn to_point(self) -> geo::Point<f64> {
        geo::Point::new(self.lon, self.lat)
    }

    /// Great-circle distance in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        use geo::{Distance, Haversine};
        Haversine.distance(self.to_point(), other.to_point())
    }
}

/// Raw location event as produced upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationEvent {
    pub property_id: String,

    pub country: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,

    /// Explicit address visibility set by the publisher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_address: Option<bool>,
}

impl LocationEvent {
    /// Street and house number are both present and non-blank.
    pub fn has_street_address(&self) -> bool {
        fn filled(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        }
        filled(&self.street) && filled(&self.house_number)
    }

    /// Coordinates, when both halves are present.
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_street_address_requires_both_parts() {
        let mut event = LocationEvent {
            property_id: "p-1".to_string(),
            country: "Spain".to_string(),
            street: Some("Carrer de Mallorca".to_string()),
            ..Default::default()
        };
        assert!(!event.has_street_address());

        event.house_number = Some("  ".to_string());
        assert!(!event.has_street_address());

        event.house_number = Some("401".to_string());
        assert!(event.has_street_address());
    }

    #[test]
    fn test_parse_minimal_event() {
        let event: LocationEvent = serde_json::from_str(
            r#"{"property_id":"p-9","country":"Spain","city":"Barcelona","lat":41.3851,"lon":2.1734}"#,
        )
        .unwrap();
        assert!(!event.has_street_address());
        assert_eq!(event.point(), Some(GeoPoint::new(41.3851, 2.1734)));
        assert_eq!(event.show_address, None);
    }

    #[test]
    fn test_point_validation() {
        assert!(GeoPoint::new(41.38, 2.17).is_valid());
        assert!(!GeoPoint::new(91.0, 2.17).is_valid());
        assert!(!GeoPoint::new(41.38, f64::NAN).is_valid());
    }

    #[test]
    fn test_distance_is_roughly_right() {
        // Plaça de Catalunya to Sagrada Família is a bit over 2 km
        let a = GeoPoint::new(41.3870, 2.1701);
        let b = GeoPoint::new(41.4036, 2.1744);
        let d = a.distance_m(&b);
        assert!(d > 1800.0 && d < 2000.0, "distance was {d}");
    }
}
