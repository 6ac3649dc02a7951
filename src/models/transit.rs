//! Transit stops, lines and the matcher's output type.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::admin::first_by_key;
use super::location::GeoPoint;
use super::normalize::normalized_key;

/// Transit mode of a stop or line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitMode {
    Metro,
    Train,
    Tram,
    Bus,
    Ferry,
    Other,
}

impl TransitMode {
    /// Parse OSM/GTFS style mode tags. Unknown values map to `Other`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "metro" | "subway" | "light_rail" | "underground" => TransitMode::Metro,
            "train" | "rail" | "railway" | "commuter_rail" | "suburban" => TransitMode::Train,
            "tram" | "streetcar" => TransitMode::Tram,
            "bus" | "trolleybus" | "coach" => TransitMode::Bus,
            "ferry" | "boat" => TransitMode::Ferry,
            _ => TransitMode::Other,
        }
    }

    /// Priority tier: 1 = rail/high capacity, 2 = surface, 3 = fallback only
    pub fn tier(&self) -> u8 {
        match self {
            TransitMode::Metro | TransitMode::Train => 1,
            TransitMode::Tram | TransitMode::Bus => 2,
            TransitMode::Ferry | TransitMode::Other => 3,
        }
    }

    /// Modes belonging to a tier
    pub fn in_tier(tier: u8) -> &'static [TransitMode] {
        match tier {
            1 => &[TransitMode::Metro, TransitMode::Train],
            2 => &[TransitMode::Tram, TransitMode::Bus],
            _ => &[TransitMode::Ferry, TransitMode::Other],
        }
    }
}

impl std::fmt::Display for TransitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitMode::Metro => write!(f, "metro"),
            TransitMode::Train => write!(f, "train"),
            TransitMode::Tram => write!(f, "tram"),
            TransitMode::Bus => write!(f, "bus"),
            TransitMode::Ferry => write!(f, "ferry"),
            TransitMode::Other => write!(f, "other"),
        }
    }
}

/// A physical transit stop (platform, entrance or pole)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitStop {
    pub id: String,

    /// Multilingual names: {"default": "...", "ca": "...", "es": "..."}
    pub name: HashMap<String, String>,

    pub mode: TransitMode,

    pub location: GeoPoint,

    /// Dedup key derived from the default name
    pub name_key: String,
}

impl TransitStop {
    pub fn new(
        id: impl Into<String>,
        name: HashMap<String, String>,
        mode: TransitMode,
        location: GeoPoint,
    ) -> Self {
        let name_key = name
            .get("default")
            .or_else(|| first_by_key(&name))
            .map(|n| normalized_key(n))
            .unwrap_or_default();

        Self {
            id: id.into(),
            name,
            mode,
            location,
            name_key,
        }
    }

    pub fn default_name(&self) -> Option<&str> {
        self.name
            .get("default")
            .or_else(|| first_by_key(&self.name))
            .map(String::as_str)
    }

    /// Key used for dedup. Unnamed stops never collapse into each other.
    pub fn dedup_key(&self) -> &str {
        if self.name_key.is_empty() {
            &self.id
        } else {
            &self.name_key
        }
    }
}

/// A transit route geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitLine {
    pub id: String,

    /// Public reference code ("L3", "V15", "R2N")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    pub mode: TransitMode,
}

impl TransitLine {
    /// Key collapsing direction variants of the same route.
    pub fn dedup_key(&self) -> String {
        let by_ref = self
            .reference
            .as_deref()
            .map(normalized_key)
            .filter(|k| !k.is_empty());

        by_ref
            .or_else(|| Some(normalized_key(&self.name)).filter(|k| !k.is_empty()))
            .unwrap_or_else(|| self.id.clone())
    }
}

/// A stop selected for a search point, with the lines that serve it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestStop {
    pub stop: TransitStop,

    /// Straight-line distance from the search point in meters
    pub distance_m: f64,

    /// Priority tier of the stop's mode (1 first)
    pub priority: u8,

    #[serde(default)]
    pub lines: Vec<TransitLine>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walking_distance_m: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walking_duration_s: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(default: &str) -> HashMap<String, String> {
        HashMap::from([("default".to_string(), default.to_string())])
    }

    #[test]
    fn test_name_without_default_uses_smallest_language() {
        let stop = TransitStop::new(
            "node/7",
            HashMap::from([
                ("ru".to_string(), "Каталония".to_string()),
                ("ca".to_string(), "Catalunya".to_string()),
                ("es".to_string(), "Cataluña".to_string()),
            ]),
            TransitMode::Metro,
            GeoPoint::new(41.387, 2.170),
        );
        assert_eq!(stop.default_name(), Some("Catalunya"));
        assert_eq!(stop.dedup_key(), normalized_key("Catalunya"));
    }

    #[test]
    fn test_mode_parsing_and_tiers() {
        assert_eq!(TransitMode::parse("Subway"), TransitMode::Metro);
        assert_eq!(TransitMode::parse("light_rail"), TransitMode::Metro);
        assert_eq!(TransitMode::parse("rail"), TransitMode::Train);
        assert_eq!(TransitMode::parse("trolleybus"), TransitMode::Bus);
        assert_eq!(TransitMode::parse("funicular"), TransitMode::Other);

        assert_eq!(TransitMode::Metro.tier(), 1);
        assert_eq!(TransitMode::Train.tier(), 1);
        assert_eq!(TransitMode::Tram.tier(), 2);
        assert_eq!(TransitMode::Bus.tier(), 2);
        assert_eq!(TransitMode::Ferry.tier(), 3);
    }

    #[test]
    fn test_stop_key_from_default_name() {
        let stop = TransitStop::new(
            "node/1",
            names("Diagonal - Entrada 2"),
            TransitMode::Metro,
            GeoPoint::new(41.39, 2.16),
        );
        assert_eq!(stop.name_key, "diagonalentrada2");
        assert_eq!(stop.dedup_key(), "diagonalentrada2");

        let unnamed = TransitStop::new("node/2", HashMap::new(), TransitMode::Bus, GeoPoint::new(0.0, 0.0));
        assert_eq!(unnamed.dedup_key(), "node/2");
    }

    #[test]
    fn test_line_key_prefers_reference() {
        let outbound = TransitLine {
            id: "relation/10".to_string(),
            reference: Some("V15".to_string()),
            name: "V15: Barceloneta => Ciutat Meridiana".to_string(),
            color: None,
            mode: TransitMode::Bus,
        };
        let inbound = TransitLine {
            id: "relation/11".to_string(),
            name: "V15: Ciutat Meridiana => Barceloneta".to_string(),
            ..outbound.clone()
        };
        assert_eq!(outbound.dedup_key(), inbound.dedup_key());

        let unnamed = TransitLine {
            id: "relation/12".to_string(),
            reference: Some(" ".to_string()),
            name: String::new(),
            color: None,
            mode: TransitMode::Tram,
        };
        assert_eq!(unnamed.dedup_key(), "relation/12");
    }
}
