//! Administrative hierarchy types for boundary resolution.

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// OSM admin_level mapping to the semantic levels the pipeline reports.
/// See: https://wiki.openstreetmap.org/wiki/Tag:boundary%3Dadministrative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AdminLevel {
    /// Country (admin_level=2)
    Country,
    /// Region / autonomous community / state (admin_level=4)
    Region,
    /// Province (admin_level=6)
    Province,
    /// Subprovince / comarca (admin_level=7)
    Subprovince,
    /// City / municipality (admin_level=8)
    City,
    /// City district (admin_level=9)
    District,
    /// Subdistrict (admin_level=10)
    Subdistrict,
    /// Neighborhood (admin_level=11)
    Neighborhood,
}

impl AdminLevel {
    /// Convert OSM admin_level number to AdminLevel
    pub fn from_osm_level(level: u8) -> Option<Self> {
        match level {
            2 => Some(AdminLevel::Country),
            4 => Some(AdminLevel::Region),
            6 => Some(AdminLevel::Province),
            7 => Some(AdminLevel::Subprovince),
            8 => Some(AdminLevel::City),
            9 => Some(AdminLevel::District),
            10 => Some(AdminLevel::Subdistrict),
            11 => Some(AdminLevel::Neighborhood),
            _ => None,
        }
    }

    /// Get the OSM admin_level number
    pub fn to_osm_level(&self) -> u8 {
        match self {
            AdminLevel::Country => 2,
            AdminLevel::Region => 4,
            AdminLevel::Province => 6,
            AdminLevel::Subprovince => 7,
            AdminLevel::City => 8,
            AdminLevel::District => 9,
            AdminLevel::Subdistrict => 10,
            AdminLevel::Neighborhood => 11,
        }
    }

    /// Get all admin levels in hierarchical order (country first)
    pub fn all() -> &'static [AdminLevel] {
        &[
            AdminLevel::Country,
            AdminLevel::Region,
            AdminLevel::Province,
            AdminLevel::Subprovince,
            AdminLevel::City,
            AdminLevel::District,
            AdminLevel::Subdistrict,
            AdminLevel::Neighborhood,
        ]
    }

    /// Get the field name for this level
    pub fn field_name(&self) -> &'static str {
        match self {
            AdminLevel::Country => "country",
            AdminLevel::Region => "region",
            AdminLevel::Province => "province",
            AdminLevel::Subprovince => "subprovince",
            AdminLevel::City => "city",
            AdminLevel::District => "district",
            AdminLevel::Subdistrict => "subdistrict",
            AdminLevel::Neighborhood => "neighborhood",
        }
    }
}

/// A single administrative boundary polygon with metadata.
#[derive(Debug, Clone)]
pub struct AdminBoundary {
    pub id: i64,
    pub level: AdminLevel,
    /// Multilingual names: {"default": "...", "es": "...", "ca": "..."}
    pub names: HashMap<String, String>,
    pub population: Option<u64>,
    /// Declared area in square kilometers, when the source carries one
    pub area_km2: Option<f64>,
    pub geometry: MultiPolygon<f64>,
}

impl AdminBoundary {
    /// Get the bounding box of this boundary
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        use geo::BoundingRect;
        self.geometry
            .bounding_rect()
            .map(|rect| (rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    /// Size in km² used to pick between overlapping boundaries of the same
    /// level: the declared area, else the geodesic area of the polygon.
    pub fn size_hint(&self) -> f64 {
        use geo::GeodesicArea;
        self.area_km2
            .unwrap_or_else(|| self.geometry.geodesic_area_unsigned() / 1_000_000.0)
    }

    /// `default`, else the name under the smallest language key
    pub fn default_name(&self) -> Option<&String> {
        self.names.get("default").or_else(|| first_by_key(&self.names))
    }
}

/// Value under the smallest key, stable across runs
pub(crate) fn first_by_key(names: &HashMap<String, String>) -> Option<&String> {
    names.iter().min_by(|a, b| a.0.cmp(b.0)).map(|(_, name)| name)
}

/// Single admin level entry in an enriched location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryInfo {
    pub id: i64,

    /// Default name
    pub name: String,

    /// Translated names keyed by language code, without the default entry
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub names: HashMap<String, String>,
}

impl BoundaryInfo {
    pub fn from_boundary(boundary: &AdminBoundary) -> Self {
        let name = boundary.default_name().cloned().unwrap_or_default();

        let names = boundary
            .names
            .iter()
            .filter(|(lang, _)| lang.as_str() != "default")
            .map(|(lang, value)| (lang.clone(), value.clone()))
            .collect();

        Self {
            id: boundary.id,
            name,
            names,
        }
    }

    /// Name in the preferred language, falling back to the default name.
    pub fn localized(&self, lang: Option<&str>) -> &str {
        lang.and_then(|l| self.names.get(l))
            .map(String::as_str)
            .unwrap_or(&self.name)
    }
}

/// Administrative hierarchy resolved for a single point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<BoundaryInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<BoundaryInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<BoundaryInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subprovince: Option<BoundaryInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<BoundaryInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<BoundaryInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdistrict: Option<BoundaryInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<BoundaryInfo>,

    /// Whether the street address may be shown to consumers
    #[serde(default)]
    pub address_visible: bool,
}

impl EnrichedLocation {
    /// Set the boundary for a given level
    pub fn set(&mut self, level: AdminLevel, info: BoundaryInfo) {
        match level {
            AdminLevel::Country => self.country = Some(info),
            AdminLevel::Region => self.region = Some(info),
            AdminLevel::Province => self.province = Some(info),
            AdminLevel::Subprovince => self.subprovince = Some(info),
            AdminLevel::City => self.city = Some(info),
            AdminLevel::District => self.district = Some(info),
            AdminLevel::Subdistrict => self.subdistrict = Some(info),
            AdminLevel::Neighborhood => self.neighborhood = Some(info),
        }
    }

    /// Get the boundary for a given level
    pub fn get(&self, level: AdminLevel) -> Option<&BoundaryInfo> {
        match level {
            AdminLevel::Country => self.country.as_ref(),
            AdminLevel::Region => self.region.as_ref(),
            AdminLevel::Province => self.province.as_ref(),
            AdminLevel::Subprovince => self.subprovince.as_ref(),
            AdminLevel::City => self.city.as_ref(),
            AdminLevel::District => self.district.as_ref(),
            AdminLevel::Subdistrict => self.subdistrict.as_ref(),
            AdminLevel::Neighborhood => self.neighborhood.as_ref(),
        }
    }

    /// True when no level was resolved
    pub fn is_empty(&self) -> bool {
        AdminLevel::all().iter().all(|level| self.get(*level).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osm_level_roundtrip_skips_intermediate_levels() {
        for level in AdminLevel::all() {
            assert_eq!(AdminLevel::from_osm_level(level.to_osm_level()), Some(*level));
        }
        assert_eq!(AdminLevel::from_osm_level(3), None);
        assert_eq!(AdminLevel::from_osm_level(5), None);
        assert_eq!(AdminLevel::from_osm_level(12), None);
    }

    #[test]
    fn test_boundary_info_splits_default_name() {
        let mut names = HashMap::new();
        names.insert("default".to_string(), "Barcelona".to_string());
        names.insert("es".to_string(), "Barcelona".to_string());
        names.insert("ru".to_string(), "Барселона".to_string());

        let boundary = AdminBoundary {
            id: 347950,
            level: AdminLevel::City,
            names,
            population: None,
            area_km2: None,
            geometry: MultiPolygon::new(vec![]),
        };

        let info = BoundaryInfo::from_boundary(&boundary);
        assert_eq!(info.name, "Barcelona");
        assert_eq!(info.names.len(), 2);
        assert_eq!(info.localized(Some("ru")), "Барселона");
        assert_eq!(info.localized(Some("fr")), "Barcelona");
    }

    fn square(id: i64, size_deg: f64, area_km2: Option<f64>) -> AdminBoundary {
        use geo::{polygon, MultiPolygon};
        let poly = polygon![
            (x: 2.0, y: 41.0),
            (x: 2.0 + size_deg, y: 41.0),
            (x: 2.0 + size_deg, y: 41.0 + size_deg),
            (x: 2.0, y: 41.0 + size_deg),
            (x: 2.0, y: 41.0),
        ];
        AdminBoundary {
            id,
            level: AdminLevel::District,
            names: HashMap::new(),
            population: None,
            area_km2,
            geometry: MultiPolygon::new(vec![poly]),
        }
    }

    #[test]
    fn test_size_hint_declared_and_computed_share_units() {
        let declared = square(1, 0.02, Some(5.0));
        let computed = square(2, 1.0, None);

        // One degree square at 41°N is roughly 9,300 km²
        let area = computed.size_hint();
        assert!(area > 8_000.0 && area < 10_500.0, "{area}");
        assert!(declared.size_hint() < computed.size_hint());
    }

    #[test]
    fn test_default_name_falls_back_to_smallest_language() {
        let mut boundary = square(3, 0.1, None);
        boundary.names = HashMap::from([
            ("fr".to_string(), "Catalogne".to_string()),
            ("ca".to_string(), "Catalunya".to_string()),
            ("es".to_string(), "Cataluña".to_string()),
        ]);
        assert_eq!(boundary.default_name().map(String::as_str), Some("Catalunya"));
    }

    #[test]
    fn test_enriched_location_empty() {
        let mut location = EnrichedLocation::default();
        assert!(location.is_empty());
        location.set(AdminLevel::District, BoundaryInfo::default());
        assert!(!location.is_empty());
        assert!(location.get(AdminLevel::District).is_some());
    }
}
