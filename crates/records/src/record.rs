use foundation::bounds::LngLat;
use serde::{Deserialize, Deserializer, Serialize};

pub type RecordId = String;

/// Optional SEO signals attached by the enrichment collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoMetrics {
    #[serde(default)]
    pub backlinks: Option<u64>,
    #[serde(default)]
    pub indexed_keywords: Option<u64>,
    #[serde(default)]
    pub organic_traffic: Option<u64>,
}

/// A geo-located business as produced by the enrichment pipeline.
///
/// Immutable from the map's point of view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRecord {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, alias = "latitude", deserialize_with = "lenient_coord")]
    pub lat: Option<f64>,
    #[serde(default, alias = "longitude", deserialize_with = "lenient_coord")]
    pub lng: Option<f64>,
    /// Quality score in `[0, 100]`.
    #[serde(default)]
    pub score: f64,
    /// Rating in `[0, 5]`.
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u32>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub seo: Option<SeoMetrics>,
    #[serde(default)]
    pub potential: Option<String>,
}

fn lenient_coord<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()).filter(|x| x.is_finite()))
}

impl BusinessRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            score,
            ..Self::default()
        }
    }

    pub fn with_position(mut self, lat: f64, lng: f64) -> Self {
        self.lat = Some(lat);
        self.lng = Some(lng);
        self
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = sector.into();
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = city.into();
        self
    }

    /// Position when both coordinates are present, finite and non-zero.
    ///
    /// Exactly-zero coordinates are how upstream geocoding reports a miss, so
    /// they are treated as absent.
    pub fn position(&self) -> Option<LngLat> {
        let lat = self.lat?;
        let lng = self.lng?;
        if !lat.is_finite() || !lng.is_finite() || lat == 0.0 || lng == 0.0 {
            return None;
        }
        Some(LngLat::new(lng, lat))
    }

    pub fn is_renderable(&self) -> bool {
        self.position().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::BusinessRecord;
    use foundation::bounds::LngLat;

    #[test]
    fn renderable_requires_both_nonzero_coordinates() {
        let ok = BusinessRecord::new("1", "a", 50.0).with_position(45.5, -73.6);
        assert_eq!(ok.position(), Some(LngLat::new(-73.6, 45.5)));

        let zero_lat = BusinessRecord::new("2", "b", 50.0).with_position(0.0, -73.6);
        let zero_lng = BusinessRecord::new("3", "c", 50.0).with_position(45.5, 0.0);
        let nan = BusinessRecord::new("4", "d", 50.0).with_position(f64::NAN, -73.6);
        let missing = BusinessRecord::new("5", "e", 50.0);

        for r in [zero_lat, zero_lng, nan, missing] {
            assert!(!r.is_renderable(), "{} should not render", r.id);
        }
    }

    #[test]
    fn decodes_camel_case_and_aliases() {
        let r: BusinessRecord = serde_json::from_str(
            r#"{"id": "9", "name": "Garage", "latitude": 46.8, "longitude": -71.2,
                "score": 72, "reviewCount": 14,
                "seo": {"backlinks": 12, "indexedKeywords": 40}}"#,
        )
        .unwrap();
        assert_eq!(r.lat, Some(46.8));
        assert_eq!(r.review_count, Some(14));
        let seo = r.seo.unwrap();
        assert_eq!(seo.indexed_keywords, Some(40));
        assert_eq!(seo.organic_traffic, None);
    }

    #[test]
    fn non_numeric_coordinates_decode_as_missing() {
        let r: BusinessRecord =
            serde_json::from_str(r#"{"id": "x", "name": "n", "lat": null, "lng": true}"#).unwrap();
        assert_eq!(r.lat, None);
        assert_eq!(r.lng, None);
    }
}
