use std::collections::BTreeSet;

use foundation::bounds::{LngLat, LngLatBounds};
use serde::{Deserialize, Serialize};

use crate::record::BusinessRecord;

/// Sentinel value meaning "no constraint" for string criteria.
pub const ALL: &str = "all";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub score_min: Option<f64>,
    #[serde(default)]
    pub score_max: Option<f64>,
    #[serde(default)]
    pub city: Option<String>,
}

impl FilterCriteria {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn score_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.score_min = min;
        self.score_max = max;
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        constraint(&self.sector).is_none()
            && constraint(&self.city).is_none()
            && self.score_min.is_none()
            && self.score_max.is_none()
    }

    pub fn matches(&self, record: &BusinessRecord) -> bool {
        if let Some(sector) = constraint(&self.sector)
            && !text_eq(sector, &record.sector)
        {
            return false;
        }
        if let Some(city) = constraint(&self.city)
            && !text_eq(city, &record.city)
        {
            return false;
        }
        if let Some(min) = self.score_min
            && record.score < min
        {
            return false;
        }
        if let Some(max) = self.score_max
            && record.score > max
        {
            return false;
        }
        true
    }
}

fn constraint(value: &Option<String>) -> Option<&str> {
    let v = value.as_deref()?.trim();
    if v.is_empty() || v.eq_ignore_ascii_case(ALL) {
        return None;
    }
    Some(v)
}

fn text_eq(wanted: &str, actual: &str) -> bool {
    wanted.to_lowercase() == actual.trim().to_lowercase()
}

/// Ordered subset of the source records that passed the criteria and have a
/// renderable position. Always rebuilt from scratch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredDataset {
    records: Vec<BusinessRecord>,
}

impl FilteredDataset {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps records without applying criteria. Unrenderable records are still
    /// dropped.
    pub fn from_records(records: impl IntoIterator<Item = BusinessRecord>) -> Self {
        Self {
            records: records.into_iter().filter(|r| r.is_renderable()).collect(),
        }
    }

    pub fn records(&self) -> &[BusinessRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &BusinessRecord> + '_ {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&BusinessRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn positions(&self) -> impl Iterator<Item = LngLat> + '_ {
        self.records.iter().filter_map(|r| r.position())
    }

    /// Envelope of every position, `None` for an empty dataset.
    pub fn bounds(&self) -> Option<LngLatBounds> {
        LngLatBounds::from_points(self.positions())
    }
}

/// Narrows `records` to those matching `criteria` with valid coordinates,
/// preserving input order.
pub fn filter_records(records: &[BusinessRecord], criteria: &FilterCriteria) -> FilteredDataset {
    let records: Vec<BusinessRecord> = records
        .iter()
        .filter(|r| r.is_renderable() && criteria.matches(r))
        .cloned()
        .collect();
    tracing::debug!(kept = records.len(), "filtered records");
    FilteredDataset { records }
}

/// Distinct non-empty sectors, sorted, for building filter pickers.
pub fn distinct_sectors(records: &[BusinessRecord]) -> Vec<String> {
    distinct(records.iter().map(|r| r.sector.as_str()))
}

/// Distinct non-empty cities, sorted.
pub fn distinct_cities(records: &[BusinessRecord]) -> Vec<String> {
    distinct(records.iter().map(|r| r.city.as_str()))
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{FilterCriteria, distinct_cities, distinct_sectors, filter_records};
    use crate::record::BusinessRecord;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<BusinessRecord> {
        vec![
            BusinessRecord::new("1", "Cafe", 85.0)
                .with_position(45.5, -73.6)
                .with_sector("food")
                .with_city("Montreal"),
            BusinessRecord::new("2", "Bakery", 55.0)
                .with_position(45.6, -73.5)
                .with_sector("food")
                .with_city("Laval"),
            BusinessRecord::new("3", "Garage", 30.0)
                .with_position(46.8, -71.2)
                .with_sector("auto")
                .with_city("Quebec"),
            BusinessRecord::new("4", "Ghost", 90.0)
                .with_position(0.0, 0.0)
                .with_sector("food")
                .with_city("Montreal"),
        ]
    }

    fn ids(records: &[BusinessRecord], criteria: &FilterCriteria) -> Vec<String> {
        filter_records(records, criteria)
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    #[test]
    fn unconstrained_drops_only_unrenderable() {
        let records = sample();
        assert!(FilterCriteria::all().is_unconstrained());
        assert_eq!(ids(&records, &FilterCriteria::all()), vec!["1", "2", "3"]);
    }

    #[test]
    fn all_sentinel_is_unconstrained() {
        let records = sample();
        let c = FilterCriteria::all().sector("all").city("ALL");
        assert!(c.is_unconstrained());
        assert_eq!(ids(&records, &c), vec!["1", "2", "3"]);
    }

    #[test]
    fn sector_city_and_score_range_combine() {
        let records = sample();
        assert_eq!(ids(&records, &FilterCriteria::all().sector("food")), vec!["1", "2"]);
        assert_eq!(ids(&records, &FilterCriteria::all().city("montreal")), vec!["1"]);
        assert_eq!(
            ids(&records, &FilterCriteria::all().score_range(Some(50.0), Some(85.0))),
            vec!["1", "2"]
        );
        assert_eq!(
            ids(
                &records,
                &FilterCriteria::all().sector("food").score_range(Some(60.0), None)
            ),
            vec!["1"]
        );
    }

    #[test]
    fn each_constraint_can_reject_alone() {
        let r = BusinessRecord::new("9", "Deli", 70.0)
            .with_sector(" Food ")
            .with_city("Laval");
        assert!(FilterCriteria::all().sector("FOOD").matches(&r));
        assert!(!FilterCriteria::all().sector("auto").matches(&r));
        assert!(!FilterCriteria::all().city("Quebec").matches(&r));
        assert!(FilterCriteria::all().score_range(Some(70.0), Some(70.0)).matches(&r));
        assert!(!FilterCriteria::all().score_range(Some(70.5), None).matches(&r));
        assert!(!FilterCriteria::all().score_range(None, Some(69.9)).matches(&r));
    }

    #[test]
    fn inverted_range_yields_empty() {
        let records = sample();
        let c = FilterCriteria::all().score_range(Some(90.0), Some(10.0));
        assert!(filter_records(&records, &c).is_empty());
    }

    #[test]
    fn dataset_bounds_cover_renderable_positions() {
        let ds = filter_records(&sample(), &FilterCriteria::all());
        let b = ds.bounds().unwrap();
        assert_eq!(b.sw.lat, 45.5);
        assert_eq!(b.ne.lat, 46.8);
        assert_eq!(b.sw.lng, -73.6);
        assert!(ds.find("4").is_none());
    }

    #[test]
    fn distinct_lists_are_sorted() {
        let records = sample();
        assert_eq!(distinct_sectors(&records), vec!["auto", "food"]);
        assert_eq!(distinct_cities(&records), vec!["Laval", "Montreal", "Quebec"]);
    }
}
