use serde::{Deserialize, Serialize};

/// A WGS84 position in decimal degrees, longitude first.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        LngLat { lng, lat }
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    /// Component-wise comparison with an absolute tolerance.
    pub fn approx_eq(self, other: LngLat, eps: f64) -> bool {
        (self.lng - other.lng).abs() <= eps && (self.lat - other.lat).abs() <= eps
    }
}

/// Axis-aligned lng/lat envelope.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    pub sw: LngLat,
    pub ne: LngLat,
}

impl LngLatBounds {
    pub fn new(sw: LngLat, ne: LngLat) -> Self {
        LngLatBounds { sw, ne }
    }

    pub fn from_point(p: LngLat) -> Self {
        LngLatBounds { sw: p, ne: p }
    }

    /// Envelope of all points, or `None` when the iterator is empty.
    pub fn from_points(points: impl IntoIterator<Item = LngLat>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut out = Self::from_point(first);
        for p in iter {
            out.extend(p);
        }
        Some(out)
    }

    pub fn extend(&mut self, p: LngLat) {
        self.sw.lng = self.sw.lng.min(p.lng);
        self.sw.lat = self.sw.lat.min(p.lat);
        self.ne.lng = self.ne.lng.max(p.lng);
        self.ne.lat = self.ne.lat.max(p.lat);
    }

    pub fn contains(&self, p: LngLat) -> bool {
        p.lng >= self.sw.lng && p.lng <= self.ne.lng && p.lat >= self.sw.lat && p.lat <= self.ne.lat
    }

    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.sw.lng + self.ne.lng) * 0.5,
            (self.sw.lat + self.ne.lat) * 0.5,
        )
    }

    pub fn is_point(&self) -> bool {
        self.sw == self.ne
    }
}

#[cfg(test)]
mod tests {
    use super::{LngLat, LngLatBounds};

    #[test]
    fn envelope_of_points() {
        let b = LngLatBounds::from_points([
            LngLat::new(-73.6, 45.5),
            LngLat::new(-71.2, 46.8),
            LngLat::new(-75.7, 45.4),
        ])
        .unwrap();
        assert_eq!(b.sw, LngLat::new(-75.7, 45.4));
        assert_eq!(b.ne, LngLat::new(-71.2, 46.8));
        assert!(b.contains(LngLat::new(-73.6, 45.5)));
        assert!(!b.contains(LngLat::new(-70.0, 45.5)));
    }

    #[test]
    fn empty_input_has_no_envelope() {
        assert!(LngLatBounds::from_points(Vec::new()).is_none());
    }

    #[test]
    fn single_point_envelope_is_degenerate() {
        let b = LngLatBounds::from_points([LngLat::new(1.0, 2.0)]).unwrap();
        assert!(b.is_point());
        assert_eq!(b.center(), LngLat::new(1.0, 2.0));
    }
}
