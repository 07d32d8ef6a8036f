use serde::{Deserialize, Serialize};

/// One of four fixed bands over the quality score.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTier {
    High,
    Medium,
    Low,
    Minimal,
}

impl ScoreTier {
    pub const HIGH_MIN: f64 = 80.0;
    pub const MEDIUM_MIN: f64 = 60.0;
    pub const LOW_MIN: f64 = 40.0;

    /// Total over all inputs: out-of-range scores land in the nearest band and
    /// NaN is `Minimal`.
    pub fn from_score(score: f64) -> Self {
        if score >= Self::HIGH_MIN {
            ScoreTier::High
        } else if score >= Self::MEDIUM_MIN {
            ScoreTier::Medium
        } else if score >= Self::LOW_MIN {
            ScoreTier::Low
        } else {
            ScoreTier::Minimal
        }
    }

    /// Only the top tier gets the pulsing ring.
    pub fn pulses(self) -> bool {
        matches!(self, ScoreTier::High)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScoreTier::High => "high",
            ScoreTier::Medium => "medium",
            ScoreTier::Low => "low",
            ScoreTier::Minimal => "minimal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ScoreTier;

    #[test]
    fn boundaries() {
        assert_eq!(ScoreTier::from_score(100.0), ScoreTier::High);
        assert_eq!(ScoreTier::from_score(80.0), ScoreTier::High);
        assert_eq!(ScoreTier::from_score(79.999), ScoreTier::Medium);
        assert_eq!(ScoreTier::from_score(60.0), ScoreTier::Medium);
        assert_eq!(ScoreTier::from_score(59.9), ScoreTier::Low);
        assert_eq!(ScoreTier::from_score(40.0), ScoreTier::Low);
        assert_eq!(ScoreTier::from_score(39.9), ScoreTier::Minimal);
        assert_eq!(ScoreTier::from_score(0.0), ScoreTier::Minimal);
        assert_eq!(ScoreTier::from_score(f64::NAN), ScoreTier::Minimal);
    }

    #[test]
    fn mapping_is_total_and_ordered_over_range() {
        let rank = |t: ScoreTier| match t {
            ScoreTier::Minimal => 0,
            ScoreTier::Low => 1,
            ScoreTier::Medium => 2,
            ScoreTier::High => 3,
        };
        let mut prev = 0;
        for step in 0..=1000 {
            let score = step as f64 / 10.0;
            let r = rank(ScoreTier::from_score(score));
            assert!(r >= prev, "tier went backwards at {score}");
            prev = r;
        }
        assert_eq!(prev, 3);
        assert!(ScoreTier::from_score(85.0).pulses());
        assert!(!ScoreTier::from_score(79.0).pulses());
    }
}
