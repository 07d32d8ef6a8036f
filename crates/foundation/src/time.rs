use serde::{Deserialize, Serialize};

/// Host-supplied monotonic time, in seconds.
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Time(pub f64);

impl Time {
    pub const ZERO: Time = Time(0.0);

    pub fn seconds(self) -> f64 {
        self.0
    }

    pub fn after(self, secs: f64) -> Time {
        Time(self.0 + secs)
    }
}

/// A point in time after which something should happen.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Deadline {
    pub at: Time,
}

impl Deadline {
    pub fn in_secs(now: Time, secs: f64) -> Self {
        Self { at: now.after(secs) }
    }

    pub fn is_expired(&self, now: Time) -> bool {
        now.0 >= self.at.0
    }

    pub fn remaining(&self, now: Time) -> f64 {
        (self.at.0 - now.0).max(0.0)
    }
}
