use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Retention and sweep settings for reviews.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// How long the latest `CURRENT` review of a branch pair is kept.
    pub keep_current_mins: u64,
    /// How long every other review is kept.
    pub keep_other_mins: u64,
    /// Interval of the background staleness and retention sweep.
    pub sweep_interval_secs: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            keep_current_mins: 15,
            keep_other_mins: 5,
            sweep_interval_secs: 60,
        }
    }
}

impl ReviewConfig {
    /// `None` when `keep_current_mins` does not fit a [`TimeDelta`].
    pub fn keep_current(&self) -> Option<TimeDelta> {
        retention(self.keep_current_mins)
    }

    /// `None` when `keep_other_mins` does not fit a [`TimeDelta`].
    pub fn keep_other(&self) -> Option<TimeDelta> {
        retention(self.keep_other_mins)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

fn retention(mins: u64) -> Option<TimeDelta> {
    i64::try_from(mins).ok().and_then(TimeDelta::try_minutes)
}
