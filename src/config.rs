use crate::error::ConfigError;

/// Tunable parameters of a [`World`][crate::World].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct WorldConfig {
    /// Expected number of bodies, used to size color bitsets and storage up front.
    /// Everything grows past it on demand.
    pub body_capacity: usize,
    /// The pair search preallocates this many pair records per moved proxy.
    /// Pairs beyond that are allocated one by one.
    pub pair_pool_factor: usize,
    /// Smallest number of items handed to one parallel task.
    pub min_range_per_task: usize,
    /// Distance the broad phase bounds of moving shapes extend past the shapes themselves,
    /// in metres. Larger margins mean fewer tree updates but more candidate pairs.
    pub aabb_margin: f64,
    pub enable_sleep: bool,
    /// Seconds an island has to stay slow before it falls asleep.
    pub time_to_sleep: f64,
    /// Bodies moving faster than this, in metres per second, keep their island awake.
    pub linear_sleep_tolerance: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            body_capacity: 16,
            pair_pool_factor: 16,
            min_range_per_task: 64,
            aabb_margin: 0.1,
            enable_sleep: true,
            time_to_sleep: 0.5,
            linear_sleep_tolerance: 0.05,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pair_pool_factor == 0 {
            return Err(ConfigError::ZeroPairPoolFactor);
        }
        if self.min_range_per_task == 0 {
            return Err(ConfigError::ZeroMinRange);
        }
        if !(self.aabb_margin >= 0.0) {
            return Err(ConfigError::NegativeMargin(self.aabb_margin));
        }
        if !(self.time_to_sleep > 0.0) {
            return Err(ConfigError::NonPositiveTimeToSleep(self.time_to_sleep));
        }
        Ok(())
    }
}
