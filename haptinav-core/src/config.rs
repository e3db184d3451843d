use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scheduler::SchedulerSettings;
use crate::telemetry::{StreamerSettings, MAX_CHUNK_SIZE};
use crate::tracker::{RecalcPolicy, DEFAULT_OFF_ROUTE_THRESHOLD_M};

/// Tunables of a navigation session
///
/// Every field has a default, so a JSON document only needs to name what it
/// changes:
///
/// ```
/// use haptinav_core::config::GuidanceConfig;
/// let config = GuidanceConfig::from_json(r#"{"scheduler": {"fireDistanceM": 25}}"#).unwrap();
/// assert_eq!(config.scheduler.fire_distance_m, 25.0);
/// assert_eq!(config.scheduler.announce_distance_m, 80.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuidanceConfig {
    pub off_route_threshold_m: f64,
    pub scheduler: SchedulerSettings,
    pub streamer: StreamerSettings,
    pub recalc: RecalcPolicy,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        GuidanceConfig {
            off_route_threshold_m: DEFAULT_OFF_ROUTE_THRESHOLD_M,
            scheduler: SchedulerSettings::default(),
            streamer: StreamerSettings::default(),
            recalc: RecalcPolicy::default(),
        }
    }
}

impl GuidanceConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GuidanceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the device link cannot carry
    pub fn validate(&self) -> Result<(), ConfigError> {
        let chunk_size = self.streamer.chunk_size;
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::ChunkSize {
                value: chunk_size,
                max: MAX_CHUNK_SIZE,
            });
        }
        Ok(())
    }
}
