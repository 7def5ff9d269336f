use serde::{Deserialize, Serialize};
use validator::Validate;

/// One-wire thermometer discovery and sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SensorConfig {
    /// Directory the w1 bus exposes its devices under.
    #[validate(length(min = 1, message = "Devices directory cannot be empty"))]
    pub devices_dir: String,

    /// Prefix of the device directories to pick from. `28-` is the DS18B20
    /// family code.
    #[validate(length(min = 1, message = "Device prefix cannot be empty"))]
    pub device_prefix: String,

    /// Seconds between two readings.
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Interval must be between 1 and 86400 seconds"
    ))]
    pub interval: u64,

    /// Origin host name put into every message. Resolved from the system
    /// when unset.
    pub hostname: Option<String>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            devices_dir: "/sys/bus/w1/devices".to_string(),
            device_prefix: "28-".to_string(),
            interval: 10,
            hostname: None,
        }
    }
}
