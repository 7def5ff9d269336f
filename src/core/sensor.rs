//! Temperature source: a DS18B20 thermometer on the one-wire bus.
//!
//! The kernel `w1_therm` driver exposes each device as a directory named
//! after its family code and serial (`28-0316a2795dff`), with a `w1_slave`
//! file holding the last conversion:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line must end the CRC check with `YES`; the second carries the
//! temperature in millidegrees Celsius.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

pub mod error;

pub use self::error::{SensorError, SensorResult};

pub const SLAVE_FILE: &str = "w1_slave";

/// Anything that yields one temperature in degrees Celsius per call.
#[async_trait]
pub trait MeasurementSource: Send {
    async fn read(&mut self) -> SensorResult<f64>;
}

/// DS18B20 read through sysfs.
#[derive(Debug, Clone)]
pub struct W1Thermometer {
    slave_path: PathBuf,
}

impl W1Thermometer {
    /// Uses the first device under `dir` whose name starts with `prefix`,
    /// in lexical order.
    pub async fn discover(dir: impl AsRef<Path>, prefix: &str) -> SensorResult<Self> {
        let dir = dir.as_ref();
        let not_found = || SensorError::DeviceNotFound {
            dir: dir.display().to_string(),
            prefix: prefix.to_string(),
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(|_| not_found())?;
        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| SensorError::FileRead {
            path: dir.display().to_string(),
            source: e,
        })? {
            if entry.file_name().to_string_lossy().starts_with(prefix) {
                candidates.push(entry.path());
            }
        }
        candidates.sort();

        let device = candidates.into_iter().next().ok_or_else(not_found)?;
        info!(device = %device.display(), "Found one-wire temperature sensor");

        Ok(Self::at(device.join(SLAVE_FILE)))
    }

    /// Reads from an explicit `w1_slave` file.
    pub fn at(slave_path: impl Into<PathBuf>) -> Self {
        Self {
            slave_path: slave_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.slave_path
    }
}

#[async_trait]
impl MeasurementSource for W1Thermometer {
    async fn read(&mut self) -> SensorResult<f64> {
        let path = self.slave_path.display().to_string();
        let content = tokio::fs::read_to_string(&self.slave_path)
            .await
            .map_err(|source| SensorError::FileRead {
                path: path.clone(),
                source,
            })?;

        let celsius = parse_w1_slave(&content, &path)?;
        debug!(celsius, "Temperature read");
        Ok(celsius)
    }
}

/// Extracts degrees Celsius from the contents of a `w1_slave` file.
pub fn parse_w1_slave(content: &str, path: &str) -> SensorResult<f64> {
    let mut lines = content.lines();
    let invalid = |reason: &str| SensorError::InvalidFormat {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let crc_line = lines.next().ok_or_else(|| invalid("file is empty"))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(SensorError::CrcMismatch {
            path: path.to_string(),
        });
    }

    let data_line = lines.next().ok_or_else(|| invalid("temperature line missing"))?;
    let (_, raw) = data_line
        .split_once("t=")
        .ok_or_else(|| invalid("no 't=' field"))?;

    let millidegrees: i64 = raw
        .trim()
        .parse()
        .map_err(|e| invalid(&format!("bad temperature value '{}': {e}", raw.trim())))?;

    Ok(millidegrees as f64 / 1000.0)
}
