use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Failed to read {path}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// No directory matching the device prefix under the bus directory.
    #[error("No sensor matching '{prefix}*' found in {dir}")]
    DeviceNotFound { dir: String, prefix: String },

    /// The device reported a failed CRC check (first line lacks `YES`).
    #[error("CRC check failed in {path}")]
    CrcMismatch { path: String },

    #[error("Invalid format in {path}: {reason}")]
    InvalidFormat { path: String, reason: String },
}

pub type SensorResult<T> = Result<T, SensorError>;
