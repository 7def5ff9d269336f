use serde::Serialize;
use time::OffsetDateTime;

/// One temperature sample as published to the brokers.
///
/// Serializes as
/// `{"timestamp":"<RFC 3339>","temperature":<float>,"hostname":"<string>"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    temperature: f64,
    hostname: String,
}

impl Reading {
    /// Stamps `temperature` with the current UTC time.
    pub fn now(temperature: f64, hostname: impl Into<String>) -> Self {
        Self::at(OffsetDateTime::now_utc(), temperature, hostname)
    }

    /// Builds a reading for an explicit instant, truncated to whole seconds.
    pub fn at(timestamp: OffsetDateTime, temperature: f64, hostname: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.replace_nanosecond(0).unwrap_or(timestamp),
            temperature,
            hostname: hostname.into(),
        }
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}
