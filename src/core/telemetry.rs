//! Prometheus metrics for the publish loop.
//!
//! - `sensor_temperature_celsius` (gauge): last successful reading.
//! - `sensor_messages_published_total` (counter): readings dispatched to the
//!   destinations, one per tick regardless of how many brokers accepted it.

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use thiserror::Error;

pub const TEMPERATURE_GAUGE: &str = "sensor_temperature_celsius";
pub const PUBLISHED_COUNTER: &str = "sensor_messages_published_total";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(#[from] prometheus::Error),

    #[error("Failed to encode metrics: {0}")]
    Encode(String),
}

/// Metric handles plus the registry they are exposed through. Cheap to
/// clone; all clones update the same series.
#[derive(Clone)]
pub struct Telemetry {
    registry: Registry,
    temperature: Gauge,
    published: IntCounter,
}

impl Telemetry {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let temperature = Gauge::new(TEMPERATURE_GAUGE, "Current temperature in Celsius")?;
        let published = IntCounter::new(PUBLISHED_COUNTER, "Total readings dispatched to brokers")?;

        registry.register(Box::new(temperature.clone()))?;
        registry.register(Box::new(published.clone()))?;

        Ok(Self {
            registry,
            temperature,
            published,
        })
    }

    pub fn record_temperature(&self, celsius: f64) {
        self.temperature.set(celsius);
    }

    pub fn record_dispatched(&self) {
        self.published.inc();
    }

    pub fn temperature(&self) -> f64 {
        self.temperature.get()
    }

    pub fn dispatched(&self) -> u64 {
        self.published.get()
    }

    /// Renders all metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| TelemetryError::Encode(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_and_encodes() {
        let telemetry = Telemetry::new().unwrap();
        telemetry.record_temperature(21.5);
        telemetry.record_dispatched();
        telemetry.record_dispatched();

        assert_eq!(telemetry.temperature(), 21.5);
        assert_eq!(telemetry.dispatched(), 2);

        let text = telemetry.encode().unwrap();
        assert!(text.contains("sensor_temperature_celsius 21.5"));
        assert!(text.contains("sensor_messages_published_total 2"));
        assert!(text.contains("# TYPE sensor_messages_published_total counter"));
    }

    #[test]
    fn test_clones_share_series() {
        let telemetry = Telemetry::new().unwrap();
        let handle = telemetry.clone();
        handle.record_dispatched();
        assert_eq!(telemetry.dispatched(), 1);
    }

    #[test]
    fn test_instances_are_independent() {
        let first = Telemetry::new().unwrap();
        let second = Telemetry::new().unwrap();
        first.record_dispatched();
        assert_eq!(second.dispatched(), 0);
    }
}
