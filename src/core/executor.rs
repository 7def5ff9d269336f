//! Periodic fan-out of temperature readings.
//!
//! The `Executor` owns the registry of destinations and drives one publish
//! cycle per timer tick: read the sensor, build a [`Reading`], hand it to
//! every destination in registration order. A failing destination is logged
//! and skipped; it never stops the others. Cycles run sequentially on one
//! task, so a destination stuck in its reconnect backoff delays the next
//! tick for everyone.

use std::time::Duration;

use async_trait::async_trait;
use tempcast_amqp::{
    error::error_chain, AmqpSession, CloseReport, Endpoint, RetryConfig, Session, TlsSettings,
    TransferError,
};
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{health::Health, reading::Reading, sensor::MeasurementSource, telemetry::Telemetry};

/// A destination that readings can be delivered to.
#[async_trait]
pub trait Publisher: Send {
    async fn publish(&mut self, reading: &Reading)
        -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn close(&mut self) -> CloseReport;
}

#[async_trait]
impl<S: Session + 'static> Publisher for tempcast_amqp::Publisher<S> {
    async fn publish(
        &mut self,
        reading: &Reading,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tempcast_amqp::Publisher::publish(self, reading)
            .await
            .map_err(|e| Box::new(e) as _)
    }

    async fn close(&mut self) -> CloseReport {
        tempcast_amqp::Publisher::close(self).await
    }
}

/// Opens the initial connection for an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Publisher>, TransferError>;
}

/// Connects endpoints over AMQP with shared TLS material and retry policy.
pub struct AmqpConnector {
    tls: Option<TlsSettings>,
    retry: RetryConfig,
}

impl AmqpConnector {
    pub fn new(tls: Option<TlsSettings>, retry: RetryConfig) -> Self {
        Self { tls, retry }
    }
}

#[async_trait]
impl Connector for AmqpConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Publisher>, TransferError> {
        let session = AmqpSession::new(endpoint.clone(), self.tls.clone());
        let publisher =
            tempcast_amqp::Publisher::connect(endpoint.name(), session, self.retry.clone()).await?;
        Ok(Box::new(publisher))
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("No broker destination could be connected ({attempted} configured)")]
    NoDestinations { attempted: usize },
}

struct Destination {
    name: String,
    publisher: Box<dyn Publisher>,
}

/// Per-tick delivery tally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Ordered, fixed set of destinations built once at startup.
pub struct PublisherRegistry {
    destinations: Vec<Destination>,
}

impl PublisherRegistry {
    /// Connects every endpoint once. Endpoints that fail to connect are
    /// skipped with a warning; ending up with none is an error.
    pub async fn build(
        endpoints: &[Endpoint],
        connector: &dyn Connector,
    ) -> Result<Self, StartupError> {
        let mut destinations = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            match connector.connect(endpoint).await {
                Ok(publisher) => {
                    info!(
                        destination = %endpoint.name(),
                        uri = %endpoint.redacted_uri(),
                        "Destination registered"
                    );
                    destinations.push(Destination {
                        name: endpoint.name().to_string(),
                        publisher,
                    });
                }
                Err(e) => {
                    warn!(
                        destination = %endpoint.name(),
                        uri = %endpoint.redacted_uri(),
                        error = %error_chain(&e),
                        "Skipping destination, initial connection failed"
                    );
                }
            }
        }

        if destinations.is_empty() {
            return Err(StartupError::NoDestinations {
                attempted: endpoints.len(),
            });
        }
        Ok(Self { destinations })
    }

    pub fn names(&self) -> Vec<&str> {
        self.destinations.iter().map(|d| d.name.as_str()).collect()
    }

    /// Publishes `reading` to every destination in order.
    pub async fn dispatch(&mut self, reading: &Reading) -> DispatchReport {
        let mut report = DispatchReport::default();
        for destination in &mut self.destinations {
            match destination.publisher.publish(reading).await {
                Ok(()) => {
                    report.delivered += 1;
                    debug!(destination = %destination.name, "Reading delivered");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(
                        destination = %destination.name,
                        error = %e,
                        "Failed to publish reading"
                    );
                }
            }
        }
        report
    }

    /// Closes every session. Never fails; problems are only logged.
    pub async fn close_all(&mut self) {
        for destination in &mut self.destinations {
            let report = destination.publisher.close().await;
            if report.is_clean() {
                debug!(destination = %destination.name, "Destination closed");
            } else {
                warn!(destination = %destination.name, ?report, "Destination closed with errors");
            }
        }
    }
}

/// Timer-driven publish loop.
pub struct Executor<M: MeasurementSource> {
    registry: PublisherRegistry,
    source: M,
    telemetry: Telemetry,
    health: Health,
    interval: Duration,
    hostname: String,
}

impl<M: MeasurementSource> Executor<M> {
    pub fn new(
        registry: PublisherRegistry,
        source: M,
        telemetry: Telemetry,
        health: Health,
        interval: Duration,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            source,
            telemetry,
            health,
            interval,
            hostname: hostname.into(),
        }
    }

    /// Publishes one reading per interval until `shutdown` fires, then marks
    /// the process unhealthy and closes every destination.
    ///
    /// The first reading goes out one full interval after start. A cycle in
    /// progress finishes before shutdown is noticed.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            destinations = ?self.registry.names(),
            "Publish loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        self.shutdown().await;
    }

    /// One publish cycle. Returns `None` when the sensor read failed and the
    /// tick was skipped.
    pub async fn tick(&mut self) -> Option<DispatchReport> {
        let celsius = match self.source.read().await {
            Ok(celsius) => celsius,
            Err(e) => {
                error!(error = %error_chain(&e), "Failed to read temperature, skipping tick");
                return None;
            }
        };

        self.telemetry.record_temperature(celsius);
        self.telemetry.record_dispatched();

        let reading = Reading::now(celsius, self.hostname.as_str());
        let report = self.registry.dispatch(&reading).await;

        info!(
            temperature = celsius,
            delivered = report.delivered,
            failed = report.failed,
            "Reading dispatched"
        );
        Some(report)
    }

    async fn shutdown(&mut self) {
        info!("Shutdown requested, closing destinations");
        self.health.mark_shutting_down("shutdown signal received");
        debug!(health = %self.health.current_state(), "Liveness probe now failing");
        self.registry.close_all().await;
        info!("All destinations closed");
    }
}
