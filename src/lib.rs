//! tempcast: periodic temperature telemetry forwarder
//!
//! Reads a DS18B20 one-wire thermometer on a fixed interval and publishes
//! each reading as JSON to up to two AMQP brokers (`local` and `remote`).
//! Every destination reconnects on its own when its connection drops; a
//! failing destination never blocks the others.
//!
//! ## Modules
//!
//! * `config`: TOML configuration, `RABBITMQ_*` environment overrides and
//!   validation via the `validator` crate.
//!
//! * `core`: runtime components:
//!   - one-wire sensor discovery and parsing
//!   - the `Reading` message envelope
//!   - the publish loop and its destination registry
//!   - liveness state and Prometheus metrics
//!
//! * `logger`: `tracing` subscriber setup with console, journald and file
//!   outputs.
//!
//! * `server`: HTTP endpoints `/metrics` and `/healthz`.
//!
//! The AMQP transport lives in the `tempcast_amqp` crate.

pub mod config;
pub mod core;
pub mod logger;
pub mod server;
