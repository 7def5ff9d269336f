//! Runtime components: sensor, message envelope, fan-out loop, health and
//! metrics.

pub mod executor;
pub mod health;
pub mod reading;
pub mod sensor;
pub mod telemetry;
