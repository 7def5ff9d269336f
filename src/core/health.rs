//! Liveness state shared between the publish loop and the HTTP server.
//!
//! The process reports healthy from startup until the shutdown sequence
//! begins. Only the shutdown path writes the state; everything else reads it.

use std::fmt;

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    /// Shutdown has started, with the reason that triggered it.
    ShuttingDown(String),
}

impl HealthState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthState::Healthy)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "Healthy"),
            HealthState::ShuttingDown(reason) => write!(f, "ShuttingDown: {reason}"),
        }
    }
}

/// Cloneable handle to the process liveness flag.
#[derive(Debug, Clone)]
pub struct Health {
    state_tx: watch::Sender<HealthState>,
    state_rx: watch::Receiver<HealthState>,
}

impl Health {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(HealthState::Healthy);
        Self { state_tx, state_rx }
    }

    pub fn current_state(&self) -> HealthState {
        self.state_rx.borrow().clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.state_rx.borrow().is_healthy()
    }

    /// Flips the flag to unhealthy. Later calls keep the first reason.
    pub fn mark_shutting_down(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let changed = self.state_tx.send_if_modified(|state| {
            if state.is_healthy() {
                *state = HealthState::ShuttingDown(reason.clone());
                true
            } else {
                false
            }
        });
        if changed {
            debug!("Health state changed: Healthy -> ShuttingDown ({reason})");
        }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_state_display() {
        assert_eq!(HealthState::Healthy.to_string(), "Healthy");
        assert_eq!(
            HealthState::ShuttingDown("SIGTERM".into()).to_string(),
            "ShuttingDown: SIGTERM"
        );
    }

    #[test]
    fn test_health_starts_healthy() {
        let health = Health::new();
        assert!(health.is_healthy());
        assert_eq!(health.current_state(), HealthState::Healthy);
    }

    #[test]
    fn test_clones_observe_shutdown() {
        let health = Health::new();
        let server_view = health.clone();

        health.mark_shutting_down("signal");

        assert!(!server_view.is_healthy());
        assert_eq!(
            server_view.current_state(),
            HealthState::ShuttingDown("signal".into())
        );
    }

    #[test]
    fn test_first_reason_wins() {
        let health = Health::new();
        health.mark_shutting_down("first");
        health.mark_shutting_down("second");
        assert_eq!(
            health.current_state(),
            HealthState::ShuttingDown("first".into())
        );
    }
}
