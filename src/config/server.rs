use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// HTTP endpoint serving `/metrics` and `/healthz`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    /// Listen address, `host:port`.
    #[validate(custom(function = "validate_bind_address"))]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

fn validate_bind_address(bind: &str) -> Result<(), ValidationError> {
    bind.parse::<SocketAddr>().map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("invalid_bind_address");
        err.message = Some(format!("Invalid bind address: {bind}").into());
        err
    })
}
