//! Broker settings and their `RABBITMQ_*` environment overrides.

pub type BrokerConfig = tempcast_amqp::Config;

pub const ENV_LOCAL_URI: &str = "RABBITMQ_LOCAL_URI";
pub const ENV_REMOTE_URI: &str = "RABBITMQ_REMOTE_URI";
pub const ENV_QUEUE: &str = "RABBITMQ_QUEUE";
pub const ENV_USE_TLS: &str = "RABBITMQ_USE_TLS";
pub const ENV_USE_MTLS: &str = "RABBITMQ_USE_MTLS";

/// Applies environment overrides on top of the file configuration.
///
/// URIs are taken whenever the variable is set, so an empty value disables
/// an endpoint. An empty queue name keeps the configured one. Boolean flags
/// that do not parse keep the configured value. Returns the names of the
/// variables that took effect.
pub fn apply_env_overrides<F>(broker: &mut BrokerConfig, lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = Vec::new();

    if let Some(uri) = lookup(ENV_LOCAL_URI) {
        broker.local_uri = uri;
        applied.push(ENV_LOCAL_URI);
    }
    if let Some(uri) = lookup(ENV_REMOTE_URI) {
        broker.remote_uri = uri;
        applied.push(ENV_REMOTE_URI);
    }
    if let Some(queue) = lookup(ENV_QUEUE).filter(|q| !q.is_empty()) {
        broker.queue = queue;
        applied.push(ENV_QUEUE);
    }
    if let Some(enabled) = lookup(ENV_USE_TLS).as_deref().and_then(parse_bool) {
        broker.tls.enabled = enabled;
        applied.push(ENV_USE_TLS);
    }
    if let Some(mutual) = lookup(ENV_USE_MTLS).as_deref().and_then(parse_bool) {
        broker.tls.mutual = mutual;
        applied.push(ENV_USE_MTLS);
    }

    applied
}

/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
