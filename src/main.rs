use std::{process, sync::OnceLock, time::Duration};

use tempcast::{
    config::Config,
    core::{
        executor::{AmqpConnector, Executor, PublisherRegistry},
        health::Health,
        sensor::W1Thermometer,
        telemetry::Telemetry,
    },
    logger::LoggerManager,
    print_error, server,
};
use tempcast_amqp::{Endpoint, TlsSettings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

fn transport_security(tls: Option<&TlsSettings>) -> &'static str {
    match tls {
        Some(tls) if tls.has_client_identity() => "mTLS",
        Some(_) => "TLS",
        None => "plain",
    }
}

fn log_destinations_table(configured: &[Endpoint], registered: &[&str], security: &str) {
    let name_width = configured
        .iter()
        .map(|e| e.name().len())
        .max()
        .unwrap_or(0)
        .max("Destination".len());

    info!("{:<width$} | Status     | Security | URI", "Destination", width = name_width);
    info!(
        "{}-+-{}-+-{}-+-{}",
        "-".repeat(name_width),
        "-".repeat(10),
        "-".repeat(8),
        "-".repeat(24)
    );

    for endpoint in configured {
        let status = if registered.contains(&endpoint.name()) {
            "CONNECTED"
        } else {
            "SKIPPED"
        };
        info!(
            "{:<width$} | {:<10} | {:<8} | {}",
            endpoint.name(),
            status,
            security,
            endpoint.redacted_uri(),
            width = name_width
        );
    }
}

fn resolve_hostname(configured: Option<&str>) -> String {
    if let Some(name) = configured.filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!(error = %e, "Failed to resolve host name, using 'unknown'");
            "unknown".to_string()
        }
    }
}

async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, listening for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl+C"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config();
    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    let _log_guard = logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting tempcast version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!(queue = %cfg.broker.queue, endpoints = ?cfg.broker.endpoints(), "Broker configuration");

    let hostname = resolve_hostname(cfg.sensor.hostname.as_deref());
    info!(hostname = %hostname, "Host name resolved");

    let thermometer = W1Thermometer::discover(&cfg.sensor.devices_dir, &cfg.sensor.device_prefix)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to locate temperature sensor: {}", e);
            process::exit(1);
        });

    let tls = TlsSettings::load(&cfg.broker.tls).unwrap_or_else(|e| {
        error!("Failed to load TLS configuration: {}", e);
        process::exit(1);
    });

    let security = transport_security(tls.as_ref());

    let endpoints = cfg.broker.endpoints();
    let connector = AmqpConnector::new(tls, cfg.broker.retry.clone());
    let registry = PublisherRegistry::build(&endpoints, &connector)
        .await
        .unwrap_or_else(|e| {
            error!("{}", e);
            process::exit(1);
        });
    log_destinations_table(&endpoints, &registry.names(), security);

    let health = Health::new();
    let telemetry = Telemetry::new()?;

    let server_shutdown = CancellationToken::new();
    let server_handle = if cfg.server.enabled {
        let (health, telemetry, token) = (health.clone(), telemetry.clone(), server_shutdown.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = server::serve(&cfg.server, health, telemetry, token).await {
                error!(error = %e, "HTTP server error");
            }
        }))
    } else {
        info!("HTTP server disabled");
        None
    };

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let signal = shutdown_signal().await;
            info!("Received {signal}, initiating graceful shutdown...");
            shutdown.cancel();
        }
    });

    let executor = Executor::new(
        registry,
        thermometer,
        telemetry,
        health,
        Duration::from_secs(cfg.sensor.interval),
        hostname,
    );
    executor.run(shutdown).await;

    server_shutdown.cancel();
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }

    info!("Shutdown complete");
    Ok(())
}
