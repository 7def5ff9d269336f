//! Logging initialization.
//!
//! The `LoggerManager` validates the logging configuration and installs the
//! global `tracing` subscriber with one layer per enabled target: console,
//! systemd journald and a plain log file. `RUST_LOG` overrides the
//! configured level.

use std::{fs, io, path::Path};

use thiserror::Error;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{InitError, RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, fmt::format::FmtSpan, prelude::*, EnvFilter, Layer, Registry};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig},
    print_info, print_warn,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to open log file: {0}")]
    FileAppender(#[from] InitError),

    #[error("Failed to install global subscriber: {0}")]
    InitializationError(String),

    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,

    /// Journald was requested as the only output and could not be reached.
    #[error("Failed to initialize journald logger and no other output is enabled")]
    JournaldUnavailable,
}

/// Keeps the file writer's background worker alive. Dropping it flushes
/// pending lines, so hold it until the process exits.
#[must_use]
#[derive(Default)]
pub struct LoggerGuard {
    _file: Option<WorkerGuard>,
}

pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;
        Ok(LoggerManager { config })
    }

    /// Installs the global subscriber. Call once, before anything logs.
    pub fn init(&mut self) -> Result<LoggerGuard, LoggerError> {
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = LoggerGuard::default();

        if let Some(console) = self.config.console.as_ref().filter(|c| c.enabled) {
            layers.push(console_layer(console, self.filter()));
        }

        if let Some(file) = self.config.file.as_ref().filter(|f| f.enabled) {
            let (layer, file_guard) = file_layer(file, self.filter())?;
            layers.push(layer);
            guard._file = Some(file_guard);
            print_info!(
                "File logger writing to {}",
                Path::new(&file.directory).join(&file.file_name).display()
            );
        }

        if let Some(journald) = self.config.journald.as_ref().filter(|j| j.enabled) {
            match tracing_journald::layer() {
                Ok(layer) => {
                    layers.push(
                        layer
                            .with_syslog_identifier(journald.identifier.clone())
                            .with_filter(self.filter())
                            .boxed(),
                    );
                    print_info!(
                        "Systemd journald logger initialized with identifier: {}",
                        journald.identifier
                    );
                }
                Err(e) => {
                    print_warn!("Failed to initialize systemd journald logger: {}", e);
                    if layers.is_empty() {
                        return Err(LoggerError::JournaldUnavailable);
                    }
                }
            }
        }

        if layers.is_empty() {
            print_warn!("No logging layers were initialized. Please check your configuration.");
            return Err(LoggerError::NoLayersConfigured);
        }

        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|e| LoggerError::InitializationError(e.to_string()))?;
        Ok(guard)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.config.level))
    }
}

fn console_layer(config: &ConsoleConfig, filter: EnvFilter) -> BoxedLayer {
    let span_events = if config.show_spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer()
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_span_events(span_events)
        .with_ansi(config.ansi_colors)
        .with_writer(io::stdout);

    match config.format {
        LogFormat::Json => layer.json().with_filter(filter).boxed(),
        LogFormat::Pretty => layer.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => layer.compact().with_filter(filter).boxed(),
    }
}

fn file_layer(config: &FileConfig, filter: EnvFilter) -> Result<(BoxedLayer, WorkerGuard), LoggerError> {
    fs::create_dir_all(&config.directory)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(&config.file_name)
        .build(&config.directory)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter)
        .boxed();

    Ok((layer, guard))
}
