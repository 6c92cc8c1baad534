//! Logging setup and output directory layout

use anyhow::Result;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const OUTPUT_ROOT: &str = "output";
/// One subdirectory per writer: rolling logs, signal and execution JSONL
/// from storage/, and the event audit stream.
const OUTPUT_SUBDIRS: &[&str] = &["logs", "signals", "executions", "events"];

pub struct LoggingGuard {
    pub _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Console output for the operator plus an hourly-rolling file under
/// `output/logs`, named after the crate. The returned guard must stay
/// alive for the file writer to keep flushing.
pub fn setup_logging() -> Result<Arc<LoggingGuard>> {
    let log_name = concat!(env!("CARGO_PKG_NAME"), ".log");
    let file_appender =
        tracing_appender::rolling::hourly(Path::new(OUTPUT_ROOT).join("logs"), log_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(true);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .compact();

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    Ok(Arc::new(LoggingGuard { _guard: guard }))
}

pub fn setup_output_directories() -> Result<()> {
    for subdir in OUTPUT_SUBDIRS {
        fs::create_dir_all(Path::new(OUTPUT_ROOT).join(subdir))?;
    }
    Ok(())
}
