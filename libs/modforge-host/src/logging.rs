use crate::config::LoggingConfig;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

fn parse_tracing_level(s: &str) -> Option<Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

// ================= rotating writer for the file sink =================

#[derive(Clone)]
struct RollingWriter(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl<'a> fmt::MakeWriter<'a> for RollingWriter {
    type Writer = RollingHandle;
    fn make_writer(&'a self) -> Self::Writer {
        RollingHandle(self.0.clone())
    }
}

#[derive(Clone)]
struct RollingHandle(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl Write for RollingHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut rot) => rot.write(buf),
            Err(_) => Ok(buf.len()),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut rot) => rot.flush(),
            Err(_) => Ok(()),
        }
    }
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn create_rotating_writer(cfg: &LoggingConfig, base_dir: &Path) -> Option<RollingWriter> {
    if cfg.file.trim().is_empty() {
        return None;
    }
    let log_path = resolve_log_path(&cfg.file, base_dir);
    if let Some(parent) = log_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("cannot create log dir {}: {e}", parent.display());
            return None;
        }
    }

    let max_bytes = cfg.max_size_mb.unwrap_or(100).saturating_mul(1024 * 1024) as usize;
    let limit = FileLimit::MaxFiles(cfg.max_backups.unwrap_or(3));

    let rot = FileRotate::new(
        &log_path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );

    Some(RollingWriter(Arc::new(Mutex::new(rot))))
}

// ================= public init =================

/// Initialize logging from the host configuration: a console sink plus an
/// optional rotating file sink. `RUST_LOG`, when set, overrides the console
/// level.
pub fn init_logging(cfg: &LoggingConfig, base_dir: &Path) {
    // Bridge `log` → `tracing` before installing the subscriber.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let console_layer = parse_tracing_level(&cfg.console_level).map(|level| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
        fmt::layer().with_target(true).with_filter(filter)
    });

    let file_level = if cfg.file_level.trim().is_empty() {
        cfg.console_level.as_str()
    } else {
        cfg.file_level.as_str()
    };
    let file_layer = match (
        parse_tracing_level(file_level),
        create_rotating_writer(cfg, base_dir),
    ) {
        (Some(level), Some(writer)) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .with_filter(LevelFilter::from_level(level)),
        ),
        _ => None,
    };

    if tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        // A subscriber is already installed (tests, embedders). Leave it alone.
        tracing::debug!("logging already initialized, skipping");
    }
}

/// Minimal fallback: INFO to console, honoring `RUST_LOG`.
pub fn init_minimal() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .try_init();
}
