//! Log output
//!
//! Two sinks share one subscriber: the service log, and an append-only
//! integrity log that only receives events emitted with
//! `target: INTEGRITY_TARGET`. Operators reconcile halted sagas from the
//! latter, so it is never rotated away with the noisy service log.

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::config::WalletConfig;

/// Target for data-integrity events
pub const INTEGRITY_TARGET: &str = "wallet_io::integrity";

/// Flush guards for every file sink. Drop only at shutdown.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

fn appender(config: &WalletConfig, file: &str) -> RollingFileAppender {
    match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, file),
        _ => tracing_appender::rolling::never(&config.log_dir, file),
    }
}

fn service_filter(config: &WalletConfig) -> EnvFilter {
    // sqlx logs every statement at info
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.log_level)))
}

fn integrity_layer<S>(writer: NonBlocking) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(Targets::new().with_target(INTEGRITY_TARGET, Level::WARN))
}

pub fn init_logging(config: &WalletConfig) -> LogGuards {
    let (service_writer, service_guard) =
        tracing_appender::non_blocking(appender(config, &config.log_file));
    // Integrity events are rare; never rotate them
    let (integrity_writer, integrity_guard) = tracing_appender::non_blocking(
        tracing_appender::rolling::never(&config.log_dir, &config.integrity_log_file),
    );

    let registry = tracing_subscriber::registry().with(integrity_layer(integrity_writer));

    if config.use_json {
        let service = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(service_writer)
            .with_ansi(false)
            .with_filter(service_filter(config));
        registry.with(service).init();
    } else {
        let service = fmt::layer()
            .with_target(false)
            .with_writer(service_writer)
            .with_ansi(false)
            .and_then(fmt::layer().with_target(false).with_ansi(true))
            .with_filter(service_filter(config));
        registry.with(service).init();
    }

    tracing::info!(
        git_hash = crate::BUILD_GIT_HASH,
        log_dir = %config.log_dir,
        integrity_log = %config.integrity_log_file,
        "Logging initialized"
    );

    LogGuards {
        _guards: vec![service_guard, integrity_guard],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_target_is_crate_scoped() {
        assert!(INTEGRITY_TARGET.starts_with("wallet_io::"));
    }

    #[test]
    fn test_default_integrity_file_is_separate() {
        let config = WalletConfig::default();
        assert_ne!(config.log_file, config.integrity_log_file);
    }

    #[test]
    fn test_integrity_filter_rejects_other_targets() {
        let filter = Targets::new().with_target(INTEGRITY_TARGET, Level::WARN);
        assert!(filter.would_enable(INTEGRITY_TARGET, &Level::ERROR));
        assert!(!filter.would_enable("wallet_io::transfer::saga", &Level::ERROR));
        assert!(!filter.would_enable(INTEGRITY_TARGET, &Level::INFO));
    }
}
