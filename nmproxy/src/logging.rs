//! Tracing setup for the nmproxy binary.
//!
//! Output goes to stderr or an append-mode file, never stdout: stdout carries
//! frames to the browser.

use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_STDERR;

/// Level override for the `nmproxy` target when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "NMPROXY_LOG";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] TryInitError),
}

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    /// `"stderr"` or empty selects stderr; anything else is a file path.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value == LOG_STDERR {
            Self::Stderr
        } else {
            Self::File(PathBuf::from(value))
        }
    }

    fn make_writer(&self) -> Result<BoxMakeWriter, LoggingError> {
        match self {
            Self::Stderr => Ok(BoxMakeWriter::new(std::io::stderr)),
            Self::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| LoggingError::Open {
                        path: path.clone(),
                        source,
                    })?;
                Ok(BoxMakeWriter::new(Mutex::new(file)))
            }
        }
    }
}

/// Timestamps as seconds elapsed since session start: `"       3.042"`.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new(start: Instant) -> Self {
        Self { start }
    }

    pub fn starting_now() -> Self {
        Self::new(Instant::now())
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:8}.{:03}", elapsed.as_secs(), elapsed.subsec_millis())
}

impl FormatTime for SessionClock {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        w.write_str(&format_elapsed(self.start.elapsed()))
    }
}

fn filter_directive(level: Option<&str>) -> String {
    let level = match level.map(str::to_ascii_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    };
    format!("nmproxy={level}")
}

fn env_filter() -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    let level = std::env::var(LOG_LEVEL_ENV).ok();
    EnvFilter::new(filter_directive(level.as_deref()))
}

/// Install the global subscriber. Honors `RUST_LOG`, `NMPROXY_LOG` and
/// `LOG_FORMAT=json`. Fails if a global subscriber is already installed.
pub fn init_tracing(target: &LogTarget, clock: SessionClock) -> Result<(), LoggingError> {
    let writer = target.make_writer()?;
    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry().with(env_filter()).with(
            tfmt::layer()
                .json()
                .with_timer(clock)
                .with_writer(writer),
        );
        subscriber.try_init()?;
    } else {
        let subscriber = tracing_subscriber::registry().with(env_filter()).with(
            tfmt::layer()
                .with_ansi(false)
                .with_timer(clock)
                .with_writer(writer),
        );
        subscriber.try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_target_parsing() {
        assert_eq!(LogTarget::parse("stderr"), LogTarget::Stderr);
        assert_eq!(LogTarget::parse(""), LogTarget::Stderr);
        assert_eq!(
            LogTarget::parse("/var/log/nmproxy.log"),
            LogTarget::File(PathBuf::from("/var/log/nmproxy.log"))
        );
    }

    #[test]
    fn elapsed_is_padded_seconds_and_millis() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), "       0.000");
        assert_eq!(format_elapsed(Duration::from_millis(3_042)), "       3.042");
        assert_eq!(
            format_elapsed(Duration::from_secs(123_456_789) + Duration::from_millis(7)),
            "123456789.007"
        );
    }

    #[test]
    fn session_clock_counts_from_injected_start() {
        let start = Instant::now() - Duration::from_secs(5);
        let clock = SessionClock::new(start);

        let mut out = String::new();
        clock.format_time(&mut Writer::new(&mut out)).unwrap();
        let secs: u64 = out.trim().split('.').next().unwrap().parse().unwrap();
        assert!(secs >= 5, "got {out:?}");
    }

    #[test]
    fn filter_levels() {
        assert_eq!(filter_directive(None), "nmproxy=info");
        assert_eq!(filter_directive(Some("DEBUG")), "nmproxy=debug");
        assert_eq!(filter_directive(Some("warning")), "nmproxy=warn");
        assert_eq!(filter_directive(Some("bogus")), "nmproxy=info");
    }

    #[test]
    fn second_install_is_reported() {
        // Another test may have installed first; either way the last call fails.
        let _ = init_tracing(&LogTarget::Stderr, SessionClock::starting_now());
        let err = init_tracing(&LogTarget::Stderr, SessionClock::starting_now()).unwrap_err();
        assert!(matches!(err, LoggingError::Install(_)));
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let target = LogTarget::File(dir.path().join("missing").join("nm.log"));
        assert!(matches!(
            target.make_writer(),
            Err(LoggingError::Open { .. })
        ));
    }

    #[test]
    fn file_target_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nm.log");
        LogTarget::File(path.clone()).make_writer().unwrap();
        assert!(path.exists());
    }
}
