//! Diagnostics sink setup: `tracing` events formatted by `tracing-subscriber`
//! and delivered to the local syslog daemon, or to stderr for foreground runs.
use std::io::Write;
use std::sync::Mutex;
use syslog::{Facility, Formatter3164, Logger, LoggerBackend};
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const SYSLOG_IDENT: &str = "herder";

/// Where diagnostics go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Syslog,
    Stderr,
}

/// Install the global subscriber. Failure to reach syslog or to install is
/// not fatal: the daemon keeps running with diagnostics dropped.
pub fn init(target: LogTarget, verbose: bool) {
    let filter = env_filter(verbose);
    let result = match target {
        LogTarget::Syslog => match Syslog::open() {
            // syslog stamps time and priority itself.
            Ok(syslog) => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(syslog)
                .with_ansi(false)
                .without_time()
                .with_level(false)
                .with_target(false)
                .try_init(),
            Err(e) => {
                eprintln!("herder: syslog unavailable, diagnostics disabled: {e}");
                return;
            }
        },
        LogTarget::Stderr => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("herder: diagnostics disabled: {e}");
    }
}

/// `--verbose` forces debug output; otherwise `RUST_LOG` or info.
fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("herder=debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("herder=info"))
}

/// Syslog severities herder writes at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Priority {
    Err,
    Warning,
    Notice,
    Debug,
}

/// Syslog priority for a `tracing` level.
fn priority_for(level: Level) -> Priority {
    match level {
        Level::ERROR => Priority::Err,
        Level::WARN => Priority::Warning,
        Level::INFO => Priority::Notice,
        _ => Priority::Debug,
    }
}

/// Connection to the local syslog daemon, opened once at startup.
pub struct Syslog {
    logger: Mutex<Logger<LoggerBackend, Formatter3164>>,
}

impl Syslog {
    pub fn open() -> Result<Self, syslog::Error> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_USER,
            hostname: None,
            process: SYSLOG_IDENT.to_string(),
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter)?;
        Ok(Self {
            logger: Mutex::new(logger),
        })
    }
}

impl<'a> MakeWriter<'a> for Syslog {
    type Writer = SyslogWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogWriter::new(&self.logger, Priority::Notice)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogWriter::new(&self.logger, priority_for(*meta.level()))
    }
}

/// Buffers one formatted event and sends it as a single record when dropped.
pub struct SyslogWriter<'a> {
    logger: &'a Mutex<Logger<LoggerBackend, Formatter3164>>,
    priority: Priority,
    buf: Vec<u8>,
}

impl<'a> SyslogWriter<'a> {
    fn new(logger: &'a Mutex<Logger<LoggerBackend, Formatter3164>>, priority: Priority) -> Self {
        Self {
            logger,
            priority,
            buf: Vec::new(),
        }
    }
}

impl Write for SyslogWriter<'_> {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogWriter<'_> {
    fn drop(&mut self) {
        let Some(message) = syslog_message(&self.buf) else {
            return;
        };
        let Ok(mut logger) = self.logger.lock() else {
            return;
        };
        // Best effort: a lost record is not worth failing over.
        let _ = match self.priority {
            Priority::Err => logger.err(message),
            Priority::Warning => logger.warning(message),
            Priority::Notice => logger.notice(message),
            Priority::Debug => logger.debug(message),
        };
    }
}

/// One syslog record from a formatted event, trailing newline stripped.
/// `None` for an empty record.
fn syslog_message(buf: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(buf);
    let message = text.trim_end_matches(['\n', '\r']);
    (!message.is_empty()).then(|| message.to_string())
}
