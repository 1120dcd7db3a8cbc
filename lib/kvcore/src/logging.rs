//! Logger construction shared by the server binary and its tests.

use serdeconv;
use slog::Logger;
use sloggers::types::Severity;
use sloggers::{Build, Config, LoggerConfig};

/// Builds a terminal logger at the given severity.
///
/// Mirrors the inline-TOML construction the rest of the workspace has always used;
/// only the severity is parameterized so the binary can wire it to a CLI flag.
pub fn init(level: Severity) -> Logger {
    let toml = format!(
        r#"
type = "terminal"
level = "{}"
destination = "stderr"
"#,
        severity_name(level)
    );

    let config: LoggerConfig = serdeconv::from_toml_str(&toml).expect("invalid logger config");
    config.build_logger().expect("failed to build logger")
}

/// A logger that discards everything; used in unit tests that need a `Logger` handle
/// but don't want test output cluttered with it.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

fn severity_name(level: Severity) -> &'static str {
    match level {
        Severity::Trace => "trace",
        Severity::Debug => "debug",
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Error => "error",
        Severity::Critical => "critical",
    }
}
