use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::ExitCode;

use clap::Parser;
use kvnet::Server;
use slog::{crit, error};
use sloggers::types::Severity;

/// A single-threaded, non-blocking key-value server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 1234)]
    port: u16,

    /// Log verbosity.
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

impl From<LogLevel> for Severity {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Severity::Trace,
            LogLevel::Debug => Severity::Debug,
            LogLevel::Info => Severity::Info,
            LogLevel::Warning => Severity::Warning,
            LogLevel::Error => Severity::Error,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let log = kvcore::logging::init(args.log_level.into());

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port);

    let mut server = match Server::bind(addr, log.clone()) {
        Ok(server) => server,
        Err(e) => {
            crit!(log, "bootstrap failed"; "error" => %e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run() {
        error!(log, "event loop terminated"; "error" => %e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
