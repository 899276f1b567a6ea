use env_logger::{Env, Target};
use log::{Record, SetLoggerError};
use std::io::Write;

const DEFAULT_FILTER: &str = "info";
const DEBUG_FILTER: &str = "debug";

fn timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn format_log_line(timestamp_ms: u64, record: &Record<'_>) -> String {
    format!(
        "{} [{}] [{}] {}",
        timestamp_ms,
        record.level().as_str(),
        record.target(),
        record.args().to_string().replace('\n', "\\n")
    )
}

/// Install the stderr logger. `RUST_LOG` wins over `debug`.
pub fn init(debug: bool) -> Result<(), SetLoggerError> {
    let default_filter = if debug { DEBUG_FILTER } else { DEFAULT_FILTER };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .target(Target::Stderr)
        .format(|buf, record| writeln!(buf, "{}", format_log_line(timestamp_ms(), record)))
        .try_init()
}
