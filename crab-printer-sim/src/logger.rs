//! Logging setup for the simulator binary

use std::path::Path;

/// Install the global subscriber
///
/// Logs go to a daily rolling file when `log_dir` exists, otherwise to stdout.
pub fn init_logger(log_level: &str, log_dir: Option<&str>) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level.parse().unwrap_or(tracing::Level::INFO))
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir {
        let log_path = Path::new(dir);
        if log_path.is_dir() {
            let file_appender = tracing_appender::rolling::daily(log_path, "crab-printer-sim");
            subscriber.with_ansi(false).with_writer(file_appender).init();
            return;
        }
        eprintln!("log directory {dir} does not exist, logging to stdout");
    }

    subscriber.init();
}
