//! Structured logging for the session sync client.
//!
//! Console output with uptime timestamps and module paths, plus JSON file
//! logging in debug builds for post-mortem analysis. The level comes from
//! `RUST_LOG` when set, otherwise from the configuration.

use sessync_config::Config;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE_NAME: &str = "sessync.log";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - Directory for the JSON log file (debug builds only)
/// * `debug_build` - Whether this is a debug build (enables file logging)
/// * `config` - Configuration supplying the log level and datagram tracing
///
/// # Examples
///
/// ```no_run
/// use sessync_log::init_logging;
/// use sessync_config::Config;
///
/// init_logging(None, false, Some(&Config::default()));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true) // receive loop runs on runtime workers
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build && let Some(log_file) = log_dir.and_then(open_log_file) {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Filter directives for `config`.
///
/// Datagram tracing logs at debug level in `sessync_net`, so enabling it
/// raises that target to `debug` whatever the base level.
pub fn filter_directives(config: Option<&Config>) -> String {
    let Some(config) = config else {
        return DEFAULT_FILTER.to_string();
    };

    let mut filter = if config.debug.log_level.is_empty() {
        DEFAULT_FILTER.to_string()
    } else {
        config.debug.log_level.clone()
    };
    if config.debug.trace_datagrams {
        filter.push_str(",sessync_net=debug");
    }
    filter
}

/// Create `log_dir` if needed and truncate the log file inside it.
fn open_log_file(log_dir: &Path) -> Option<File> {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Cannot create log directory {}: {e}", log_dir.display());
        return None;
    }
    let path = log_dir.join(LOG_FILE_NAME);
    match File::create(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Cannot create log file {}: {e}", path.display());
            None
        }
    }
}
