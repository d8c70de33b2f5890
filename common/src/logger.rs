// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! Ferrocoin logging.
//!
//! Every stateful component takes a `Logger` value; there is no process-wide
//! logger. Tests either discard output (`create_null_logger`) or write
//! synchronously to stdout (`create_test_logger`).

use slog::Drain;

/// Expose the standard crit! debug! error! etc macros from slog
/// (those are the ones that accept a Logger instance)
pub mod log {
    pub use slog::{crit, debug, error, info, trace, warn};
}

/// Expose slog and select useful primitives.
pub use slog;
pub use slog::{o, Logger};

/// Create a logger that discards everything.
pub fn create_null_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

/// Create a synchronous stdout logger for use in tests.
pub fn create_test_logger() -> Logger {
    let decorator = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    Logger::root(drain, o!())
}
