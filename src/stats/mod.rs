//! Server statistics and the periodic status reporter

pub mod metrics;
pub mod reporter;

pub use metrics::{ServerCounters, ServerStats};
pub use reporter::spawn_reporter;
