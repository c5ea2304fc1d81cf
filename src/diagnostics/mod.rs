//! Diagnostics for the logger.
//!
//! Counters that make the pipeline's behavior observable: how many ticks were
//! lost to overrun, how many bytes reached storage, how often writes came up
//! short.

pub mod stats;

pub use stats::{
    create_shared_stats, create_shared_stats_with_persistence, LoggerStats, SharedLoggerStats,
    StatsSnapshot,
};
