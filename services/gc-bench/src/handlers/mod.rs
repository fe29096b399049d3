//! Request handlers for the workload and introspection paths

pub mod stats;
pub mod workload;

pub use stats::{StatsQuery, gc_stats, read_statistics};
pub use workload::{PressureReport, run_pressure, workload};
