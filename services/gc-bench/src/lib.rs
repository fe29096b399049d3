//! gc-bench: instrumented HTTP benchmark server
//!
//! A controllable workload for observing how allocation churn, a large live
//! heap and CPU-bound handlers interact with request latency.
//! Features:
//! - Retained or per-request transient memory pressure
//! - Exponential-cost CPU pressure per request
//! - Tracking global allocator with collection pause statistics (`/gc-stats`)
//! - Socket activation or a statically bound port
//! - Profiling routes under `/debug/pprof`

#![allow(missing_docs)]

use anyhow::Result;

pub mod alloc;
pub mod config;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod pressure;
pub mod profiling;
pub mod server;

pub use alloc::{CollectionStatistics, MemoryManager, TrackingAllocator};
pub use config::{
    BenchConfig, DiagnosticsConfig, ListenerConfig, ListenerMode, MemoryMode, ServerConfig,
    WorkloadConfig,
};
pub use error::{ActivationError, ExhaustionError, RequestError, StartupError, StatsError};
pub use listener::{
    ActivationSource, ListenerSet, ListenerSource, SystemdActivation, acquire_listeners,
};
pub use server::{BenchServer, ServerContext};

/// Acquire listeners, then run the server on a fresh multi-threaded runtime
///
/// Listener acquisition happens before the runtime exists so socket
/// activation can clean up the process environment safely.
pub fn run(config: BenchConfig, memory: &'static dyn MemoryManager) -> Result<()> {
    let server = BenchServer::new(config, memory)?;
    let (listeners, diagnostics) = server.acquire()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server.serve(listeners, diagnostics))
}
