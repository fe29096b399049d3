//! Profiling and runtime introspection routes under `/debug/pprof`
//!
//! Independent of the workload router: it shares no mutable state with it and
//! can be merged into the primary router or served on its own port.

use axum::{Router, extract::State, routing::get};
use std::{fmt::Write, time::Instant};

use crate::{alloc::MemoryManager, handlers::read_statistics};

/// Path prefix of every profiling route
pub const PROFILING_PREFIX: &str = "/debug/pprof";

/// Available profiles and what they report
pub const PROFILES: &[(&str, &str)] = &[
    ("cmdline", "The command line invocation of the current program"),
    ("heap", "Allocator counters and live heap size"),
    ("runtime", "Async runtime worker and task counts"),
];

#[derive(Clone)]
struct ProfilingState {
    memory: &'static dyn MemoryManager,
    started: Instant,
}

/// Build the profiling router
pub fn router(memory: &'static dyn MemoryManager) -> Router {
    let state = ProfilingState {
        memory,
        started: Instant::now(),
    };

    Router::new()
        .route(PROFILING_PREFIX, get(index))
        .route(&format!("{PROFILING_PREFIX}/"), get(index))
        .route(&format!("{PROFILING_PREFIX}/cmdline"), get(cmdline))
        .route(&format!("{PROFILING_PREFIX}/heap"), get(heap))
        .route(&format!("{PROFILING_PREFIX}/runtime"), get(runtime))
        .with_state(state)
}

async fn index() -> String {
    let mut body = String::from("Profile Descriptions:\n\n");
    for (name, description) in PROFILES {
        let _ = writeln!(body, "{PROFILING_PREFIX}/{name}: {description}");
    }
    body
}

async fn cmdline() -> String {
    std::env::args().collect::<Vec<_>>().join("\0")
}

async fn heap(State(state): State<ProfilingState>) -> String {
    let stats = read_statistics(state.memory);
    format!("heap profile: {} live bytes\n{}", stats.live_bytes, stats)
}

async fn runtime(State(state): State<ProfilingState>) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "pid: {}", std::process::id());
    let _ = writeln!(body, "uptime_seconds: {}", state.started.elapsed().as_secs());
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        let metrics = handle.metrics();
        let _ = writeln!(body, "workers: {}", metrics.num_workers());
        let _ = writeln!(body, "alive_tasks: {}", metrics.num_alive_tasks());
    }
    body
}
