//! Workload endpoint: configured pressure, then the success token

use axum::extract::State;
use std::{hint::black_box, sync::Arc};
use tracing::debug;

use crate::{
    config::{MemoryMode, WorkloadConfig},
    error::{ExhaustionError, RequestError},
    pressure::{churn, fib},
    server::ServerContext,
};

/// What one request's pressure pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PressureReport {
    pub bytes_churned: usize,
    pub fib_result: u64,
}

/// Run the configured pressure for one request
///
/// Retained mode does no per-request allocation; its buffer is already held
/// by the server context.
pub fn run_pressure(workload: &WorkloadConfig) -> Result<PressureReport, ExhaustionError> {
    let bytes_churned = match workload.memory_mode {
        MemoryMode::Transient => churn(workload.memory_elements)?,
        MemoryMode::Retained | MemoryMode::Off => 0,
    };

    let fib_result = match workload.cpu_depth {
        0 => 0,
        depth => black_box(fib(black_box(depth))),
    };

    Ok(PressureReport {
        bytes_churned,
        fib_result,
    })
}

/// `GET /`
pub async fn workload(State(ctx): State<ServerContext>) -> Result<String, RequestError> {
    let config = Arc::clone(ctx.workload());
    let report = tokio::task::spawn_blocking(move || run_pressure(&config)).await??;
    debug!(
        "Workload pass: churned {} bytes, fib={}",
        report.bytes_churned, report.fib_result
    );
    Ok(ctx.workload().success_token.clone())
}
