//! Runtime introspection endpoint

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    alloc::{CollectionStatistics, MemoryManager},
    server::ServerContext,
};

/// Query string for `/gc-stats`
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    /// `json` for a JSON body, anything else for text
    pub format: Option<String>,
}

/// Fresh snapshot, or an all-zero report when the query fails
pub fn read_statistics(memory: &dyn MemoryManager) -> CollectionStatistics {
    memory.collection_stats().unwrap_or_else(|e| {
        warn!("Collection statistics unavailable, reporting zeros: {}", e);
        CollectionStatistics::default()
    })
}

/// `GET /gc-stats`
///
/// An unparseable query string falls back to the text report.
pub async fn gc_stats(
    State(ctx): State<ServerContext>,
    query: Option<Query<StatsQuery>>,
) -> Response {
    let stats = read_statistics(ctx.memory());
    let format = query.and_then(|Query(q)| q.format);
    match format.as_deref() {
        Some("json") => Json(stats).into_response(),
        _ => stats.to_string().into_response(),
    }
}
