//! Error types for the benchmark server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::{io, net::SocketAddr, os::fd::RawFd};
use thiserror::Error;
use tracing::error;

/// Failures reported by the socket activation mechanism
#[derive(Debug, Error)]
pub enum ActivationError {
    /// `LISTEN_PID` is set but is not a process id
    #[error("Invalid LISTEN_PID value: {0:?}")]
    InvalidPid(String),

    /// `LISTEN_PID` names this process but `LISTEN_FDS` is absent
    #[error("LISTEN_PID matches this process but LISTEN_FDS is not set")]
    MissingFdCount,

    /// `LISTEN_FDS` is not a descriptor count
    #[error("Invalid LISTEN_FDS value: {0:?}")]
    InvalidFdCount(String),

    /// An inherited descriptor could not be adopted as a listener
    #[error("Failed to adopt inherited socket fd {fd}: {source}")]
    Adopt {
        fd: RawFd,
        #[source]
        source: io::Error,
    },
}

/// An allocation request the allocator could not satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Allocation of {elements} elements ({bytes} bytes) could not be satisfied")]
pub struct ExhaustionError {
    pub elements: usize,
    pub bytes: usize,
}

/// Statistics query failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StatsError {
    /// The tracking allocator has never observed an allocation, so it is not
    /// the installed global allocator
    #[error("Tracking allocator is not installed as the global allocator")]
    Inactive,
}

/// Fatal startup failures. None of these are retried.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Socket activation failed: {0}")]
    Activation(#[from] ActivationError),

    #[error("Socket activation supplied no listeners")]
    NoListeners,

    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Retained buffer allocation failed: {0}")]
    Exhaustion(#[from] ExhaustionError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Per-request failure on the workload path
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Exhaustion(#[from] ExhaustionError),

    #[error("Pressure task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        error!("Workload request failed: {}", self);
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
