//! Benchmark server implementation

use anyhow::Result;
use axum::{Router, routing::get};
use std::{net::TcpListener, sync::Arc};
use tokio::task::JoinSet;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{
    alloc::MemoryManager,
    config::{BenchConfig, MemoryMode, WorkloadConfig},
    error::StartupError,
    handlers::{gc_stats, workload},
    listener::{self, ListenerSet, ListenerSource, acquire_listeners},
    pressure::RetainedBuffer,
    profiling,
};

/// Explicit server context shared by every handler
///
/// Built once at startup, before any listener accepts. Holds the retained
/// buffer for the lifetime of the server so the allocator keeps it live.
#[derive(Clone)]
pub struct ServerContext {
    workload: Arc<WorkloadConfig>,
    retained: Option<Arc<RetainedBuffer>>,
    memory: &'static dyn MemoryManager,
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("workload", &self.workload)
            .field("retained", &self.retained)
            .field("memory", &"&dyn MemoryManager")
            .finish()
    }
}

impl ServerContext {
    /// Build the context, allocating the retained buffer when configured
    pub fn new(
        workload: WorkloadConfig,
        memory: &'static dyn MemoryManager,
    ) -> Result<Self, StartupError> {
        let retained = match workload.memory_mode {
            MemoryMode::Retained => {
                let buffer = RetainedBuffer::allocate(workload.memory_elements)?;
                info!(
                    "Retaining {} elements ({} bytes) for the process lifetime",
                    buffer.len(),
                    buffer.size_bytes()
                );
                Some(Arc::new(buffer))
            }
            MemoryMode::Transient | MemoryMode::Off => None,
        };

        Ok(Self {
            workload: Arc::new(workload),
            retained,
            memory,
        })
    }

    #[must_use]
    pub fn workload(&self) -> &Arc<WorkloadConfig> {
        &self.workload
    }

    #[must_use]
    pub fn retained(&self) -> Option<&RetainedBuffer> {
        self.retained.as_deref()
    }

    #[must_use]
    pub fn memory(&self) -> &'static dyn MemoryManager {
        self.memory
    }
}

/// Build the primary router
///
/// Routes are fixed here; nothing is registered once serving begins.
pub fn create_app(context: ServerContext, mount_profiling: bool) -> Router {
    let memory = context.memory();
    let mut app = Router::new()
        .route("/", get(workload))
        .route("/gc-stats", get(gc_stats))
        .with_state(context);

    if mount_profiling {
        app = app.merge(profiling::router(memory));
    }

    app.layer(TraceLayer::new_for_http())
}

/// Standalone router for the diagnostic port
pub fn create_diagnostics_app(memory: &'static dyn MemoryManager) -> Router {
    profiling::router(memory).layer(TraceLayer::new_for_http())
}

/// Benchmark server
#[derive(Debug)]
pub struct BenchServer {
    config: BenchConfig,
    context: ServerContext,
}

impl BenchServer {
    /// Validate configuration and build the server context
    pub fn new(config: BenchConfig, memory: &'static dyn MemoryManager) -> Result<Self, StartupError> {
        config.validate()?;
        info!("Initializing benchmark server");
        let context = ServerContext::new(config.workload.clone(), memory)?;
        Ok(Self { config, context })
    }

    #[must_use]
    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Resolve the workload listeners and, if configured, the diagnostic one
    ///
    /// Must run before the async runtime starts: activation may edit the
    /// process environment. A diagnostic port that fails to bind is logged and
    /// skipped; workload listener failures are fatal.
    pub fn acquire(&self) -> Result<(ListenerSet, Option<TcpListener>), StartupError> {
        let source = ListenerSource::from_config(&self.config)?;
        let listeners = acquire_listeners(&source)?;

        let diagnostics = match self.config.diagnostics_address() {
            Some(address) => match address.parse() {
                Ok(addr) => match listener::bind(addr) {
                    Ok(listener) => {
                        info!("Diagnostics listening on {}", addr);
                        Some(listener)
                    }
                    Err(e) => {
                        error!("Diagnostics disabled: {}", e);
                        None
                    }
                },
                Err(e) => {
                    error!("Invalid diagnostics address '{}': {}", address, e);
                    None
                }
            },
            None => None,
        };

        Ok((listeners, diagnostics))
    }

    /// Serve until a listener fails. There is no graceful drain.
    pub async fn serve(self, listeners: ListenerSet, diagnostics: Option<TcpListener>) -> Result<()> {
        // A diagnostic port that failed to bind means no profiling at all,
        // never a fallback onto the workload listeners.
        let mount_profiling =
            self.config.diagnostics.enabled && self.config.diagnostics.mount_on_primary;
        let memory = self.context.memory();
        let app = create_app(self.context, mount_profiling);

        let mut tasks = JoinSet::new();
        for std_listener in listeners.into_inner() {
            let listener = tokio::net::TcpListener::from_std(std_listener)?;
            info!("Serving benchmark workload on {}", listener.local_addr()?);
            tasks.spawn(axum::serve(listener, app.clone()).into_future());
        }

        if let Some(std_listener) = diagnostics {
            let listener = tokio::net::TcpListener::from_std(std_listener)?;
            tasks.spawn(axum::serve(listener, create_diagnostics_app(memory)).into_future());
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => warn!("A listener stopped serving"),
                Ok(Err(e)) => {
                    error!("Server encountered a fatal error: {}", e);
                    return Err(anyhow::anyhow!("Server error: {}", e));
                }
                Err(e) => {
                    error!("Serving task failed: {}", e);
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }
}

/// Print the available routes
pub fn print_routes() {
    println!("Benchmark server routes:");
    println!("  GET  /                 - Run configured pressure, return the success token");
    println!("  GET  /gc-stats         - Collection statistics (?format=json for JSON)");
    for (name, description) in profiling::PROFILES {
        println!("  GET  {}/{:<8} - {}", profiling::PROFILING_PREFIX, name, description);
    }
}
