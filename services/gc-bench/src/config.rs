//! Configuration for the benchmark server

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::StartupError;

/// Deepest Fibonacci the workload will run
pub const MAX_CPU_DEPTH: u32 = 64;

/// Benchmark server configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Primary listener configuration
    pub server: ServerConfig,
    /// How listening sockets are obtained
    pub listener: ListenerConfig,
    /// Per-request pressure generation
    pub workload: WorkloadConfig,
    /// Profiling subsystem placement
    pub diagnostics: DiagnosticsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host when not socket-activated
    pub host: String,
    /// Bind port when not socket-activated
    pub port: u16,
}

/// Listener acquisition configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub mode: ListenerMode,
    /// Remove `LISTEN_*` variables after adopting activated sockets
    pub unset_environment: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerMode {
    /// Bind `server.host:server.port`
    Bind,
    /// Adopt sockets passed by the process manager
    Activation,
}

/// Pressure generation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub memory_mode: MemoryMode,
    /// Word-sized slots per buffer
    pub memory_elements: usize,
    /// Fibonacci depth per request, 0 disables CPU pressure
    pub cpu_depth: u32,
    /// Body returned by the workload endpoint
    pub success_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// No memory pressure
    Off,
    /// One buffer allocated at startup and held until exit
    Retained,
    /// A fresh buffer allocated and dropped on every request
    Transient,
}

/// Profiling subsystem configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Serve the profiling routes on the primary listeners instead of a
    /// separate diagnostic port
    pub mount_on_primary: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            mode: ListenerMode::Bind,
            unset_environment: true,
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            memory_mode: MemoryMode::Transient,
            memory_elements: 10_000_000, // 80MB on 64-bit targets
            cpu_depth: 30,
            success_token: "success".to_string(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 6060,
            mount_on_primary: false,
        }
    }
}

impl BenchConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), StartupError> {
        let depth = self.workload.cpu_depth;
        if depth > MAX_CPU_DEPTH {
            return Err(StartupError::Config(format!(
                "cpu_depth {depth} exceeds maximum {MAX_CPU_DEPTH}"
            )));
        }
        if self.workload.memory_mode != MemoryMode::Off && self.workload.memory_elements == 0 {
            return Err(StartupError::Config(
                "memory_elements must be non-zero when memory_mode is enabled".to_string(),
            ));
        }
        if self.workload.success_token.is_empty() {
            return Err(StartupError::Config(
                "success_token must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get server address
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get diagnostics address when a separate port is configured
    #[must_use]
    pub fn diagnostics_address(&self) -> Option<String> {
        if !self.diagnostics.enabled || self.diagnostics.mount_on_primary {
            return None;
        }
        Some(format!("{}:{}", self.diagnostics.host, self.diagnostics.port))
    }
}

impl fmt::Display for MemoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Retained => "retained",
            Self::Transient => "transient",
        };
        f.write_str(name)
    }
}

impl FromStr for MemoryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "retained" => Ok(Self::Retained),
            "transient" => Ok(Self::Transient),
            other => Err(format!(
                "unknown memory mode '{other}', expected off, retained or transient"
            )),
        }
    }
}
