//! gc-bench - Main Entry Point

use anyhow::Result;
use clap::{Arg, ArgAction, Command, value_parser};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gc_bench::{BenchConfig, ListenerMode, MemoryMode, TrackingAllocator};

#[global_allocator]
static ALLOCATOR: TrackingAllocator = TrackingAllocator::new();

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gc_bench=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line arguments
    let matches = Command::new("gc-bench")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Instrumented HTTP benchmark server for allocation and pause measurements")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Workload port when not socket-activated")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("activation")
                .long("activation")
                .help("Adopt sockets passed by the process manager instead of binding")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("memory-mode")
                .long("memory-mode")
                .value_name("MODE")
                .help("Memory pressure: off, retained or transient")
                .value_parser(value_parser!(MemoryMode)),
        )
        .arg(
            Arg::new("memory-elements")
                .long("memory-elements")
                .value_name("N")
                .help("Word-sized slots per buffer")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("cpu-depth")
                .long("cpu-depth")
                .value_name("N")
                .help("Fibonacci depth per request, 0 disables CPU pressure")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the effective configuration and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("routes")
                .long("routes")
                .help("Print available routes and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("routes") {
        gc_bench::server::print_routes();
        return Ok(());
    }

    // Load configuration
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => match BenchConfig::from_file(path) {
            Ok(config) => {
                info!("Loaded configuration from: {}", path);
                config
            }
            Err(e) => {
                error!("Failed to load config from {}: {}", path, e);
                info!("Using default configuration");
                BenchConfig::default()
            }
        },
        None => BenchConfig::default(),
    };

    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }
    if matches.get_flag("activation") {
        config.listener.mode = ListenerMode::Activation;
    }
    if let Some(mode) = matches.get_one::<MemoryMode>("memory-mode") {
        config.workload.memory_mode = *mode;
    }
    if let Some(elements) = matches.get_one::<usize>("memory-elements") {
        config.workload.memory_elements = *elements;
    }
    if let Some(depth) = matches.get_one::<u32>("cpu-depth") {
        config.workload.cpu_depth = *depth;
    }

    if matches.get_flag("print-config") {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Starting gc-bench v{}", env!("CARGO_PKG_VERSION"));
    info!("Listener mode: {:?}", config.listener.mode);
    info!(
        "Workload: memory={} ({} elements), cpu_depth={}",
        config.workload.memory_mode, config.workload.memory_elements, config.workload.cpu_depth
    );

    if let Err(e) = gc_bench::run(config, &ALLOCATOR) {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
