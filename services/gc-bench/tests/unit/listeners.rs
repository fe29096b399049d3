//! Bind-mode listener acquisition from configuration

use gc_bench::{BenchConfig, ListenerSource, acquire_listeners};
use pretty_assertions::assert_eq;
use rstest::*;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};

use crate::create_test_config;

/// A port that was free a moment ago
#[fixture]
fn free_port() -> u16 {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[fixture]
fn config(free_port: u16) -> BenchConfig {
    let mut config = create_test_config();
    config.server.port = free_port;
    config
}

#[rstest]
#[test]
fn test_bind_mode_yields_one_listener_on_configured_port(config: BenchConfig) {
    let source = ListenerSource::from_config(&config).unwrap();
    let set = acquire_listeners(&source).unwrap();

    assert_eq!(set.len(), 1);
    assert_eq!(
        set.local_addrs(),
        vec![SocketAddr::from((Ipv4Addr::LOCALHOST, config.server.port))]
    );
}

#[rstest]
#[test]
fn test_bind_mode_port_in_use_is_fatal(config: BenchConfig) {
    let _occupied = TcpListener::bind((Ipv4Addr::LOCALHOST, config.server.port)).unwrap();
    let source = ListenerSource::from_config(&config).unwrap();
    assert!(acquire_listeners(&source).is_err());
}
