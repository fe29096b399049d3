//! Unit test suites

pub mod config;
pub mod listeners;
pub mod router;
