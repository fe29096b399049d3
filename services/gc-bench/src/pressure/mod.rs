//! Memory and CPU pressure generators driven by the workload endpoint

pub mod cpu;
pub mod memory;

pub use cpu::fib;
pub use memory::{RetainedBuffer, churn, element_bytes};
