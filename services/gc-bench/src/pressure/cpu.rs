//! CPU pressure: naive doubly-recursive Fibonacci

/// Exponential-cost Fibonacci with no memoization
///
/// Callers pass the result through [`std::hint::black_box`] so the work is
/// not elided.
#[must_use]
pub fn fib(n: u32) -> u64 {
    if n < 2 {
        return u64::from(n);
    }
    fib(n - 2) + fib(n - 1)
}
