//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod harness;
pub mod sources;

use std::time::Duration;

/// Receive timeout for tests that expect a peer to stay silent
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Values a generator with `scale` produces for `count` points
pub fn generated(scale: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| scale * i as f64).collect()
}
