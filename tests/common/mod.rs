//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use dataflow_rs::pipeline::{TaskReport, UnitExit, UnitReport};
use std::time::Duration;

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Task report of a unit that ran to completion
pub fn completed<'a>(reports: &'a [UnitReport], name: &str) -> &'a TaskReport {
    let report = reports
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no unit named '{}'", name));
    match &report.exit {
        UnitExit::Completed(task) => task,
        other => panic!("unit '{}' did not complete: {:?}", name, other),
    }
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
