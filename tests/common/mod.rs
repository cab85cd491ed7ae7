//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod elf_builder;

use destra_rs::{SimulatedDevice, TransportSession};
use std::io::Write;
use tempfile::NamedTempFile;

/// Session attached to a clone of `device`
pub fn attached_session(device: &SimulatedDevice) -> TransportSession {
    let mut session = TransportSession::default();
    session
        .attach(Box::new(device.clone()))
        .expect("attach to simulated device");
    session
}

/// Write `bytes` to a temporary file that lives as long as the handle
pub fn temp_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(bytes).expect("write temp file");
    file.flush().expect("flush temp file");
    file
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
