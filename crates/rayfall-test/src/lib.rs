//! Scenario harness for the Rayfall runtime.
//!
//! This crate provides:
//! - A reusable [`Scenario`] that stands up a device, a ray tracing
//!   pipeline, and uploaded shader tables in a few lines
//! - Command stream query helpers for asserting on recorded dispatches
//! - End-to-end tests covering both execution paths

pub mod harness;

pub use harness::{
    compute_dispatches, init_test_logging, native_dispatches, root_constants_at, Scenario,
};

use rayfall_core::constants::MAX_DISPATCH_GROUPS_PER_DIM;
use thiserror::Error;

/// Errors produced while standing up or driving a scenario.
#[derive(Error, Debug)]
pub enum TestError {
    /// Device interface failure.
    #[error(transparent)]
    Gpu(#[from] rayfall_gpu::GpuError),

    /// Ray tracing runtime failure.
    #[error(transparent)]
    Rt(#[from] rayfall_rt::RtError),
}

pub type Result<T> = std::result::Result<T, TestError>;

/// Knobs for scenario construction.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Capacity of the shader visible descriptor heap.
    pub descriptor_capacity: u32,
    /// Per-dimension group limit advertised by the device.
    pub max_dispatch_groups_per_dim: u32,
    /// Force the compute path even when a driver is reported.
    pub force_compute: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            descriptor_capacity: 64,
            max_dispatch_groups_per_dim: MAX_DISPATCH_GROUPS_PER_DIM,
            force_compute: false,
        }
    }
}
