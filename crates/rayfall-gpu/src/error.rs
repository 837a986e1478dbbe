//! Error types for the device interface layer.

use thiserror::Error;

/// Errors produced by the device interface layer.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Every slot in a descriptor heap is allocated.
    #[error("Descriptor heap exhausted: all {capacity} slots are allocated")]
    DescriptorHeapExhausted { capacity: u32 },

    /// The device stopped accepting work.
    #[error("Device lost")]
    DeviceLost,

    /// No adapter satisfies the requested capabilities.
    #[error("No suitable adapter")]
    NoSuitableAdapter,

    /// A creation request was malformed.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A handle no longer names a live object.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// An operation was issued against an object in the wrong state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using [`GpuError`].
pub type Result<T> = std::result::Result<T, GpuError>;
