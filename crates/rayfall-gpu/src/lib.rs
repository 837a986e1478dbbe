//! Modeled GPU layer for the Rayfall runtime.
//!
//! This crate provides:
//! - Adapter capability detection
//! - Buffers with a modeled GPU virtual address space
//! - Shader-visible descriptor heaps with owned allocation counters
//! - Root signatures and compute pipelines
//! - A typed command recording surface

pub mod capabilities;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod raytracing;
pub mod resource;
pub mod root_signature;

pub use capabilities::{DeviceCapabilities, GpuVendor};
pub use command::{Command, CommandList, CommandSink, Region, StridedRegion};
pub use descriptor::{
    DescriptorHandle, DescriptorHeap, DescriptorHeapDesc, DescriptorHeapKind, DescriptorView,
};
pub use device::{Device, DeviceBuilder};
pub use error::{GpuError, Result};
pub use pipeline::ComputePipeline;
pub use raytracing::{AccelerationStructureLevel, BuildSizes};
pub use resource::{Buffer, BufferDesc, GpuVa, MemoryLocation};
pub use root_signature::{
    DescriptorRange, DescriptorRangeKind, RootParameter, RootSignature, RootSignatureDesc,
    DESCRIPTOR_RANGE_UNBOUNDED,
};
