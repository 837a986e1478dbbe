//! Ray tracing runtime for the Rayfall project.
//!
//! This crate provides:
//! - Execution path selection between a native driver and compute emulation
//! - Wrapped acceleration structure pointers in both path forms
//! - Pipeline compilation from subobject descriptions
//! - Shader identifiers and uniformly strided shader tables
//! - Acceleration structure sizing and instance descriptors
//! - Tiled ray dispatch emulation with root binding replay

pub mod accel;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod identifier;
pub mod pipeline;
pub mod program;
pub mod shader_table;
pub mod wrapped;

pub use accel::{
    transform_3x4, BuildFlags, BuildInputs, FallbackInstanceDesc, GeometryDesc, InstanceDesc,
    InstanceFlags, PrebuildInfo,
};
pub use device::{ExecutionPath, FallbackDevice, FallbackDeviceFlags};
pub use dispatch::{DispatchPhase, DispatchRaysDesc, FallbackCommandList, PredispatchHook};
pub use error::{Result, RtError};
pub use identifier::{
    DispatchableKind, IdentifierTable, ShaderIdentifier, MAX_SHADER_IDENTIFIER_SIZE,
    SOFTWARE_SHADER_IDENTIFIER_SIZE,
};
pub use pipeline::{
    Association, HitGroupDesc, HitGroupType, PipelineConfig, RaytracingPipeline,
    RaytracingPipelineDesc, ShaderConfig, ShaderExport, ShaderKind, ShaderLibrary,
};
pub use program::{
    assemble_uber_shader, parse_uber_shader, DispatchConstants, PatchedParam, UberEntry,
    UberShaderHeader, PATCHED_PARAMETER_COUNT,
};
pub use shader_table::{records_from_bytes, ShaderRecord, ShaderTable};
pub use wrapped::WrappedGpuPointer;
