//! Core constants and helpers for the Rayfall ray tracing layer.
//!
//! This crate provides the foundational pieces shared by every layer crate:
//! - Device-class limits and sentinel values
//! - Alignment math for GPU allocations and shader tables

pub mod align;

pub use align::{align_down, align_up, is_aligned};

/// Layer-wide constants.
pub mod constants {
    /// Sentinel for "no descriptor slot". Wrapped pointers on the hardware
    /// execution path carry it, since that path never consumes a descriptor.
    pub const DESCRIPTOR_INDEX_INVALID: u32 = u32::MAX;

    /// Size in bytes of a native shader identifier.
    pub const NATIVE_SHADER_IDENTIFIER_SIZE: u32 = 32;

    /// Largest ray payload the emulated path will carry through traversal.
    pub const MAX_RAY_PAYLOAD_SIZE: u32 = 256;

    /// Largest intersection attribute block (matches the D3D12 limit).
    pub const MAX_ATTRIBUTE_SIZE: u32 = 32;

    /// Deepest trace recursion a pipeline may declare.
    pub const MAX_TRACE_RECURSION_DEPTH: u32 = 31;

    /// Required placement alignment for acceleration structure buffers.
    pub const ACCELERATION_STRUCTURE_ALIGNMENT: u64 = 256;

    /// Required base alignment for shader table buffers.
    pub const SHADER_TABLE_ALIGNMENT: u64 = 64;

    /// Placement granularity of the virtual address allocator (64 KiB).
    pub const BUFFER_ALLOCATION_ALIGNMENT: u64 = 64 * 1024;

    /// Total cost budget of a root signature, in 32-bit words.
    pub const ROOT_SIGNATURE_DWORD_BUDGET: u32 = 64;

    /// Thread group width of the synthesized uber compute program.
    pub const DISPATCH_GROUP_WIDTH: u32 = 8;

    /// Thread group height of the synthesized uber compute program.
    pub const DISPATCH_GROUP_HEIGHT: u32 = 8;

    /// Most thread groups a single compute dispatch may cover per dimension.
    pub const MAX_DISPATCH_GROUPS_PER_DIM: u32 = 65_535;

    /// Register space reserved for parameters the layer appends to a
    /// caller's root signature. Caller signatures must not use it.
    pub const INTERNAL_REGISTER_SPACE: u32 = 0x7FFF_0000;
}
