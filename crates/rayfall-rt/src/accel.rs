//! Acceleration structure inputs, sizing, and instance descriptors.
//!
//! Builds are described by the same inputs on both execution paths; only
//! the sizing differs. Software sizes come from closed-form bounds over the
//! primitive count, native sizes come from the driver. Top-level inputs
//! reference bottom-level structures through instance descriptors, which on
//! the emulated path carry a packed wrapped pointer instead of a raw
//! address.

use crate::wrapped::WrappedGpuPointer;
use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use rayfall_core::align::align_up;
use rayfall_core::constants::ACCELERATION_STRUCTURE_ALIGNMENT;
use rayfall_gpu::{AccelerationStructureLevel, GpuVa};

/// One geometry in a bottom-level build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometryDesc {
    Triangles {
        vertex_buffer: GpuVa,
        vertex_count: u32,
        vertex_stride: u32,
        /// Optional index buffer; non-indexed geometry reads vertices
        /// three at a time.
        index_buffer: Option<GpuVa>,
        index_count: u32,
        /// Optional 3x4 row-major transform applied at build time.
        transform: Option<GpuVa>,
    },
    Aabbs {
        buffer: GpuVa,
        count: u32,
        stride: u32,
    },
}

impl GeometryDesc {
    /// Number of primitives this geometry contributes.
    pub fn primitive_count(&self) -> u32 {
        match self {
            Self::Triangles {
                vertex_count,
                index_buffer,
                index_count,
                ..
            } => {
                if index_buffer.is_some() {
                    index_count / 3
                } else {
                    vertex_count / 3
                }
            }
            Self::Aabbs { count, .. } => *count,
        }
    }
}

bitflags! {
    /// Build-time tradeoffs requested by the application.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BuildFlags: u32 {
        const ALLOW_UPDATE = 0x1;
        const ALLOW_COMPACTION = 0x2;
        const PREFER_FAST_TRACE = 0x4;
        const PREFER_FAST_BUILD = 0x8;
        const MINIMIZE_MEMORY = 0x10;
        const PERFORM_UPDATE = 0x20;
    }
}

/// Inputs to an acceleration structure build.
#[derive(Debug, Clone)]
pub enum BuildInputs {
    BottomLevel {
        geometries: Vec<GeometryDesc>,
        flags: BuildFlags,
    },
    TopLevel {
        instance_count: u32,
        /// Buffer of instance descriptors.
        instances: GpuVa,
        flags: BuildFlags,
    },
}

impl BuildInputs {
    pub fn level(&self) -> AccelerationStructureLevel {
        match self {
            Self::BottomLevel { .. } => AccelerationStructureLevel::BottomLevel,
            Self::TopLevel { .. } => AccelerationStructureLevel::TopLevel,
        }
    }

    /// Primitives across all geometries, or the instance count.
    pub fn primitive_count(&self) -> u32 {
        match self {
            Self::BottomLevel { geometries, .. } => {
                geometries.iter().map(GeometryDesc::primitive_count).sum()
            }
            Self::TopLevel { instance_count, .. } => *instance_count,
        }
    }
}

/// Sizes an application must allocate before requesting a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrebuildInfo {
    /// Upper bound on the built structure, in bytes.
    pub result_data_max_size: u64,
    pub scratch_data_size: u64,
    /// Scratch for in-place updates. Zero when updates rebuild from
    /// scratch.
    pub update_scratch_data_size: u64,
}

/// Conservative sizes for the software builder: a binary BVH over the
/// primitives, so at most `2n - 1` nodes.
pub(crate) fn software_prebuild_info(inputs: &BuildInputs) -> PrebuildInfo {
    let n = u64::from(inputs.primitive_count().max(1));
    PrebuildInfo {
        result_data_max_size: align_up(128 + (2 * n - 1) * 64, ACCELERATION_STRUCTURE_ALIGNMENT),
        scratch_data_size: align_up(128 + n * 48, ACCELERATION_STRUCTURE_ALIGNMENT),
        update_scratch_data_size: 0,
    }
}

bitflags! {
    /// Per-instance behavior overrides, stored in the top byte of the
    /// contribution word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InstanceFlags: u32 {
        const TRIANGLE_CULL_DISABLE = 0x1;
        const TRIANGLE_FRONT_COUNTERCLOCKWISE = 0x2;
        const FORCE_OPAQUE = 0x4;
        const FORCE_NON_OPAQUE = 0x8;
    }
}

fn pack_low24_high8(low: u32, high: u32) -> u32 {
    (low & 0x00FF_FFFF) | (high << 24)
}

/// Flatten a matrix into the row-major 3x4 form instance descriptors
/// store. The bottom row is dropped.
pub fn transform_3x4(matrix: &Mat4) -> [f32; 12] {
    let mut out = [0.0; 12];
    for i in 0..3 {
        out[i * 4..i * 4 + 4].copy_from_slice(&matrix.row(i).to_array());
    }
    out
}

/// One instance in a top-level build, in the native layout: a 3x4
/// transform, packed id and mask words, and the bottom-level structure's
/// GPU virtual address.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceDesc {
    pub transform: [f32; 12],
    /// Instance id in the low 24 bits, visibility mask in the high 8.
    pub instance_id_and_mask: u32,
    /// Hit group table contribution in the low 24 bits, [`InstanceFlags`]
    /// in the high 8.
    pub instance_contribution_and_flags: u32,
    pub acceleration_structure: u64,
}

impl InstanceDesc {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Instance visible to every ray mask, id zero, no overrides.
    pub fn new(transform: &Mat4, acceleration_structure: GpuVa) -> Self {
        Self {
            transform: transform_3x4(transform),
            instance_id_and_mask: pack_low24_high8(0, 0xFF),
            instance_contribution_and_flags: 0,
            acceleration_structure: acceleration_structure.0,
        }
    }

    pub fn with_instance_id(mut self, id: u32) -> Self {
        self.instance_id_and_mask = pack_low24_high8(id, self.instance_id_and_mask >> 24);
        self
    }

    pub fn with_mask(mut self, mask: u8) -> Self {
        self.instance_id_and_mask = pack_low24_high8(self.instance_id_and_mask, u32::from(mask));
        self
    }

    pub fn with_contribution(mut self, contribution: u32) -> Self {
        self.instance_contribution_and_flags =
            pack_low24_high8(contribution, self.instance_contribution_and_flags >> 24);
        self
    }

    pub fn with_flags(mut self, flags: InstanceFlags) -> Self {
        self.instance_contribution_and_flags =
            pack_low24_high8(self.instance_contribution_and_flags, flags.bits());
        self
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id_and_mask & 0x00FF_FFFF
    }

    pub fn mask(&self) -> u8 {
        (self.instance_id_and_mask >> 24) as u8
    }

    pub fn contribution(&self) -> u32 {
        self.instance_contribution_and_flags & 0x00FF_FFFF
    }

    pub fn flags(&self) -> InstanceFlags {
        InstanceFlags::from_bits_truncate(self.instance_contribution_and_flags >> 24)
    }
}

/// [`InstanceDesc`] for the emulated path: identical layout, but the
/// structure field holds a packed [`WrappedGpuPointer`] so the uber shader
/// can resolve it through the descriptor heap.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FallbackInstanceDesc {
    pub transform: [f32; 12],
    pub instance_id_and_mask: u32,
    pub instance_contribution_and_flags: u32,
    pub acceleration_structure: u64,
}

impl FallbackInstanceDesc {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(transform: &Mat4, acceleration_structure: WrappedGpuPointer) -> Self {
        Self {
            transform: transform_3x4(transform),
            instance_id_and_mask: pack_low24_high8(0, 0xFF),
            instance_contribution_and_flags: 0,
            acceleration_structure: u64::from_le_bytes(acceleration_structure.pack()),
        }
    }

    pub fn with_instance_id(mut self, id: u32) -> Self {
        self.instance_id_and_mask = pack_low24_high8(id, self.instance_id_and_mask >> 24);
        self
    }

    pub fn with_mask(mut self, mask: u8) -> Self {
        self.instance_id_and_mask = pack_low24_high8(self.instance_id_and_mask, u32::from(mask));
        self
    }

    pub fn with_contribution(mut self, contribution: u32) -> Self {
        self.instance_contribution_and_flags =
            pack_low24_high8(contribution, self.instance_contribution_and_flags >> 24);
        self
    }

    pub fn with_flags(mut self, flags: InstanceFlags) -> Self {
        self.instance_contribution_and_flags =
            pack_low24_high8(self.instance_contribution_and_flags, flags.bits());
        self
    }
}
