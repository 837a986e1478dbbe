//! Wrapped pointers to top-level acceleration structures.
//!
//! On adapters with a native ray tracing driver an acceleration structure is
//! named by its GPU virtual address. The emulated path cannot dereference
//! raw addresses from a compute shader, so it names the structure by a
//! descriptor heap slot plus a byte offset instead. Both forms pack into the
//! same eight bytes when serialized into instance descriptors.

use rayfall_core::constants::DESCRIPTOR_INDEX_INVALID;
use rayfall_gpu::GpuVa;

/// Location of a top-level acceleration structure, in the form the active
/// execution path can consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrappedGpuPointer {
    /// Raw GPU virtual address, for the native driver.
    Hardware(GpuVa),
    /// Descriptor heap slot holding a raw-buffer UAV over the structure,
    /// plus a byte offset into that buffer.
    Emulated {
        descriptor_index: u32,
        offset_in_bytes: u32,
    },
}

impl WrappedGpuPointer {
    /// Descriptor heap slot backing an emulated pointer.
    ///
    /// Hardware pointers carry no descriptor and report
    /// [`DESCRIPTOR_INDEX_INVALID`].
    pub fn descriptor_index(&self) -> u32 {
        match self {
            Self::Hardware(_) => DESCRIPTOR_INDEX_INVALID,
            Self::Emulated {
                descriptor_index, ..
            } => *descriptor_index,
        }
    }

    /// GPU virtual address of a hardware pointer.
    pub fn gpu_va(&self) -> Option<GpuVa> {
        match self {
            Self::Hardware(va) => Some(*va),
            Self::Emulated { .. } => None,
        }
    }

    /// Serialize into the eight-byte form instance descriptors store.
    ///
    /// The emulated form packs the descriptor index into the low four bytes
    /// and the offset into the high four, so the shader reads the same
    /// 64-bit field on both paths.
    pub fn pack(&self) -> [u8; 8] {
        match self {
            Self::Hardware(va) => va.0.to_le_bytes(),
            Self::Emulated {
                descriptor_index,
                offset_in_bytes,
            } => {
                let mut bytes = [0u8; 8];
                bytes[..4].copy_from_slice(&descriptor_index.to_le_bytes());
                bytes[4..].copy_from_slice(&offset_in_bytes.to_le_bytes());
                bytes
            }
        }
    }
}
