//! Uber shader synthesis and root signature patching.
//!
//! The software path runs every pipeline as one compute program: a blob
//! that carries a dispatch table of all entry points plus the original
//! library bytecode. Shader identifiers select entries by state id at
//! dispatch time. The caller's root signature is extended in place with the
//! internal bindings that program needs, all placed in a reserved register
//! space so they never collide with application bindings.

use crate::identifier::DispatchableKind;
use bytemuck::{Pod, Zeroable};
use rayfall_core::constants::{
    DISPATCH_GROUP_HEIGHT, DISPATCH_GROUP_WIDTH, INTERNAL_REGISTER_SPACE,
};
use rayfall_gpu::{
    DescriptorRange, DescriptorRangeKind, RootParameter, RootSignatureDesc,
    DESCRIPTOR_RANGE_UNBOUNDED,
};

/// Blob tag identifying a synthesized uber shader.
pub const UBER_SHADER_MAGIC: u32 = u32::from_le_bytes(*b"RFUB");
/// Layout version of the blob.
pub const UBER_SHADER_VERSION: u32 = 1;

/// Fixed header at the front of an uber shader blob.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct UberShaderHeader {
    pub magic: u32,
    pub version: u32,
    pub group_width: u32,
    pub group_height: u32,
    pub entry_count: u32,
    pub name_table_len: u32,
    pub library_len: u32,
    /// Low word of the library hash, for cross-checking against identifiers.
    pub library_hash: u32,
}

impl UberShaderHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// One dispatch table entry following the header.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct UberEntryRecord {
    pub state_id: u32,
    pub kind: u32,
    pub name_offset: u32,
    pub name_len: u32,
}

impl UberEntryRecord {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// A dispatchable entry point to bake into an uber shader.
#[derive(Debug, Clone)]
pub struct UberEntry {
    pub name: String,
    pub state_id: u32,
    pub kind: DispatchableKind,
}

/// 64-bit FNV-1a over a byte slice.
pub(crate) fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Assemble the uber shader blob: header, dispatch table sorted by state
/// id, name table, then the library bytecode.
pub fn assemble_uber_shader(entries: &[UberEntry], library: &[u8]) -> Vec<u8> {
    let mut ordered: Vec<&UberEntry> = entries.iter().collect();
    ordered.sort_by_key(|entry| entry.state_id);

    let mut names = Vec::new();
    let mut records = Vec::with_capacity(ordered.len());
    for entry in &ordered {
        records.push(UberEntryRecord {
            state_id: entry.state_id,
            kind: entry.kind as u32,
            name_offset: names.len() as u32,
            name_len: entry.name.len() as u32,
        });
        names.extend_from_slice(entry.name.as_bytes());
    }

    let header = UberShaderHeader {
        magic: UBER_SHADER_MAGIC,
        version: UBER_SHADER_VERSION,
        group_width: DISPATCH_GROUP_WIDTH,
        group_height: DISPATCH_GROUP_HEIGHT,
        entry_count: records.len() as u32,
        name_table_len: names.len() as u32,
        library_len: library.len() as u32,
        library_hash: fnv1a64(library) as u32,
    };

    let capacity = UberShaderHeader::SIZE
        + records.len() * UberEntryRecord::SIZE
        + names.len()
        + library.len();
    let mut blob = Vec::with_capacity(capacity);
    blob.extend_from_slice(bytemuck::bytes_of(&header));
    for record in &records {
        blob.extend_from_slice(bytemuck::bytes_of(record));
    }
    blob.extend_from_slice(&names);
    blob.extend_from_slice(library);
    blob
}

/// Parse an uber shader blob back into its header and entries. Returns
/// `None` when the blob is too short or does not carry the magic tag.
pub fn parse_uber_shader(bytes: &[u8]) -> Option<(UberShaderHeader, Vec<UberEntry>)> {
    if bytes.len() < UberShaderHeader::SIZE {
        return None;
    }
    let header: UberShaderHeader = bytemuck::pod_read_unaligned(&bytes[..UberShaderHeader::SIZE]);
    if header.magic != UBER_SHADER_MAGIC || header.version != UBER_SHADER_VERSION {
        return None;
    }

    let table_len = header.entry_count as usize * UberEntryRecord::SIZE;
    let names_start = UberShaderHeader::SIZE + table_len;
    let names_end = names_start + header.name_table_len as usize;
    if bytes.len() < names_end + header.library_len as usize {
        return None;
    }
    let names = &bytes[names_start..names_end];

    let mut entries = Vec::with_capacity(header.entry_count as usize);
    for i in 0..header.entry_count as usize {
        let start = UberShaderHeader::SIZE + i * UberEntryRecord::SIZE;
        let record: UberEntryRecord =
            bytemuck::pod_read_unaligned(&bytes[start..start + UberEntryRecord::SIZE]);
        let name_start = record.name_offset as usize;
        let name_end = name_start + record.name_len as usize;
        if name_end > names.len() {
            return None;
        }
        let kind = match record.kind {
            0 => DispatchableKind::RayGeneration,
            1 => DispatchableKind::Miss,
            2 => DispatchableKind::HitGroup,
            _ => return None,
        };
        entries.push(UberEntry {
            name: String::from_utf8_lossy(&names[name_start..name_end]).into_owned(),
            state_id: record.state_id,
            kind,
        });
    }
    Some((header, entries))
}

/// Root constants the dispatch loop rebinds for every internal sub-dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchConstants {
    /// Full grid extents, in rays.
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// First ray of the current tile, in rays from the grid origin.
    pub tile_origin_x: u32,
    pub tile_origin_y: u32,
    /// Record strides of the bound miss and hit group tables.
    pub miss_stride: u32,
    pub hit_group_stride: u32,
    pub _padding: u32,
}

impl DispatchConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();
    pub const DWORDS: u32 = (Self::SIZE / 4) as u32;

    /// The constants as the words a root constant binding takes.
    pub fn as_root_constants(&self) -> [u32; 8] {
        bytemuck::cast(*self)
    }
}

/// Parameters appended to the caller's root signature, in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchedParam {
    DispatchConstants = 0,
    RayGenerationTable = 1,
    MissTable = 2,
    HitGroupTable = 3,
    DescriptorHeap = 4,
}

impl PatchedParam {
    /// Root parameter slot of this internal binding.
    pub fn slot(self, patch_parameter_start: u32) -> u32 {
        patch_parameter_start + self as u32
    }
}

/// Number of parameters [`patch_root_signature`] appends.
pub const PATCHED_PARAMETER_COUNT: u32 = 5;

/// Extend a caller root signature with the internal bindings the uber
/// shader needs, and rewrite acceleration structure parameters into the
/// two-word emulated pointer form.
///
/// Returns the patched layout and the slot index where the appended block
/// starts. Existing parameters keep their slots, so application bindings
/// replay unchanged.
pub(crate) fn patch_root_signature(caller: &RootSignatureDesc) -> (RootSignatureDesc, u32) {
    let patch_parameter_start = caller.parameters.len() as u32;
    let mut parameters =
        Vec::with_capacity(caller.parameters.len() + PATCHED_PARAMETER_COUNT as usize);

    for parameter in &caller.parameters {
        match parameter {
            RootParameter::AccelerationStructure { register, .. } => {
                // Descriptor heap index and byte offset, read by the uber
                // shader in place of the raw address.
                parameters.push(RootParameter::Constants {
                    register: *register,
                    register_space: INTERNAL_REGISTER_SPACE,
                    count: 2,
                });
            }
            other => parameters.push(other.clone()),
        }
    }

    parameters.push(RootParameter::Constants {
        register: 0,
        register_space: INTERNAL_REGISTER_SPACE,
        count: DispatchConstants::DWORDS,
    });
    parameters.push(RootParameter::ShaderResourceView {
        register: 0,
        register_space: INTERNAL_REGISTER_SPACE,
    });
    parameters.push(RootParameter::ShaderResourceView {
        register: 1,
        register_space: INTERNAL_REGISTER_SPACE,
    });
    parameters.push(RootParameter::ShaderResourceView {
        register: 2,
        register_space: INTERNAL_REGISTER_SPACE,
    });
    parameters.push(RootParameter::DescriptorTable(vec![DescriptorRange::new(
        DescriptorRangeKind::Uav,
        DESCRIPTOR_RANGE_UNBOUNDED,
        0,
    )
    .in_space(INTERNAL_REGISTER_SPACE)]));

    (RootSignatureDesc { parameters }, patch_parameter_start)
}
