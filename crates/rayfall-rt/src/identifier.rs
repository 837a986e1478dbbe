//! Opaque shader identifiers.
//!
//! Every dispatchable entry point of a compiled pipeline gets a fixed-size
//! identifier blob. Callers treat the bytes as opaque and copy them into
//! shader records; only the size is observable, and it depends on the
//! execution path the pipeline was compiled for.

use crate::error::{Result, RtError};
use hashbrown::HashMap;

/// Identifier size on the software path: a state id and a kind tag.
pub const SOFTWARE_SHADER_IDENTIFIER_SIZE: usize = 8;

/// Largest identifier any path produces.
pub const MAX_SHADER_IDENTIFIER_SIZE: usize = 32;

/// What a pipeline entry point is dispatched as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DispatchableKind {
    RayGeneration = 0,
    Miss = 1,
    HitGroup = 2,
}

/// An opaque identifier for one dispatchable entry point.
///
/// Identifiers from the same pipeline are distinct; identifiers from
/// different pipelines must not be mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderIdentifier {
    data: [u8; MAX_SHADER_IDENTIFIER_SIZE],
    size: u8,
}

impl ShaderIdentifier {
    /// Build an identifier from raw bytes, as read back out of a table.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= MAX_SHADER_IDENTIFIER_SIZE);
        let mut data = [0u8; MAX_SHADER_IDENTIFIER_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);
        Self {
            data,
            size: bytes.len() as u8,
        }
    }

    /// Encode the identifier for one entry point.
    ///
    /// The software form is the state id and kind in little-endian words.
    /// The wider hardware form adds a hash of the library bytecode so
    /// identifiers from different pipelines never collide.
    pub(crate) fn encode(
        state_id: u32,
        kind: DispatchableKind,
        library_hash: u64,
        size: usize,
    ) -> Self {
        debug_assert!(size >= SOFTWARE_SHADER_IDENTIFIER_SIZE);
        debug_assert!(size <= MAX_SHADER_IDENTIFIER_SIZE);
        let mut data = [0u8; MAX_SHADER_IDENTIFIER_SIZE];
        data[0..4].copy_from_slice(&state_id.to_le_bytes());
        data[4..8].copy_from_slice(&(kind as u32).to_le_bytes());
        if size >= 16 {
            data[8..16].copy_from_slice(&library_hash.to_le_bytes());
        }
        Self {
            data,
            size: size as u8,
        }
    }

    /// The identifier bytes. Length matches the pipeline's identifier size.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.size as usize]
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }
}

/// Identifier lookup for a compiled pipeline, keyed by export name.
#[derive(Debug, Clone)]
pub struct IdentifierTable {
    identifier_size: usize,
    entries: HashMap<String, ShaderIdentifier>,
}

impl IdentifierTable {
    pub(crate) fn new(identifier_size: usize) -> Self {
        Self {
            identifier_size,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: &str, identifier: ShaderIdentifier) {
        self.entries.insert(name.to_string(), identifier);
    }

    /// Identifier for a named export or hit group.
    pub fn get(&self, name: &str) -> Result<ShaderIdentifier> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| RtError::ExportNotFound(name.to_string()))
    }

    /// Size in bytes of every identifier in this table.
    pub fn identifier_size(&self) -> usize {
        self.identifier_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
