//! Shader tables.
//!
//! A shader table is an array of records, each an identifier blob followed
//! by local root argument bytes. Records share one stride: the identifier
//! size plus the largest argument payload in the table, with shorter
//! payloads zero padded. Tables are built on the CPU and uploaded as plain
//! buffers; nothing about their memory is path specific.

use crate::error::{Result, RtError};
use crate::identifier::ShaderIdentifier;
use rayfall_core::align::is_aligned;
use rayfall_core::constants::SHADER_TABLE_ALIGNMENT;
use rayfall_gpu::{Buffer, BufferDesc, Device, MemoryLocation, Region, StridedRegion};

/// One shader record: an identifier plus local root arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderRecord {
    pub identifier: ShaderIdentifier,
    pub local_arguments: Vec<u8>,
}

impl ShaderRecord {
    /// Record with no local root arguments.
    pub fn new(identifier: ShaderIdentifier) -> Self {
        Self {
            identifier,
            local_arguments: Vec::new(),
        }
    }

    pub fn with_arguments(identifier: ShaderIdentifier, arguments: &[u8]) -> Self {
        Self {
            identifier,
            local_arguments: arguments.to_vec(),
        }
    }
}

/// Builder for a uniformly strided shader table.
#[derive(Debug, Clone)]
pub struct ShaderTable {
    name: String,
    identifier_size: usize,
    records: Vec<ShaderRecord>,
}

impl ShaderTable {
    /// Start an empty table. `identifier_size` must match the pipeline the
    /// records' identifiers came from.
    pub fn new(name: impl Into<String>, identifier_size: usize) -> Self {
        Self {
            name: name.into(),
            identifier_size,
            records: Vec::new(),
        }
    }

    /// Append a record. Fails when the identifier was produced for a
    /// different identifier size than this table's.
    pub fn push(&mut self, record: ShaderRecord) -> Result<()> {
        if record.identifier.size() != self.identifier_size {
            return Err(RtError::RecordIdentifierSize {
                expected: self.identifier_size,
                got: record.identifier.size(),
            });
        }
        self.records.push(record);
        Ok(())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bytes between consecutive records: the identifier size plus the
    /// largest argument payload, exactly.
    pub fn stride(&self) -> usize {
        let largest_arguments = self
            .records
            .iter()
            .map(|record| record.local_arguments.len())
            .max()
            .unwrap_or(0);
        self.identifier_size + largest_arguments
    }

    /// Total table size: record count times stride.
    pub fn size(&self) -> usize {
        self.records.len() * self.stride()
    }

    /// Serialize the table. Record `i` starts at byte `i * stride`; each
    /// record is the identifier, then its arguments, then zero padding.
    pub fn serialize(&self) -> Vec<u8> {
        let stride = self.stride();
        let mut bytes = vec![0u8; self.size()];
        for (i, record) in self.records.iter().enumerate() {
            let start = i * stride;
            let identifier = record.identifier.as_bytes();
            bytes[start..start + identifier.len()].copy_from_slice(identifier);
            let args_start = start + self.identifier_size;
            bytes[args_start..args_start + record.local_arguments.len()]
                .copy_from_slice(&record.local_arguments);
        }
        bytes
    }

    /// Upload the serialized table into a fresh CPU-writable buffer.
    ///
    /// Device buffers start at 64 KiB boundaries, well past the table
    /// alignment requirement.
    pub fn upload(&self, device: &Device) -> Result<Buffer> {
        let bytes = self.serialize();
        let buffer = device.create_buffer(&BufferDesc::new(
            self.name.clone(),
            bytes.len() as u64,
            MemoryLocation::CpuToGpu,
        ))?;
        debug_assert!(is_aligned(buffer.gpu_va().0, SHADER_TABLE_ALIGNMENT));
        device.write_buffer(&buffer, 0, &bytes)?;
        tracing::trace!(
            name = %self.name,
            records = self.records.len(),
            stride = self.stride(),
            "uploaded shader table"
        );
        Ok(buffer)
    }

    /// Region covering the whole table in an uploaded buffer.
    pub fn region(&self, buffer: &Buffer) -> Region {
        Region::new(buffer.gpu_va(), self.size() as u64)
    }

    /// Region covering a single record, for the ray generation slot.
    pub fn record_region(&self, buffer: &Buffer, index: usize) -> Region {
        let stride = self.stride() as u64;
        Region::new(buffer.gpu_va().offset(index as u64 * stride), stride)
    }

    /// Strided region covering the whole table, for the miss and hit group
    /// slots.
    pub fn strided_region(&self, buffer: &Buffer) -> StridedRegion {
        StridedRegion::new(buffer.gpu_va(), self.size() as u64, self.stride() as u64)
    }
}

/// Split serialized table bytes back into `(identifier, payload)` pairs.
/// Payloads come back padded to the table stride.
pub fn records_from_bytes(
    bytes: &[u8],
    identifier_size: usize,
    stride: usize,
) -> Vec<(ShaderIdentifier, Vec<u8>)> {
    bytes
        .chunks_exact(stride)
        .map(|chunk| {
            (
                ShaderIdentifier::from_bytes(&chunk[..identifier_size]),
                chunk[identifier_size..].to_vec(),
            )
        })
        .collect()
}
