//! Buffer resources and the modeled GPU virtual address space.

/// A GPU virtual address.
///
/// Addresses are assigned by the device's allocator at 64 KiB granularity
/// and are unique per device. `NULL` never names a resource.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GpuVa(pub u64);

impl GpuVa {
    pub const NULL: Self = Self(0);

    /// Address `bytes` past this one.
    #[inline]
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for GpuVa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpuVa(0x{:012x})", self.0)
    }
}

/// Where a buffer's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Device-local memory, not CPU accessible.
    GpuOnly,
    /// Upload memory: CPU writes, GPU reads.
    CpuToGpu,
    /// Readback memory: GPU writes, CPU reads.
    GpuToCpu,
}

/// Describes a buffer to create.
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Debug name, reported in logs and lookup errors.
    pub name: String,
    pub size: u64,
    pub location: MemoryLocation,
}

impl BufferDesc {
    pub fn new(name: impl Into<String>, size: u64, location: MemoryLocation) -> Self {
        Self {
            name: name.into(),
            size,
            location,
        }
    }
}

/// Handle to a created buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffer {
    pub(crate) id: u32,
    pub(crate) va: GpuVa,
    pub(crate) size: u64,
    pub(crate) location: MemoryLocation,
}

impl Buffer {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The buffer's GPU virtual address.
    pub fn gpu_va(&self) -> GpuVa {
        self.va
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn location(&self) -> MemoryLocation {
        self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_address() {
        assert!(GpuVa::NULL.is_null());
        assert!(!GpuVa(0x10000).is_null());
    }

    #[test]
    fn address_offset() {
        let va = GpuVa(0x10000);
        assert_eq!(va.offset(0x40), GpuVa(0x10040));
    }

    #[test]
    fn debug_formatting_is_hex() {
        assert_eq!(format!("{:?}", GpuVa(0x10000)), "GpuVa(0x000000010000)");
    }
}
