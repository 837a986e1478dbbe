//! Shader-visible descriptor heaps.
//!
//! A heap owns its allocation counter: slots are handed out in increasing
//! order, allocation past capacity is a hard error, and callers may reuse a
//! slot they already own by passing its index back in.

/// What a descriptor heap stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorHeapKind {
    /// Constant buffer, shader resource, and unordered access views.
    CbvSrvUav,
    Sampler,
}

/// Describes a descriptor heap to create.
#[derive(Debug, Clone)]
pub struct DescriptorHeapDesc {
    pub kind: DescriptorHeapKind,
    pub capacity: u32,
    /// Shader-visible heaps can back descriptor tables and the emulated
    /// pointer indirection; non-visible heaps are staging only.
    pub shader_visible: bool,
}

impl DescriptorHeapDesc {
    /// Shader-visible CBV/SRV/UAV heap, the common case.
    pub fn shader_visible(capacity: u32) -> Self {
        Self {
            kind: DescriptorHeapKind::CbvSrvUav,
            capacity,
            shader_visible: true,
        }
    }
}

/// Handle to a created descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeap {
    pub(crate) id: u32,
    pub(crate) kind: DescriptorHeapKind,
    pub(crate) capacity: u32,
}

impl DescriptorHeap {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Handle to one slot of this heap, for descriptor table binding.
    pub fn handle_at(&self, index: u32) -> DescriptorHandle {
        DescriptorHandle {
            heap: self.id,
            index,
        }
    }
}

/// A slot within a descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHandle {
    pub heap: u32,
    pub index: u32,
}

/// A view written into a descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorView {
    /// Raw (byte-address) buffer UAV over `num_elements` 32-bit words.
    RawBufferUav { buffer: u32, num_elements: u32 },
}
