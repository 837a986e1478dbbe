//! Device creation and the resource registry.
//!
//! `Device` models the adapter surface the fallback layer is written
//! against: a GPU virtual address space, buffers (upload buffers carry CPU
//! backing), descriptor heaps with owned allocation counters, root
//! signatures, and compute pipelines. Registries live behind one mutex, so
//! the device can be shared by reference while recording stays
//! single-threaded.

use crate::capabilities::DeviceCapabilities;
use crate::descriptor::{DescriptorHeap, DescriptorHeapDesc, DescriptorHeapKind, DescriptorView};
use crate::error::{GpuError, Result};
use crate::pipeline::ComputePipeline;
use crate::raytracing::{AccelerationStructureLevel, BuildSizes};
use crate::resource::{Buffer, BufferDesc, GpuVa, MemoryLocation};
use crate::root_signature::{RootSignature, RootSignatureDesc};
use hashbrown::HashMap;
use parking_lot::{Mutex, MutexGuard};
use rayfall_core::align::align_up;
use rayfall_core::constants::{ACCELERATION_STRUCTURE_ALIGNMENT, BUFFER_ALLOCATION_ALIGNMENT};

struct BufferRecord {
    name: String,
    size: u64,
    location: MemoryLocation,
    va: GpuVa,
    /// CPU backing for upload and readback buffers.
    data: Option<Vec<u8>>,
}

struct HeapRecord {
    kind: DescriptorHeapKind,
    capacity: u32,
    next_index: u32,
    views: HashMap<u32, DescriptorView>,
}

struct RootSignatureRecord {
    desc: RootSignatureDesc,
}

struct PipelineRecord {
    name: String,
    bytecode: Vec<u8>,
    root_signature: u32,
}

struct DeviceState {
    next_va: u64,
    buffers: Vec<BufferRecord>,
    va_lookup: HashMap<GpuVa, u32>,
    heaps: Vec<HeapRecord>,
    root_signatures: Vec<RootSignatureRecord>,
    pipelines: Vec<PipelineRecord>,
    lost: bool,
}

impl DeviceState {
    fn new() -> Self {
        Self {
            // Keep the zero page unmapped so GpuVa::NULL never resolves.
            next_va: BUFFER_ALLOCATION_ALIGNMENT,
            buffers: Vec::new(),
            va_lookup: HashMap::new(),
            heaps: Vec::new(),
            root_signatures: Vec::new(),
            pipelines: Vec::new(),
            lost: false,
        }
    }
}

/// The modeled adapter surface.
pub struct Device {
    debug_name: String,
    capabilities: DeviceCapabilities,
    state: Mutex<DeviceState>,
}

impl Device {
    /// Get adapter capabilities.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Whether the device has been marked lost.
    pub fn is_lost(&self) -> bool {
        self.state.lock().lost
    }

    /// Simulate adapter removal. Every subsequent creation, build, and
    /// dispatch against this device fails with [`GpuError::DeviceLost`];
    /// recovery is full teardown and recreation.
    pub fn mark_lost(&self) {
        tracing::warn!("{}: device marked lost", self.debug_name);
        self.state.lock().lost = true;
    }

    fn lock_alive(&self) -> Result<MutexGuard<'_, DeviceState>> {
        let state = self.state.lock();
        if state.lost {
            return Err(GpuError::DeviceLost);
        }
        Ok(state)
    }

    /// Create a buffer and assign it a GPU virtual address.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn create_buffer(&self, desc: &BufferDesc) -> Result<Buffer> {
        if desc.size == 0 {
            return Err(GpuError::Configuration(format!(
                "buffer '{}' must have nonzero size",
                desc.name
            )));
        }

        let mut state = self.lock_alive()?;
        let id = state.buffers.len() as u32;
        let va = GpuVa(state.next_va);
        state.next_va += align_up(desc.size, BUFFER_ALLOCATION_ALIGNMENT);

        let data = match desc.location {
            MemoryLocation::GpuOnly => None,
            MemoryLocation::CpuToGpu | MemoryLocation::GpuToCpu => {
                Some(vec![0u8; desc.size as usize])
            }
        };

        state.buffers.push(BufferRecord {
            name: desc.name.clone(),
            size: desc.size,
            location: desc.location,
            va,
            data,
        });
        state.va_lookup.insert(va, id);

        tracing::trace!(name = %desc.name, size = desc.size, ?va, "created buffer");
        Ok(Buffer {
            id,
            va,
            size: desc.size,
            location: desc.location,
        })
    }

    /// Write bytes into a CPU-accessible buffer.
    pub fn write_buffer(&self, buffer: &Buffer, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut state = self.lock_alive()?;
        let record = state
            .buffers
            .get_mut(buffer.id as usize)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("buffer #{}", buffer.id)))?;

        let end = offset + bytes.len() as u64;
        if end > record.size {
            return Err(GpuError::InvalidState(format!(
                "write of {} bytes at offset {} exceeds '{}' ({} bytes)",
                bytes.len(),
                offset,
                record.name,
                record.size
            )));
        }
        let Some(data) = record.data.as_mut() else {
            return Err(GpuError::InvalidState(format!(
                "buffer '{}' is not CPU accessible",
                record.name
            )));
        };
        data[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }

    /// Read back the full contents of a CPU-accessible buffer.
    pub fn read_buffer(&self, buffer: &Buffer) -> Result<Vec<u8>> {
        let state = self.lock_alive()?;
        let record = state
            .buffers
            .get(buffer.id as usize)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("buffer #{}", buffer.id)))?;
        record.data.clone().ok_or_else(|| {
            GpuError::InvalidState(format!("buffer '{}' is not CPU accessible", record.name))
        })
    }

    /// Look up a buffer by its base GPU virtual address.
    pub fn buffer_at(&self, va: GpuVa) -> Result<Buffer> {
        let state = self.lock_alive()?;
        let id = *state
            .va_lookup
            .get(&va)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("no buffer at {va:?}")))?;
        let record = &state.buffers[id as usize];
        Ok(Buffer {
            id,
            va: record.va,
            size: record.size,
            location: record.location,
        })
    }

    /// Look up a buffer by registry id.
    pub fn buffer_by_id(&self, id: u32) -> Result<Buffer> {
        let state = self.lock_alive()?;
        let record = state
            .buffers
            .get(id as usize)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("buffer #{id}")))?;
        Ok(Buffer {
            id,
            va: record.va,
            size: record.size,
            location: record.location,
        })
    }

    /// Create a descriptor heap.
    pub fn create_descriptor_heap(&self, desc: &DescriptorHeapDesc) -> Result<DescriptorHeap> {
        if desc.capacity == 0 {
            return Err(GpuError::Configuration(
                "descriptor heap capacity must be nonzero".to_string(),
            ));
        }
        if desc.shader_visible && desc.capacity > self.capabilities.max_shader_visible_descriptors {
            return Err(GpuError::Configuration(format!(
                "shader-visible heap of {} descriptors exceeds the adapter limit of {}",
                desc.capacity, self.capabilities.max_shader_visible_descriptors
            )));
        }

        let mut state = self.lock_alive()?;
        let id = state.heaps.len() as u32;
        state.heaps.push(HeapRecord {
            kind: desc.kind,
            capacity: desc.capacity,
            next_index: 0,
            views: HashMap::new(),
        });

        tracing::debug!(id, ?desc.kind, capacity = desc.capacity, "created descriptor heap");
        Ok(DescriptorHeap {
            id,
            kind: desc.kind,
            capacity: desc.capacity,
        })
    }

    /// Allocate a descriptor slot.
    ///
    /// With `reuse` set, the caller keeps using a slot it already owns and
    /// the counter does not move. Fresh allocations hand out increasing
    /// indices and fail once the heap is full.
    pub fn allocate_descriptor(&self, heap: &DescriptorHeap, reuse: Option<u32>) -> Result<u32> {
        let mut state = self.lock_alive()?;
        let record = state
            .heaps
            .get_mut(heap.id as usize)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("descriptor heap #{}", heap.id)))?;

        if let Some(index) = reuse {
            if index >= record.capacity {
                return Err(GpuError::Configuration(format!(
                    "descriptor index {} out of range for heap of {}",
                    index, record.capacity
                )));
            }
            return Ok(index);
        }

        if record.next_index >= record.capacity {
            return Err(GpuError::DescriptorHeapExhausted {
                capacity: record.capacity,
            });
        }
        let index = record.next_index;
        record.next_index += 1;
        Ok(index)
    }

    /// Write a raw-buffer UAV view into a descriptor slot.
    pub fn create_raw_buffer_uav(
        &self,
        heap: &DescriptorHeap,
        index: u32,
        buffer: &Buffer,
        num_elements: u32,
    ) -> Result<()> {
        let mut state = self.lock_alive()?;
        if state.buffers.get(buffer.id as usize).is_none() {
            return Err(GpuError::ResourceNotFound(format!("buffer #{}", buffer.id)));
        }
        let record = state
            .heaps
            .get_mut(heap.id as usize)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("descriptor heap #{}", heap.id)))?;
        if record.kind != DescriptorHeapKind::CbvSrvUav {
            return Err(GpuError::Configuration(
                "UAV views require a CBV/SRV/UAV heap".to_string(),
            ));
        }
        if index >= record.capacity {
            return Err(GpuError::Configuration(format!(
                "descriptor index {} out of range for heap of {}",
                index, record.capacity
            )));
        }

        record.views.insert(
            index,
            DescriptorView::RawBufferUav {
                buffer: buffer.id,
                num_elements,
            },
        );
        tracing::trace!(heap = heap.id, index, buffer = buffer.id, "wrote raw buffer UAV");
        Ok(())
    }

    /// Read back the view written at a descriptor slot.
    pub fn descriptor_at(&self, heap: &DescriptorHeap, index: u32) -> Result<DescriptorView> {
        let state = self.lock_alive()?;
        let record = state
            .heaps
            .get(heap.id as usize)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("descriptor heap #{}", heap.id)))?;
        record.views.get(&index).copied().ok_or_else(|| {
            GpuError::ResourceNotFound(format!("no view at heap #{} slot {}", heap.id, index))
        })
    }

    /// Create a root signature from a retained layout.
    pub fn create_root_signature(&self, desc: &RootSignatureDesc) -> Result<RootSignature> {
        if !desc.fits_budget() {
            return Err(GpuError::Configuration(format!(
                "root signature costs {} DWORDs, budget is {}",
                desc.dword_cost(),
                rayfall_core::constants::ROOT_SIGNATURE_DWORD_BUDGET
            )));
        }

        let mut state = self.lock_alive()?;
        let id = state.root_signatures.len() as u32;
        let parameter_count = desc.parameters.len() as u32;
        state
            .root_signatures
            .push(RootSignatureRecord { desc: desc.clone() });

        tracing::debug!(id, parameters = parameter_count, "created root signature");
        Ok(RootSignature {
            id,
            parameter_count,
        })
    }

    /// Retained layout of a created root signature.
    pub fn root_signature_desc(&self, root_signature: &RootSignature) -> Result<RootSignatureDesc> {
        let state = self.lock_alive()?;
        state
            .root_signatures
            .get(root_signature.id as usize)
            .map(|record| record.desc.clone())
            .ok_or_else(|| {
                GpuError::ResourceNotFound(format!("root signature #{}", root_signature.id))
            })
    }

    /// Create a compute pipeline from shader bytecode.
    pub fn create_compute_pipeline(
        &self,
        name: &str,
        bytecode: &[u8],
        root_signature: &RootSignature,
    ) -> Result<ComputePipeline> {
        if bytecode.is_empty() {
            return Err(GpuError::Configuration(format!(
                "compute pipeline '{name}' has empty bytecode"
            )));
        }

        let mut state = self.lock_alive()?;
        if state
            .root_signatures
            .get(root_signature.id as usize)
            .is_none()
        {
            return Err(GpuError::ResourceNotFound(format!(
                "root signature #{}",
                root_signature.id
            )));
        }
        let id = state.pipelines.len() as u32;
        state.pipelines.push(PipelineRecord {
            name: name.to_string(),
            bytecode: bytecode.to_vec(),
            root_signature: root_signature.id,
        });

        tracing::debug!(name, bytes = bytecode.len(), "created compute pipeline");
        Ok(ComputePipeline { id })
    }

    /// Bytecode backing a compute pipeline.
    pub fn pipeline_bytecode(&self, pipeline: &ComputePipeline) -> Result<Vec<u8>> {
        let state = self.lock_alive()?;
        state
            .pipelines
            .get(pipeline.id as usize)
            .map(|record| record.bytecode.clone())
            .ok_or_else(|| GpuError::ResourceNotFound(format!("pipeline #{}", pipeline.id)))
    }

    /// Root signature a compute pipeline was created against.
    pub fn pipeline_root_signature(&self, pipeline: &ComputePipeline) -> Result<u32> {
        let state = self.lock_alive()?;
        state
            .pipelines
            .get(pipeline.id as usize)
            .map(|record| record.root_signature)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("pipeline #{}", pipeline.id)))
    }

    /// Acceleration structure sizes as the native driver reports them.
    ///
    /// Only meaningful on adapters with a ray tracing driver; the software
    /// path computes its own sizes and never calls this.
    pub fn native_build_sizes(
        &self,
        level: AccelerationStructureLevel,
        element_count: u32,
    ) -> Result<BuildSizes> {
        if !self.capabilities.supports_raytracing_driver {
            return Err(GpuError::InvalidState(
                "adapter has no native ray tracing driver".to_string(),
            ));
        }
        let _state = self.lock_alive()?;

        let n = u64::from(element_count);
        let (structure, scratch, update) = match level {
            AccelerationStructureLevel::BottomLevel => (512 + n * 128, 256 + n * 64, n * 32),
            AccelerationStructureLevel::TopLevel => (256 + n * 64, 256 + n * 32, n * 16),
        };
        Ok(BuildSizes {
            acceleration_structure_size: align_up(structure, ACCELERATION_STRUCTURE_ALIGNMENT),
            build_scratch_size: align_up(scratch, ACCELERATION_STRUCTURE_ALIGNMENT),
            update_scratch_size: align_up(update, ACCELERATION_STRUCTURE_ALIGNMENT),
        })
    }
}

/// Builder for creating a device.
pub struct DeviceBuilder {
    debug_name: String,
    capabilities: DeviceCapabilities,
}

impl Default for DeviceBuilder {
    fn default() -> Self {
        Self {
            debug_name: "rayfall".to_string(),
            capabilities: DeviceCapabilities::reference(),
        }
    }
}

impl DeviceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug name used in logs.
    pub fn debug_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = name.into();
        self
    }

    /// Set the adapter capabilities to model.
    pub fn capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Build the device.
    pub fn build(self) -> Result<Device> {
        if !self.capabilities.meets_requirements() {
            return Err(GpuError::NoSuitableAdapter);
        }

        tracing::info!("Selected adapter: {}", self.capabilities.summary());

        Ok(Device {
            debug_name: self.debug_name,
            capabilities: self.capabilities,
            state: Mutex::new(DeviceState::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        DeviceBuilder::new().build().unwrap()
    }

    #[test]
    fn buffer_addresses_unique_and_aligned() {
        let device = device();
        let a = device
            .create_buffer(&BufferDesc::new("a", 100, MemoryLocation::GpuOnly))
            .unwrap();
        let b = device
            .create_buffer(&BufferDesc::new("b", 100, MemoryLocation::GpuOnly))
            .unwrap();

        assert_ne!(a.gpu_va(), b.gpu_va());
        assert!(!a.gpu_va().is_null());
        assert_eq!(a.gpu_va().0 % BUFFER_ALLOCATION_ALIGNMENT, 0);
        assert_eq!(b.gpu_va().0 % BUFFER_ALLOCATION_ALIGNMENT, 0);
    }

    #[test]
    fn upload_write_read_roundtrip() {
        let device = device();
        let buffer = device
            .create_buffer(&BufferDesc::new("upload", 16, MemoryLocation::CpuToGpu))
            .unwrap();

        device.write_buffer(&buffer, 4, &[1, 2, 3, 4]).unwrap();
        let data = device.read_buffer(&buffer).unwrap();
        assert_eq!(&data[4..8], &[1, 2, 3, 4]);
        assert_eq!(&data[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn gpu_only_buffers_reject_cpu_access() {
        let device = device();
        let buffer = device
            .create_buffer(&BufferDesc::new("local", 16, MemoryLocation::GpuOnly))
            .unwrap();

        assert!(matches!(
            device.write_buffer(&buffer, 0, &[0]),
            Err(GpuError::InvalidState(_))
        ));
        assert!(matches!(
            device.read_buffer(&buffer),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn out_of_bounds_write_rejected() {
        let device = device();
        let buffer = device
            .create_buffer(&BufferDesc::new("small", 8, MemoryLocation::CpuToGpu))
            .unwrap();
        assert!(device.write_buffer(&buffer, 6, &[0, 0, 0]).is_err());
    }

    #[test]
    fn buffer_lookup_by_address() {
        let device = device();
        let buffer = device
            .create_buffer(&BufferDesc::new("x", 64, MemoryLocation::GpuOnly))
            .unwrap();

        let found = device.buffer_at(buffer.gpu_va()).unwrap();
        assert_eq!(found, buffer);

        assert!(matches!(
            device.buffer_at(GpuVa(0xDEAD_0000)),
            Err(GpuError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn descriptor_allocation_counts_up() {
        let device = device();
        let heap = device
            .create_descriptor_heap(&DescriptorHeapDesc::shader_visible(4))
            .unwrap();

        for expected in 0..4 {
            assert_eq!(device.allocate_descriptor(&heap, None).unwrap(), expected);
        }
        assert!(matches!(
            device.allocate_descriptor(&heap, None),
            Err(GpuError::DescriptorHeapExhausted { capacity: 4 })
        ));
    }

    #[test]
    fn descriptor_reuse_leaves_counter_alone() {
        let device = device();
        let heap = device
            .create_descriptor_heap(&DescriptorHeapDesc::shader_visible(4))
            .unwrap();

        assert_eq!(device.allocate_descriptor(&heap, None).unwrap(), 0);
        assert_eq!(device.allocate_descriptor(&heap, Some(0)).unwrap(), 0);
        assert_eq!(device.allocate_descriptor(&heap, None).unwrap(), 1);
        assert!(device.allocate_descriptor(&heap, Some(9)).is_err());
    }

    #[test]
    fn raw_uav_view_roundtrip() {
        let device = device();
        let heap = device
            .create_descriptor_heap(&DescriptorHeapDesc::shader_visible(8))
            .unwrap();
        let buffer = device
            .create_buffer(&BufferDesc::new("as", 256, MemoryLocation::GpuOnly))
            .unwrap();

        let index = device.allocate_descriptor(&heap, None).unwrap();
        device
            .create_raw_buffer_uav(&heap, index, &buffer, 64)
            .unwrap();

        assert_eq!(
            device.descriptor_at(&heap, index).unwrap(),
            DescriptorView::RawBufferUav {
                buffer: buffer.id(),
                num_elements: 64
            }
        );
        assert!(device.descriptor_at(&heap, index + 1).is_err());
    }

    #[test]
    fn root_signature_budget_enforced() {
        use crate::root_signature::RootParameter;

        let device = device();
        let mut desc = RootSignatureDesc::new();
        for register in 0..33 {
            desc = desc.with_parameter(RootParameter::ShaderResourceView {
                register,
                register_space: 0,
            });
        }
        assert!(matches!(
            device.create_root_signature(&desc),
            Err(GpuError::Configuration(_))
        ));
    }

    #[test]
    fn compute_pipeline_requires_bytecode() {
        let device = device();
        let rs = device
            .create_root_signature(&RootSignatureDesc::new())
            .unwrap();
        assert!(device.create_compute_pipeline("empty", &[], &rs).is_err());

        let pipeline = device
            .create_compute_pipeline("ok", &[1, 2, 3], &rs)
            .unwrap();
        assert_eq!(device.pipeline_bytecode(&pipeline).unwrap(), vec![1, 2, 3]);
        assert_eq!(device.pipeline_root_signature(&pipeline).unwrap(), rs.id());
    }

    #[test]
    fn lost_device_rejects_work() {
        let device = device();
        let buffer = device
            .create_buffer(&BufferDesc::new("pre", 16, MemoryLocation::CpuToGpu))
            .unwrap();

        device.mark_lost();
        assert!(device.is_lost());
        assert!(matches!(
            device.create_buffer(&BufferDesc::new("post", 16, MemoryLocation::CpuToGpu)),
            Err(GpuError::DeviceLost)
        ));
        assert!(matches!(
            device.read_buffer(&buffer),
            Err(GpuError::DeviceLost)
        ));
    }

    #[test]
    fn native_build_sizes_require_driver() {
        let device = device();
        assert!(matches!(
            device.native_build_sizes(AccelerationStructureLevel::BottomLevel, 4),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn native_build_sizes_monotonic_and_aligned() {
        let device = DeviceBuilder::new()
            .capabilities(DeviceCapabilities::with_raytracing_driver())
            .build()
            .unwrap();

        let small = device
            .native_build_sizes(AccelerationStructureLevel::BottomLevel, 4)
            .unwrap();
        let large = device
            .native_build_sizes(AccelerationStructureLevel::BottomLevel, 64)
            .unwrap();

        assert!(large.acceleration_structure_size > small.acceleration_structure_size);
        assert!(large.build_scratch_size > small.build_scratch_size);
        assert_eq!(small.acceleration_structure_size % 256, 0);
        assert_eq!(small.build_scratch_size % 256, 0);
    }
}
