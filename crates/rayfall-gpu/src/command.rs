//! Command recording.
//!
//! The layer never executes GPU work; it records typed commands into a
//! [`CommandSink`]. A backend translates the stream for a real queue;
//! [`CommandList`] is the retained first-party sink used for deferred
//! submission and for asserting on recorded streams in tests.

use crate::descriptor::{DescriptorHandle, DescriptorHeap};
use crate::pipeline::ComputePipeline;
use crate::raytracing::AccelerationStructureLevel;
use crate::resource::GpuVa;
use crate::root_signature::RootSignature;

/// A shader table region: one record, stride implied by size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub start: GpuVa,
    pub size: u64,
}

impl Region {
    pub const fn new(start: GpuVa, size: u64) -> Self {
        Self { start, size }
    }
}

/// A strided shader table region holding multiple records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StridedRegion {
    pub start: GpuVa,
    pub size: u64,
    pub stride: u64,
}

impl StridedRegion {
    pub const fn new(start: GpuVa, size: u64, stride: u64) -> Self {
        Self {
            start,
            size,
            stride,
        }
    }

    /// Number of whole records the region holds.
    pub const fn record_count(&self) -> u64 {
        if self.stride == 0 {
            0
        } else {
            self.size / self.stride
        }
    }
}

/// One recorded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetDescriptorHeaps {
        heaps: Vec<u32>,
    },
    SetComputeRootSignature {
        root_signature: u32,
    },
    SetComputeRootDescriptorTable {
        parameter: u32,
        base: DescriptorHandle,
    },
    SetComputeRootConstants {
        parameter: u32,
        values: Vec<u32>,
    },
    SetComputeRootConstantBufferView {
        parameter: u32,
        address: GpuVa,
    },
    SetComputeRootShaderResourceView {
        parameter: u32,
        address: GpuVa,
    },
    SetComputeRootUnorderedAccessView {
        parameter: u32,
        address: GpuVa,
    },
    SetComputePipeline {
        pipeline: u32,
    },
    Dispatch {
        groups_x: u32,
        groups_y: u32,
        groups_z: u32,
    },
    /// Trace rays through the native driver.
    DispatchRaysNative {
        ray_generation: Region,
        miss: StridedRegion,
        hit_group: StridedRegion,
        width: u32,
        height: u32,
        depth: u32,
    },
    BuildAccelerationStructure {
        level: AccelerationStructureLevel,
        destination: GpuVa,
        scratch: GpuVa,
        element_count: u32,
    },
    UavBarrier {
        address: GpuVa,
    },
}

/// Recording surface the layer writes commands into.
///
/// The layer is a consumer of this primitive, never its executor. All
/// methods append; nothing here synchronizes or flushes.
pub trait CommandSink {
    fn set_descriptor_heaps(&mut self, heaps: &[DescriptorHeap]);
    fn set_compute_root_signature(&mut self, root_signature: &RootSignature);
    fn set_compute_root_descriptor_table(&mut self, parameter: u32, base: DescriptorHandle);
    fn set_compute_root_constants(&mut self, parameter: u32, values: &[u32]);
    fn set_compute_root_constant_buffer_view(&mut self, parameter: u32, address: GpuVa);
    fn set_compute_root_shader_resource_view(&mut self, parameter: u32, address: GpuVa);
    fn set_compute_root_unordered_access_view(&mut self, parameter: u32, address: GpuVa);
    fn set_compute_pipeline(&mut self, pipeline: &ComputePipeline);
    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32);
    #[allow(clippy::too_many_arguments)]
    fn dispatch_rays_native(
        &mut self,
        ray_generation: Region,
        miss: StridedRegion,
        hit_group: StridedRegion,
        width: u32,
        height: u32,
        depth: u32,
    );
    fn build_acceleration_structure(
        &mut self,
        level: AccelerationStructureLevel,
        destination: GpuVa,
        scratch: GpuVa,
        element_count: u32,
    );
    fn uav_barrier(&mut self, address: GpuVa);
}

/// Retained command list.
#[derive(Debug, Default)]
pub struct CommandList {
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded stream, in recording order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Discard everything recorded so far.
    pub fn reset(&mut self) {
        self.commands.clear();
    }
}

impl CommandSink for CommandList {
    fn set_descriptor_heaps(&mut self, heaps: &[DescriptorHeap]) {
        self.commands.push(Command::SetDescriptorHeaps {
            heaps: heaps.iter().map(DescriptorHeap::id).collect(),
        });
    }

    fn set_compute_root_signature(&mut self, root_signature: &RootSignature) {
        self.commands.push(Command::SetComputeRootSignature {
            root_signature: root_signature.id(),
        });
    }

    fn set_compute_root_descriptor_table(&mut self, parameter: u32, base: DescriptorHandle) {
        self.commands
            .push(Command::SetComputeRootDescriptorTable { parameter, base });
    }

    fn set_compute_root_constants(&mut self, parameter: u32, values: &[u32]) {
        self.commands.push(Command::SetComputeRootConstants {
            parameter,
            values: values.to_vec(),
        });
    }

    fn set_compute_root_constant_buffer_view(&mut self, parameter: u32, address: GpuVa) {
        self.commands
            .push(Command::SetComputeRootConstantBufferView { parameter, address });
    }

    fn set_compute_root_shader_resource_view(&mut self, parameter: u32, address: GpuVa) {
        self.commands
            .push(Command::SetComputeRootShaderResourceView { parameter, address });
    }

    fn set_compute_root_unordered_access_view(&mut self, parameter: u32, address: GpuVa) {
        self.commands
            .push(Command::SetComputeRootUnorderedAccessView { parameter, address });
    }

    fn set_compute_pipeline(&mut self, pipeline: &ComputePipeline) {
        self.commands.push(Command::SetComputePipeline {
            pipeline: pipeline.id(),
        });
    }

    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        self.commands.push(Command::Dispatch {
            groups_x,
            groups_y,
            groups_z,
        });
    }

    fn dispatch_rays_native(
        &mut self,
        ray_generation: Region,
        miss: StridedRegion,
        hit_group: StridedRegion,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        self.commands.push(Command::DispatchRaysNative {
            ray_generation,
            miss,
            hit_group,
            width,
            height,
            depth,
        });
    }

    fn build_acceleration_structure(
        &mut self,
        level: AccelerationStructureLevel,
        destination: GpuVa,
        scratch: GpuVa,
        element_count: u32,
    ) {
        self.commands.push(Command::BuildAccelerationStructure {
            level,
            destination,
            scratch,
            element_count,
        });
    }

    fn uav_barrier(&mut self, address: GpuVa) {
        self.commands.push(Command::UavBarrier { address });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut list = CommandList::new();
        list.dispatch(4, 2, 1);
        list.uav_barrier(GpuVa(0x10000));
        list.dispatch(1, 1, 1);

        assert_eq!(list.len(), 3);
        assert_eq!(
            list.commands()[0],
            Command::Dispatch {
                groups_x: 4,
                groups_y: 2,
                groups_z: 1
            }
        );
        assert_eq!(
            list.commands()[1],
            Command::UavBarrier {
                address: GpuVa(0x10000)
            }
        );
    }

    #[test]
    fn reset_discards_stream() {
        let mut list = CommandList::new();
        list.dispatch(1, 1, 1);
        list.reset();
        assert!(list.is_empty());
    }

    #[test]
    fn strided_region_record_count() {
        let region = StridedRegion::new(GpuVa(0x20000), 96, 24);
        assert_eq!(region.record_count(), 4);
        assert_eq!(StridedRegion::default().record_count(), 0);
    }
}
