//! Execution path selection and the fallback device.
//!
//! The fallback device wraps a [`Device`] and decides once, at creation,
//! whether ray dispatches go to the native driver or to the compute
//! emulation. Everything downstream asks the fallback device rather than
//! re-probing: identifier sizes, wrapped pointer forms, prebuild sizing,
//! and pipeline compilation all key off the chosen path.

use crate::accel::{software_prebuild_info, BuildInputs, PrebuildInfo};
use crate::dispatch::FallbackCommandList;
use crate::error::Result;
use crate::identifier::{
    DispatchableKind, IdentifierTable, ShaderIdentifier, SOFTWARE_SHADER_IDENTIFIER_SIZE,
};
use crate::pipeline::{PathArtifacts, RaytracingPipeline, RaytracingPipelineDesc};
use crate::program::{self, UberEntry};
use crate::wrapped::WrappedGpuPointer;
use bitflags::bitflags;
use rayfall_gpu::{Buffer, CommandSink, DescriptorHeap, DescriptorView, Device, GpuVa};
use std::sync::Arc;

/// How ray dispatches execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// Native ray tracing driver.
    Hardware,
    /// Compute shader emulation.
    SoftwareEmulated,
}

bitflags! {
    /// Creation options for a fallback device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FallbackDeviceFlags: u32 {
        /// Take the compute emulation even when the adapter has a native
        /// ray tracing driver.
        const FORCE_COMPUTE_FALLBACK = 0x1;
    }
}

/// Device facade that routes ray tracing work down one execution path.
pub struct FallbackDevice {
    device: Arc<Device>,
    path: ExecutionPath,
}

impl FallbackDevice {
    /// Wrap a device, picking the execution path from its capabilities and
    /// the given flags.
    pub fn new(device: Arc<Device>, flags: FallbackDeviceFlags) -> Self {
        let forced = flags.contains(FallbackDeviceFlags::FORCE_COMPUTE_FALLBACK);
        let path = if device.capabilities().supports_raytracing_driver && !forced {
            ExecutionPath::Hardware
        } else {
            ExecutionPath::SoftwareEmulated
        };
        tracing::info!(?path, forced, "created fallback device");
        Self { device, path }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn path(&self) -> ExecutionPath {
        self.path
    }

    /// Whether dispatches go to the native driver. Applications branch on
    /// this to know which wrapped pointer form and identifier size they
    /// will see.
    pub fn using_raytracing_driver(&self) -> bool {
        self.path == ExecutionPath::Hardware
    }

    /// Shader identifier size for pipelines compiled on this device.
    pub fn shader_identifier_size(&self) -> usize {
        match self.path {
            ExecutionPath::Hardware => {
                self.device.capabilities().native_shader_identifier_size as usize
            }
            ExecutionPath::SoftwareEmulated => SOFTWARE_SHADER_IDENTIFIER_SIZE,
        }
    }

    /// Wrap a buffer holding a top-level acceleration structure.
    ///
    /// On the software path this allocates a heap slot and writes a
    /// raw-buffer view over `num_elements` 32-bit words so the uber shader
    /// can reach the structure; on the hardware path the raw address is
    /// enough and the heap stays untouched.
    pub fn create_wrapped_pointer(
        &self,
        heap: &DescriptorHeap,
        buffer: &Buffer,
        num_elements: u32,
    ) -> Result<WrappedGpuPointer> {
        match self.path {
            ExecutionPath::Hardware => Ok(WrappedGpuPointer::Hardware(buffer.gpu_va())),
            ExecutionPath::SoftwareEmulated => {
                let descriptor_index = self.device.allocate_descriptor(heap, None)?;
                self.device
                    .create_raw_buffer_uav(heap, descriptor_index, buffer, num_elements)?;
                Ok(WrappedGpuPointer::Emulated {
                    descriptor_index,
                    offset_in_bytes: 0,
                })
            }
        }
    }

    /// Wrapped pointer from parts the application prepared itself.
    pub fn wrapped_pointer_simple(
        &self,
        descriptor_index: u32,
        address: GpuVa,
    ) -> WrappedGpuPointer {
        match self.path {
            ExecutionPath::Hardware => WrappedGpuPointer::Hardware(address),
            ExecutionPath::SoftwareEmulated => WrappedGpuPointer::Emulated {
                descriptor_index,
                offset_in_bytes: 0,
            },
        }
    }

    /// Buffer a wrapped pointer names. Emulated pointers resolve through
    /// the descriptor heap they were created against.
    pub fn resolve_wrapped_pointer(
        &self,
        heap: &DescriptorHeap,
        pointer: &WrappedGpuPointer,
    ) -> Result<Buffer> {
        match pointer {
            WrappedGpuPointer::Hardware(va) => Ok(self.device.buffer_at(*va)?),
            WrappedGpuPointer::Emulated {
                descriptor_index, ..
            } => {
                let DescriptorView::RawBufferUav { buffer, .. } =
                    self.device.descriptor_at(heap, *descriptor_index)?;
                Ok(self.device.buffer_by_id(buffer)?)
            }
        }
    }

    /// Sizes to allocate before requesting an acceleration structure
    /// build.
    pub fn get_prebuild_info(&self, inputs: &BuildInputs) -> Result<PrebuildInfo> {
        match self.path {
            ExecutionPath::SoftwareEmulated => Ok(software_prebuild_info(inputs)),
            ExecutionPath::Hardware => {
                let sizes = self
                    .device
                    .native_build_sizes(inputs.level(), inputs.primitive_count())?;
                Ok(PrebuildInfo {
                    result_data_max_size: sizes.acceleration_structure_size,
                    scratch_data_size: sizes.build_scratch_size,
                    update_scratch_data_size: sizes.update_scratch_size,
                })
            }
        }
    }

    /// Compile a ray tracing pipeline for this device's execution path.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn create_raytracing_pipeline(
        &self,
        desc: &RaytracingPipelineDesc,
    ) -> Result<RaytracingPipeline> {
        let resolved = desc.validate()?;
        let identifier_size = self.shader_identifier_size();
        let library_hash = program::fnv1a64(&resolved.library_bytes);

        // State ids follow the sorted dispatchable order, so equivalent
        // descriptions compile to identical identifiers.
        let mut identifiers = IdentifierTable::new(identifier_size);
        let mut entries = Vec::new();
        let mut state_id = 0u32;
        let groups = [
            (resolved.ray_generation.as_slice(), DispatchableKind::RayGeneration),
            (resolved.miss.as_slice(), DispatchableKind::Miss),
            (resolved.hit_groups.as_slice(), DispatchableKind::HitGroup),
        ];
        for (names, kind) in groups {
            for name in names {
                identifiers.insert(
                    name,
                    ShaderIdentifier::encode(state_id, kind, library_hash, identifier_size),
                );
                entries.push(UberEntry {
                    name: name.clone(),
                    state_id,
                    kind,
                });
                state_id += 1;
            }
        }

        let artifacts = match self.path {
            ExecutionPath::Hardware => PathArtifacts::Hardware,
            ExecutionPath::SoftwareEmulated => {
                let caller_desc = self
                    .device
                    .root_signature_desc(&resolved.global_root_signature)?;
                let (patched_desc, patch_parameter_start) =
                    program::patch_root_signature(&caller_desc);
                let patched_root_signature = self.device.create_root_signature(&patched_desc)?;
                let blob = program::assemble_uber_shader(&entries, &resolved.library_bytes);
                let uber_pipeline = self.device.create_compute_pipeline(
                    "raytracing_uber",
                    &blob,
                    &patched_root_signature,
                )?;
                PathArtifacts::Software {
                    patched_root_signature,
                    uber_pipeline,
                    patch_parameter_start,
                }
            }
        };

        tracing::debug!(
            entry_count = state_id,
            identifier_size,
            "compiled ray tracing pipeline"
        );
        Ok(RaytracingPipeline {
            artifacts,
            identifiers,
            global_root_signature: resolved.global_root_signature,
            shader_config: resolved.shader_config,
            pipeline_config: resolved.pipeline_config,
        })
    }

    /// Start recording ray tracing work into a command sink.
    pub fn create_command_list<'a>(
        &'a self,
        sink: &'a mut dyn CommandSink,
    ) -> FallbackCommandList<'a> {
        FallbackCommandList::new(self, sink)
    }
}
