//! Ray dispatch recording.
//!
//! `FallbackCommandList` wraps a command sink and shadows every compute
//! root binding the application records. On the software path a ray
//! dispatch must switch to the pipeline's patched root signature, and that
//! switch drops all bindings on the real API, so the shadow copy is
//! replayed slot by slot under the new signature before the internal
//! bindings and tiled dispatches are recorded.

use crate::accel::BuildInputs;
use crate::device::{ExecutionPath, FallbackDevice};
use crate::error::Result;
use crate::pipeline::{PathArtifacts, RaytracingPipeline};
use crate::program::{DispatchConstants, PatchedParam};
use crate::wrapped::WrappedGpuPointer;
use rayfall_core::constants::{DISPATCH_GROUP_HEIGHT, DISPATCH_GROUP_WIDTH};
use rayfall_gpu::{
    CommandSink, ComputePipeline, DescriptorHandle, DescriptorHeap, DescriptorHeapKind, GpuError,
    GpuVa, Region, RootSignature, StridedRegion,
};

/// Shader table locations and grid extents for one ray dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRaysDesc {
    /// The single ray generation record to run.
    pub ray_generation_record: Region,
    pub miss_table: StridedRegion,
    pub hit_group_table: StridedRegion,
    /// Grid extents, in rays.
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Observer invoked around the internal sub-dispatches of an emulated ray
/// dispatch.
pub trait PredispatchHook {
    /// Called exactly once per internal sub-dispatch, after all state for
    /// that sub-dispatch is recorded and immediately before its dispatch.
    /// `dispatch_index` counts sub-dispatches within one ray dispatch,
    /// starting at zero.
    fn before_dispatch(&mut self, sink: &mut dyn CommandSink, dispatch_index: u32);
}

impl<F: FnMut(&mut dyn CommandSink, u32)> PredispatchHook for F {
    fn before_dispatch(&mut self, sink: &mut dyn CommandSink, dispatch_index: u32) {
        self(sink, dispatch_index);
    }
}

/// Where a command list stands relative to its last ray dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    /// No ray dispatch recorded yet.
    Idle,
    Dispatching,
    /// The last ray dispatch recorded fully.
    Complete,
}

#[derive(Debug, Clone)]
enum RootBinding {
    DescriptorTable(DescriptorHandle),
    Constants(Vec<u32>),
    ConstantBufferView(GpuVa),
    ShaderResourceView(GpuVa),
    UnorderedAccessView(GpuVa),
    AccelerationStructure(WrappedGpuPointer),
}

/// Command recording surface for ray tracing work.
///
/// Bindings recorded here are forwarded to the sink and shadowed; setting
/// a root signature invalidates the shadow, matching what the switch does
/// to real bindings.
pub struct FallbackCommandList<'a> {
    device: &'a FallbackDevice,
    sink: &'a mut dyn CommandSink,
    bound_heap: Option<DescriptorHeap>,
    root_signature: Option<RootSignature>,
    bindings: Vec<Option<RootBinding>>,
    hook: Option<Box<dyn PredispatchHook + 'a>>,
    phase: DispatchPhase,
}

impl<'a> FallbackCommandList<'a> {
    pub(crate) fn new(device: &'a FallbackDevice, sink: &'a mut dyn CommandSink) -> Self {
        Self {
            device,
            sink,
            bound_heap: None,
            root_signature: None,
            bindings: Vec::new(),
            hook: None,
            phase: DispatchPhase::Idle,
        }
    }

    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    pub fn set_descriptor_heaps(&mut self, heaps: &[DescriptorHeap]) {
        self.bound_heap = heaps
            .iter()
            .find(|heap| heap.kind() == DescriptorHeapKind::CbvSrvUav)
            .copied();
        self.sink.set_descriptor_heaps(heaps);
    }

    /// Bind a compute root signature. Drops every shadowed binding, as the
    /// switch does on the real API.
    pub fn set_compute_root_signature(&mut self, root_signature: &RootSignature) {
        self.root_signature = Some(*root_signature);
        self.bindings.clear();
        self.bindings
            .resize(root_signature.parameter_count() as usize, None);
        self.sink.set_compute_root_signature(root_signature);
    }

    fn store(&mut self, parameter: u32, binding: RootBinding) {
        debug_assert!(
            (parameter as usize) < self.bindings.len(),
            "root parameter {parameter} out of range for the bound signature"
        );
        if let Some(slot) = self.bindings.get_mut(parameter as usize) {
            *slot = Some(binding);
        }
    }

    pub fn set_compute_root_descriptor_table(&mut self, parameter: u32, base: DescriptorHandle) {
        self.store(parameter, RootBinding::DescriptorTable(base));
        self.sink.set_compute_root_descriptor_table(parameter, base);
    }

    pub fn set_compute_root_constants(&mut self, parameter: u32, values: &[u32]) {
        self.store(parameter, RootBinding::Constants(values.to_vec()));
        self.sink.set_compute_root_constants(parameter, values);
    }

    pub fn set_compute_root_constant_buffer_view(&mut self, parameter: u32, address: GpuVa) {
        self.store(parameter, RootBinding::ConstantBufferView(address));
        self.sink
            .set_compute_root_constant_buffer_view(parameter, address);
    }

    pub fn set_compute_root_shader_resource_view(&mut self, parameter: u32, address: GpuVa) {
        self.store(parameter, RootBinding::ShaderResourceView(address));
        self.sink
            .set_compute_root_shader_resource_view(parameter, address);
    }

    pub fn set_compute_root_unordered_access_view(&mut self, parameter: u32, address: GpuVa) {
        self.store(parameter, RootBinding::UnorderedAccessView(address));
        self.sink
            .set_compute_root_unordered_access_view(parameter, address);
    }

    /// Bind a top-level acceleration structure at a root parameter.
    ///
    /// On the hardware path a raw pointer binds immediately as a root
    /// shader resource view. On the software path the binding is only
    /// shadowed; the next ray dispatch lowers it to the two-word emulated
    /// pointer constant under the patched signature.
    pub fn set_top_level_acceleration_structure(
        &mut self,
        parameter: u32,
        pointer: WrappedGpuPointer,
    ) {
        match (self.device.path(), pointer) {
            (ExecutionPath::Hardware, WrappedGpuPointer::Hardware(va)) => {
                self.sink.set_compute_root_shader_resource_view(parameter, va);
            }
            (ExecutionPath::Hardware, WrappedGpuPointer::Emulated { .. }) => {
                tracing::warn!(
                    parameter,
                    "emulated pointer bound on the hardware path, dispatch will not see it"
                );
            }
            (ExecutionPath::SoftwareEmulated, _) => {}
        }
        self.store(parameter, RootBinding::AccelerationStructure(pointer));
    }

    /// Install an observer for the internal sub-dispatches of emulated ray
    /// dispatches. Hardware dispatches never invoke it.
    pub fn set_predispatch_hook(&mut self, hook: impl PredispatchHook + 'a) {
        self.hook = Some(Box::new(hook));
    }

    pub fn clear_predispatch_hook(&mut self) {
        self.hook = None;
    }

    /// Record an acceleration structure build.
    pub fn build_acceleration_structure(
        &mut self,
        inputs: &BuildInputs,
        destination: GpuVa,
        scratch: GpuVa,
    ) {
        self.sink.build_acceleration_structure(
            inputs.level(),
            destination,
            scratch,
            inputs.primitive_count(),
        );
    }

    /// Record a barrier on unordered access to an address, for ordering a
    /// bottom-level build before the top-level build that references it.
    pub fn uav_barrier(&mut self, address: GpuVa) {
        self.sink.uav_barrier(address);
    }

    /// Record a ray dispatch.
    ///
    /// A zero-extent grid records nothing and still completes. The
    /// hardware path records one native dispatch; the software path
    /// records the patched signature, the replayed bindings, the internal
    /// bindings, and one compute dispatch per tile of the group grid.
    pub fn dispatch_rays(
        &mut self,
        pipeline: &RaytracingPipeline,
        desc: &DispatchRaysDesc,
    ) -> Result<()> {
        if self.device.device().is_lost() {
            return Err(GpuError::DeviceLost.into());
        }
        if pipeline.path() != self.device.path() {
            return Err(GpuError::InvalidState(
                "pipeline was compiled for the other execution path".to_string(),
            )
            .into());
        }

        self.phase = DispatchPhase::Dispatching;
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
            tracing::trace!("zero extent ray dispatch, nothing recorded");
            self.phase = DispatchPhase::Complete;
            return Ok(());
        }

        match &pipeline.artifacts {
            PathArtifacts::Hardware => {
                self.sink.dispatch_rays_native(
                    desc.ray_generation_record,
                    desc.miss_table,
                    desc.hit_group_table,
                    desc.width,
                    desc.height,
                    desc.depth,
                );
            }
            PathArtifacts::Software {
                patched_root_signature,
                uber_pipeline,
                patch_parameter_start,
            } => {
                self.dispatch_rays_software(
                    *patched_root_signature,
                    *uber_pipeline,
                    *patch_parameter_start,
                    desc,
                );
            }
        }
        self.phase = DispatchPhase::Complete;
        Ok(())
    }

    fn dispatch_rays_software(
        &mut self,
        patched_root_signature: RootSignature,
        uber_pipeline: ComputePipeline,
        patch_parameter_start: u32,
        desc: &DispatchRaysDesc,
    ) {
        debug_assert!(
            self.bound_heap.is_some(),
            "emulated ray dispatch needs a CBV/SRV/UAV heap bound"
        );

        // The signature switch invalidates the application's bindings, so
        // replay the shadow copy at the original slots. Slot indices stay
        // valid because patching only appends.
        self.sink.set_compute_root_signature(&patched_root_signature);
        for (slot, binding) in self.bindings.iter().enumerate() {
            let Some(binding) = binding else { continue };
            let parameter = slot as u32;
            match binding {
                RootBinding::DescriptorTable(base) => {
                    self.sink.set_compute_root_descriptor_table(parameter, *base);
                }
                RootBinding::Constants(values) => {
                    self.sink.set_compute_root_constants(parameter, values);
                }
                RootBinding::ConstantBufferView(address) => {
                    self.sink
                        .set_compute_root_constant_buffer_view(parameter, *address);
                }
                RootBinding::ShaderResourceView(address) => {
                    self.sink
                        .set_compute_root_shader_resource_view(parameter, *address);
                }
                RootBinding::UnorderedAccessView(address) => {
                    self.sink
                        .set_compute_root_unordered_access_view(parameter, *address);
                }
                RootBinding::AccelerationStructure(pointer) => match pointer {
                    WrappedGpuPointer::Emulated {
                        descriptor_index,
                        offset_in_bytes,
                    } => {
                        self.sink.set_compute_root_constants(
                            parameter,
                            &[*descriptor_index, *offset_in_bytes],
                        );
                    }
                    WrappedGpuPointer::Hardware(va) => {
                        tracing::warn!(
                            parameter,
                            "raw address pointer replayed on the software path"
                        );
                        self.sink.set_compute_root_shader_resource_view(parameter, *va);
                    }
                },
            }
        }

        self.sink.set_compute_root_shader_resource_view(
            PatchedParam::RayGenerationTable.slot(patch_parameter_start),
            desc.ray_generation_record.start,
        );
        self.sink.set_compute_root_shader_resource_view(
            PatchedParam::MissTable.slot(patch_parameter_start),
            desc.miss_table.start,
        );
        self.sink.set_compute_root_shader_resource_view(
            PatchedParam::HitGroupTable.slot(patch_parameter_start),
            desc.hit_group_table.start,
        );
        if let Some(heap) = self.bound_heap {
            self.sink.set_compute_root_descriptor_table(
                PatchedParam::DescriptorHeap.slot(patch_parameter_start),
                heap.handle_at(0),
            );
        }
        self.sink.set_compute_pipeline(&uber_pipeline);

        let groups_x = (desc.width + DISPATCH_GROUP_WIDTH - 1) / DISPATCH_GROUP_WIDTH;
        let groups_y = (desc.height + DISPATCH_GROUP_HEIGHT - 1) / DISPATCH_GROUP_HEIGHT;
        let max_per_dim = self.device.device().capabilities().max_dispatch_groups_per_dim;

        let mut dispatch_index = 0u32;
        let mut tile_y = 0u32;
        while tile_y < groups_y {
            let tile_groups_y = (groups_y - tile_y).min(max_per_dim);
            let mut tile_x = 0u32;
            while tile_x < groups_x {
                let tile_groups_x = (groups_x - tile_x).min(max_per_dim);

                let constants = DispatchConstants {
                    width: desc.width,
                    height: desc.height,
                    depth: desc.depth,
                    tile_origin_x: tile_x * DISPATCH_GROUP_WIDTH,
                    tile_origin_y: tile_y * DISPATCH_GROUP_HEIGHT,
                    miss_stride: desc.miss_table.stride as u32,
                    hit_group_stride: desc.hit_group_table.stride as u32,
                    _padding: 0,
                };
                self.sink.set_compute_root_constants(
                    PatchedParam::DispatchConstants.slot(patch_parameter_start),
                    &constants.as_root_constants(),
                );
                if let Some(hook) = self.hook.as_mut() {
                    hook.before_dispatch(&mut *self.sink, dispatch_index);
                }
                self.sink.dispatch(tile_groups_x, tile_groups_y, desc.depth);

                dispatch_index += 1;
                tile_x += tile_groups_x;
            }
            tile_y += tile_groups_y;
        }

        tracing::trace!(
            width = desc.width,
            height = desc.height,
            sub_dispatches = dispatch_index,
            "emulated ray dispatch"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{FallbackDevice, FallbackDeviceFlags};
    use crate::pipeline::{
        HitGroupDesc, PipelineConfig, RaytracingPipelineDesc, ShaderConfig, ShaderKind,
        ShaderLibrary,
    };
    use rayfall_gpu::{
        Command, CommandList, DescriptorHeapDesc, DeviceBuilder, DeviceCapabilities,
        RootParameter, RootSignatureDesc,
    };
    use std::sync::Arc;

    struct Fixture {
        fallback: FallbackDevice,
        heap: DescriptorHeap,
        caller_root_signature: RootSignature,
        pipeline: RaytracingPipeline,
    }

    fn fixture_with(capabilities: DeviceCapabilities) -> Fixture {
        let device = Arc::new(
            DeviceBuilder::new().capabilities(capabilities).build().unwrap(),
        );
        let fallback = FallbackDevice::new(device, FallbackDeviceFlags::empty());
        let heap = fallback
            .device()
            .create_descriptor_heap(&DescriptorHeapDesc::shader_visible(64))
            .unwrap();
        let caller_root_signature = fallback
            .device()
            .create_root_signature(
                &RootSignatureDesc::new()
                    .with_parameter(RootParameter::AccelerationStructure {
                        register: 0,
                        register_space: 0,
                    })
                    .with_parameter(RootParameter::ConstantBufferView {
                        register: 0,
                        register_space: 0,
                    }),
            )
            .unwrap();
        let pipeline = fallback
            .create_raytracing_pipeline(
                &RaytracingPipelineDesc::new()
                    .with_library(
                        ShaderLibrary::new(&[0xD1; 32])
                            .with_export("primary_raygen", ShaderKind::RayGeneration)
                            .with_export("sky_miss", ShaderKind::Miss)
                            .with_export("opaque_hit", ShaderKind::ClosestHit),
                    )
                    .with_hit_group(HitGroupDesc::triangles("opaque_group", "opaque_hit"))
                    .with_shader_config(ShaderConfig {
                        max_payload_size: 16,
                        max_attribute_size: 8,
                    })
                    .with_pipeline_config(PipelineConfig {
                        max_recursion_depth: 1,
                    })
                    .with_global_root_signature(caller_root_signature),
            )
            .unwrap();
        Fixture {
            fallback,
            heap,
            caller_root_signature,
            pipeline,
        }
    }

    fn software_fixture() -> Fixture {
        fixture_with(DeviceCapabilities::reference())
    }

    fn dispatch_desc(width: u32, height: u32) -> DispatchRaysDesc {
        DispatchRaysDesc {
            ray_generation_record: Region::new(GpuVa(0x0001_0000), 8),
            miss_table: StridedRegion::new(GpuVa(0x0002_0000), 16, 8),
            hit_group_table: StridedRegion::new(GpuVa(0x0003_0000), 24, 8),
            width,
            height,
            depth: 1,
        }
    }

    fn record_dispatch(fixture: &Fixture, desc: &DispatchRaysDesc) -> CommandList {
        let mut stream = CommandList::new();
        let mut list = fixture.fallback.create_command_list(&mut stream);
        list.set_descriptor_heaps(&[fixture.heap]);
        list.set_compute_root_signature(&fixture.caller_root_signature);
        list.set_top_level_acceleration_structure(
            0,
            WrappedGpuPointer::Emulated {
                descriptor_index: 5,
                offset_in_bytes: 0,
            },
        );
        list.set_compute_root_constant_buffer_view(1, GpuVa(0x0004_0000));
        list.dispatch_rays(&fixture.pipeline, desc).unwrap();
        assert_eq!(list.phase(), DispatchPhase::Complete);
        drop(list);
        stream
    }

    #[test]
    fn software_dispatch_replays_bindings_under_patched_signature() {
        let fixture = software_fixture();
        let stream = record_dispatch(&fixture, &dispatch_desc(16, 16));
        let commands = stream.commands();

        let patched = fixture.pipeline.patched_root_signature().unwrap();
        let switch = commands
            .iter()
            .position(|command| {
                *command
                    == Command::SetComputeRootSignature {
                        root_signature: patched.id(),
                    }
            })
            .unwrap();

        // Replay follows the switch in slot order: the emulated pointer as
        // two constants, then the caller's root CBV.
        assert_eq!(
            commands[switch + 1],
            Command::SetComputeRootConstants {
                parameter: 0,
                values: vec![5, 0],
            }
        );
        assert_eq!(
            commands[switch + 2],
            Command::SetComputeRootConstantBufferView {
                parameter: 1,
                address: GpuVa(0x0004_0000),
            }
        );

        // Internal block: table addresses at the appended slots, the heap
        // table, then the uber pipeline.
        assert_eq!(
            commands[switch + 3],
            Command::SetComputeRootShaderResourceView {
                parameter: 3,
                address: GpuVa(0x0001_0000),
            }
        );
        assert_eq!(
            commands[switch + 5],
            Command::SetComputeRootShaderResourceView {
                parameter: 5,
                address: GpuVa(0x0003_0000),
            }
        );
        assert_eq!(
            commands[switch + 6],
            Command::SetComputeRootDescriptorTable {
                parameter: 6,
                base: fixture.heap.handle_at(0),
            }
        );
        assert!(matches!(
            commands[switch + 7],
            Command::SetComputePipeline { .. }
        ));

        // 16x16 rays fit one 2x2 group tile.
        assert_eq!(
            commands.last().unwrap(),
            &Command::Dispatch {
                groups_x: 2,
                groups_y: 2,
                groups_z: 1,
            }
        );
        let dispatches = commands
            .iter()
            .filter(|command| matches!(command, Command::Dispatch { .. }))
            .count();
        assert_eq!(dispatches, 1);
    }

    #[test]
    fn tile_constants_carry_origins_and_strides() {
        let fixture = software_fixture();
        let stream = record_dispatch(&fixture, &dispatch_desc(20, 9));
        let constants: Vec<&Vec<u32>> = stream
            .commands()
            .iter()
            .filter_map(|command| match command {
                Command::SetComputeRootConstants {
                    parameter: 2,
                    values,
                } => Some(values),
                _ => None,
            })
            .collect();

        // One tile, so one dispatch constants record at the patch slot.
        assert_eq!(constants.len(), 1);
        let words = constants[0];
        assert_eq!(words.len(), 8);
        assert_eq!(words[0], 20);
        assert_eq!(words[1], 9);
        assert_eq!(words[3], 0);
        assert_eq!(words[4], 0);
        assert_eq!(words[5], 8);
        assert_eq!(words[6], 8);
    }

    #[test]
    fn wide_grids_tile_into_multiple_dispatches() {
        let mut capabilities = DeviceCapabilities::reference();
        capabilities.max_dispatch_groups_per_dim = 2;
        let fixture = fixture_with(capabilities);

        // 40x24 rays: 5x3 groups, tiled 2+2+1 by 2+1.
        let stream = record_dispatch(&fixture, &dispatch_desc(40, 24));
        let dispatches: Vec<(u32, u32)> = stream
            .commands()
            .iter()
            .filter_map(|command| match command {
                Command::Dispatch {
                    groups_x, groups_y, ..
                } => Some((*groups_x, *groups_y)),
                _ => None,
            })
            .collect();
        assert_eq!(
            dispatches,
            vec![(2, 2), (2, 2), (1, 2), (2, 1), (2, 1), (1, 1)]
        );

        // Per-tile constants carry the pixel origin of each tile.
        let origins: Vec<(u32, u32)> = stream
            .commands()
            .iter()
            .filter_map(|command| match command {
                Command::SetComputeRootConstants {
                    parameter: 2,
                    values,
                } => Some((values[3], values[4])),
                _ => None,
            })
            .collect();
        assert_eq!(
            origins,
            vec![(0, 0), (16, 0), (32, 0), (0, 16), (16, 16), (32, 16)]
        );
    }

    #[test]
    fn hook_fires_once_per_sub_dispatch_immediately_before_it() {
        let mut capabilities = DeviceCapabilities::reference();
        capabilities.max_dispatch_groups_per_dim = 2;
        let fixture = fixture_with(capabilities);

        let mut seen = Vec::new();
        let mut stream = CommandList::new();
        {
            let mut list = fixture.fallback.create_command_list(&mut stream);
            list.set_descriptor_heaps(&[fixture.heap]);
            list.set_compute_root_signature(&fixture.caller_root_signature);
            list.set_predispatch_hook(|sink: &mut dyn CommandSink, index: u32| {
                // Leave a marker so ordering is visible in the stream.
                sink.uav_barrier(GpuVa(u64::from(index)));
                seen.push(index);
            });
            list.dispatch_rays(&fixture.pipeline, &dispatch_desc(40, 24))
                .unwrap();
        }

        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);

        // Every marker is immediately followed by its dispatch.
        let commands = stream.commands();
        for (index, command) in commands.iter().enumerate() {
            if let Command::UavBarrier { .. } = command {
                assert!(matches!(commands[index + 1], Command::Dispatch { .. }));
            }
        }
    }

    #[test]
    fn zero_extent_dispatch_records_nothing() {
        let fixture = software_fixture();
        let mut calls = 0u32;
        let mut stream = CommandList::new();
        {
            let mut list = fixture.fallback.create_command_list(&mut stream);
            list.set_descriptor_heaps(&[fixture.heap]);
            list.set_compute_root_signature(&fixture.caller_root_signature);
            let recorded_before = 2;
            list.set_predispatch_hook(|_: &mut dyn CommandSink, _: u32| calls += 1);
            list.dispatch_rays(&fixture.pipeline, &dispatch_desc(0, 720))
                .unwrap();
            assert_eq!(list.phase(), DispatchPhase::Complete);
            drop(list);
            assert_eq!(stream.len(), recorded_before);
        }
        assert_eq!(calls, 0);
    }

    #[test]
    fn signature_switch_drops_stale_bindings() {
        let fixture = software_fixture();
        let other = fixture
            .fallback
            .device()
            .create_root_signature(&RootSignatureDesc::new().with_parameter(
                RootParameter::Constants {
                    register: 0,
                    register_space: 0,
                    count: 4,
                },
            ))
            .unwrap();

        let mut stream = CommandList::new();
        {
            let mut list = fixture.fallback.create_command_list(&mut stream);
            list.set_descriptor_heaps(&[fixture.heap]);
            list.set_compute_root_signature(&other);
            list.set_compute_root_constants(0, &[9, 9, 9, 9]);
            // Rebinding the signature invalidates the constants above.
            list.set_compute_root_signature(&fixture.caller_root_signature);
            list.dispatch_rays(&fixture.pipeline, &dispatch_desc(8, 8))
                .unwrap();
        }

        let patched = fixture.pipeline.patched_root_signature().unwrap();
        let switch = stream
            .commands()
            .iter()
            .position(|command| {
                *command
                    == Command::SetComputeRootSignature {
                        root_signature: patched.id(),
                    }
            })
            .unwrap();
        let replayed_stale = stream.commands()[switch..]
            .iter()
            .any(|command| {
                matches!(
                    command,
                    Command::SetComputeRootConstants { values, .. } if values == &vec![9, 9, 9, 9]
                )
            });
        assert!(!replayed_stale);
    }

    #[test]
    fn consecutive_dispatches_replay_each_time() {
        let fixture = software_fixture();
        let mut stream = CommandList::new();
        {
            let mut list = fixture.fallback.create_command_list(&mut stream);
            list.set_descriptor_heaps(&[fixture.heap]);
            list.set_compute_root_signature(&fixture.caller_root_signature);
            list.set_compute_root_constant_buffer_view(1, GpuVa(0x0004_0000));
            list.dispatch_rays(&fixture.pipeline, &dispatch_desc(8, 8))
                .unwrap();
            list.dispatch_rays(&fixture.pipeline, &dispatch_desc(8, 8))
                .unwrap();
        }

        let replays = stream
            .commands()
            .iter()
            .filter(|command| {
                matches!(
                    command,
                    Command::SetComputeRootConstantBufferView {
                        parameter: 1,
                        address: GpuVa(0x0004_0000),
                    }
                )
            })
            .count();
        // Once from the caller, once per dispatch replay.
        assert_eq!(replays, 3);
    }

    #[test]
    fn hardware_dispatch_is_one_native_record_and_skips_the_hook() {
        let fixture = fixture_with(DeviceCapabilities::with_raytracing_driver());
        let mut calls = 0u32;
        let mut stream = CommandList::new();
        {
            let mut list = fixture.fallback.create_command_list(&mut stream);
            list.set_descriptor_heaps(&[fixture.heap]);
            list.set_compute_root_signature(&fixture.caller_root_signature);
            list.set_top_level_acceleration_structure(
                0,
                WrappedGpuPointer::Hardware(GpuVa(0x0005_0000)),
            );
            list.set_predispatch_hook(|_: &mut dyn CommandSink, _: u32| calls += 1);
            list.dispatch_rays(&fixture.pipeline, &dispatch_desc(1920, 1080))
                .unwrap();
        }
        assert_eq!(calls, 0);

        let commands = stream.commands();
        // Raw pointer binds immediately as a root view.
        assert!(commands.contains(&Command::SetComputeRootShaderResourceView {
            parameter: 0,
            address: GpuVa(0x0005_0000),
        }));
        assert_eq!(
            commands.last().unwrap(),
            &Command::DispatchRaysNative {
                ray_generation: Region::new(GpuVa(0x0001_0000), 8),
                miss: StridedRegion::new(GpuVa(0x0002_0000), 16, 8),
                hit_group: StridedRegion::new(GpuVa(0x0003_0000), 24, 8),
                width: 1920,
                height: 1080,
                depth: 1,
            }
        );
        assert_eq!(
            commands
                .iter()
                .filter(|command| matches!(command, Command::DispatchRaysNative { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn lost_device_fails_dispatch() {
        let fixture = software_fixture();
        let mut stream = CommandList::new();
        let mut list = fixture.fallback.create_command_list(&mut stream);
        list.set_descriptor_heaps(&[fixture.heap]);
        list.set_compute_root_signature(&fixture.caller_root_signature);

        fixture.fallback.device().mark_lost();
        assert!(list
            .dispatch_rays(&fixture.pipeline, &dispatch_desc(8, 8))
            .is_err());
    }

    #[test]
    fn cross_path_pipeline_rejected() {
        let hardware = fixture_with(DeviceCapabilities::with_raytracing_driver());
        let software = software_fixture();

        let mut stream = CommandList::new();
        let mut list = software.fallback.create_command_list(&mut stream);
        list.set_descriptor_heaps(&[software.heap]);
        list.set_compute_root_signature(&software.caller_root_signature);
        assert!(list
            .dispatch_rays(&hardware.pipeline, &dispatch_desc(8, 8))
            .is_err());
    }
}
