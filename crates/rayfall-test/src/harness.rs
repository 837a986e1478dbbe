//! Ready-made scenarios for exercising the layer end to end.
//!
//! A [`Scenario`] owns a device, a compiled ray tracing pipeline, and
//! uploaded shader tables for a one-triangle demo scene. Tests record
//! into a retained command list and assert on the resulting stream.

use std::sync::Arc;

use glam::Mat4;
use rayfall_gpu::{
    Buffer, BufferDesc, Command, CommandSink, DescriptorHeap, DescriptorHeapDesc, DescriptorRange,
    DescriptorRangeKind, DeviceBuilder, DeviceCapabilities, GpuVa, MemoryLocation, RootParameter,
    RootSignature, RootSignatureDesc,
};
use rayfall_rt::{
    BuildFlags, BuildInputs, DispatchRaysDesc, FallbackCommandList, FallbackDevice,
    FallbackDeviceFlags, FallbackInstanceDesc, GeometryDesc, HitGroupDesc, PipelineConfig,
    RaytracingPipeline, RaytracingPipelineDesc, ShaderConfig, ShaderKind, ShaderLibrary,
    ShaderRecord, ShaderTable, WrappedGpuPointer,
};
use tracing_subscriber::EnvFilter;

use crate::{Result, ScenarioConfig};

/// Stand-in DXIL library carried by the demo pipeline.
const DEMO_LIBRARY: &[u8] = b"rayfall-test demo library";

/// Install a log subscriber for test runs. Safe to call from every test;
/// only the first call wins.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A fully provisioned demo setup: device, heap, pipeline, and uploaded
/// shader tables for one ray generation shader, two miss shaders, and
/// one triangle hit group.
pub struct Scenario {
    pub fallback: FallbackDevice,
    pub heap: DescriptorHeap,
    pub global_root_signature: RootSignature,
    pub pipeline: RaytracingPipeline,
    pub raygen_table: ShaderTable,
    pub miss_table: ShaderTable,
    pub hit_group_table: ShaderTable,
    pub raygen_buffer: Buffer,
    pub miss_buffer: Buffer,
    pub hit_group_buffer: Buffer,
}

impl Scenario {
    /// Scenario on the reference adapter, running the compute emulation.
    pub fn software(config: &ScenarioConfig) -> Result<Self> {
        Self::with_capabilities(DeviceCapabilities::reference(), config)
    }

    /// Scenario on an adapter with a native ray tracing driver.
    pub fn hardware(config: &ScenarioConfig) -> Result<Self> {
        Self::with_capabilities(DeviceCapabilities::with_raytracing_driver(), config)
    }

    /// Stand up the device and compile the demo pipeline.
    ///
    /// # Arguments
    ///
    /// * `capabilities` - Adapter to model; the group limit is overridden
    ///   from `config`
    /// * `config` - Heap capacity and path selection knobs
    pub fn with_capabilities(
        mut capabilities: DeviceCapabilities,
        config: &ScenarioConfig,
    ) -> Result<Self> {
        capabilities.max_dispatch_groups_per_dim = config.max_dispatch_groups_per_dim;

        let device = Arc::new(
            DeviceBuilder::new()
                .debug_name("rayfall-test")
                .capabilities(capabilities)
                .build()?,
        );

        let mut flags = FallbackDeviceFlags::empty();
        if config.force_compute {
            flags |= FallbackDeviceFlags::FORCE_COMPUTE_FALLBACK;
        }
        let fallback = FallbackDevice::new(Arc::clone(&device), flags);

        let heap_desc = DescriptorHeapDesc::shader_visible(config.descriptor_capacity);
        let heap = device.create_descriptor_heap(&heap_desc)?;
        let global_root_signature = device.create_root_signature(&demo_root_signature())?;
        let pipeline =
            fallback.create_raytracing_pipeline(&demo_pipeline_desc(global_root_signature))?;

        // Shader tables: sizes follow the compiled identifier size, so the
        // same setup code serves both execution paths.
        let identifier_size = pipeline.shader_identifier_size();

        let mut raygen_table = ShaderTable::new("scenario-raygen", identifier_size);
        raygen_table.push(ShaderRecord::new(
            pipeline.shader_identifier("primary_raygen")?,
        ))?;

        let mut miss_table = ShaderTable::new("scenario-miss", identifier_size);
        miss_table.push(ShaderRecord::new(pipeline.shader_identifier("sky_miss")?))?;
        miss_table.push(ShaderRecord::with_arguments(
            pipeline.shader_identifier("shadow_miss")?,
            bytemuck::bytes_of(&0.25f32),
        ))?;

        let mut hit_group_table = ShaderTable::new("scenario-hit", identifier_size);
        hit_group_table.push(ShaderRecord::with_arguments(
            pipeline.shader_identifier("opaque_group")?,
            bytemuck::bytes_of(&7u32),
        ))?;

        let raygen_buffer = raygen_table.upload(&device)?;
        let miss_buffer = miss_table.upload(&device)?;
        let hit_group_buffer = hit_group_table.upload(&device)?;

        tracing::debug!(
            identifier_size,
            miss_stride = miss_table.stride(),
            "scenario provisioned"
        );

        Ok(Self {
            fallback,
            heap,
            global_root_signature,
            pipeline,
            raygen_table,
            miss_table,
            hit_group_table,
            raygen_buffer,
            miss_buffer,
            hit_group_buffer,
        })
    }

    /// Dispatch description over the uploaded tables, one ray per pixel.
    pub fn dispatch_desc(&self, width: u32, height: u32) -> DispatchRaysDesc {
        DispatchRaysDesc {
            ray_generation_record: self.raygen_table.record_region(&self.raygen_buffer, 0),
            miss_table: self.miss_table.strided_region(&self.miss_buffer),
            hit_group_table: self.hit_group_table.strided_region(&self.hit_group_buffer),
            width,
            height,
            depth: 1,
        }
    }

    /// Build a one-triangle scene and return the wrapped pointer to its
    /// top-level structure. Records both builds into `sink` with a
    /// barrier between them.
    pub fn build_scene(&self, sink: &mut dyn CommandSink) -> Result<WrappedGpuPointer> {
        let device = self.fallback.device();

        let vertices: [f32; 9] = [0.0, 0.5, 0.0, -0.5, -0.5, 0.0, 0.5, -0.5, 0.0];
        let vertex_buffer = device.create_buffer(&BufferDesc::new(
            "scene-vertices",
            std::mem::size_of_val(&vertices) as u64,
            MemoryLocation::CpuToGpu,
        ))?;
        device.write_buffer(&vertex_buffer, 0, bytemuck::cast_slice(&vertices))?;

        let bottom_inputs = BuildInputs::BottomLevel {
            geometries: vec![GeometryDesc::Triangles {
                vertex_buffer: vertex_buffer.gpu_va(),
                vertex_count: 3,
                vertex_stride: 12,
                index_buffer: None,
                index_count: 0,
                transform: None,
            }],
            flags: BuildFlags::PREFER_FAST_TRACE,
        };
        let bottom_sizes = self.fallback.get_prebuild_info(&bottom_inputs)?;
        let bottom = device.create_buffer(&BufferDesc::new(
            "scene-blas",
            bottom_sizes.result_data_max_size,
            MemoryLocation::GpuOnly,
        ))?;
        let bottom_scratch = device.create_buffer(&BufferDesc::new(
            "scene-blas-scratch",
            bottom_sizes.scratch_data_size,
            MemoryLocation::GpuOnly,
        ))?;
        let bottom_pointer = self
            .fallback
            .create_wrapped_pointer(&self.heap, &bottom, (bottom.size() / 4) as u32)?;

        let instance = FallbackInstanceDesc::new(&Mat4::IDENTITY, bottom_pointer).with_mask(1);
        let instance_buffer = device.create_buffer(&BufferDesc::new(
            "scene-instances",
            std::mem::size_of::<FallbackInstanceDesc>() as u64,
            MemoryLocation::CpuToGpu,
        ))?;
        device.write_buffer(&instance_buffer, 0, bytemuck::bytes_of(&instance))?;

        let top_inputs = BuildInputs::TopLevel {
            instance_count: 1,
            instances: instance_buffer.gpu_va(),
            flags: BuildFlags::empty(),
        };
        let top_sizes = self.fallback.get_prebuild_info(&top_inputs)?;
        let top = device.create_buffer(&BufferDesc::new(
            "scene-tlas",
            top_sizes.result_data_max_size,
            MemoryLocation::GpuOnly,
        ))?;
        let top_scratch = device.create_buffer(&BufferDesc::new(
            "scene-tlas-scratch",
            top_sizes.scratch_data_size,
            MemoryLocation::GpuOnly,
        ))?;

        let mut list = self.fallback.create_command_list(sink);
        list.build_acceleration_structure(&bottom_inputs, bottom.gpu_va(), bottom_scratch.gpu_va());
        list.uav_barrier(bottom.gpu_va());
        list.build_acceleration_structure(&top_inputs, top.gpu_va(), top_scratch.gpu_va());
        drop(list);

        Ok(self
            .fallback
            .create_wrapped_pointer(&self.heap, &top, (top.size() / 4) as u32)?)
    }

    /// Record the heap, global signature, and the three demo bindings:
    /// output image table, scene acceleration structure, frame constants.
    pub fn bind_globals(
        &self,
        list: &mut FallbackCommandList<'_>,
        scene: WrappedGpuPointer,
        constants: GpuVa,
    ) {
        list.set_descriptor_heaps(&[self.heap]);
        list.set_compute_root_signature(&self.global_root_signature);
        list.set_compute_root_descriptor_table(0, self.heap.handle_at(0));
        list.set_top_level_acceleration_structure(1, scene);
        list.set_compute_root_constant_buffer_view(2, constants);
    }
}

/// Global root signature shared by the demo shaders: an output image
/// table, the scene acceleration structure, and a constant buffer.
fn demo_root_signature() -> RootSignatureDesc {
    RootSignatureDesc::new()
        .with_parameter(RootParameter::DescriptorTable(vec![DescriptorRange::new(
            DescriptorRangeKind::Uav,
            1,
            0,
        )]))
        .with_parameter(RootParameter::AccelerationStructure {
            register: 0,
            register_space: 0,
        })
        .with_parameter(RootParameter::ConstantBufferView {
            register: 0,
            register_space: 0,
        })
}

fn demo_pipeline_desc(global_root_signature: RootSignature) -> RaytracingPipelineDesc {
    let library = ShaderLibrary::new(DEMO_LIBRARY)
        .with_export("primary_raygen", ShaderKind::RayGeneration)
        .with_export("sky_miss", ShaderKind::Miss)
        .with_export("shadow_miss", ShaderKind::Miss)
        .with_export("opaque_hit", ShaderKind::ClosestHit);

    RaytracingPipelineDesc::new()
        .with_library(library)
        .with_hit_group(HitGroupDesc::triangles("opaque_group", "opaque_hit"))
        .with_shader_config(ShaderConfig {
            max_payload_size: 16,
            max_attribute_size: 8,
        })
        .with_global_root_signature(global_root_signature)
        .with_pipeline_config(PipelineConfig {
            max_recursion_depth: 1,
        })
}

/// Collect the group counts of every compute dispatch in a stream.
pub fn compute_dispatches(commands: &[Command]) -> Vec<(u32, u32, u32)> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::Dispatch {
                groups_x,
                groups_y,
                groups_z,
            } => Some((*groups_x, *groups_y, *groups_z)),
            _ => None,
        })
        .collect()
}

/// Count native dispatch records in a stream.
pub fn native_dispatches(commands: &[Command]) -> usize {
    commands
        .iter()
        .filter(|command| matches!(command, Command::DispatchRaysNative { .. }))
        .count()
}

/// Collect every root constant write against one parameter slot, in
/// recorded order.
pub fn root_constants_at(commands: &[Command], parameter: u32) -> Vec<Vec<u32>> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::SetComputeRootConstants { parameter: slot, values } if *slot == parameter => {
                Some(values.clone())
            }
            _ => None,
        })
        .collect()
}
