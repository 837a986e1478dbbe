//! Ray tracing pipeline description and validation.
//!
//! A pipeline is described as a bag of subobjects: shader libraries with
//! named exports, hit groups grouping those exports, shader and pipeline
//! configs, and root signatures. Subobjects reference each other by export
//! name, with associations either explicit or defaulted, so the whole bag
//! is validated as one unit before compilation.

use crate::device::ExecutionPath;
use crate::error::{Result, RtError};
use crate::identifier::{IdentifierTable, ShaderIdentifier};
use hashbrown::HashMap;
use rayfall_core::constants::{MAX_ATTRIBUTE_SIZE, MAX_RAY_PAYLOAD_SIZE, MAX_TRACE_RECURSION_DEPTH};
use rayfall_gpu::{ComputePipeline, RootSignature};

/// What an exported shader entry point is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    RayGeneration,
    Miss,
    ClosestHit,
    AnyHit,
    Intersection,
}

/// One named entry point in a shader library.
#[derive(Debug, Clone)]
pub struct ShaderExport {
    pub name: String,
    pub kind: ShaderKind,
}

/// A compiled shader library and the entry points it exports.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    pub bytecode: Vec<u8>,
    pub exports: Vec<ShaderExport>,
}

impl ShaderLibrary {
    pub fn new(bytecode: &[u8]) -> Self {
        Self {
            bytecode: bytecode.to_vec(),
            exports: Vec::new(),
        }
    }

    pub fn with_export(mut self, name: impl Into<String>, kind: ShaderKind) -> Self {
        self.exports.push(ShaderExport {
            name: name.into(),
            kind,
        });
        self
    }
}

/// How a hit group finds its intersections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitGroupType {
    /// Fixed-function triangle intersection.
    Triangles,
    /// Custom intersection shader over AABBs.
    ProceduralPrimitive,
}

/// A hit group: up to three member shaders addressed as one unit.
///
/// Only the group name is dispatchable; member exports never get their own
/// shader identifiers.
#[derive(Debug, Clone)]
pub struct HitGroupDesc {
    pub name: String,
    pub group_type: HitGroupType,
    pub closest_hit: Option<String>,
    pub any_hit: Option<String>,
    pub intersection: Option<String>,
}

impl HitGroupDesc {
    /// Triangle hit group with a closest hit shader, the common case.
    pub fn triangles(name: impl Into<String>, closest_hit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_type: HitGroupType::Triangles,
            closest_hit: Some(closest_hit.into()),
            any_hit: None,
            intersection: None,
        }
    }

    /// Procedural hit group around an intersection shader.
    pub fn procedural(name: impl Into<String>, intersection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_type: HitGroupType::ProceduralPrimitive,
            closest_hit: None,
            any_hit: None,
            intersection: Some(intersection.into()),
        }
    }

    pub fn with_closest_hit(mut self, name: impl Into<String>) -> Self {
        self.closest_hit = Some(name.into());
        self
    }

    pub fn with_any_hit(mut self, name: impl Into<String>) -> Self {
        self.any_hit = Some(name.into());
        self
    }
}

/// Per-shader payload and attribute limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderConfig {
    /// Largest ray payload, in bytes, any shader in the pipeline uses.
    pub max_payload_size: u32,
    /// Largest intersection attribute struct, in bytes.
    pub max_attribute_size: u32,
}

/// Pipeline-wide limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Deepest allowed chain of nested trace calls.
    pub max_recursion_depth: u32,
}

/// Which exports a subobject applies to.
#[derive(Debug, Clone)]
pub enum Association {
    /// Applies to every export in the pipeline.
    Default,
    /// Applies to the named exports or hit groups only.
    Exports(Vec<String>),
}

#[derive(Debug, Clone)]
struct ShaderConfigEntry {
    config: ShaderConfig,
    association: Association,
}

#[derive(Debug, Clone)]
struct LocalRootSignatureEntry {
    root_signature: RootSignature,
    association: Association,
}

/// Builder for a ray tracing pipeline.
#[derive(Debug, Clone, Default)]
pub struct RaytracingPipelineDesc {
    libraries: Vec<ShaderLibrary>,
    hit_groups: Vec<HitGroupDesc>,
    shader_configs: Vec<ShaderConfigEntry>,
    local_root_signatures: Vec<LocalRootSignatureEntry>,
    global_root_signature: Option<RootSignature>,
    pipeline_config: Option<PipelineConfig>,
}

impl RaytracingPipelineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(mut self, library: ShaderLibrary) -> Self {
        self.libraries.push(library);
        self
    }

    pub fn with_hit_group(mut self, hit_group: HitGroupDesc) -> Self {
        self.hit_groups.push(hit_group);
        self
    }

    /// Shader config applying to every export.
    pub fn with_shader_config(mut self, config: ShaderConfig) -> Self {
        self.shader_configs.push(ShaderConfigEntry {
            config,
            association: Association::Default,
        });
        self
    }

    /// Shader config applying to the named exports only.
    pub fn with_shader_config_for(mut self, config: ShaderConfig, exports: &[&str]) -> Self {
        self.shader_configs.push(ShaderConfigEntry {
            config,
            association: Association::Exports(
                exports.iter().map(|name| (*name).to_string()).collect(),
            ),
        });
        self
    }

    /// Local root signature applying to every export.
    pub fn with_local_root_signature(mut self, root_signature: RootSignature) -> Self {
        self.local_root_signatures.push(LocalRootSignatureEntry {
            root_signature,
            association: Association::Default,
        });
        self
    }

    /// Local root signature applying to the named exports only.
    pub fn with_local_root_signature_for(
        mut self,
        root_signature: RootSignature,
        exports: &[&str],
    ) -> Self {
        self.local_root_signatures.push(LocalRootSignatureEntry {
            root_signature,
            association: Association::Exports(
                exports.iter().map(|name| (*name).to_string()).collect(),
            ),
        });
        self
    }

    pub fn with_global_root_signature(mut self, root_signature: RootSignature) -> Self {
        self.global_root_signature = Some(root_signature);
        self
    }

    pub fn with_pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = Some(config);
        self
    }

    /// Check the subobject bag as a whole and resolve it into the flat form
    /// compilation consumes.
    pub(crate) fn validate(&self) -> Result<ResolvedPipeline> {
        if self.libraries.is_empty() {
            return Err(RtError::EmptyLibrary);
        }

        let mut exports: HashMap<&str, ShaderKind> = HashMap::new();
        let mut library_bytes = Vec::new();
        for library in &self.libraries {
            if library.bytecode.is_empty() {
                return Err(RtError::EmptyLibrary);
            }
            library_bytes.extend_from_slice(&library.bytecode);
            for export in &library.exports {
                if exports.insert(&export.name, export.kind).is_some() {
                    return Err(RtError::DuplicateExport(export.name.clone()));
                }
            }
        }

        let mut hit_group_names: Vec<String> = Vec::new();
        for group in &self.hit_groups {
            if exports.contains_key(group.name.as_str()) || hit_group_names.contains(&group.name) {
                return Err(RtError::DuplicateExport(group.name.clone()));
            }
            check_member(
                &exports,
                group,
                "closest hit",
                &group.closest_hit,
                ShaderKind::ClosestHit,
            )?;
            check_member(&exports, group, "any hit", &group.any_hit, ShaderKind::AnyHit)?;
            check_member(
                &exports,
                group,
                "intersection",
                &group.intersection,
                ShaderKind::Intersection,
            )?;
            match group.group_type {
                HitGroupType::Triangles => {
                    if group.intersection.is_some() {
                        return Err(RtError::InvalidHitGroup(format!(
                            "'{}' is a triangles group but names an intersection shader",
                            group.name
                        )));
                    }
                }
                HitGroupType::ProceduralPrimitive => {
                    if group.intersection.is_none() {
                        return Err(RtError::InvalidHitGroup(format!(
                            "'{}' is a procedural group but has no intersection shader",
                            group.name
                        )));
                    }
                }
            }
            if group.closest_hit.is_none()
                && group.any_hit.is_none()
                && group.intersection.is_none()
            {
                return Err(RtError::InvalidHitGroup(format!(
                    "'{}' has no member shaders",
                    group.name
                )));
            }
            hit_group_names.push(group.name.clone());
        }

        let known = |name: &String| {
            exports.contains_key(name.as_str()) || hit_group_names.contains(name)
        };

        // Every shader config in the bag must agree; associations only pick
        // which exports it nominally covers.
        let Some(first_config) = self.shader_configs.first() else {
            return Err(RtError::MissingShaderConfig);
        };
        let shader_config = first_config.config;
        for entry in &self.shader_configs {
            if entry.config != shader_config {
                return Err(RtError::ConflictingShaderConfig);
            }
            if let Association::Exports(names) = &entry.association {
                for name in names {
                    if !known(name) {
                        return Err(RtError::AssociationTarget(name.clone()));
                    }
                }
            }
        }
        if shader_config.max_payload_size > MAX_RAY_PAYLOAD_SIZE {
            return Err(RtError::PayloadSizeExceeded {
                size: shader_config.max_payload_size,
                max: MAX_RAY_PAYLOAD_SIZE,
            });
        }
        if shader_config.max_attribute_size > MAX_ATTRIBUTE_SIZE {
            return Err(RtError::AttributeSizeExceeded {
                size: shader_config.max_attribute_size,
                max: MAX_ATTRIBUTE_SIZE,
            });
        }

        let mut default_local: Option<u32> = None;
        let mut explicit_local: HashMap<&str, u32> = HashMap::new();
        for entry in &self.local_root_signatures {
            match &entry.association {
                Association::Default => {
                    if default_local.is_some_and(|id| id != entry.root_signature.id()) {
                        return Err(RtError::ConflictingAssociation("(default)".to_string()));
                    }
                    default_local = Some(entry.root_signature.id());
                }
                Association::Exports(names) => {
                    for name in names {
                        if !known(name) {
                            return Err(RtError::AssociationTarget(name.clone()));
                        }
                        if explicit_local
                            .get(name.as_str())
                            .is_some_and(|id| *id != entry.root_signature.id())
                        {
                            return Err(RtError::ConflictingAssociation(name.clone()));
                        }
                        explicit_local.insert(name, entry.root_signature.id());
                    }
                }
            }
        }

        let Some(global_root_signature) = self.global_root_signature else {
            return Err(RtError::MissingGlobalRootSignature);
        };
        let Some(pipeline_config) = self.pipeline_config else {
            return Err(RtError::MissingPipelineConfig);
        };
        if pipeline_config.max_recursion_depth > MAX_TRACE_RECURSION_DEPTH {
            return Err(RtError::RecursionDepthExceeded {
                depth: pipeline_config.max_recursion_depth,
                max: MAX_TRACE_RECURSION_DEPTH,
            });
        }

        let mut ray_generation: Vec<String> = exports
            .iter()
            .filter(|(_, kind)| **kind == ShaderKind::RayGeneration)
            .map(|(name, _)| (*name).to_string())
            .collect();
        let mut miss: Vec<String> = exports
            .iter()
            .filter(|(_, kind)| **kind == ShaderKind::Miss)
            .map(|(name, _)| (*name).to_string())
            .collect();
        if ray_generation.is_empty() {
            return Err(RtError::MissingRayGeneration);
        }

        // Fixed ordering keeps identifier assignment stable regardless of
        // declaration order.
        ray_generation.sort_unstable();
        miss.sort_unstable();
        let mut hit_groups = hit_group_names;
        hit_groups.sort_unstable();

        Ok(ResolvedPipeline {
            ray_generation,
            miss,
            hit_groups,
            shader_config,
            pipeline_config,
            global_root_signature,
            library_bytes,
        })
    }
}

fn check_member(
    exports: &HashMap<&str, ShaderKind>,
    group: &HitGroupDesc,
    role: &str,
    member: &Option<String>,
    expected: ShaderKind,
) -> Result<()> {
    let Some(name) = member else {
        return Ok(());
    };
    match exports.get(name.as_str()) {
        None => Err(RtError::InvalidHitGroup(format!(
            "'{}' names unknown {role} shader '{name}'",
            group.name
        ))),
        Some(kind) if *kind != expected => Err(RtError::InvalidHitGroup(format!(
            "'{}' uses '{name}' as its {role} shader, but it is exported as {kind:?}",
            group.name
        ))),
        Some(_) => Ok(()),
    }
}

/// Flattened, checked view of a pipeline description. Dispatchable names
/// are sorted so state ids come out the same for equivalent descriptions.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedPipeline {
    pub(crate) ray_generation: Vec<String>,
    pub(crate) miss: Vec<String>,
    pub(crate) hit_groups: Vec<String>,
    pub(crate) shader_config: ShaderConfig,
    pub(crate) pipeline_config: PipelineConfig,
    pub(crate) global_root_signature: RootSignature,
    pub(crate) library_bytes: Vec<u8>,
}

/// What compilation produced for the execution path: the software path
/// synthesizes a compute pipeline and a patched root signature, the
/// hardware path needs neither.
pub(crate) enum PathArtifacts {
    Hardware,
    Software {
        patched_root_signature: RootSignature,
        uber_pipeline: ComputePipeline,
        patch_parameter_start: u32,
    },
}

/// A compiled ray tracing pipeline.
pub struct RaytracingPipeline {
    pub(crate) artifacts: PathArtifacts,
    pub(crate) identifiers: IdentifierTable,
    pub(crate) global_root_signature: RootSignature,
    pub(crate) shader_config: ShaderConfig,
    pub(crate) pipeline_config: PipelineConfig,
}

impl RaytracingPipeline {
    /// Execution path this pipeline was compiled for.
    pub fn path(&self) -> ExecutionPath {
        match self.artifacts {
            PathArtifacts::Hardware => ExecutionPath::Hardware,
            PathArtifacts::Software { .. } => ExecutionPath::SoftwareEmulated,
        }
    }

    /// Identifier for a named ray generation shader, miss shader, or hit
    /// group.
    pub fn shader_identifier(&self, name: &str) -> Result<ShaderIdentifier> {
        self.identifiers.get(name)
    }

    /// Size in bytes of this pipeline's shader identifiers.
    pub fn shader_identifier_size(&self) -> usize {
        self.identifiers.identifier_size()
    }

    pub fn shader_config(&self) -> ShaderConfig {
        self.shader_config
    }

    pub fn max_recursion_depth(&self) -> u32 {
        self.pipeline_config.max_recursion_depth
    }

    pub fn global_root_signature(&self) -> RootSignature {
        self.global_root_signature
    }

    /// The caller's root signature extended with internal bindings, on the
    /// software path.
    pub fn patched_root_signature(&self) -> Option<RootSignature> {
        match &self.artifacts {
            PathArtifacts::Hardware => None,
            PathArtifacts::Software {
                patched_root_signature,
                ..
            } => Some(*patched_root_signature),
        }
    }

    /// The synthesized compute pipeline, on the software path.
    pub fn uber_pipeline(&self) -> Option<ComputePipeline> {
        match &self.artifacts {
            PathArtifacts::Hardware => None,
            PathArtifacts::Software { uber_pipeline, .. } => Some(*uber_pipeline),
        }
    }

    /// Slot where the internal parameter block starts, on the software
    /// path.
    pub fn patch_parameter_start(&self) -> Option<u32> {
        match &self.artifacts {
            PathArtifacts::Hardware => None,
            PathArtifacts::Software {
                patch_parameter_start,
                ..
            } => Some(*patch_parameter_start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayfall_gpu::{DeviceBuilder, RootSignatureDesc};

    fn library() -> ShaderLibrary {
        ShaderLibrary::new(&[0xD1; 64])
            .with_export("primary_raygen", ShaderKind::RayGeneration)
            .with_export("sky_miss", ShaderKind::Miss)
            .with_export("shadow_miss", ShaderKind::Miss)
            .with_export("opaque_hit", ShaderKind::ClosestHit)
            .with_export("sphere_intersect", ShaderKind::Intersection)
    }

    fn root_signature() -> RootSignature {
        let device = DeviceBuilder::new().build().unwrap();
        device
            .create_root_signature(&RootSignatureDesc::new())
            .unwrap()
    }

    fn valid_desc() -> RaytracingPipelineDesc {
        RaytracingPipelineDesc::new()
            .with_library(library())
            .with_hit_group(HitGroupDesc::triangles("opaque_group", "opaque_hit"))
            .with_shader_config(ShaderConfig {
                max_payload_size: 16,
                max_attribute_size: 8,
            })
            .with_pipeline_config(PipelineConfig {
                max_recursion_depth: 1,
            })
            .with_global_root_signature(root_signature())
    }

    #[test]
    fn valid_description_resolves() {
        let resolved = valid_desc().validate().unwrap();
        assert_eq!(resolved.ray_generation, vec!["primary_raygen"]);
        assert_eq!(resolved.miss, vec!["shadow_miss", "sky_miss"]);
        assert_eq!(resolved.hit_groups, vec!["opaque_group"]);
    }

    #[test]
    fn resolution_order_ignores_declaration_order() {
        let flipped = ShaderLibrary::new(&[0xD1; 64])
            .with_export("sky_miss", ShaderKind::Miss)
            .with_export("shadow_miss", ShaderKind::Miss)
            .with_export("primary_raygen", ShaderKind::RayGeneration);
        let resolved = RaytracingPipelineDesc::new()
            .with_library(flipped)
            .with_shader_config(ShaderConfig {
                max_payload_size: 16,
                max_attribute_size: 8,
            })
            .with_pipeline_config(PipelineConfig {
                max_recursion_depth: 1,
            })
            .with_global_root_signature(root_signature())
            .validate()
            .unwrap();
        assert_eq!(resolved.miss, vec!["shadow_miss", "sky_miss"]);
    }

    #[test]
    fn missing_ray_generation_rejected() {
        let desc = RaytracingPipelineDesc::new()
            .with_library(ShaderLibrary::new(&[1]).with_export("sky_miss", ShaderKind::Miss))
            .with_shader_config(ShaderConfig {
                max_payload_size: 16,
                max_attribute_size: 8,
            })
            .with_pipeline_config(PipelineConfig {
                max_recursion_depth: 1,
            })
            .with_global_root_signature(root_signature());
        assert!(matches!(
            desc.validate(),
            Err(RtError::MissingRayGeneration)
        ));
    }

    #[test]
    fn missing_subobjects_rejected() {
        let bare = RaytracingPipelineDesc::new().with_library(library());
        assert!(matches!(bare.validate(), Err(RtError::MissingShaderConfig)));

        let no_global = RaytracingPipelineDesc::new()
            .with_library(library())
            .with_shader_config(ShaderConfig {
                max_payload_size: 16,
                max_attribute_size: 8,
            });
        assert!(matches!(
            no_global.validate(),
            Err(RtError::MissingGlobalRootSignature)
        ));

        let no_pipeline_config = RaytracingPipelineDesc::new()
            .with_library(library())
            .with_shader_config(ShaderConfig {
                max_payload_size: 16,
                max_attribute_size: 8,
            })
            .with_global_root_signature(root_signature());
        assert!(matches!(
            no_pipeline_config.validate(),
            Err(RtError::MissingPipelineConfig)
        ));
    }

    #[test]
    fn conflicting_shader_configs_rejected() {
        let desc = valid_desc().with_shader_config(ShaderConfig {
            max_payload_size: 32,
            max_attribute_size: 8,
        });
        assert!(matches!(
            desc.validate(),
            Err(RtError::ConflictingShaderConfig)
        ));
    }

    #[test]
    fn limits_enforced() {
        let payload = RaytracingPipelineDesc::new()
            .with_library(library())
            .with_shader_config(ShaderConfig {
                max_payload_size: 300,
                max_attribute_size: 8,
            })
            .with_pipeline_config(PipelineConfig {
                max_recursion_depth: 1,
            })
            .with_global_root_signature(root_signature());
        assert!(matches!(
            payload.validate(),
            Err(RtError::PayloadSizeExceeded { size: 300, max: 256 })
        ));

        let recursion = valid_desc().with_pipeline_config(PipelineConfig {
            max_recursion_depth: 32,
        });
        // The builder keeps the last pipeline config set.
        assert!(matches!(
            recursion.validate(),
            Err(RtError::RecursionDepthExceeded { depth: 32, max: 31 })
        ));
    }

    #[test]
    fn hit_group_member_kinds_checked() {
        let wrong_kind =
            valid_desc().with_hit_group(HitGroupDesc::triangles("bad_group", "sky_miss"));
        assert!(matches!(
            wrong_kind.validate(),
            Err(RtError::InvalidHitGroup(_))
        ));

        let unknown =
            valid_desc().with_hit_group(HitGroupDesc::triangles("ghost_group", "nonexistent_hit"));
        assert!(matches!(
            unknown.validate(),
            Err(RtError::InvalidHitGroup(_))
        ));
    }

    #[test]
    fn triangles_group_rejects_intersection_shader() {
        let mut group = HitGroupDesc::triangles("mixed_group", "opaque_hit");
        group.intersection = Some("sphere_intersect".to_string());
        let desc = valid_desc().with_hit_group(group);
        assert!(matches!(desc.validate(), Err(RtError::InvalidHitGroup(_))));
    }

    #[test]
    fn procedural_group_requires_intersection_shader() {
        let desc = valid_desc().with_hit_group(
            HitGroupDesc::procedural("sphere_group", "sphere_intersect")
                .with_closest_hit("opaque_hit"),
        );
        assert!(desc.validate().is_ok());

        let mut broken = HitGroupDesc::procedural("broken_group", "sphere_intersect");
        broken.intersection = None;
        broken.closest_hit = Some("opaque_hit".to_string());
        let desc = valid_desc().with_hit_group(broken);
        assert!(matches!(desc.validate(), Err(RtError::InvalidHitGroup(_))));
    }

    #[test]
    fn duplicate_names_rejected() {
        let desc = RaytracingPipelineDesc::new()
            .with_library(library())
            .with_library(ShaderLibrary::new(&[2]).with_export("sky_miss", ShaderKind::Miss));
        assert!(matches!(
            desc.validate(),
            Err(RtError::DuplicateExport(name)) if name == "sky_miss"
        ));

        let group_clash =
            valid_desc().with_hit_group(HitGroupDesc::triangles("opaque_group", "opaque_hit"));
        assert!(matches!(
            group_clash.validate(),
            Err(RtError::DuplicateExport(_))
        ));
    }

    #[test]
    fn association_targets_must_exist() {
        let desc = RaytracingPipelineDesc::new()
            .with_library(library())
            .with_shader_config_for(
                ShaderConfig {
                    max_payload_size: 16,
                    max_attribute_size: 8,
                },
                &["no_such_export"],
            )
            .with_pipeline_config(PipelineConfig {
                max_recursion_depth: 1,
            })
            .with_global_root_signature(root_signature());
        assert!(matches!(
            desc.validate(),
            Err(RtError::AssociationTarget(name)) if name == "no_such_export"
        ));
    }

    #[test]
    fn conflicting_local_root_signatures_rejected() {
        let device = DeviceBuilder::new().build().unwrap();
        let a = device
            .create_root_signature(&RootSignatureDesc::new())
            .unwrap();
        let b = device
            .create_root_signature(&RootSignatureDesc::new())
            .unwrap();

        let desc = valid_desc()
            .with_local_root_signature_for(a, &["sky_miss"])
            .with_local_root_signature_for(b, &["sky_miss"]);
        assert!(matches!(
            desc.validate(),
            Err(RtError::ConflictingAssociation(name)) if name == "sky_miss"
        ));

        let same = valid_desc()
            .with_local_root_signature_for(a, &["sky_miss"])
            .with_local_root_signature_for(a, &["sky_miss", "opaque_group"]);
        assert!(same.validate().is_ok());
    }
}
