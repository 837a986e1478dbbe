//! Error types for the ray tracing runtime.

use thiserror::Error;

/// Errors produced by pipeline creation, shader tables, and dispatch.
#[derive(Error, Debug)]
pub enum RtError {
    /// A shader identifier query named an unknown dispatchable export.
    #[error("Export '{0}' not found in the pipeline")]
    ExportNotFound(String),

    /// Two subobjects claim the same export name.
    #[error("Export '{0}' is defined more than once")]
    DuplicateExport(String),

    /// A pipeline needs at least one ray generation shader.
    #[error("Pipeline has no ray generation shader")]
    MissingRayGeneration,

    /// A pipeline needs a shader config subobject.
    #[error("Pipeline has no shader config subobject")]
    MissingShaderConfig,

    /// A pipeline needs a pipeline config subobject.
    #[error("Pipeline has no pipeline config subobject")]
    MissingPipelineConfig,

    /// A pipeline needs a global root signature to extend.
    #[error("Pipeline has no global root signature")]
    MissingGlobalRootSignature,

    /// Shader configs in one pipeline must agree.
    #[error("Shader configs associated with the pipeline disagree")]
    ConflictingShaderConfig,

    /// An export was associated with two different local root signatures.
    #[error("Conflicting associations for export '{0}'")]
    ConflictingAssociation(String),

    /// An association names an export no subobject defines.
    #[error("Association names unknown export '{0}'")]
    AssociationTarget(String),

    /// A hit group references missing or wrongly typed members.
    #[error("Invalid hit group: {0}")]
    InvalidHitGroup(String),

    /// Declared ray payload size is over the device limit.
    #[error("Ray payload of {size} bytes exceeds the limit of {max}")]
    PayloadSizeExceeded { size: u32, max: u32 },

    /// Declared attribute size is over the device limit.
    #[error("Intersection attributes of {size} bytes exceed the limit of {max}")]
    AttributeSizeExceeded { size: u32, max: u32 },

    /// Declared recursion depth is over the device limit.
    #[error("Trace recursion depth {depth} exceeds the limit of {max}")]
    RecursionDepthExceeded { depth: u32, max: u32 },

    /// A shader library carried no bytecode.
    #[error("Shader library has no bytecode")]
    EmptyLibrary,

    /// A record was pushed into a table built for another identifier size.
    #[error("Shader record identifier is {got} bytes, table expects {expected}")]
    RecordIdentifierSize { expected: usize, got: usize },

    /// Device interface failure.
    #[error(transparent)]
    Gpu(#[from] rayfall_gpu::GpuError),
}

/// Result type alias using [`RtError`].
pub type Result<T> = std::result::Result<T, RtError>;
