//! Compute pipelines.

/// Handle to a created compute pipeline.
///
/// The bytecode and root signature backing a pipeline stay retained in the
/// device registry; the handle itself is cheap to copy into command streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputePipeline {
    pub(crate) id: u32,
}

impl ComputePipeline {
    pub fn id(&self) -> u32 {
        self.id
    }
}
