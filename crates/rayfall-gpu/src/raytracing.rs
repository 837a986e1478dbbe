//! Native ray tracing driver surface.
//!
//! The types a native driver exchanges with the layer on the hardware
//! execution path. Size queries answered here model a driver's answers; the
//! software path computes its own sizes and never consults this surface.

/// Which level of the acceleration structure hierarchy a build targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelerationStructureLevel {
    /// Instances referencing bottom-level structures.
    TopLevel,
    /// Geometry.
    BottomLevel,
}

/// Buffer sizes a build request will need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSizes {
    pub acceleration_structure_size: u64,
    pub build_scratch_size: u64,
    pub update_scratch_size: u64,
}
