//! Root signature layouts.
//!
//! A root signature is an ordered list of parameters a compute program binds
//! through: descriptor tables, inline constants, and root views. The layer
//! needs the full layout retained CPU-side so it can rewrite and extend a
//! caller's signature when building the software execution path.

use rayfall_core::constants::ROOT_SIGNATURE_DWORD_BUDGET;

/// Descriptor range kinds within a table parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorRangeKind {
    Cbv,
    Srv,
    Uav,
    Sampler,
}

/// Range count meaning "unbounded": the table spans the rest of the heap.
pub const DESCRIPTOR_RANGE_UNBOUNDED: u32 = u32::MAX;

/// A contiguous descriptor range within a table parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    pub kind: DescriptorRangeKind,
    pub count: u32,
    pub base_register: u32,
    pub register_space: u32,
}

impl DescriptorRange {
    pub fn new(kind: DescriptorRangeKind, count: u32, base_register: u32) -> Self {
        Self {
            kind,
            count,
            base_register,
            register_space: 0,
        }
    }

    pub fn in_space(mut self, register_space: u32) -> Self {
        self.register_space = register_space;
        self
    }
}

/// One root parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootParameter {
    /// Table of descriptor ranges resolved through the bound heap.
    DescriptorTable(Vec<DescriptorRange>),
    /// Inline 32-bit constants.
    Constants {
        register: u32,
        register_space: u32,
        count: u32,
    },
    /// Root constant buffer view bound by GPU address.
    ConstantBufferView { register: u32, register_space: u32 },
    /// Root shader resource view bound by GPU address.
    ShaderResourceView { register: u32, register_space: u32 },
    /// Root unordered access view bound by GPU address.
    UnorderedAccessView { register: u32, register_space: u32 },
    /// Top-level acceleration structure binding.
    ///
    /// Declared as its own kind, not a plain SRV, so the software path knows
    /// which parameters to rewrite when patching the signature.
    AccelerationStructure { register: u32, register_space: u32 },
}

impl RootParameter {
    /// Cost of this parameter against the signature budget, in 32-bit words.
    pub fn dword_cost(&self) -> u32 {
        match self {
            Self::DescriptorTable(_) => 1,
            Self::Constants { count, .. } => *count,
            // Root views carry a full GPU address.
            _ => 2,
        }
    }
}

/// An ordered set of root parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootSignatureDesc {
    pub parameters: Vec<RootParameter>,
}

impl RootSignatureDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, parameter: RootParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Total cost in 32-bit words.
    pub fn dword_cost(&self) -> u32 {
        self.parameters.iter().map(RootParameter::dword_cost).sum()
    }

    /// Whether the layout fits the signature budget.
    pub fn fits_budget(&self) -> bool {
        self.dword_cost() <= ROOT_SIGNATURE_DWORD_BUDGET
    }
}

/// Handle to a created root signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootSignature {
    pub(crate) id: u32,
    pub(crate) parameter_count: u32,
}

impl RootSignature {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn parameter_count(&self) -> u32 {
        self.parameter_count
    }
}
