//! Adapter capability detection.

use rayfall_core::constants::{MAX_DISPATCH_GROUPS_PER_DIM, NATIVE_SHADER_IDENTIFIER_SIZE};

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    /// Software rasterizer / reference adapter.
    Software,
    Unknown,
}

impl GpuVendor {
    /// Identify a vendor from its PCI vendor ID.
    pub fn from_vendor_id(vendor_id: u32) -> Self {
        match vendor_id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x1414 => Self::Software,
            _ => Self::Unknown,
        }
    }
}

/// Capabilities of the adapter a device models.
///
/// The fallback layer reads these once at device creation to pick the
/// execution path; it never re-queries mid-frame.
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    /// Whether the adapter exposes a native ray tracing driver.
    pub supports_raytracing_driver: bool,
    /// Shader identifier size reported by the native driver.
    pub native_shader_identifier_size: u32,
    /// Most thread groups one compute dispatch may cover per dimension.
    pub max_dispatch_groups_per_dim: u32,
    /// Largest shader-visible descriptor heap the adapter accepts.
    pub max_shader_visible_descriptors: u32,
}

impl DeviceCapabilities {
    /// Reference adapter: compute only, no ray tracing driver.
    pub fn reference() -> Self {
        Self {
            vendor: GpuVendor::Software,
            device_name: "Rayfall Reference Adapter".to_string(),
            supports_raytracing_driver: false,
            native_shader_identifier_size: NATIVE_SHADER_IDENTIFIER_SIZE,
            max_dispatch_groups_per_dim: MAX_DISPATCH_GROUPS_PER_DIM,
            max_shader_visible_descriptors: 1_000_000,
        }
    }

    /// Adapter with a native ray tracing driver.
    pub fn with_raytracing_driver() -> Self {
        Self {
            vendor: GpuVendor::Nvidia,
            device_name: "Rayfall Raytracing Adapter".to_string(),
            supports_raytracing_driver: true,
            ..Self::reference()
        }
    }

    /// Check whether the adapter can host the layer at all.
    pub fn meets_requirements(&self) -> bool {
        self.max_dispatch_groups_per_dim > 0 && self.max_shader_visible_descriptors > 0
    }

    /// One-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}), raytracing driver: {}, max heap: {} descriptors",
            self.device_name,
            self.vendor,
            if self.supports_raytracing_driver { "yes" } else { "no" },
            self.max_shader_visible_descriptors
        )
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self::reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1414), GpuVendor::Software);
        assert_eq!(GpuVendor::from_vendor_id(0xBEEF), GpuVendor::Unknown);
    }

    #[test]
    fn reference_adapter_has_no_driver() {
        let caps = DeviceCapabilities::reference();
        assert!(!caps.supports_raytracing_driver);
        assert!(caps.meets_requirements());
        assert!(caps.summary().contains("Reference"));
    }

    #[test]
    fn raytracing_adapter_reports_driver() {
        let caps = DeviceCapabilities::with_raytracing_driver();
        assert!(caps.supports_raytracing_driver);
        assert_eq!(
            caps.native_shader_identifier_size,
            NATIVE_SHADER_IDENTIFIER_SIZE
        );
    }
}
