//! The native renderer the ANARI objects translate onto.
//!
//! Mirrors the structure of a Cycles session: a [`scene::NativeScene`] of
//! shaders, geometry, lights and object instances, a [`session::Session`]
//! that renders it on a background thread, and an output driver that
//! receives finished [`tile::Tile`]s.

pub mod eval;
pub mod image;
pub mod kernel;
pub mod scene;
pub mod session;
pub mod shader_graph;
pub mod tile;

/// Compute backend class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Cpu,
    Cuda,
    Optix,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::Cuda => "CUDA",
            Self::Optix => "OPTIX",
        }
    }
}

/// A compute device sessions can render on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub description: String,
}

/// Devices available on this machine.
pub fn available_devices() -> Vec<DeviceInfo> {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    vec![DeviceInfo {
        device_type: DeviceType::Cpu,
        description: format!("CPU ({} threads)", threads),
    }]
}

/// Picks the preferred device: OptiX, then CUDA, then CPU.
pub fn select_device(devices: &[DeviceInfo]) -> Option<DeviceInfo> {
    [DeviceType::Optix, DeviceType::Cuda, DeviceType::Cpu]
        .iter()
        .find_map(|ty| devices.iter().find(|d| d.device_type == *ty))
        .cloned()
}
