//! # ANARI Cycles
//!
//! An ANARI device that translates scene objects onto the Cycles path
//! tracer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Device`] - Object construction, parameters, commits, properties and frames
//! - [`ObjectStore`] - Per-category object arenas and the commit flush
//! - [`native`] - The renderer model: scene, shader graphs, session and tiles
//! - [`FrameOutputDriver`] - The hand-off between the render thread and frames
//!
//! Objects capture parameters on commit and materialize native nodes on
//! finalize. A frame render flushes pending commits, resynchronizes the
//! world when its content changed and restarts sample accumulation when
//! anything was finalized since the last restart.

mod array;
mod camera;
mod commit_buffer;
mod config;
mod device;
mod error;
mod frame;
mod geometry;
mod group;
mod image_loader;
mod instance;
mod light;
mod material;
mod object;
mod output_driver;
mod params;
mod queries;
mod renderer;
mod sampler;
mod spatial_field;
mod state;
mod store;
mod surface;
mod volume;
mod world;

pub mod native;

pub use anari_cycles_core::DataType;
pub use anari_cycles_core::math::Box3;
pub use array::{Array, ArrayElement};
pub use camera::{Camera, CameraKind};
pub use commit_buffer::CommitBuffer;
pub use config::{DeviceConfig, DevicePreference};
pub use device::Device;
pub use error::{DeviceError, NativeError};
pub use frame::{Channel, Frame, FrameBuffers, MappedChannel, SharedFrameBuffers};
pub use geometry::{Geometry, GeometryKind};
pub use group::Group;
pub use image_loader::{SamplerImageLoader, VolumeImageLoader};
pub use instance::Instance;
pub use light::{Light, LightKind};
pub use material::{Material, MaterialKind};
pub use object::{
    ArrayHandle, CameraHandle, FrameHandle, GeometryHandle, GroupHandle, InstanceHandle,
    LightHandle, MaterialHandle, Object, ObjectBase, ObjectHandle, RendererHandle, SamplerHandle,
    SpatialFieldHandle, SurfaceHandle, VolumeHandle, WorldHandle,
};
pub use output_driver::FrameOutputDriver;
pub use params::{FromParam, ParamValue, ParameterSet};
pub use queries::{EXTENSIONS, PropertyValue, WaitMask, object_subtypes};
pub use renderer::Renderer;
pub use sampler::{Sampler, SamplerKind};
pub use spatial_field::{SpatialField, SpatialFieldKind};
pub use state::{ChangeStamps, DeviceState, FinalizeContext};
pub use store::{ObjectStore, SceneView};
pub use surface::Surface;
pub use volume::{Volume, VolumeKind};
pub use world::{World, WorldSync};

/// Device library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the device library version.
pub fn init() {
    anari_cycles_core::init();
    log::info!("ANARI Cycles v{} initialized", VERSION);
}
