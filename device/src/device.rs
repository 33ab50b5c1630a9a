//! The device: the entry point the ANARI dispatch layer calls.
//!
//! # Example
//!
//! ```no_run
//! use anari_cycles::{Device, DeviceConfig, WaitMask};
//!
//! let mut device = Device::new(DeviceConfig::new())?;
//! let camera = device.new_camera("perspective");
//! device.set_param(camera, "position", [0.0f32, 0.0, 3.0]);
//! device.commit_parameters(camera);
//!
//! let world = device.new_world();
//! let renderer = device.new_renderer("default");
//! let frame = device.new_frame();
//! device.set_param(frame, "camera", camera);
//! device.set_param(frame, "world", world);
//! device.set_param(frame, "renderer", renderer);
//! device.commit_parameters(frame);
//!
//! device.render_frame(frame);
//! device.frame_ready(frame, WaitMask::Wait);
//! # Ok::<(), anari_cycles::DeviceError>(())
//! ```

use anari_cycles_core::DataType;

use crate::array::{Array, ArrayElement};
use crate::camera::Camera;
use crate::config::DeviceConfig;
use crate::error::DeviceError;
use crate::frame::{self, Frame, MappedChannel};
use crate::geometry::Geometry;
use crate::group::Group;
use crate::instance::Instance;
use crate::light::Light;
use crate::material::Material;
use crate::object::{
    ArrayHandle, CameraHandle, FrameHandle, GeometryHandle, GroupHandle, InstanceHandle,
    LightHandle, MaterialHandle, ObjectHandle, RendererHandle, SamplerHandle, SpatialFieldHandle,
    SurfaceHandle, VolumeHandle, WorldHandle,
};
use crate::params::ParamValue;
use crate::queries::{self, EXTENSIONS, PropertyValue, WaitMask};
use crate::renderer::Renderer;
use crate::sampler::Sampler;
use crate::spatial_field::SpatialField;
use crate::state::DeviceState;
use crate::store::ObjectStore;
use crate::surface::Surface;
use crate::volume::Volume;
use crate::world::World;

pub struct Device {
    state: DeviceState,
    store: ObjectStore,
}

impl Device {
    /// Selects a compute device and prepares an empty native scene.
    pub fn new(config: DeviceConfig) -> Result<Self, DeviceError> {
        let state = DeviceState::new(&config)?;
        Ok(Self {
            state,
            store: ObjectStore::new(),
        })
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    // Arrays

    pub fn new_array1d<T: ArrayElement>(&mut self, data: &[T]) -> ArrayHandle {
        self.store.arrays.insert(Array::from_slice([data.len(), 1, 1], data))
    }

    pub fn new_array2d<T: ArrayElement>(&mut self, data: &[T], width: usize, height: usize) -> ArrayHandle {
        self.store
            .arrays
            .insert(Array::from_slice([width, height, 1], data))
    }

    pub fn new_array3d<T: ArrayElement>(
        &mut self,
        data: &[T],
        width: usize,
        height: usize,
        depth: usize,
    ) -> ArrayHandle {
        self.store
            .arrays
            .insert(Array::from_slice([width, height, depth], data))
    }

    pub fn new_array1d_raw(&mut self, ty: DataType, bytes: Vec<u8>, count: usize) -> ArrayHandle {
        self.store
            .arrays
            .insert(Array::from_bytes(ty, [count, 1, 1], bytes))
    }

    pub fn new_array2d_raw(
        &mut self,
        ty: DataType,
        bytes: Vec<u8>,
        width: usize,
        height: usize,
    ) -> ArrayHandle {
        self.store
            .arrays
            .insert(Array::from_bytes(ty, [width, height, 1], bytes))
    }

    pub fn new_array3d_raw(
        &mut self,
        ty: DataType,
        bytes: Vec<u8>,
        dims: [usize; 3],
    ) -> ArrayHandle {
        self.store.arrays.insert(Array::from_bytes(ty, dims, bytes))
    }

    /// Array of object handles, e.g. the surfaces of a world.
    pub fn new_object_array(&mut self, ty: DataType, handles: &[ObjectHandle]) -> ArrayHandle {
        let array = self.store.arrays.insert(Array::from_objects(ty, handles));
        self.store.update_references(array.into(), &mut self.state);
        array
    }

    /// Byte view of a numeric array. Waits for the in-flight frame first.
    pub fn map_array(&mut self, handle: ArrayHandle) -> Option<&mut [u8]> {
        self.state.wait_on_current_frame();
        self.store.arrays.get_mut(handle).map(Array::map)
    }

    pub fn map_object_array(&mut self, handle: ArrayHandle) -> Option<&mut Vec<ObjectHandle>> {
        self.state.wait_on_current_frame();
        self.store
            .arrays
            .get_mut(handle)
            .and_then(Array::map_objects)
    }

    /// Queues everything observing the array for the next flush.
    pub fn unmap_array(&mut self, handle: ArrayHandle) {
        if self.store.arrays.contains(handle) {
            self.store.update_references(handle.into(), &mut self.state);
            self.state.commit_buffer.add(handle.into());
        }
    }

    // Objects

    pub fn new_camera(&mut self, subtype: &str) -> CameraHandle {
        self.store.cameras.insert(Camera::new(subtype))
    }

    pub fn new_geometry(&mut self, subtype: &str) -> GeometryHandle {
        self.store.geometries.insert(Geometry::new(subtype))
    }

    pub fn new_light(&mut self, subtype: &str) -> LightHandle {
        let light = Light::new(subtype, &mut self.state.scene.write());
        self.store.lights.insert(light)
    }

    pub fn new_material(&mut self, subtype: &str) -> MaterialHandle {
        let material = Material::new(subtype, &mut self.state.scene.write());
        self.store.materials.insert(material)
    }

    pub fn new_sampler(&mut self, subtype: &str) -> SamplerHandle {
        self.store.samplers.insert(Sampler::new(subtype))
    }

    pub fn new_spatial_field(&mut self, subtype: &str) -> SpatialFieldHandle {
        self.store.fields.insert(SpatialField::new(subtype))
    }

    pub fn new_volume(&mut self, subtype: &str) -> VolumeHandle {
        let volume = Volume::new(subtype, &mut self.state.scene.write());
        self.store.volumes.insert(volume)
    }

    pub fn new_surface(&mut self) -> SurfaceHandle {
        self.store.surfaces.insert(Surface::new())
    }

    pub fn new_group(&mut self) -> GroupHandle {
        self.store.groups.insert(Group::new())
    }

    pub fn new_instance(&mut self) -> InstanceHandle {
        self.store.instances.insert(Instance::new())
    }

    pub fn new_world(&mut self) -> WorldHandle {
        self.store.worlds.insert(World::new())
    }

    pub fn new_renderer(&mut self, subtype: &str) -> RendererHandle {
        self.store.renderers.insert(Renderer::new(subtype))
    }

    pub fn new_frame(&mut self) -> FrameHandle {
        self.store.frames.insert(Frame::new())
    }

    // Parameters

    pub fn set_param(
        &mut self,
        object: impl Into<ObjectHandle>,
        name: &str,
        value: impl Into<ParamValue>,
    ) {
        let object = object.into();
        match self.store.object_mut(object) {
            Some(o) => {
                o.base_mut().params_mut().set(name, value.into());
                self.store.update_references(object, &mut self.state);
            }
            None => log::warn!("set_param '{}' on destroyed {:?}", name, object),
        }
    }

    pub fn unset_param(&mut self, object: impl Into<ObjectHandle>, name: &str) {
        let object = object.into();
        if let Some(o) = self.store.object_mut(object) {
            if o.base_mut().params_mut().remove(name) {
                self.store.update_references(object, &mut self.state);
            }
        }
    }

    /// Queues the object; parameters take effect on the next flush.
    pub fn commit_parameters(&mut self, object: impl Into<ObjectHandle>) {
        let object = object.into();
        if self.store.contains(object) {
            self.state.commit_buffer.add(object);
        } else {
            log::warn!("commit on destroyed {:?}", object);
        }
    }

    /// Drops the application's reference. The object and its native
    /// nodes go away once no other object holds it.
    pub fn release(&mut self, object: impl Into<ObjectHandle>) {
        let object = object.into();
        self.state.wait_on_current_frame();
        if !self.store.release(object, &mut self.state) {
            log::warn!("release of destroyed or already released {:?}", object);
        }
    }

    /// Commits and finalizes everything queued so far.
    pub fn flush(&mut self) {
        let finalized = self.store.flush(&mut self.state);
        if finalized > 0 {
            log::debug!("flushed {} object commits", finalized);
        }
    }

    // Properties

    /// Reads a property of `object` if it exists with type `ty`.
    ///
    /// With [`WaitMask::Wait`] the in-flight frame is waited for and the
    /// commit queue flushed first.
    pub fn get_property(
        &mut self,
        object: impl Into<ObjectHandle>,
        name: &str,
        ty: DataType,
        mask: WaitMask,
    ) -> Option<PropertyValue> {
        let object = object.into();
        if mask == WaitMask::Wait {
            self.state.wait_on_current_frame();
            self.flush();
        }
        let value = match (object, name) {
            (_, "valid") if self.store.contains(object) => {
                Some(PropertyValue::Bool(self.store.is_valid(object)))
            }
            (_, "bounds") => self.store.bounds(object).map(PropertyValue::Box3),
            (ObjectHandle::Frame(h), "duration") => self
                .store
                .frames
                .get(h)
                .map(|f| PropertyValue::Float(f.duration())),
            (ObjectHandle::Frame(_), "numSamples") => Some(PropertyValue::Int(
                i32::try_from(self.state.session_samples).unwrap_or(i32::MAX),
            )),
            (ObjectHandle::Frame(_), "nextFrameReset") => {
                if self.state.output_driver.ready() {
                    self.flush();
                }
                Some(PropertyValue::Bool(frame::reset_accumulation_next_frame(
                    &self.state,
                )))
            }
            _ => None,
        };
        value.filter(|v| v.data_type() == ty)
    }

    /// Device-level properties: `"feature"` and `"cycles"`.
    pub fn device_get_property(&self, name: &str, ty: DataType) -> Option<PropertyValue> {
        let value = match name {
            "feature" => PropertyValue::StringList(EXTENSIONS),
            "cycles" => PropertyValue::Bool(true),
            _ => return None,
        };
        (value.data_type() == ty).then_some(value)
    }

    pub fn object_subtypes(&self, ty: DataType) -> &'static [&'static str] {
        queries::object_subtypes(ty)
    }

    // Frames

    /// Starts rendering one more sample into `frame`.
    pub fn render_frame(&mut self, frame: FrameHandle) {
        frame::render_frame(&mut self.store, &mut self.state, frame);
    }

    /// Whether the last render has finished, waiting for it with
    /// [`WaitMask::Wait`].
    pub fn frame_ready(&self, _frame: FrameHandle, mask: WaitMask) -> bool {
        if mask == WaitMask::Wait {
            self.state.wait_on_current_frame();
        }
        self.state.output_driver.ready()
    }

    /// Holds a frame channel for reading after the in-flight render ends.
    pub fn map_frame(&self, frame: FrameHandle, channel: &str) -> Option<MappedChannel<'_>> {
        self.state.wait_on_current_frame();
        self.store.frames.get(frame)?.map(channel)
    }

    /// Mapped channels are released when their guard drops.
    pub fn unmap_frame(&self, _frame: FrameHandle, _channel: &str) {}

    pub fn discard_frame(&self, _frame: FrameHandle) {}
}

impl Drop for Device {
    fn drop(&mut self) {
        self.state.session.cancel();
        self.state.commit_buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device::new(DeviceConfig::new()).unwrap()
    }

    #[test]
    fn test_device_properties() {
        let device = device();
        assert_eq!(
            device.device_get_property("cycles", DataType::Bool),
            Some(PropertyValue::Bool(true))
        );
        assert!(matches!(
            device.device_get_property("feature", DataType::StringList),
            Some(PropertyValue::StringList(list)) if list.contains(&"ANARI_KHR_LIGHT_HDRI")
        ));
        assert_eq!(device.device_get_property("cycles", DataType::Int32), None);
        assert_eq!(device.device_get_property("vendor", DataType::String), None);
    }

    #[test]
    fn test_valid_property_tracks_commits() {
        let mut device = device();
        let geometry = device.new_geometry("triangle");
        let valid = |d: &mut Device| d.get_property(geometry, "valid", DataType::Bool, WaitMask::Wait);
        assert_eq!(valid(&mut device), Some(PropertyValue::Bool(false)));

        let position = device.new_array1d(&[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        device.set_param(geometry, "vertex.position", position);
        assert_eq!(valid(&mut device), Some(PropertyValue::Bool(false)));
        device.commit_parameters(geometry);
        assert_eq!(valid(&mut device), Some(PropertyValue::Bool(true)));
    }

    #[test]
    fn test_release_stamps_scene_change() {
        let mut device = device();
        let surface = device.new_surface();
        let before = device.state().stamps.last_scene_change;
        device.release(surface);
        assert!(device.state().stamps.last_scene_change > before);
        assert_eq!(
            device.get_property(surface, "valid", DataType::Bool, WaitMask::NoWait),
            None
        );
    }

    #[test]
    fn test_unmap_queues_array() {
        let mut device = device();
        let array = device.new_array1d(&[1.0f32, 2.0]);
        if let Some(bytes) = device.map_array(array) {
            bytes[..4].copy_from_slice(&5.0f32.to_le_bytes());
        }
        device.unmap_array(array);
        assert_eq!(device.state().commit_buffer.len(), 1);
        assert_eq!(device.store().arrays.get(array).unwrap().get::<f32>(0), Some(5.0));
    }
}
