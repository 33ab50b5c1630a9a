//! Per-category object arenas and the commit flush.
//!
//! Every ANARI object lives in one arena of the [`ObjectStore`]. The store
//! also keeps the change-observer graph: after an object finalizes, the
//! objects observing it are queued so they re-finalize in the same flush.
//!
//! Objects are reference counted the way ANARI counts them: the application
//! owns one public reference, and every parameter, committed binding or
//! object array element naming an object holds an internal one. Releasing
//! the public reference destroys the object only once no internal
//! reference is left.

use std::collections::{HashMap, HashSet};

use anari_cycles_core::Arena;
use anari_cycles_core::math::Box3;

use crate::array::Array;
use crate::camera::Camera;
use crate::frame::Frame;
use crate::geometry::Geometry;
use crate::group::Group;
use crate::instance::Instance;
use crate::light::Light;
use crate::material::Material;
use crate::native::scene::NativeScene;
use crate::object::{Object, ObjectHandle};
use crate::params::ParamValue;
use crate::renderer::Renderer;
use crate::sampler::Sampler;
use crate::spatial_field::SpatialField;
use crate::state::{DeviceState, FinalizeContext};
use crate::surface::Surface;
use crate::volume::Volume;
use crate::world::World;

/// Resolves `$handle` in the matching arena of `$store` with `$method`
/// (`get` or `get_mut`) and maps the object through `$body`.
macro_rules! with_object {
    ($store:expr, $handle:expr, $method:ident, |$obj:ident| $body:expr) => {
        match $handle {
            ObjectHandle::Array(h) => $store.arrays.$method(h).map(|$obj| $body),
            ObjectHandle::Camera(h) => $store.cameras.$method(h).map(|$obj| $body),
            ObjectHandle::Geometry(h) => $store.geometries.$method(h).map(|$obj| $body),
            ObjectHandle::Light(h) => $store.lights.$method(h).map(|$obj| $body),
            ObjectHandle::Material(h) => $store.materials.$method(h).map(|$obj| $body),
            ObjectHandle::Sampler(h) => $store.samplers.$method(h).map(|$obj| $body),
            ObjectHandle::SpatialField(h) => $store.fields.$method(h).map(|$obj| $body),
            ObjectHandle::Volume(h) => $store.volumes.$method(h).map(|$obj| $body),
            ObjectHandle::Surface(h) => $store.surfaces.$method(h).map(|$obj| $body),
            ObjectHandle::Group(h) => $store.groups.$method(h).map(|$obj| $body),
            ObjectHandle::Instance(h) => $store.instances.$method(h).map(|$obj| $body),
            ObjectHandle::World(h) => $store.worlds.$method(h).map(|$obj| $body),
            ObjectHandle::Renderer(h) => $store.renderers.$method(h).map(|$obj| $body),
            ObjectHandle::Frame(h) => $store.frames.$method(h).map(|$obj| $body),
        }
    };
}

/// Shared view of every arena except frames.
#[derive(Clone, Copy)]
pub struct SceneView<'a> {
    pub arrays: &'a Arena<Array>,
    pub cameras: &'a Arena<Camera>,
    pub geometries: &'a Arena<Geometry>,
    pub lights: &'a Arena<Light>,
    pub materials: &'a Arena<Material>,
    pub samplers: &'a Arena<Sampler>,
    pub fields: &'a Arena<SpatialField>,
    pub volumes: &'a Arena<Volume>,
    pub surfaces: &'a Arena<Surface>,
    pub groups: &'a Arena<Group>,
    pub instances: &'a Arena<Instance>,
    pub worlds: &'a Arena<World>,
    pub renderers: &'a Arena<Renderer>,
}

#[derive(Default)]
pub struct ObjectStore {
    pub arrays: Arena<Array>,
    pub cameras: Arena<Camera>,
    pub geometries: Arena<Geometry>,
    pub lights: Arena<Light>,
    pub materials: Arena<Material>,
    pub samplers: Arena<Sampler>,
    pub fields: Arena<SpatialField>,
    pub volumes: Arena<Volume>,
    pub surfaces: Arena<Surface>,
    pub groups: Arena<Group>,
    pub instances: Arena<Instance>,
    pub worlds: Arena<World>,
    pub renderers: Arena<Renderer>,
    pub frames: Arena<Frame>,
    /// Observed object -> objects observing it.
    observers: HashMap<ObjectHandle, Vec<ObjectHandle>>,
    /// Observer -> objects it observes.
    observing: HashMap<ObjectHandle, Vec<ObjectHandle>>,
    /// Objects whose public reference was released.
    released: HashSet<ObjectHandle>,
    /// Number of live objects holding each object.
    internal_refs: HashMap<ObjectHandle, usize>,
    /// Holder -> objects it keeps alive.
    holding: HashMap<ObjectHandle, Vec<ObjectHandle>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> SceneView<'_> {
        SceneView {
            arrays: &self.arrays,
            cameras: &self.cameras,
            geometries: &self.geometries,
            lights: &self.lights,
            materials: &self.materials,
            samplers: &self.samplers,
            fields: &self.fields,
            volumes: &self.volumes,
            surfaces: &self.surfaces,
            groups: &self.groups,
            instances: &self.instances,
            worlds: &self.worlds,
            renderers: &self.renderers,
        }
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.object(handle).is_some()
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&dyn Object> {
        with_object!(self, handle, get, |o| o as &dyn Object)
    }

    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut dyn Object> {
        with_object!(self, handle, get_mut, |o| o as &mut dyn Object)
    }

    /// Objects currently observing `handle`.
    pub fn observers(&self, handle: ObjectHandle) -> &[ObjectHandle] {
        self.observers.get(&handle).map(Vec::as_slice).unwrap_or(&[])
    }

    fn unlink_observer(&mut self, observer: ObjectHandle) {
        for observed in self.observing.remove(&observer).unwrap_or_default() {
            if let Some(list) = self.observers.get_mut(&observed) {
                list.retain(|o| *o != observer);
                if list.is_empty() {
                    self.observers.remove(&observed);
                }
            }
        }
    }

    /// Re-reads which objects `handle` observes.
    fn refresh_observed(&mut self, handle: ObjectHandle) {
        self.unlink_observer(handle);
        let Some(observed) = self.object(handle).map(|o| o.observed()) else {
            return;
        };
        for target in &observed {
            let list = self.observers.entry(*target).or_default();
            if !list.contains(&handle) {
                list.push(handle);
            }
        }
        self.observing.insert(handle, observed);
    }

    /// Number of live objects holding `handle`.
    pub fn internal_refs(&self, handle: ObjectHandle) -> usize {
        self.internal_refs.get(&handle).copied().unwrap_or(0)
    }

    /// Whether the application released its reference to a live object.
    pub fn is_released(&self, handle: ObjectHandle) -> bool {
        self.released.contains(&handle)
    }

    /// Live objects named by the parameters and committed state of `holder`.
    fn held_by(&self, holder: ObjectHandle) -> Vec<ObjectHandle> {
        let Some(object) = self.object(holder) else {
            return Vec::new();
        };
        let named = object
            .base()
            .params()
            .iter()
            .filter_map(|(_, value)| match value {
                ParamValue::Object(h) => Some(*h),
                _ => None,
            })
            .chain(object.referenced());
        let mut held: Vec<ObjectHandle> = Vec::new();
        for h in named {
            if h != holder && !held.contains(&h) && self.contains(h) {
                held.push(h);
            }
        }
        held
    }

    /// Re-reads the references `holder` keeps, destroying released objects
    /// that lost their last one.
    ///
    /// Returns the number of destroyed objects.
    pub fn update_references(&mut self, holder: ObjectHandle, state: &mut DeviceState) -> usize {
        let held = self.held_by(holder);
        let previous = self.holding.remove(&holder).unwrap_or_default();
        for h in held.iter().filter(|h| !previous.contains(h)) {
            *self.internal_refs.entry(*h).or_default() += 1;
        }
        let dropped: Vec<ObjectHandle> = previous
            .into_iter()
            .filter(|h| !held.contains(h))
            .collect();
        if !held.is_empty() {
            self.holding.insert(holder, held);
        }
        self.drop_internal_refs(dropped, state)
    }

    fn drop_internal_refs(&mut self, dropped: Vec<ObjectHandle>, state: &mut DeviceState) -> usize {
        let mut orphans = Vec::new();
        for h in dropped {
            self.unref(h, &mut orphans);
        }
        self.destroy(orphans, state)
    }

    /// Drops one internal reference, collecting released objects left
    /// without any.
    fn unref(&mut self, handle: ObjectHandle, orphans: &mut Vec<ObjectHandle>) {
        let Some(count) = self.internal_refs.get_mut(&handle) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.internal_refs.remove(&handle);
            if self.released.contains(&handle) {
                orphans.push(handle);
            }
        }
    }

    /// Current validity of any object.
    pub fn is_valid(&self, handle: ObjectHandle) -> bool {
        let view = self.view();
        match handle {
            ObjectHandle::Array(h) => self.arrays.contains(h),
            ObjectHandle::Camera(h) => self.cameras.get(h).is_some_and(Camera::is_valid),
            ObjectHandle::Geometry(h) => self
                .geometries
                .get(h)
                .is_some_and(|g| g.is_valid(&self.arrays)),
            ObjectHandle::Light(h) => self.lights.get(h).is_some_and(Light::is_valid),
            ObjectHandle::Material(h) => self.materials.get(h).is_some_and(Material::is_valid),
            ObjectHandle::Sampler(h) => self
                .samplers
                .get(h)
                .is_some_and(|s| s.is_valid(&self.arrays)),
            ObjectHandle::SpatialField(h) => {
                self.fields.get(h).is_some_and(|f| f.is_valid(&self.arrays))
            }
            ObjectHandle::Volume(h) => self
                .volumes
                .get(h)
                .is_some_and(|v| v.is_valid(&self.fields, &self.arrays)),
            ObjectHandle::Surface(h) => self
                .surfaces
                .get(h)
                .is_some_and(|s| s.is_valid(&self.geometries, &self.materials, &self.arrays)),
            ObjectHandle::Group(h) => self.groups.contains(h),
            ObjectHandle::Instance(h) => self.instances.get(h).is_some_and(|i| i.is_valid(&view)),
            ObjectHandle::World(h) => self.worlds.get(h).is_some_and(World::is_valid),
            ObjectHandle::Renderer(h) => self.renderers.get(h).is_some_and(Renderer::is_valid),
            ObjectHandle::Frame(h) => self.frames.get(h).is_some_and(|f| f.is_valid(&view)),
        }
    }

    /// World-space bounds of objects that have them.
    pub fn bounds(&self, handle: ObjectHandle) -> Option<Box3> {
        let view = self.view();
        match handle {
            ObjectHandle::Geometry(h) => self.geometries.get(h).map(|g| g.bounds(&self.arrays)),
            ObjectHandle::SpatialField(h) => self.fields.get(h).map(|f| f.bounds(&self.arrays)),
            ObjectHandle::Volume(h) => self
                .volumes
                .get(h)
                .map(|v| v.bounds(&self.fields, &self.arrays)),
            ObjectHandle::Surface(h) => self
                .surfaces
                .get(h)
                .map(|s| s.bounds(&self.geometries, &self.arrays)),
            ObjectHandle::Group(h) => self.groups.get(h).map(|g| g.bounds(&view)),
            ObjectHandle::Instance(h) => self.instances.get(h).map(|i| i.bounds(&view)),
            ObjectHandle::World(h) => self.worlds.get(h).map(|w| w.bounds(&view)),
            _ => None,
        }
    }

    fn finalize(&mut self, handle: ObjectHandle, ctx: &mut FinalizeContext<'_>) {
        match handle {
            ObjectHandle::Geometry(h) => {
                if let Some(geometry) = self.geometries.get(h) {
                    geometry.finalize();
                }
            }
            ObjectHandle::Light(h) => {
                if let Some(light) = self.lights.get_mut(h) {
                    light.finalize(ctx, &self.arrays);
                }
            }
            ObjectHandle::Material(h) => {
                if let Some(material) = self.materials.get_mut(h) {
                    material.finalize(ctx, &self.samplers, &self.arrays);
                }
            }
            ObjectHandle::Sampler(h) => {
                if let Some(sampler) = self.samplers.get(h) {
                    sampler.finalize();
                }
            }
            ObjectHandle::SpatialField(h) => {
                if let Some(field) = self.fields.get(h) {
                    field.finalize();
                }
            }
            ObjectHandle::Volume(h) => {
                if let Some(volume) = self.volumes.get_mut(h) {
                    volume.finalize(ctx, &self.fields, &self.arrays);
                }
            }
            ObjectHandle::Surface(h) => {
                if let Some(surface) = self.surfaces.get_mut(h) {
                    surface.finalize(ctx, &self.geometries, &self.materials, &self.arrays);
                }
            }
            ObjectHandle::Frame(h) => {
                if let Some(frame) = self.frames.get_mut(h) {
                    frame.finalize();
                }
            }
            ObjectHandle::Array(_)
            | ObjectHandle::Camera(_)
            | ObjectHandle::Group(_)
            | ObjectHandle::Instance(_)
            | ObjectHandle::World(_)
            | ObjectHandle::Renderer(_) => {}
        }
    }

    /// Commits and finalizes every queued object, then every object
    /// observing one of them, until the queue is empty.
    ///
    /// Returns the number of finalizations.
    pub fn flush(&mut self, state: &mut DeviceState) -> usize {
        let mut finalized = 0;
        loop {
            let batch = state.commit_buffer.take_sorted();
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                let Some(object) = self.object_mut(handle) else {
                    log::debug!("skipping commit of destroyed {:?}", handle);
                    continue;
                };
                object.commit_parameters();
                self.refresh_observed(handle);
                self.update_references(handle, state);
                if !self.contains(handle) {
                    continue;
                }

                {
                    let mut scene = state.scene.write();
                    let mut ctx = FinalizeContext {
                        scene: &mut scene,
                        clock: &mut state.clock,
                        stamps: &mut state.stamps,
                    };
                    self.finalize(handle, &mut ctx);
                    if handle.affects_scene() {
                        ctx.mark_scene_changed();
                    }
                }

                let stamp = state.clock.tick();
                if let Some(object) = self.object_mut(handle) {
                    object.base_mut().mark_committed(stamp);
                }
                for observer in self.observers(handle) {
                    state.commit_buffer.add(*observer);
                }
                finalized += 1;
            }
        }
        if finalized > 0 {
            state.commit_buffer.mark_finalization(state.clock.tick());
        }
        finalized
    }

    /// Drops the application's reference to `handle`. The object is
    /// destroyed now if nothing holds it, otherwise when its last holder
    /// lets go.
    ///
    /// Returns false for unknown or already released handles.
    pub fn release(&mut self, handle: ObjectHandle, state: &mut DeviceState) -> bool {
        if !self.contains(handle) || !self.released.insert(handle) {
            return false;
        }
        if self.internal_refs(handle) == 0 {
            self.destroy(vec![handle], state);
        } else {
            log::debug!(
                "{:?} released while held by {} objects",
                handle,
                self.internal_refs(handle)
            );
        }
        true
    }

    /// Destroys `orphans` and every released object only they kept alive,
    /// deleting their native nodes. Observers of a destroyed object are
    /// queued and the destruction counts as a finalization.
    fn destroy(&mut self, mut orphans: Vec<ObjectHandle>, state: &mut DeviceState) -> usize {
        let mut destroyed = 0;
        while let Some(handle) = orphans.pop() {
            if !self.remove_object(handle, &mut state.scene.write()) {
                continue;
            }
            destroyed += 1;
            self.released.remove(&handle);
            self.internal_refs.remove(&handle);
            self.unlink_observer(handle);
            state.commit_buffer.remove(handle);
            for observer in self.observers.remove(&handle).unwrap_or_default() {
                state.commit_buffer.add(observer);
            }

            for h in self.holding.remove(&handle).unwrap_or_default() {
                self.unref(h, &mut orphans);
            }
        }
        if destroyed > 0 {
            log::debug!("destroyed {} objects", destroyed);
            state.stamps.last_scene_change = state.clock.tick();
            state.commit_buffer.mark_finalization(state.clock.tick());
        }
        destroyed
    }

    fn remove_object(&mut self, handle: ObjectHandle, scene: &mut NativeScene) -> bool {
        match handle {
            ObjectHandle::Array(h) => self.arrays.remove(h).is_some(),
            ObjectHandle::Camera(h) => self.cameras.remove(h).is_some(),
            ObjectHandle::Geometry(h) => self.geometries.remove(h).is_some(),
            ObjectHandle::Light(h) => self.lights.remove(h).map(|mut l| l.release(scene)).is_some(),
            ObjectHandle::Material(h) => {
                self.materials.remove(h).map(|mut m| m.release(scene)).is_some()
            }
            ObjectHandle::Sampler(h) => self.samplers.remove(h).is_some(),
            ObjectHandle::SpatialField(h) => self.fields.remove(h).is_some(),
            ObjectHandle::Volume(h) => self.volumes.remove(h).map(|mut v| v.release(scene)).is_some(),
            ObjectHandle::Surface(h) => {
                self.surfaces.remove(h).map(|mut s| s.release(scene)).is_some()
            }
            ObjectHandle::Group(h) => self.groups.remove(h).is_some(),
            ObjectHandle::Instance(h) => self.instances.remove(h).is_some(),
            ObjectHandle::World(h) => self.worlds.remove(h).is_some(),
            ObjectHandle::Renderer(h) => self.renderers.remove(h).is_some(),
            ObjectHandle::Frame(h) => self.frames.remove(h).is_some(),
        }
    }
}
