//! The top-level scene container.
//!
//! Surfaces, volumes and lights set directly on a world live in a private
//! zero group, instanced once under the identity. Its parameters mirror the
//! world's on every commit, so direct content and explicit instances go
//! through the same group expansion.

use anari_cycles_core::DataType;
use anari_cycles_core::math::{Box3, Mat4};

use crate::group::Group;
use crate::light::Light;
use crate::native::scene::{GeometryId, NativeScene, ObjectSource, ShaderId, UpdateFlags};
use crate::object::{ArrayHandle, Object, ObjectBase, ObjectHandle};
use crate::store::SceneView;

/// Accumulates native objects while a world is synchronized.
pub struct WorldSync<'s> {
    scene: &'s mut NativeScene,
    background: Option<ShaderId>,
}

impl<'s> WorldSync<'s> {
    /// Clears every native object instance.
    pub fn begin(scene: &'s mut NativeScene) -> Self {
        log::trace!("world sync: clearing objects");
        scene.clear_objects();
        Self {
            scene,
            background: None,
        }
    }

    pub fn add_geometry(&mut self, node: GeometryId, tfm: Mat4) {
        self.scene.add_object(ObjectSource::Geometry(node), tfm);
    }

    /// Places `light`; the first environment light wins the background.
    pub fn add_light(&mut self, light: &Light, xfm: &Mat4) {
        if let Some(id) = light.native_light() {
            self.scene
                .add_object(ObjectSource::Light(id), xfm * light.transform());
        }
        if self.background.is_none() {
            self.background = light.background_shader();
        }
    }

    /// Installs the background and tags the managers for a full rebuild.
    pub fn finish(self) {
        self.scene.set_background_shader(self.background);
        self.scene.tag_update(UpdateFlags::UPDATE_ALL);
        log::trace!(
            "world sync: done, {} objects",
            self.scene.object_count()
        );
    }
}

#[derive(Debug, Clone)]
pub struct World {
    base: ObjectBase,
    zero_group: Group,
    zero_surfaces: Option<ArrayHandle>,
    zero_volumes: Option<ArrayHandle>,
    zero_lights: Option<ArrayHandle>,
    instances: Option<ArrayHandle>,
}

impl World {
    pub fn new() -> Self {
        let mut zero_group = Group::new();
        zero_group.commit_parameters();
        Self {
            base: ObjectBase::new(DataType::World, ""),
            zero_group,
            zero_surfaces: None,
            zero_volumes: None,
            zero_lights: None,
            instances: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        true
    }

    pub fn zero_group(&self) -> &Group {
        &self.zero_group
    }

    fn instance_handles<'v>(&self, view: &SceneView<'v>) -> &'v [ObjectHandle] {
        self.instances
            .and_then(|h| view.arrays.get(h))
            .map(|a| a.objects())
            .unwrap_or(&[])
    }

    /// Rebuilds every native object instance from the zero group and the
    /// explicit instances.
    pub fn sync(&self, scene: &mut NativeScene, view: &SceneView<'_>) {
        let mut sync = WorldSync::begin(scene);
        log::trace!("world sync: adding zero instance");
        self.zero_group.expand(view, &Mat4::identity(), &mut sync);

        let instances = self.instance_handles(view);
        if !instances.is_empty() {
            log::trace!("world sync: adding {} instances", instances.len());
        }
        for handle in instances {
            let Some(instance) = handle.as_instance().and_then(|h| view.instances.get(h)) else {
                continue;
            };
            if instance.is_valid(view) {
                instance.expand(view, &mut sync);
            }
        }
        sync.finish();
    }

    pub fn bounds(&self, view: &SceneView<'_>) -> Box3 {
        let mut bounds = Box3::empty();
        if self.zero_surfaces.is_some() || self.zero_volumes.is_some() {
            bounds.extend_box(&self.zero_group.bounds(view));
        }
        for handle in self.instance_handles(view) {
            if let Some(instance) = handle.as_instance().and_then(|h| view.instances.get(h)) {
                bounds.extend_box(&instance.bounds(view));
            }
        }
        bounds
    }

    fn mirror(&mut self, name: &str, present: bool) {
        if present {
            log::debug!("world found {} in zero instance", name);
            if let Some(value) = self.base.params().raw(name).cloned() {
                self.zero_group.base_mut().params_mut().set(name, value);
            }
        } else {
            self.zero_group.base_mut().params_mut().remove(name);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl Object for World {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        let array = |name: &str| params.get_object(name).and_then(|h| h.as_array());
        self.zero_surfaces = array("surface");
        self.zero_volumes = array("volume");
        self.zero_lights = array("light");
        self.instances = array("instance");

        if self.zero_surfaces.is_some() || self.zero_volumes.is_some() || self.zero_lights.is_some() {
            log::debug!("world will add zero instance");
        }
        self.mirror("surface", self.zero_surfaces.is_some());
        self.mirror("light", self.zero_lights.is_some());
        self.mirror("volume", self.zero_volumes.is_some());
        self.zero_group.commit_parameters();
    }

    fn observed(&self) -> Vec<ObjectHandle> {
        [
            self.instances,
            self.zero_surfaces,
            self.zero_lights,
            self.zero_volumes,
        ]
        .into_iter()
        .flatten()
        .map(ObjectHandle::from)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array;
    use crate::params::ParamValue;
    use anari_cycles_core::Arena;

    #[test]
    fn test_zero_group_mirrors_parameters() {
        let mut arrays = Arena::new();
        let surfaces = arrays.insert(Array::from_objects(DataType::Surface, &[]));
        let mut world = World::new();

        world.base_mut().params_mut().set("surface", surfaces.into());
        world.commit_parameters();
        assert_eq!(
            world.zero_group().base().params().raw("surface"),
            Some(&ParamValue::Object(surfaces.into()))
        );
        assert_eq!(world.observed(), vec![ObjectHandle::from(surfaces)]);

        world.base_mut().params_mut().remove("surface");
        world.commit_parameters();
        assert!(!world.zero_group().base().params().contains("surface"));
        assert!(world.observed().is_empty());
    }
}
