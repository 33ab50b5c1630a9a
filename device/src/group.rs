//! Collections of surfaces, volumes and lights.
//!
//! A group creates no native state of its own. World synchronization asks
//! it to place its members into the native scene under a transform.

use anari_cycles_core::DataType;
use anari_cycles_core::math::{Box3, Mat4};

use crate::object::{ArrayHandle, Object, ObjectBase, ObjectHandle};
use crate::store::SceneView;
use crate::world::WorldSync;

#[derive(Debug, Clone)]
pub struct Group {
    base: ObjectBase,
    surfaces: Option<ArrayHandle>,
    volumes: Option<ArrayHandle>,
    lights: Option<ArrayHandle>,
}

impl Group {
    pub fn new() -> Self {
        Self {
            base: ObjectBase::new(DataType::Group, ""),
            surfaces: None,
            volumes: None,
            lights: None,
        }
    }

    fn members<'v>(array: Option<ArrayHandle>, view: &SceneView<'v>) -> &'v [ObjectHandle] {
        array
            .and_then(|h| view.arrays.get(h))
            .map(|a| a.objects())
            .unwrap_or(&[])
    }

    /// Adds a native object per valid member, transformed by `xfm`.
    pub fn expand(&self, view: &SceneView<'_>, xfm: &Mat4, sync: &mut WorldSync<'_>) {
        for handle in Self::members(self.surfaces, view) {
            let Some(surface) = handle.as_surface().and_then(|h| view.surfaces.get(h)) else {
                continue;
            };
            if !surface.is_valid(view.geometries, view.materials, view.arrays) {
                surface.warn_if_unknown_children(view.geometries, view.materials);
                continue;
            }
            if let Some(node) = surface.native_node() {
                sync.add_geometry(node, *xfm);
            }
        }

        for handle in Self::members(self.volumes, view) {
            let Some(volume) = handle.as_volume().and_then(|h| view.volumes.get(h)) else {
                continue;
            };
            if !volume.is_valid(view.fields, view.arrays) {
                volume.warn_if_unknown();
                continue;
            }
            if let Some(node) = volume.native_node() {
                sync.add_geometry(node, volume.object_transform(view.fields, xfm));
            }
        }

        for handle in Self::members(self.lights, view) {
            let Some(light) = handle.as_light().and_then(|h| view.lights.get(h)) else {
                continue;
            };
            if !light.is_valid() {
                light.warn_if_unknown();
                continue;
            }
            sync.add_light(light, xfm);
        }
    }

    /// Union of valid surface and volume bounds in group space.
    pub fn bounds(&self, view: &SceneView<'_>) -> Box3 {
        let mut bounds = Box3::empty();
        for handle in Self::members(self.surfaces, view) {
            let Some(surface) = handle.as_surface().and_then(|h| view.surfaces.get(h)) else {
                continue;
            };
            if surface.is_valid(view.geometries, view.materials, view.arrays) {
                bounds.extend_box(&surface.bounds(view.geometries, view.arrays));
            } else {
                surface.warn_if_unknown_children(view.geometries, view.materials);
            }
        }
        for handle in Self::members(self.volumes, view) {
            let Some(volume) = handle.as_volume().and_then(|h| view.volumes.get(h)) else {
                continue;
            };
            if volume.is_valid(view.fields, view.arrays) {
                bounds.extend_box(&volume.bounds(view.fields, view.arrays));
            } else {
                volume.warn_if_unknown();
            }
        }
        bounds
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl Object for Group {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        let array = |name: &str| params.get_object(name).and_then(|h| h.as_array());
        self.surfaces = array("surface");
        self.volumes = array("volume");
        self.lights = array("light");
    }

    fn observed(&self) -> Vec<ObjectHandle> {
        [self.surfaces, self.volumes, self.lights]
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
    use crate::geometry::Geometry;
    use crate::light::Light;
    use crate::native::scene::NativeScene;
    use crate::store::ObjectStore;
    use crate::surface::Surface;

    #[test]
    fn test_invalid_members_are_skipped() {
        let mut scene = NativeScene::new();
        let mut store = ObjectStore::new();
        let geometry = store.geometries.insert(Geometry::new("cone"));
        let mut surface = Surface::new();
        surface.base_mut().params_mut().set("geometry", geometry.into());
        surface.commit_parameters();
        let surface = store.surfaces.insert(surface);
        let light = store.lights.insert(Light::new("spot", &mut scene));

        let surfaces = store
            .arrays
            .insert(Array::from_objects(DataType::Surface, &[surface.into()]));
        let lights = store
            .arrays
            .insert(Array::from_objects(DataType::Light, &[light.into()]));
        let mut group = Group::new();
        group.base_mut().params_mut().set("surface", surfaces.into());
        group.base_mut().params_mut().set("light", lights.into());
        group.commit_parameters();
        assert_eq!(group.observed().len(), 2);

        let view = store.view();
        assert!(group.bounds(&view).is_empty());

        let mut sync = WorldSync::begin(&mut scene);
        group.expand(&view, &Mat4::identity(), &mut sync);
        sync.finish();
        assert_eq!(scene.object_count(), 0);
    }

    #[test]
    fn test_stale_array_has_no_members() {
        let mut store = ObjectStore::new();
        let surfaces = store
            .arrays
            .insert(Array::from_objects(DataType::Surface, &[]));
        store.arrays.remove(surfaces);
        assert!(Group::members(Some(surfaces), &store.view()).is_empty());
        assert!(Group::members(None, &store.view()).is_empty());
    }
}
