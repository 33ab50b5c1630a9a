//! Geometry and material pairs.

use anari_cycles_core::math::Box3;
use anari_cycles_core::{Arena, DataType};

use crate::array::Array;
use crate::geometry::Geometry;
use crate::material::Material;
use crate::native::scene::{GeometryId, NativeScene};
use crate::object::{GeometryHandle, MaterialHandle, Object, ObjectBase, ObjectHandle};
use crate::state::FinalizeContext;

/// A renderable primitive. Owns the native geometry node its geometry
/// describes.
#[derive(Debug, Clone)]
pub struct Surface {
    base: ObjectBase,
    geometry: Option<GeometryHandle>,
    material: Option<MaterialHandle>,
    geometry_changed: bool,
    material_changed: bool,
    node: Option<GeometryId>,
}

impl Surface {
    pub fn new() -> Self {
        Self {
            base: ObjectBase::new(DataType::Surface, ""),
            geometry: None,
            material: None,
            geometry_changed: false,
            material_changed: false,
            node: None,
        }
    }

    pub fn geometry(&self) -> Option<GeometryHandle> {
        self.geometry
    }

    pub fn material(&self) -> Option<MaterialHandle> {
        self.material
    }

    pub fn native_node(&self) -> Option<GeometryId> {
        self.node
    }

    /// Both the geometry and the material are live and valid.
    pub fn is_valid(
        &self,
        geometries: &Arena<Geometry>,
        materials: &Arena<Material>,
        arrays: &Arena<Array>,
    ) -> bool {
        let geometry = self.geometry.and_then(|h| geometries.get(h));
        let material = self.material.and_then(|h| materials.get(h));
        geometry.is_some_and(|g| g.is_valid(arrays)) && material.is_some_and(Material::is_valid)
    }

    /// Forwards to the children, which are what can be unknown.
    pub fn warn_if_unknown_children(
        &self,
        geometries: &Arena<Geometry>,
        materials: &Arena<Material>,
    ) {
        if let Some(geometry) = self.geometry.and_then(|h| geometries.get(h)) {
            geometry.warn_if_unknown();
        }
        if let Some(material) = self.material.and_then(|h| materials.get(h)) {
            material.warn_if_unknown();
        }
    }

    pub fn bounds(&self, geometries: &Arena<Geometry>, arrays: &Arena<Array>) -> Box3 {
        self.geometry
            .and_then(|h| geometries.get(h))
            .map(|g| g.bounds(arrays))
            .unwrap_or_else(Box3::empty)
    }

    pub fn finalize(
        &mut self,
        ctx: &mut FinalizeContext<'_>,
        geometries: &Arena<Geometry>,
        materials: &Arena<Material>,
        arrays: &Arena<Array>,
    ) {
        let geometry = self.geometry.and_then(|h| geometries.get(h));
        if self.geometry_changed {
            self.release(ctx.scene);
            self.node = geometry.and_then(|g| g.create_node(ctx.scene));
        }

        if self.is_valid(geometries, materials, arrays) {
            if let (Some(geometry), Some(node)) = (geometry, self.node) {
                geometry.sync_node(ctx.scene, node, arrays);
                if self.geometry_changed || self.material_changed {
                    let shader = self
                        .material
                        .and_then(|h| materials.get(h))
                        .and_then(Material::shader);
                    if let Some(geom) = ctx.scene.geometry_mut(node) {
                        geom.used_shaders = shader.into_iter().collect();
                    }
                }
                ctx.scene.tag_geometry_update(node);
            }
        }

        self.geometry_changed = false;
        self.material_changed = false;
    }

    /// Deletes the native geometry node.
    pub fn release(&mut self, scene: &mut NativeScene) {
        if let Some(node) = self.node.take() {
            scene.delete_geometry(node);
        }
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}

impl Object for Surface {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        let geometry = params.get_object("geometry").and_then(|h| h.as_geometry());
        let material = params.get_object("material").and_then(|h| h.as_material());
        self.geometry_changed |= geometry != self.geometry;
        self.material_changed |= material != self.material;
        self.geometry = geometry;
        self.material = material;
    }

    fn observed(&self) -> Vec<ObjectHandle> {
        self.geometry
            .map(ObjectHandle::from)
            .into_iter()
            .chain(self.material.map(ObjectHandle::from))
            .collect()
    }
}
