//! Structured regular scalar fields.
//!
//! Like [`Geometry`](crate::geometry::Geometry), a field only describes
//! its native volume node; the owning [`Volume`](crate::volume::Volume)
//! creates the node and asks the field to sync voxels into it.

use anari_cycles_core::math::{Box3, Mat4, Vec3, mat4_from_scale, mat4_from_translation};
use anari_cycles_core::{Arena, DataType};

use crate::array::Array;
use crate::image_loader::VolumeImageLoader;
use crate::native::scene::{GeometryData, GeometryId, NativeScene, VolumeGrid};
use crate::object::{ArrayHandle, Object, ObjectBase, ObjectHandle, warn_unknown_subtype};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialFieldKind {
    StructuredRegular,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct SpatialField {
    base: ObjectBase,
    kind: SpatialFieldKind,
    data: Option<ArrayHandle>,
    origin: Vec3,
    spacing: Vec3,
}

impl SpatialField {
    pub fn new(subtype: &str) -> Self {
        let kind = match subtype {
            "structuredRegular" => SpatialFieldKind::StructuredRegular,
            _ => {
                warn_unknown_subtype(DataType::SpatialField, subtype);
                SpatialFieldKind::Unknown
            }
        };
        Self {
            base: ObjectBase::new(DataType::SpatialField, subtype),
            kind,
            data: None,
            origin: Vec3::zeros(),
            spacing: Vec3::repeat(1.0),
        }
    }

    pub fn kind(&self) -> SpatialFieldKind {
        self.kind
    }

    pub fn is_valid(&self, arrays: &Arena<Array>) -> bool {
        self.kind != SpatialFieldKind::Unknown
            && self
                .data
                .and_then(|h| arrays.get(h))
                .is_some_and(|a| !a.is_empty())
    }

    pub fn finalize(&self) {
        if self.kind != SpatialFieldKind::Unknown && self.data.is_none() {
            log::warn!("missing required parameter 'data' on 'structuredRegular' field");
        }
    }

    fn dims(&self, arrays: &Arena<Array>) -> Option<[usize; 3]> {
        self.data.and_then(|h| arrays.get(h)).map(Array::dims)
    }

    /// World-space box spanned by the voxel centers.
    pub fn bounds(&self, arrays: &Arena<Array>) -> Box3 {
        if self.kind == SpatialFieldKind::Unknown {
            return Box3::empty();
        }
        let Some(dims) = self.dims(arrays) else {
            return Box3::empty();
        };
        let extent = Vec3::new(
            dims[0].saturating_sub(1) as f32,
            dims[1].saturating_sub(1) as f32,
            dims[2].saturating_sub(1) as f32,
        );
        Box3::new(self.origin, self.origin + extent.component_mul(&self.spacing))
    }

    /// Maps native voxel space onto the field's world placement.
    pub fn object_transform(&self) -> Mat4 {
        mat4_from_translation(self.origin - self.spacing * 0.5) * mat4_from_scale(self.spacing)
    }

    pub fn create_node(&self, scene: &mut NativeScene) -> Option<GeometryId> {
        match self.kind {
            SpatialFieldKind::StructuredRegular => Some(
                scene.create_geometry("ANARI Volume", GeometryData::Volume(VolumeGrid::default())),
            ),
            SpatialFieldKind::Unknown => None,
        }
    }

    /// Uploads the `data` array as the node's voxel image.
    pub fn sync_node(&self, scene: &mut NativeScene, id: GeometryId, arrays: &Arena<Array>) {
        let Some(data) = self.data.and_then(|h| arrays.get(h)) else {
            log::warn!("structuredRegular field sync detected missing voxel data");
            return;
        };
        let image = scene
            .images_mut()
            .add_image(Box::new(VolumeImageLoader::new(data)));
        if let Err(err) = scene.set_volume_image(id, data.dims(), Some(image)) {
            log::error!("failed to attach voxel image to volume node: {}", err);
            scene.images_mut().remove_image(image);
        }
    }
}

impl Object for SpatialField {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        self.data = params.get_object("data").and_then(|h| h.as_array());
        self.origin = params.get_or("origin", Vec3::zeros());
        self.spacing = params.get_or("spacing", Vec3::repeat(1.0));
    }

    fn observed(&self) -> Vec<ObjectHandle> {
        self.data.map(ObjectHandle::from).into_iter().collect()
    }

    fn is_unknown(&self) -> bool {
        self.kind == SpatialFieldKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anari_cycles_core::math::transform_point;

    fn field_with_data(arrays: &mut Arena<Array>, dims: [usize; 3]) -> SpatialField {
        let n = dims.iter().product::<usize>();
        let h = arrays.insert(Array::from_slice(dims, &vec![0.5f32; n]));
        let mut field = SpatialField::new("structuredRegular");
        field.base_mut().params_mut().set("data", h.into());
        field.base_mut().params_mut().set("origin", [1.0f32, 0.0, 0.0].into());
        field.base_mut().params_mut().set("spacing", [2.0f32, 1.0, 1.0].into());
        field.commit_parameters();
        field
    }

    #[test]
    fn test_bounds_include_origin() {
        let mut arrays = Arena::new();
        let field = field_with_data(&mut arrays, [3, 2, 2]);
        assert!(field.is_valid(&arrays));
        let b = field.bounds(&arrays);
        assert_eq!(b.lower, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(b.upper, Vec3::new(5.0, 1.0, 1.0));
    }

    #[test]
    fn test_missing_data_is_invalid() {
        let arrays = Arena::new();
        let field = SpatialField::new("structuredRegular");
        field.finalize();
        assert!(!field.is_valid(&arrays));
        assert!(field.bounds(&arrays).is_empty());
    }

    #[test]
    fn test_object_transform_maps_voxel_centers() {
        let mut arrays = Arena::new();
        let field = field_with_data(&mut arrays, [3, 2, 2]);
        let m = field.object_transform();
        let first = transform_point(&m, &Vec3::repeat(0.5));
        let last = transform_point(&m, &Vec3::new(2.5, 1.5, 1.5));
        assert!((first - Vec3::new(1.0, 0.0, 0.0)).norm() < 1e-6);
        assert!((last - Vec3::new(5.0, 1.0, 1.0)).norm() < 1e-6);
    }

    #[test]
    fn test_sync_node_attaches_image() {
        let mut arrays = Arena::new();
        let field = field_with_data(&mut arrays, [2, 2, 2]);
        let mut scene = NativeScene::new();
        let id = field.create_node(&mut scene).unwrap();
        field.sync_node(&mut scene, id, &arrays);
        field.sync_node(&mut scene, id, &arrays);

        let Some(GeometryData::Volume(grid)) = scene.geometry(id).map(|g| &g.data) else {
            panic!("expected a volume node");
        };
        assert_eq!(grid.dims, [2, 2, 2]);
        assert!(scene.images().is_loaded(grid.voxels().unwrap()));
        assert_eq!(scene.images().len(), 1);
    }

    #[test]
    fn test_unknown_subtype() {
        let field = SpatialField::new("unstructured");
        let mut scene = NativeScene::new();
        assert!(field.is_unknown());
        assert!(field.create_node(&mut scene).is_none());
    }
}
