//! Transformed placements of a group.

use anari_cycles_core::DataType;
use anari_cycles_core::math::{Box3, Mat4, mat4_from_cols_array};

use crate::object::{ArrayHandle, GroupHandle, Object, ObjectBase, ObjectHandle};
use crate::store::SceneView;
use crate::world::WorldSync;

/// A group placed once per transform.
///
/// `transform` may be a single matrix or an array of matrices; the array
/// takes precedence and instances the group once per element.
#[derive(Debug, Clone)]
pub struct Instance {
    base: ObjectBase,
    group: Option<GroupHandle>,
    transforms: Option<ArrayHandle>,
    transform: Mat4,
}

impl Instance {
    pub fn new() -> Self {
        Self {
            base: ObjectBase::new(DataType::Instance, ""),
            group: None,
            transforms: None,
            transform: Mat4::identity(),
        }
    }

    pub fn group(&self) -> Option<GroupHandle> {
        self.group
    }

    pub fn is_valid(&self, view: &SceneView<'_>) -> bool {
        self.group.is_some_and(|h| view.groups.contains(h))
    }

    /// Every transform this instance places its group under.
    pub fn transforms(&self, view: &SceneView<'_>) -> Vec<Mat4> {
        match self.transforms.and_then(|h| view.arrays.get(h)) {
            Some(array) => (0..array.len())
                .filter_map(|i| array.get::<[f32; 16]>(i))
                .map(|m| mat4_from_cols_array(&m))
                .collect(),
            None => vec![self.transform],
        }
    }

    pub fn expand(&self, view: &SceneView<'_>, sync: &mut WorldSync<'_>) {
        let Some(group) = self.group.and_then(|h| view.groups.get(h)) else {
            return;
        };
        for xfm in self.transforms(view) {
            group.expand(view, &xfm, sync);
        }
    }

    /// Group bounds pushed through each transform.
    pub fn bounds(&self, view: &SceneView<'_>) -> Box3 {
        let mut bounds = Box3::empty();
        let Some(group) = self.group.and_then(|h| view.groups.get(h)) else {
            return bounds;
        };
        let local = group.bounds(view);
        for xfm in self.transforms(view) {
            bounds.extend_box(&local.transformed(&xfm));
        }
        bounds
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

impl Object for Instance {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        self.group = params.get_object("group").and_then(|h| h.as_group());
        self.transforms = params.get_object("transform").and_then(|h| h.as_array());
        self.transform = params.get_or("transform", Mat4::identity());
    }

    fn observed(&self) -> Vec<ObjectHandle> {
        self.group
            .map(ObjectHandle::from)
            .into_iter()
            .chain(self.transforms.map(ObjectHandle::from))
            .collect()
    }
}
