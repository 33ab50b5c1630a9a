//! Triangle and sphere geometry.
//!
//! A [`Geometry`] only describes how to build a native node. The owning
//! [`Surface`](crate::surface::Surface) creates the node and asks the
//! geometry to sync its arrays into it.

use anari_cycles_core::math::{Box3, Vec2, Vec3};
use anari_cycles_core::{Arena, DataType};

use crate::array::Array;
use crate::native::scene::{AttributeData, GeometryData, GeometryId, Mesh, NativeScene, PointCloud};
use crate::object::{ArrayHandle, Object, ObjectBase, ObjectHandle, warn_unknown_subtype};

/// Generic per-vertex attribute slots a material can read.
pub const VERTEX_ATTRIBUTES: [&str; 4] = [
    "vertex.attribute0",
    "vertex.attribute1",
    "vertex.attribute2",
    "vertex.attribute3",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Triangle,
    Sphere,
    Unknown,
}

impl GeometryKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Triangle => "triangle",
            Self::Sphere => "sphere",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct VertexArrays {
    index: Option<ArrayHandle>,
    position: Option<ArrayHandle>,
    normal: Option<ArrayHandle>,
    color: Option<ArrayHandle>,
    attributes: [Option<ArrayHandle>; 4],
    radius: Option<ArrayHandle>,
}

#[derive(Debug, Clone)]
pub struct Geometry {
    base: ObjectBase,
    kind: GeometryKind,
    arrays: VertexArrays,
    radius: f32,
}

impl Geometry {
    pub fn new(subtype: &str) -> Self {
        let kind = match subtype {
            "triangle" => GeometryKind::Triangle,
            "sphere" => GeometryKind::Sphere,
            _ => {
                warn_unknown_subtype(DataType::Geometry, subtype);
                GeometryKind::Unknown
            }
        };
        Self {
            base: ObjectBase::new(DataType::Geometry, subtype),
            kind,
            arrays: VertexArrays::default(),
            radius: 1.0,
        }
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    /// Known subtype with a live position array.
    pub fn is_valid(&self, arrays: &Arena<Array>) -> bool {
        self.kind != GeometryKind::Unknown
            && self
                .arrays
                .position
                .and_then(|h| arrays.get(h))
                .is_some_and(|a| !a.is_empty())
    }

    /// Logs the missing-position warning for a known subtype.
    pub fn finalize(&self) {
        if self.kind != GeometryKind::Unknown && self.arrays.position.is_none() {
            log::warn!(
                "missing required parameter 'vertex.position' on {} geometry",
                self.kind.label()
            );
        }
    }

    /// Creates an empty native node of the right shape.
    pub fn create_node(&self, scene: &mut NativeScene) -> Option<GeometryId> {
        let data = match self.kind {
            GeometryKind::Triangle => GeometryData::Mesh(Mesh::default()),
            GeometryKind::Sphere => GeometryData::PointCloud(PointCloud::default()),
            GeometryKind::Unknown => return None,
        };
        Some(scene.create_geometry(&format!("ANARI {}", self.kind.label()), data))
    }

    /// Rewrites the node's vertex data and attributes from the bound arrays.
    pub fn sync_node(&self, scene: &mut NativeScene, id: GeometryId, arrays: &Arena<Array>) {
        let position = self.arrays.position.and_then(|h| arrays.get(h));
        if position.is_none() {
            log::warn!(
                "{} geometry sync detected incomplete geometry",
                self.kind.label()
            );
        }
        let Some(node) = scene.geometry_mut(id) else {
            return;
        };
        match (self.kind, &mut node.data) {
            (GeometryKind::Triangle, GeometryData::Mesh(mesh)) => {
                mesh.clear();
                if let Some(position) = position {
                    self.sync_mesh(mesh, position, arrays);
                }
            }
            (GeometryKind::Sphere, GeometryData::PointCloud(points)) => {
                points.clear();
                if let Some(position) = position {
                    self.sync_points(points, position, arrays);
                }
            }
            _ => log::warn!(
                "{} geometry cannot sync into native node '{}'",
                self.kind.label(),
                node.name
            ),
        }
    }

    fn sync_mesh(&self, mesh: &mut Mesh, position: &Array, arrays: &Arena<Array>) {
        let vertex_count = position.len();
        mesh.verts = (0..vertex_count).map(|i| position.float4(i).xyz()).collect();

        let index = self.arrays.index.and_then(|h| arrays.get(h));
        mesh.triangles = match index {
            Some(index) if index.element_type() == DataType::UInt32Vec3 => {
                (0..index.len()).filter_map(|i| index.get::<[u32; 3]>(i)).collect()
            }
            other => {
                if let Some(index) = other {
                    log::warn!(
                        "ignoring 'primitive.index' of type {} on triangle geometry",
                        index.element_type()
                    );
                }
                (0..(vertex_count / 3) as u32)
                    .map(|t| [3 * t, 3 * t + 1, 3 * t + 2])
                    .collect()
            }
        };

        if let Some(normal) = self.arrays.normal.and_then(|h| arrays.get(h)) {
            let data = (0..normal.len()).map(|i| normal.float4(i).xyz()).collect();
            mesh.attributes.insert("vertex.normal", AttributeData::Float3(data));
        }
        if let Some(color) = self.arrays.color.and_then(|h| arrays.get(h)) {
            let data = (0..color.len()).map(|i| color.float4(i).xyz()).collect();
            mesh.attributes.insert("vertex.color", AttributeData::Float3(data));
        }
        for (name, handle) in VERTEX_ATTRIBUTES.iter().zip(self.arrays.attributes) {
            let Some(array) = handle.and_then(|h| arrays.get(h)) else {
                continue;
            };
            let data = (0..vertex_count)
                .map(|i| {
                    let v = array.float4(i);
                    Vec2::new(v.x, v.y)
                })
                .collect();
            mesh.attributes.insert(name, AttributeData::Float2(data));
        }
    }

    fn sync_points(&self, points: &mut PointCloud, position: &Array, arrays: &Arena<Array>) {
        let index = self
            .arrays
            .index
            .and_then(|h| arrays.get(h))
            .and_then(|a| a.to_vec::<u32>());
        let order: Vec<usize> = match index {
            Some(index) => index.into_iter().map(|i| i as usize).collect(),
            None => (0..position.len()).collect(),
        };
        let radius = self.arrays.radius.and_then(|h| arrays.get(h));

        points.points = order.iter().map(|&i| position.float4(i).xyz()).collect();
        points.radius = order
            .iter()
            .map(|&i| radius.and_then(|r| r.get::<f32>(i)).unwrap_or(self.radius))
            .collect();

        let sources = std::iter::once(("vertex.color", self.arrays.color))
            .chain(VERTEX_ATTRIBUTES.iter().copied().zip(self.arrays.attributes));
        for (name, handle) in sources {
            let Some(array) = handle.and_then(|h| arrays.get(h)) else {
                continue;
            };
            let data = order.iter().map(|&i| array.float4(i).xyz()).collect();
            points.attributes.insert(name, AttributeData::Float3(data));
        }
    }

    /// Union of the vertex positions. Sphere radii are not included.
    pub fn bounds(&self, arrays: &Arena<Array>) -> Box3 {
        let mut bounds = Box3::empty();
        if let Some(position) = self.arrays.position.and_then(|h| arrays.get(h)) {
            for i in 0..position.len() {
                let p: Vec3 = position.float4(i).xyz();
                bounds.extend_point(&p);
            }
        }
        bounds
    }
}

impl Object for Geometry {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        let array = |name: &str| params.get_object(name).and_then(|h| h.as_array());
        let mut arrays = VertexArrays {
            index: array("primitive.index"),
            position: array("vertex.position"),
            color: array("vertex.color"),
            attributes: VERTEX_ATTRIBUTES.map(|name| array(name)),
            ..VertexArrays::default()
        };
        match self.kind {
            GeometryKind::Triangle => arrays.normal = array("vertex.normal"),
            GeometryKind::Sphere => arrays.radius = array("vertex.radius"),
            GeometryKind::Unknown => {}
        }
        self.radius = params.get_or("radius", 1.0);
        self.arrays = arrays;
    }

    fn observed(&self) -> Vec<ObjectHandle> {
        let a = &self.arrays;
        [a.index, a.position, a.normal, a.color, a.radius]
            .into_iter()
            .chain(a.attributes)
            .flatten()
            .map(ObjectHandle::from)
            .collect()
    }

    fn is_unknown(&self) -> bool {
        self.kind == GeometryKind::Unknown
    }
}
