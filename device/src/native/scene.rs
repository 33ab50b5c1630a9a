//! Native scene: shaders, lights, geometry, objects and camera.
//!
//! ANARI objects translate themselves into nodes of this scene. Nodes are
//! addressed by arena handles; deleting a node invalidates its handle and
//! drops every object instance that referenced it. Changes are recorded
//! as [`UpdateFlags`] and consumed by the session in [`NativeScene::device_update`].

use std::collections::HashMap;

use anari_cycles_core::arena::{Arena, Handle};
use anari_cycles_core::math::{Mat4, Vec2, Vec3, Vec4, radians};
use bitflags::bitflags;

use super::image::{ImageHandle, ImageManager};
use super::shader_graph::{NodeKind, ShaderGraph};
use crate::error::NativeError;

bitflags! {
    /// Scene managers that need to re-upload data.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UpdateFlags: u32 {
        const OBJECTS = 1 << 0;
        const GEOMETRY = 1 << 1;
        const LIGHTS = 1 << 2;
        const SHADERS = 1 << 3;
        const BACKGROUND = 1 << 4;
        const CAMERA = 1 << 5;
        /// Managers whose change requires a new acceleration structure.
        const UPDATE_ALL = Self::OBJECTS.bits() | Self::GEOMETRY.bits() | Self::LIGHTS.bits();
    }
}

/// A shader node graph with a name.
#[derive(Debug, Clone)]
pub struct Shader {
    pub name: String,
    graph: ShaderGraph,
    need_update: bool,
}

impl Shader {
    pub fn graph(&self) -> &ShaderGraph {
        &self.graph
    }

    pub fn need_update(&self) -> bool {
        self.need_update
    }
}

pub type ShaderId = Handle<Shader>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    /// Parallel light travelling along the object's `-Z`.
    Distant,
    /// Environment light driven by the background shader.
    Background,
}

#[derive(Debug, Clone)]
pub struct LightNode {
    pub light_type: LightType,
    pub strength: Vec3,
    /// Emission shader, the scene default light when `None`.
    pub shader: Option<ShaderId>,
    need_update: bool,
}

impl LightNode {
    pub fn new(light_type: LightType) -> Self {
        Self {
            light_type,
            strength: Vec3::repeat(1.0),
            shader: None,
            need_update: true,
        }
    }
}

pub type LightId = Handle<LightNode>;

/// Per-element attribute values.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    Float(Vec<f32>),
    Float2(Vec<Vec2>),
    Float3(Vec<Vec3>),
}

impl AttributeData {
    /// Element `i` widened to `float4`.
    pub fn get(&self, i: usize) -> Option<Vec4> {
        match self {
            Self::Float(v) => v.get(i).map(|x| Vec4::new(*x, *x, *x, 1.0)),
            Self::Float2(v) => v.get(i).map(|x| Vec4::new(x.x, x.y, 0.0, 1.0)),
            Self::Float3(v) => v.get(i).map(|x| Vec4::new(x.x, x.y, x.z, 1.0)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Float2(v) => v.len(),
            Self::Float3(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named attributes of one geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    attributes: HashMap<String, AttributeData>,
}

impl AttributeSet {
    pub fn insert(&mut self, name: &str, data: AttributeData) {
        self.attributes.insert(name.to_string(), data);
    }

    pub fn get(&self, name: &str) -> Option<&AttributeData> {
        self.attributes.get(name)
    }

    pub fn clear(&mut self) {
        self.attributes.clear();
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Triangle mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub verts: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    pub attributes: AttributeSet,
}

impl Mesh {
    pub fn clear(&mut self) {
        self.verts.clear();
        self.triangles.clear();
        self.attributes.clear();
    }
}

/// Sphere set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Vec3>,
    pub radius: Vec<f32>,
    pub attributes: AttributeSet,
}

impl PointCloud {
    pub fn clear(&mut self) {
        self.points.clear();
        self.radius.clear();
        self.attributes.clear();
    }
}

/// Voxel box spanning voxel centers, `[0.5, dims - 0.5]` in voxel units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeGrid {
    pub dims: [usize; 3],
    voxels: Option<ImageHandle>,
}

impl VolumeGrid {
    pub fn voxels(&self) -> Option<ImageHandle> {
        self.voxels
    }

    pub fn box_min(&self) -> Vec3 {
        Vec3::repeat(0.5)
    }

    pub fn box_max(&self) -> Vec3 {
        Vec3::new(
            self.dims[0] as f32 - 0.5,
            self.dims[1] as f32 - 0.5,
            self.dims[2] as f32 - 0.5,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeometryData {
    Mesh(Mesh),
    PointCloud(PointCloud),
    Volume(VolumeGrid),
}

#[derive(Debug, Clone)]
pub struct GeometryNode {
    pub name: String,
    pub data: GeometryData,
    pub used_shaders: Vec<ShaderId>,
    need_update: bool,
}

impl GeometryNode {
    pub fn need_update(&self) -> bool {
        self.need_update
    }
}

pub type GeometryId = Handle<GeometryNode>;

/// What an object instance places in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectSource {
    Geometry(GeometryId),
    Light(LightId),
}

/// Instanced geometry or light with its object-to-world transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    pub source: ObjectSource,
    pub tfm: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraType {
    Perspective,
    Orthographic,
}

/// Screen window in camera space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewplane {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraNode {
    /// Camera-to-world transform; the camera looks along its `+Z` column.
    pub matrix: Mat4,
    pub camera_type: CameraType,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub viewplane: Viewplane,
    pub full_width: u32,
    pub full_height: u32,
}

impl Default for CameraNode {
    fn default() -> Self {
        Self {
            matrix: Mat4::identity(),
            camera_type: CameraType::Perspective,
            fov: radians(60.0),
            viewplane: Viewplane {
                left: -1.0,
                right: 1.0,
                bottom: -1.0,
                top: 1.0,
            },
            full_width: 64,
            full_height: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassType {
    Combined,
    Depth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pass {
    pub name: String,
    pub pass_type: PassType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Integrator {
    pub use_adaptive_sampling: bool,
    pub transparent_max_bounce: u32,
}

impl Default for Integrator {
    fn default() -> Self {
        Self {
            use_adaptive_sampling: false,
            transparent_max_bounce: 8,
        }
    }
}

/// Release every image a graph holds.
fn release_graph_images(images: &mut ImageManager, graph: &ShaderGraph) {
    for (_, node) in graph.nodes() {
        match &node.kind {
            NodeKind::ImageTexture { image: Some(h), .. }
            | NodeKind::EnvironmentTexture { image: Some(h) } => images.remove_image(*h),
            _ => {}
        }
    }
}

/// The scene handed to the renderer.
pub struct NativeScene {
    shaders: Arena<Shader>,
    lights: Arena<LightNode>,
    geometry: Arena<GeometryNode>,
    objects: Vec<ObjectNode>,
    passes: Vec<Pass>,
    pub camera: CameraNode,
    pub integrator: Integrator,
    background_shader: Option<ShaderId>,
    default_background: ShaderId,
    default_light: ShaderId,
    images: ImageManager,
    updates: UpdateFlags,
}

impl NativeScene {
    /// Creates a scene with empty default background and light shaders.
    pub fn new() -> Self {
        let mut shaders = Arena::new();
        let default_background = shaders.insert(Shader {
            name: "default_background".to_string(),
            graph: ShaderGraph::new(),
            need_update: true,
        });
        let default_light = shaders.insert(Shader {
            name: "default_light".to_string(),
            graph: ShaderGraph::new(),
            need_update: true,
        });
        Self {
            shaders,
            lights: Arena::new(),
            geometry: Arena::new(),
            objects: Vec::new(),
            passes: Vec::new(),
            camera: CameraNode::default(),
            integrator: Integrator::default(),
            background_shader: None,
            default_background,
            default_light,
            images: ImageManager::new(),
            updates: UpdateFlags::all(),
        }
    }

    // Shaders

    pub fn create_shader(&mut self, name: &str, graph: ShaderGraph) -> ShaderId {
        self.updates |= UpdateFlags::SHADERS;
        self.shaders.insert(Shader {
            name: name.to_string(),
            graph,
            need_update: true,
        })
    }

    pub fn shader(&self, id: ShaderId) -> Option<&Shader> {
        self.shaders.get(id)
    }

    /// Replaces a shader's graph, releasing images the old graph held.
    pub fn set_shader_graph(&mut self, id: ShaderId, graph: ShaderGraph) -> Result<(), NativeError> {
        let shader = self
            .shaders
            .get_mut(id)
            .ok_or(NativeError::StaleHandle("shader"))?;
        let old = std::mem::replace(&mut shader.graph, graph);
        shader.need_update = true;
        release_graph_images(&mut self.images, &old);
        self.updates |= UpdateFlags::SHADERS;
        Ok(())
    }

    /// Deletes a shader and detaches it from lights, geometry and the background.
    pub fn delete_shader(&mut self, id: ShaderId) -> bool {
        if id == self.default_background || id == self.default_light {
            return false;
        }
        let Some(shader) = self.shaders.remove(id) else {
            return false;
        };
        release_graph_images(&mut self.images, &shader.graph);
        for (_, light) in self.lights.iter_mut() {
            if light.shader == Some(id) {
                light.shader = None;
            }
        }
        for (_, geom) in self.geometry.iter_mut() {
            geom.used_shaders.retain(|s| *s != id);
        }
        if self.background_shader == Some(id) {
            self.background_shader = None;
            self.updates |= UpdateFlags::BACKGROUND;
        }
        self.updates |= UpdateFlags::SHADERS;
        true
    }

    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }

    pub fn default_background(&self) -> ShaderId {
        self.default_background
    }

    pub fn default_light(&self) -> ShaderId {
        self.default_light
    }

    /// Points the background at `shader`, or at the default when `None`.
    pub fn set_background_shader(&mut self, shader: Option<ShaderId>) {
        self.background_shader = shader;
        self.updates |= UpdateFlags::BACKGROUND;
    }

    pub fn background_shader(&self) -> ShaderId {
        self.background_shader
            .filter(|s| self.shaders.contains(*s))
            .unwrap_or(self.default_background)
    }

    // Lights

    pub fn create_light(&mut self, light: LightNode) -> LightId {
        self.updates |= UpdateFlags::LIGHTS;
        self.lights.insert(light)
    }

    pub fn light(&self, id: LightId) -> Option<&LightNode> {
        self.lights.get(id)
    }

    /// Mutable light access; marks the light for update.
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut LightNode> {
        let light = self.lights.get_mut(id)?;
        light.need_update = true;
        self.updates |= UpdateFlags::LIGHTS;
        Some(light)
    }

    pub fn delete_light(&mut self, id: LightId) -> bool {
        if self.lights.remove(id).is_none() {
            return false;
        }
        self.objects.retain(|o| o.source != ObjectSource::Light(id));
        self.updates |= UpdateFlags::LIGHTS | UpdateFlags::OBJECTS;
        true
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    // Geometry

    pub fn create_geometry(&mut self, name: &str, data: GeometryData) -> GeometryId {
        self.updates |= UpdateFlags::GEOMETRY;
        self.geometry.insert(GeometryNode {
            name: name.to_string(),
            data,
            used_shaders: Vec::new(),
            need_update: true,
        })
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&GeometryNode> {
        self.geometry.get(id)
    }

    pub fn geometry_mut(&mut self, id: GeometryId) -> Option<&mut GeometryNode> {
        self.geometry.get_mut(id)
    }

    pub fn tag_geometry_update(&mut self, id: GeometryId) {
        if let Some(geom) = self.geometry.get_mut(id) {
            geom.need_update = true;
            self.updates |= UpdateFlags::GEOMETRY;
        }
    }

    /// Swaps the voxel image of a volume geometry, releasing the old one.
    pub fn set_volume_image(
        &mut self,
        id: GeometryId,
        dims: [usize; 3],
        voxels: Option<ImageHandle>,
    ) -> Result<(), NativeError> {
        let geom = self
            .geometry
            .get_mut(id)
            .ok_or(NativeError::StaleHandle("geometry"))?;
        let old = match &mut geom.data {
            GeometryData::Volume(grid) => {
                grid.dims = dims;
                std::mem::replace(&mut grid.voxels, voxels)
            }
            data => {
                *data = GeometryData::Volume(VolumeGrid { dims, voxels });
                None
            }
        };
        geom.need_update = true;
        if let Some(old) = old {
            self.images.remove_image(old);
        }
        self.updates |= UpdateFlags::GEOMETRY;
        Ok(())
    }

    pub fn delete_geometry(&mut self, id: GeometryId) -> bool {
        let Some(geom) = self.geometry.remove(id) else {
            return false;
        };
        if let GeometryData::Volume(VolumeGrid {
            voxels: Some(image),
            ..
        }) = geom.data
        {
            self.images.remove_image(image);
        }
        self.objects.retain(|o| o.source != ObjectSource::Geometry(id));
        self.updates |= UpdateFlags::GEOMETRY | UpdateFlags::OBJECTS;
        true
    }

    pub fn geometry_count(&self) -> usize {
        self.geometry.len()
    }

    pub fn geometry_iter(&self) -> impl Iterator<Item = (GeometryId, &GeometryNode)> {
        self.geometry.iter()
    }

    // Objects

    pub fn add_object(&mut self, source: ObjectSource, tfm: Mat4) {
        self.objects.push(ObjectNode { source, tfm });
        self.updates |= UpdateFlags::OBJECTS;
    }

    pub fn clear_objects(&mut self) {
        self.objects.clear();
        self.updates |= UpdateFlags::OBJECTS;
    }

    pub fn objects(&self) -> &[ObjectNode] {
        &self.objects
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // Passes

    pub fn add_pass(&mut self, name: &str, pass_type: PassType) {
        self.passes.push(Pass {
            name: name.to_string(),
            pass_type,
        });
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    // Images

    pub fn images(&self) -> &ImageManager {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut ImageManager {
        &mut self.images
    }

    // Updates

    pub fn tag_update(&mut self, flags: UpdateFlags) {
        self.updates |= flags;
    }

    pub fn pending_updates(&self) -> UpdateFlags {
        self.updates
    }

    /// Clears every node's update flag and returns the accumulated changes.
    pub fn device_update(&mut self) -> UpdateFlags {
        for (_, shader) in self.shaders.iter_mut() {
            shader.need_update = false;
        }
        for (_, light) in self.lights.iter_mut() {
            light.need_update = false;
        }
        for (_, geom) in self.geometry.iter_mut() {
            geom.need_update = false;
        }
        std::mem::replace(&mut self.updates, UpdateFlags::empty())
    }
}

impl Default for NativeScene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_geometry_prunes_objects() {
        let mut scene = NativeScene::new();
        let g = scene.create_geometry("mesh", GeometryData::Mesh(Mesh::default()));
        let l = scene.create_light(LightNode::new(LightType::Distant));
        scene.add_object(ObjectSource::Geometry(g), Mat4::identity());
        scene.add_object(ObjectSource::Light(l), Mat4::identity());
        assert_eq!(scene.object_count(), 2);

        assert!(scene.delete_geometry(g));
        assert!(!scene.delete_geometry(g));
        assert_eq!(scene.object_count(), 1);
        assert_eq!(scene.objects()[0].source, ObjectSource::Light(l));
    }

    #[test]
    fn test_device_update_consumes_flags() {
        let mut scene = NativeScene::new();
        scene.device_update();
        assert!(scene.pending_updates().is_empty());

        let g = scene.create_geometry("points", GeometryData::PointCloud(PointCloud::default()));
        scene.device_update();
        assert!(!scene.geometry(g).unwrap().need_update());

        scene.tag_geometry_update(g);
        assert!(scene.geometry(g).unwrap().need_update());
        assert_eq!(scene.device_update(), UpdateFlags::GEOMETRY);
    }

    #[test]
    fn test_delete_shader_detaches() {
        let mut scene = NativeScene::new();
        let s = scene.create_shader("light", ShaderGraph::new());
        let l = scene.create_light(LightNode::new(LightType::Background));
        scene.light_mut(l).unwrap().shader = Some(s);
        scene.set_background_shader(Some(s));
        assert_eq!(scene.background_shader(), s);

        assert!(scene.delete_shader(s));
        assert_eq!(scene.light(l).unwrap().shader, None);
        assert_eq!(scene.background_shader(), scene.default_background());
        assert!(!scene.delete_shader(scene.default_light()));
    }

    #[test]
    fn test_attribute_widening() {
        let data = AttributeData::Float2(vec![Vec2::new(0.5, 0.25)]);
        assert_eq!(data.get(0), Some(Vec4::new(0.5, 0.25, 0.0, 1.0)));
        assert_eq!(data.get(1), None);
    }
}
