//! Image samplers.
//!
//! A sampler owns no shader of its own. Materials ask it to emit its node
//! chain into their graph: UV attribute, optional input mapping, image
//! lookup, optional output transform, then the color, scalar and normal
//! outputs a material input can link to.

use anari_cycles_core::math::{Mat4, Vec3, Vec4, is_identity, to_scale_rotation_translation};
use anari_cycles_core::{Arena, DataType};

use crate::array::Array;
use crate::error::NativeError;
use crate::image_loader::SamplerImageLoader;
use crate::native::image::{Extension, ImageManager, Interpolation};
use crate::native::shader_graph::{
    MathOp, NodeKind, OutputRef, ShaderGraph, SocketValue, VectorMathOp,
};
use crate::object::{ArrayHandle, Object, ObjectBase, ObjectHandle, warn_unknown_subtype};

const TRANSFORM_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    Image2D,
    Unknown,
}

/// Sockets a sampler chain exposes to the material graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerOutputs {
    pub color: OutputRef,
    /// First channel of the color.
    pub scalar: OutputRef,
    /// Color decoded as a tangent space normal.
    pub normal: OutputRef,
}

fn parse_filter(name: &str) -> Interpolation {
    match name {
        "nearest" => Interpolation::Closest,
        "linear" => Interpolation::Linear,
        other => {
            log::warn!("unknown sampler filter '{}', using 'linear'", other);
            Interpolation::Linear
        }
    }
}

fn parse_wrap(name: &str) -> Extension {
    match name {
        "clampToEdge" => Extension::Extend,
        "repeat" => Extension::Repeat,
        "mirrorRepeat" => Extension::Mirror,
        other => {
            log::warn!("unknown sampler wrap mode '{}', using 'clampToEdge'", other);
            Extension::Extend
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sampler {
    base: ObjectBase,
    kind: SamplerKind,
    image: Option<ArrayHandle>,
    in_attribute: String,
    filter: Interpolation,
    wrap: [Extension; 2],
    in_transform: Mat4,
    in_offset: Vec4,
    out_transform: Mat4,
    out_offset: Vec4,
}

impl Sampler {
    pub fn new(subtype: &str) -> Self {
        let kind = match subtype {
            "image2D" => SamplerKind::Image2D,
            _ => {
                warn_unknown_subtype(DataType::Sampler, subtype);
                SamplerKind::Unknown
            }
        };
        Self {
            base: ObjectBase::new(DataType::Sampler, subtype),
            kind,
            image: None,
            in_attribute: "attribute0".to_string(),
            filter: Interpolation::Linear,
            wrap: [Extension::Extend; 2],
            in_transform: Mat4::identity(),
            in_offset: Vec4::zeros(),
            out_transform: Mat4::identity(),
            out_offset: Vec4::zeros(),
        }
    }

    pub fn kind(&self) -> SamplerKind {
        self.kind
    }

    pub fn is_valid(&self, arrays: &Arena<Array>) -> bool {
        self.kind != SamplerKind::Unknown
            && self
                .image
                .and_then(|h| arrays.get(h))
                .is_some_and(|a| !a.is_empty())
    }

    pub fn finalize(&self) {
        if self.kind == SamplerKind::Image2D && self.image.is_none() {
            log::warn!("missing required parameter 'image' on image2D sampler");
        }
    }

    fn has_input_transform(&self) -> bool {
        !is_identity(&self.in_transform, TRANSFORM_EPSILON)
            || self.in_offset.xyz().norm() > TRANSFORM_EPSILON
    }

    fn has_output_transform(&self) -> bool {
        !is_identity(&self.out_transform, TRANSFORM_EPSILON)
            || self.out_offset.xyz().norm() > TRANSFORM_EPSILON
    }

    /// Emits this sampler's node chain into `graph`.
    ///
    /// Registers one user of the sampler image; the graph owner releases
    /// it when the graph is replaced. Returns `None` for invalid samplers.
    pub fn build_nodes(
        &self,
        graph: &mut ShaderGraph,
        images: &mut ImageManager,
        arrays: &Arena<Array>,
    ) -> Result<Option<SamplerOutputs>, NativeError> {
        if !self.is_valid(arrays) {
            return Ok(None);
        }
        let Some((image_handle, image)) = self.image.and_then(|h| Some((h, arrays.get(h)?))) else {
            return Ok(None);
        };

        let uv = graph.add(NodeKind::Attribute {
            attribute: format!("vertex.{}", self.in_attribute),
        });
        let mut coords = uv.output("Vector");

        if self.has_input_transform() {
            let (scale, rotation, translation) = to_scale_rotation_translation(&self.in_transform);
            let (rx, ry, rz) = nalgebra::UnitQuaternion::from_quaternion(rotation).euler_angles();
            let mapping = graph.add(NodeKind::Mapping);
            graph.set(mapping.input("Scale"), SocketValue::Vector(scale))?;
            graph.set(mapping.input("Rotation"), SocketValue::Vector(Vec3::new(rx, ry, rz)))?;
            graph.set(
                mapping.input("Location"),
                SocketValue::Vector(translation + self.in_offset.xyz()),
            )?;
            graph.connect(coords, mapping.input("Vector"))?;
            coords = mapping.output("Vector");
        }

        let loader = SamplerImageLoader::new(image_handle, image);
        let texture = graph.add(NodeKind::ImageTexture {
            image: Some(images.add_image(Box::new(loader))),
            interpolation: self.filter,
            extension: self.wrap,
        });
        graph.connect(coords, texture.input("Vector"))?;
        let mut color = texture.output("Color");

        if self.has_output_transform() {
            color = self.build_output_transform(graph, color)?;
        }

        let separate = graph.add(NodeKind::SeparateColor);
        graph.connect(color, separate.input("Color"))?;
        let normal_map = graph.add(NodeKind::NormalMap);
        graph.connect(color, normal_map.input("Color"))?;

        Ok(Some(SamplerOutputs {
            color,
            scalar: separate.output("Red"),
            normal: normal_map.output("Normal"),
        }))
    }

    /// `out = M * color + offset`, one dot product and add per channel.
    fn build_output_transform(
        &self,
        graph: &mut ShaderGraph,
        color: OutputRef,
    ) -> Result<OutputRef, NativeError> {
        let combine = graph.add(NodeKind::CombineRgb);
        for (row, channel) in ["R", "G", "B"].into_iter().enumerate() {
            let m = &self.out_transform;
            let coefficients = Vec3::new(m[(row, 0)], m[(row, 1)], m[(row, 2)]);
            let dot = graph.add(NodeKind::VectorMath {
                op: VectorMathOp::DotProduct,
            });
            graph.connect(color, dot.input("Vector1"))?;
            graph.set(dot.input("Vector2"), SocketValue::Vector(coefficients))?;

            let add = graph.add(NodeKind::Math {
                op: MathOp::Add,
                clamp: false,
            });
            graph.connect(dot.output("Value"), add.input("Value1"))?;
            graph.set(add.input("Value2"), SocketValue::Float(self.out_offset[row]))?;
            graph.connect(add.output("Value"), combine.input(channel))?;
        }
        Ok(combine.output("Image"))
    }
}

impl Object for Sampler {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        self.image = params.get_object("image").and_then(|h| h.as_array());
        self.in_attribute = params
            .get_string("inAttribute")
            .unwrap_or_else(|| "attribute0".to_string());
        self.filter = parse_filter(&params.get_string("filter").unwrap_or_else(|| "linear".to_string()));
        let wrap = |name: &str| {
            params
                .get_string(name)
                .map(|w| parse_wrap(&w))
                .unwrap_or(Extension::Extend)
        };
        self.wrap = [wrap("wrapMode1"), wrap("wrapMode2")];
        self.in_transform = params.get_or("inTransform", Mat4::identity());
        self.in_offset = params.get_or("inOffset", Vec4::zeros());
        self.out_transform = params.get_or("outTransform", Mat4::identity());
        self.out_offset = params.get_or("outOffset", Vec4::zeros());
    }

    fn observed(&self) -> Vec<ObjectHandle> {
        self.image.map(ObjectHandle::from).into_iter().collect()
    }

    fn is_unknown(&self) -> bool {
        self.kind == SamplerKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(arrays: &mut Arena<Array>) -> Sampler {
        let image = arrays.insert(Array::from_slice([2, 2, 1], &[[255u8, 0, 0, 255]; 4]));
        let mut sampler = Sampler::new("image2D");
        sampler.base_mut().params_mut().set("image", image.into());
        sampler.base_mut().params_mut().set("filter", "nearest".into());
        sampler.base_mut().params_mut().set("wrapMode1", "repeat".into());
        sampler.commit_parameters();
        sampler
    }

    #[test]
    fn test_parameters() {
        let mut arrays = Arena::new();
        let sampler = sampler(&mut arrays);
        assert!(sampler.is_valid(&arrays));
        assert_eq!(sampler.filter, Interpolation::Closest);
        assert_eq!(sampler.wrap, [Extension::Repeat, Extension::Extend]);
        assert!(!sampler.has_input_transform());
        assert!(!sampler.has_output_transform());
    }

    #[test]
    fn test_identity_chain_is_minimal() {
        let mut arrays = Arena::new();
        let sampler = sampler(&mut arrays);
        let mut graph = ShaderGraph::new();
        let mut images = ImageManager::new();

        let outputs = sampler
            .build_nodes(&mut graph, &mut images, &arrays)
            .unwrap()
            .unwrap();
        // output, uv attribute, texture, separate color, normal map
        assert_eq!(graph.node_count(), 5);
        assert_eq!(images.len(), 1);
        assert_eq!(outputs.scalar.name, "Red");
    }

    #[test]
    fn test_transforms_add_nodes() {
        let mut arrays = Arena::new();
        let mut sampler = sampler(&mut arrays);
        sampler.base_mut().params_mut().set("inOffset", [0.5f32, 0.0, 0.0, 0.0].into());
        sampler.base_mut().params_mut().set("outOffset", [0.1f32, 0.1, 0.1, 0.0].into());
        sampler.commit_parameters();
        let mut graph = ShaderGraph::new();
        let mut images = ImageManager::new();

        let outputs = sampler
            .build_nodes(&mut graph, &mut images, &arrays)
            .unwrap()
            .unwrap();
        // mapping plus 3 dot, 3 add and a combine node
        assert_eq!(graph.node_count(), 5 + 1 + 7);
        assert_eq!(outputs.color.name, "Image");
    }

    #[test]
    fn test_missing_image() {
        let arrays = Arena::new();
        let sampler = Sampler::new("image2D");
        sampler.finalize();
        assert!(!sampler.is_valid(&arrays));

        let mut graph = ShaderGraph::new();
        let mut images = ImageManager::new();
        let outputs = sampler
            .build_nodes(&mut graph, &mut images, &arrays)
            .unwrap();
        assert!(outputs.is_none());
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_unknown_subtype() {
        assert!(Sampler::new("image3D").is_unknown());
    }
}
