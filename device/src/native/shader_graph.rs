//! Shader node graphs.
//!
//! A [`ShaderGraph`] is a set of typed nodes with named sockets. Constant
//! values live on input sockets; links run from one node's output to
//! another node's input, and an input carries at most one link. Node 0 is
//! always the graph output, with a `Surface` and a `Volume` closure input.
//!
//! # Example
//!
//! ```
//! use anari_cycles::native::shader_graph::{NodeKind, ShaderGraph, SocketValue};
//!
//! let mut graph = ShaderGraph::new();
//! let emission = graph.add(NodeKind::Emission);
//! graph.set(emission.input("Strength"), SocketValue::Float(4.0)).unwrap();
//! graph
//!     .connect(emission.output("Emission"), graph.output().input("Surface"))
//!     .unwrap();
//! assert_eq!(graph.node_count(), 2);
//! ```

use std::collections::HashMap;

use anari_cycles_core::math::Vec3;

use super::image::{Extension, ImageHandle, Interpolation};
use crate::error::NativeError;

/// Type carried by a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    Float,
    Color,
    Vector,
    Closure,
}

impl SocketType {
    fn name(&self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Color => "color",
            Self::Vector => "vector",
            Self::Closure => "closure",
        }
    }
}

/// Constant stored on an unlinked input socket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SocketValue {
    Float(f32),
    Color(Vec3),
    Vector(Vec3),
    /// Closure inputs hold no constant.
    Closure,
}

impl SocketValue {
    /// Convert to the storage form of a socket of type `ty`.
    fn coerce(self, ty: SocketType) -> SocketValue {
        match (self, ty) {
            (_, SocketType::Closure) => SocketValue::Closure,
            (SocketValue::Float(f), SocketType::Float) => SocketValue::Float(f),
            (SocketValue::Float(f), SocketType::Color) => SocketValue::Color(Vec3::repeat(f)),
            (SocketValue::Float(f), SocketType::Vector) => SocketValue::Vector(Vec3::repeat(f)),
            (SocketValue::Color(v) | SocketValue::Vector(v), SocketType::Float) => {
                SocketValue::Float((v.x + v.y + v.z) / 3.0)
            }
            (SocketValue::Color(v) | SocketValue::Vector(v), SocketType::Color) => {
                SocketValue::Color(v)
            }
            (SocketValue::Color(v) | SocketValue::Vector(v), SocketType::Vector) => {
                SocketValue::Vector(v)
            }
            (SocketValue::Closure, SocketType::Float) => SocketValue::Float(0.0),
            (SocketValue::Closure, SocketType::Color) => SocketValue::Color(Vec3::zeros()),
            (SocketValue::Closure, SocketType::Vector) => SocketValue::Vector(Vec3::zeros()),
        }
    }
}

impl From<f32> for SocketValue {
    fn from(v: f32) -> Self {
        SocketValue::Float(v)
    }
}

/// Compile-time socket default.
#[derive(Debug, Clone, Copy)]
enum SocketDefault {
    Float(f32),
    Color([f32; 3]),
    Vector([f32; 3]),
    Closure,
}

impl SocketDefault {
    fn socket_type(&self) -> SocketType {
        match self {
            Self::Float(_) => SocketType::Float,
            Self::Color(_) => SocketType::Color,
            Self::Vector(_) => SocketType::Vector,
            Self::Closure => SocketType::Closure,
        }
    }

    fn value(&self) -> SocketValue {
        match *self {
            Self::Float(f) => SocketValue::Float(f),
            Self::Color(c) => SocketValue::Color(Vec3::from(c)),
            Self::Vector(v) => SocketValue::Vector(Vec3::from(v)),
            Self::Closure => SocketValue::Closure,
        }
    }
}

/// Math node operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Minimum,
    Maximum,
    Power,
}

/// Vector math node operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMathOp {
    Add,
    Subtract,
    Multiply,
    Scale,
    DotProduct,
    Normalize,
}

/// Node type plus its non-socket settings.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Output,
    PrincipledBsdf,
    Attribute {
        attribute: String,
    },
    SeparateColor,
    SeparateXyz,
    CombineXyz,
    CombineRgb,
    Math {
        op: MathOp,
        clamp: bool,
    },
    VectorMath {
        op: VectorMathOp,
    },
    /// Point mapping: `rotate(v * Scale) + Location`, Euler XYZ rotation.
    Mapping,
    TextureCoordinate,
    ImageTexture {
        image: Option<ImageHandle>,
        interpolation: Interpolation,
        extension: [Extension; 2],
    },
    /// Equirectangular environment lookup.
    EnvironmentTexture {
        image: Option<ImageHandle>,
    },
    MapRange {
        clamp: bool,
    },
    RgbRamp {
        ramp: Vec<Vec3>,
        alpha: Vec<f32>,
        interpolate: bool,
    },
    Emission,
    Background,
    LightPath,
    MixClosure,
    PrincipledVolume,
    /// Axis-angle rotation around `Center`.
    VectorRotate,
    NormalMap,
}

impl NodeKind {
    /// Human readable node type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::PrincipledBsdf => "principled_bsdf",
            Self::Attribute { .. } => "attribute",
            Self::SeparateColor => "separate_color",
            Self::SeparateXyz => "separate_xyz",
            Self::CombineXyz => "combine_xyz",
            Self::CombineRgb => "combine_rgb",
            Self::Math { .. } => "math",
            Self::VectorMath { .. } => "vector_math",
            Self::Mapping => "mapping",
            Self::TextureCoordinate => "texture_coordinate",
            Self::ImageTexture { .. } => "image_texture",
            Self::EnvironmentTexture { .. } => "environment_texture",
            Self::MapRange { .. } => "map_range",
            Self::RgbRamp { .. } => "rgb_ramp",
            Self::Emission => "emission",
            Self::Background => "background",
            Self::LightPath => "light_path",
            Self::MixClosure => "mix_closure",
            Self::PrincipledVolume => "principled_volume",
            Self::VectorRotate => "vector_rotate",
            Self::NormalMap => "normal_map",
        }
    }

    fn inputs(&self) -> &'static [(&'static str, SocketDefault)] {
        use SocketDefault::*;
        match self {
            Self::Output => &[("Surface", Closure), ("Volume", Closure)],
            Self::PrincipledBsdf => &[
                ("Base Color", Color([0.8, 0.8, 0.8])),
                ("Alpha", Float(1.0)),
                ("Roughness", Float(0.5)),
                ("Metallic", Float(0.0)),
                ("Coat Weight", Float(0.0)),
                ("Coat Roughness", Float(0.03)),
                ("Emission Color", Color([1.0, 1.0, 1.0])),
                ("Emission Strength", Float(0.0)),
                ("Transmission Weight", Float(0.0)),
                ("IOR", Float(1.5)),
                ("Normal", Vector([0.0, 0.0, 0.0])),
            ],
            Self::Attribute { .. } => &[],
            Self::SeparateColor => &[("Color", Color([0.8, 0.8, 0.8]))],
            Self::SeparateXyz => &[("Vector", Vector([0.0, 0.0, 0.0]))],
            Self::CombineXyz => &[("X", Float(0.0)), ("Y", Float(0.0)), ("Z", Float(0.0))],
            Self::CombineRgb => &[("R", Float(0.0)), ("G", Float(0.0)), ("B", Float(0.0))],
            Self::Math { .. } => &[("Value1", Float(0.5)), ("Value2", Float(0.5))],
            Self::VectorMath { .. } => &[
                ("Vector1", Vector([0.0, 0.0, 0.0])),
                ("Vector2", Vector([0.0, 0.0, 0.0])),
                ("Scale", Float(1.0)),
            ],
            Self::Mapping => &[
                ("Vector", Vector([0.0, 0.0, 0.0])),
                ("Location", Vector([0.0, 0.0, 0.0])),
                ("Rotation", Vector([0.0, 0.0, 0.0])),
                ("Scale", Vector([1.0, 1.0, 1.0])),
            ],
            Self::TextureCoordinate => &[],
            Self::ImageTexture { .. } => &[("Vector", Vector([0.0, 0.0, 0.0]))],
            Self::EnvironmentTexture { .. } => &[("Vector", Vector([0.0, 0.0, 0.0]))],
            Self::MapRange { .. } => &[
                ("Value", Float(1.0)),
                ("From Min", Float(0.0)),
                ("From Max", Float(1.0)),
                ("To Min", Float(0.0)),
                ("To Max", Float(1.0)),
            ],
            Self::RgbRamp { .. } => &[("Fac", Float(0.0))],
            Self::Emission => &[("Color", Color([0.8, 0.8, 0.8])), ("Strength", Float(1.0))],
            Self::Background => &[("Color", Color([0.8, 0.8, 0.8])), ("Strength", Float(1.0))],
            Self::LightPath => &[],
            Self::MixClosure => &[("Fac", Float(0.5)), ("Closure1", Closure), ("Closure2", Closure)],
            Self::PrincipledVolume => &[
                ("Color", Color([0.5, 0.5, 0.5])),
                ("Density", Float(1.0)),
                ("Anisotropy", Float(0.0)),
            ],
            Self::VectorRotate => &[
                ("Vector", Vector([0.0, 0.0, 0.0])),
                ("Center", Vector([0.0, 0.0, 0.0])),
                ("Axis", Vector([0.0, 0.0, 1.0])),
                ("Angle", Float(0.0)),
            ],
            Self::NormalMap => &[("Strength", Float(1.0)), ("Color", Color([0.5, 0.5, 1.0]))],
        }
    }

    fn outputs(&self) -> &'static [(&'static str, SocketType)] {
        use SocketType::*;
        match self {
            Self::Output => &[],
            Self::PrincipledBsdf => &[("BSDF", Closure)],
            Self::Attribute { .. } => &[
                ("Color", Color),
                ("Vector", Vector),
                ("Fac", Float),
                ("Alpha", Float),
            ],
            Self::SeparateColor => &[("Red", Float), ("Green", Float), ("Blue", Float)],
            Self::SeparateXyz => &[("X", Float), ("Y", Float), ("Z", Float)],
            Self::CombineXyz => &[("Vector", Vector)],
            Self::CombineRgb => &[("Image", Color)],
            Self::Math { .. } => &[("Value", Float)],
            Self::VectorMath { .. } => &[("Vector", Vector), ("Value", Float)],
            Self::Mapping => &[("Vector", Vector)],
            Self::TextureCoordinate => &[
                ("Generated", Vector),
                ("Normal", Vector),
                ("UV", Vector),
                ("Object", Vector),
            ],
            Self::ImageTexture { .. } => &[("Color", Color), ("Alpha", Float)],
            Self::EnvironmentTexture { .. } => &[("Color", Color), ("Alpha", Float)],
            Self::MapRange { .. } => &[("Result", Float)],
            Self::RgbRamp { .. } => &[("Color", Color), ("Alpha", Float)],
            Self::Emission => &[("Emission", Closure)],
            Self::Background => &[("Background", Closure)],
            Self::LightPath => &[
                ("Is Camera Ray", Float),
                ("Is Shadow Ray", Float),
                ("Is Diffuse Ray", Float),
            ],
            Self::MixClosure => &[("Closure", Closure)],
            Self::PrincipledVolume => &[("Volume", Closure)],
            Self::VectorRotate => &[("Vector", Vector)],
            Self::NormalMap => &[("Normal", Vector)],
        }
    }
}

/// Index of a node within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }

    /// Reference one of this node's outputs.
    pub fn output(self, name: &'static str) -> OutputRef {
        OutputRef { node: self, name }
    }

    /// Reference one of this node's inputs.
    pub fn input(self, name: &'static str) -> InputRef {
        InputRef { node: self, name }
    }
}

/// A node output socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub node: NodeId,
    pub name: &'static str,
}

/// A node input socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputRef {
    pub node: NodeId,
    pub name: &'static str,
}

/// A node input with its current constant.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSlot {
    pub name: &'static str,
    pub socket_type: SocketType,
    pub value: SocketValue,
}

/// A graph node.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderNode {
    pub kind: NodeKind,
    inputs: Vec<InputSlot>,
}

impl ShaderNode {
    fn new(kind: NodeKind) -> Self {
        let inputs = kind
            .inputs()
            .iter()
            .map(|(name, default)| InputSlot {
                name,
                socket_type: default.socket_type(),
                value: default.value(),
            })
            .collect();
        Self { kind, inputs }
    }

    pub fn inputs(&self) -> &[InputSlot] {
        &self.inputs
    }

    fn input_slot(&self, name: &str) -> Option<&InputSlot> {
        self.inputs.iter().find(|s| s.name == name)
    }

    fn output_type(&self, name: &str) -> Option<SocketType> {
        self.kind
            .outputs()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
    }
}

/// Node graph owned by one shader.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderGraph {
    nodes: Vec<ShaderNode>,
    links: HashMap<InputRef, OutputRef>,
}

impl ShaderGraph {
    /// Creates a graph holding only the output node.
    pub fn new() -> Self {
        Self {
            nodes: vec![ShaderNode::new(NodeKind::Output)],
            links: HashMap::new(),
        }
    }

    /// The graph output node.
    pub fn output(&self) -> NodeId {
        NodeId(0)
    }

    /// Adds a node and returns its id.
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(ShaderNode::new(kind));
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> Option<&ShaderNode> {
        self.nodes.get(id.0)
    }

    /// Mutable access to a node's settings.
    pub fn kind_mut(&mut self, id: NodeId) -> Result<&mut NodeKind, NativeError> {
        self.nodes
            .get_mut(id.0)
            .map(|n| &mut n.kind)
            .ok_or(NativeError::UnknownNode(id.0))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &ShaderNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    fn input_type(&self, input: InputRef) -> Result<SocketType, NativeError> {
        let node = self
            .nodes
            .get(input.node.0)
            .ok_or(NativeError::UnknownNode(input.node.0))?;
        node.input_slot(input.name)
            .map(|s| s.socket_type)
            .ok_or_else(|| NativeError::UnknownSocket {
                node: node.kind.type_name(),
                socket: input.name.to_string(),
            })
    }

    fn output_type(&self, output: OutputRef) -> Result<SocketType, NativeError> {
        let node = self
            .nodes
            .get(output.node.0)
            .ok_or(NativeError::UnknownNode(output.node.0))?;
        node.output_type(output.name)
            .ok_or_else(|| NativeError::UnknownSocket {
                node: node.kind.type_name(),
                socket: output.name.to_string(),
            })
    }

    /// Sets the constant of an input socket, converting to its type.
    pub fn set(&mut self, input: InputRef, value: SocketValue) -> Result<(), NativeError> {
        let ty = self.input_type(input)?;
        let node = &mut self.nodes[input.node.0];
        if let Some(slot) = node.inputs.iter_mut().find(|s| s.name == input.name) {
            slot.value = value.coerce(ty);
        }
        Ok(())
    }

    /// The constant currently stored on an input socket.
    pub fn value(&self, input: InputRef) -> Option<SocketValue> {
        self.nodes
            .get(input.node.0)?
            .input_slot(input.name)
            .map(|s| s.value)
    }

    /// Links `from` into `to`.
    ///
    /// Fails if `to` is already linked; callers disconnect first.
    pub fn connect(&mut self, from: OutputRef, to: InputRef) -> Result<(), NativeError> {
        let from_ty = self.output_type(from)?;
        let to_ty = self.input_type(to)?;
        if (from_ty == SocketType::Closure) != (to_ty == SocketType::Closure) {
            return Err(NativeError::SocketTypeMismatch {
                from: from_ty.name(),
                to: to_ty.name(),
            });
        }
        if self.links.contains_key(&to) {
            return Err(NativeError::InputAlreadyLinked {
                node: to.node.0,
                socket: to.name,
            });
        }
        self.links.insert(to, from);
        Ok(())
    }

    /// Removes the link into `to`, returning whether one existed.
    pub fn disconnect(&mut self, to: InputRef) -> Result<bool, NativeError> {
        self.input_type(to)?;
        Ok(self.links.remove(&to).is_some())
    }

    /// The output linked into `to`, if any.
    pub fn link(&self, to: InputRef) -> Option<OutputRef> {
        self.links.get(&to).copied()
    }
}

impl Default for ShaderGraph {
    fn default() -> Self {
        Self::new()
    }
}
