//! Matte and physically based materials.
//!
//! Every finalize rebuilds the material's shader graph from scratch: five
//! vertex attribute sources, the principled BSDF, and one sampler chain per
//! sampler bound to any input. Each BSDF input is then wired to a sampler
//! output, an attribute source or a constant.

use std::collections::HashMap;

use anari_cycles_core::math::Vec3;
use anari_cycles_core::{Arena, DataType};

use crate::array::Array;
use crate::error::NativeError;
use crate::native::image::ImageManager;
use crate::native::scene::{NativeScene, ShaderId};
use crate::native::shader_graph::{InputRef, NodeId, NodeKind, OutputRef, ShaderGraph, SocketValue};
use crate::object::{Object, ObjectBase, ObjectHandle, SamplerHandle, warn_unknown_subtype};
use crate::params::{ParamValue, ParameterSet};
use crate::sampler::{Sampler, SamplerOutputs};
use crate::state::FinalizeContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Matte,
    PhysicallyBased,
    Unknown,
}

/// Where a BSDF input takes its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Constant(Vec3),
    /// `"color"` or `"attribute0"` .. `"attribute3"`.
    Attribute(String),
    Sampler(SamplerHandle),
}

/// A material parameter feeding one BSDF socket.
#[derive(Debug, Clone, Copy)]
struct InputSpec {
    param: &'static str,
    socket: &'static str,
    default: [f32; 3],
    /// Reads a single channel rather than a color.
    scalar: bool,
}

const fn color(param: &'static str, socket: &'static str, default: [f32; 3]) -> InputSpec {
    InputSpec {
        param,
        socket,
        default,
        scalar: false,
    }
}

const fn scalar(param: &'static str, socket: &'static str, default: f32) -> InputSpec {
    InputSpec {
        param,
        socket,
        default: [default; 3],
        scalar: true,
    }
}

const MATTE_INPUTS: &[InputSpec] = &[
    color("color", "Base Color", [0.8, 0.8, 0.8]),
    scalar("opacity", "Alpha", 1.0),
];

const PBR_INPUTS: &[InputSpec] = &[
    color("baseColor", "Base Color", [0.8, 0.8, 0.8]),
    scalar("opacity", "Alpha", 1.0),
    scalar("roughness", "Roughness", 1.0),
    scalar("metallic", "Metallic", 1.0),
    scalar("clearcoat", "Coat Weight", 0.0),
    scalar("clearcoatRoughness", "Coat Roughness", 0.0),
    color("emissive", "Emission Color", [0.0, 0.0, 0.0]),
    scalar("transmission", "Transmission Weight", 0.0),
];

/// Reads a parameter that may hold a constant, an attribute name or a sampler.
fn read_binding(params: &ParameterSet, spec: &InputSpec) -> Binding {
    let default = Vec3::from(spec.default);
    match params.raw(spec.param) {
        Some(ParamValue::String(name)) => Binding::Attribute(name.clone()),
        Some(ParamValue::Object(h)) => match h.as_sampler() {
            Some(sampler) => Binding::Sampler(sampler),
            None => Binding::Constant(default),
        },
        Some(_) if spec.scalar => {
            Binding::Constant(Vec3::repeat(params.get_or(spec.param, spec.default[0])))
        }
        Some(_) => Binding::Constant(params.get_or(spec.param, default)),
        None => Binding::Constant(default),
    }
}

/// Outputs of one vertex attribute source.
#[derive(Debug, Clone, Copy)]
struct AttributeSource {
    color: OutputRef,
    scalar: OutputRef,
}

/// The five attribute sources every material graph starts with.
#[derive(Debug, Clone, Copy)]
struct AttributeNodes {
    vertex_color: AttributeSource,
    attributes: [AttributeSource; 4],
}

impl AttributeNodes {
    fn build(graph: &mut ShaderGraph) -> Result<Self, NativeError> {
        let mut source = |name: &str| -> Result<AttributeSource, NativeError> {
            let attr = graph.add(NodeKind::Attribute {
                attribute: name.to_string(),
            });
            let separate = graph.add(NodeKind::SeparateColor);
            graph.connect(attr.output("Color"), separate.input("Color"))?;
            Ok(AttributeSource {
                color: attr.output("Color"),
                scalar: separate.output("Red"),
            })
        };
        Ok(Self {
            vertex_color: source("vertex.color")?,
            attributes: [
                source("vertex.attribute0")?,
                source("vertex.attribute1")?,
                source("vertex.attribute2")?,
                source("vertex.attribute3")?,
            ],
        })
    }

    fn get(&self, mode: &str) -> Option<AttributeSource> {
        match mode {
            "color" => Some(self.vertex_color),
            "attribute0" => Some(self.attributes[0]),
            "attribute1" => Some(self.attributes[1]),
            "attribute2" => Some(self.attributes[2]),
            "attribute3" => Some(self.attributes[3]),
            _ => None,
        }
    }
}

/// Graph under construction plus the sampler chains emitted so far.
struct GraphBuilder<'a> {
    graph: ShaderGraph,
    attributes: AttributeNodes,
    sampler_outputs: HashMap<SamplerHandle, Option<SamplerOutputs>>,
    samplers: &'a Arena<Sampler>,
    arrays: &'a Arena<Array>,
    images: &'a mut ImageManager,
}

impl GraphBuilder<'_> {
    /// Sampler chain for `handle`, built on first use.
    fn sampler(&mut self, handle: SamplerHandle) -> Result<Option<SamplerOutputs>, NativeError> {
        if let Some(outputs) = self.sampler_outputs.get(&handle) {
            return Ok(*outputs);
        }
        let outputs = match self.samplers.get(handle) {
            Some(sampler) if sampler.is_valid(self.arrays) => {
                sampler.build_nodes(&mut self.graph, self.images, self.arrays)?
            }
            Some(sampler) => {
                sampler.warn_if_unknown();
                None
            }
            None => None,
        };
        self.sampler_outputs.insert(handle, outputs);
        Ok(outputs)
    }

    /// Rewires `input` to `binding`, falling back to `fallback` when the
    /// binding cannot be resolved.
    fn connect_attributes(
        &mut self,
        input: InputRef,
        binding: &Binding,
        fallback: Vec3,
        scalar: bool,
    ) -> Result<(), NativeError> {
        self.graph.disconnect(input)?;
        let source = match binding {
            Binding::Sampler(handle) => self
                .sampler(*handle)?
                .map(|s| if scalar { s.scalar } else { s.color }),
            Binding::Attribute(mode) => self
                .attributes
                .get(mode)
                .map(|a| if scalar { a.scalar } else { a.color }),
            Binding::Constant(_) => None,
        };
        if let Some(source) = source {
            return self.graph.connect(source, input);
        }
        let value = match binding {
            Binding::Constant(v) => *v,
            _ => fallback,
        };
        let value = if scalar {
            SocketValue::Float(value.x)
        } else {
            SocketValue::Color(value)
        };
        self.graph.set(input, value)
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    base: ObjectBase,
    kind: MaterialKind,
    bindings: Vec<Binding>,
    normal: Option<SamplerHandle>,
    ior: f32,
    shader: Option<ShaderId>,
}

impl Material {
    pub fn new(subtype: &str, scene: &mut NativeScene) -> Self {
        let kind = match subtype {
            "matte" => MaterialKind::Matte,
            "physicallyBased" => MaterialKind::PhysicallyBased,
            _ => {
                warn_unknown_subtype(DataType::Material, subtype);
                MaterialKind::Unknown
            }
        };
        let shader = (kind != MaterialKind::Unknown)
            .then(|| scene.create_shader(&format!("ANARI {}", subtype), ShaderGraph::new()));
        let mut material = Self {
            base: ObjectBase::new(DataType::Material, subtype),
            kind,
            bindings: Vec::new(),
            normal: None,
            ior: 1.5,
            shader,
        };
        material.commit_parameters();
        material
    }

    fn input_specs(&self) -> &'static [InputSpec] {
        match self.kind {
            MaterialKind::Matte => MATTE_INPUTS,
            MaterialKind::PhysicallyBased => PBR_INPUTS,
            MaterialKind::Unknown => &[],
        }
    }

    pub fn kind(&self) -> MaterialKind {
        self.kind
    }

    pub fn shader(&self) -> Option<ShaderId> {
        self.shader
    }

    pub fn is_valid(&self) -> bool {
        self.kind != MaterialKind::Unknown
    }

    /// Samplers bound to any input.
    pub fn samplers(&self) -> impl Iterator<Item = SamplerHandle> + '_ {
        self.bindings
            .iter()
            .filter_map(|b| match b {
                Binding::Sampler(h) => Some(*h),
                _ => None,
            })
            .chain(self.normal)
    }

    pub fn finalize(
        &mut self,
        ctx: &mut FinalizeContext<'_>,
        samplers: &Arena<Sampler>,
        arrays: &Arena<Array>,
    ) {
        let Some(shader) = self.shader else {
            return;
        };
        let graph = match self.build_graph(ctx.scene.images_mut(), samplers, arrays) {
            Ok(graph) => graph,
            Err(err) => {
                log::error!("failed to build {} material graph: {}", self.base.subtype(), err);
                return;
            }
        };
        if let Err(err) = ctx.scene.set_shader_graph(shader, graph) {
            log::error!("failed to install {} material graph: {}", self.base.subtype(), err);
        }
    }

    fn build_graph(
        &self,
        images: &mut ImageManager,
        samplers: &Arena<Sampler>,
        arrays: &Arena<Array>,
    ) -> Result<ShaderGraph, NativeError> {
        let mut graph = ShaderGraph::new();
        let attributes = AttributeNodes::build(&mut graph)?;
        let mut builder = GraphBuilder {
            graph,
            attributes,
            sampler_outputs: HashMap::new(),
            samplers,
            arrays,
            images,
        };

        let bsdf = builder.graph.add(NodeKind::PrincipledBsdf);
        let output = builder.graph.output();
        builder
            .graph
            .connect(bsdf.output("BSDF"), output.input("Surface"))?;
        self.set_fixed_inputs(&mut builder.graph, bsdf)?;

        for (spec, binding) in self.input_specs().iter().zip(&self.bindings) {
            builder.connect_attributes(
                bsdf.input(spec.socket),
                binding,
                Vec3::from(spec.default),
                spec.scalar,
            )?;
        }
        if let Some(normal) = self.normal {
            if let Some(outputs) = builder.sampler(normal)? {
                builder.graph.disconnect(bsdf.input("Normal"))?;
                builder.graph.connect(outputs.normal, bsdf.input("Normal"))?;
            }
        }
        Ok(builder.graph)
    }

    fn set_fixed_inputs(&self, graph: &mut ShaderGraph, bsdf: NodeId) -> Result<(), NativeError> {
        match self.kind {
            MaterialKind::Matte => {
                graph.set(bsdf.input("Roughness"), SocketValue::Float(1.0))?;
                graph.set(bsdf.input("Metallic"), SocketValue::Float(0.0))?;
                graph.set(bsdf.input("Coat Weight"), SocketValue::Float(0.0))?;
                graph.set(bsdf.input("Transmission Weight"), SocketValue::Float(0.0))?;
            }
            MaterialKind::PhysicallyBased => {
                graph.set(bsdf.input("Emission Strength"), SocketValue::Float(1.0))?;
                graph.set(bsdf.input("IOR"), SocketValue::Float(self.ior))?;
            }
            MaterialKind::Unknown => {}
        }
        Ok(())
    }

    pub fn release(&mut self, scene: &mut NativeScene) {
        if let Some(shader) = self.shader.take() {
            scene.delete_shader(shader);
        }
    }
}

impl Object for Material {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        self.bindings = self
            .input_specs()
            .iter()
            .map(|spec| read_binding(params, spec))
            .collect();
        self.normal = match self.kind {
            MaterialKind::PhysicallyBased => params.get_object("normal").and_then(|h| h.as_sampler()),
            _ => None,
        };
        self.ior = params.get_or("ior", 1.5);
    }

    fn observed(&self) -> Vec<ObjectHandle> {
        self.samplers().map(ObjectHandle::from).collect()
    }

    fn is_unknown(&self) -> bool {
        self.kind == MaterialKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChangeStamps;
    use anari_cycles_core::Clock;

    struct Fixture {
        scene: NativeScene,
        clock: Clock,
        stamps: ChangeStamps,
        arrays: Arena<Array>,
        samplers: Arena<Sampler>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                scene: NativeScene::new(),
                clock: Clock::new(),
                stamps: ChangeStamps::default(),
                arrays: Arena::new(),
                samplers: Arena::new(),
            }
        }

        fn sampler(&mut self) -> SamplerHandle {
            let image = self.arrays.insert(Array::from_slice([1, 1, 1], &[[0.5f32; 4]]));
            let mut sampler = Sampler::new("image2D");
            sampler.base_mut().params_mut().set("image", image.into());
            sampler.commit_parameters();
            self.samplers.insert(sampler)
        }

        fn finalize(&mut self, material: &mut Material) {
            let mut ctx = FinalizeContext {
                scene: &mut self.scene,
                clock: &mut self.clock,
                stamps: &mut self.stamps,
            };
            material.finalize(&mut ctx, &self.samplers, &self.arrays);
        }

        fn graph(&self, material: &Material) -> &ShaderGraph {
            self.scene.shader(material.shader().unwrap()).unwrap().graph()
        }
    }

    fn bsdf(graph: &ShaderGraph) -> NodeId {
        graph
            .nodes()
            .find(|(_, n)| n.kind == NodeKind::PrincipledBsdf)
            .map(|(id, _)| id)
            .unwrap()
    }

    #[test]
    fn test_matte_constant_color() {
        let mut fx = Fixture::new();
        let mut material = Material::new("matte", &mut fx.scene);
        material.base_mut().params_mut().set("color", [1.0f32, 0.0, 0.0].into());
        material.commit_parameters();
        fx.finalize(&mut material);

        let graph = fx.graph(&material);
        let bsdf = bsdf(graph);
        assert_eq!(
            graph.value(bsdf.input("Base Color")),
            Some(SocketValue::Color(Vec3::new(1.0, 0.0, 0.0)))
        );
        assert_eq!(graph.link(bsdf.input("Base Color")), None);
        assert_eq!(graph.value(bsdf.input("Roughness")), Some(SocketValue::Float(1.0)));
    }

    #[test]
    fn test_attribute_binding() {
        let mut fx = Fixture::new();
        let mut material = Material::new("matte", &mut fx.scene);
        material.base_mut().params_mut().set("color", "color".into());
        material.base_mut().params_mut().set("opacity", "attribute2".into());
        material.commit_parameters();
        fx.finalize(&mut material);

        let graph = fx.graph(&material);
        let bsdf = bsdf(graph);
        let color = graph.link(bsdf.input("Base Color")).unwrap();
        assert_eq!(color.name, "Color");
        assert_eq!(
            graph.node(color.node).map(|n| &n.kind),
            Some(&NodeKind::Attribute {
                attribute: "vertex.color".to_string()
            })
        );
        let opacity = graph.link(bsdf.input("Alpha")).unwrap();
        assert_eq!(opacity.name, "Red");
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut fx = Fixture::new();
        let sampler = fx.sampler();
        let mut material = Material::new("physicallyBased", &mut fx.scene);
        material.base_mut().params_mut().set("baseColor", sampler.into());
        material.base_mut().params_mut().set("roughness", sampler.into());
        material.commit_parameters();

        fx.finalize(&mut material);
        let first = fx.graph(&material).clone();
        let images = fx.scene.images().len();
        fx.finalize(&mut material);

        assert_eq!(fx.graph(&material), &first);
        assert_eq!(fx.scene.images().len(), images);
        assert_eq!(fx.scene.shader_count(), 3);
    }

    #[test]
    fn test_sampler_chain_shared_between_inputs() {
        let mut fx = Fixture::new();
        let sampler = fx.sampler();
        let mut material = Material::new("physicallyBased", &mut fx.scene);
        material.base_mut().params_mut().set("baseColor", sampler.into());
        material.base_mut().params_mut().set("metallic", sampler.into());
        material.commit_parameters();
        fx.finalize(&mut material);

        let graph = fx.graph(&material);
        let textures = graph
            .nodes()
            .filter(|(_, n)| matches!(n.kind, NodeKind::ImageTexture { .. }))
            .count();
        assert_eq!(textures, 1);
        let bsdf = bsdf(graph);
        assert!(graph.link(bsdf.input("Base Color")).is_some());
        assert_eq!(graph.link(bsdf.input("Metallic")).map(|o| o.name), Some("Red"));
        assert_eq!(material.observed(), vec![ObjectHandle::from(sampler); 2]);
    }

    #[test]
    fn test_invalid_sampler_falls_back_to_default() {
        let mut fx = Fixture::new();
        let sampler = fx.samplers.insert(Sampler::new("image2D"));
        let mut material = Material::new("matte", &mut fx.scene);
        material.base_mut().params_mut().set("color", sampler.into());
        material.commit_parameters();
        fx.finalize(&mut material);

        let graph = fx.graph(&material);
        let bsdf = bsdf(graph);
        assert_eq!(graph.link(bsdf.input("Base Color")), None);
        assert_eq!(
            graph.value(bsdf.input("Base Color")),
            Some(SocketValue::Color(Vec3::repeat(0.8)))
        );
    }

    #[test]
    fn test_release_deletes_shader() {
        let mut fx = Fixture::new();
        let mut material = Material::new("matte", &mut fx.scene);
        assert_eq!(fx.scene.shader_count(), 3);
        material.release(&mut fx.scene);
        assert_eq!(fx.scene.shader_count(), 2);
        assert!(material.shader().is_none());
    }

    #[test]
    fn test_unknown_subtype() {
        let mut scene = NativeScene::new();
        let material = Material::new("toon", &mut scene);
        assert!(!material.is_valid());
        assert!(material.shader().is_none());
        assert_eq!(scene.shader_count(), 2);
    }
}
