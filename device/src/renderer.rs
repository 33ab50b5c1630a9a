//! Global shading defaults.
//!
//! The renderer owns no shader of its own. It rewrites the scene's default
//! background and default light shaders when a frame resets accumulation.

use anari_cycles_core::DataType;
use anari_cycles_core::math::{Vec3, Vec4};

use crate::error::NativeError;
use crate::native::scene::NativeScene;
use crate::native::shader_graph::{MathOp, NodeKind, ShaderGraph, SocketValue};
use crate::object::{Object, ObjectBase};

const AMBIENT_RADIANCE_SCALE: f32 = 0.1;
const AMBIENT_LIGHT_STRENGTH: f32 = 40.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PendingUpdates {
    background: bool,
    ambient_light: bool,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    base: ObjectBase,
    background: Vec4,
    ambient_color: Vec3,
    ambient_intensity: f32,
    run_async: bool,
    pending: PendingUpdates,
}

impl Renderer {
    pub fn new(subtype: &str) -> Self {
        let mut renderer = Self {
            base: ObjectBase::new(DataType::Renderer, subtype),
            background: Vec4::new(0.0, 0.0, 0.0, 1.0),
            ambient_color: Vec3::repeat(1.0),
            ambient_intensity: AMBIENT_RADIANCE_SCALE,
            run_async: true,
            pending: PendingUpdates::default(),
        };
        renderer.commit_parameters();
        renderer
    }

    pub fn is_valid(&self) -> bool {
        true
    }

    pub fn background(&self) -> Vec4 {
        self.background
    }

    pub fn run_async(&self) -> bool {
        self.run_async
    }

    /// Pushes changed defaults into the scene, or both when `force` is set.
    pub fn make_current(&mut self, scene: &mut NativeScene, force: bool) {
        if self.pending.background || force {
            self.pending.background = false;
            if let Err(err) = self.rebuild_background(scene) {
                log::error!("failed to rebuild default background shader: {}", err);
            }
        }
        if self.pending.ambient_light || force {
            self.pending.ambient_light = false;
            if let Err(err) = self.rebuild_ambient_light(scene) {
                log::error!("failed to rebuild default light shader: {}", err);
            }
        }
    }

    /// Background color for camera rays only; other rays see black.
    fn rebuild_background(&self, scene: &mut NativeScene) -> Result<(), NativeError> {
        let mut graph = ShaderGraph::new();
        let light_path = graph.add(NodeKind::LightPath);
        let combine = graph.add(NodeKind::CombineRgb);
        for (channel, value) in ["R", "G", "B"].into_iter().zip(self.background.xyz().iter()) {
            let multiply = graph.add(NodeKind::Math {
                op: MathOp::Multiply,
                clamp: false,
            });
            graph.set(multiply.input("Value1"), SocketValue::Float(*value))?;
            graph.connect(light_path.output("Is Camera Ray"), multiply.input("Value2"))?;
            graph.connect(multiply.output("Value"), combine.input(channel))?;
        }
        let background = graph.add(NodeKind::Background);
        graph.connect(combine.output("Image"), background.input("Color"))?;
        graph.connect(background.output("Background"), graph.output().input("Surface"))?;
        scene.set_shader_graph(scene.default_background(), graph)
    }

    fn rebuild_ambient_light(&self, scene: &mut NativeScene) -> Result<(), NativeError> {
        let mut graph = ShaderGraph::new();
        let emission = graph.add(NodeKind::Emission);
        graph.set(emission.input("Color"), SocketValue::Color(self.ambient_color))?;
        graph.set(
            emission.input("Strength"),
            SocketValue::Float(self.ambient_intensity * AMBIENT_LIGHT_STRENGTH),
        )?;
        graph.connect(emission.output("Emission"), graph.output().input("Surface"))?;
        scene.set_shader_graph(scene.default_light(), graph)
    }
}

impl Object for Renderer {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        let background = params.get_or("background", Vec4::new(0.0, 0.0, 0.0, 1.0));
        self.pending.background |= background != self.background;
        self.background = background;

        let ambient_color = params.get_or("ambientColor", Vec3::repeat(1.0));
        let ambient_intensity =
            AMBIENT_RADIANCE_SCALE * params.get_or("ambientRadiance", 1.0f32);
        self.pending.ambient_light |=
            ambient_color != self.ambient_color || ambient_intensity != self.ambient_intensity;
        self.ambient_color = ambient_color;
        self.ambient_intensity = ambient_intensity;

        self.run_async = params.get_or("runAsync", true);
    }
}
