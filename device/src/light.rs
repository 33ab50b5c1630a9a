//! Directional and HDRI environment lights.

use anari_cycles_core::math::{Mat3, Mat4, Vec3, rotation_from_neg_z};
use anari_cycles_core::{Arena, DataType};

use crate::array::Array;
use crate::error::NativeError;
use crate::image_loader::SamplerImageLoader;
use crate::native::image::ImageManager;
use crate::native::scene::{LightId, LightNode, LightType, NativeScene, ShaderId};
use crate::native::shader_graph::{NodeKind, ShaderGraph, SocketValue};
use crate::object::{ArrayHandle, Object, ObjectBase, ObjectHandle, warn_unknown_subtype};
use crate::state::FinalizeContext;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Directional {
        direction: Vec3,
        irradiance: f32,
    },
    Hdri {
        direction: Vec3,
        up: Vec3,
        scale: f32,
        visible: bool,
    },
    Unknown,
}

/// Axis and angle rotating the environment into the `direction`/`up` frame.
fn environment_rotation(direction: Vec3, up: Vec3) -> (Vec3, f32) {
    let forward = direction.try_normalize(0.0).unwrap_or_else(|| Vec3::new(0.0, 0.0, 1.0));
    let up = up.try_normalize(0.0).unwrap_or_else(Vec3::y);
    let Some(right) = forward.cross(&up).try_normalize(0.0) else {
        return (Vec3::z(), 0.0);
    };
    let up = right.cross(&forward).normalize();
    let basis = Mat3::from_columns(&[forward, right, up]);
    let rotation = nalgebra::UnitQuaternion::from_rotation_matrix(
        &nalgebra::Rotation3::from_matrix_unchecked(basis),
    );
    match rotation.axis_angle() {
        Some((axis, angle)) => (axis.into_inner(), angle),
        None => (Vec3::z(), 0.0),
    }
}

/// texture coordinate -> vector rotate -> environment texture -> background.
fn build_environment_graph(
    images: &mut ImageManager,
    radiance: ArrayHandle,
    array: &Array,
    kind: &LightKind,
) -> Result<ShaderGraph, NativeError> {
    let LightKind::Hdri {
        direction,
        up,
        scale,
        visible,
    } = *kind
    else {
        return Ok(ShaderGraph::new());
    };
    let (axis, angle) = environment_rotation(direction, up);

    let mut graph = ShaderGraph::new();
    let coords = graph.add(NodeKind::TextureCoordinate);
    let rotate = graph.add(NodeKind::VectorRotate);
    graph.set(rotate.input("Axis"), SocketValue::Vector(axis))?;
    graph.set(rotate.input("Angle"), SocketValue::Float(angle))?;
    graph.connect(coords.output("Generated"), rotate.input("Vector"))?;

    let environment = graph.add(NodeKind::EnvironmentTexture {
        image: Some(images.add_image(Box::new(SamplerImageLoader::new(radiance, array)))),
    });
    graph.connect(rotate.output("Vector"), environment.input("Vector"))?;

    let background = graph.add(NodeKind::Background);
    graph.set(background.input("Strength"), SocketValue::Float(scale))?;
    graph.connect(environment.output("Color"), background.input("Color"))?;

    let surface = graph.output().input("Surface");
    if visible {
        graph.connect(background.output("Background"), surface)?;
    } else {
        // Camera rays see nothing; everything else is lit.
        let light_path = graph.add(NodeKind::LightPath);
        let hidden = graph.add(NodeKind::Background);
        graph.set(hidden.input("Strength"), SocketValue::Float(0.0))?;
        let mix = graph.add(NodeKind::MixClosure);
        graph.connect(light_path.output("Is Camera Ray"), mix.input("Fac"))?;
        graph.connect(background.output("Background"), mix.input("Closure1"))?;
        graph.connect(hidden.output("Background"), mix.input("Closure2"))?;
        graph.connect(mix.output("Closure"), surface)?;
    }
    Ok(graph)
}

#[derive(Debug, Clone)]
pub struct Light {
    base: ObjectBase,
    kind: LightKind,
    color: Vec3,
    radiance: Option<ArrayHandle>,
    /// Direction as of the last finalize.
    prev_direction: Option<Vec3>,
    light: Option<LightId>,
    shader: Option<ShaderId>,
}

impl Light {
    pub fn new(subtype: &str, scene: &mut NativeScene) -> Self {
        let (kind, light_type) = match subtype {
            "directional" => (
                LightKind::Directional {
                    direction: Vec3::new(0.0, 0.0, -1.0),
                    irradiance: 1.0,
                },
                Some(LightType::Distant),
            ),
            "hdri" => (
                LightKind::Hdri {
                    direction: Vec3::new(0.0, 0.0, 1.0),
                    up: Vec3::y(),
                    scale: 1.0,
                    visible: true,
                },
                Some(LightType::Background),
            ),
            _ => {
                warn_unknown_subtype(DataType::Light, subtype);
                (LightKind::Unknown, None)
            }
        };
        Self {
            base: ObjectBase::new(DataType::Light, subtype),
            kind,
            color: Vec3::repeat(1.0),
            radiance: None,
            prev_direction: None,
            light: light_type.map(|ty| scene.create_light(LightNode::new(ty))),
            shader: None,
        }
    }

    pub fn kind(&self) -> LightKind {
        self.kind
    }

    pub fn is_valid(&self) -> bool {
        self.kind != LightKind::Unknown
    }

    pub fn native_light(&self) -> Option<LightId> {
        self.light
    }

    /// Environment shader of an HDRI light with radiance.
    pub fn background_shader(&self) -> Option<ShaderId> {
        self.shader
    }

    /// Light-to-world transform; directional lights shine along the
    /// transformed `-Z`.
    pub fn transform(&self) -> Mat4 {
        match self.kind {
            LightKind::Directional { direction, .. } => rotation_from_neg_z(&direction),
            _ => Mat4::identity(),
        }
    }

    pub fn finalize(&mut self, ctx: &mut FinalizeContext<'_>, arrays: &Arena<Array>) {
        match self.kind {
            LightKind::Directional {
                direction,
                irradiance,
            } => {
                if self.prev_direction != Some(direction) {
                    log::debug!("light direction change resynchronizes the scene");
                    ctx.mark_scene_changed();
                    self.prev_direction = Some(direction);
                }
                let strength = self.color * irradiance;
                if let Some(light) = self.light.and_then(|id| ctx.scene.light_mut(id)) {
                    light.light_type = LightType::Distant;
                    light.strength = strength;
                }
            }
            LightKind::Hdri { .. } => {
                if let Some(light) = self.light.and_then(|id| ctx.scene.light_mut(id)) {
                    light.light_type = LightType::Background;
                }
                if let Some(old) = self.shader.take() {
                    ctx.scene.delete_shader(old);
                }
                let radiance = self
                    .radiance
                    .and_then(|h| Some((h, arrays.get(h)?)))
                    .filter(|(_, array)| !array.is_empty());
                if let Some((handle, array)) = radiance {
                    match build_environment_graph(ctx.scene.images_mut(), handle, array, &self.kind) {
                        Ok(graph) => {
                            let shader = ctx.scene.create_shader("ANARI hdri", graph);
                            self.shader = Some(shader);
                            if let Some(light) = self.light.and_then(|id| ctx.scene.light_mut(id)) {
                                light.shader = Some(shader);
                            }
                        }
                        Err(err) => log::error!("failed to build hdri shader: {}", err),
                    }
                }
                ctx.mark_scene_changed();
            }
            LightKind::Unknown => {}
        }
    }

    pub fn release(&mut self, scene: &mut NativeScene) {
        if let Some(shader) = self.shader.take() {
            scene.delete_shader(shader);
        }
        if let Some(light) = self.light.take() {
            scene.delete_light(light);
        }
    }
}

impl Object for Light {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        self.color = params.get_or("color", Vec3::repeat(1.0));
        self.kind = match self.kind {
            LightKind::Directional { .. } => {
                let direction: Vec3 = params.get_or("direction", Vec3::new(0.0, 0.0, -1.0));
                LightKind::Directional {
                    direction: direction
                        .try_normalize(0.0)
                        .unwrap_or_else(|| Vec3::new(0.0, 0.0, -1.0)),
                    irradiance: params.get_or("irradiance", 1.0f32).max(0.0),
                }
            }
            LightKind::Hdri { .. } => {
                self.radiance = params.get_object("radiance").and_then(|h| h.as_array());
                LightKind::Hdri {
                    direction: params.get_or("direction", Vec3::new(0.0, 0.0, 1.0)),
                    up: params.get_or("up", Vec3::y()),
                    scale: params.get_or("scale", 1.0),
                    visible: params.get_or("visible", true),
                }
            }
            LightKind::Unknown => LightKind::Unknown,
        };
    }

    fn observed(&self) -> Vec<ObjectHandle> {
        self.radiance.map(ObjectHandle::from).into_iter().collect()
    }

    fn is_unknown(&self) -> bool {
        self.kind == LightKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChangeStamps;
    use anari_cycles_core::Clock;
    use anari_cycles_core::math::transform_vector;

    fn finalize(light: &mut Light, scene: &mut NativeScene, stamps: &mut ChangeStamps, arrays: &Arena<Array>) {
        let mut clock = Clock::new();
        clock.tick();
        clock.tick();
        let mut ctx = FinalizeContext {
            scene,
            clock: &mut clock,
            stamps,
        };
        light.finalize(&mut ctx, arrays);
    }

    #[test]
    fn test_directional_strength_and_transform() {
        let mut scene = NativeScene::new();
        let mut light = Light::new("directional", &mut scene);
        let params = light.base_mut().params_mut();
        params.set("direction", [0.0f32, -2.0, 0.0].into());
        params.set("irradiance", 2.0f32.into());
        params.set("color", [1.0f32, 0.5, 0.0].into());
        light.commit_parameters();

        let mut stamps = ChangeStamps::default();
        finalize(&mut light, &mut scene, &mut stamps, &Arena::new());
        let node = scene.light(light.native_light().unwrap()).unwrap();
        assert_eq!(node.strength, Vec3::new(2.0, 1.0, 0.0));

        let travel = transform_vector(&light.transform(), &Vec3::new(0.0, 0.0, -1.0));
        assert!((travel - Vec3::new(0.0, -1.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn test_direction_change_stamps_scene() {
        let mut scene = NativeScene::new();
        let mut light = Light::new("directional", &mut scene);
        let mut stamps = ChangeStamps::default();
        finalize(&mut light, &mut scene, &mut stamps, &Arena::new());
        assert_eq!(stamps.last_scene_change, 3);

        stamps.last_scene_change = 0;
        light.base_mut().params_mut().set("irradiance", 3.0f32.into());
        light.commit_parameters();
        finalize(&mut light, &mut scene, &mut stamps, &Arena::new());
        assert_eq!(stamps.last_scene_change, 0);

        light.base_mut().params_mut().set("direction", [1.0f32, 0.0, 0.0].into());
        light.commit_parameters();
        finalize(&mut light, &mut scene, &mut stamps, &Arena::new());
        assert_eq!(stamps.last_scene_change, 3);
    }

    #[test]
    fn test_negative_irradiance_clamped() {
        let mut scene = NativeScene::new();
        let mut light = Light::new("directional", &mut scene);
        light.base_mut().params_mut().set("irradiance", (-1.0f32).into());
        light.commit_parameters();
        assert!(matches!(
            light.kind(),
            LightKind::Directional { irradiance, .. } if irradiance == 0.0
        ));
    }

    #[test]
    fn test_hdri_rebuilds_shader() {
        let mut scene = NativeScene::new();
        let mut arrays = Arena::new();
        let radiance = arrays.insert(Array::from_slice([2, 1, 1], &[[1.0f32, 1.0, 1.0]; 2]));
        let mut light = Light::new("hdri", &mut scene);
        light.base_mut().params_mut().set("radiance", radiance.into());
        light.commit_parameters();

        let mut stamps = ChangeStamps::default();
        finalize(&mut light, &mut scene, &mut stamps, &arrays);
        let first = light.background_shader().unwrap();
        finalize(&mut light, &mut scene, &mut stamps, &arrays);
        let second = light.background_shader().unwrap();

        assert_ne!(first, second);
        assert!(scene.shader(first).is_none());
        assert_eq!(scene.shader_count(), 3);
        assert_eq!(scene.images().len(), 1);
        assert_eq!(scene.light(light.native_light().unwrap()).unwrap().shader, Some(second));
    }

    #[test]
    fn test_hidden_hdri_mixes_on_camera_rays() {
        let mut images = ImageManager::new();
        let mut arrays = Arena::new();
        let array = Array::from_slice([1, 1, 1], &[[1.0f32, 1.0, 1.0]]);
        let handle = arrays.insert(array.clone());
        let kind = LightKind::Hdri {
            direction: Vec3::z(),
            up: Vec3::y(),
            scale: 1.0,
            visible: false,
        };
        let graph = build_environment_graph(&mut images, handle, &array, &kind).unwrap();
        assert!(graph.nodes().any(|(_, n)| n.kind == NodeKind::MixClosure));
    }

    #[test]
    fn test_release() {
        let mut scene = NativeScene::new();
        let mut light = Light::new("directional", &mut scene);
        assert_eq!(scene.light_count(), 1);
        light.release(&mut scene);
        assert_eq!(scene.light_count(), 0);
    }

    #[test]
    fn test_unknown_subtype() {
        let mut scene = NativeScene::new();
        let light = Light::new("spot", &mut scene);
        assert!(light.is_unknown());
        assert!(light.native_light().is_none());
    }
}
