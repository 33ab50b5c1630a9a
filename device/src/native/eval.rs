//! CPU evaluation of shader graphs.
//!
//! Closures are kept in a linear form so mix nodes reduce to a weighted
//! sum. The evaluator walks links from the requested output input and
//! memoizes every node output it computes.

use std::collections::HashMap;

use anari_cycles_core::math::{Vec2, Vec3, nalgebra};

use super::image::{Extension, ImageManager, Interpolation};
use super::shader_graph::{
    InputRef, MathOp, NodeId, NodeKind, OutputRef, ShaderGraph, SocketValue, VectorMathOp,
};

const MAX_DEPTH: usize = 64;

/// Linear closure: everything a shading point needs from a graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Closure {
    /// Diffuse albedo.
    pub diffuse: Vec3,
    /// Fraction of light passing straight through the surface.
    pub transparency: Vec3,
    pub emission: Vec3,
    pub background: Vec3,
    pub volume_color: Vec3,
    pub density: f32,
    /// Perturbed shading normal, zero when unset.
    pub normal: Vec3,
}

impl Default for Closure {
    fn default() -> Self {
        Self {
            diffuse: Vec3::zeros(),
            transparency: Vec3::zeros(),
            emission: Vec3::zeros(),
            background: Vec3::zeros(),
            volume_color: Vec3::zeros(),
            density: 0.0,
            normal: Vec3::zeros(),
        }
    }
}

impl Closure {
    /// `a * (1 - fac) + b * fac`.
    pub fn mix(a: &Closure, b: &Closure, fac: f32) -> Closure {
        let l = |x: &Vec3, y: &Vec3| x * (1.0 - fac) + y * fac;
        Closure {
            diffuse: l(&a.diffuse, &b.diffuse),
            transparency: l(&a.transparency, &b.transparency),
            emission: l(&a.emission, &b.emission),
            background: l(&a.background, &b.background),
            volume_color: l(&a.volume_color, &b.volume_color),
            density: a.density * (1.0 - fac) + b.density * fac,
            normal: l(&a.normal, &b.normal),
        }
    }
}

/// Value flowing along a link.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Float(f32),
    Vec3(Vec3),
    Closure(Closure),
}

impl Value {
    fn float(&self) -> f32 {
        match self {
            Value::Float(f) => *f,
            Value::Vec3(v) => (v.x + v.y + v.z) / 3.0,
            Value::Closure(_) => 0.0,
        }
    }

    fn vec3(&self) -> Vec3 {
        match self {
            Value::Float(f) => Vec3::repeat(*f),
            Value::Vec3(v) => *v,
            Value::Closure(_) => Vec3::zeros(),
        }
    }

    fn closure(&self) -> Closure {
        match self {
            Value::Closure(c) => *c,
            _ => Closure::default(),
        }
    }
}

impl From<SocketValue> for Value {
    fn from(v: SocketValue) -> Self {
        match v {
            SocketValue::Float(f) => Value::Float(f),
            SocketValue::Color(c) | SocketValue::Vector(c) => Value::Vec3(c),
            SocketValue::Closure => Value::Closure(Closure::default()),
        }
    }
}

/// Inputs available at a shading point.
pub struct ShadingContext<'a> {
    /// Hit position, or the ray direction for background shading.
    pub position: Vec3,
    /// Shading normal facing the incoming ray.
    pub normal: Vec3,
    /// Direction the ray travels.
    pub direction: Vec3,
    /// Texture space "Generated" coordinate.
    pub generated: Vec3,
    pub is_camera_ray: bool,
    /// Attribute lookup by name.
    pub attribute: &'a dyn Fn(&str) -> Option<nalgebra::Vector4<f32>>,
    pub images: &'a ImageManager,
}

fn no_attribute(_: &str) -> Option<nalgebra::Vector4<f32>> {
    None
}

impl<'a> ShadingContext<'a> {
    /// Context for background and light shaders along `direction`.
    pub fn background(direction: Vec3, is_camera_ray: bool, images: &'a ImageManager) -> Self {
        Self {
            position: direction,
            normal: -direction,
            direction,
            generated: direction,
            is_camera_ray,
            attribute: &no_attribute,
            images,
        }
    }
}

struct Evaluator<'g, 'c> {
    graph: &'g ShaderGraph,
    ctx: &'c ShadingContext<'c>,
    memo: HashMap<OutputRef, Value>,
}

impl Evaluator<'_, '_> {
    fn input(&mut self, node: NodeId, name: &'static str, depth: usize) -> Value {
        let input = InputRef { node, name };
        match self.graph.link(input) {
            Some(out) => self.output(out, depth + 1),
            None => self
                .graph
                .value(input)
                .map(Value::from)
                .unwrap_or(Value::Float(0.0)),
        }
    }

    fn output(&mut self, out: OutputRef, depth: usize) -> Value {
        if let Some(v) = self.memo.get(&out) {
            return *v;
        }
        if depth > MAX_DEPTH {
            log::warn!("shader graph recursion limit reached at node {}", out.node.index());
            return Value::Float(0.0);
        }
        let v = self.compute(out, depth);
        self.memo.insert(out, v);
        v
    }

    fn compute(&mut self, out: OutputRef, depth: usize) -> Value {
        let graph = self.graph;
        let Some(node) = graph.node(out.node) else {
            return Value::Float(0.0);
        };
        let id = out.node;
        let ctx = self.ctx;
        match &node.kind {
            NodeKind::Output => Value::Float(0.0),
            NodeKind::PrincipledBsdf => {
                let base = self.input(id, "Base Color", depth).vec3();
                let alpha = self.input(id, "Alpha", depth).float().clamp(0.0, 1.0);
                let transmission = self
                    .input(id, "Transmission Weight", depth)
                    .float()
                    .clamp(0.0, 1.0);
                let emission = self.input(id, "Emission Color", depth).vec3()
                    * self.input(id, "Emission Strength", depth).float();
                let normal = match graph.link(id.input("Normal")) {
                    Some(_) => self.input(id, "Normal", depth).vec3(),
                    None => Vec3::zeros(),
                };
                let opaque = Closure {
                    diffuse: base * (1.0 - transmission),
                    transparency: base * transmission,
                    emission,
                    normal,
                    ..Closure::default()
                };
                let clear = Closure {
                    transparency: Vec3::repeat(1.0),
                    normal,
                    ..Closure::default()
                };
                Value::Closure(Closure::mix(&clear, &opaque, alpha))
            }
            NodeKind::Emission => {
                let c = self.input(id, "Color", depth).vec3();
                let s = self.input(id, "Strength", depth).float();
                Value::Closure(Closure {
                    emission: c * s,
                    ..Closure::default()
                })
            }
            NodeKind::Background => {
                let c = self.input(id, "Color", depth).vec3();
                let s = self.input(id, "Strength", depth).float();
                Value::Closure(Closure {
                    background: c * s,
                    ..Closure::default()
                })
            }
            NodeKind::MixClosure => {
                let fac = self.input(id, "Fac", depth).float().clamp(0.0, 1.0);
                let a = self.input(id, "Closure1", depth).closure();
                let b = self.input(id, "Closure2", depth).closure();
                Value::Closure(Closure::mix(&a, &b, fac))
            }
            NodeKind::PrincipledVolume => {
                let color = self.input(id, "Color", depth).vec3();
                let density = self.input(id, "Density", depth).float().max(0.0);
                Value::Closure(Closure {
                    volume_color: color,
                    density,
                    ..Closure::default()
                })
            }
            NodeKind::Attribute { attribute } => {
                let v = (ctx.attribute)(attribute.as_str()).unwrap_or_else(nalgebra::Vector4::zeros);
                let rgb = v.xyz();
                match out.name {
                    "Color" | "Vector" => Value::Vec3(rgb),
                    "Alpha" => Value::Float(v.w),
                    _ => Value::Float((rgb.x + rgb.y + rgb.z) / 3.0),
                }
            }
            NodeKind::SeparateColor => {
                let c = self.input(id, "Color", depth).vec3();
                Value::Float(match out.name {
                    "Green" => c.y,
                    "Blue" => c.z,
                    _ => c.x,
                })
            }
            NodeKind::SeparateXyz => {
                let v = self.input(id, "Vector", depth).vec3();
                Value::Float(match out.name {
                    "Y" => v.y,
                    "Z" => v.z,
                    _ => v.x,
                })
            }
            NodeKind::CombineXyz => Value::Vec3(Vec3::new(
                self.input(id, "X", depth).float(),
                self.input(id, "Y", depth).float(),
                self.input(id, "Z", depth).float(),
            )),
            NodeKind::CombineRgb => Value::Vec3(Vec3::new(
                self.input(id, "R", depth).float(),
                self.input(id, "G", depth).float(),
                self.input(id, "B", depth).float(),
            )),
            NodeKind::Math { op, clamp } => {
                let (op, clamp) = (*op, *clamp);
                let a = self.input(id, "Value1", depth).float();
                let b = self.input(id, "Value2", depth).float();
                let r = match op {
                    MathOp::Add => a + b,
                    MathOp::Subtract => a - b,
                    MathOp::Multiply => a * b,
                    MathOp::Divide => {
                        if b == 0.0 {
                            0.0
                        } else {
                            a / b
                        }
                    }
                    MathOp::Minimum => a.min(b),
                    MathOp::Maximum => a.max(b),
                    MathOp::Power => a.powf(b),
                };
                Value::Float(if clamp { r.clamp(0.0, 1.0) } else { r })
            }
            NodeKind::VectorMath { op } => {
                let op = *op;
                let a = self.input(id, "Vector1", depth).vec3();
                let b = self.input(id, "Vector2", depth).vec3();
                let (vector, value) = match op {
                    VectorMathOp::Add => (a + b, 0.0),
                    VectorMathOp::Subtract => (a - b, 0.0),
                    VectorMathOp::Multiply => (a.component_mul(&b), 0.0),
                    VectorMathOp::Scale => (a * self.input(id, "Scale", depth).float(), 0.0),
                    VectorMathOp::DotProduct => (Vec3::zeros(), a.dot(&b)),
                    VectorMathOp::Normalize => (a.try_normalize(0.0).unwrap_or_default(), 0.0),
                };
                match out.name {
                    "Value" => Value::Float(value),
                    _ => Value::Vec3(vector),
                }
            }
            NodeKind::Mapping => {
                let v = self.input(id, "Vector", depth).vec3();
                let loc = self.input(id, "Location", depth).vec3();
                let rot = self.input(id, "Rotation", depth).vec3();
                let scale = self.input(id, "Scale", depth).vec3();
                let r = nalgebra::Rotation3::from_euler_angles(rot.x, rot.y, rot.z);
                Value::Vec3(r * v.component_mul(&scale) + loc)
            }
            NodeKind::TextureCoordinate => Value::Vec3(match out.name {
                "Normal" => ctx.normal,
                "UV" => Vec3::zeros(),
                "Object" => ctx.position,
                _ => ctx.generated,
            }),
            NodeKind::ImageTexture {
                image,
                interpolation,
                extension,
            } => {
                let (image, interpolation, extension) = (*image, *interpolation, *extension);
                let uv = self.input(id, "Vector", depth).vec3();
                let c = ctx
                    .images
                    .sample_2d(image, uv.xy(), interpolation, extension);
                match out.name {
                    "Alpha" => Value::Float(c.w),
                    _ => Value::Vec3(c.xyz()),
                }
            }
            NodeKind::EnvironmentTexture { image } => {
                let image = *image;
                let d = self.input(id, "Vector", depth).vec3();
                let d = d.try_normalize(0.0).unwrap_or_else(Vec3::z);
                let u = -d.y.atan2(d.x) / (2.0 * std::f32::consts::PI) + 0.5;
                let v = d.z.clamp(-1.0, 1.0).asin() / std::f32::consts::PI + 0.5;
                let c = ctx.images.sample_2d(
                    image,
                    Vec2::new(u, v),
                    Interpolation::Linear,
                    [Extension::Repeat, Extension::Extend],
                );
                match out.name {
                    "Alpha" => Value::Float(c.w),
                    _ => Value::Vec3(c.xyz()),
                }
            }
            NodeKind::MapRange { clamp } => {
                let clamp = *clamp;
                let v = self.input(id, "Value", depth).float();
                let from_min = self.input(id, "From Min", depth).float();
                let from_max = self.input(id, "From Max", depth).float();
                let to_min = self.input(id, "To Min", depth).float();
                let to_max = self.input(id, "To Max", depth).float();
                let span = from_max - from_min;
                let mut r = if span == 0.0 {
                    to_min
                } else {
                    to_min + (v - from_min) / span * (to_max - to_min)
                };
                if clamp {
                    r = r.clamp(to_min.min(to_max), to_min.max(to_max));
                }
                Value::Float(r)
            }
            NodeKind::RgbRamp {
                ramp,
                alpha,
                interpolate,
            } => {
                let fac = self.input(id, "Fac", depth).float();
                let (color, a) = sample_ramp(ramp, alpha, *interpolate, fac);
                match out.name {
                    "Alpha" => Value::Float(a),
                    _ => Value::Vec3(color),
                }
            }
            NodeKind::LightPath => Value::Float(match out.name {
                "Is Camera Ray" => f32::from(u8::from(ctx.is_camera_ray)),
                "Is Diffuse Ray" => f32::from(u8::from(!ctx.is_camera_ray)),
                _ => 0.0,
            }),
            NodeKind::VectorRotate => {
                let v = self.input(id, "Vector", depth).vec3();
                let center = self.input(id, "Center", depth).vec3();
                let axis = self.input(id, "Axis", depth).vec3();
                let angle = self.input(id, "Angle", depth).float();
                let Some(axis) = nalgebra::Unit::try_new(axis, 1e-8) else {
                    return Value::Vec3(v);
                };
                let r = nalgebra::Rotation3::from_axis_angle(&axis, angle);
                Value::Vec3(r * (v - center) + center)
            }
            NodeKind::NormalMap => {
                let strength = self.input(id, "Strength", depth).float();
                let c = self.input(id, "Color", depth).vec3();
                let t = c * 2.0 - Vec3::repeat(1.0);
                let n = ctx.normal;
                let helper = if n.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
                let tangent = helper.cross(&n).normalize();
                let bitangent = n.cross(&tangent);
                let mapped = (tangent * t.x + bitangent * t.y + n * t.z)
                    .try_normalize(0.0)
                    .unwrap_or(n);
                Value::Vec3(n.lerp(&mapped, strength.clamp(0.0, 1.0)))
            }
        }
    }
}

/// Looks up a ramp resampled to evenly spaced stops.
pub fn sample_ramp(ramp: &[Vec3], alpha: &[f32], interpolate: bool, fac: f32) -> (Vec3, f32) {
    let n = ramp.len().max(alpha.len());
    if n == 0 {
        return (Vec3::zeros(), 0.0);
    }
    let pick_c = |i: usize| ramp.get(i).copied().unwrap_or_else(Vec3::zeros);
    let pick_a = |i: usize| alpha.get(i).copied().unwrap_or(0.0);
    let x = fac.clamp(0.0, 1.0) * (n - 1) as f32;
    let i0 = x.floor() as usize;
    let i1 = (i0 + 1).min(n - 1);
    if !interpolate || i0 == i1 {
        return (pick_c(i0), pick_a(i0));
    }
    let t = x - i0 as f32;
    (
        pick_c(i0).lerp(&pick_c(i1), t),
        pick_a(i0) * (1.0 - t) + pick_a(i1) * t,
    )
}

/// Evaluates the closure linked into `socket` of the graph output.
pub fn eval_closure(graph: &ShaderGraph, socket: &'static str, ctx: &ShadingContext<'_>) -> Closure {
    let mut eval = Evaluator {
        graph,
        ctx,
        memo: HashMap::new(),
    };
    let input = graph.output().input(socket);
    match graph.link(input) {
        Some(out) => eval.output(out, 0).closure(),
        None => Closure::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images() -> ImageManager {
        ImageManager::new()
    }

    #[test]
    fn test_unlinked_output_is_empty() {
        let graph = ShaderGraph::new();
        let images = images();
        let ctx = ShadingContext::background(Vec3::z(), true, &images);
        assert_eq!(eval_closure(&graph, "Surface", &ctx), Closure::default());
    }

    #[test]
    fn test_mix_by_camera_ray() {
        let mut graph = ShaderGraph::new();
        let a = graph.add(NodeKind::Background);
        graph.set(a.input("Color"), SocketValue::Color(Vec3::new(1.0, 0.0, 0.0))).unwrap();
        let b = graph.add(NodeKind::Background);
        graph.set(b.input("Color"), SocketValue::Color(Vec3::new(0.0, 0.0, 1.0))).unwrap();
        let path = graph.add(NodeKind::LightPath);
        let mix = graph.add(NodeKind::MixClosure);
        graph.connect(path.output("Is Camera Ray"), mix.input("Fac")).unwrap();
        graph.connect(a.output("Background"), mix.input("Closure1")).unwrap();
        graph.connect(b.output("Background"), mix.input("Closure2")).unwrap();
        graph.connect(mix.output("Closure"), graph.output().input("Surface")).unwrap();

        let images = images();
        let camera = ShadingContext::background(Vec3::z(), true, &images);
        let other = ShadingContext::background(Vec3::z(), false, &images);
        assert_eq!(eval_closure(&graph, "Surface", &camera).background, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(eval_closure(&graph, "Surface", &other).background, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_attribute_through_separate_color() {
        let mut graph = ShaderGraph::new();
        let attr = graph.add(NodeKind::Attribute {
            attribute: "vertex.attribute0".to_string(),
        });
        let sep = graph.add(NodeKind::SeparateColor);
        let bsdf = graph.add(NodeKind::PrincipledBsdf);
        graph.connect(attr.output("Color"), sep.input("Color")).unwrap();
        graph.connect(sep.output("Red"), bsdf.input("Alpha")).unwrap();
        graph.connect(bsdf.output("BSDF"), graph.output().input("Surface")).unwrap();

        let images = images();
        let lookup = |name: &str| {
            (name == "vertex.attribute0").then(|| nalgebra::Vector4::new(0.25, 0.0, 0.0, 1.0))
        };
        let ctx = ShadingContext {
            attribute: &lookup,
            ..ShadingContext::background(Vec3::z(), true, &images)
        };
        let c = eval_closure(&graph, "Surface", &ctx);
        assert!((c.transparency.x - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_map_range_clamps() {
        let mut graph = ShaderGraph::new();
        let map = graph.add(NodeKind::MapRange { clamp: true });
        graph.set(map.input("Value"), SocketValue::Float(5.0)).unwrap();
        graph.set(map.input("From Min"), SocketValue::Float(0.0)).unwrap();
        graph.set(map.input("From Max"), SocketValue::Float(2.0)).unwrap();
        let vol = graph.add(NodeKind::PrincipledVolume);
        graph.connect(map.output("Result"), vol.input("Density")).unwrap();
        graph.connect(vol.output("Volume"), graph.output().input("Volume")).unwrap();

        let images = images();
        let ctx = ShadingContext::background(Vec3::z(), true, &images);
        assert_eq!(eval_closure(&graph, "Volume", &ctx).density, 1.0);
    }

    #[test]
    fn test_sample_ramp() {
        let ramp = [Vec3::zeros(), Vec3::repeat(1.0)];
        let (c, a) = sample_ramp(&ramp, &[0.0, 1.0], true, 0.5);
        assert!((c.x - 0.5).abs() < 1e-6);
        assert!((a - 0.5).abs() < 1e-6);
        let (c, _) = sample_ramp(&ramp, &[], false, 0.9);
        assert_eq!(c, Vec3::zeros());
    }
}
