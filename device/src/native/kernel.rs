//! CPU path tracing kernel.
//!
//! Each sample traces one camera ray per pixel through transparent
//! surfaces and emission-absorption volumes. Surfaces are lit by distant
//! lights with hard shadows plus the background as ambient light.

use std::sync::atomic::{AtomicBool, Ordering};

use anari_cycles_core::math::{
    Mat3, Mat4, UVec2, Vec3, Vec4, transform_point, transform_vector,
};

use super::eval::{Closure, ShadingContext, eval_closure};
use super::image::ImageHandle;
use super::scene::{
    CameraNode, CameraType, GeometryData, GeometryId, LightType, NativeScene, ObjectSource,
    ShaderId,
};
use super::tile::Tile;

const RAY_EPSILON: f32 = 1e-4;
const MAX_VOLUME_STEPS: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

#[derive(Debug, Clone)]
struct PreparedTriangle {
    p: [Vec3; 3],
    ng: Vec3,
    normal_xfm: Mat3,
    geometry: GeometryId,
    prim: usize,
    shader: Option<ShaderId>,
}

#[derive(Debug, Clone)]
struct PreparedSphere {
    center: Vec3,
    radius: f32,
    geometry: GeometryId,
    prim: usize,
    shader: Option<ShaderId>,
}

#[derive(Debug, Clone)]
struct PreparedVolume {
    world_to_voxel: Mat4,
    box_min: Vec3,
    box_max: Vec3,
    voxels: Option<ImageHandle>,
    shader: Option<ShaderId>,
}

#[derive(Debug, Clone)]
struct PreparedLight {
    /// Direction the light travels.
    direction: Vec3,
    strength: Vec3,
    shader: Option<ShaderId>,
}

/// World-space copy of the scene's instanced primitives.
#[derive(Debug, Clone, Default)]
pub struct PreparedScene {
    triangles: Vec<PreparedTriangle>,
    spheres: Vec<PreparedSphere>,
    volumes: Vec<PreparedVolume>,
    lights: Vec<PreparedLight>,
}

fn normal_matrix(tfm: &Mat4) -> Mat3 {
    let linear: Mat3 = tfm.fixed_view::<3, 3>(0, 0).into_owned();
    linear
        .try_inverse()
        .map(|m| m.transpose())
        .unwrap_or_else(Mat3::identity)
}

impl PreparedScene {
    pub fn build(scene: &NativeScene) -> Self {
        let mut prepared = Self::default();
        for object in scene.objects() {
            match object.source {
                ObjectSource::Geometry(id) => prepared.add_geometry(scene, id, &object.tfm),
                ObjectSource::Light(id) => {
                    let Some(light) = scene.light(id) else { continue };
                    if light.light_type != LightType::Distant {
                        continue;
                    }
                    let dir = transform_vector(&object.tfm, &Vec3::new(0.0, 0.0, -1.0));
                    let Some(direction) = dir.try_normalize(0.0) else {
                        continue;
                    };
                    prepared.lights.push(PreparedLight {
                        direction,
                        strength: light.strength,
                        shader: light.shader,
                    });
                }
            }
        }
        log::debug!(
            "prepared scene: {} triangles, {} spheres, {} volumes, {} lights",
            prepared.triangles.len(),
            prepared.spheres.len(),
            prepared.volumes.len(),
            prepared.lights.len()
        );
        prepared
    }

    fn add_geometry(&mut self, scene: &NativeScene, id: GeometryId, tfm: &Mat4) {
        let Some(geom) = scene.geometry(id) else {
            return;
        };
        let shader = geom.used_shaders.first().copied();
        match &geom.data {
            GeometryData::Mesh(mesh) => {
                let normal_xfm = normal_matrix(tfm);
                for (prim, tri) in mesh.triangles.iter().enumerate() {
                    let fetch = |i: u32| mesh.verts.get(i as usize).map(|v| transform_point(tfm, v));
                    let (Some(a), Some(b), Some(c)) = (fetch(tri[0]), fetch(tri[1]), fetch(tri[2]))
                    else {
                        continue;
                    };
                    let Some(ng) = (b - a).cross(&(c - a)).try_normalize(0.0) else {
                        continue;
                    };
                    self.triangles.push(PreparedTriangle {
                        p: [a, b, c],
                        ng,
                        normal_xfm,
                        geometry: id,
                        prim,
                        shader,
                    });
                }
            }
            GeometryData::PointCloud(points) => {
                let axis = |c: usize| Vec3::new(tfm[(0, c)], tfm[(1, c)], tfm[(2, c)]).norm();
                let scale = (axis(0) + axis(1) + axis(2)) / 3.0;
                for (prim, p) in points.points.iter().enumerate() {
                    let radius = points.radius.get(prim).copied().unwrap_or(1.0) * scale;
                    self.spheres.push(PreparedSphere {
                        center: transform_point(tfm, p),
                        radius,
                        geometry: id,
                        prim,
                        shader,
                    });
                }
            }
            GeometryData::Volume(grid) => {
                let Some(world_to_voxel) = tfm.try_inverse() else {
                    return;
                };
                self.volumes.push(PreparedVolume {
                    world_to_voxel,
                    box_min: grid.box_min(),
                    box_max: grid.box_max(),
                    voxels: grid.voxels(),
                    shader,
                });
            }
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn sphere_count(&self) -> usize {
        self.spheres.len()
    }

    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }
}

#[derive(Debug, Clone, Copy)]
enum HitKind {
    Triangle { index: usize, u: f32, v: f32 },
    Sphere { index: usize },
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    t: f32,
    kind: HitKind,
}

fn intersect_triangle(ray: &Ray, p: &[Vec3; 3]) -> Option<(f32, f32, f32)> {
    let e1 = p[1] - p[0];
    let e2 = p[2] - p[0];
    let pv = ray.direction.cross(&e2);
    let det = e1.dot(&pv);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv = 1.0 / det;
    let tv = ray.origin - p[0];
    let u = tv.dot(&pv) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let qv = tv.cross(&e1);
    let v = ray.direction.dot(&qv) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(&qv) * inv;
    (t > RAY_EPSILON).then_some((t, u, v))
}

fn intersect_sphere(ray: &Ray, center: &Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let b = oc.dot(&ray.direction);
    let c = oc.norm_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let s = disc.sqrt();
    [-b - s, -b + s].into_iter().find(|t| *t > RAY_EPSILON)
}

/// Parametric range of the ray inside an axis-aligned box.
fn intersect_box(origin: &Vec3, dir: &Vec3, lo: &Vec3, hi: &Vec3) -> Option<(f32, f32)> {
    let mut t0 = f32::NEG_INFINITY;
    let mut t1 = f32::INFINITY;
    for axis in 0..3 {
        if dir[axis].abs() < 1e-12 {
            if origin[axis] < lo[axis] || origin[axis] > hi[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / dir[axis];
        let a = (lo[axis] - origin[axis]) * inv;
        let b = (hi[axis] - origin[axis]) * inv;
        t0 = t0.max(a.min(b));
        t1 = t1.min(a.max(b));
    }
    (t0 <= t1).then_some((t0, t1))
}

impl PreparedScene {
    fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        let mut best: Option<Hit> = None;
        let mut closest = t_max;
        for (index, tri) in self.triangles.iter().enumerate() {
            if let Some((t, u, v)) = intersect_triangle(ray, &tri.p) {
                if t < closest {
                    closest = t;
                    best = Some(Hit {
                        t,
                        kind: HitKind::Triangle { index, u, v },
                    });
                }
            }
        }
        for (index, sphere) in self.spheres.iter().enumerate() {
            if let Some(t) = intersect_sphere(ray, &sphere.center, sphere.radius) {
                if t < closest {
                    closest = t;
                    best = Some(Hit {
                        t,
                        kind: HitKind::Sphere { index },
                    });
                }
            }
        }
        best
    }

    fn occluded(&self, ray: &Ray) -> bool {
        self.intersect(ray, f32::INFINITY).is_some()
    }
}

/// Shading result at a surface hit.
struct SurfacePoint {
    position: Vec3,
    normal: Vec3,
    closure: Closure,
}

fn face_forward(n: Vec3, ray: &Ray) -> Vec3 {
    if n.dot(&ray.direction) > 0.0 { -n } else { n }
}

fn eval_surface(
    scene: &NativeScene,
    ray: &Ray,
    position: Vec3,
    shader: Option<ShaderId>,
    normal: Vec3,
    attribute: &dyn Fn(&str) -> Option<Vec4>,
) -> SurfacePoint {
    let Some(shader) = shader.and_then(|s| scene.shader(s)) else {
        return SurfacePoint {
            position,
            normal,
            closure: Closure::default(),
        };
    };
    let ctx = ShadingContext {
        position,
        normal,
        direction: ray.direction,
        generated: position,
        is_camera_ray: true,
        attribute,
        images: scene.images(),
    };
    let closure = eval_closure(shader.graph(), "Surface", &ctx);
    let normal = closure
        .normal
        .try_normalize(0.0)
        .map(|n| face_forward(n, ray))
        .unwrap_or(normal);
    SurfacePoint {
        position,
        normal,
        closure,
    }
}

fn shade_surface(
    scene: &NativeScene,
    prepared: &PreparedScene,
    ray: &Ray,
    hit: &Hit,
) -> SurfacePoint {
    let position = ray.at(hit.t);
    match hit.kind {
        HitKind::Triangle { index, u, v } => {
            let tri = &prepared.triangles[index];
            let mesh = match scene.geometry(tri.geometry).map(|g| &g.data) {
                Some(GeometryData::Mesh(mesh)) => Some(mesh),
                _ => None,
            };
            let idx = mesh.and_then(|m| m.triangles.get(tri.prim)).copied();
            let attribute = |name: &str| -> Option<Vec4> {
                let (mesh, idx) = (mesh?, idx?);
                let data = mesh.attributes.get(name)?;
                let w = 1.0 - u - v;
                Some(
                    data.get(idx[0] as usize)? * w
                        + data.get(idx[1] as usize)? * u
                        + data.get(idx[2] as usize)? * v,
                )
            };
            let normal = attribute("vertex.normal")
                .and_then(|n| (tri.normal_xfm * n.xyz()).try_normalize(0.0))
                .unwrap_or(tri.ng);
            eval_surface(scene, ray, position, tri.shader, face_forward(normal, ray), &attribute)
        }
        HitKind::Sphere { index } => {
            let sphere = &prepared.spheres[index];
            let points = match scene.geometry(sphere.geometry).map(|g| &g.data) {
                Some(GeometryData::PointCloud(points)) => Some(points),
                _ => None,
            };
            let attribute =
                |name: &str| -> Option<Vec4> { points?.attributes.get(name)?.get(sphere.prim) };
            let normal = (position - sphere.center)
                .try_normalize(0.0)
                .unwrap_or(-ray.direction);
            eval_surface(scene, ray, position, sphere.shader, face_forward(normal, ray), &attribute)
        }
    }
}

fn background(scene: &NativeScene, direction: Vec3, is_camera_ray: bool) -> Vec3 {
    let Some(shader) = scene.shader(scene.background_shader()) else {
        return Vec3::zeros();
    };
    let ctx = ShadingContext::background(direction, is_camera_ray, scene.images());
    eval_closure(shader.graph(), "Surface", &ctx).background
}

fn light_emission(scene: &NativeScene, shader: Option<ShaderId>) -> Vec3 {
    let id = shader.unwrap_or(scene.default_light());
    let Some(shader) = scene.shader(id) else {
        return Vec3::zeros();
    };
    let ctx = ShadingContext::background(Vec3::z(), false, scene.images());
    eval_closure(shader.graph(), "Surface", &ctx).emission
}

/// Emission-absorption march through every volume along `[0, t_max]`.
fn march_volumes(scene: &NativeScene, prepared: &PreparedScene, ray: &Ray, t_max: f32) -> (Vec3, Vec3) {
    let mut radiance = Vec3::zeros();
    let mut transmittance = Vec3::repeat(1.0);
    for vol in &prepared.volumes {
        let Some(shader) = vol.shader.and_then(|s| scene.shader(s)) else {
            continue;
        };
        let o = transform_point(&vol.world_to_voxel, &ray.origin);
        let d = transform_vector(&vol.world_to_voxel, &ray.direction);
        let Some((t0, t1)) = intersect_box(&o, &d, &vol.box_min, &vol.box_max) else {
            continue;
        };
        let (t0, t1) = (t0.max(0.0), t1.min(t_max));
        let speed = d.norm();
        if t1 <= t0 || speed <= 0.0 {
            continue;
        }
        let steps = (((t1 - t0) * speed / 0.5).ceil() as usize).clamp(1, MAX_VOLUME_STEPS);
        let dt = (t1 - t0) / steps as f32;
        for i in 0..steps {
            let t = t0 + (i as f32 + 0.5) * dt;
            let p = o + d * t;
            let value = scene.images().sample_3d(vol.voxels, p);
            let attribute = |name: &str| (name == "voxels").then_some(value);
            let ctx = ShadingContext {
                position: ray.at(t),
                normal: -ray.direction,
                direction: ray.direction,
                generated: p,
                is_camera_ray: true,
                attribute: &attribute,
                images: scene.images(),
            };
            let c = eval_closure(shader.graph(), "Volume", &ctx);
            let step = (-c.density * dt).exp();
            radiance += transmittance.component_mul(&c.volume_color) * (1.0 - step);
            transmittance *= step;
            if transmittance.max() < 1e-4 {
                return (radiance, transmittance);
            }
        }
    }
    (radiance, transmittance)
}

/// Radiance and first-hit distance along a camera ray.
fn trace(scene: &NativeScene, prepared: &PreparedScene, emissions: &[Vec3], mut ray: Ray) -> (Vec3, f32) {
    let mut radiance = Vec3::zeros();
    let mut throughput = Vec3::repeat(1.0);
    let mut depth = f32::INFINITY;
    let mut travelled = 0.0;

    for _ in 0..=scene.integrator.transparent_max_bounce {
        let hit = prepared.intersect(&ray, f32::INFINITY);
        let t_max = hit.map_or(f32::INFINITY, |h| h.t);
        let (vol_radiance, vol_transmittance) = march_volumes(scene, prepared, &ray, t_max);
        radiance += throughput.component_mul(&vol_radiance);
        throughput = throughput.component_mul(&vol_transmittance);

        let Some(hit) = hit else {
            radiance += throughput.component_mul(&background(scene, ray.direction, true));
            break;
        };
        if depth.is_infinite() {
            depth = travelled + hit.t;
        }

        let sp = shade_surface(scene, prepared, &ray, &hit);
        let mut lighting = background(scene, sp.normal, false);
        for (light, emission) in prepared.lights.iter().zip(emissions) {
            let cos = sp.normal.dot(&-light.direction);
            if cos <= 0.0 {
                continue;
            }
            let shadow = Ray {
                origin: sp.position + sp.normal * RAY_EPSILON,
                direction: -light.direction,
            };
            if prepared.occluded(&shadow) {
                continue;
            }
            lighting += light.strength.component_mul(emission) * (cos / std::f32::consts::PI);
        }
        radiance += throughput
            .component_mul(&(sp.closure.emission + sp.closure.diffuse.component_mul(&lighting)));
        throughput = throughput.component_mul(&sp.closure.transparency);
        if throughput.max() < 1e-4 {
            break;
        }
        travelled += hit.t;
        ray.origin = sp.position + ray.direction * RAY_EPSILON;
    }
    (radiance, depth)
}

fn hash(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

/// Subpixel offset; the first sample goes through the pixel center.
fn jitter(x: u32, y: u32, sample: u32) -> (f32, f32) {
    if sample == 0 {
        return (0.5, 0.5);
    }
    let h = hash(x ^ hash(y ^ hash(sample)));
    (
        (h & 0xffff) as f32 / 65536.0,
        (h >> 16) as f32 / 65536.0,
    )
}

/// Primary ray through normalized film coordinates, `v = 0` at the bottom.
pub fn camera_ray(camera: &CameraNode, u: f32, v: f32) -> Ray {
    let vp = &camera.viewplane;
    let sx = vp.left + u * (vp.right - vp.left);
    let sy = vp.bottom + v * (vp.top - vp.bottom);
    let m = &camera.matrix;
    match camera.camera_type {
        CameraType::Perspective => {
            let t = (camera.fov * 0.5).tan();
            let d = Vec3::new(sx * t, sy * t, 1.0);
            Ray {
                origin: transform_point(m, &Vec3::zeros()),
                direction: transform_vector(m, &d).try_normalize(0.0).unwrap_or_else(Vec3::z),
            }
        }
        CameraType::Orthographic => Ray {
            origin: transform_point(m, &Vec3::new(sx, sy, 0.0)),
            direction: transform_vector(m, &Vec3::z())
                .try_normalize(0.0)
                .unwrap_or_else(Vec3::z),
        },
    }
}

/// Accumulation buffer.
#[derive(Debug, Clone)]
pub struct Film {
    width: u32,
    height: u32,
    samples: u32,
    color: Vec<Vec4>,
    depth: Vec<f32>,
}

impl Film {
    pub fn new(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            samples: 0,
            color: vec![Vec4::zeros(); n],
            depth: vec![f32::INFINITY; n],
        }
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Averaged result with `combined` and `depth` passes.
    pub fn to_tile(&self) -> Tile {
        let inv = if self.samples == 0 {
            0.0
        } else {
            1.0 / self.samples as f32
        };
        let combined = self
            .color
            .iter()
            .flat_map(|c| {
                let c = c * inv;
                [c.x, c.y, c.z, c.w]
            })
            .collect();
        Tile::new(UVec2::zeros(), self.size(), self.size())
            .with_pass("combined", 4, combined)
            .with_pass("depth", 1, self.depth.clone())
    }
}

/// Accumulates samples into `film` until it holds `target` of them.
///
/// Returns `false` if `cancel` was raised first.
pub fn render(
    scene: &NativeScene,
    prepared: &PreparedScene,
    film: &mut Film,
    target: u32,
    cancel: &AtomicBool,
) -> bool {
    let emissions: Vec<Vec3> = prepared
        .lights
        .iter()
        .map(|l| light_emission(scene, l.shader))
        .collect();
    let (width, height) = (film.width as usize, film.height as usize);
    if width == 0 || height == 0 {
        film.samples = film.samples.max(target);
        return true;
    }
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(height);
    let rows_per_chunk = height.div_ceil(threads);

    while film.samples < target {
        if cancel.load(Ordering::Acquire) {
            return false;
        }
        let sample = film.samples;
        let emissions = &emissions;
        std::thread::scope(|s| {
            let chunk = rows_per_chunk * width;
            for (c, (color, depth)) in film
                .color
                .chunks_mut(chunk)
                .zip(film.depth.chunks_mut(chunk))
                .enumerate()
            {
                s.spawn(move || {
                    for (i, (px, z)) in color.iter_mut().zip(depth.iter_mut()).enumerate() {
                        let index = c * chunk + i;
                        let (x, y) = ((index % width) as u32, (index / width) as u32);
                        let (jx, jy) = jitter(x, y, sample);
                        let ray = camera_ray(
                            &scene.camera,
                            (x as f32 + jx) / width as f32,
                            (y as f32 + jy) / height as f32,
                        );
                        let (radiance, hit_depth) = trace(scene, prepared, emissions, ray);
                        *px += Vec4::new(radiance.x, radiance.y, radiance.z, 1.0);
                        *z = z.min(hit_depth);
                    }
                });
            }
        });
        film.samples += 1;
    }
    true
}
