//! Shared fixtures for the device integration tests.

use anari_cycles::{
    ArrayHandle, CameraHandle, DataType, Device, DeviceConfig, FrameHandle, GeometryHandle,
    LightHandle, MaterialHandle, RendererHandle, SurfaceHandle, WorldHandle,
};

/// Routes `log` output through the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn device() -> Device {
    init_logging();
    Device::new(DeviceConfig::new()).expect("a CPU device is always available")
}

/// Handles of the one-triangle test scene.
#[allow(dead_code)]
pub struct TriangleScene {
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    pub surface: SurfaceHandle,
    /// The world's `surface` array.
    pub surfaces: ArrayHandle,
    pub light: LightHandle,
    pub camera: CameraHandle,
    pub world: WorldHandle,
    pub renderer: RendererHandle,
    pub frame: FrameHandle,
}

/// A triangle lit by a directional light, seen by a perspective camera,
/// rendered into a `width`×`height` frame of `color_type`.
pub fn triangle_scene(
    device: &mut Device,
    width: u32,
    height: u32,
    color_type: DataType,
) -> TriangleScene {
    let position = device.new_array1d(&[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    let index = device.new_array1d(&[[0u32, 1, 2]]);
    let geometry = device.new_geometry("triangle");
    device.set_param(geometry, "vertex.position", position);
    device.set_param(geometry, "primitive.index", index);
    device.commit_parameters(geometry);

    let material = device.new_material("matte");
    device.set_param(material, "color", [0.8f32, 0.2, 0.2]);
    device.commit_parameters(material);

    let surface = device.new_surface();
    device.set_param(surface, "geometry", geometry);
    device.set_param(surface, "material", material);
    device.commit_parameters(surface);

    let light = device.new_light("directional");
    device.set_param(light, "direction", [0.0f32, 0.0, -1.0]);
    device.set_param(light, "irradiance", 2.0f32);
    device.commit_parameters(light);

    let surfaces = device.new_object_array(DataType::Surface, &[surface.into()]);
    let lights = device.new_object_array(DataType::Light, &[light.into()]);
    let world = device.new_world();
    device.set_param(world, "surface", surfaces);
    device.set_param(world, "light", lights);
    device.commit_parameters(world);

    let camera = device.new_camera("perspective");
    device.set_param(camera, "position", [0.25f32, 0.25, 2.0]);
    device.set_param(camera, "direction", [0.0f32, 0.0, -1.0]);
    device.set_param(camera, "up", [0.0f32, 1.0, 0.0]);
    device.commit_parameters(camera);

    let renderer = device.new_renderer("default");
    device.set_param(renderer, "background", [0.0f32, 0.0, 0.0, 1.0]);
    device.commit_parameters(renderer);

    let frame = device.new_frame();
    device.set_param(frame, "size", [width, height]);
    device.set_param(frame, "channel.color", color_type);
    device.set_param(frame, "channel.depth", DataType::Float32);
    device.set_param(frame, "camera", camera);
    device.set_param(frame, "world", world);
    device.set_param(frame, "renderer", renderer);
    device.commit_parameters(frame);

    TriangleScene {
        geometry,
        material,
        surface,
        surfaces,
        light,
        camera,
        world,
        renderer,
        frame,
    }
}
