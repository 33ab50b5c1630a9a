use criterion::{Criterion, black_box, criterion_group, criterion_main};

use anari_cycles::native::scene::NativeScene;
use anari_cycles::{DataType, Device, DeviceConfig, ObjectHandle, SurfaceHandle, WaitMask, WorldHandle};

/// A world of `count` triangle surfaces sharing one material.
fn populated_world(device: &mut Device, count: usize) -> (WorldHandle, Vec<SurfaceHandle>) {
    let material = device.new_material("matte");
    device.commit_parameters(material);

    let mut surfaces = Vec::with_capacity(count);
    for i in 0..count {
        let x = i as f32;
        let position =
            device.new_array1d(&[[x, 0.0f32, 0.0], [x + 1.0, 0.0, 0.0], [x, 1.0, 0.0]]);
        let geometry = device.new_geometry("triangle");
        device.set_param(geometry, "vertex.position", position);
        device.commit_parameters(geometry);

        let surface = device.new_surface();
        device.set_param(surface, "geometry", geometry);
        device.set_param(surface, "material", material);
        device.commit_parameters(surface);
        surfaces.push(surface);
    }

    let handles: Vec<ObjectHandle> = surfaces.iter().map(|s| (*s).into()).collect();
    let array = device.new_object_array(DataType::Surface, &handles);
    let world = device.new_world();
    device.set_param(world, "surface", array);
    device.commit_parameters(world);
    device.flush();
    (world, surfaces)
}

// ---------------------------------------------------------------------------
// World synchronization
// ---------------------------------------------------------------------------

fn bench_world_sync(c: &mut Criterion) {
    let Ok(mut device) = Device::new(DeviceConfig::new()) else {
        return;
    };
    let (world, _) = populated_world(&mut device, 256);
    let mut scene = NativeScene::new();

    c.bench_function("world_sync_256_surfaces", |b| {
        b.iter(|| {
            let store = device.store();
            if let Some(world) = store.worlds.get(world) {
                world.sync(&mut scene, &store.view());
            }
            black_box(scene.object_count());
        });
    });
}

// ---------------------------------------------------------------------------
// Shader graph construction
// ---------------------------------------------------------------------------

fn bench_material_commit(c: &mut Criterion) {
    let Ok(mut device) = Device::new(DeviceConfig::new()) else {
        return;
    };
    let material = device.new_material("physicallyBased");
    device.set_param(material, "baseColor", "color");
    device.set_param(material, "roughness", 0.4f32);

    c.bench_function("physically_based_graph_rebuild", |b| {
        b.iter(|| {
            device.commit_parameters(material);
            device.flush();
        });
    });
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

fn bench_render_sample(c: &mut Criterion) {
    let Ok(mut device) = Device::new(DeviceConfig::new()) else {
        return;
    };
    let (world, _) = populated_world(&mut device, 16);
    let camera = device.new_camera("perspective");
    device.set_param(camera, "position", [8.0f32, 0.5, 12.0]);
    device.set_param(camera, "direction", [0.0f32, 0.0, -1.0]);
    device.commit_parameters(camera);
    let renderer = device.new_renderer("default");
    device.commit_parameters(renderer);
    let frame = device.new_frame();
    device.set_param(frame, "size", [32u32, 32]);
    device.set_param(frame, "channel.color", DataType::UFixed8RgbaSrgb);
    device.set_param(frame, "camera", camera);
    device.set_param(frame, "world", world);
    device.set_param(frame, "renderer", renderer);
    device.commit_parameters(frame);

    c.bench_function("render_sample_32x32", |b| {
        b.iter(|| {
            device.render_frame(frame);
            black_box(device.frame_ready(frame, WaitMask::Wait));
        });
    });
}

criterion_group!(
    benches,
    bench_world_sync,
    bench_material_commit,
    bench_render_sample
);
criterion_main!(benches);
