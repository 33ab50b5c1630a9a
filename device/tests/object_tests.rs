//! Integration tests for object validity, bounds and native node management.

mod common;

use rstest::rstest;

use anari_cycles::{Box3, DataType, Device, ObjectHandle, PropertyValue, WaitMask};
use anari_cycles_core::math::Vec3;
use common::{device, triangle_scene};

fn valid(device: &mut Device, object: impl Into<ObjectHandle>) -> bool {
    matches!(
        device.get_property(object, "valid", DataType::Bool, WaitMask::Wait),
        Some(PropertyValue::Bool(true))
    )
}

fn bounds(device: &mut Device, object: impl Into<ObjectHandle>) -> Box3 {
    match device.get_property(object, "bounds", DataType::Float32Box3, WaitMask::Wait) {
        Some(PropertyValue::Box3(b)) => b,
        other => panic!("expected bounds, got {:?}", other),
    }
}

// ============================================================================
// Bounds
// ============================================================================

#[rstest]
#[case::triangle("triangle")]
#[case::sphere("sphere")]
fn test_geometry_without_positions_has_empty_bounds(#[case] subtype: &str) {
    let mut device = device();
    let geometry = device.new_geometry(subtype);
    device.commit_parameters(geometry);

    let b = bounds(&mut device, geometry);
    assert!(b.is_empty());
    assert!(b.lower.x > b.upper.x);
    assert!(!valid(&mut device, geometry));
}

#[test]
fn test_world_bounds_cover_zero_instance() {
    let mut device = device();
    let scene = triangle_scene(&mut device, 2, 2, DataType::UFixed8Vec4);

    let b = bounds(&mut device, scene.world);
    assert_eq!(b.lower, Vec3::new(0.0, 0.0, 0.0));
    assert_eq!(b.upper, Vec3::new(1.0, 1.0, 0.0));
}

#[test]
fn test_empty_world_bounds() {
    let mut device = device();
    let world = device.new_world();
    device.commit_parameters(world);
    assert!(bounds(&mut device, world).is_empty());
    assert!(valid(&mut device, world));
}

// ============================================================================
// Validity
// ============================================================================

#[rstest]
#[case::camera(DataType::Camera)]
#[case::geometry(DataType::Geometry)]
#[case::light(DataType::Light)]
#[case::material(DataType::Material)]
#[case::sampler(DataType::Sampler)]
#[case::spatial_field(DataType::SpatialField)]
#[case::volume(DataType::Volume)]
fn test_unknown_subtype_is_permanently_invalid(#[case] ty: DataType) {
    let mut device = device();
    let object: ObjectHandle = match ty {
        DataType::Camera => device.new_camera("fisheye").into(),
        DataType::Geometry => device.new_geometry("cone").into(),
        DataType::Light => device.new_light("spot").into(),
        DataType::Material => device.new_material("glass").into(),
        DataType::Sampler => device.new_sampler("image3D").into(),
        DataType::SpatialField => device.new_spatial_field("unstructured").into(),
        DataType::Volume => device.new_volume("scivis").into(),
        _ => unreachable!(),
    };
    assert!(!valid(&mut device, object));
    device.commit_parameters(object);
    assert!(!valid(&mut device, object));
    assert!(!device.object_subtypes(ty).is_empty());
}

#[test]
fn test_surface_validity_follows_children() {
    let mut device = device();
    let scene = triangle_scene(&mut device, 2, 2, DataType::UFixed8Vec4);
    assert!(valid(&mut device, scene.surface));

    let unknown = device.new_material("glass");
    device.set_param(scene.surface, "material", unknown);
    device.commit_parameters(scene.surface);
    assert!(!valid(&mut device, scene.surface));

    device.set_param(scene.surface, "material", scene.material);
    device.commit_parameters(scene.surface);
    assert!(valid(&mut device, scene.surface));

    // only the geometry is re-committed
    device.unset_param(scene.geometry, "vertex.position");
    device.commit_parameters(scene.geometry);
    assert!(!valid(&mut device, scene.surface));
}

#[test]
fn test_empty_position_array_is_invalid() {
    let mut device = device();
    let position = device.new_array1d::<[f32; 3]>(&[]);
    assert!(device.store().arrays.get(position).unwrap().is_empty());
    let geometry = device.new_geometry("triangle");
    device.set_param(geometry, "vertex.position", position);
    device.commit_parameters(geometry);

    assert!(bounds(&mut device, geometry).is_empty());
    assert!(!valid(&mut device, geometry));
}

// ============================================================================
// Release
// ============================================================================

#[test]
fn test_released_handles_live_on_in_world() {
    let mut device = device();
    let scene = triangle_scene(&mut device, 2, 2, DataType::UFixed8Vec4);
    let before = bounds(&mut device, scene.world);

    device.release(scene.surface);
    device.release(scene.geometry);
    device.release(scene.material);
    assert!(device.store().is_released(scene.surface.into()));
    assert!(valid(&mut device, scene.surface));
    assert_eq!(bounds(&mut device, scene.world), before);

    device.render_frame(scene.frame);
    assert!(device.frame_ready(scene.frame, WaitMask::Wait));
    let color = device.map_frame(scene.frame, "channel.color").unwrap();
    assert!(color.bytes().iter().any(|b| *b != 0xFF));
}

#[test]
fn test_detaching_released_surface_destroys_it() {
    let mut device = device();
    let scene = triangle_scene(&mut device, 2, 2, DataType::UFixed8Vec4);
    let node = device
        .store()
        .surfaces
        .get(scene.surface)
        .and_then(|s| s.native_node());
    assert!(node.is_some());

    device.release(scene.surface);
    device.release(scene.geometry);
    device.unset_param(scene.world, "surface");
    device.commit_parameters(scene.world);
    // the world's surface array still holds the surface
    assert!(device.store().surfaces.get(scene.surface).is_some());

    device.release(scene.surfaces);
    device.flush();

    let store = device.store();
    assert!(store.surfaces.get(scene.surface).is_none());
    assert!(store.geometries.get(scene.geometry).is_none());
    // the material is still owned by the application
    assert!(store.materials.get(scene.material).is_some());
    assert!(device.state().scene.read().geometry(node.unwrap()).is_none());
}

// ============================================================================
// Native nodes
// ============================================================================

#[test]
fn test_repeated_commit_is_idempotent() {
    let mut device = device();
    let scene = triangle_scene(&mut device, 2, 2, DataType::UFixed8Vec4);
    device.flush();

    let counts = |d: &Device| {
        let native = d.state().scene.read();
        (native.geometry_count(), native.shader_count(), native.light_count())
    };
    let node = |d: &Device| d.store().surfaces.get(scene.surface).and_then(|s| s.native_node());

    let before = (counts(&device), node(&device));
    assert!(before.1.is_some());

    device.commit_parameters(scene.surface);
    device.commit_parameters(scene.material);
    device.commit_parameters(scene.light);
    device.flush();
    assert_eq!((counts(&device), node(&device)), before);
}

#[test]
fn test_geometry_handle_change_rebuilds_node() {
    let mut device = device();
    let scene = triangle_scene(&mut device, 2, 2, DataType::UFixed8Vec4);
    device.flush();
    let node = |d: &Device| d.store().surfaces.get(scene.surface).and_then(|s| s.native_node());
    let first = node(&device);

    let position = device.new_array1d(&[[0.0f32, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]]);
    let other = device.new_geometry("triangle");
    device.set_param(other, "vertex.position", position);
    device.commit_parameters(other);
    device.set_param(scene.surface, "geometry", other);
    device.commit_parameters(scene.surface);
    device.flush();

    let second = node(&device);
    assert!(second.is_some());
    assert_ne!(first, second);
    let native = device.state().scene.read();
    assert!(native.geometry(first.unwrap()).is_none());
    assert_eq!(native.geometry_count(), 1);
}

#[test]
fn test_geometry_content_change_reuses_node() {
    let mut device = device();
    let position = device.new_array1d(&[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    let geometry = device.new_geometry("triangle");
    device.set_param(geometry, "vertex.position", position);
    device.commit_parameters(geometry);
    let material = device.new_material("matte");
    device.commit_parameters(material);
    let surface = device.new_surface();
    device.set_param(surface, "geometry", geometry);
    device.set_param(surface, "material", material);
    device.commit_parameters(surface);
    device.flush();
    let node = |d: &Device| d.store().surfaces.get(surface).and_then(|s| s.native_node());
    let first = node(&device);

    if let Some(bytes) = device.map_array(position) {
        bytes[..4].copy_from_slice(&4.0f32.to_le_bytes());
    }
    device.unmap_array(position);
    device.flush();

    assert_eq!(node(&device), first);
    assert!(device.store().geometries.get(geometry).is_some());
    let b = bounds(&mut device, surface);
    assert_eq!(b.upper.x, 4.0);
}

// ============================================================================
// World
// ============================================================================

#[test]
fn test_instances_and_zero_group_render_together() {
    let mut device = device();
    let scene = triangle_scene(&mut device, 2, 2, DataType::UFixed8Vec4);

    let surfaces = device.new_object_array(DataType::Surface, &[scene.surface.into()]);
    let group = device.new_group();
    device.set_param(group, "surface", surfaces);
    device.commit_parameters(group);
    let instance = device.new_instance();
    device.set_param(instance, "group", group);
    device.set_param(
        instance,
        "transform",
        [
            1.0f32, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            3.0, 0.0, 0.0, 1.0,
        ],
    );
    device.commit_parameters(instance);
    let instances = device.new_object_array(DataType::Instance, &[instance.into()]);
    device.set_param(scene.world, "instance", instances);
    device.commit_parameters(scene.world);

    let b = bounds(&mut device, scene.world);
    assert_eq!(b.lower.x, 0.0);
    assert_eq!(b.upper.x, 4.0);

    device.render_frame(scene.frame);
    assert!(device.frame_ready(scene.frame, WaitMask::Wait));
    // two triangles and the directional light
    assert_eq!(device.state().scene.read().object_count(), 3);
}

#[test]
fn test_world_removing_content_clears_zero_group() {
    let mut device = device();
    let scene = triangle_scene(&mut device, 2, 2, DataType::UFixed8Vec4);
    device.unset_param(scene.world, "surface");
    device.commit_parameters(scene.world);

    assert!(bounds(&mut device, scene.world).is_empty());
    device.render_frame(scene.frame);
    device.frame_ready(scene.frame, WaitMask::Wait);
    assert_eq!(device.state().scene.read().object_count(), 1);
}

// ============================================================================
// Device queries
// ============================================================================

#[test]
fn test_device_reports_cycles_and_extensions() {
    let device = device();
    assert_eq!(
        device.device_get_property("cycles", DataType::Bool),
        Some(PropertyValue::Bool(true))
    );
    let Some(PropertyValue::StringList(features)) =
        device.device_get_property("feature", DataType::StringList)
    else {
        panic!("feature list missing");
    };
    assert!(features.contains(&"ANARI_KHR_GEOMETRY_TRIANGLE"));
    assert_eq!(device.object_subtypes(DataType::Light), &["directional", "hdri"]);
}
