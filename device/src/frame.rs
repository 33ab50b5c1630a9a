//! Frames: pixel buffers and the render state machine.
//!
//! A render waits for the previous one, binds the frame's buffers to the
//! output driver, flushes pending commits, resynchronizes the world if the
//! scene changed and restarts accumulation if anything was finalized since
//! the last restart. The session then renders one more sample on its own
//! thread and the driver signals completion.

use std::sync::Arc;

use anari_cycles_core::DataType;
use anari_cycles_core::math::UVec2;
use anari_cycles_core::timestamp::TimeStamp;
use parking_lot::{Mutex, MutexGuard};

use crate::native::session::BufferParams;
use crate::object::{
    CameraHandle, FrameHandle, Object, ObjectBase, ObjectHandle, RendererHandle, WorldHandle,
};
use crate::state::DeviceState;
use crate::store::{ObjectStore, SceneView};

/// Pixel storage shared with the output driver.
#[derive(Debug, Clone)]
pub struct FrameBuffers {
    pub size: UVec2,
    pub color_type: DataType,
    pub depth_type: DataType,
    pub pixels: Vec<u8>,
    pub depth: Vec<f32>,
    /// Seconds the last render took.
    pub duration: f32,
}

impl FrameBuffers {
    /// Allocates buffers for `size`, color pre-filled with `0xFF`.
    pub fn new(size: UVec2, color_type: DataType, depth_type: DataType) -> Self {
        let pixel_count = size.x as usize * size.y as usize;
        let bytes_per_pixel = 4 * if color_type == DataType::Float32Vec4 { 4 } else { 1 };
        let depth_count = if depth_type == DataType::Float32 {
            pixel_count
        } else {
            0
        };
        Self {
            size,
            color_type,
            depth_type,
            pixels: vec![0xFF; pixel_count * bytes_per_pixel],
            depth: vec![0.0; depth_count],
            duration: 0.0,
        }
    }
}

pub type SharedFrameBuffers = Arc<Mutex<FrameBuffers>>;

/// A mappable frame channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Color,
    Depth,
}

impl Channel {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "channel.color" => Some(Self::Color),
            "channel.depth" => Some(Self::Depth),
            _ => None,
        }
    }
}

/// A channel held for reading. The render thread cannot write while it
/// is alive.
pub struct MappedChannel<'a> {
    buffers: MutexGuard<'a, FrameBuffers>,
    channel: Channel,
}

impl MappedChannel<'_> {
    pub fn width(&self) -> u32 {
        self.buffers.size.x
    }

    pub fn height(&self) -> u32 {
        self.buffers.size.y
    }

    pub fn pixel_type(&self) -> DataType {
        match self.channel {
            Channel::Color => self.buffers.color_type,
            Channel::Depth => DataType::Float32,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self.channel {
            Channel::Color => &self.buffers.pixels,
            Channel::Depth => bytemuck::cast_slice(&self.buffers.depth),
        }
    }
}

pub struct Frame {
    base: ObjectBase,
    world: Option<WorldHandle>,
    renderer: Option<RendererHandle>,
    camera: Option<CameraHandle>,
    color_type: DataType,
    depth_type: DataType,
    size: UVec2,
    buffers: SharedFrameBuffers,
    /// When this frame last synchronized its world, `0` to force a sync.
    world_last_changed: TimeStamp,
    /// Renderer whose defaults are currently in the native scene.
    current_renderer: Option<RendererHandle>,
}

impl Frame {
    pub fn new() -> Self {
        let size = UVec2::new(10, 10);
        Self {
            base: ObjectBase::new(DataType::Frame, ""),
            world: None,
            renderer: None,
            camera: None,
            color_type: DataType::Unknown,
            depth_type: DataType::Unknown,
            size,
            buffers: Arc::new(Mutex::new(FrameBuffers::new(
                size,
                DataType::Unknown,
                DataType::Unknown,
            ))),
            world_last_changed: 0,
            current_renderer: None,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn world(&self) -> Option<WorldHandle> {
        self.world
    }

    pub fn buffers(&self) -> &SharedFrameBuffers {
        &self.buffers
    }

    pub fn duration(&self) -> f32 {
        self.buffers.lock().duration
    }

    /// Renderer, camera and world are bound, live and valid.
    pub fn is_valid(&self, view: &SceneView<'_>) -> bool {
        let renderer = self.renderer.and_then(|h| view.renderers.get(h));
        let camera = self.camera.and_then(|h| view.cameras.get(h));
        let world = self.world.and_then(|h| view.worlds.get(h));
        renderer.is_some_and(|r| r.is_valid())
            && camera.is_some_and(|c| c.is_valid())
            && world.is_some_and(|w| w.is_valid())
    }

    /// Warns about missing bindings and reallocates the buffers.
    pub fn finalize(&mut self) {
        if self.renderer.is_none() {
            log::warn!("missing required parameter 'renderer' on frame");
        }
        if self.camera.is_none() {
            log::warn!("missing required parameter 'camera' on frame");
        }
        if self.world.is_none() {
            log::warn!("missing required parameter 'world' on frame");
        }
        *self.buffers.lock() = FrameBuffers::new(self.size, self.color_type, self.depth_type);
    }

    /// The caller must have waited for the in-flight render.
    pub fn map(&self, channel: &str) -> Option<MappedChannel<'_>> {
        let channel = Channel::parse(channel)?;
        Some(MappedChannel {
            buffers: self.buffers.lock(),
            channel,
        })
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Object for Frame {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        let world = params.get_object("world").and_then(|h| h.as_world());
        if world != self.world {
            self.world_last_changed = 0;
        }
        self.world = world;
        self.renderer = params.get_object("renderer").and_then(|h| h.as_renderer());
        self.camera = params.get_object("camera").and_then(|h| h.as_camera());
        self.color_type = params.get_or("channel.color", DataType::Unknown);
        self.depth_type = params.get_or("channel.depth", DataType::Unknown);
        self.size = params.get_or("size", UVec2::new(10, 10));
    }

    fn referenced(&self) -> Vec<ObjectHandle> {
        [
            self.world.map(ObjectHandle::from),
            self.camera.map(ObjectHandle::from),
            self.renderer.map(ObjectHandle::from),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Whether the next render restarts accumulation.
pub fn reset_accumulation_next_frame(state: &DeviceState) -> bool {
    state.stamps.last_accumulation_reset < state.commit_buffer.last_object_finalization()
}

/// Renders one more sample of `handle`.
pub(crate) fn render_frame(store: &mut ObjectStore, state: &mut DeviceState, handle: FrameHandle) {
    state.wait_on_current_frame();
    let Some(buffers) = store.frames.get(handle).map(|f| Arc::clone(f.buffers())) else {
        log::error!("render_frame called on a released frame");
        return;
    };
    let target_changed = state.output_driver.render_begin(&buffers);
    store.flush(state);

    let Some(frame) = store.frames.get(handle) else {
        state.output_driver.render_end();
        return;
    };
    let (world, camera, renderer) = (frame.world, frame.camera, frame.renderer);
    let (size, world_last_changed) = (frame.size, frame.world_last_changed);
    let renderer_changed = frame.current_renderer != renderer;

    if !frame.is_valid(&store.view()) {
        log::error!("skipping render of incomplete frame object");
        buffers.lock().pixels.fill(0);
        state.output_driver.render_end();
        return;
    }

    if world_last_changed < state.stamps.last_scene_change {
        log::debug!("frame -- updating world");
        if let Some(world) = world.and_then(|h| store.worlds.get(h)) {
            world.sync(&mut state.scene.write(), &store.view());
        }
        let stamp = state.clock.tick();
        if let Some(frame) = store.frames.get_mut(handle) {
            frame.world_last_changed = stamp;
        }
    }

    if target_changed || reset_accumulation_next_frame(state) {
        log::debug!("frame -- resetting accumulation");
        state.stamps.last_accumulation_reset = state.clock.tick();
        {
            let mut scene = state.scene.write();
            if let Some(camera) = camera.and_then(|h| store.cameras.get(h)) {
                camera.make_current(&mut scene, size.x, size.y);
            }
            if let Some(renderer) = renderer.and_then(|h| store.renderers.get_mut(h)) {
                renderer.make_current(&mut scene, renderer_changed);
            }
        }
        if let Some(frame) = store.frames.get_mut(handle) {
            frame.current_renderer = renderer;
        }
        state.buffer_params = BufferParams::new(size.x, size.y);
        state.session.reset(state.buffer_params, 0);
        state.session_samples = 0;
    }

    state.session_samples += 1;
    state.session.set_samples(state.session_samples);
    state.session.start();

    let run_async = renderer
        .and_then(|h| store.renderers.get(h))
        .is_none_or(|r| r.run_async());
    if !run_async {
        state.wait_on_current_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_prefilled() {
        let buffers = FrameBuffers::new(UVec2::new(2, 3), DataType::UFixed8Vec4, DataType::Float32);
        assert_eq!(buffers.pixels.len(), 2 * 3 * 4);
        assert!(buffers.pixels.iter().all(|b| *b == 0xFF));
        assert_eq!(buffers.depth.len(), 6);

        let float = FrameBuffers::new(UVec2::new(2, 2), DataType::Float32Vec4, DataType::Unknown);
        assert_eq!(float.pixels.len(), 2 * 2 * 16);
        assert!(float.depth.is_empty());
    }

    #[test]
    fn test_commit_reads_defaults() {
        let mut frame = Frame::new();
        frame.commit_parameters();
        frame.finalize();
        assert_eq!(frame.size(), UVec2::new(10, 10));
        assert_eq!(frame.buffers().lock().pixels.len(), 400);
    }

    #[test]
    fn test_map_channels() {
        let mut frame = Frame::new();
        let params = frame.base_mut().params_mut();
        params.set("size", [4u32, 2].into());
        params.set("channel.color", DataType::UFixed8RgbaSrgb.into());
        params.set("channel.depth", DataType::Float32.into());
        frame.commit_parameters();
        frame.finalize();

        let color = frame.map("channel.color").unwrap();
        assert_eq!((color.width(), color.height()), (4, 2));
        assert_eq!(color.pixel_type(), DataType::UFixed8RgbaSrgb);
        assert_eq!(color.bytes().len(), 32);
        drop(color);

        let depth = frame.map("channel.depth").unwrap();
        assert_eq!(depth.pixel_type(), DataType::Float32);
        assert_eq!(depth.bytes().len(), 32);
        drop(depth);

        assert!(frame.map("channel.normal").is_none());
    }

    #[test]
    fn test_new_world_forces_sync() {
        let mut worlds = anari_cycles_core::Arena::new();
        let world = worlds.insert(crate::world::World::new());
        let mut frame = Frame::new();
        frame.world_last_changed = 5;
        frame.commit_parameters();
        assert_eq!(frame.world_last_changed, 5);

        frame.base_mut().params_mut().set("world", world.into());
        frame.commit_parameters();
        assert_eq!(frame.world_last_changed, 0);
        assert_eq!(frame.world(), Some(world));
    }
}
