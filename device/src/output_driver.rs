//! Boundary between the render thread and the application thread.
//!
//! The session's worker calls [`OutputDriver::write_render_tile`] once per
//! render; the application blocks in [`FrameOutputDriver::wait`] or polls
//! [`FrameOutputDriver::ready`]. All driver state sits behind one mutex,
//! paired with a condition variable for completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use anari_cycles_core::DataType;
use anari_cycles_core::data_type::{cvt_color_to_u32, cvt_color_to_u32_srgb};
use anari_cycles_core::math::Vec4;
use parking_lot::{Condvar, Mutex};

use crate::frame::{FrameBuffers, SharedFrameBuffers};
use crate::native::tile::{OutputDriver, Tile};

struct DriverState {
    /// Frame the current render writes into.
    target: Option<SharedFrameBuffers>,
    /// Frame of the previous render, to detect output changes.
    last_target: Option<Weak<Mutex<FrameBuffers>>>,
    start: Instant,
    /// Float color staging for format conversion.
    staging: Vec<f32>,
}

pub struct FrameOutputDriver {
    state: Mutex<DriverState>,
    finished_cv: Condvar,
    render_finished: AtomicBool,
}

impl FrameOutputDriver {
    /// Creates a driver with no render in flight.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DriverState {
                target: None,
                last_target: None,
                start: Instant::now(),
                staging: Vec::new(),
            }),
            finished_cv: Condvar::new(),
            render_finished: AtomicBool::new(true),
        }
    }

    /// Binds `target` for the next render and starts its clock.
    ///
    /// Returns `true` if `target` is not the frame the previous render
    /// wrote into.
    pub fn render_begin(&self, target: &SharedFrameBuffers) -> bool {
        let mut state = self.state.lock();
        let changed = !state
            .last_target
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|last| Arc::ptr_eq(&last, target));
        state.start = Instant::now();
        state.target = Some(Arc::clone(target));
        state.last_target = Some(Arc::downgrade(target));
        self.render_finished.store(false, Ordering::Release);
        changed
    }

    /// Records the render duration, unbinds the target and wakes waiters.
    pub fn render_end(&self) {
        let mut state = self.state.lock();
        self.finish(&mut state);
    }

    fn finish(&self, state: &mut DriverState) {
        if let Some(target) = state.target.take() {
            target.lock().duration = state.start.elapsed().as_secs_f32();
        }
        self.render_finished.store(true, Ordering::Release);
        self.finished_cv.notify_all();
    }

    /// Blocks until the current render has finished.
    pub fn wait(&self) {
        if self.ready() {
            return;
        }
        let mut state = self.state.lock();
        while !self.render_finished.load(Ordering::Acquire) {
            self.finished_cv.wait(&mut state);
        }
    }

    /// Whether no render is in flight.
    ///
    /// Only a hint outside [`wait`](Self::wait), which rechecks under the lock.
    pub fn ready(&self) -> bool {
        self.render_finished.load(Ordering::Acquire)
    }
}

impl Default for FrameOutputDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies the `combined` and `depth` passes of a full tile into `frame`.
fn extract_passes(staging: &mut Vec<f32>, frame: &mut FrameBuffers, tile: &Tile) {
    if !tile.is_full() {
        log::warn!("rejecting partial tile");
        return;
    }
    if tile.size != frame.size {
        log::warn!(
            "rejecting frame -- buffer size mismatch, got {{{}, {}}} but target is {{{}, {}}}",
            tile.size.x,
            tile.size.y,
            frame.size.x,
            frame.size.y
        );
        return;
    }

    let pixels = tile.pixel_count();
    let color_type = frame.color_type;
    if color_type != DataType::Unknown {
        staging.resize(pixels * 4, 0.0);
        if !tile.get_pass_pixels("combined", 4, staging) {
            log::error!("Failed to read 'combined' pass");
        } else if color_type == DataType::Float32Vec4 {
            let bytes: &[u8] = bytemuck::cast_slice(staging.as_slice());
            let n = bytes.len().min(frame.pixels.len());
            frame.pixels[..n].copy_from_slice(&bytes[..n]);
        } else {
            let srgb = color_type != DataType::UFixed8Vec4;
            for (dst, src) in frame
                .pixels
                .chunks_exact_mut(4)
                .zip(staging.chunks_exact(4))
            {
                let c = Vec4::new(src[0], src[1], src[2], src[3]);
                let packed = if srgb {
                    cvt_color_to_u32_srgb(&c)
                } else {
                    cvt_color_to_u32(&c)
                };
                dst.copy_from_slice(&packed.to_le_bytes());
            }
        }
    }

    if frame.depth_type == DataType::Float32
        && !tile.get_pass_pixels("depth", 1, &mut frame.depth)
    {
        log::error!("Failed to read 'depth' pass");
    }
}

impl OutputDriver for FrameOutputDriver {
    fn write_render_tile(&self, tile: &Tile) {
        let mut state = self.state.lock();
        if let Some(target) = state.target.clone() {
            let mut frame = target.lock();
            extract_passes(&mut state.staging, &mut frame, tile);
        }
        self.finish(&mut state);
    }

    fn render_cancelled(&self) {
        self.render_end();
    }
}

static_assertions::assert_impl_all!(FrameOutputDriver: Send, Sync);
