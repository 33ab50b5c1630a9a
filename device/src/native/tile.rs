//! Render results handed to output drivers.

use std::collections::HashMap;

use anari_cycles_core::math::UVec2;

/// One finished render region with its pass buffers.
#[derive(Debug, Clone)]
pub struct Tile {
    pub offset: UVec2,
    pub size: UVec2,
    pub full_size: UVec2,
    passes: HashMap<String, (usize, Vec<f32>)>,
}

impl Tile {
    pub fn new(offset: UVec2, size: UVec2, full_size: UVec2) -> Self {
        Self {
            offset,
            size,
            full_size,
            passes: HashMap::new(),
        }
    }

    /// Attaches a pass with `channels` floats per pixel.
    pub fn with_pass(mut self, name: &str, channels: usize, data: Vec<f32>) -> Self {
        self.passes.insert(name.to_string(), (channels, data));
        self
    }

    /// Whether the tile covers the whole image.
    pub fn is_full(&self) -> bool {
        self.offset == UVec2::zeros() && self.size == self.full_size
    }

    pub fn pixel_count(&self) -> usize {
        self.size.x as usize * self.size.y as usize
    }

    /// Copies a pass into `dst`.
    ///
    /// Returns `false` when the pass does not exist, has a different
    /// channel count, or `dst` is too small.
    pub fn get_pass_pixels(&self, name: &str, channels: usize, dst: &mut [f32]) -> bool {
        let Some((pass_channels, data)) = self.passes.get(name) else {
            return false;
        };
        let n = self.pixel_count() * channels;
        if *pass_channels != channels || dst.len() < n || data.len() < n {
            return false;
        }
        dst[..n].copy_from_slice(&data[..n]);
        true
    }
}

/// Receiver of finished renders.
pub trait OutputDriver: Send + Sync {
    fn write_render_tile(&self, tile: &Tile);

    /// Called instead of `write_render_tile` when a render stops early.
    fn render_cancelled(&self) {}
}
