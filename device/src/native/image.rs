//! Image storage for textures and voxel grids.
//!
//! Pixel data reaches the renderer through [`ImageLoader`] implementations.
//! The [`ImageManager`] deduplicates loaders that compare equal, counts
//! users, and decodes every image into `float4` texels once at load time.
//! Images that fail to load stay addressable and sample as magenta.

use std::any::Any;

use anari_cycles_core::arena::{Arena, Handle};
use anari_cycles_core::math::{Vec2, Vec3, Vec4};

use crate::error::NativeError;

/// Scalar storage of loaded pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageDataType {
    /// Normalized `u8`.
    Byte,
    /// Normalized `u16`.
    UShort,
    Float,
}

impl ImageDataType {
    pub fn size_of(&self) -> usize {
        match self {
            Self::Byte => 1,
            Self::UShort => 2,
            Self::Float => 4,
        }
    }
}

/// Image description reported by a loader before pixels are read.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetaData {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub channels: usize,
    pub data_type: ImageDataType,
    pub byte_size: usize,
}

impl ImageMetaData {
    pub fn texel_count(&self) -> usize {
        self.width * self.height * self.depth
    }
}

/// Source of image pixels.
pub trait ImageLoader: Send + Sync {
    fn load_metadata(&self) -> Result<ImageMetaData, NativeError>;

    /// Copies `metadata.byte_size` bytes of pixel data into `pixels`.
    fn load_pixels(&self, metadata: &ImageMetaData, pixels: &mut [u8]) -> Result<(), NativeError>;

    fn name(&self) -> String;

    /// Whether `other` would load the same pixels.
    fn equals(&self, other: &dyn ImageLoader) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// Texture filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Linear,
    Closest,
}

/// Out-of-range texture coordinate handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extension {
    #[default]
    Repeat,
    /// Clamp to the edge texel.
    Extend,
    Mirror,
}

impl Extension {
    fn wrap(&self, i: i64, n: usize) -> usize {
        let n = n as i64;
        let w = match self {
            Self::Repeat => i.rem_euclid(n),
            Self::Extend => i.clamp(0, n - 1),
            Self::Mirror => {
                let m = i.rem_euclid(2 * n);
                if m < n { m } else { 2 * n - 1 - m }
            }
        };
        w as usize
    }
}

/// Color returned for images that could not be loaded.
pub const MISSING_IMAGE_COLOR: Vec4 = Vec4::new(1.0, 0.0, 1.0, 1.0);

/// One managed image.
pub struct ImageSlot {
    name: String,
    loader: Box<dyn ImageLoader>,
    users: usize,
    dims: [usize; 3],
    texels: Vec<Vec4>,
    loaded: bool,
}

impl std::fmt::Debug for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSlot")
            .field("name", &self.name)
            .field("users", &self.users)
            .field("dims", &self.dims)
            .field("loaded", &self.loaded)
            .finish()
    }
}

pub type ImageHandle = Handle<ImageSlot>;

fn decode(meta: &ImageMetaData, bytes: &[u8]) -> Vec<Vec4> {
    let size = meta.data_type.size_of();
    let scalar = |i: usize| -> f32 {
        let b = &bytes[i * size..(i + 1) * size];
        match meta.data_type {
            ImageDataType::Byte => b[0] as f32 / 255.0,
            ImageDataType::UShort => bytemuck::pod_read_unaligned::<u16>(b) as f32 / 65535.0,
            ImageDataType::Float => bytemuck::pod_read_unaligned::<f32>(b),
        }
    };
    let c = meta.channels;
    (0..meta.texel_count())
        .map(|t| {
            let base = t * c;
            match c {
                1 => {
                    let v = scalar(base);
                    Vec4::new(v, v, v, 1.0)
                }
                2 => Vec4::new(scalar(base), scalar(base + 1), 0.0, 1.0),
                3 => Vec4::new(scalar(base), scalar(base + 1), scalar(base + 2), 1.0),
                _ => Vec4::new(
                    scalar(base),
                    scalar(base + 1),
                    scalar(base + 2),
                    scalar(base + 3),
                ),
            }
        })
        .collect()
}

fn load(loader: &dyn ImageLoader) -> Result<([usize; 3], Vec<Vec4>), NativeError> {
    let meta = loader.load_metadata()?;
    let expected = meta.texel_count() * meta.channels * meta.data_type.size_of();
    if meta.byte_size < expected {
        return Err(NativeError::ImageSizeMismatch {
            got: meta.byte_size,
            expected,
        });
    }
    let mut pixels = vec![0u8; meta.byte_size];
    loader.load_pixels(&meta, &mut pixels)?;
    Ok(([meta.width, meta.height, meta.depth], decode(&meta, &pixels)))
}

/// Reference counted image table.
#[derive(Debug, Default)]
pub struct ImageManager {
    images: Arena<ImageSlot>,
}

impl ImageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an image, reusing a loaded one whose loader compares equal.
    pub fn add_image(&mut self, loader: Box<dyn ImageLoader>) -> ImageHandle {
        let existing = self
            .images
            .iter()
            .find(|(_, slot)| slot.loader.equals(loader.as_ref()))
            .map(|(h, _)| h);
        if let Some(handle) = existing {
            if let Some(slot) = self.images.get_mut(handle) {
                slot.users += 1;
            }
            return handle;
        }

        let name = loader.name();
        let (dims, texels, loaded) = match load(loader.as_ref()) {
            Ok((dims, texels)) => (dims, texels, true),
            Err(err) => {
                log::error!("failed to load image '{}': {}", name, err);
                ([0; 3], Vec::new(), false)
            }
        };
        log::debug!("loaded image '{}' {:?}", name, dims);
        self.images.insert(ImageSlot {
            name,
            loader,
            users: 1,
            dims,
            texels,
            loaded,
        })
    }

    /// Adds a user to an existing image.
    pub fn add_user(&mut self, handle: ImageHandle) {
        if let Some(slot) = self.images.get_mut(handle) {
            slot.users += 1;
        }
    }

    /// Drops one user; the image is freed when none remain.
    pub fn remove_image(&mut self, handle: ImageHandle) {
        let free = match self.images.get_mut(handle) {
            Some(slot) => {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            }
            None => false,
        };
        if free {
            self.images.remove(handle);
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn is_loaded(&self, handle: ImageHandle) -> bool {
        self.images.get(handle).is_some_and(|s| s.loaded)
    }

    pub fn dims(&self, handle: ImageHandle) -> Option<[usize; 3]> {
        self.images.get(handle).map(|s| s.dims)
    }

    fn loaded_slot(&self, handle: Option<ImageHandle>) -> Option<&ImageSlot> {
        self.images
            .get(handle?)
            .filter(|s| s.loaded && !s.texels.is_empty())
    }

    /// Samples a 2D image at normalized coordinates, `v = 0` on row 0.
    pub fn sample_2d(
        &self,
        handle: Option<ImageHandle>,
        uv: Vec2,
        interpolation: Interpolation,
        extension: [Extension; 2],
    ) -> Vec4 {
        let Some(slot) = self.loaded_slot(handle) else {
            return MISSING_IMAGE_COLOR;
        };
        let [w, h, _] = slot.dims;
        let texel = |x: i64, y: i64| {
            let x = extension[0].wrap(x, w);
            let y = extension[1].wrap(y, h);
            slot.texels[y * w + x]
        };
        match interpolation {
            Interpolation::Closest => {
                let x = (uv.x * w as f32).floor() as i64;
                let y = (uv.y * h as f32).floor() as i64;
                texel(x, y)
            }
            Interpolation::Linear => {
                let fx = uv.x * w as f32 - 0.5;
                let fy = uv.y * h as f32 - 0.5;
                let (x0, y0) = (fx.floor(), fy.floor());
                let (tx, ty) = (fx - x0, fy - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = texel(x0, y0).lerp(&texel(x0 + 1, y0), tx);
                let bottom = texel(x0, y0 + 1).lerp(&texel(x0 + 1, y0 + 1), tx);
                top.lerp(&bottom, ty)
            }
        }
    }

    /// Trilinear lookup in voxel units; voxel `i` is centered at `i + 0.5`.
    pub fn sample_3d(&self, handle: Option<ImageHandle>, p: Vec3) -> Vec4 {
        let Some(slot) = self.loaded_slot(handle) else {
            return MISSING_IMAGE_COLOR;
        };
        let [w, h, d] = slot.dims;
        let texel = |x: i64, y: i64, z: i64| {
            let x = Extension::Extend.wrap(x, w);
            let y = Extension::Extend.wrap(y, h);
            let z = Extension::Extend.wrap(z, d);
            slot.texels[(z * h + y) * w + x]
        };
        let f = p - Vec3::repeat(0.5);
        let base = f.map(f32::floor);
        let t = f - base;
        let (x, y, z) = (base.x as i64, base.y as i64, base.z as i64);
        let c00 = texel(x, y, z).lerp(&texel(x + 1, y, z), t.x);
        let c10 = texel(x, y + 1, z).lerp(&texel(x + 1, y + 1, z), t.x);
        let c01 = texel(x, y, z + 1).lerp(&texel(x + 1, y, z + 1), t.x);
        let c11 = texel(x, y + 1, z + 1).lerp(&texel(x + 1, y + 1, z + 1), t.x);
        let c0 = c00.lerp(&c10, t.y);
        let c1 = c01.lerp(&c11, t.y);
        c0.lerp(&c1, t.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BytesLoader {
        key: u32,
        dims: [usize; 3],
        channels: usize,
        data: Vec<u8>,
    }

    impl ImageLoader for BytesLoader {
        fn load_metadata(&self) -> Result<ImageMetaData, NativeError> {
            Ok(ImageMetaData {
                width: self.dims[0],
                height: self.dims[1],
                depth: self.dims[2],
                channels: self.channels,
                data_type: ImageDataType::Byte,
                byte_size: self.data.len(),
            })
        }

        fn load_pixels(&self, _: &ImageMetaData, pixels: &mut [u8]) -> Result<(), NativeError> {
            pixels.copy_from_slice(&self.data);
            Ok(())
        }

        fn name(&self) -> String {
            "test bytes".to_string()
        }

        fn equals(&self, other: &dyn ImageLoader) -> bool {
            other
                .as_any()
                .downcast_ref::<BytesLoader>()
                .is_some_and(|o| o.key == self.key)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn checker(key: u32) -> Box<BytesLoader> {
        Box::new(BytesLoader {
            key,
            dims: [2, 1, 1],
            channels: 1,
            data: vec![0, 255],
        })
    }

    #[test]
    fn test_dedup_and_refcount() {
        let mut images = ImageManager::new();
        let a = images.add_image(checker(1));
        let b = images.add_image(checker(1));
        let c = images.add_image(checker(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(images.len(), 2);

        images.remove_image(a);
        assert_eq!(images.len(), 2);
        images.remove_image(b);
        assert_eq!(images.len(), 1);
        assert!(!images.is_loaded(a));
    }

    #[test]
    fn test_failed_load_samples_magenta() {
        let mut images = ImageManager::new();
        let bad = images.add_image(Box::new(BytesLoader {
            key: 9,
            dims: [4, 4, 1],
            channels: 1,
            data: vec![0; 3],
        }));
        assert!(!images.is_loaded(bad));
        let c = images.sample_2d(
            Some(bad),
            Vec2::new(0.5, 0.5),
            Interpolation::Linear,
            [Extension::Repeat; 2],
        );
        assert_eq!(c, MISSING_IMAGE_COLOR);
        assert_eq!(images.sample_3d(None, Vec3::zeros()), MISSING_IMAGE_COLOR);
    }

    #[test]
    fn test_closest_and_linear_sampling() {
        let mut images = ImageManager::new();
        let h = images.add_image(checker(3));
        let ext = [Extension::Extend; 2];
        let left = images.sample_2d(Some(h), Vec2::new(0.25, 0.5), Interpolation::Closest, ext);
        let right = images.sample_2d(Some(h), Vec2::new(0.75, 0.5), Interpolation::Closest, ext);
        assert_eq!(left.x, 0.0);
        assert_eq!(right.x, 1.0);
        let mid = images.sample_2d(Some(h), Vec2::new(0.5, 0.5), Interpolation::Linear, ext);
        assert!((mid.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_extension_wrap() {
        assert_eq!(Extension::Repeat.wrap(-1, 4), 3);
        assert_eq!(Extension::Extend.wrap(7, 4), 3);
        assert_eq!(Extension::Mirror.wrap(4, 4), 3);
        assert_eq!(Extension::Mirror.wrap(-1, 4), 0);
    }

    #[test]
    fn test_sample_3d_voxel_centers() {
        let mut images = ImageManager::new();
        let h = images.add_image(checker(4));
        let v0 = images.sample_3d(Some(h), Vec3::new(0.5, 0.5, 0.5));
        let v1 = images.sample_3d(Some(h), Vec3::new(1.5, 0.5, 0.5));
        let mid = images.sample_3d(Some(h), Vec3::new(1.0, 0.5, 0.5));
        assert_eq!(v0.x, 0.0);
        assert_eq!(v1.x, 1.0);
        assert!((mid.x - 0.5).abs() < 1e-6);
    }
}
