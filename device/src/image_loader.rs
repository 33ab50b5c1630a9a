//! Image loaders feeding ANARI array payloads to the native image manager.

use std::any::Any;
use std::sync::Arc;

use anari_cycles_core::DataType;
use anari_cycles_core::data_type::ScalarKind;

use crate::array::Array;
use crate::error::NativeError;
use crate::native::image::{ImageDataType, ImageLoader, ImageMetaData};
use crate::object::ArrayHandle;

fn image_data_type(element_type: DataType, loader: &str) -> Result<ImageDataType, NativeError> {
    match element_type.scalar_kind() {
        ScalarKind::UFixed8 => Ok(ImageDataType::Byte),
        ScalarKind::UFixed16 => Ok(ImageDataType::UShort),
        ScalarKind::Float32 => Ok(ImageDataType::Float),
        _ => {
            log::error!(
                "Unsupported voxel data type {} for {} image loader",
                element_type,
                loader
            );
            Err(NativeError::UnsupportedImageType(element_type.to_string()))
        }
    }
}

/// Snapshot of an array payload taken when the loader is created.
#[derive(Debug, Clone)]
struct Payload {
    element_type: DataType,
    dims: [usize; 3],
    bytes: Arc<Vec<u8>>,
}

impl Payload {
    fn of(array: &Array) -> Self {
        Self {
            element_type: array.element_type(),
            dims: array.dims(),
            bytes: array.shared_bytes().unwrap_or_default(),
        }
    }

    fn metadata(&self, channels: usize, loader: &str) -> Result<ImageMetaData, NativeError> {
        Ok(ImageMetaData {
            width: self.dims[0],
            height: self.dims[1],
            depth: self.dims[2],
            channels,
            data_type: image_data_type(self.element_type, loader)?,
            byte_size: self.bytes.len(),
        })
    }

    fn copy_into(&self, metadata: &ImageMetaData, pixels: &mut [u8]) -> Result<(), NativeError> {
        let n = metadata.byte_size.min(pixels.len());
        let src = self.bytes.get(..n).ok_or(NativeError::ImageSizeMismatch {
            got: self.bytes.len(),
            expected: n,
        })?;
        pixels[..n].copy_from_slice(src);
        Ok(())
    }
}

/// 2D texture backed by a sampler's `image` array.
///
/// Two loaders are equal when they were taken from the same array with the
/// same payload, so samplers sharing an image share one native image.
#[derive(Debug, Clone)]
pub struct SamplerImageLoader {
    array: ArrayHandle,
    payload: Payload,
}

impl SamplerImageLoader {
    pub fn new(handle: ArrayHandle, array: &Array) -> Self {
        Self {
            array: handle,
            payload: Payload::of(array),
        }
    }
}

impl ImageLoader for SamplerImageLoader {
    fn load_metadata(&self) -> Result<ImageMetaData, NativeError> {
        let channels = self.payload.element_type.components();
        self.payload.metadata(channels, "ANARI Sampler")
    }

    fn load_pixels(&self, metadata: &ImageMetaData, pixels: &mut [u8]) -> Result<(), NativeError> {
        self.payload.copy_into(metadata, pixels)
    }

    fn name(&self) -> String {
        "ANARI Sampler".to_string()
    }

    fn equals(&self, other: &dyn ImageLoader) -> bool {
        other
            .as_any()
            .downcast_ref::<SamplerImageLoader>()
            .is_some_and(|o| {
                o.array == self.array && Arc::ptr_eq(&o.payload.bytes, &self.payload.bytes)
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Single channel voxel grid backed by a spatial field's `data` array.
#[derive(Debug, Clone)]
pub struct VolumeImageLoader {
    payload: Payload,
}

impl VolumeImageLoader {
    pub fn new(array: &Array) -> Self {
        Self {
            payload: Payload::of(array),
        }
    }
}

impl ImageLoader for VolumeImageLoader {
    fn load_metadata(&self) -> Result<ImageMetaData, NativeError> {
        self.payload.metadata(1, "ANARI Volume")
    }

    fn load_pixels(&self, metadata: &ImageMetaData, pixels: &mut [u8]) -> Result<(), NativeError> {
        self.payload.copy_into(metadata, pixels)
    }

    fn name(&self) -> String {
        "ANARI Volume".to_string()
    }

    // Every field upload gets its own image.
    fn equals(&self, _other: &dyn ImageLoader) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
