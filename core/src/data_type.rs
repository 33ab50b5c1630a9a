//! ANARI element and object type tags.
//!
//! [`DataType`] names every type an array element, a parameter or a frame
//! channel can have. Array payloads are kept as raw bytes; the conversion
//! helpers here decode single elements into a canonical `float4` and encode
//! linear colors back into packed 8-bit RGBA.

use crate::math::Vec4;

/// Scalar storage class of a [`DataType`]'s components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int32,
    UInt32,
    /// Normalized unsigned 8-bit.
    UFixed8,
    /// Normalized unsigned 16-bit.
    UFixed16,
    /// Normalized signed 16-bit.
    Fixed16,
    Float32,
    Float64,
    /// Not a numeric type.
    None,
}

/// ANARI data type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    #[default]
    Unknown,

    // Objects
    Array1D,
    Array2D,
    Array3D,
    Camera,
    Frame,
    Geometry,
    Group,
    Instance,
    Light,
    Material,
    Renderer,
    Sampler,
    SpatialField,
    Surface,
    Volume,
    World,

    // Non-numeric values
    String,
    StringList,
    Bool,

    // Integers
    Int32,
    Int32Vec2,
    Int32Vec3,
    Int32Vec4,
    UInt32,
    UInt32Vec2,
    UInt32Vec3,
    UInt32Vec4,

    // Normalized fixed point
    UFixed8,
    UFixed8Vec2,
    UFixed8Vec3,
    UFixed8Vec4,
    UFixed8RgbaSrgb,
    UFixed16,
    UFixed16Vec2,
    UFixed16Vec3,
    UFixed16Vec4,
    Fixed16,

    // Floating point
    Float32,
    Float32Vec2,
    Float32Vec3,
    Float32Vec4,
    Float32Mat4,
    Float32Box1,
    Float32Box3,
    Float64,
}

impl DataType {
    /// Returns `true` for scene object types.
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Self::Array1D
                | Self::Array2D
                | Self::Array3D
                | Self::Camera
                | Self::Frame
                | Self::Geometry
                | Self::Group
                | Self::Instance
                | Self::Light
                | Self::Material
                | Self::Renderer
                | Self::Sampler
                | Self::SpatialField
                | Self::Surface
                | Self::Volume
                | Self::World
        )
    }

    /// Returns `true` for the three array types.
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array1D | Self::Array2D | Self::Array3D)
    }

    /// Scalar storage class of each component.
    pub fn scalar_kind(&self) -> ScalarKind {
        match self {
            Self::Int32 | Self::Int32Vec2 | Self::Int32Vec3 | Self::Int32Vec4 => ScalarKind::Int32,
            Self::UInt32 | Self::UInt32Vec2 | Self::UInt32Vec3 | Self::UInt32Vec4 => {
                ScalarKind::UInt32
            }
            Self::UFixed8
            | Self::UFixed8Vec2
            | Self::UFixed8Vec3
            | Self::UFixed8Vec4
            | Self::UFixed8RgbaSrgb => ScalarKind::UFixed8,
            Self::UFixed16 | Self::UFixed16Vec2 | Self::UFixed16Vec3 | Self::UFixed16Vec4 => {
                ScalarKind::UFixed16
            }
            Self::Fixed16 => ScalarKind::Fixed16,
            Self::Float32
            | Self::Float32Vec2
            | Self::Float32Vec3
            | Self::Float32Vec4
            | Self::Float32Mat4
            | Self::Float32Box1
            | Self::Float32Box3 => ScalarKind::Float32,
            Self::Float64 => ScalarKind::Float64,
            _ => ScalarKind::None,
        }
    }

    /// Number of scalar components per element.
    pub fn components(&self) -> usize {
        match self {
            Self::Int32 | Self::UInt32 | Self::UFixed8 | Self::UFixed16 | Self::Fixed16 => 1,
            Self::Float32 | Self::Float64 | Self::Bool => 1,
            Self::Int32Vec2
            | Self::UInt32Vec2
            | Self::UFixed8Vec2
            | Self::UFixed16Vec2
            | Self::Float32Vec2
            | Self::Float32Box1 => 2,
            Self::Int32Vec3
            | Self::UInt32Vec3
            | Self::UFixed8Vec3
            | Self::UFixed16Vec3
            | Self::Float32Vec3 => 3,
            Self::Int32Vec4
            | Self::UInt32Vec4
            | Self::UFixed8Vec4
            | Self::UFixed8RgbaSrgb
            | Self::UFixed16Vec4
            | Self::Float32Vec4 => 4,
            Self::Float32Box3 => 6,
            Self::Float32Mat4 => 16,
            _ => 0,
        }
    }

    /// Size of one element in bytes.
    pub fn size_of(&self) -> usize {
        let scalar = match self.scalar_kind() {
            ScalarKind::UFixed8 => 1,
            ScalarKind::UFixed16 | ScalarKind::Fixed16 => 2,
            ScalarKind::Int32 | ScalarKind::UInt32 | ScalarKind::Float32 => 4,
            ScalarKind::Float64 => 8,
            ScalarKind::None => {
                return match self {
                    Self::Bool => 4,
                    t if t.is_object() => std::mem::size_of::<u64>(),
                    _ => 0,
                };
            }
        };
        scalar * self.components()
    }

    /// The ANARI spelling of this type, used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "ANARI_UNKNOWN",
            Self::Array1D => "ANARI_ARRAY1D",
            Self::Array2D => "ANARI_ARRAY2D",
            Self::Array3D => "ANARI_ARRAY3D",
            Self::Camera => "ANARI_CAMERA",
            Self::Frame => "ANARI_FRAME",
            Self::Geometry => "ANARI_GEOMETRY",
            Self::Group => "ANARI_GROUP",
            Self::Instance => "ANARI_INSTANCE",
            Self::Light => "ANARI_LIGHT",
            Self::Material => "ANARI_MATERIAL",
            Self::Renderer => "ANARI_RENDERER",
            Self::Sampler => "ANARI_SAMPLER",
            Self::SpatialField => "ANARI_SPATIAL_FIELD",
            Self::Surface => "ANARI_SURFACE",
            Self::Volume => "ANARI_VOLUME",
            Self::World => "ANARI_WORLD",
            Self::String => "ANARI_STRING",
            Self::StringList => "ANARI_STRING_LIST",
            Self::Bool => "ANARI_BOOL",
            Self::Int32 => "ANARI_INT32",
            Self::Int32Vec2 => "ANARI_INT32_VEC2",
            Self::Int32Vec3 => "ANARI_INT32_VEC3",
            Self::Int32Vec4 => "ANARI_INT32_VEC4",
            Self::UInt32 => "ANARI_UINT32",
            Self::UInt32Vec2 => "ANARI_UINT32_VEC2",
            Self::UInt32Vec3 => "ANARI_UINT32_VEC3",
            Self::UInt32Vec4 => "ANARI_UINT32_VEC4",
            Self::UFixed8 => "ANARI_UFIXED8",
            Self::UFixed8Vec2 => "ANARI_UFIXED8_VEC2",
            Self::UFixed8Vec3 => "ANARI_UFIXED8_VEC3",
            Self::UFixed8Vec4 => "ANARI_UFIXED8_VEC4",
            Self::UFixed8RgbaSrgb => "ANARI_UFIXED8_RGBA_SRGB",
            Self::UFixed16 => "ANARI_UFIXED16",
            Self::UFixed16Vec2 => "ANARI_UFIXED16_VEC2",
            Self::UFixed16Vec3 => "ANARI_UFIXED16_VEC3",
            Self::UFixed16Vec4 => "ANARI_UFIXED16_VEC4",
            Self::Fixed16 => "ANARI_FIXED16",
            Self::Float32 => "ANARI_FLOAT32",
            Self::Float32Vec2 => "ANARI_FLOAT32_VEC2",
            Self::Float32Vec3 => "ANARI_FLOAT32_VEC3",
            Self::Float32Vec4 => "ANARI_FLOAT32_VEC4",
            Self::Float32Mat4 => "ANARI_FLOAT32_MAT4",
            Self::Float32Box1 => "ANARI_FLOAT32_BOX1",
            Self::Float32Box3 => "ANARI_FLOAT32_BOX3",
            Self::Float64 => "ANARI_FLOAT64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn read_scalar(kind: ScalarKind, bytes: &[u8]) -> f32 {
    match kind {
        ScalarKind::Int32 => bytemuck::pod_read_unaligned::<i32>(&bytes[..4]) as f32,
        ScalarKind::UInt32 => bytemuck::pod_read_unaligned::<u32>(&bytes[..4]) as f32,
        ScalarKind::UFixed8 => bytes[0] as f32 / u8::MAX as f32,
        ScalarKind::UFixed16 => {
            bytemuck::pod_read_unaligned::<u16>(&bytes[..2]) as f32 / u16::MAX as f32
        }
        ScalarKind::Fixed16 => {
            let v = bytemuck::pod_read_unaligned::<i16>(&bytes[..2]) as f32 / i16::MAX as f32;
            v.max(-1.0)
        }
        ScalarKind::Float32 => bytemuck::pod_read_unaligned::<f32>(&bytes[..4]),
        ScalarKind::Float64 => bytemuck::pod_read_unaligned::<f64>(&bytes[..8]) as f32,
        ScalarKind::None => 0.0,
    }
}

/// Decode element `index` of a packed `ty` array into a `float4`.
///
/// Missing components default to `(0, 0, 0, 1)`. Out-of-range indices and
/// non-numeric types decode to that default as well.
pub fn to_float4(ty: DataType, bytes: &[u8], index: usize) -> Vec4 {
    let mut out = Vec4::new(0.0, 0.0, 0.0, 1.0);
    let kind = ty.scalar_kind();
    let stride = ty.size_of();
    if kind == ScalarKind::None || stride == 0 {
        return out;
    }
    let start = index * stride;
    let Some(element) = bytes.get(start..start + stride) else {
        return out;
    };
    let scalar_size = stride / ty.components();
    for c in 0..ty.components().min(4) {
        out[c] = read_scalar(kind, &element[c * scalar_size..]);
    }
    if ty == DataType::UFixed8RgbaSrgb {
        for c in 0..3 {
            out[c] = srgb_to_linear(out[c]);
        }
    }
    out
}

/// sRGB transfer function, encoded to linear.
pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB transfer function, linear to encoded.
pub fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

fn unorm8(v: f32) -> u32 {
    (v.clamp(0.0, 1.0) * 255.0) as u32
}

/// Pack a linear color as RGBA8 (`r` in the lowest byte).
pub fn cvt_color_to_u32(c: &Vec4) -> u32 {
    unorm8(c.x) | (unorm8(c.y) << 8) | (unorm8(c.z) << 16) | (unorm8(c.w) << 24)
}

/// Pack a linear color as sRGB-encoded RGBA8. Alpha stays linear.
pub fn cvt_color_to_u32_srgb(c: &Vec4) -> u32 {
    cvt_color_to_u32(&Vec4::new(
        linear_to_srgb(c.x.clamp(0.0, 1.0)),
        linear_to_srgb(c.y.clamp(0.0, 1.0)),
        linear_to_srgb(c.z.clamp(0.0, 1.0)),
        c.w,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(DataType::Float32Vec3.size_of(), 12);
        assert_eq!(DataType::UFixed8Vec4.size_of(), 4);
        assert_eq!(DataType::UFixed16.size_of(), 2);
        assert_eq!(DataType::Float32Mat4.size_of(), 64);
        assert_eq!(DataType::UInt32Vec3.size_of(), 12);
        assert_eq!(DataType::Unknown.size_of(), 0);
    }

    #[test]
    fn test_object_types() {
        assert!(DataType::World.is_object());
        assert!(DataType::Array2D.is_array());
        assert!(!DataType::Float32.is_object());
    }

    #[test]
    fn test_float3_to_float4_fills_alpha() {
        let data: [f32; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let bytes = bytemuck::cast_slice(&data);
        let v = to_float4(DataType::Float32Vec3, bytes, 1);
        assert_eq!(v, Vec4::new(4.0, 5.0, 6.0, 1.0));
    }

    #[test]
    fn test_ufixed8_normalizes() {
        let bytes = [255u8, 0, 51, 255];
        let v = to_float4(DataType::UFixed8Vec4, &bytes, 0);
        assert!((v.x - 1.0).abs() < 1e-6);
        assert!((v.z - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_is_default() {
        let bytes = [0u8; 4];
        let v = to_float4(DataType::Float32, &bytes, 3);
        assert_eq!(v, Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_pack_linear_color() {
        let packed = cvt_color_to_u32(&Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(packed.to_le_bytes(), [255, 0, 0, 255]);
    }

    #[test]
    fn test_pack_srgb_brightens_midtones() {
        let lin = cvt_color_to_u32(&Vec4::new(0.2, 0.2, 0.2, 1.0)).to_le_bytes();
        let srgb = cvt_color_to_u32_srgb(&Vec4::new(0.2, 0.2, 0.2, 1.0)).to_le_bytes();
        assert!(srgb[0] > lin[0]);
        assert_eq!(srgb[3], 255);
    }
}
