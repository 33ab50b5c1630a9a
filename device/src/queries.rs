//! Values returned by property queries and the device's static capabilities.

use anari_cycles_core::DataType;
use anari_cycles_core::math::Box3;

/// Result of a `get_property` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Box3(Box3),
    StringList(&'static [&'static str]),
}

impl PropertyValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::Int(_) => DataType::Int32,
            Self::Float(_) => DataType::Float32,
            Self::Box3(_) => DataType::Float32Box3,
            Self::StringList(_) => DataType::StringList,
        }
    }
}

/// Whether a query may block on the in-flight frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMask {
    #[default]
    NoWait,
    Wait,
}

/// Extensions reported through the device `"feature"` property.
pub const EXTENSIONS: &[&str] = &[
    "ANARI_KHR_CAMERA_ORTHOGRAPHIC",
    "ANARI_KHR_CAMERA_PERSPECTIVE",
    "ANARI_KHR_FRAME_CHANNEL_DEPTH",
    "ANARI_KHR_GEOMETRY_SPHERE",
    "ANARI_KHR_GEOMETRY_TRIANGLE",
    "ANARI_KHR_INSTANCE_TRANSFORM",
    "ANARI_KHR_LIGHT_DIRECTIONAL",
    "ANARI_KHR_LIGHT_HDRI",
    "ANARI_KHR_MATERIAL_MATTE",
    "ANARI_KHR_MATERIAL_PHYSICALLY_BASED",
    "ANARI_KHR_SAMPLER_IMAGE2D",
    "ANARI_KHR_SPATIAL_FIELD_STRUCTURED_REGULAR",
    "ANARI_KHR_VOLUME_TRANSFER_FUNCTION1D",
];

/// Subtypes the device constructs for `ty`. Categories without subtypes
/// report nothing.
pub fn object_subtypes(ty: DataType) -> &'static [&'static str] {
    match ty {
        DataType::Camera => &["perspective", "orthographic"],
        DataType::Geometry => &["triangle", "sphere"],
        DataType::Light => &["directional", "hdri"],
        DataType::Material => &["matte", "physicallyBased"],
        DataType::Sampler => &["image2D"],
        DataType::SpatialField => &["structuredRegular"],
        DataType::Volume => &["transferFunction1D"],
        DataType::Renderer => &["default"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtypes_match_extensions() {
        assert!(object_subtypes(DataType::Geometry).contains(&"sphere"));
        assert!(EXTENSIONS.contains(&"ANARI_KHR_GEOMETRY_SPHERE"));
        assert!(object_subtypes(DataType::Surface).is_empty());
    }

    #[test]
    fn test_property_types() {
        assert_eq!(PropertyValue::Bool(true).data_type(), DataType::Bool);
        assert_eq!(
            PropertyValue::Box3(Box3::empty()).data_type(),
            DataType::Float32Box3
        );
    }
}
