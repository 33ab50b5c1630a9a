//! Typed ANARI parameter values.
//!
//! Every object carries a [`ParameterSet`]. The application writes values
//! with `set`, objects read them back during `commit_parameters` through
//! [`FromParam`], which converts between the closely related ANARI types an
//! application may legally pass for one parameter (e.g. a `float3` color
//! where a `float4` is expected).

use std::collections::HashMap;

use anari_cycles_core::DataType;
use anari_cycles_core::math::{Box1, Mat4, UVec2, UVec3, Vec2, Vec3, Vec4, mat4_from_cols_array};

use crate::object::ObjectHandle;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    UVec2(UVec2),
    UVec3(UVec3),
    Mat4(Mat4),
    Box1(Box1),
    String(String),
    /// A type tag, e.g. a frame channel format.
    DataType(DataType),
    Object(ObjectHandle),
}

impl ParamValue {
    /// ANARI type of the stored value.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::Int(_) => DataType::Int32,
            Self::UInt(_) => DataType::UInt32,
            Self::Float(_) => DataType::Float32,
            Self::Vec2(_) => DataType::Float32Vec2,
            Self::Vec3(_) => DataType::Float32Vec3,
            Self::Vec4(_) => DataType::Float32Vec4,
            Self::UVec2(_) => DataType::UInt32Vec2,
            Self::UVec3(_) => DataType::UInt32Vec3,
            Self::Mat4(_) => DataType::Float32Mat4,
            Self::Box1(_) => DataType::Float32Box1,
            Self::String(_) => DataType::String,
            Self::DataType(_) => DataType::Unknown,
            Self::Object(h) => h.data_type(),
        }
    }
}

/// Conversion out of a [`ParamValue`].
pub trait FromParam: Sized {
    fn from_param(value: &ParamValue) -> Option<Self>;
}

impl FromParam for bool {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Int(i) => Some(*i != 0),
            ParamValue::UInt(u) => Some(*u != 0),
            _ => None,
        }
    }
}

impl FromParam for i32 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(i) => Some(*i),
            ParamValue::UInt(u) => i32::try_from(*u).ok(),
            _ => None,
        }
    }
}

impl FromParam for u32 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::UInt(u) => Some(*u),
            ParamValue::Int(i) => u32::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl FromParam for f32 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f32),
            ParamValue::UInt(u) => Some(*u as f32),
            _ => None,
        }
    }
}

impl FromParam for Vec2 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Vec2(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromParam for Vec3 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Vec3(v) => Some(*v),
            ParamValue::Vec4(v) => Some(v.xyz()),
            _ => None,
        }
    }
}

impl FromParam for Vec4 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Vec4(v) => Some(*v),
            ParamValue::Vec3(v) => Some(Vec4::new(v.x, v.y, v.z, 1.0)),
            _ => None,
        }
    }
}

impl FromParam for UVec2 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::UVec2(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromParam for UVec3 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::UVec3(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromParam for Mat4 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Mat4(m) => Some(*m),
            _ => None,
        }
    }
}

impl FromParam for Box1 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Box1(b) => Some(*b),
            ParamValue::Vec2(v) => Some(Box1::new(v.x, v.y)),
            _ => None,
        }
    }
}

impl FromParam for String {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromParam for DataType {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::DataType(t) => Some(*t),
            _ => None,
        }
    }
}

impl FromParam for ObjectHandle {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Object(h) => Some(*h),
            _ => None,
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(v: $ty) -> Self {
                    ParamValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i32 => Int,
    u32 => UInt,
    f32 => Float,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    UVec2 => UVec2,
    UVec3 => UVec3,
    Mat4 => Mat4,
    Box1 => Box1,
    String => String,
    DataType => DataType,
    ObjectHandle => Object,
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

impl From<[f32; 2]> for ParamValue {
    fn from(v: [f32; 2]) -> Self {
        ParamValue::Vec2(Vec2::from(v))
    }
}

impl From<[f32; 3]> for ParamValue {
    fn from(v: [f32; 3]) -> Self {
        ParamValue::Vec3(Vec3::from(v))
    }
}

impl From<[f32; 4]> for ParamValue {
    fn from(v: [f32; 4]) -> Self {
        ParamValue::Vec4(Vec4::from(v))
    }
}

impl From<[u32; 2]> for ParamValue {
    fn from(v: [u32; 2]) -> Self {
        ParamValue::UVec2(UVec2::from(v))
    }
}

impl From<[u32; 3]> for ParamValue {
    fn from(v: [u32; 3]) -> Self {
        ParamValue::UVec3(UVec3::from(v))
    }
}

/// Column-major matrix, as ANARI lays out `FLOAT32_MAT4`.
impl From<[f32; 16]> for ParamValue {
    fn from(v: [f32; 16]) -> Self {
        ParamValue::Mat4(mat4_from_cols_array(&v))
    }
}

/// Named parameters of one object.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    params: HashMap<String, ParamValue>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: ParamValue) {
        self.params.insert(name.to_string(), value);
    }

    /// Removes a parameter, returning whether it was set.
    pub fn remove(&mut self, name: &str) -> bool {
        self.params.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn raw(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Typed lookup. A value of an incompatible type reads as unset.
    pub fn get<T: FromParam>(&self, name: &str) -> Option<T> {
        let value = self.params.get(name)?;
        let converted = T::from_param(value);
        if converted.is_none() {
            log::debug!(
                "parameter '{}' has type {} which cannot be read as requested",
                name,
                value.data_type()
            );
        }
        converted
    }

    pub fn get_or<T: FromParam>(&self, name: &str, default: T) -> T {
        self.get(name).unwrap_or(default)
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get(name)
    }

    pub fn get_object(&self, name: &str) -> Option<ObjectHandle> {
        self.get(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_with_default() {
        let mut params = ParameterSet::new();
        params.set("opacity", 0.5f32.into());
        assert_eq!(params.get_or("opacity", 1.0f32), 0.5);
        assert_eq!(params.get_or("missing", 1.0f32), 1.0);
    }

    #[test]
    fn test_widening_conversions() {
        let mut params = ParameterSet::new();
        params.set("color", [1.0f32, 0.5, 0.25].into());
        params.set("count", 3i32.into());
        let c: Vec4 = params.get("color").unwrap();
        assert_eq!(c, Vec4::new(1.0, 0.5, 0.25, 1.0));
        assert_eq!(params.get::<u32>("count"), Some(3));
        assert_eq!(params.get::<f32>("count"), Some(3.0));
    }

    #[test]
    fn test_type_mismatch_reads_unset() {
        let mut params = ParameterSet::new();
        params.set("name", "matte".into());
        assert_eq!(params.get::<f32>("name"), None);
        assert_eq!(params.get_string("name").as_deref(), Some("matte"));
    }

    #[test]
    fn test_remove() {
        let mut params = ParameterSet::new();
        params.set("size", [4u32, 4].into());
        assert!(params.remove("size"));
        assert!(!params.remove("size"));
        assert!(params.is_empty());
    }
}
