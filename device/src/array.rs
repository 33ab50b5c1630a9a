//! Typed data arrays.
//!
//! Numeric arrays keep their payload as packed little-endian bytes behind an
//! `Arc`, so native images can hold a snapshot while the application maps
//! the array for writing: mapping copies the payload only when a snapshot
//! is still alive. Object arrays hold handles.

use std::sync::Arc;

use anari_cycles_core::DataType;
use anari_cycles_core::data_type::to_float4;
use anari_cycles_core::math::Vec4;

use crate::object::{Object, ObjectBase, ObjectHandle};

/// Plain data types that can back an array.
pub trait ArrayElement: bytemuck::Pod {
    const DATA_TYPE: DataType;
}

macro_rules! array_element {
    ($($ty:ty => $data_type:ident),* $(,)?) => {
        $(
            impl ArrayElement for $ty {
                const DATA_TYPE: DataType = DataType::$data_type;
            }
        )*
    };
}

array_element! {
    f32 => Float32,
    [f32; 2] => Float32Vec2,
    [f32; 3] => Float32Vec3,
    [f32; 4] => Float32Vec4,
    [f32; 16] => Float32Mat4,
    u8 => UFixed8,
    [u8; 4] => UFixed8Vec4,
    u16 => UFixed16,
    u32 => UInt32,
    [u32; 2] => UInt32Vec2,
    [u32; 3] => UInt32Vec3,
}

#[derive(Debug, Clone)]
enum ArrayData {
    Bytes(Arc<Vec<u8>>),
    Objects(Vec<ObjectHandle>),
}

/// A 1D, 2D or 3D array of elements of one type.
#[derive(Debug, Clone)]
pub struct Array {
    base: ObjectBase,
    element_type: DataType,
    dims: [usize; 3],
    data: ArrayData,
}

impl Array {
    fn rank_type(dims: [usize; 3]) -> DataType {
        if dims[2] > 1 {
            DataType::Array3D
        } else if dims[1] > 1 {
            DataType::Array2D
        } else {
            DataType::Array1D
        }
    }

    /// Numeric array over packed bytes.
    ///
    /// Missing trailing bytes are zero filled; extra bytes are dropped. A
    /// zero dimension gives an empty array.
    pub fn from_bytes(element_type: DataType, dims: [usize; 3], mut bytes: Vec<u8>) -> Self {
        let expected = dims.iter().product::<usize>() * element_type.size_of();
        if bytes.len() != expected {
            log::warn!(
                "array of {} {:?} given {} bytes, expected {}",
                element_type,
                dims,
                bytes.len(),
                expected
            );
            bytes.resize(expected, 0);
        }
        Self {
            base: ObjectBase::new(Self::rank_type(dims), ""),
            element_type,
            dims,
            data: ArrayData::Bytes(Arc::new(bytes)),
        }
    }

    /// Numeric array from typed elements.
    pub fn from_slice<T: ArrayElement>(dims: [usize; 3], data: &[T]) -> Self {
        Self::from_bytes(T::DATA_TYPE, dims, bytemuck::cast_slice(data).to_vec())
    }

    /// 1D array of object handles.
    pub fn from_objects(element_type: DataType, handles: &[ObjectHandle]) -> Self {
        Self {
            base: ObjectBase::new(DataType::Array1D, ""),
            element_type,
            dims: [handles.len(), 1, 1],
            data: ArrayData::Objects(handles.to_vec()),
        }
    }

    pub fn element_type(&self) -> DataType {
        self.element_type
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn size(&self, axis: usize) -> usize {
        self.dims.get(axis).copied().unwrap_or(1)
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        match &self.data {
            ArrayData::Bytes(_) => self.dims.iter().product(),
            ArrayData::Objects(handles) => handles.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_object_array(&self) -> bool {
        matches!(self.data, ArrayData::Objects(_))
    }

    /// Raw payload, empty for object arrays.
    pub fn bytes(&self) -> &[u8] {
        match &self.data {
            ArrayData::Bytes(b) => b,
            ArrayData::Objects(_) => &[],
        }
    }

    /// Shared payload for snapshotting into native images.
    pub fn shared_bytes(&self) -> Option<Arc<Vec<u8>>> {
        match &self.data {
            ArrayData::Bytes(b) => Some(Arc::clone(b)),
            ArrayData::Objects(_) => None,
        }
    }

    /// Element `i` widened to `float4`.
    pub fn float4(&self, i: usize) -> Vec4 {
        to_float4(self.element_type, self.bytes(), i)
    }

    /// Element `i` as `T` if the element type matches.
    pub fn get<T: ArrayElement>(&self, i: usize) -> Option<T> {
        if T::DATA_TYPE != self.element_type {
            return None;
        }
        let size = std::mem::size_of::<T>();
        let bytes = self.bytes().get(i * size..(i + 1) * size)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }

    /// Every element as `T`, or `None` if the element type differs.
    pub fn to_vec<T: ArrayElement>(&self) -> Option<Vec<T>> {
        if T::DATA_TYPE != self.element_type {
            return None;
        }
        Some(
            self.bytes()
                .chunks_exact(std::mem::size_of::<T>())
                .map(bytemuck::pod_read_unaligned)
                .collect(),
        )
    }

    pub fn objects(&self) -> &[ObjectHandle] {
        match &self.data {
            ArrayData::Objects(handles) => handles,
            ArrayData::Bytes(_) => &[],
        }
    }

    /// Writable payload. Copies if a snapshot still shares it.
    pub fn map(&mut self) -> &mut [u8] {
        match &mut self.data {
            ArrayData::Bytes(b) => Arc::make_mut(b).as_mut_slice(),
            ArrayData::Objects(_) => &mut [],
        }
    }

    /// Writable handle list of an object array.
    pub fn map_objects(&mut self) -> Option<&mut Vec<ObjectHandle>> {
        match &mut self.data {
            ArrayData::Objects(handles) => Some(handles),
            ArrayData::Bytes(_) => None,
        }
    }
}

impl Object for Array {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {}

    fn referenced(&self) -> Vec<ObjectHandle> {
        self.objects().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let array = Array::from_slice([2, 1, 1], &[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(array.element_type(), DataType::Float32Vec3);
        assert_eq!(array.base().data_type(), DataType::Array1D);
        assert_eq!(array.get::<[f32; 3]>(1), Some([4.0, 5.0, 6.0]));
        assert_eq!(array.get::<f32>(0), None);
        assert_eq!(array.float4(0), Vec4::new(1.0, 2.0, 3.0, 1.0));
    }

    #[test]
    fn test_rank_from_dims() {
        let a2 = Array::from_slice([2, 2, 1], &[0u8; 4]);
        let a3 = Array::from_slice([2, 2, 2], &[0.0f32; 8]);
        assert_eq!(a2.base().data_type(), DataType::Array2D);
        assert_eq!(a3.base().data_type(), DataType::Array3D);
        assert_eq!(a3.len(), 8);
    }

    #[test]
    fn test_map_copies_shared_payload() {
        let mut array = Array::from_slice([1, 1, 1], &[1.0f32]);
        let snapshot = array.shared_bytes().unwrap();
        array.map().copy_from_slice(&2.0f32.to_le_bytes());
        assert_eq!(array.get::<f32>(0), Some(2.0));
        assert_eq!(bytemuck::pod_read_unaligned::<f32>(&snapshot), 1.0);
    }

    #[test]
    fn test_short_payload_is_padded() {
        let array = Array::from_bytes(DataType::Float32, [4, 1, 1], vec![0; 4]);
        assert_eq!(array.bytes().len(), 16);
    }

    #[test]
    fn test_zero_length_arrays_are_empty() {
        let numeric = Array::from_slice::<[f32; 3]>([0, 1, 1], &[]);
        assert!(numeric.is_empty());
        assert!(numeric.bytes().is_empty());
        assert_eq!(numeric.get::<[f32; 3]>(0), None);
        assert_eq!(numeric.dims(), [0, 1, 1]);

        let objects = Array::from_objects(DataType::Surface, &[]);
        assert!(objects.is_empty());
        assert_eq!(objects.dims(), [0, 1, 1]);
    }
}
