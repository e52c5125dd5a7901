use std::fmt;

use bytemuck::{cast_slice, cast_slice_mut};

use crate::{ArrayElement, DataType};

/// Owned CPU tensor storage: raw little-endian bytes plus shape and element
/// type. This is the unit the checkpoint engine copies into and out of.
#[derive(Clone)]
pub struct Array {
    // 64-bit backing keeps the buffer aligned for every element type.
    words: Box<[u64]>,
    size_in_bytes: usize,
    shape: Box<[usize]>,
    data_type: DataType,
}

impl Array {
    pub fn zeros(
        shape: &[usize],
        data_type: DataType,
    ) -> Self {
        let size = shape.iter().product::<usize>() * data_type.size_in_bytes();
        Self {
            words: vec![0u64; size.div_ceil(8)].into_boxed_slice(),
            size_in_bytes: size,
            shape: shape.into(),
            data_type,
        }
    }

    pub fn from_elements<T: ArrayElement>(
        shape: &[usize],
        elements: &[T],
    ) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            elements.len(),
            "shape {:?} does not describe {} elements",
            shape,
            elements.len()
        );
        let mut array = Self::zeros(shape, T::data_type());
        array.buffer_mut().copy_from_slice(cast_slice(elements));
        array
    }

    pub fn from_bytes(
        shape: &[usize],
        data_type: DataType,
        bytes: &[u8],
    ) -> Self {
        assert_eq!(
            shape.iter().product::<usize>() * data_type.size_in_bytes(),
            bytes.len(),
            "shape {:?} of {:?} does not describe {} bytes",
            shape,
            data_type,
            bytes.len()
        );
        let mut array = Self::zeros(shape, data_type);
        array.buffer_mut().copy_from_slice(bytes);
        array
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    pub fn buffer(&self) -> &[u8] {
        &cast_slice::<u64, u8>(&self.words)[..self.size_in_bytes]
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut cast_slice_mut::<u64, u8>(&mut self.words)[..self.size_in_bytes]
    }

    /// Typed read view over the buffer. `None` if `T` does not match the
    /// array's element type.
    pub fn as_view<T: ArrayElement>(&self) -> Option<&[T]> {
        if T::data_type() == self.data_type {
            Some(cast_slice(self.buffer()))
        } else {
            None
        }
    }
}

impl PartialEq for Array {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.data_type == other.data_type
            && self.shape == other.shape
            && self.buffer() == other.buffer()
    }
}

impl fmt::Debug for Array {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Array")
            .field("shape", &self.shape)
            .field("data_type", &self.data_type)
            .field("size_in_bytes", &self.size_in_bytes)
            .finish()
    }
}
