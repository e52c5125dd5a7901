use std::{
    collections::{HashMap, hash_map::Keys},
    fs::File,
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

use super::safetensors_metadata::{
    HashMetadata, HeaderLoadingError, read_metadata,
};
use crate::{Array, DataType};

#[derive(Debug, Error)]
pub enum TensorReadError {
    #[error("Tensor with key \"{0}\" not found.")]
    KeyNotFound(String),
    #[error(
        "Size mismatch: tensor of shape {shape:?} and data type \
        {data_type:?} expected to be {expected_size} bytes, got {actual_size} bytes."
    )]
    SizeMismatch {
        data_type: DataType,
        shape: Box<[usize]>,
        expected_size: usize,
        actual_size: usize,
    },
    #[error("Failed to read tensor data")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct TensorEntry {
    shape: Box<[usize]>,
    data_type: DataType,
    offset: usize,
    size: usize,
}

impl TensorEntry {
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size
    }
}

fn metadata_into_index(
    data_offset: usize,
    metadata: HashMetadata,
) -> HashMap<String, TensorEntry> {
    metadata
        .tensors
        .into_iter()
        .map(|(key, value)| {
            let (local_begin, local_end) = value.data_offsets;
            let entry = TensorEntry {
                shape: value.shape.into(),
                data_type: value.dtype.into(),
                offset: data_offset + local_begin,
                size: local_end - local_begin,
            };
            (key, entry)
        })
        .collect()
}

/// One on-disk unit of a checkpoint: a safetensors file holding a subset of
/// the serialized tensor namespace. Opening parses the header only; the file
/// handle is released as soon as the index is built.
pub struct WeightsFile {
    path: PathBuf,
    index: HashMap<String, TensorEntry>,
}

impl WeightsFile {
    pub fn open(path: &Path) -> Result<Self, HeaderLoadingError> {
        let file = File::open(path)?;
        let (data_offset, metadata) = read_metadata(&file)?;
        let index = metadata_into_index(data_offset, metadata);
        debug!(path = ?path, tensors = index.len(), "indexed weights file");
        Ok(Self {
            path: path.to_path_buf(),
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> Keys<'_, String, TensorEntry> {
        self.index.keys()
    }

    pub fn entry(
        &self,
        key: &str,
    ) -> Option<&TensorEntry> {
        self.index.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &TensorEntry)> {
        self.index.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Reopens the file for tensor reads. The returned reader owns the
    /// handle; drop it as soon as the tensors of this file are drained.
    pub fn reader(&self) -> std::io::Result<WeightsReader<'_>> {
        Ok(WeightsReader {
            file: File::open(&self.path)?,
            index: &self.index,
        })
    }
}

pub struct WeightsReader<'index> {
    file: File,
    index: &'index HashMap<String, TensorEntry>,
}

impl WeightsReader<'_> {
    /// Materializes the tensor stored under `key`.
    pub fn tensor(
        &self,
        key: &str,
    ) -> Result<Array, TensorReadError> {
        let entry = self
            .index
            .get(key)
            .ok_or_else(|| TensorReadError::KeyNotFound(key.to_string()))?;
        let mut array = Array::zeros(&entry.shape, entry.data_type);
        let expected_size = array.size_in_bytes();
        if expected_size != entry.size {
            return Err(TensorReadError::SizeMismatch {
                data_type: entry.data_type,
                shape: entry.shape.clone(),
                expected_size,
                actual_size: entry.size,
            });
        }
        self.file.read_exact_at(array.buffer_mut(), entry.offset as u64)?;
        Ok(array)
    }
}
