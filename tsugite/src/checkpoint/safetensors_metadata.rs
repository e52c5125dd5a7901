use std::{collections::HashMap, fs::File, os::unix::fs::FileExt};

use serde::Deserialize;
use thiserror::Error;

use crate::DataType;

/// Largest header this loader accepts, matching the limit of the reference
/// safetensors implementation.
pub const MAX_HEADER_SIZE: usize = 100_000_000;

#[derive(Debug, Error)]
pub enum HeaderLoadingError {
    #[error("Failed to read safetensors header")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse safetensors header")]
    InvalidJson(#[from] serde_json::Error),
    #[error(
        "Header of {0} bytes exceeds the {MAX_HEADER_SIZE} byte limit."
    )]
    HeaderTooLarge(u64),
}

#[derive(Debug, Deserialize, PartialEq, Eq, Copy, Clone)]
pub enum Dtype {
    F64,
    F32,
    F16,
    BF16,
    I64,
    U64,
    I32,
    U32,
    I16,
    U16,
    I8,
    U8,
}

impl From<Dtype> for DataType {
    fn from(dtype: Dtype) -> Self {
        match dtype {
            Dtype::F64 => DataType::F64,
            Dtype::F32 => DataType::F32,
            Dtype::F16 => DataType::F16,
            Dtype::BF16 => DataType::BF16,
            Dtype::I64 => DataType::I64,
            Dtype::U64 => DataType::U64,
            Dtype::I32 => DataType::I32,
            Dtype::U32 => DataType::U32,
            Dtype::I16 => DataType::I16,
            Dtype::U16 => DataType::U16,
            Dtype::I8 => DataType::I8,
            Dtype::U8 => DataType::U8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TensorMetadata {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
    pub data_offsets: (usize, usize),
}

#[derive(Debug, Deserialize)]
pub struct HashMetadata {
    /// Free-form `__metadata__` entry some producers write; ignored by the
    /// loader.
    #[serde(rename = "__metadata__", default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub tensors: HashMap<String, TensorMetadata>,
}

/// Reads the header of a safetensors file: the 8-byte little-endian header
/// length followed by a JSON table of tensor metadata. Returns the byte
/// offset at which tensor data begins, plus the parsed table. Tensor bytes
/// are never touched.
pub fn read_metadata(
    file: &File
) -> Result<(usize, HashMetadata), HeaderLoadingError> {
    let mut length_bytes = [0u8; 8];
    file.read_exact_at(&mut length_bytes, 0)?;
    let header_length = u64::from_le_bytes(length_bytes);
    if header_length as usize > MAX_HEADER_SIZE {
        return Err(HeaderLoadingError::HeaderTooLarge(header_length));
    }
    let mut header = vec![0u8; header_length as usize];
    file.read_exact_at(&mut header, 8)?;
    let metadata: HashMetadata = serde_json::from_slice(&header)?;
    Ok((8 + header_length as usize, metadata))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(header: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&(header.len() as u64).to_le_bytes()).unwrap();
        file.write_all(header.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_metadata() {
        let header = r#"{
            "__metadata__": {"format": "pt"},
            "encoder.weight": {
                "dtype": "F32",
                "shape": [2, 3],
                "data_offsets": [0, 24]
            }
        }"#;
        let file = write_file(header);

        let (data_offset, metadata) =
            read_metadata(file.as_file()).unwrap();
        assert_eq!(data_offset, 8 + header.len());
        assert_eq!(metadata.tensors.len(), 1);

        let entry = &metadata.tensors["encoder.weight"];
        assert_eq!(entry.dtype, Dtype::F32);
        assert_eq!(entry.shape, vec![2, 3]);
        assert_eq!(entry.data_offsets, (0, 24));
        assert_eq!(
            metadata.metadata.as_ref().unwrap()["format"],
            "pt"
        );
    }

    #[test]
    fn test_rejects_oversized_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&u64::MAX.to_le_bytes()).unwrap();
        file.flush().unwrap();

        let result = read_metadata(file.as_file());
        assert!(matches!(
            result,
            Err(HeaderLoadingError::HeaderTooLarge(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let file = write_file("{not json");
        let result = read_metadata(file.as_file());
        assert!(matches!(result, Err(HeaderLoadingError::InvalidJson(_))));
    }
}
