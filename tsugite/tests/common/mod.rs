use std::{fs::File, io::Write, path::Path};

use serde_json::{Map, Value, json};
use tsugite::{Array, DataType};

fn dtype_name(data_type: DataType) -> &'static str {
    match data_type {
        DataType::BF16 => "BF16",
        DataType::F16 => "F16",
        DataType::F32 => "F32",
        DataType::F64 => "F64",
        DataType::I8 => "I8",
        DataType::U8 => "U8",
        DataType::I16 => "I16",
        DataType::U16 => "U16",
        DataType::I32 => "I32",
        DataType::U32 => "U32",
        DataType::I64 => "I64",
        DataType::U64 => "U64",
    }
}

/// Serializes `tensors` into a safetensors file at `path`: 8-byte
/// little-endian header length, JSON metadata table, then the raw tensor
/// bytes back to back.
pub fn write_safetensors(
    path: &Path,
    tensors: &[(&str, &Array)],
) {
    let mut table = Map::new();
    let mut offset = 0usize;
    for (name, array) in tensors {
        let size = array.size_in_bytes();
        table.insert(
            (*name).to_string(),
            json!({
                "dtype": dtype_name(array.data_type()),
                "shape": array.shape(),
                "data_offsets": [offset, offset + size],
            }),
        );
        offset += size;
    }
    let header = serde_json::to_vec(&Value::Object(table)).unwrap();

    let mut file = File::create(path).unwrap();
    file.write_all(&(header.len() as u64).to_le_bytes()).unwrap();
    file.write_all(&header).unwrap();
    for (_, array) in tensors {
        file.write_all(array.buffer()).unwrap();
    }
}
