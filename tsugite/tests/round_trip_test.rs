mod common;

use half::f16;
use tempfile::tempdir;
use tsugite::{
    Array, DataType, PackingTable, ParameterSet, TargetParameter,
    load_checkpoint,
};

#[test]
fn round_trip_identity() {
    let directory = tempdir().unwrap();
    let weight =
        Array::from_elements(&[2, 3], &[0.5f32, -1.25, 3.0, 9.75, 0.0, -64.5]);
    let bias = Array::from_elements(&[3], &[1.0f32, 2.5, -0.125]);
    common::write_safetensors(
        &directory.path().join("model.safetensors"),
        &[("encoder.weight", &weight), ("encoder.bias", &bias)],
    );

    let mut parameters = ParameterSet::new();
    parameters.insert(
        "encoder.weight",
        TargetParameter::new(Array::zeros(&[2, 3], DataType::F32)),
    );
    parameters.insert(
        "encoder.bias",
        TargetParameter::new(Array::zeros(&[3], DataType::F32)),
    );

    load_checkpoint(
        directory.path(),
        &mut parameters,
        &PackingTable::empty(),
    )
    .unwrap();

    assert_eq!(parameters.get("encoder.weight").unwrap().value(), &weight);
    assert_eq!(parameters.get("encoder.bias").unwrap().value(), &bias);
}

#[test]
fn round_trip_across_multiple_files() {
    let directory = tempdir().unwrap();
    let first = Array::from_elements(&[4], &[1.0f32, 2.0, 3.0, 4.0]);
    let second = Array::from_elements(&[2], &[-1.0f32, -2.0]);
    common::write_safetensors(
        &directory.path().join("model-00001-of-00002.safetensors"),
        &[("decoder.first.weight", &first)],
    );
    common::write_safetensors(
        &directory.path().join("model-00002-of-00002.safetensors"),
        &[("decoder.second.weight", &second)],
    );

    let mut parameters = ParameterSet::new();
    parameters.insert(
        "decoder.first.weight",
        TargetParameter::new(Array::zeros(&[4], DataType::F32)),
    );
    parameters.insert(
        "decoder.second.weight",
        TargetParameter::new(Array::zeros(&[2], DataType::F32)),
    );

    load_checkpoint(
        directory.path(),
        &mut parameters,
        &PackingTable::empty(),
    )
    .unwrap();

    assert_eq!(
        parameters.get("decoder.first.weight").unwrap().value(),
        &first
    );
    assert_eq!(
        parameters.get("decoder.second.weight").unwrap().value(),
        &second
    );
}

#[test]
fn round_trip_preserves_half_precision_bits() {
    let directory = tempdir().unwrap();
    let values: Vec<f16> =
        [0.1f32, -2.5, 65504.0, 5.96e-8].iter().map(|&v| f16::from_f32(v)).collect();
    let weight = Array::from_elements(&[4], &values);
    common::write_safetensors(
        &directory.path().join("model.safetensors"),
        &[("embedding.weight", &weight)],
    );

    let mut parameters = ParameterSet::new();
    parameters.insert(
        "embedding.weight",
        TargetParameter::new(Array::zeros(&[4], DataType::F16)),
    );

    load_checkpoint(
        directory.path(),
        &mut parameters,
        &PackingTable::empty(),
    )
    .unwrap();

    let loaded = parameters.get("embedding.weight").unwrap().value();
    assert_eq!(loaded.as_view::<f16>().unwrap(), values.as_slice());
}
