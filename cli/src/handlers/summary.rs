use std::{collections::BTreeMap, path::Path};

use console::style;
use tsugite::{
    DataType,
    checkpoint::{Checkpoint, CheckpointError},
};

pub fn run(path: &Path) -> Result<(), CheckpointError> {
    let checkpoint = Checkpoint::scan(path)?;

    let mut per_data_type: BTreeMap<DataType, (usize, usize)> =
        BTreeMap::new();
    let mut total_bytes = 0usize;
    for file in checkpoint.files() {
        for (_, entry) in file.entries() {
            let slot = per_data_type
                .entry(entry.data_type())
                .or_insert((0, 0));
            slot.0 += 1;
            slot.1 += entry.size_in_bytes();
            total_bytes += entry.size_in_bytes();
        }
    }

    println!("{}", style(path.display()).bold());
    println!("  files: {}", checkpoint.files().len());
    println!("  tensors: {}", checkpoint.num_tensors());
    println!("  bytes: {}", total_bytes);
    for (data_type, (count, bytes)) in per_data_type {
        println!(
            "  {:?}: {} tensors, {} bytes",
            data_type, count, bytes
        );
    }
    Ok(())
}
