use std::path::Path;

use console::style;
use tsugite::checkpoint::{Checkpoint, CheckpointError};

pub fn run(
    path: &Path,
    filter: Option<&str>,
) -> Result<(), CheckpointError> {
    let checkpoint = Checkpoint::scan(path)?;

    for file in checkpoint.files() {
        println!("{}", style(file.path().display()).bold());

        let mut keys: Vec<&str> =
            file.keys().map(String::as_str).collect();
        keys.sort_unstable();

        let mut shown = 0usize;
        for key in keys {
            if let Some(filter) = filter {
                if !key.contains(filter) {
                    continue;
                }
            }
            // Keys come from the file's own index; the entry is present.
            if let Some(entry) = file.entry(key) {
                println!(
                    "  {}  {}  {:?}",
                    key,
                    style(format!("{:?}", entry.shape())).dim(),
                    entry.data_type(),
                );
                shown += 1;
            }
        }
        if shown == 0 {
            println!("  {}", style("(no matching tensors)").dim());
        }
    }
    Ok(())
}
