use std::{
    fmt,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{packing::ResolveError, parameters::LoadFailure};

/// How many names of each namespace a report keeps. Checkpoints commonly
/// carry thousands of tensors; the full listing would bury the signal.
pub const NAMESPACE_SAMPLE_LEN: usize = 20;

#[derive(Debug, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Load(#[from] LoadFailure),
}

/// Snapshot of a failed load, built for operator consumption: the offending
/// key and file, the underlying cause, and bounded sorted samples of both
/// namespaces so a mismatched checkpoint/model pairing is recognizable at a
/// glance.
#[derive(Debug)]
pub struct DiagnosticReport {
    pub key: String,
    pub file: PathBuf,
    pub cause: FailureCause,
    pub checkpoint_keys: Vec<String>,
    pub checkpoint_keys_omitted: usize,
    pub parameter_names: Vec<String>,
    pub parameter_names_omitted: usize,
}

fn sample<'a>(names: impl Iterator<Item = &'a str>) -> (Vec<String>, usize) {
    let mut all: Vec<&str> = names.collect();
    all.sort_unstable();
    let omitted = all.len().saturating_sub(NAMESPACE_SAMPLE_LEN);
    let sample = all
        .into_iter()
        .take(NAMESPACE_SAMPLE_LEN)
        .map(str::to_string)
        .collect();
    (sample, omitted)
}

impl DiagnosticReport {
    /// Assembles a report. Each namespace iterator is consumed exactly once.
    pub fn new<'k, 'p>(
        key: &str,
        file: &Path,
        cause: FailureCause,
        checkpoint_keys: impl Iterator<Item = &'k str>,
        parameter_names: impl Iterator<Item = &'p str>,
    ) -> Self {
        let (checkpoint_keys, checkpoint_keys_omitted) =
            sample(checkpoint_keys);
        let (parameter_names, parameter_names_omitted) =
            sample(parameter_names);
        Self {
            key: key.to_string(),
            file: file.to_path_buf(),
            cause,
            checkpoint_keys,
            checkpoint_keys_omitted,
            parameter_names,
            parameter_names_omitted,
        }
    }
}

fn write_namespace(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    names: &[String],
    omitted: usize,
) -> fmt::Result {
    writeln!(f, "{} (first {}):", title, names.len())?;
    for name in names {
        writeln!(f, "  {}", name)?;
    }
    if omitted > 0 {
        writeln!(f, "  ... and {} more", omitted)?;
    }
    Ok(())
}

impl fmt::Display for DiagnosticReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        writeln!(
            f,
            "Failed to load tensor \"{}\": {}",
            self.key, self.cause
        )?;
        writeln!(f, "  in file: {}", self.file.display())?;
        write_namespace(
            f,
            "Checkpoint tensors",
            &self.checkpoint_keys,
            self.checkpoint_keys_omitted,
        )?;
        write_namespace(
            f,
            "Model parameters",
            &self.parameter_names,
            self.parameter_names_omitted,
        )
    }
}
