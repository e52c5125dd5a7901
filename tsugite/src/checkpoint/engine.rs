use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

use super::{
    report::{DiagnosticReport, FailureCause},
    safetensors_metadata::HeaderLoadingError,
    weights_file::{TensorReadError, WeightsFile},
};
use crate::{packing::PackingTable, parameters::ParameterSet};

pub const WEIGHTS_FILE_EXTENSION: &str = "safetensors";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("No .{WEIGHTS_FILE_EXTENSION} files found in {0:?}.")]
    NotFound(PathBuf),
    #[error("Failed to open {path:?}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read header of {path:?}")]
    Header {
        path: PathBuf,
        #[source]
        source: HeaderLoadingError,
    },
    #[error("Failed to read tensor bytes from {path:?}")]
    TensorRead {
        path: PathBuf,
        #[source]
        source: TensorReadError,
    },
    #[error("{report}")]
    Load {
        report: Box<DiagnosticReport>,
    },
}

impl CheckpointError {
    /// The diagnostic report, when this error carries one.
    pub fn report(&self) -> Option<&DiagnosticReport> {
        match self {
            CheckpointError::Load {
                report,
            } => Some(report),
            _ => None,
        }
    }
}

/// A checkpoint directory after the metadata-only scan: every weights file
/// indexed, no tensor bytes touched.
pub struct Checkpoint {
    directory: PathBuf,
    files: Vec<WeightsFile>,
}

impl Checkpoint {
    /// Enumerates and indexes the weights files of `directory`. A directory
    /// without a single weights file is a configuration error and fails
    /// before any parameter is looked at.
    pub fn scan(directory: &Path) -> Result<Self, CheckpointError> {
        let entries = fs::read_dir(directory).map_err(|source| {
            CheckpointError::FileAccess {
                path: directory.to_path_buf(),
                source,
            }
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.extension()
                    .is_some_and(|extension| {
                        extension == WEIGHTS_FILE_EXTENSION
                    })
            })
            .collect();
        if paths.is_empty() {
            return Err(CheckpointError::NotFound(directory.to_path_buf()));
        }
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let file = WeightsFile::open(&path).map_err(|source| {
                CheckpointError::Header {
                    path: path.clone(),
                    source,
                }
            })?;
            files.push(file);
        }
        info!(
            directory = ?directory,
            files = files.len(),
            tensors = files.iter().map(WeightsFile::len).sum::<usize>(),
            "scanned checkpoint"
        );
        Ok(Self {
            directory: directory.to_path_buf(),
            files,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn files(&self) -> &[WeightsFile] {
        &self.files
    }

    pub fn num_tensors(&self) -> usize {
        self.files.iter().map(WeightsFile::len).sum()
    }

    /// The full serialized-key inventory across all files, straight from the
    /// already-parsed headers.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .flat_map(WeightsFile::keys)
            .map(String::as_str)
    }

    /// Hydrates `parameters` from this checkpoint. One sequential pass, one
    /// file at a time; the first unresolvable key or rejected tensor aborts
    /// the whole load, since a partially-hydrated model is unsafe to run.
    pub fn load_into(
        &self,
        parameters: &mut ParameterSet,
        table: &PackingTable,
    ) -> Result<(), CheckpointError> {
        for file in &self.files {
            debug!(path = ?file.path(), tensors = file.len(), "loading weights file");
            let reader = file.reader().map_err(|source| {
                CheckpointError::FileAccess {
                    path: file.path().to_path_buf(),
                    source,
                }
            })?;
            for key in file.keys() {
                let plan = match table.resolve(key, parameters) {
                    Ok(plan) => plan,
                    Err(cause) => {
                        return Err(self.failure(
                            file,
                            key,
                            cause.into(),
                            parameters,
                        ));
                    },
                };
                let tensor = reader.tensor(key).map_err(|source| {
                    CheckpointError::TensorRead {
                        path: file.path().to_path_buf(),
                        source,
                    }
                })?;
                if let Err(cause) = parameters.dispatch(&plan, &tensor) {
                    return Err(self.failure(
                        file,
                        key,
                        cause.into(),
                        parameters,
                    ));
                }
            }
        }
        Ok(())
    }

    fn failure(
        &self,
        file: &WeightsFile,
        key: &str,
        cause: FailureCause,
        parameters: &ParameterSet,
    ) -> CheckpointError {
        let report = DiagnosticReport::new(
            key,
            file.path(),
            cause,
            self.keys(),
            parameters.names(),
        );
        CheckpointError::Load {
            report: Box::new(report),
        }
    }
}

/// Scans `directory` and hydrates `parameters` in one call.
pub fn load_checkpoint(
    directory: &Path,
    parameters: &mut ParameterSet,
    table: &PackingTable,
) -> Result<(), CheckpointError> {
    Checkpoint::scan(directory)?.load_into(parameters, table)
}
