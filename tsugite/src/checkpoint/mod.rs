mod engine;
pub use engine::{
    Checkpoint, CheckpointError, WEIGHTS_FILE_EXTENSION, load_checkpoint,
};

mod report;
pub use report::{DiagnosticReport, FailureCause, NAMESPACE_SAMPLE_LEN};

mod safetensors_metadata;
// Re-export the safetensors header reader so callers can size parameter
// storage before materializing anything.
pub use safetensors_metadata::{
    Dtype, HashMetadata, HeaderLoadingError, TensorMetadata,
    read_metadata as read_safetensors_metadata,
};

mod weights_file;
pub use weights_file::{
    TensorEntry, TensorReadError, WeightsFile, WeightsReader,
};
