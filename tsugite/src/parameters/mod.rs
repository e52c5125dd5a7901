use std::collections::HashMap;

use thiserror::Error;

use crate::{
    Array, DataType,
    packing::{LoadPlan, ShardId},
};

#[derive(Debug, Error)]
pub enum LoadFailure {
    #[error(
        "Shape mismatch: parameter declared {expected:?}, checkpoint \
        tensor is {actual:?}."
    )]
    ShapeMismatch {
        expected: Box<[usize]>,
        actual: Box<[usize]>,
    },
    #[error(
        "Data type mismatch: parameter declared {expected:?}, checkpoint \
        tensor is {actual:?}."
    )]
    DataTypeMismatch {
        expected: DataType,
        actual: DataType,
    },
    #[error(
        "Parameter is addressed with shard {shard} but declares no custom \
        loader."
    )]
    MissingCustomLoader {
        shard: ShardId,
    },
    #[error("Custom loader rejected shard {shard}: {reason}")]
    ShardRejected {
        shard: ShardId,
        reason: String,
    },
    #[error("No parameter named \"{name}\".")]
    UnknownParameter {
        name: String,
    },
}

/// A shard-aware loader bound to one parameter. Receives the parameter's
/// storage, the incoming tensor, and the shard tag, and is solely
/// responsible for writing the correct sub-region.
pub type CustomLoaderFn =
    dyn Fn(&mut Array, &Array, ShardId) -> Result<(), LoadFailure>;

/// How a parameter consumes checkpoint tensors, declared at registration
/// time.
pub enum LoadStrategy {
    /// Exact-shape in-place copy.
    Default,
    /// Parameter-specific shard-aware merge.
    Custom(Box<CustomLoaderFn>),
}

/// An addressable, typed, shaped storage slot inside the model being
/// hydrated.
pub struct TargetParameter {
    value: Array,
    strategy: LoadStrategy,
}

impl TargetParameter {
    pub fn new(value: Array) -> Self {
        Self {
            value,
            strategy: LoadStrategy::Default,
        }
    }

    pub fn with_custom_loader(
        value: Array,
        loader: Box<CustomLoaderFn>,
    ) -> Self {
        Self {
            value,
            strategy: LoadStrategy::Custom(loader),
        }
    }

    /// A parameter fused from several checkpoint tensors along its first
    /// dimension. `segments` gives the per-shard row counts, in shard-id
    /// order; shard `i` lands at row offset `segments[..i].sum()`.
    pub fn fused_rows(
        value: Array,
        segments: &[usize],
    ) -> Self {
        let segments: Box<[usize]> = segments.into();
        let loader = move |value: &mut Array,
                           tensor: &Array,
                           shard: ShardId|
              -> Result<(), LoadFailure> {
            let Some(&rows) = segments.get(shard) else {
                return Err(LoadFailure::ShardRejected {
                    shard,
                    reason: format!(
                        "only {} fused segments declared",
                        segments.len()
                    ),
                });
            };
            let Some(&total_rows) = value.shape().first() else {
                return Err(LoadFailure::ShardRejected {
                    shard,
                    reason: "scalar parameter cannot be fused".to_string(),
                });
            };
            if segments.iter().sum::<usize>() != total_rows {
                return Err(LoadFailure::ShardRejected {
                    shard,
                    reason: format!(
                        "fused segments cover {} rows but the parameter \
                         has {}",
                        segments.iter().sum::<usize>(),
                        total_rows
                    ),
                });
            }
            if tensor.data_type() != value.data_type() {
                return Err(LoadFailure::DataTypeMismatch {
                    expected: value.data_type(),
                    actual: tensor.data_type(),
                });
            }
            let tail = value.shape().get(1..).unwrap_or(&[]);
            let expected: Box<[usize]> =
                std::iter::once(rows).chain(tail.iter().copied()).collect();
            if tensor.shape() != &expected[..] {
                return Err(LoadFailure::ShapeMismatch {
                    expected,
                    actual: tensor.shape().into(),
                });
            }
            let row_bytes = tail.iter().product::<usize>()
                * value.data_type().size_in_bytes();
            let offset = segments[..shard].iter().sum::<usize>() * row_bytes;
            let length = rows * row_bytes;
            value.buffer_mut()[offset..offset + length]
                .copy_from_slice(tensor.buffer());
            Ok(())
        };
        Self::with_custom_loader(value, Box::new(loader))
    }

    pub fn value(&self) -> &Array {
        &self.value
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }

    pub fn has_custom_loader(&self) -> bool {
        matches!(self.strategy, LoadStrategy::Custom(_))
    }

    /// Writes one checkpoint tensor into this parameter. Sharded plans
    /// require the custom loader; unsharded plans take the exact-copy path.
    /// Nothing is written unless every check passes.
    pub fn load(
        &mut self,
        tensor: &Array,
        shard: Option<ShardId>,
    ) -> Result<(), LoadFailure> {
        match shard {
            Some(shard) => match &self.strategy {
                LoadStrategy::Custom(loader) => {
                    loader(&mut self.value, tensor, shard)
                },
                LoadStrategy::Default => {
                    Err(LoadFailure::MissingCustomLoader {
                        shard,
                    })
                },
            },
            None => self.copy_exact(tensor),
        }
    }

    fn copy_exact(
        &mut self,
        tensor: &Array,
    ) -> Result<(), LoadFailure> {
        if tensor.data_type() != self.value.data_type() {
            return Err(LoadFailure::DataTypeMismatch {
                expected: self.value.data_type(),
                actual: tensor.data_type(),
            });
        }
        if tensor.shape() != self.value.shape() {
            return Err(LoadFailure::ShapeMismatch {
                expected: self.value.shape().into(),
                actual: tensor.shape().into(),
            });
        }
        self.value.buffer_mut().copy_from_slice(tensor.buffer());
        Ok(())
    }
}

/// The model-side namespace: parameter name -> storage slot.
#[derive(Default)]
pub struct ParameterSet {
    parameters: HashMap<String, TargetParameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        parameter: TargetParameter,
    ) {
        self.parameters.insert(name.into(), parameter);
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<&TargetParameter> {
        self.parameters.get(name)
    }

    pub fn get_mut(
        &mut self,
        name: &str,
    ) -> Option<&mut TargetParameter> {
        self.parameters.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Executes a resolved plan against this set.
    pub fn dispatch(
        &mut self,
        plan: &LoadPlan,
        tensor: &Array,
    ) -> Result<(), LoadFailure> {
        let parameter = self.parameters.get_mut(&plan.target).ok_or_else(
            || LoadFailure::UnknownParameter {
                name: plan.target.clone(),
            },
        )?;
        parameter.load(tensor, plan.shard)
    }
}
