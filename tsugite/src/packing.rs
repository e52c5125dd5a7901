use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parameters::ParameterSet;

/// Tag distinguishing which logical sub-parameter of a fused target a
/// resolved tensor belongs to.
pub type ShardId = usize;

/// Declarative knowledge that the model fused several checkpoint tensors
/// into one parameter: any serialized key containing `pattern` is renamed
/// (first occurrence only) to the fused parameter's name, and `shard` tags
/// the slice of that parameter the tensor carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingRule {
    pub pattern: String,
    pub replacement: String,
    pub shard: ShardId,
}

impl PackingRule {
    pub fn new(
        pattern: impl Into<String>,
        replacement: impl Into<String>,
        shard: ShardId,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            shard,
        }
    }
}

/// Ordered packing-rule table. Order is load-bearing: the first rule whose
/// pattern matches a key wins, regardless of any later rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackingTable {
    rules: Vec<PackingRule>,
}

/// The resolved destination of one serialized key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    pub target: String,
    pub shard: Option<ShardId>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(
        "Tensor \"{key}\" matched packing rule \"{pattern}\" -> \
        \"{target}\", but no such parameter exists."
    )]
    PackedTargetMissing {
        key: String,
        pattern: String,
        target: String,
    },
    #[error("Tensor \"{key}\" does not match any model parameter.")]
    UnknownKey {
        key: String,
    },
}

impl PackingTable {
    pub fn new(rules: Vec<PackingRule>) -> Self {
        Self {
            rules,
        }
    }

    /// A table with no rules: every key resolves by identity only.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[PackingRule] {
        &self.rules
    }

    /// Maps a serialized key onto a target parameter. A key that matches a
    /// rule must resolve through that rule; it never falls back to the
    /// identity lookup.
    pub fn resolve(
        &self,
        key: &str,
        parameters: &ParameterSet,
    ) -> Result<LoadPlan, ResolveError> {
        for rule in &self.rules {
            if !key.contains(rule.pattern.as_str()) {
                continue;
            }
            let target = key.replacen(&rule.pattern, &rule.replacement, 1);
            if parameters.contains(&target) {
                return Ok(LoadPlan {
                    target,
                    shard: Some(rule.shard),
                });
            }
            return Err(ResolveError::PackedTargetMissing {
                key: key.to_string(),
                pattern: rule.pattern.clone(),
                target,
            });
        }
        if parameters.contains(key) {
            return Ok(LoadPlan {
                target: key.to_string(),
                shard: None,
            });
        }
        Err(ResolveError::UnknownKey {
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::from_str;

    use super::*;
    use crate::{Array, DataType, TargetParameter};

    fn parameters(names: &[&str]) -> ParameterSet {
        let mut set = ParameterSet::new();
        for name in names {
            set.insert(
                *name,
                TargetParameter::new(Array::zeros(&[1], DataType::F32)),
            );
        }
        set
    }

    #[test]
    fn test_identity_resolution() {
        let table = PackingTable::empty();
        let set = parameters(&["decoder.norm.weight"]);

        let plan = table.resolve("decoder.norm.weight", &set).unwrap();
        assert_eq!(plan.target, "decoder.norm.weight");
        assert_eq!(plan.shard, None);

        let error = table.resolve("decoder.norm.bias", &set).unwrap_err();
        assert!(matches!(error, ResolveError::UnknownKey { .. }));
    }

    #[test]
    fn test_packed_resolution() {
        let table = PackingTable::new(vec![
            PackingRule::new("q_proj", "qkv_proj", 0),
            PackingRule::new("k_proj", "qkv_proj", 1),
        ]);
        let set = parameters(&["layers.0.qkv_proj.weight"]);

        let plan =
            table.resolve("layers.0.q_proj.weight", &set).unwrap();
        assert_eq!(plan.target, "layers.0.qkv_proj.weight");
        assert_eq!(plan.shard, Some(0));

        let plan =
            table.resolve("layers.0.k_proj.weight", &set).unwrap();
        assert_eq!(plan.shard, Some(1));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        // Both patterns match the key; the earlier rule must decide even
        // though the later one would also resolve.
        let table = PackingTable::new(vec![
            PackingRule::new("proj", "fused", 2),
            PackingRule::new("up_proj", "fused", 0),
        ]);
        let set = parameters(&["layers.3.fused.weight"]);

        let plan = table.resolve("layers.3.up_proj.weight", &set);
        assert!(matches!(
            plan,
            Err(ResolveError::PackedTargetMissing { ref pattern, .. })
                if pattern == "proj"
        ));
    }

    #[test]
    fn test_matched_rule_never_falls_back_to_identity() {
        let table =
            PackingTable::new(vec![PackingRule::new("gate", "fused", 0)]);
        // The key itself exists as a parameter, but it matched a rule whose
        // renamed target does not.
        let set = parameters(&["mlp.gate.weight"]);

        let error = table.resolve("mlp.gate.weight", &set).unwrap_err();
        assert!(matches!(
            error,
            ResolveError::PackedTargetMissing { target, .. }
                if target == "mlp.fused.weight"
        ));
    }

    #[test]
    fn test_replaces_first_occurrence_only() {
        let table =
            PackingTable::new(vec![PackingRule::new("proj", "fused", 1)]);
        let set = parameters(&["blocks.fused.proj_dropout.weight"]);

        let plan = table
            .resolve("blocks.proj.proj_dropout.weight", &set)
            .unwrap();
        assert_eq!(plan.target, "blocks.fused.proj_dropout.weight");
    }

    #[test]
    fn test_table_from_json() {
        let table_str = r#"
            [
                {"pattern": "q_proj", "replacement": "qkv_proj", "shard": 0},
                {"pattern": "k_proj", "replacement": "qkv_proj", "shard": 1},
                {"pattern": "v_proj", "replacement": "qkv_proj", "shard": 2}
            ]
        "#;

        let deserialized_table: PackingTable = from_str(table_str).unwrap();
        assert_eq!(
            deserialized_table,
            PackingTable::new(vec![
                PackingRule::new("q_proj", "qkv_proj", 0),
                PackingRule::new("k_proj", "qkv_proj", 1),
                PackingRule::new("v_proj", "qkv_proj", 2),
            ])
        );
    }
}
