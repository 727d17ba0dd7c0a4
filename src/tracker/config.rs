//! Configuration for the association engine.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::tracker::matching::FORBIDDEN_COST;

/// Strategy used for clusters the previous-frame association leaves unmatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMode {
    /// Unmatched clusters always receive fresh ids.
    Short,
    /// Unmatched clusters are first matched against the object cache.
    #[default]
    Long,
}

/// How gated costs are resolved into a one-to-one assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSolver {
    /// Cheapest pair first; ties go to the smaller previous index.
    #[default]
    Greedy,
    /// Minimum total cost via Jonker-Volgenant.
    Optimal,
}

/// Lifetime of the instance id counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdScope {
    /// Every scene gets its own id space starting at 1.
    #[default]
    Scene,
    /// One counter for the lifetime of the tracker; ids are never reused across scenes.
    Run,
}

/// Cost weights and gates for matching a cluster against a known object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Centroid distance (meters) beyond which a pair is never matched.
    pub max_distance: f32,
    /// Total cost beyond which a pair is never matched.
    pub max_cost: f32,
    pub distance_weight: f32,
    pub feature_weight: f32,
    /// `None` rejects class mismatches outright, otherwise the penalty is added to the cost.
    pub class_mismatch_penalty: Option<f32>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_distance: 2.0,
            max_cost: 3.0,
            distance_weight: 1.0,
            feature_weight: 0.5,
            class_mismatch_penalty: None,
        }
    }
}

impl MatchConfig {
    /// Wider gate used when recovering objects from the cache.
    pub fn long_range() -> Self {
        Self {
            max_distance: 3.0,
            max_cost: 4.0,
            ..Self::default()
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let finite_non_negative = [
            ("max_distance", self.max_distance),
            ("max_cost", self.max_cost),
            ("distance_weight", self.distance_weight),
            ("feature_weight", self.feature_weight),
        ];
        for (field, value) in finite_non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name}.{field} must be finite and non-negative, got {value}"
                )));
            }
        }
        if f64::from(self.max_cost) >= FORBIDDEN_COST {
            return Err(Error::InvalidConfig(format!(
                "{name}.max_cost must be below {FORBIDDEN_COST}, got {}",
                self.max_cost
            )));
        }
        if let Some(penalty) = self.class_mismatch_penalty {
            if !penalty.is_finite() || penalty < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name}.class_mismatch_penalty must be finite and non-negative, got {penalty}"
                )));
            }
        }
        Ok(())
    }
}

/// Settings for recovering identities from the object cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongRangeConfig {
    #[serde(deserialize_with = "deserialize_long_range_gate")]
    pub gate: MatchConfig,
    /// Cost added per frame since the record was last seen.
    pub age_weight: f32,
    /// Records unseen for more than this many frames are not considered.
    pub max_age: u64,
    /// Nearest cache records considered per cluster.
    pub max_candidates: usize,
    /// Extrapolate record centroids by their last observed velocity.
    pub use_motion: bool,
}

impl Default for LongRangeConfig {
    fn default() -> Self {
        Self {
            gate: MatchConfig::long_range(),
            age_weight: 0.05,
            max_age: 10,
            max_candidates: 8,
            use_motion: false,
        }
    }
}

/// Mirror of [`MatchConfig`] whose missing fields fall back to
/// [`MatchConfig::long_range`].
#[derive(Deserialize)]
#[serde(default)]
struct LongRangeGate {
    max_distance: f32,
    max_cost: f32,
    distance_weight: f32,
    feature_weight: f32,
    class_mismatch_penalty: Option<f32>,
}

impl Default for LongRangeGate {
    fn default() -> Self {
        let gate = MatchConfig::long_range();
        Self {
            max_distance: gate.max_distance,
            max_cost: gate.max_cost,
            distance_weight: gate.distance_weight,
            feature_weight: gate.feature_weight,
            class_mismatch_penalty: gate.class_mismatch_penalty,
        }
    }
}

fn deserialize_long_range_gate<'de, D>(
    deserializer: D,
) -> std::result::Result<MatchConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let gate = LongRangeGate::deserialize(deserializer)?;
    Ok(MatchConfig {
        max_distance: gate.max_distance,
        max_cost: gate.max_cost,
        distance_weight: gate.distance_weight,
        feature_weight: gate.feature_weight,
        class_mismatch_penalty: gate.class_mismatch_penalty,
    })
}

/// Bounds on the object cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Records unseen for more than this many frames are evicted.
    pub max_age: u64,
    /// Hard cap on cached records; the least recently seen are evicted first.
    pub max_records: usize,
    /// Centroid observations kept per record.
    pub history_len: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: 30,
            max_records: 4096,
            history_len: 4,
        }
    }
}

/// Configuration for [`TrackState`](super::TrackState).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub mode: AssociationMode,
    pub solver: AssignmentSolver,
    pub id_scope: IdScope,
    /// Matching against the previous frame.
    pub frame: MatchConfig,
    pub long_range: LongRangeConfig,
    pub cache: CacheConfig,
    /// Clusters with fewer points are left without an instance.
    pub min_cluster_points: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            mode: AssociationMode::Long,
            solver: AssignmentSolver::Greedy,
            id_scope: IdScope::Scene,
            frame: MatchConfig::default(),
            long_range: LongRangeConfig::default(),
            cache: CacheConfig::default(),
            min_cluster_points: 1,
        }
    }
}

impl TrackerConfig {
    /// Default configuration with long-range association disabled.
    pub fn short() -> Self {
        Self {
            mode: AssociationMode::Short,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.frame.validate("frame")?;
        self.long_range.gate.validate("long_range.gate")?;

        let age_weight = self.long_range.age_weight;
        if !age_weight.is_finite() || age_weight < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "long_range.age_weight must be finite and non-negative, got {age_weight}"
            )));
        }
        if self.long_range.max_candidates == 0 {
            return Err(Error::InvalidConfig(
                "long_range.max_candidates must be at least 1".into(),
            ));
        }
        if self.long_range.max_age > self.cache.max_age {
            return Err(Error::InvalidConfig(format!(
                "long_range.max_age ({}) exceeds cache.max_age ({}); such records are evicted before they can be recovered",
                self.long_range.max_age, self.cache.max_age
            )));
        }
        if self.cache.max_records == 0 {
            return Err(Error::InvalidConfig(
                "cache.max_records must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrackerConfig::default().validate().is_ok());
        assert!(TrackerConfig::short().validate().is_ok());
        assert_eq!(TrackerConfig::short().mode, AssociationMode::Short);
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut config = TrackerConfig::default();
        config.frame.feature_weight = -1.0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_recovery_window_longer_than_cache() {
        let mut config = TrackerConfig::default();
        config.long_range.max_age = config.cache.max_age + 1;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_gate_at_forbidden_cost() {
        let mut config = TrackerConfig::default();
        config.long_range.gate.max_cost = 1e4;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        config.long_range.gate.max_cost = 9_999.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_long_range_gate_keeps_long_range_defaults() {
        let json = r#"{ "long_range": { "gate": { "feature_weight": 1.0 } } }"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();

        let expected = MatchConfig {
            feature_weight: 1.0,
            ..MatchConfig::long_range()
        };
        assert_eq!(config.long_range.gate, expected);
        assert_eq!(config.frame, MatchConfig::default());

        let json = r#"{ "long_range": { "age_weight": 0.1 } }"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.long_range.gate, MatchConfig::long_range());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let json = r#"{ "mode": "short", "solver": "optimal", "frame": { "max_distance": 1.5 } }"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.mode, AssociationMode::Short);
        assert_eq!(config.solver, AssignmentSolver::Optimal);
        assert_eq!(config.frame.max_distance, 1.5);
        // Unspecified fields keep their defaults
        assert_eq!(config.frame.max_cost, MatchConfig::default().max_cost);
        assert_eq!(config.cache, CacheConfig::default());
    }
}
