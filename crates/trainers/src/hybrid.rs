//! Hybrid blend policy.
//!
//! A hand-authored, persisted configuration rather than a learned model. The
//! scorer reads it to blend the per-algorithm scores, gate the data-hungry
//! algorithms behind minimum-ratings thresholds and walk the fallback order
//! when components are missing.

use crate::error::{Result, TrainError};
use event_store::Algorithm;
use serde::{Deserialize, Serialize};

/// Tolerance when checking that blend weights sum to 1.
const WEIGHT_SUM_EPSILON: f32 = 1e-3;

/// Per-algorithm blend weights. Must sum to ~1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub collaborative: f32,
    pub svd: f32,
    pub content: f32,
    pub neural: f32,
}

impl BlendWeights {
    pub fn get(&self, algorithm: Algorithm) -> f32 {
        match algorithm {
            Algorithm::Collaborative => self.collaborative,
            Algorithm::Svd => self.svd,
            Algorithm::Content => self.content,
            Algorithm::Neural => self.neural,
            Algorithm::Hybrid => 0.0,
        }
    }

    pub fn sum(&self) -> f32 {
        self.collaborative + self.svd + self.content + self.neural
    }
}

/// The persisted hybrid policy, validated at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridConfig {
    pub weights: BlendWeights,
    /// Tried in order when no blend component can produce scores.
    pub fallback_order: Vec<Algorithm>,
    pub min_ratings_for_collaborative: usize,
    pub min_ratings_for_svd: usize,
    pub enable_implicit_feedback: bool,
    /// Scale applied to the implicit matrix during SVD training.
    pub implicit_weight: f32,
    pub diversity_boost: bool,
    pub diversity_weight: f32,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            weights: BlendWeights {
                collaborative: 0.35,
                svd: 0.30,
                content: 0.25,
                neural: 0.10,
            },
            fallback_order: vec![
                Algorithm::Hybrid,
                Algorithm::Svd,
                Algorithm::Collaborative,
                Algorithm::Content,
            ],
            min_ratings_for_collaborative: 5,
            min_ratings_for_svd: 10,
            enable_implicit_feedback: true,
            implicit_weight: 0.3,
            diversity_boost: true,
            diversity_weight: 0.15,
        }
    }
}

impl HybridConfig {
    /// Check the policy's structural invariants. Run on every load so a
    /// hand-edited snapshot cannot smuggle in a broken blend.
    pub fn validate(&self) -> Result<()> {
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(TrainError::InvalidConfig(format!(
                "blend weights sum to {sum}, expected 1.0"
            )));
        }
        for algorithm in Algorithm::ALL {
            if self.weights.get(algorithm) < 0.0 {
                return Err(TrainError::InvalidConfig(format!(
                    "negative weight for {algorithm}"
                )));
            }
        }
        if self.fallback_order.is_empty() {
            return Err(TrainError::InvalidConfig(
                "fallback order is empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.diversity_weight) {
            return Err(TrainError::InvalidConfig(format!(
                "diversity weight {} outside 0..=1",
                self.diversity_weight
            )));
        }
        if self.implicit_weight < 0.0 {
            return Err(TrainError::InvalidConfig(format!(
                "implicit weight {} is negative",
                self.implicit_weight
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let config = HybridConfig::default();
        config.validate().unwrap();
        assert!((config.weights.sum() - 1.0).abs() < WEIGHT_SUM_EPSILON);
        assert_eq!(config.fallback_order[0], Algorithm::Hybrid);
    }

    #[test]
    fn test_bad_weight_sum_rejected() {
        let mut config = HybridConfig::default();
        config.weights.collaborative = 0.9;
        assert!(matches!(
            config.validate(),
            Err(TrainError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_fallback_rejected() {
        let mut config = HybridConfig::default();
        config.fallback_order.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = HybridConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: HybridConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
