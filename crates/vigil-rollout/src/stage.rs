//! ---
//! vigil_section: "09-staged-rollout"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Deterministic traffic split and rollout progression rule."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use vigil_common::config::StageConfig;

use crate::error::RolloutError;

/// One step of a staged release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutStage {
    pub label: String,
    pub traffic_percentage: u8,
}

impl RolloutStage {
    pub fn new(label: impl Into<String>, traffic_percentage: u8) -> Self {
        Self {
            label: label.into(),
            traffic_percentage,
        }
    }
}

impl fmt::Display for RolloutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}%)", self.label, self.traffic_percentage)
    }
}

impl From<&StageConfig> for RolloutStage {
    fn from(config: &StageConfig) -> Self {
        Self::new(config.label.clone(), config.traffic_percentage)
    }
}

/// Ordered, non-decreasing sequence of stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageLadder {
    stages: Vec<RolloutStage>,
}

impl StageLadder {
    pub fn new(stages: Vec<RolloutStage>) -> Result<Self, RolloutError> {
        if stages.is_empty() {
            return Err(RolloutError::EmptyLadder);
        }
        let mut seen = HashSet::new();
        let mut previous = 0u8;
        for stage in &stages {
            if stage.traffic_percentage > 100 {
                return Err(RolloutError::InvalidPercentage {
                    label: stage.label.clone(),
                    percentage: stage.traffic_percentage,
                });
            }
            if stage.traffic_percentage < previous {
                return Err(RolloutError::NonMonotonic {
                    label: stage.label.clone(),
                });
            }
            if !seen.insert(stage.label.as_str()) {
                return Err(RolloutError::DuplicateStage(stage.label.clone()));
            }
            previous = stage.traffic_percentage;
        }
        Ok(Self { stages })
    }

    pub fn from_config(stages: &[StageConfig]) -> Result<Self, RolloutError> {
        Self::new(stages.iter().map(RolloutStage::from).collect())
    }

    pub fn get(&self, label: &str) -> Result<&RolloutStage, RolloutError> {
        self.stages
            .iter()
            .find(|stage| stage.label == label)
            .ok_or_else(|| RolloutError::UnknownStage(label.to_owned()))
    }

    /// Stage following `label`, or `None` when `label` is the last one.
    pub fn next(&self, label: &str) -> Result<Option<&RolloutStage>, RolloutError> {
        let position = self
            .stages
            .iter()
            .position(|stage| stage.label == label)
            .ok_or_else(|| RolloutError::UnknownStage(label.to_owned()))?;
        Ok(self.stages.get(position + 1))
    }

    pub fn first(&self) -> &RolloutStage {
        &self.stages[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RolloutStage> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageLadder {
    fn default() -> Self {
        Self {
            stages: vec![
                RolloutStage::new("stage_10", 10),
                RolloutStage::new("stage_25", 25),
                RolloutStage::new("stage_50", 50),
                RolloutStage::new("stage_100", 100),
            ],
        }
    }
}
