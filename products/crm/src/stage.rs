//! Pipeline stages, loss categories and the stage → probability table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Lead,
    Qualified,
    Proposal,
    Negotiation,
    Won,
    Lost,
}

/// The ordered sales sequence. `Lost` sits outside it.
pub const STAGE_SEQUENCE: [Stage; 5] = [
    Stage::Lead,
    Stage::Qualified,
    Stage::Proposal,
    Stage::Negotiation,
    Stage::Won,
];

pub const OPEN_STAGES: [Stage; 4] = [
    Stage::Lead,
    Stage::Qualified,
    Stage::Proposal,
    Stage::Negotiation,
];

pub const ALL_STAGES: [Stage; 6] = [
    Stage::Lead,
    Stage::Qualified,
    Stage::Proposal,
    Stage::Negotiation,
    Stage::Won,
    Stage::Lost,
];

/// Default closing probability (percent) for a stage.
pub const fn default_probability_for(stage: Stage) -> u8 {
    match stage {
        Stage::Lead => 10,
        Stage::Qualified => 25,
        Stage::Proposal => 50,
        Stage::Negotiation => 75,
        Stage::Won => 100,
        Stage::Lost => 0,
    }
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Lead => "lead",
            Stage::Qualified => "qualified",
            Stage::Proposal => "proposal",
            Stage::Negotiation => "negotiation",
            Stage::Won => "won",
            Stage::Lost => "lost",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Won | Stage::Lost)
    }

    /// Position in [`STAGE_SEQUENCE`]; `None` for `Lost`.
    pub fn sequence_index(self) -> Option<usize> {
        STAGE_SEQUENCE.iter().position(|stage| *stage == self)
    }

    /// The single stage `advance` may move to from here.
    pub fn next(self) -> Option<Stage> {
        let idx = self.sequence_index()?;
        STAGE_SEQUENCE.get(idx + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        ALL_STAGES
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| PipelineError::Validation(format!("unknown stage `{}`", value.trim())))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossReasonCategory {
    Price,
    Timing,
    Competitor,
    Requirements,
    Other,
}

impl LossReasonCategory {
    pub const ALL: [LossReasonCategory; 5] = [
        LossReasonCategory::Price,
        LossReasonCategory::Timing,
        LossReasonCategory::Competitor,
        LossReasonCategory::Requirements,
        LossReasonCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LossReasonCategory::Price => "price",
            LossReasonCategory::Timing => "timing",
            LossReasonCategory::Competitor => "competitor",
            LossReasonCategory::Requirements => "requirements",
            LossReasonCategory::Other => "other",
        }
    }
}

impl fmt::Display for LossReasonCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LossReasonCategory {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::Validation(
                "loss reason category is required".into(),
            ));
        }
        let normalized = trimmed.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "unknown loss reason category `{trimmed}` (expected one of price, timing, competitor, requirements, other)"
                ))
            })
    }
}
