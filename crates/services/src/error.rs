use picker_models::{FactorKind, LedgerError, MatchupKey, ModelError, TeamId};
use thiserror::Error;

use crate::normalizer::NormalizationError;

/// Failures of a single analysis. Cloned to every caller coalesced onto it.
#[derive(Error, Debug, Clone)]
pub enum AnalysisError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Provider error for {factor} ({team}): {reason}")]
    Provider {
        factor: FactorKind,
        team: TeamId,
        reason: String,
    },

    #[error("Analysis unavailable after {attempts} attempt(s): {reason}")]
    AnalysisUnavailable { attempts: u32, reason: String },

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error("A different analysis for {matchup} is already in progress")]
    Conflict { matchup: MatchupKey },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<ModelError> for AnalysisError {
    fn from(err: ModelError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl AnalysisError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Validation(_) => "validation",
            AnalysisError::Provider { .. } => "provider",
            AnalysisError::AnalysisUnavailable { .. } => "unavailable",
            AnalysisError::Normalization(_) => "normalization",
            AnalysisError::Conflict { .. } => "conflict",
            AnalysisError::Ledger(_) => "ledger",
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
