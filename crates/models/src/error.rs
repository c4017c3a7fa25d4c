use thiserror::Error;
use uuid::Uuid;

use crate::team::TeamId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Both teams are required")]
    MissingTeam,

    #[error("Teams must be different, got {0} twice")]
    SameTeam(TeamId),

    #[error("Unknown team: {0}")]
    UnknownTeam(String),

    #[error("Predicted winner {winner} is not part of {team_a} vs {team_b}")]
    WinnerNotInMatchup {
        winner: TeamId,
        team_a: TeamId,
        team_b: TeamId,
    },

    #[error("Invalid outcome: {0}")]
    InvalidOutcome(String),
}

/// Failures of the accuracy ledger and its backing store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Prediction {0} is already in the ledger")]
    DuplicateId(Uuid),

    #[error("Prediction not found: {0}")]
    NotFound(Uuid),

    #[error("An outcome was already recorded for prediction {0}")]
    AlreadyRecorded(Uuid),

    #[error(transparent)]
    Invalid(#[from] ModelError),

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for LedgerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
