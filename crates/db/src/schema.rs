use chrono::{DateTime, SecondsFormat, Utc};
use picker_models::{LedgerError, OutcomeRecord, PredictedScore, PredictionResult, TeamId};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct PredictionRow {
    pub id: String,
    pub team_a: String,
    pub team_b: String,
    pub predicted_winner: String,
    pub predicted_winner_score: i64,
    pub predicted_loser_score: i64,
    pub confidence: f64,
    pub key_factors: String,
    pub detailed_analysis: String,
    pub warnings: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct OutcomeRow {
    pub prediction_id: String,
    pub actual_winner: Option<String>,
    pub home_score: i64,
    pub away_score: i64,
    pub recorded_at: String,
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| LedgerError::Storage(format!("bad timestamp {raw:?}: {err}")))
}

pub fn parse_id(raw: &str) -> Result<Uuid, LedgerError> {
    Uuid::parse_str(raw).map_err(|err| LedgerError::Storage(format!("bad id {raw:?}: {err}")))
}

fn points(raw: i64) -> Result<u32, LedgerError> {
    u32::try_from(raw).map_err(|_| LedgerError::Storage(format!("bad score {raw}")))
}

impl PredictionRow {
    pub fn from_prediction(prediction: &PredictionResult) -> Result<Self, LedgerError> {
        Ok(Self {
            id: prediction.id.to_string(),
            team_a: prediction.team_a.to_string(),
            team_b: prediction.team_b.to_string(),
            predicted_winner: prediction.predicted_winner.to_string(),
            predicted_winner_score: i64::from(prediction.predicted_score.winner),
            predicted_loser_score: i64::from(prediction.predicted_score.loser),
            confidence: prediction.confidence,
            key_factors: serde_json::to_string(&prediction.key_factors)?,
            detailed_analysis: prediction.detailed_analysis.clone(),
            warnings: serde_json::to_string(&prediction.warnings)?,
            created_at: format_timestamp(&prediction.created_at),
        })
    }

    pub fn into_prediction(self) -> Result<PredictionResult, LedgerError> {
        Ok(PredictionResult {
            id: parse_id(&self.id)?,
            team_a: TeamId::new(&self.team_a),
            team_b: TeamId::new(&self.team_b),
            predicted_winner: TeamId::new(&self.predicted_winner),
            predicted_score: PredictedScore::new(
                points(self.predicted_winner_score)?,
                points(self.predicted_loser_score)?,
            ),
            confidence: self.confidence,
            key_factors: serde_json::from_str(&self.key_factors)?,
            detailed_analysis: self.detailed_analysis,
            warnings: serde_json::from_str(&self.warnings)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

impl OutcomeRow {
    pub fn from_outcome(outcome: &OutcomeRecord) -> Self {
        Self {
            prediction_id: outcome.prediction_id.to_string(),
            actual_winner: outcome.actual_winner.as_ref().map(ToString::to_string),
            home_score: i64::from(outcome.home_score),
            away_score: i64::from(outcome.away_score),
            recorded_at: format_timestamp(&outcome.recorded_at),
        }
    }

    /// Rebuilds the outcome against its prediction, re-deriving `correct`
    /// and `score_difference`.
    pub fn into_outcome(self, prediction: &PredictionResult) -> Result<OutcomeRecord, LedgerError> {
        let outcome = OutcomeRecord::new(
            prediction,
            self.actual_winner.map(TeamId::new),
            points(self.home_score)?,
            points(self.away_score)?,
        )?;
        Ok(outcome.with_recorded_at(parse_timestamp(&self.recorded_at)?))
    }
}
