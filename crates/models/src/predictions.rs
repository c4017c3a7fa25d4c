use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, Result};
use crate::team::TeamId;

/// Maximum number of key factors kept on a prediction.
pub const MAX_KEY_FACTORS: usize = 5;

/// Clamps a raw confidence into `[0, 100]`. NaN maps to 0.
pub fn clamp_confidence(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 100.0)
    }
}

/// Predicted final score, winner's points first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictedScore {
    pub winner: u32,
    pub loser: u32,
}

impl PredictedScore {
    pub fn new(winner: u32, loser: u32) -> Self {
        Self { winner, loser }
    }
}

impl fmt::Display for PredictedScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.winner, self.loser)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResult {
    pub id: Uuid,
    pub team_a: TeamId,
    pub team_b: TeamId,
    pub predicted_winner: TeamId,
    pub predicted_score: PredictedScore,
    pub confidence: f64,
    pub key_factors: Vec<String>,
    pub detailed_analysis: String,
    /// Optional factors that were dropped while gathering inputs.
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl PredictionResult {
    pub fn new(
        team_a: TeamId,
        team_b: TeamId,
        predicted_winner: TeamId,
        predicted_score: PredictedScore,
    ) -> Result<Self> {
        if team_a == team_b {
            return Err(ModelError::SameTeam(team_a));
        }
        if predicted_winner != team_a && predicted_winner != team_b {
            return Err(ModelError::WinnerNotInMatchup {
                winner: predicted_winner,
                team_a,
                team_b,
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            team_a,
            team_b,
            predicted_winner,
            predicted_score,
            confidence: 0.0,
            key_factors: Vec::new(),
            detailed_analysis: String::new(),
            warnings: Vec::new(),
            created_at: Utc::now(),
        })
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    pub fn with_key_factors(mut self, mut key_factors: Vec<String>) -> Self {
        key_factors.truncate(MAX_KEY_FACTORS);
        self.key_factors = key_factors;
        self
    }

    pub fn with_analysis(mut self, detailed_analysis: impl Into<String>) -> Self {
        self.detailed_analysis = detailed_analysis.into();
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn home_team(&self) -> &TeamId {
        &self.team_b
    }

    pub fn away_team(&self) -> &TeamId {
        &self.team_a
    }

    pub fn involves(&self, team: &TeamId) -> bool {
        &self.team_a == team || &self.team_b == team
    }

    /// Predicted home points minus predicted away points.
    pub fn predicted_home_margin(&self) -> i64 {
        let winner = i64::from(self.predicted_score.winner);
        let loser = i64::from(self.predicted_score.loser);
        if &self.predicted_winner == self.home_team() {
            winner - loser
        } else {
            loser - winner
        }
    }
}

/// Real-world result attached to a prediction. `actual_winner` is `None` for a tie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeRecord {
    pub prediction_id: Uuid,
    pub actual_winner: Option<TeamId>,
    pub home_score: u32,
    pub away_score: u32,
    pub correct: bool,
    /// |predicted home margin - actual home margin|
    pub score_difference: u32,
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn new(
        prediction: &PredictionResult,
        actual_winner: Option<TeamId>,
        home_score: u32,
        away_score: u32,
    ) -> Result<Self> {
        let expected = match home_score.cmp(&away_score) {
            Ordering::Greater => Some(prediction.home_team()),
            Ordering::Less => Some(prediction.away_team()),
            Ordering::Equal => None,
        };

        if let Some(winner) = &actual_winner {
            if !prediction.involves(winner) {
                return Err(ModelError::InvalidOutcome(format!(
                    "{winner} did not play in {} vs {}",
                    prediction.team_a, prediction.team_b
                )));
            }
        }
        if actual_winner.as_ref() != expected {
            return Err(ModelError::InvalidOutcome(format!(
                "winner {} does not match score {home_score}-{away_score} (home {})",
                actual_winner.as_ref().map_or("tie", TeamId::as_str),
                prediction.home_team()
            )));
        }

        let actual_margin = i64::from(home_score) - i64::from(away_score);
        let score_difference = (prediction.predicted_home_margin() - actual_margin).unsigned_abs();

        Ok(Self {
            prediction_id: prediction.id,
            correct: actual_winner.as_ref() == Some(&prediction.predicted_winner),
            actual_winner,
            home_score,
            away_score,
            score_difference: u32::try_from(score_difference).unwrap_or(u32::MAX),
            recorded_at: Utc::now(),
        })
    }

    pub fn with_recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    pub fn is_tie(&self) -> bool {
        self.actual_winner.is_none()
    }
}

/// One ledger row: a prediction and, once known, its outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub prediction: PredictionResult,
    pub outcome: Option<OutcomeRecord>,
}

impl LedgerEntry {
    pub fn pending(prediction: PredictionResult) -> Self {
        Self {
            prediction,
            outcome: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }

    /// Outcome time when recorded, creation time while pending.
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.outcome
            .as_ref()
            .map_or(self.prediction.created_at, |outcome| outcome.recorded_at)
    }

    /// Most recently recorded first, ties broken by id descending.
    pub fn cmp_recent(a: &Self, b: &Self) -> Ordering {
        b.recorded_at()
            .cmp(&a.recorded_at())
            .then_with(|| b.prediction.id.cmp(&a.prediction.id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccuracySummary {
    pub total: u64,
    pub correct: u64,
    pub accuracy_rate: f64,
    pub avg_confidence: f64,
    pub avg_score_diff: f64,
    /// Entries with an outcome, most recently recorded first.
    pub recent: Vec<LedgerEntry>,
}

impl AccuracySummary {
    pub fn empty() -> Self {
        Self::from_totals(0, 0, 0.0, 0.0, Vec::new())
    }

    pub fn from_totals(
        total: u64,
        correct: u64,
        confidence_sum: f64,
        score_diff_sum: f64,
        recent: Vec<LedgerEntry>,
    ) -> Self {
        let mean = |sum: f64| if total == 0 { 0.0 } else { sum / total as f64 };
        Self {
            total,
            correct,
            accuracy_rate: mean(correct as f64) * 100.0,
            avg_confidence: mean(confidence_sum),
            avg_score_diff: mean(score_diff_sum),
            recent,
        }
    }

    /// Direct recomputation over every entry.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
        recent_limit: usize,
    ) -> Self {
        let mut total = 0;
        let mut correct = 0;
        let mut confidence_sum = 0.0;
        let mut score_diff_sum = 0.0;
        let mut recent = Vec::new();

        for entry in entries {
            let Some(outcome) = &entry.outcome else {
                continue;
            };
            total += 1;
            if outcome.correct {
                correct += 1;
            }
            confidence_sum += entry.prediction.confidence;
            score_diff_sum += f64::from(outcome.score_difference);
            recent.push(entry.clone());
        }

        recent.sort_by(LedgerEntry::cmp_recent);
        recent.truncate(recent_limit);
        Self::from_totals(total, correct, confidence_sum, score_diff_sum, recent)
    }
}
