use picker_models::{AccuracySummary, FactorKind, PredictionResult, TeamDirectory, TeamInfo};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AnalysisError, Result};
use crate::ledger::AccuracyLedger;
use crate::providers::{FactorError, FactorProvider};

/// Player-record keys that describe the row rather than the player's output.
const BOOKKEEPING_KEYS: [&str; 9] = [
    "id",
    "player_id",
    "player_name",
    "team",
    "position",
    "week",
    "season",
    "last_updated",
    "data_source",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionLeader {
    pub player_name: String,
    pub stats: Map<String, Value>,
}

/// Top player per position for one team.
pub type TeamStatsView = BTreeMap<String, PositionLeader>;

/// Read-only views over team stats and the accuracy ledger.
#[derive(Clone)]
pub struct QueryService {
    directory: Arc<TeamDirectory>,
    stats: Arc<dyn FactorProvider>,
    ledger: Arc<AccuracyLedger>,
}

impl QueryService {
    pub fn new(
        directory: Arc<TeamDirectory>,
        stats: Arc<dyn FactorProvider>,
        ledger: Arc<AccuracyLedger>,
    ) -> Self {
        Self {
            directory,
            stats,
            ledger,
        }
    }

    /// Stats snapshots keyed by full team name. At least one team is required.
    pub async fn team_stats(
        &self,
        team_a: Option<&str>,
        team_b: Option<&str>,
    ) -> Result<BTreeMap<String, TeamStatsView>> {
        let requested: Vec<&str> = [team_a, team_b]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|team| !team.is_empty())
            .collect();
        if requested.is_empty() {
            return Err(AnalysisError::Validation("At least one team is required".to_string()));
        }

        let mut views = BTreeMap::new();
        for input in requested {
            let team = self
                .directory
                .resolve(input)
                .and_then(|id| self.directory.get(&id))
                .ok_or_else(|| AnalysisError::Validation(format!("Unknown team: {input}")))?;

            let payload = self.stats.fetch(&team.id).await.map_err(|err| match err {
                FactorError::UnknownTeam { .. } => AnalysisError::Validation(err.to_string()),
                other => AnalysisError::Provider {
                    factor: FactorKind::Stats,
                    team: team.id.clone(),
                    reason: other.to_string(),
                },
            })?;
            views.insert(team.name.clone(), format_team_stats(&payload));
        }
        Ok(views)
    }

    pub fn accuracy(&self) -> AccuracySummary {
        self.ledger.summary()
    }

    pub fn teams(&self) -> &[TeamInfo] {
        self.directory.teams()
    }

    pub fn predictions(&self, limit: usize) -> Vec<PredictionResult> {
        self.ledger.predictions(limit)
    }
}

/// Reduces `{position: [player, ...]}` to the first listed player per position.
pub fn format_team_stats(payload: &Value) -> TeamStatsView {
    let Some(positions) = payload.as_object() else {
        return TeamStatsView::new();
    };

    positions
        .iter()
        .filter_map(|(position, players)| {
            let top = players.as_array()?.first()?.as_object()?;
            let player_name = top
                .get("player_name")
                .and_then(Value::as_str)
                .unwrap_or("N/A")
                .to_string();
            let stats = top
                .iter()
                .filter(|(key, _)| !BOOKKEEPING_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Some((position.clone(), PositionLeader { player_name, stats }))
        })
        .collect()
}
