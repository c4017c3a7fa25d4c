use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use picker_models::{
    AccuracySummary, AnalysisOptions, LedgerEntry, OutcomeRecord, PredictionResult, TeamDirectory,
    TeamId,
};
use picker_services::{AccuracyLedger, AnalysisMetrics, PredictionOrchestrator, QueryService, TeamStatsView};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;

const DEFAULT_PREDICTIONS_LIMIT: usize = 50;
const MAX_PREDICTIONS_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: PredictionOrchestrator,
    pub queries: QueryService,
    pub ledger: Arc<AccuracyLedger>,
    pub directory: Arc<TeamDirectory>,
    pub metrics: AnalysisMetrics,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: PredictionOrchestrator, queries: QueryService) -> Self {
        Self {
            ledger: orchestrator.ledger().clone(),
            directory: orchestrator.directory().clone(),
            metrics: orchestrator.metrics().clone(),
            orchestrator,
            queries,
            started_at: Utc::now(),
        }
    }
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub team1: String,
    #[serde(default)]
    pub team2: String,
    #[serde(default = "enabled")]
    pub include_injuries: bool,
    #[serde(default = "enabled")]
    pub include_coaching: bool,
    #[serde(default = "enabled")]
    pub include_special_teams: bool,
}

impl AnalyzeRequest {
    fn options(&self) -> AnalysisOptions {
        AnalysisOptions {
            include_injuries: self.include_injuries,
            include_coaching: self.include_coaching,
            include_special_teams: self.include_special_teams,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TeamStatsParams {
    pub team1: Option<String>,
    pub team2: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PredictionsParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SaveResultRequest {
    #[serde(alias = "game_id")]
    pub prediction_id: Uuid,
    pub home_score: u32,
    pub away_score: u32,
    /// Team code or name, or "Tie". Derived from the scores when omitted.
    pub actual_winner: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictionView {
    pub id: Uuid,
    pub team1: String,
    pub team2: String,
    pub home_team: String,
    pub away_team: String,
    pub predicted_winner: String,
    pub predicted_score: String,
    pub confidence: f64,
    pub analysis_date: String,
    pub key_factors: Vec<String>,
    pub detailed_analysis: String,
    pub warnings: Vec<String>,
}

impl PredictionView {
    pub fn new(prediction: &PredictionResult, directory: &TeamDirectory) -> Self {
        let name = |id: &TeamId| directory.name_of(id).to_string();
        Self {
            id: prediction.id,
            team1: name(&prediction.team_a),
            team2: name(&prediction.team_b),
            home_team: name(prediction.home_team()),
            away_team: name(prediction.away_team()),
            predicted_winner: name(&prediction.predicted_winner),
            predicted_score: prediction.predicted_score.to_string(),
            confidence: prediction.confidence,
            analysis_date: prediction.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            key_factors: prediction.key_factors.clone(),
            detailed_analysis: prediction.detailed_analysis.clone(),
            warnings: prediction.warnings.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub results: PredictionView,
}

#[derive(Debug, Serialize)]
pub struct TeamStatsResponse {
    pub stats: BTreeMap<String, TeamStatsView>,
}

#[derive(Debug, Serialize)]
pub struct RecentGameView {
    pub team1: String,
    pub team2: String,
    pub predicted_winner: String,
    pub confidence: f64,
    pub actual_winner: String,
    pub home_score: u32,
    pub away_score: u32,
    pub score_difference: u32,
    pub correct: bool,
}

fn winner_name(winner: Option<&TeamId>, directory: &TeamDirectory) -> String {
    winner.map_or_else(|| "Tie".to_string(), |id| directory.name_of(id).to_string())
}

impl RecentGameView {
    fn from_entry(entry: &LedgerEntry, directory: &TeamDirectory) -> Option<Self> {
        let outcome = entry.outcome.as_ref()?;
        let prediction = &entry.prediction;
        Some(Self {
            team1: directory.name_of(&prediction.team_a).to_string(),
            team2: directory.name_of(&prediction.team_b).to_string(),
            predicted_winner: directory.name_of(&prediction.predicted_winner).to_string(),
            confidence: prediction.confidence,
            actual_winner: winner_name(outcome.actual_winner.as_ref(), directory),
            home_score: outcome.home_score,
            away_score: outcome.away_score,
            score_difference: outcome.score_difference,
            correct: outcome.correct,
        })
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Serialize)]
pub struct AccuracyView {
    pub total: u64,
    pub correct: u64,
    pub accuracy_rate: f64,
    pub avg_confidence: f64,
    pub avg_score_diff: f64,
    pub recent_games: Vec<RecentGameView>,
}

impl AccuracyView {
    pub fn new(summary: &AccuracySummary, directory: &TeamDirectory) -> Self {
        Self {
            total: summary.total,
            correct: summary.correct,
            accuracy_rate: round_to(summary.accuracy_rate, 1),
            avg_confidence: round_to(summary.avg_confidence, 2),
            avg_score_diff: round_to(summary.avg_score_diff, 1),
            recent_games: summary
                .recent
                .iter()
                .filter_map(|entry| RecentGameView::from_entry(entry, directory))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OutcomeView {
    pub prediction_id: Uuid,
    pub actual_winner: String,
    pub home_score: u32,
    pub away_score: u32,
    pub correct: bool,
    pub score_difference: u32,
    pub recorded_at: String,
}

impl OutcomeView {
    pub fn new(outcome: &OutcomeRecord, directory: &TeamDirectory) -> Self {
        Self {
            prediction_id: outcome.prediction_id,
            actual_winner: winner_name(outcome.actual_winner.as_ref(), directory),
            home_score: outcome.home_score,
            away_score: outcome.away_score,
            correct: outcome.correct,
            score_difference: outcome.score_difference,
            recorded_at: outcome.recorded_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaveResultResponse {
    pub success: bool,
    pub outcome: OutcomeView,
}

#[derive(Debug, Serialize)]
pub struct PredictionSummaryView {
    pub id: Uuid,
    /// Same as `id`, under the name older clients send back to `/api/save-result`.
    pub game_id: Uuid,
    pub team1: String,
    pub team2: String,
    pub predicted_winner: String,
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct PredictionsResponse {
    pub predictions: Vec<PredictionSummaryView>,
}

#[derive(Debug, Serialize)]
pub struct TeamView {
    pub abbreviation: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TeamsResponse {
    pub teams: Vec<TeamView>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub ledger_entries: usize,
    pub analyses_in_flight: usize,
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        // Health and metrics
        .route("/health", get(health_check).fallback(method_not_allowed))
        .route("/metrics", get(metrics).fallback(method_not_allowed))
        // Analysis
        .route("/api/analyze", post(analyze).fallback(method_not_allowed))
        .route("/api/team-stats", get(team_stats).fallback(method_not_allowed))
        .route("/api/teams", get(teams).fallback(method_not_allowed))
        // Accuracy ledger
        .route("/api/accuracy", get(accuracy).fallback(method_not_allowed))
        .route("/api/save-result", post(save_result).fallback(method_not_allowed))
        .route("/api/predictions", get(predictions).fallback(method_not_allowed))
        .fallback(not_found)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: now.to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (now - state.started_at).num_seconds(),
        ledger_entries: state.ledger.len(),
        analyses_in_flight: state.orchestrator.in_flight(),
    })
}

async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .render()
        .map_err(|err| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let Json(request) = payload?;
    info!("Analysis requested: {} @ {}", request.team1, request.team2);

    let prediction = state
        .orchestrator
        .analyze(&request.team1, &request.team2, request.options())
        .await?;

    Ok(Json(AnalyzeResponse {
        success: true,
        results: PredictionView::new(&prediction, &state.directory),
    }))
}

async fn team_stats(
    State(state): State<AppState>,
    params: Result<Query<TeamStatsParams>, QueryRejection>,
) -> Result<Json<TeamStatsResponse>, ApiError> {
    let Query(params) = params?;
    let stats = state
        .queries
        .team_stats(params.team1.as_deref(), params.team2.as_deref())
        .await?;
    Ok(Json(TeamStatsResponse { stats }))
}

async fn teams(State(state): State<AppState>) -> Json<TeamsResponse> {
    Json(TeamsResponse {
        teams: state
            .queries
            .teams()
            .iter()
            .map(|team| TeamView {
                abbreviation: team.id.to_string(),
                name: team.name.clone(),
            })
            .collect(),
    })
}

async fn accuracy(State(state): State<AppState>) -> Json<AccuracyView> {
    let summary = state.queries.accuracy();
    Json(AccuracyView::new(&summary, &state.directory))
}

async fn save_result(
    State(state): State<AppState>,
    payload: Result<Json<SaveResultRequest>, JsonRejection>,
) -> Result<Json<SaveResultResponse>, ApiError> {
    let Json(request) = payload?;

    let outcome = match request.actual_winner.as_deref().map(str::trim) {
        None | Some("") => {
            state
                .ledger
                .record_final_score(request.prediction_id, request.home_score, request.away_score)
                .await?
        }
        Some(winner) => {
            let winner = if winner.eq_ignore_ascii_case("tie") {
                None
            } else {
                Some(
                    state
                        .directory
                        .resolve(winner)
                        .ok_or_else(|| ApiError::bad_request(format!("Unknown team: {winner}")))?,
                )
            };
            state
                .ledger
                .record_outcome(request.prediction_id, winner, request.home_score, request.away_score)
                .await?
        }
    };

    Ok(Json(SaveResultResponse {
        success: true,
        outcome: OutcomeView::new(&outcome, &state.directory),
    }))
}

async fn predictions(
    State(state): State<AppState>,
    params: Result<Query<PredictionsParams>, QueryRejection>,
) -> Result<Json<PredictionsResponse>, ApiError> {
    let Query(params) = params?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PREDICTIONS_LIMIT)
        .min(MAX_PREDICTIONS_LIMIT);

    let predictions = state
        .queries
        .predictions(limit)
        .iter()
        .map(|prediction| PredictionSummaryView {
            id: prediction.id,
            game_id: prediction.id,
            team1: state.directory.name_of(&prediction.team_a).to_string(),
            team2: state.directory.name_of(&prediction.team_b).to_string(),
            predicted_winner: state.directory.name_of(&prediction.predicted_winner).to_string(),
            date: prediction.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();
    Ok(Json(PredictionsResponse { predictions }))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        assert_eq!(round_to(66.666_666, 1), 66.7);
        assert_eq!(round_to(71.234_5, 2), 71.23);
        assert_eq!(round_to(0.0, 1), 0.0);
    }

    #[test]
    fn test_analyze_request_defaults() {
        let request: AnalyzeRequest =
            serde_json::from_str(r#"{"team1": "NE", "team2": "KC", "include_coaching": false}"#)
                .unwrap();
        let options = request.options();
        assert!(options.include_injuries);
        assert!(!options.include_coaching);
        assert!(options.include_special_teams);

        let empty: AnalyzeRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.team1.is_empty());
    }
}
