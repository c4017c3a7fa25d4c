// Shared fixtures for the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use picker_api::{create_routes, AppState};
use picker_db::{DatabaseConnection, SqliteLedgerStore};
use picker_models::{FactorKind, FactorPayload, TeamDirectory, TeamId};
use picker_services::{
    AccuracyLedger, AnalysisMetrics, FactorError, FactorProvider, FactorProviders,
    OrchestratorConfig, PredictionOrchestrator, QueryService, ReasoningClient, ReasoningError,
    ReasoningRequest, ReasoningResponse, DEFAULT_RECENT_LIMIT,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Serves canned snapshots for every team in the directory.
pub struct FixtureProvider {
    kind: FactorKind,
    directory: TeamDirectory,
    failing: bool,
}

impl FixtureProvider {
    pub fn new(kind: FactorKind) -> Self {
        Self {
            kind,
            directory: TeamDirectory::nfl(),
            failing: false,
        }
    }

    pub fn failing(kind: FactorKind) -> Self {
        Self {
            failing: true,
            ..Self::new(kind)
        }
    }
}

#[async_trait]
impl FactorProvider for FixtureProvider {
    fn kind(&self) -> FactorKind {
        self.kind
    }

    async fn fetch(&self, team: &TeamId) -> Result<FactorPayload, FactorError> {
        if self.failing {
            return Err(FactorError::Unavailable {
                kind: self.kind,
                team: team.clone(),
                reason: "upstream feed offline".to_string(),
            });
        }
        if !self.directory.contains(team) {
            return Err(FactorError::UnknownTeam {
                kind: self.kind,
                team: team.clone(),
            });
        }

        Ok(match self.kind {
            FactorKind::Stats => json!({
                "QB": [
                    {"player_name": format!("{team} Starter"), "team": team.as_str(), "week": 9, "passing_yards": 2210, "touchdowns": 14},
                    {"player_name": format!("{team} Backup"), "passing_yards": 120}
                ],
                "RB": [
                    {"player_name": format!("{team} Runner"), "season": 2025, "rushing_yards": 640}
                ]
            }),
            FactorKind::Injuries => json!({"out": [], "questionable": ["LT"]}),
            FactorKind::Coaching => json!({"head_coach_record": "10-4"}),
            FactorKind::SpecialTeams => json!({"fg_pct": 0.88}),
        })
    }
}

pub fn fixture_providers() -> FactorProviders {
    let mut providers = FactorProviders::new(Arc::new(FixtureProvider::new(FactorKind::Stats)));
    for kind in [FactorKind::Injuries, FactorKind::Coaching, FactorKind::SpecialTeams] {
        providers = providers.with(Arc::new(FixtureProvider::new(kind)));
    }
    providers
}

/// Home team by three, 72% confidence.
pub fn home_wins(request: &ReasoningRequest) -> ReasoningResponse {
    ReasoningResponse {
        narrative: format!("{} hold serve at home.", request.home.name),
        verdict: json!({
            "winner": request.home.name,
            "score": "27-24",
            "confidence": 72,
            "key_factors": [
                format!("{} pass rush against a shaky line", request.home.name),
                "Home crowd noise on third down".to_string()
            ]
        }),
    }
}

/// Reasoning double that replays scripted replies, then falls back to [`home_wins`].
pub struct ScriptedReasoning {
    script: Mutex<VecDeque<Result<ReasoningResponse, ReasoningError>>>,
    calls: AtomicU32,
    delay: Duration,
}

impl ScriptedReasoning {
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<Result<ReasoningResponse, ReasoningError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningClient for ScriptedReasoning {
    async fn analyze(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(home_wins(request)))
    }
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        provider_timeout: Duration::from_secs(1),
        reasoning_timeout: Duration::from_secs(2),
        max_attempts: 2,
        retry_base_delay: Duration::from_millis(10),
        max_concurrent_reasoning: 4,
    }
}

pub struct TestApp {
    pub router: Router,
    pub orchestrator: PredictionOrchestrator,
    pub ledger: Arc<AccuracyLedger>,
    pub reasoning: Arc<ScriptedReasoning>,
}

impl TestApp {
    pub async fn new(reasoning: ScriptedReasoning) -> Self {
        let db = DatabaseConnection::in_memory().await.unwrap();
        Self::with_database(db, reasoning, fixture_providers()).await
    }

    pub async fn with_database(
        db: DatabaseConnection,
        reasoning: ScriptedReasoning,
        providers: FactorProviders,
    ) -> Self {
        db.run_migrations().await.unwrap();
        let store = Arc::new(SqliteLedgerStore::new(db.pool().clone()));
        let ledger = Arc::new(AccuracyLedger::open(store, DEFAULT_RECENT_LIMIT).await.unwrap());
        let reasoning = Arc::new(reasoning);
        let directory = Arc::new(TeamDirectory::nfl());

        let orchestrator = PredictionOrchestrator::new(
            directory.clone(),
            providers.clone(),
            reasoning.clone(),
            ledger.clone(),
            AnalysisMetrics::new().unwrap(),
            test_config(),
        );
        let queries = QueryService::new(directory, providers.stats.clone(), ledger.clone());
        let router = create_routes().with_state(AppState::new(orchestrator.clone(), queries));

        Self {
            router,
            orchestrator,
            ledger,
            reasoning,
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post_raw(uri, &body.to_string()).await
    }

    pub async fn post_raw(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }
}
