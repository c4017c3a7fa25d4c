use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use picker_models::{
    AnalysisOptions, AnalysisRequest, FactorBundle, FactorKind, FactorPayload, MatchupKey,
    ModelError, PredictionResult, TeamDirectory, TeamId, TeamInfo,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::{AnalysisError, Result};
use crate::ledger::AccuracyLedger;
use crate::metrics::AnalysisMetrics;
use crate::normalizer::{normalize, NormalizationError};
use crate::providers::{FactorError, FactorProviders};
use crate::reasoning::{ReasoningClient, ReasoningError, ReasoningRequest, ReasoningResponse};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub provider_timeout: Duration,
    pub reasoning_timeout: Duration,
    /// Total reasoning attempts, including the first.
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub max_concurrent_reasoning: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(10),
            reasoning_timeout: Duration::from_secs(120),
            max_attempts: 2,
            retry_base_delay: Duration::from_secs(2),
            max_concurrent_reasoning: 4,
        }
    }
}

/// Upper bound on the pause between reasoning attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

fn next_retry_delay(delay: Duration) -> Duration {
    delay.saturating_mul(2).min(MAX_RETRY_DELAY.max(delay))
}

type SharedResult = Option<Result<PredictionResult>>;

struct InFlight {
    request: AnalysisRequest,
    result: watch::Receiver<SharedResult>,
}

struct Inner {
    directory: Arc<TeamDirectory>,
    providers: FactorProviders,
    reasoning: Arc<dyn ReasoningClient>,
    ledger: Arc<AccuracyLedger>,
    metrics: AnalysisMetrics,
    config: OrchestratorConfig,
    reasoning_permits: Semaphore,
    in_flight: DashMap<MatchupKey, InFlight>,
}

/// Clears the in-flight slot even if the analysis task panics.
struct InFlightGuard {
    inner: Arc<Inner>,
    key: MatchupKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.remove(&self.key);
    }
}

/// Gathers factors, asks the reasoning service for a verdict and records it.
#[derive(Clone)]
pub struct PredictionOrchestrator {
    inner: Arc<Inner>,
}

impl PredictionOrchestrator {
    pub fn new(
        directory: Arc<TeamDirectory>,
        providers: FactorProviders,
        reasoning: Arc<dyn ReasoningClient>,
        ledger: Arc<AccuracyLedger>,
        metrics: AnalysisMetrics,
        config: OrchestratorConfig,
    ) -> Self {
        let permits = Semaphore::new(config.max_concurrent_reasoning.max(1));
        Self {
            inner: Arc::new(Inner {
                directory,
                providers,
                reasoning,
                ledger,
                metrics,
                config,
                reasoning_permits: permits,
                in_flight: DashMap::new(),
            }),
        }
    }

    pub fn ledger(&self) -> &Arc<AccuracyLedger> {
        &self.inner.ledger
    }

    pub fn metrics(&self) -> &AnalysisMetrics {
        &self.inner.metrics
    }

    pub fn directory(&self) -> &Arc<TeamDirectory> {
        &self.inner.directory
    }

    /// Number of team pairs currently being analyzed.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Predicts `team_a` at `team_b`. Identical concurrent requests share one analysis.
    pub async fn analyze(
        &self,
        team_a: &str,
        team_b: &str,
        options: AnalysisOptions,
    ) -> Result<PredictionResult> {
        let team_a = self.inner.resolve_team(team_a)?;
        let team_b = self.inner.resolve_team(team_b)?;
        let request = AnalysisRequest::new(team_a, team_b, options)?;
        let key = request.matchup_key();

        let (mut receiver, sender) = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(existing) => {
                if existing.get().request != request {
                    warn!("Rejecting {} @ {}: {} already in flight", request.team_a, request.team_b, key);
                    return Err(AnalysisError::Conflict { matchup: key });
                }
                debug!("Joining in-flight analysis for {}", key);
                self.inner.metrics.record_coalesced();
                (existing.get().result.clone(), None)
            }
            Entry::Vacant(slot) => {
                let (sender, receiver) = watch::channel(None);
                slot.insert(InFlight {
                    request: request.clone(),
                    result: receiver.clone(),
                });
                (receiver, Some(sender))
            }
        };

        if let Some(sender) = sender {
            // runs detached so a dropped caller does not cancel the analysis
            let guard = InFlightGuard {
                inner: self.inner.clone(),
                key,
            };
            tokio::spawn(async move {
                let result = guard.inner.run(&request).await;
                drop(guard);
                let _ = sender.send(Some(result));
            });
        }

        let shared = receiver
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|value| (*value).clone());

        shared.unwrap_or_else(|| {
            Err(AnalysisError::AnalysisUnavailable {
                attempts: 0,
                reason: "analysis task ended without a result".to_string(),
            })
        })
    }
}

impl Inner {
    fn resolve_team(&self, input: &str) -> Result<TeamId> {
        if input.trim().is_empty() {
            return Err(ModelError::MissingTeam.into());
        }
        self.directory
            .resolve(input)
            .ok_or_else(|| ModelError::UnknownTeam(input.trim().to_string()).into())
    }

    fn team_info(&self, id: &TeamId) -> Result<&TeamInfo> {
        self.directory
            .get(id)
            .ok_or_else(|| ModelError::UnknownTeam(id.to_string()).into())
    }

    async fn run(&self, request: &AnalysisRequest) -> Result<PredictionResult> {
        let start = Instant::now();
        info!("🏈 Analyzing {} @ {}", request.away_team(), request.home_team());

        let result = self.predict(request).await;
        let outcome = match &result {
            Ok(prediction) => {
                info!(
                    "✅ {} @ {}: {} {} ({:.0}% confidence) in {:?}",
                    request.away_team(),
                    request.home_team(),
                    prediction.predicted_winner,
                    prediction.predicted_score,
                    prediction.confidence,
                    start.elapsed()
                );
                "success"
            }
            Err(err) => {
                error!("❌ {} @ {} failed: {}", request.away_team(), request.home_team(), err);
                err.kind()
            }
        };
        self.metrics.record_analysis(outcome, start.elapsed());
        result
    }

    async fn predict(&self, request: &AnalysisRequest) -> Result<PredictionResult> {
        let away = self.team_info(request.away_team())?;
        let home = self.team_info(request.home_team())?;

        let (away_factors, home_factors, warnings) = self.gather_factors(request).await?;
        let payload =
            ReasoningRequest::assemble(request, away_factors, home_factors, &self.directory);

        let response = self.reason(&payload).await?;
        let verdict = normalize(&response, away, home).map_err(|err| {
            warn!(raw = %err.raw, "Could not normalize verdict for {} @ {}: {}", away.id, home.id, err.reason);
            err
        })?;

        let prediction = PredictionResult::new(
            request.team_a.clone(),
            request.team_b.clone(),
            verdict.winner,
            verdict.score,
        )?
        .with_confidence(verdict.confidence)
        .with_key_factors(verdict.key_factors)
        .with_analysis(verdict.analysis)
        .with_warnings(warnings);

        self.ledger.append(prediction.clone()).await?;
        Ok(prediction)
    }

    /// Fetches every enabled factor for both teams concurrently.
    /// Returns the away bundle, the home bundle and warnings for dropped factors.
    async fn gather_factors(
        &self,
        request: &AnalysisRequest,
    ) -> Result<(FactorBundle, FactorBundle, Vec<String>)> {
        let timeout = self.config.provider_timeout;
        let mut warnings = Vec::new();
        let mut calls = Vec::new();

        for team in [request.away_team(), request.home_team()] {
            for kind in request.enabled_factors() {
                let Some(provider) = self.providers.get(kind) else {
                    warnings.push(format!("{kind} factor dropped for {team}: no provider configured"));
                    continue;
                };
                let team = team.clone();
                let handle = tokio::spawn({
                    let team = team.clone();
                    async move {
                        let fetched = tokio::time::timeout(timeout, provider.fetch(&team)).await;
                        match fetched {
                            Ok(result) => result,
                            Err(_) => Err(FactorError::Timeout {
                                kind,
                                team,
                                timeout,
                            }),
                        }
                    }
                });
                calls.push((team, kind, handle));
            }
        }

        let mut away = FactorBundle::new(request.away_team().clone());
        let mut home = FactorBundle::new(request.home_team().clone());
        let mut failure = None;

        for (team, kind, handle) in calls {
            let result: std::result::Result<FactorPayload, FactorError> =
                handle.await.unwrap_or_else(|err| {
                    Err(FactorError::Unavailable {
                        kind,
                        team: team.clone(),
                        reason: format!("provider task failed: {err}"),
                    })
                });

            match result {
                Ok(payload) if &team == request.away_team() => away.insert(kind, payload),
                Ok(payload) => home.insert(kind, payload),
                Err(err) if kind.is_mandatory() => {
                    if failure.is_none() {
                        failure = Some(match err {
                            FactorError::UnknownTeam { .. } => AnalysisError::Validation(err.to_string()),
                            other => AnalysisError::Provider {
                                factor: kind,
                                team,
                                reason: other.to_string(),
                            },
                        });
                    }
                }
                Err(err) => {
                    warn!("Dropping {} factor for {}: {}", kind, team, err);
                    self.metrics.record_dropped_factor(kind);
                    warnings.push(format!("{kind} factor dropped for {team}: {err}"));
                }
            }
        }

        if let Some(failure) = failure {
            return Err(failure);
        }
        warnings.sort();
        Ok((away, home, warnings))
    }

    /// Calls the reasoning service, retrying timeouts and transport failures.
    async fn reason(&self, payload: &ReasoningRequest) -> Result<ReasoningResponse> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.retry_base_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = {
                let _permit = self.reasoning_permits.acquire().await.map_err(|_| {
                    AnalysisError::AnalysisUnavailable {
                        attempts: attempt - 1,
                        reason: "reasoning capacity closed".to_string(),
                    }
                })?;
                match tokio::time::timeout(self.config.reasoning_timeout, self.reasoning.analyze(payload))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ReasoningError::Timeout(self.config.reasoning_timeout)),
                }
            };
            self.metrics.record_reasoning_call(result.is_ok());

            match result {
                Ok(response) => return Ok(response),
                Err(ReasoningError::InvalidResponse { reason, raw }) => {
                    warn!(raw = %raw, "Reasoning response unusable: {}", reason);
                    return Err(NormalizationError { reason, raw }.into());
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    warn!(
                        "Reasoning attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_retry_delay(delay);
                }
                Err(err) => {
                    return Err(AnalysisError::AnalysisUnavailable {
                        attempts: attempt,
                        reason: err.to_string(),
                    })
                }
            }
        }
    }
}
