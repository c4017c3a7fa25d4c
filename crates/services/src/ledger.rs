use parking_lot::RwLock;
use picker_db::LedgerStore;
use picker_models::{
    AccuracySummary, LedgerEntry, LedgerError, OutcomeRecord, PredictionResult, TeamId,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Default number of recent games carried in an accuracy summary.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, Default, Clone, Copy)]
struct RunningTotals {
    total: u64,
    correct: u64,
    confidence_sum: f64,
    score_diff_sum: f64,
}

impl RunningTotals {
    fn add(&mut self, prediction: &PredictionResult, outcome: &OutcomeRecord) {
        self.total += 1;
        if outcome.correct {
            self.correct += 1;
        }
        self.confidence_sum += prediction.confidence;
        self.score_diff_sum += f64::from(outcome.score_difference);
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: HashMap<Uuid, LedgerEntry>,
    totals: RunningTotals,
}

impl LedgerState {
    fn insert(&mut self, entry: LedgerEntry) {
        if let Some(outcome) = &entry.outcome {
            self.totals.add(&entry.prediction, outcome);
        }
        self.entries.insert(entry.prediction.id, entry);
    }
}

/// Append-only record of predictions and their real outcomes.
///
/// Writes are serialized and hit the store before the in-memory mirror is
/// updated, so readers only ever see committed entries.
pub struct AccuracyLedger {
    store: Arc<dyn LedgerStore>,
    state: RwLock<LedgerState>,
    writer: Mutex<()>,
    recent_limit: usize,
}

impl AccuracyLedger {
    /// Loads every stored entry so the summary survives restarts.
    pub async fn open(store: Arc<dyn LedgerStore>, recent_limit: usize) -> Result<Self, LedgerError> {
        let entries = store.load_entries().await?;
        let mut state = LedgerState::default();
        for entry in entries {
            state.insert(entry);
        }
        info!(
            "📒 Ledger opened with {} predictions ({} with outcomes)",
            state.entries.len(),
            state.totals.total
        );

        Ok(Self {
            store,
            state: RwLock::new(state),
            writer: Mutex::new(()),
            recent_limit,
        })
    }

    pub async fn append(&self, prediction: PredictionResult) -> Result<(), LedgerError> {
        let _writer = self.writer.lock().await;

        let exists = self.state.read().entries.contains_key(&prediction.id);
        if exists {
            return Err(LedgerError::DuplicateId(prediction.id));
        }

        self.store.insert_prediction(&prediction).await?;
        debug!("Appended pending prediction {}", prediction.id);
        self.state.write().insert(LedgerEntry::pending(prediction));
        Ok(())
    }

    /// Attaches the real result to a prediction. `actual_winner` is `None` for a tie.
    pub async fn record_outcome(
        &self,
        prediction_id: Uuid,
        actual_winner: Option<TeamId>,
        home_score: u32,
        away_score: u32,
    ) -> Result<OutcomeRecord, LedgerError> {
        self.record(prediction_id, Some(actual_winner), home_score, away_score)
            .await
    }

    /// Records a final score, deriving the winner from it.
    pub async fn record_final_score(
        &self,
        prediction_id: Uuid,
        home_score: u32,
        away_score: u32,
    ) -> Result<OutcomeRecord, LedgerError> {
        self.record(prediction_id, None, home_score, away_score).await
    }

    async fn record(
        &self,
        prediction_id: Uuid,
        actual_winner: Option<Option<TeamId>>,
        home_score: u32,
        away_score: u32,
    ) -> Result<OutcomeRecord, LedgerError> {
        let _writer = self.writer.lock().await;

        let prediction = {
            let state = self.state.read();
            let entry = state
                .entries
                .get(&prediction_id)
                .ok_or(LedgerError::NotFound(prediction_id))?;
            if entry.outcome.is_some() {
                return Err(LedgerError::AlreadyRecorded(prediction_id));
            }
            entry.prediction.clone()
        };

        let actual_winner = actual_winner.unwrap_or_else(|| {
            match home_score.cmp(&away_score) {
                Ordering::Greater => Some(prediction.home_team().clone()),
                Ordering::Less => Some(prediction.away_team().clone()),
                Ordering::Equal => None,
            }
        });
        let outcome = OutcomeRecord::new(&prediction, actual_winner, home_score, away_score)?;
        self.store.insert_outcome(&outcome).await?;

        {
            let mut state = self.state.write();
            state.totals.add(&prediction, &outcome);
            if let Some(entry) = state.entries.get_mut(&prediction_id) {
                entry.outcome = Some(outcome.clone());
            }
        }

        info!(
            "🏁 Recorded outcome for {} ({} vs {}): {}-{}, correct={}",
            prediction_id,
            prediction.team_a,
            prediction.team_b,
            home_score,
            away_score,
            outcome.correct
        );
        Ok(outcome)
    }

    /// Accuracy over every entry with an outcome, from running totals.
    pub fn summary(&self) -> AccuracySummary {
        let state = self.state.read();
        let totals = state.totals;
        let mut recent: Vec<LedgerEntry> = state
            .entries
            .values()
            .filter(|entry| entry.outcome.is_some())
            .cloned()
            .collect();
        drop(state);

        recent.sort_by(LedgerEntry::cmp_recent);
        recent.truncate(self.recent_limit);
        AccuracySummary::from_totals(
            totals.total,
            totals.correct,
            totals.confidence_sum,
            totals.score_diff_sum,
            recent,
        )
    }

    /// Same view as [`Self::summary`], recomputed from scratch.
    pub fn recompute_summary(&self) -> AccuracySummary {
        let state = self.state.read();
        AccuracySummary::from_entries(state.entries.values(), self.recent_limit)
    }

    /// Up to `n` entries, pending or not, most recently recorded first.
    pub fn recent(&self, n: usize) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self.state.read().entries.values().cloned().collect();
        entries.sort_by(LedgerEntry::cmp_recent);
        entries.truncate(n);
        entries
    }

    /// Up to `limit` predictions, newest first.
    pub fn predictions(&self, limit: usize) -> Vec<PredictionResult> {
        let mut predictions: Vec<PredictionResult> = self
            .state
            .read()
            .entries
            .values()
            .map(|entry| entry.prediction.clone())
            .collect();
        predictions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        predictions.truncate(limit);
        predictions
    }

    pub fn get(&self, prediction_id: Uuid) -> Option<LedgerEntry> {
        self.state.read().entries.get(&prediction_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Final flush at shutdown. Waits for any in-progress write.
    pub async fn close(&self) -> Result<(), LedgerError> {
        let _writer = self.writer.lock().await;
        self.store.close().await?;
        info!("📒 Ledger closed with {} predictions", self.len());
        Ok(())
    }
}
