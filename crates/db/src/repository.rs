use crate::schema::{parse_id, OutcomeRow, PredictionRow};
use async_trait::async_trait;
use picker_models::{LedgerEntry, LedgerError, OutcomeRecord, PredictionResult};
use sqlx::SqlitePool;
use std::collections::HashMap;

/// Durable backing for the accuracy ledger. Each write is atomic per entry.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Every stored entry, outcomes attached.
    async fn load_entries(&self) -> Result<Vec<LedgerEntry>, LedgerError>;

    async fn insert_prediction(&self, prediction: &PredictionResult) -> Result<(), LedgerError>;

    async fn insert_outcome(&self, outcome: &OutcomeRecord) -> Result<(), LedgerError>;

    /// Flushes pending writes and releases the underlying resources.
    async fn close(&self) -> Result<(), LedgerError>;
}

pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn load_entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let predictions: Vec<PredictionRow> = sqlx::query_as(
            r#"SELECT id, team_a, team_b, predicted_winner, predicted_winner_score,
                      predicted_loser_score, confidence, key_factors, detailed_analysis,
                      warnings, created_at
               FROM predictions"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let outcomes: Vec<OutcomeRow> = sqlx::query_as(
            "SELECT prediction_id, actual_winner, home_score, away_score, recorded_at FROM outcomes",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut outcomes_by_id = HashMap::with_capacity(outcomes.len());
        for row in outcomes {
            outcomes_by_id.insert(parse_id(&row.prediction_id)?, row);
        }

        let mut entries = Vec::with_capacity(predictions.len());
        for row in predictions {
            let prediction = row.into_prediction()?;
            let outcome = outcomes_by_id
                .remove(&prediction.id)
                .map(|row| row.into_outcome(&prediction))
                .transpose()?;
            entries.push(LedgerEntry {
                prediction,
                outcome,
            });
        }

        if !outcomes_by_id.is_empty() {
            tracing::warn!("Ignoring {} outcome rows without a prediction", outcomes_by_id.len());
        }

        Ok(entries)
    }

    async fn insert_prediction(&self, prediction: &PredictionResult) -> Result<(), LedgerError> {
        let row = PredictionRow::from_prediction(prediction)?;
        sqlx::query(
            r#"INSERT INTO predictions
               (id, team_a, team_b, predicted_winner, predicted_winner_score, predicted_loser_score,
                confidence, key_factors, detailed_analysis, warnings, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&row.id)
        .bind(&row.team_a)
        .bind(&row.team_b)
        .bind(&row.predicted_winner)
        .bind(row.predicted_winner_score)
        .bind(row.predicted_loser_score)
        .bind(row.confidence)
        .bind(&row.key_factors)
        .bind(&row.detailed_analysis)
        .bind(&row.warnings)
        .bind(&row.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                LedgerError::DuplicateId(prediction.id)
            }
            _ => err.into(),
        })?;
        Ok(())
    }

    async fn insert_outcome(&self, outcome: &OutcomeRecord) -> Result<(), LedgerError> {
        let row = OutcomeRow::from_outcome(outcome);
        sqlx::query(
            r#"INSERT INTO outcomes (prediction_id, actual_winner, home_score, away_score, recorded_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&row.prediction_id)
        .bind(&row.actual_winner)
        .bind(row.home_score)
        .bind(row.away_score)
        .bind(&row.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                LedgerError::AlreadyRecorded(outcome.prediction_id)
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                LedgerError::NotFound(outcome.prediction_id)
            }
            _ => err.into(),
        })?;
        Ok(())
    }

    async fn close(&self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabaseConnection;
    use picker_models::{PredictedScore, TeamId};

    async fn memory_store() -> SqliteLedgerStore {
        let db = DatabaseConnection::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        SqliteLedgerStore::new(db.pool().clone())
    }

    fn prediction() -> PredictionResult {
        PredictionResult::new(
            TeamId::new("NE"),
            TeamId::new("KC"),
            TeamId::new("KC"),
            PredictedScore::new(27, 24),
        )
        .unwrap()
        .with_confidence(72.0)
        .with_analysis("Chiefs at home with the better quarterback.")
    }

    #[tokio::test]
    async fn test_entries_survive_load() {
        let store = memory_store().await;
        let recorded = prediction();
        let pending = prediction();
        store.insert_prediction(&recorded).await.unwrap();
        store.insert_prediction(&pending).await.unwrap();

        let outcome = OutcomeRecord::new(&recorded, Some(TeamId::new("NE")), 24, 27).unwrap();
        store.insert_outcome(&outcome).await.unwrap();

        let mut entries = store.load_entries().await.unwrap();
        entries.sort_by_key(|entry| entry.is_pending());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].prediction, recorded);
        assert_eq!(entries[0].outcome.as_ref(), Some(&outcome));
        assert_eq!(entries[1].prediction, pending);
        assert!(entries[1].is_pending());
    }

    #[tokio::test]
    async fn test_duplicate_prediction_id_rejected() {
        let store = memory_store().await;
        let prediction = prediction();
        store.insert_prediction(&prediction).await.unwrap();

        let result = store.insert_prediction(&prediction).await;
        assert_eq!(result, Err(LedgerError::DuplicateId(prediction.id)));
    }

    #[tokio::test]
    async fn test_second_outcome_rejected() {
        let store = memory_store().await;
        let prediction = prediction();
        store.insert_prediction(&prediction).await.unwrap();

        let first = OutcomeRecord::new(&prediction, Some(TeamId::new("KC")), 31, 17).unwrap();
        store.insert_outcome(&first).await.unwrap();

        let second = OutcomeRecord::new(&prediction, Some(TeamId::new("NE")), 10, 13).unwrap();
        let result = store.insert_outcome(&second).await;
        assert_eq!(result, Err(LedgerError::AlreadyRecorded(prediction.id)));

        let entries = store.load_entries().await.unwrap();
        assert_eq!(entries[0].outcome.as_ref(), Some(&first));
    }

    #[tokio::test]
    async fn test_outcome_for_unknown_prediction() {
        let store = memory_store().await;
        let orphan = prediction();
        let outcome = OutcomeRecord::new(&orphan, Some(TeamId::new("KC")), 31, 17).unwrap();

        let result = store.insert_outcome(&outcome).await;
        assert_eq!(result, Err(LedgerError::NotFound(orphan.id)));
    }

    #[tokio::test]
    async fn test_file_store_reopens_with_entries() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
        let prediction = prediction();

        {
            let db = DatabaseConnection::new(&url, 2).await.unwrap();
            db.run_migrations().await.unwrap();
            let store = SqliteLedgerStore::new(db.pool().clone());
            store.insert_prediction(&prediction).await.unwrap();
            store.close().await.unwrap();
        }

        let db = DatabaseConnection::new(&url, 2).await.unwrap();
        db.run_migrations().await.unwrap();
        assert!(db.health_check().await.unwrap());
        let store = SqliteLedgerStore::new(db.pool().clone());
        let entries = store.load_entries().await.unwrap();
        assert_eq!(entries, vec![LedgerEntry::pending(prediction)]);
    }
}
