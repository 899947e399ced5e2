use anyhow::Result;
use async_trait::async_trait;

use crate::cancellation::CancellationStore;
use crate::db::Db;
use crate::types::JobId;

/// Cancellation flags persisted in the `cancellation` table, one record per job id.
#[derive(Clone)]
pub struct SurrealCancellationStore {
    db: Db,
}

impl SurrealCancellationStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CancellationStore for SurrealCancellationStore {
    async fn is_cancelled(&self, run_id: &JobId) -> Result<bool> {
        let query = "SELECT VALUE cancelled FROM type::thing('cancellation', $run_id)";

        let mut res = self
            .db
            .query(query)
            .bind(("run_id", run_id.to_string()))
            .await?;

        let flags: Vec<bool> = res.take(0)?;
        Ok(flags.into_iter().any(|flag| flag))
    }

    async fn set_cancelled(&self, run_id: &JobId) -> Result<()> {
        let query = r#"
            UPSERT type::thing('cancellation', $run_id) SET
                cancelled = true,
                cancelled_at = time::now()
        "#;

        self.db
            .query(query)
            .bind(("run_id", run_id.to_string()))
            .await?
            .check()?;

        Ok(())
    }
}
