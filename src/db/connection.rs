use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL")
                .unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE")
                .unwrap_or_else(|_| "customizer".to_string()),
            database: env::var("SURREALDB_DATABASE")
                .unwrap_or_else(|_| "jobs".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Job records, keyed by job id
        "DEFINE TABLE IF NOT EXISTS job SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS job_id ON TABLE job TYPE string;
         DEFINE FIELD IF NOT EXISTS workload_id ON TABLE job TYPE string;
         DEFINE FIELD IF NOT EXISTS client_id ON TABLE job TYPE string;
         DEFINE FIELD IF NOT EXISTS status ON TABLE job TYPE string;
         DEFINE FIELD IF NOT EXISTS num_records ON TABLE job TYPE number DEFAULT 0;
         DEFINE FIELD IF NOT EXISTS nims ON TABLE job TYPE array DEFAULT [];",

        // Cancellation flags, keyed by job id
        "DEFINE TABLE IF NOT EXISTS cancellation SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS cancelled ON TABLE cancellation TYPE bool DEFAULT false;
         DEFINE FIELD IF NOT EXISTS cancelled_at ON TABLE cancellation TYPE option<datetime>;",

        "DEFINE INDEX IF NOT EXISTS job_status ON TABLE job COLUMNS status;
         DEFINE INDEX IF NOT EXISTS job_workload ON TABLE job COLUMNS workload_id;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        ensure_schema(&db).await.unwrap();
    }
}
