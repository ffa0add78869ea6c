use std::path::PathBuf;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::db;
use crate::error::{Error, Result};
use crate::models::Snapshot;
use crate::sheets;

pub enum DataSource {
    Sheets(PathBuf),
    Postgres(PgPool),
}

impl DataSource {
    pub async fn connect(data_dir: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = data_dir {
            return Ok(DataSource::Sheets(dir));
        }
        Ok(DataSource::Postgres(connect_postgres().await?))
    }

    pub async fn load(&self) -> Result<Snapshot> {
        let snapshot = match self {
            DataSource::Sheets(dir) => sheets::load_snapshot(dir)?,
            DataSource::Postgres(pool) => db::fetch_snapshot(pool)
                .await
                .map_err(|err| Error::Source(err.to_string()))?,
        };

        tracing::info!(
            students = snapshot.students.len(),
            activities = snapshot.activities.len(),
            exams = snapshot.exams.len(),
            essays = snapshot.essays.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }
}

pub async fn connect_postgres() -> Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL").map_err(|_| {
        Error::Source("DATABASE_URL must be set when no --data-dir is given".to_string())
    })?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .map_err(|err| Error::Source(format!("failed to connect to Postgres: {err}")))
}
