//! SQLite-backed research store.
//!
//! One connection behind a lock; timestamps stored as RFC 3339 text, JSON
//! payloads as serialized text. The partial unique index on active jobs is
//! the durable form of the single-flight rule: a duplicate insert loses at
//! the database, not in application code.

use super::ResearchStore;
use crate::error::StoreError;
use crate::types::{Entity, Metric, ResearchJob, Source};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entities (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    entity_type  TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sources (
    id             TEXT PRIMARY KEY,
    entity_id      TEXT NOT NULL REFERENCES entities(id),
    url            TEXT NOT NULL,
    source_type    TEXT NOT NULL,
    search_engine  TEXT NOT NULL,
    discovered_at  TEXT NOT NULL,
    UNIQUE (entity_id, url)
);

CREATE TABLE IF NOT EXISTS metrics (
    id                TEXT PRIMARY KEY,
    entity_id         TEXT NOT NULL REFERENCES entities(id),
    name              TEXT NOT NULL,
    value             TEXT NOT NULL,
    category          TEXT NOT NULL,
    confidence_score  REAL NOT NULL,
    raw_data          TEXT NOT NULL,
    generated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS research_jobs (
    job_id        TEXT PRIMARY KEY,
    job_type      TEXT NOT NULL,
    query         TEXT NOT NULL,
    status        TEXT NOT NULL,
    started_at    TEXT,
    completed_at  TEXT,
    entity_id     TEXT,
    result_data   TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_active_jobs
    ON research_jobs (job_type, query)
    WHERE status IN ('pending', 'in_progress');

CREATE INDEX IF NOT EXISTS idx_sources_entity ON sources (entity_id);
CREATE INDEX IF NOT EXISTS idx_metrics_entity ON metrics (entity_id);
";

/// SQLite implementation of `ResearchStore`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Connection {
            message: e.to_string(),
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Connection {
            message: e.to_string(),
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(query_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn query_err(e: rusqlite::Error) -> StoreError {
    StoreError::Query {
        message: e.to_string(),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn parse_uuid(s: String) -> Result<Uuid, StoreError> {
    Uuid::parse_str(&s).map_err(|e| StoreError::Serialization {
        message: format!("invalid uuid '{s}': {e}"),
    })
}

fn parse_timestamp(s: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization {
            message: format!("invalid timestamp '{s}': {e}"),
        })
}

fn parse_json(s: String) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(&s).map_err(|e| StoreError::Serialization {
        message: format!("invalid json payload: {e}"),
    })
}

fn parse_enum<T: std::str::FromStr<Err = String>>(s: String) -> Result<T, StoreError> {
    s.parse()
        .map_err(|e| StoreError::Serialization { message: e })
}

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        job_id: row.get(0)?,
        job_type: row.get(1)?,
        query: row.get(2)?,
        status: row.get(3)?,
        started_at: row.get(4)?,
        completed_at: row.get(5)?,
        entity_id: row.get(6)?,
        result_data: row.get(7)?,
    })
}

/// Row image before string fields are parsed into domain types.
struct RawJob {
    job_id: String,
    job_type: String,
    query: String,
    status: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    entity_id: Option<String>,
    result_data: String,
}

impl RawJob {
    fn into_job(self) -> Result<ResearchJob, StoreError> {
        Ok(ResearchJob {
            job_id: parse_uuid(self.job_id)?,
            job_type: self.job_type,
            query: self.query,
            status: parse_enum(self.status)?,
            started_at: self.started_at.map(parse_timestamp).transpose()?,
            completed_at: self.completed_at.map(parse_timestamp).transpose()?,
            entity_id: self.entity_id.map(parse_uuid).transpose()?,
            result_data: parse_json(self.result_data)?,
        })
    }
}

const JOB_COLUMNS: &str =
    "job_id, job_type, query, status, started_at, completed_at, entity_id, result_data";

#[async_trait]
impl ResearchStore for SqliteStore {
    async fn create_job(&self, job: &ResearchJob) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO research_jobs (job_id, job_type, query, status, started_at, \
             completed_at, entity_id, result_data) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.job_id.to_string(),
                job.job_type,
                job.query,
                job.status.as_str(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
                job.entity_id.map(|id| id.to_string()),
                job.result_data.to_string(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateActiveJob {
                job_type: job.job_type.clone(),
                query: job.query.clone(),
            }),
            Err(e) => Err(query_err(e)),
        }
    }

    async fn update_job(&self, job: &ResearchJob) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE research_jobs SET status = ?2, started_at = ?3, completed_at = ?4, \
                 entity_id = ?5, result_data = ?6 WHERE job_id = ?1",
                params![
                    job.job_id.to_string(),
                    job.status.as_str(),
                    job.started_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                    job.entity_id.map(|id| id.to_string()),
                    job.result_data.to_string(),
                ],
            )
            .map_err(query_err)?;
        if updated == 0 {
            return Err(StoreError::Query {
                message: format!("job {} does not exist", job.job_id),
            });
        }
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ResearchJob>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM research_jobs WHERE job_id = ?1"
            ))
            .map_err(query_err)?;
        let raw = stmt
            .query_row(params![job_id.to_string()], job_from_row)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(query_err(other)),
            })?;
        raw.map(RawJob::into_job).transpose()
    }

    async fn find_active_job(
        &self,
        job_type: &str,
        query: &str,
    ) -> Result<Option<ResearchJob>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM research_jobs \
                 WHERE job_type = ?1 AND query = ?2 AND status IN ('pending', 'in_progress')"
            ))
            .map_err(query_err)?;
        let raw = stmt
            .query_row(params![job_type, query], job_from_row)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(query_err(other)),
            })?;
        raw.map(RawJob::into_job).transpose()
    }

    async fn create_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO entities (id, name, entity_type, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                entity.id.to_string(),
                entity.name,
                entity.entity_type.as_str(),
                entity.created_at.to_rfc3339(),
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    async fn find_entity_by_name(&self, name: &str) -> Result<Option<Entity>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, entity_type, created_at FROM entities \
                 WHERE name LIKE '%' || ?1 || '%' COLLATE NOCASE LIMIT 1",
            )
            .map_err(query_err)?;
        let raw = stmt
            .query_row(params![name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(query_err(other)),
            })?;

        raw.map(|(id, name, entity_type, created_at)| {
            Ok(Entity {
                id: parse_uuid(id)?,
                name,
                entity_type: parse_enum(entity_type)?,
                created_at: parse_timestamp(created_at)?,
            })
        })
        .transpose()
    }

    async fn insert_sources(&self, sources: &[Source]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(|e| StoreError::Transaction {
            message: e.to_string(),
        })?;
        for source in sources {
            tx.execute(
                "INSERT INTO sources (id, entity_id, url, source_type, search_engine, \
                 discovered_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    source.id.to_string(),
                    source.entity_id.to_string(),
                    source.url,
                    source.source_type,
                    source.search_engine,
                    source.discovered_at.to_rfc3339(),
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(|e| StoreError::Transaction {
            message: e.to_string(),
        })
    }

    async fn insert_metrics(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(|e| StoreError::Transaction {
            message: e.to_string(),
        })?;
        for metric in metrics {
            tx.execute(
                "INSERT INTO metrics (id, entity_id, name, value, category, \
                 confidence_score, raw_data, generated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    metric.id.to_string(),
                    metric.entity_id.to_string(),
                    metric.name,
                    metric.value,
                    metric.category.as_str(),
                    metric.confidence_score,
                    metric.raw_data.to_string(),
                    metric.generated_at.to_rfc3339(),
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(|e| StoreError::Transaction {
            message: e.to_string(),
        })
    }

    async fn sources_for_entity(&self, entity_id: Uuid) -> Result<Vec<Source>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, entity_id, url, source_type, search_engine, discovered_at \
                 FROM sources WHERE entity_id = ?1 ORDER BY discovered_at",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![entity_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(query_err)?;

        let mut sources = Vec::new();
        for row in rows {
            let (id, entity_id, url, source_type, search_engine, discovered_at) =
                row.map_err(query_err)?;
            sources.push(Source {
                id: parse_uuid(id)?,
                entity_id: parse_uuid(entity_id)?,
                url,
                source_type,
                search_engine,
                discovered_at: parse_timestamp(discovered_at)?,
            });
        }
        Ok(sources)
    }

    async fn metrics_for_entity(&self, entity_id: Uuid) -> Result<Vec<Metric>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, entity_id, name, value, category, confidence_score, raw_data, \
                 generated_at FROM metrics WHERE entity_id = ?1 ORDER BY generated_at",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![entity_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(query_err)?;

        let mut metrics = Vec::new();
        for row in rows {
            let (id, entity_id, name, value, category, confidence_score, raw_data, generated_at) =
                row.map_err(query_err)?;
            metrics.push(Metric {
                id: parse_uuid(id)?,
                entity_id: parse_uuid(entity_id)?,
                name,
                value,
                category: parse_enum(category)?,
                confidence_score,
                raw_data: parse_json(raw_data)?,
                generated_at: parse_timestamp(generated_at)?,
            });
        }
        Ok(metrics)
    }
}
