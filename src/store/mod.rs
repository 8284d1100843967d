use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, warn};

use crate::dispatch::{CompletedPoint, PointFailure, PointSink};
use crate::error::PersistenceError;
use crate::model::{
    FinishReason, MetricName, MetricSet, MetricValue, ParameterPoint, ScoredRecord,
    ValidationResult,
};
use crate::util::{now_utc_string, sha256_text};


pub const DB_SCHEMA_VERSION: &str = "1";
const POOL_MAX_SIZE: u32 = 8;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug)]
struct SqlitePragmaCustomizer;

impl CustomizeConnection<Connection, rusqlite::Error> for SqlitePragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentRow {
    pub experiment_id: i64,
    pub name: String,
    pub prompt: String,
    pub prompt_sha256: String,
    pub created_at: String,
    pub response_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredResponse {
    pub response_id: i64,
    pub sequence: i64,
    pub point: ParameterPoint,
    pub max_tokens: u32,
    pub text: String,
    pub finish_reason: FinishReason,
    pub validation: ValidationResult,
    pub metrics: MetricSet,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub experiments: i64,
    pub responses: i64,
    pub metrics: i64,
}

/// Opens (creating if needed) the store at `db_path` and brings its schema up to date.
pub fn open_pool(db_path: &Path) -> Result<DbPool, PersistenceError> {
    let manager = SqliteConnectionManager::file(db_path);
    let pool = Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .connection_customizer(Box::new(SqlitePragmaCustomizer))
        .build(manager)?;

    let conn = pool.get()?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    ensure_schema(&conn)?;
    debug!(path = %db_path.display(), "store ready");

    Ok(pool)
}

pub fn ensure_schema(connection: &Connection) -> Result<(), PersistenceError> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS experiments (
          experiment_id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL,
          prompt TEXT NOT NULL,
          prompt_sha256 TEXT NOT NULL,
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS responses (
          response_id INTEGER PRIMARY KEY AUTOINCREMENT,
          experiment_id INTEGER NOT NULL,
          sequence INTEGER NOT NULL,
          temperature REAL NOT NULL,
          top_p REAL NOT NULL,
          max_tokens INTEGER NOT NULL,
          text TEXT NOT NULL,
          finish_reason TEXT NOT NULL,
          validation_json TEXT NOT NULL,
          created_at TEXT NOT NULL,
          FOREIGN KEY(experiment_id) REFERENCES experiments(experiment_id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS metrics (
          metric_id INTEGER PRIMARY KEY AUTOINCREMENT,
          response_id INTEGER NOT NULL,
          name TEXT NOT NULL,
          value REAL NOT NULL,
          metadata_json TEXT NOT NULL,
          FOREIGN KEY(response_id) REFERENCES responses(response_id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_responses_experiment_sequence ON responses(experiment_id, sequence);
        CREATE INDEX IF NOT EXISTS idx_metrics_response ON metrics(response_id);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

pub fn create_experiment(
    connection: &Connection,
    name: &str,
    prompt: &str,
) -> Result<i64, PersistenceError> {
    connection.execute(
        "INSERT INTO experiments(name, prompt, prompt_sha256, created_at) VALUES(?1, ?2, ?3, ?4)",
        params![name, prompt, sha256_text(prompt), now_utc_string()],
    )?;
    Ok(connection.last_insert_rowid())
}

/// Writes one response and its metric rows in a single transaction.
pub fn insert_completed_point(
    connection: &mut Connection,
    experiment_id: i64,
    completed: &CompletedPoint,
) -> Result<i64, PersistenceError> {
    let validation_json = serde_json::to_string(&completed.validation)?;
    let tx = connection.transaction()?;

    tx.execute(
        "INSERT INTO responses(
           experiment_id, sequence, temperature, top_p, max_tokens,
           text, finish_reason, validation_json, created_at
         ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            experiment_id,
            completed.sequence as i64,
            completed.point.temperature,
            completed.point.top_p,
            completed.max_tokens,
            completed.text,
            completed.finish_reason.as_str(),
            validation_json,
            now_utc_string(),
        ],
    )?;
    let response_id = tx.last_insert_rowid();

    {
        let mut statement = tx.prepare(
            "INSERT INTO metrics(response_id, name, value, metadata_json) VALUES(?1, ?2, ?3, ?4)",
        )?;
        for (name, metric) in &completed.metrics {
            let metadata_json = serde_json::to_string(&metric.metadata)?;
            statement.execute(params![response_id, name.as_str(), metric.value, metadata_json])?;
        }
    }

    tx.commit()?;
    Ok(response_id)
}

/// Responses of one experiment in sequence order, each with its metric set.
pub fn load_scored_records(
    connection: &Connection,
    experiment_id: i64,
) -> Result<Vec<ScoredRecord>, PersistenceError> {
    let mut statement = connection.prepare(
        "SELECT response_id, temperature, top_p
         FROM responses
         WHERE experiment_id = ?1
         ORDER BY sequence, response_id",
    )?;
    let mut records = statement
        .query_map([experiment_id], |row| {
            Ok(ScoredRecord {
                response_id: Some(row.get(0)?),
                point: ParameterPoint {
                    temperature: row.get(1)?,
                    top_p: row.get(2)?,
                },
                metrics: MetricSet::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut metric_rows = load_metric_sets(connection, experiment_id)?;
    for record in &mut records {
        if let Some(metrics) = record.response_id.and_then(|id| metric_rows.remove(&id)) {
            record.metrics = metrics;
        }
    }

    Ok(records)
}

/// Stored responses of one experiment in sequence order, with validation and metrics.
pub fn load_responses(
    connection: &Connection,
    experiment_id: i64,
) -> Result<Vec<StoredResponse>, PersistenceError> {
    let mut statement = connection.prepare(
        "SELECT response_id, sequence, temperature, top_p, max_tokens,
                text, finish_reason, validation_json, created_at
         FROM responses
         WHERE experiment_id = ?1
         ORDER BY sequence, response_id",
    )?;
    let mut rows = statement.query([experiment_id])?;

    let mut responses = Vec::<StoredResponse>::new();
    while let Some(row) = rows.next()? {
        let finish_reason: String = row.get(6)?;
        let validation_json: String = row.get(7)?;
        responses.push(StoredResponse {
            response_id: row.get(0)?,
            sequence: row.get(1)?,
            point: ParameterPoint {
                temperature: row.get(2)?,
                top_p: row.get(3)?,
            },
            max_tokens: row.get(4)?,
            text: row.get(5)?,
            finish_reason: FinishReason::parse(&finish_reason),
            validation: serde_json::from_str(&validation_json)?,
            metrics: MetricSet::new(),
            created_at: row.get(8)?,
        });
    }

    let mut metric_rows = load_metric_sets(connection, experiment_id)?;
    for response in &mut responses {
        if let Some(metrics) = metric_rows.remove(&response.response_id) {
            response.metrics = metrics;
        }
    }

    Ok(responses)
}

fn load_metric_sets(
    connection: &Connection,
    experiment_id: i64,
) -> Result<BTreeMap<i64, MetricSet>, PersistenceError> {
    let mut metric_rows = BTreeMap::<i64, MetricSet>::new();
    let mut statement = connection.prepare(
        "SELECT m.response_id, m.name, m.value, m.metadata_json
         FROM metrics m
         JOIN responses r ON r.response_id = m.response_id
         WHERE r.experiment_id = ?1",
    )?;
    let mut rows = statement.query([experiment_id])?;
    while let Some(row) = rows.next()? {
        let response_id: i64 = row.get(0)?;
        let raw_name: String = row.get(1)?;
        let Some(name) = MetricName::parse(&raw_name) else {
            warn!(response_id, metric = %raw_name, "skipping unknown metric");
            continue;
        };
        let metadata_json: String = row.get(3)?;
        metric_rows.entry(response_id).or_default().insert(
            name,
            MetricValue {
                value: row.get(2)?,
                metadata: serde_json::from_str(&metadata_json)?,
            },
        );
    }

    Ok(metric_rows)
}

/// Removes an experiment; its responses and metrics go with it through the cascade.
pub fn delete_experiment(
    connection: &Connection,
    experiment_id: i64,
) -> Result<bool, PersistenceError> {
    let deleted = connection.execute(
        "DELETE FROM experiments WHERE experiment_id = ?1",
        [experiment_id],
    )?;
    Ok(deleted > 0)
}

pub fn load_experiment(
    connection: &Connection,
    experiment_id: i64,
) -> Result<Option<ExperimentRow>, PersistenceError> {
    let row = connection
        .query_row(
            &format!("{EXPERIMENT_SELECT} WHERE e.experiment_id = ?1 GROUP BY e.experiment_id"),
            [experiment_id],
            experiment_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn list_experiments(connection: &Connection) -> Result<Vec<ExperimentRow>, PersistenceError> {
    let mut statement = connection.prepare(&format!(
        "{EXPERIMENT_SELECT} GROUP BY e.experiment_id ORDER BY e.experiment_id"
    ))?;
    let rows = statement
        .query_map([], experiment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_rows(connection: &Connection) -> Result<RowCounts, PersistenceError> {
    Ok(RowCounts {
        experiments: query_count(connection, "SELECT COUNT(*) FROM experiments")?,
        responses: query_count(connection, "SELECT COUNT(*) FROM responses")?,
        metrics: query_count(connection, "SELECT COUNT(*) FROM metrics")?,
    })
}

const EXPERIMENT_SELECT: &str = "
    SELECT e.experiment_id, e.name, e.prompt, e.prompt_sha256, e.created_at, COUNT(r.response_id)
    FROM experiments e
    LEFT JOIN responses r ON r.experiment_id = e.experiment_id";

fn experiment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExperimentRow> {
    Ok(ExperimentRow {
        experiment_id: row.get(0)?,
        name: row.get(1)?,
        prompt: row.get(2)?,
        prompt_sha256: row.get(3)?,
        created_at: row.get(4)?,
        response_count: row.get(5)?,
    })
}

fn query_count(connection: &Connection, sql: &str) -> Result<i64, PersistenceError> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}

/// Persists completed points of one experiment, one pooled connection per point.
pub struct SqliteSink {
    pool: DbPool,
    experiment_id: i64,
}

impl SqliteSink {
    pub fn new(pool: DbPool, experiment_id: i64) -> Self {
        Self {
            pool,
            experiment_id,
        }
    }
}

#[async_trait]
impl PointSink for SqliteSink {
    async fn point_completed(&self, completed: CompletedPoint) -> Result<(), PersistenceError> {
        let pool = self.pool.clone();
        let experiment_id = self.experiment_id;
        let sequence = completed.sequence;

        let response_id = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            insert_completed_point(&mut conn, experiment_id, &completed)
        })
        .await
        .map_err(|err| PersistenceError::Worker(err.to_string()))??;

        debug!(experiment_id, sequence, response_id, "response stored");
        Ok(())
    }

    async fn point_failed(&self, failure: &PointFailure) {
        debug!(
            experiment_id = self.experiment_id,
            sequence = failure.sequence,
            kind = failure.kind,
            "point not stored"
        );
    }
}
