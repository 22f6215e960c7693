use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

// Use shared types
use evalscope_types::EvalRecord;

/// Evaluation results kept in SQLite, one import batch per run.
#[derive(Debug)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEntity {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
    pub records: usize,
}

impl Store {
    /// Open a new store at the given path (e.g., "results.db")
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Self::from_connection(conn)
    }

    /// A throwaway store for tests and one-off imports.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("store connection poisoned"))
    }

    /// Initialize the SQLite schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL,
                metadata TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY,
                run_id INTEGER NOT NULL,
                task_name TEXT NOT NULL,
                model TEXT NOT NULL,
                score REAL,
                task_args TEXT NOT NULL,
                FOREIGN KEY(run_id) REFERENCES runs(id)
            )",
            [],
        )?;

        Ok(())
    }

    /// Create a new run entry
    pub fn create_run(&self, metadata: Option<serde_json::Value>) -> Result<i64> {
        let conn = self.lock()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO runs (created_at, metadata) VALUES (?1, ?2)",
            params![now.to_rfc3339(), metadata.map(|v| v.to_string())],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Save a batch of result rows under `run_id` in one transaction.
    pub fn save_records(&self, run_id: i64, records: &[EvalRecord]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for record in records {
            tx.execute(
                "INSERT INTO records (run_id, task_name, model, score, task_args)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    run_id,
                    record.task_name,
                    record.model,
                    record.score,
                    serde_json::to_string(&record.task_args)?
                ],
            )?;
        }

        tx.commit()?;
        Ok(records.len())
    }

    /// Every stored row, oldest first.
    pub fn load_records(&self) -> Result<Vec<EvalRecord>> {
        self.query_records("SELECT task_name, model, score, task_args FROM records ORDER BY id", params![])
    }

    pub fn load_run(&self, run_id: i64) -> Result<Vec<EvalRecord>> {
        self.query_records(
            "SELECT task_name, model, score, task_args FROM records WHERE run_id = ?1 ORDER BY id",
            [run_id],
        )
    }

    fn query_records<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<EvalRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (task_name, model, score, task_args) = row?;
            let task_args: BTreeMap<String, serde_json::Value> = serde_json::from_str(&task_args)
                .with_context(|| format!("corrupt task_args for task {task_name}"))?;
            records.push(EvalRecord {
                task_name,
                model,
                score,
                task_args,
            });
        }
        Ok(records)
    }

    pub fn list_runs(&self) -> Result<Vec<RunEntity>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT runs.id, runs.created_at, runs.metadata, COUNT(records.id)
             FROM runs LEFT JOIN records ON records.run_id = runs.id
             GROUP BY runs.id ORDER BY runs.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let (id, created_at, metadata, count) = row?;
            runs.push(RunEntity {
                id,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .with_context(|| format!("bad created_at on run {id}"))?
                    .with_timezone(&Utc),
                metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                records: count as usize,
            });
        }
        Ok(runs)
    }
}
