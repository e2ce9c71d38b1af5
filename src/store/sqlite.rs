//! SQLite-backed store implementation.
//!
//! This module provides [`SqliteStore`], a persistent implementation of all
//! three store traits backed by SQLite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{ConfigStore, RecordStore, TaskStore};
use crate::{
    ConfigEntry, FlowError, NewTask, NodeCompletion, NodeMode, Record, RecordStatus, Result, Task,
    TaskAction, TaskQuery, TaskStatus, WorkflowConfig,
};

/// Schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// How long a writer waits on another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_SCHEMA_VERSION_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    )
"#;

const CREATE_SUBJECTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS subjects (
        subject_id TEXT NOT NULL PRIMARY KEY,
        created_at TEXT NOT NULL
    )
"#;

const CREATE_RECORDS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        record_id TEXT NOT NULL,
        subject_id TEXT NOT NULL,
        status TEXT NOT NULL,
        updated_by TEXT,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (subject_id, record_id)
    )
"#;

const CREATE_CONFIGS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS workflow_configs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        subject_id TEXT NOT NULL UNIQUE,
        name TEXT,
        config_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

const CREATE_TASKS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS workflow_tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id TEXT NOT NULL,
        subject_id TEXT NOT NULL,
        node_code TEXT NOT NULL,
        assignee TEXT,
        status TEXT NOT NULL,
        action TEXT NOT NULL,
        comment TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

const CREATE_TASK_NODE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_tasks_record_node
    ON workflow_tasks (record_id, node_code, status)
"#;

const CREATE_TASK_ASSIGNEE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_tasks_assignee
    ON workflow_tasks (assignee, status)
"#;

const TASK_COLUMNS: &str =
    "id, record_id, subject_id, node_code, assignee, status, action, comment, created_at, updated_at";

/// A task row as read from SQLite, before enum and timestamp parsing.
struct TaskRow {
    id: i64,
    record_id: String,
    subject_id: String,
    node_code: String,
    assignee: Option<String>,
    status: String,
    action: String,
    comment: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            record_id: row.get(1)?,
            subject_id: row.get(2)?,
            node_code: row.get(3)?,
            assignee: row.get(4)?,
            status: row.get(5)?,
            action: row.get(6)?,
            comment: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        Ok(Task {
            id: self.id,
            record_id: self.record_id,
            subject_id: self.subject_id,
            node_code: self.node_code,
            assignee: self.assignee,
            status: self.status.parse()?,
            action: self.action.parse()?,
            comment: self.comment,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FlowError::Store(format!("bad timestamp '{}': {}", value, e)))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A SQLite-backed implementation of [`ConfigStore`], [`TaskStore`] and
/// [`RecordStore`].
///
/// This store persists all routing state to a SQLite database, making
/// it suitable for production use where state must survive process restarts.
///
/// # Thread Safety
///
/// The store wraps the SQLite connection in a `Mutex` and uses
/// `spawn_blocking` for all database operations, making it safe
/// for use in async contexts. Each trait call is a single statement, except
/// [`TaskStore::approve_task`], which runs inside a `BEGIN IMMEDIATE`
/// transaction so it stays atomic against other connections to the same
/// file.
///
/// # Example
///
/// ```rust,ignore
/// use formflow::SqliteStore;
///
/// // Open or create a database file
/// let store = SqliteStore::open("routing.db").await?;
///
/// // Or use an in-memory database for testing
/// let store = SqliteStore::open_in_memory().await?;
/// ```
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens a SQLite database at the given path.
    ///
    /// Creates the database and schema if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the
    /// schema cannot be created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            Ok::<_, rusqlite::Error>(conn)
        })
        .await
        .map_err(|e| FlowError::Store(format!("spawn_blocking failed: {}", e)))?
        .map_err(|e| FlowError::Store(format!("failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.run_migrations().await?;
        Ok(store)
    }

    /// Opens an in-memory SQLite database.
    ///
    /// Useful for testing. The database is lost when the store is dropped.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(Connection::open_in_memory)
            .await
            .map_err(|e| FlowError::Store(format!("spawn_blocking failed: {}", e)))?
            .map_err(|e| {
                FlowError::Store(format!("failed to open in-memory database: {}", e))
            })?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.run_migrations().await?;
        Ok(store)
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, what: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(|e| FlowError::Store(format!("spawn_blocking failed: {}", e)))?
        .map_err(|e| FlowError::Store(format!("{} failed: {}", what, e)))
    }

    /// Runs `f` inside an immediate transaction, committing on success.
    ///
    /// `BEGIN IMMEDIATE` takes the database write lock up front, so reads
    /// made inside `f` cannot be invalidated by another connection before
    /// the commit.
    async fn with_tx<T, F>(&self, what: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        self.with_conn_mut(what, move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&*tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
    }

    async fn with_conn_mut<T, F>(&self, what: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| FlowError::Store(format!("spawn_blocking failed: {}", e)))?
        .map_err(|e| FlowError::Store(format!("{} failed: {}", what, e)))
    }

    /// Runs schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        self.with_conn("migration", |conn| {
            conn.execute(CREATE_SCHEMA_VERSION_TABLE, [])?;

            let version: Option<i32> = conn
                .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                    row.get(0)
                })
                .optional()?;

            if version.map_or(true, |v| v < SCHEMA_VERSION) {
                conn.execute(CREATE_SUBJECTS_TABLE, [])?;
                conn.execute(CREATE_RECORDS_TABLE, [])?;
                conn.execute(CREATE_CONFIGS_TABLE, [])?;
                conn.execute(CREATE_TASKS_TABLE, [])?;
                conn.execute(CREATE_TASK_NODE_INDEX, [])?;
                conn.execute(CREATE_TASK_ASSIGNEE_INDEX, [])?;

                conn.execute("DELETE FROM schema_version", [])?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
            }

            Ok(())
        })
        .await
    }

    /// Checks if the required tables exist.
    ///
    /// Useful for testing that the schema was created correctly.
    pub async fn tables_exist(&self) -> Result<bool> {
        self.with_conn("table check", |conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type='table' AND name IN \
                 ('schema_version', 'subjects', 'records', 'workflow_configs', 'workflow_tasks')",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let tables: Vec<String> = rows.filter_map(|r| r.ok()).collect();
            Ok(tables.len() == 5)
        })
        .await
    }

    /// Makes a subject known to the store.
    pub async fn register_subject(&self, subject_id: impl Into<String>) -> Result<()> {
        let subject_id = subject_id.into();
        let now = Utc::now().to_rfc3339();

        self.with_conn("insert subject", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO subjects (subject_id, created_at) VALUES (?1, ?2)",
                params![subject_id, now],
            )?;
            Ok(())
        })
        .await
    }

    /// Inserts or replaces a record. Its subject is registered as well.
    pub async fn insert_record(&self, record: Record) -> Result<()> {
        self.with_conn("insert record", move |conn| {
            let updated_at = record.updated_at.to_rfc3339();
            conn.execute(
                "INSERT OR IGNORE INTO subjects (subject_id, created_at) VALUES (?1, ?2)",
                params![record.subject_id, updated_at],
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO records (record_id, subject_id, status, updated_by, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.subject_id,
                    record.status.as_str(),
                    record.updated_by,
                    updated_at
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn query_tasks(
        &self,
        sql: String,
        args: Vec<Option<String>>,
    ) -> Result<Vec<Task>> {
        let rows = self
            .with_conn("task query", move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(args), TaskRow::from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }
}

// Debug implementation that doesn't expose connection details
impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn get_config(&self, subject_id: &str) -> Result<Option<ConfigEntry>> {
        let subject = subject_id.to_string();

        let row = self
            .with_conn("config query", move |conn| {
                conn.query_row(
                    "SELECT id, subject_id, name, config_json, updated_at \
                     FROM workflow_configs WHERE subject_id = ?1",
                    params![subject],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        match row {
            Some((id, subject_id, name, config_json, updated_at)) => Ok(Some(ConfigEntry {
                id,
                subject_id,
                name,
                config: serde_json::from_str(&config_json)?,
                updated_at: parse_timestamp(&updated_at)?,
            })),
            None => Ok(None),
        }
    }

    async fn save_config(
        &self,
        subject_id: &str,
        name: Option<&str>,
        config: &WorkflowConfig,
    ) -> Result<i64> {
        let subject = subject_id.to_string();
        let name = name.map(str::to_string);
        let config_json = serde_json::to_string(config)?;
        let updated_at = Utc::now().to_rfc3339();

        self.with_conn("config upsert", move |conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM workflow_configs WHERE subject_id = ?1",
                    params![subject],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(id) => {
                    conn.execute(
                        "UPDATE workflow_configs SET name = ?2, config_json = ?3, updated_at = ?4 \
                         WHERE id = ?1",
                        params![id, name, config_json, updated_at],
                    )?;
                    Ok(id)
                }
                None => {
                    conn.execute(
                        "INSERT INTO workflow_configs (subject_id, name, config_json, updated_at) \
                         VALUES (?1, ?2, ?3, ?4)",
                        params![subject, name, config_json, updated_at],
                    )?;
                    Ok(conn.last_insert_rowid())
                }
            }
        })
        .await
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn insert_task(&self, task: &NewTask) -> Result<i64> {
        let task = task.clone();
        let now = Utc::now().to_rfc3339();

        self.with_conn("task insert", move |conn| {
            conn.execute(
                "INSERT INTO workflow_tasks \
                 (record_id, subject_id, node_code, assignee, status, action, comment, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    task.record_id,
                    task.subject_id,
                    task.node_code,
                    task.assignee,
                    task.status.as_str(),
                    task.action.as_str(),
                    task.comment,
                    now
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM workflow_tasks WHERE id = ?1", TASK_COLUMNS);
        let row = self
            .with_conn("task query", move |conn| {
                conn.query_row(&sql, params![task_id], TaskRow::from_row)
                    .optional()
            })
            .await?;

        row.map(TaskRow::into_task).transpose()
    }

    async fn find_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<Vec<i64>> {
        let record_id = record_id.to_string();
        let node_code = node_code.to_string();

        self.with_conn("pending task query", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM workflow_tasks \
                 WHERE record_id = ?1 AND node_code = ?2 AND status = 'pending' ORDER BY id",
            )?;
            let rows = stmt.query_map(params![record_id, node_code], |row| row.get(0))?;
            rows.collect()
        })
        .await
    }

    async fn find_pending_task(
        &self,
        record_id: &str,
        node_code: &str,
        assignee: &str,
    ) -> Result<Option<i64>> {
        let record_id = record_id.to_string();
        let node_code = node_code.to_string();
        let assignee = assignee.to_string();

        self.with_conn("pending task query", move |conn| {
            conn.query_row(
                "SELECT id FROM workflow_tasks \
                 WHERE record_id = ?1 AND node_code = ?2 AND assignee = ?3 AND status = 'pending' \
                 ORDER BY id LIMIT 1",
                params![record_id, node_code, assignee],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn find_pending_task_by_assignee(
        &self,
        record_id: &str,
        assignee: &str,
    ) -> Result<Option<i64>> {
        let record_id = record_id.to_string();
        let assignee = assignee.to_string();

        self.with_conn("pending task query", move |conn| {
            conn.query_row(
                "SELECT id FROM workflow_tasks \
                 WHERE record_id = ?1 AND assignee = ?2 AND status = 'pending' \
                 ORDER BY id LIMIT 1",
                params![record_id, assignee],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn get_task_node_code(&self, task_id: i64) -> Result<Option<String>> {
        self.with_conn("task query", move |conn| {
            conn.query_row(
                "SELECT node_code FROM workflow_tasks WHERE id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn update_task(
        &self,
        task_id: i64,
        status: TaskStatus,
        action: TaskAction,
        comment: Option<&str>,
    ) -> Result<u64> {
        let comment = comment.map(str::to_string);
        let now = Utc::now().to_rfc3339();

        let changed = self
            .with_conn("task update", move |conn| {
                conn.execute(
                    "UPDATE workflow_tasks SET status = ?2, action = ?3, comment = ?4, updated_at = ?5 \
                     WHERE id = ?1 AND status = 'pending'",
                    params![task_id, status.as_str(), action.as_str(), comment, now],
                )
            })
            .await?;
        Ok(changed as u64)
    }

    async fn approve_task(
        &self,
        task_id: i64,
        mode: NodeMode,
        comment: Option<&str>,
    ) -> Result<Option<NodeCompletion>> {
        let comment = comment.map(str::to_string);
        let now = Utc::now().to_rfc3339();

        self.with_tx("task approve", move |conn| {
            let changed = conn.execute(
                "UPDATE workflow_tasks SET status = 'done', action = 'approve', comment = ?2, \
                 updated_at = ?3 WHERE id = ?1 AND status = 'pending'",
                params![task_id, comment, now],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            let (record_id, node_code): (String, String) = conn.query_row(
                "SELECT record_id, node_code FROM workflow_tasks WHERE id = ?1",
                params![task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let completion = match mode {
                NodeMode::Any => {
                    let cancelled = conn.execute(
                        "UPDATE workflow_tasks SET status = 'done', action = 'cancelled', \
                         updated_at = ?3 \
                         WHERE record_id = ?1 AND node_code = ?2 AND status = 'pending'",
                        params![record_id, node_code, now],
                    )?;
                    NodeCompletion {
                        complete: true,
                        cancelled: cancelled as u64,
                    }
                }
                NodeMode::All => {
                    let remaining: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM workflow_tasks \
                         WHERE record_id = ?1 AND node_code = ?2 AND status = 'pending'",
                        params![record_id, node_code],
                        |row| row.get(0),
                    )?;
                    NodeCompletion {
                        complete: remaining == 0,
                        cancelled: 0,
                    }
                }
            };
            Ok(Some(completion))
        })
        .await
    }

    async fn cancel_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<u64> {
        let record_id = record_id.to_string();
        let node_code = node_code.to_string();
        let now = Utc::now().to_rfc3339();

        let changed = self
            .with_conn("task cancel", move |conn| {
                conn.execute(
                    "UPDATE workflow_tasks SET status = 'done', action = 'cancelled', updated_at = ?3 \
                     WHERE record_id = ?1 AND node_code = ?2 AND status = 'pending'",
                    params![record_id, node_code, now],
                )
            })
            .await?;
        Ok(changed as u64)
    }

    async fn cancel_all_pending_tasks(&self, record_id: &str) -> Result<u64> {
        let record_id = record_id.to_string();
        let now = Utc::now().to_rfc3339();

        let changed = self
            .with_conn("task cancel", move |conn| {
                conn.execute(
                    "UPDATE workflow_tasks SET status = 'done', action = 'cancelled', updated_at = ?2 \
                     WHERE record_id = ?1 AND status = 'pending'",
                    params![record_id, now],
                )
            })
            .await?;
        Ok(changed as u64)
    }

    async fn count_pending_tasks(&self, record_id: &str, node_code: &str) -> Result<u64> {
        let record_id = record_id.to_string();
        let node_code = node_code.to_string();

        let count: i64 = self
            .with_conn("pending task count", move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM workflow_tasks \
                     WHERE record_id = ?1 AND node_code = ?2 AND status = 'pending'",
                    params![record_id, node_code],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(count as u64)
    }

    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM workflow_tasks \
             WHERE (?1 IS NULL OR assignee = ?1) AND (?2 IS NULL OR subject_id = ?2) \
             ORDER BY id DESC",
            TASK_COLUMNS
        );
        let args = vec![
            non_blank(query.assignee.as_deref()),
            non_blank(query.subject_id.as_deref()),
        ];
        self.query_tasks(sql, args).await
    }

    async fn record_tasks(&self, record_id: &str) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM workflow_tasks WHERE record_id = ?1 ORDER BY id",
            TASK_COLUMNS
        );
        self.query_tasks(sql, vec![Some(record_id.to_string())])
            .await
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn subject_exists(&self, subject_id: &str) -> Result<bool> {
        let subject_id = subject_id.to_string();

        self.with_conn("subject query", move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM subjects WHERE subject_id = ?1",
                    params![subject_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn get_record(&self, record_id: &str, subject_id: &str) -> Result<Option<Record>> {
        let record_id = record_id.to_string();
        let subject_id = subject_id.to_string();

        let row = self
            .with_conn("record query", move |conn| {
                conn.query_row(
                    "SELECT record_id, subject_id, status, updated_by, updated_at \
                     FROM records WHERE record_id = ?1 AND subject_id = ?2",
                    params![record_id, subject_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        match row {
            Some((id, subject_id, status, updated_by, updated_at)) => Ok(Some(Record {
                id,
                subject_id,
                status: RecordStatus::from(status),
                updated_by,
                updated_at: parse_timestamp(&updated_at)?,
            })),
            None => Ok(None),
        }
    }

    async fn update_record_status(
        &self,
        record_id: &str,
        subject_id: &str,
        status: &RecordStatus,
        operator: Option<&str>,
    ) -> Result<u64> {
        let record_id = record_id.to_string();
        let subject_id = subject_id.to_string();
        let status = status.as_str().to_string();
        let operator = operator.map(str::to_string);
        let now = Utc::now().to_rfc3339();

        let changed = self
            .with_conn("record update", move |conn| {
                conn.execute(
                    "UPDATE records SET status = ?3, updated_by = ?4, updated_at = ?5 \
                     WHERE record_id = ?1 AND subject_id = ?2",
                    params![record_id, subject_id, status, operator, now],
                )
            })
            .await?;
        Ok(changed as u64)
    }

    async fn touch_record(
        &self,
        record_id: &str,
        subject_id: &str,
        operator: Option<&str>,
    ) -> Result<u64> {
        let record_id = record_id.to_string();
        let subject_id = subject_id.to_string();
        let operator = operator.map(str::to_string);
        let now = Utc::now().to_rfc3339();

        let changed = self
            .with_conn("record touch", move |conn| {
                conn.execute(
                    "UPDATE records SET updated_by = ?3, updated_at = ?4 \
                     WHERE record_id = ?1 AND subject_id = ?2",
                    params![record_id, subject_id, operator, now],
                )
            })
            .await?;
        Ok(changed as u64)
    }
}
