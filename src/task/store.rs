//! SQLite-backed task store
//!
//! The store is the only shared mutable resource between pipeline workers.
//! Every mutation is a [`TaskMutation`] applied inside a single transaction,
//! so a concurrent reader never observes a status change without its artifact
//! or vice versa. Mutations on terminal tasks are rejected with `Conflict`.

use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use crate::config::Settings;
use crate::task::models::{Stage, StageArtifact, Task, TaskError, TaskStatus};
use crate::{RecapError, Result};

/// A validated, atomically applied change to one task.
#[derive(Debug, Clone)]
pub enum TaskMutation {
    /// Move to the next status in the sequence without writing an artifact.
    ///
    /// Leaving a work state this way requires that stage's artifact to exist
    /// already (the crash-recovery path).
    Advance,

    /// Record a stage's artifact and advance past it.
    CompleteStage { stage: Stage, artifact: StageArtifact },

    /// Settle the task as failed.
    Fail(TaskError),
}

/// Durable, concurrency-safe registry of tasks
pub struct TaskStore {
    conn: Mutex<Connection>,
}

const CURRENT_SCHEMA_VERSION: i64 = 1;

impl TaskStore {
    /// Open or create the store under the configured data directory
    pub fn open(settings: &Settings) -> Result<Self> {
        let db_path = settings.database_path();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::open_path(&db_path)
    }

    /// Open the store at a specific path (useful for testing)
    pub fn open_path(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let current_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if current_version > CURRENT_SCHEMA_VERSION {
            return Err(RecapError::Config(format!(
                "Database schema version {} is newer than supported version {}",
                current_version, CURRENT_SCHEMA_VERSION
            )));
        }

        if current_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT PRIMARY KEY,
                    source_ref TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'queued',
                    error TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
                CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at DESC);

                CREATE TABLE IF NOT EXISTS stage_outputs (
                    task_id TEXT NOT NULL,
                    stage TEXT NOT NULL,
                    artifact TEXT NOT NULL,
                    completed_at INTEGER NOT NULL,
                    PRIMARY KEY (task_id, stage),
                    FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
                );
                "#,
            )?;
            conn.execute(&format!("PRAGMA user_version = {}", CURRENT_SCHEMA_VERSION), [])?;
        }

        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RecapError::Other("task store lock poisoned".to_string()))
    }

    /// Create a new queued task for the given media reference
    pub fn create(&self, source_ref: &str) -> Result<Task> {
        let task = Task::new(source_ref.to_string());

        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO tasks (id, source_ref, status, error, created_at, updated_at)
            VALUES (?1, ?2, ?3, NULL, ?4, ?5)
            "#,
            params![
                task.id,
                task.source_ref,
                task.status.as_str(),
                task.created_at.timestamp(),
                task.updated_at.timestamp(),
            ],
        )?;

        tracing::info!("Created task {} for {}", task.id, task.source_ref);
        Ok(task)
    }

    /// Get a task by id
    pub fn get(&self, id: &str) -> Result<Task> {
        let conn = self.lock_conn()?;
        Self::load_task(&conn, id)
    }

    /// List all tasks in a non-terminal state, oldest first (restart recovery)
    pub fn list_active(&self) -> Result<Vec<Task>> {
        let conn = self.lock_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id FROM tasks
            WHERE status NOT IN ('completed', 'failed')
            ORDER BY created_at ASC
            "#,
        )?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        ids.iter().map(|id| Self::load_task(&conn, id)).collect()
    }

    /// Apply a mutation atomically and return the updated task
    pub fn update(&self, id: &str, mutation: TaskMutation) -> Result<Task> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let mut task = Self::load_task(&tx, id)?;
        if task.status.is_terminal() {
            return Err(RecapError::Conflict(format!(
                "task {} is already {}",
                id,
                task.status.as_str()
            )));
        }

        let now = Utc::now();
        match mutation {
            TaskMutation::Advance => {
                if let Some(stage) = task.status.stage() {
                    if !task.stage_outputs.contains_key(&stage) {
                        return Err(RecapError::Conflict(format!(
                            "cannot advance task {} past {} without its artifact",
                            id,
                            stage.as_str()
                        )));
                    }
                }
                // next() is always Some for non-terminal statuses
                let next = task.status.next().ok_or_else(|| {
                    RecapError::Conflict(format!("task {} has no next status", id))
                })?;
                task.status = next;
            }
            TaskMutation::CompleteStage { stage, artifact } => {
                if task.status.stage() != Some(stage) {
                    return Err(RecapError::Conflict(format!(
                        "task {} is {}, not running {}",
                        id,
                        task.status.as_str(),
                        stage.as_str()
                    )));
                }
                if task.stage_outputs.contains_key(&stage) {
                    return Err(RecapError::Conflict(format!(
                        "task {} already has a {} artifact",
                        id,
                        stage.as_str()
                    )));
                }
                if artifact.stage() != stage {
                    return Err(RecapError::Conflict(format!(
                        "artifact kind does not match stage {}",
                        stage.as_str()
                    )));
                }

                let artifact_json = serde_json::to_string(&artifact)?;
                tx.execute(
                    r#"
                    INSERT INTO stage_outputs (task_id, stage, artifact, completed_at)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                    params![id, stage.as_str(), artifact_json, now.timestamp()],
                )?;

                task.stage_outputs.insert(stage, artifact);
                let next = task.status.next().ok_or_else(|| {
                    RecapError::Conflict(format!("task {} has no next status", id))
                })?;
                task.status = next;
            }
            TaskMutation::Fail(error) => {
                task.status = TaskStatus::Failed;
                task.error = Some(error);
            }
        }

        task.updated_at = now;
        let error_json = match &task.error {
            Some(error) => Some(serde_json::to_string(error)?),
            None => None,
        };
        tx.execute(
            "UPDATE tasks SET status = ?2, error = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, task.status.as_str(), error_json, now.timestamp()],
        )?;

        tx.commit()?;
        Ok(task)
    }

    fn load_task(conn: &Connection, id: &str) -> Result<Task> {
        let row = conn
            .query_row(
                r#"
                SELECT id, source_ref, status, error, created_at, updated_at
                FROM tasks WHERE id = ?1
                "#,
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        let (id, source_ref, status_str, error_json, created_at, updated_at) =
            row.ok_or_else(|| RecapError::NotFound(format!("task {}", id)))?;

        let status = TaskStatus::from_str(&status_str).ok_or_else(|| {
            RecapError::Database(rusqlite::Error::InvalidColumnName(format!(
                "unknown task status '{}'",
                status_str
            )))
        })?;

        let error: Option<TaskError> = match error_json {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        let mut stage_outputs = BTreeMap::new();
        let mut stmt =
            conn.prepare("SELECT stage, artifact FROM stage_outputs WHERE task_id = ?1")?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (stage_str, artifact_json) = row?;
            let stage = match Stage::from_str(&stage_str) {
                Some(stage) => stage,
                None => continue,
            };
            let artifact: StageArtifact = serde_json::from_str(&artifact_json)?;
            stage_outputs.insert(stage, artifact);
        }

        Ok(Task {
            id,
            source_ref,
            status,
            stage_outputs,
            error,
            created_at: Utc
                .timestamp_opt(created_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
            updated_at: Utc
                .timestamp_opt(updated_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }
}
