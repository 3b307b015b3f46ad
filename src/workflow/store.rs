//! Workflow persistence (second storage namespace).

use crate::error::{Error, Result};
use crate::store::chunk_store::{decode_ts, encode_ts};
use crate::store::db::Db;
use crate::store::schema::WORKFLOW_SCHEMA_SQL;
use crate::workflow::model::{StepStatus, Workflow, WorkflowStatus, WorkflowStep};
use rusqlite::{OptionalExtension, params};
use std::path::Path;

/// `SQLite`-backed store for workflows and their steps.
#[derive(Clone, Debug)]
pub struct WorkflowStore {
    db: Db,
}

impl WorkflowStore {
    /// Opens (and initializes) a workflow database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Db::open(path)?;
        db.init(WORKFLOW_SCHEMA_SQL)?;
        Ok(Self { db })
    }

    /// Creates an in-memory workflow store. Useful for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    pub fn in_memory() -> Result<Self> {
        let db = Db::in_memory()?;
        db.init(WORKFLOW_SCHEMA_SQL)?;
        Ok(Self { db })
    }

    /// Saves a workflow, replacing its step rows wholesale.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn save(&self, workflow: &Workflow) -> Result<()> {
        self.db.with_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                r"
                INSERT OR REPLACE INTO workflows
                    (id, name, description, status, created_at, created_by,
                     started_at, completed_at, current_step, context)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
                params![
                    workflow.id,
                    workflow.name,
                    workflow.description,
                    workflow.status.as_str(),
                    encode_ts(workflow.created_at),
                    workflow.created_by,
                    workflow.started_at.map(encode_ts),
                    workflow.completed_at.map(encode_ts),
                    workflow.current_step,
                    serde_json::to_string(&workflow.context)
                        .map_err(|e| Error::Dependency(format!("serialization: {e}")))?,
                ],
            )?;

            tx.execute(
                "DELETE FROM workflow_steps WHERE workflow_id = ?1",
                params![workflow.id],
            )?;
            {
                let mut stmt = tx.prepare(
                    r"
                    INSERT INTO workflow_steps
                        (id, workflow_id, name, action, parameters, dependencies,
                         timeout_secs, retry_count, retry_delay_secs, status,
                         result, error, started_at, completed_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    ",
                )?;
                for step in &workflow.steps {
                    stmt.execute(params![
                        step.id,
                        workflow.id,
                        step.name,
                        step.action,
                        serde_json::to_string(&step.parameters)
                            .map_err(|e| Error::Dependency(format!("serialization: {e}")))?,
                        serde_json::to_string(&step.dependencies)
                            .map_err(|e| Error::Dependency(format!("serialization: {e}")))?,
                        i64::try_from(step.timeout_secs).unwrap_or(i64::MAX),
                        i64::from(step.retry_count),
                        i64::try_from(step.retry_delay_secs).unwrap_or(i64::MAX),
                        step.status.as_str(),
                        step.result
                            .as_ref()
                            .map(serde_json::to_string)
                            .transpose()
                            .map_err(|e| Error::Dependency(format!("serialization: {e}")))?,
                        step.error,
                        step.started_at.map(encode_ts),
                        step.completed_at.map(encode_ts),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Loads a workflow with its steps.
    ///
    /// # Errors
    ///
    /// Returns an error if the queries fail.
    #[allow(clippy::cast_sign_loss)]
    pub fn load(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        self.db.with(|conn| {
            let header = conn
                .query_row(
                    r"
                    SELECT id, name, description, status, created_at, created_by,
                           started_at, completed_at, current_step, context
                    FROM workflows WHERE id = ?1
                    ",
                    params![workflow_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, Option<String>>(6)?,
                            row.get::<_, Option<String>>(7)?,
                            row.get::<_, Option<String>>(8)?,
                            row.get::<_, String>(9)?,
                        ))
                    },
                )
                .optional()?;

            let Some((
                id,
                name,
                description,
                status,
                created_at,
                created_by,
                started_at,
                completed_at,
                current_step,
                context,
            )) = header
            else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                r"
                SELECT id, name, action, parameters, dependencies, timeout_secs,
                       retry_count, retry_delay_secs, status, result, error,
                       started_at, completed_at
                FROM workflow_steps WHERE workflow_id = ?1 ORDER BY rowid
                ",
            )?;
            let steps = stmt
                .query_map(params![workflow_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, Option<String>>(10)?,
                        row.get::<_, Option<String>>(11)?,
                        row.get::<_, Option<String>>(12)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let steps = steps
                .into_iter()
                .map(
                    |(
                        id,
                        name,
                        action,
                        parameters,
                        dependencies,
                        timeout_secs,
                        retry_count,
                        retry_delay_secs,
                        status,
                        result,
                        error,
                        started_at,
                        completed_at,
                    )| {
                        Ok(WorkflowStep {
                            id,
                            name,
                            action,
                            parameters: serde_json::from_str(&parameters)?,
                            dependencies: serde_json::from_str(&dependencies)?,
                            timeout_secs: timeout_secs as u64,
                            retry_count: u32::try_from(retry_count).unwrap_or(0),
                            retry_delay_secs: retry_delay_secs as u64,
                            status: StepStatus::parse(&status).unwrap_or(StepStatus::Pending),
                            result: result.as_deref().map(serde_json::from_str).transpose()?,
                            error,
                            started_at: started_at.as_deref().and_then(decode_ts),
                            completed_at: completed_at.as_deref().and_then(decode_ts),
                        })
                    },
                )
                .collect::<Result<Vec<_>>>()?;

            let created_at = decode_ts(&created_at).ok_or_else(|| {
                Error::invalid_input(format!("bad timestamp on workflow {id}"))
            })?;
            Ok(Some(Workflow {
                id,
                name,
                description,
                steps,
                created_at,
                created_by,
                status: WorkflowStatus::parse(&status).unwrap_or(WorkflowStatus::Pending),
                started_at: started_at.as_deref().and_then(decode_ts),
                completed_at: completed_at.as_deref().and_then(decode_ts),
                current_step,
                context: serde_json::from_str(&context)?,
            }))
        })
    }

    /// Lists workflow ids with name and status, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self) -> Result<Vec<(String, String, WorkflowStatus)>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, status FROM workflows ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows
                .into_iter()
                .map(|(id, name, status)| {
                    let status =
                        WorkflowStatus::parse(&status).unwrap_or(WorkflowStatus::Pending);
                    (id, name, status)
                })
                .collect())
        })
    }
}
