use std::convert::TryFrom;

use chrono::{DateTime, FixedOffset};
use rusqlite::{named_params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::recurrence::RecurringRule;
use crate::models::task::{Task, TaskPriority};
use crate::services::providers::TaskStore;

const BASE_SELECT: &str = r#"
    SELECT
        id,
        title,
        due_at,
        estimated_minutes,
        priority,
        category,
        is_completed,
        completed_at,
        in_progress,
        worked_minutes,
        recurrence,
        parent_id,
        subtask_ids,
        created_at,
        updated_at
    FROM tasks
"#;

const UPSERT_SQL: &str = r#"
    INSERT INTO tasks (
        id,
        title,
        due_at,
        estimated_minutes,
        priority,
        category,
        is_completed,
        completed_at,
        in_progress,
        worked_minutes,
        recurrence,
        parent_id,
        subtask_ids,
        created_at,
        updated_at
    ) VALUES (
        :id,
        :title,
        :due_at,
        :estimated_minutes,
        :priority,
        :category,
        :is_completed,
        :completed_at,
        :in_progress,
        :worked_minutes,
        :recurrence,
        :parent_id,
        :subtask_ids,
        :created_at,
        :updated_at
    )
    ON CONFLICT(id) DO UPDATE SET
        title = excluded.title,
        due_at = excluded.due_at,
        estimated_minutes = excluded.estimated_minutes,
        priority = excluded.priority,
        category = excluded.category,
        is_completed = excluded.is_completed,
        completed_at = excluded.completed_at,
        in_progress = excluded.in_progress,
        worked_minutes = excluded.worked_minutes,
        recurrence = excluded.recurrence,
        parent_id = excluded.parent_id,
        subtask_ids = excluded.subtask_ids,
        updated_at = excluded.updated_at
"#;

/// Flat storage shape of a [`Task`]: timestamps as RFC 3339 text, the
/// recurrence rule and subtask list as JSON.
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub due_at: Option<String>,
    pub estimated_minutes: Option<i64>,
    pub priority: String,
    pub category: String,
    pub is_completed: bool,
    pub completed_at: Option<String>,
    pub in_progress: bool,
    pub worked_minutes: i64,
    pub recurrence: Option<String>,
    pub parent_id: Option<String>,
    pub subtask_ids: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRow {
    pub fn from_task(task: &Task) -> AppResult<Self> {
        Ok(Self {
            id: task.id.clone(),
            title: task.title.clone(),
            due_at: task.due_at.map(|due| due.to_rfc3339()),
            estimated_minutes: task.estimated_minutes,
            priority: task.priority.as_str().to_string(),
            category: task.category.clone(),
            is_completed: task.is_completed,
            completed_at: task.completed_at.map(|at| at.to_rfc3339()),
            in_progress: task.in_progress,
            worked_minutes: task.worked_minutes,
            recurrence: serialize_rule(task.recurrence.as_ref())?,
            parent_id: task.parent_id.clone(),
            subtask_ids: serde_json::to_string(&task.subtask_ids)?,
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.to_rfc3339(),
        })
    }

    pub fn into_task(self) -> AppResult<Task> {
        let priority = self
            .priority
            .parse::<TaskPriority>()
            .map_err(AppError::database)?;

        Ok(Task {
            id: self.id,
            title: self.title,
            due_at: parse_optional_timestamp(self.due_at)?,
            estimated_minutes: self.estimated_minutes,
            priority,
            category: self.category,
            is_completed: self.is_completed,
            completed_at: parse_optional_timestamp(self.completed_at)?,
            in_progress: self.in_progress,
            worked_minutes: self.worked_minutes,
            recurrence: deserialize_rule(self.recurrence)?,
            parent_id: self.parent_id,
            subtask_ids: deserialize_ids(&self.subtask_ids)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl TryFrom<&Row<'_>> for TaskRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(TaskRow {
            id: row.get("id")?,
            title: row.get("title")?,
            due_at: row.get("due_at")?,
            estimated_minutes: row.get("estimated_minutes")?,
            priority: row.get("priority")?,
            category: row.get("category")?,
            is_completed: row.get::<_, i64>("is_completed")? != 0,
            completed_at: row.get("completed_at")?,
            in_progress: row.get::<_, i64>("in_progress")? != 0,
            worked_minutes: row.get("worked_minutes")?,
            recurrence: row.get("recurrence")?,
            parent_id: row.get("parent_id")?,
            subtask_ids: row.get("subtask_ids")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct TaskRepository;

impl TaskRepository {
    pub fn insert(conn: &Connection, row: &TaskRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO tasks (
                    id,
                    title,
                    due_at,
                    estimated_minutes,
                    priority,
                    category,
                    is_completed,
                    completed_at,
                    in_progress,
                    worked_minutes,
                    recurrence,
                    parent_id,
                    subtask_ids,
                    created_at,
                    updated_at
                ) VALUES (
                    :id,
                    :title,
                    :due_at,
                    :estimated_minutes,
                    :priority,
                    :category,
                    :is_completed,
                    :completed_at,
                    :in_progress,
                    :worked_minutes,
                    :recurrence,
                    :parent_id,
                    :subtask_ids,
                    :created_at,
                    :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":title": &row.title,
                ":due_at": &row.due_at,
                ":estimated_minutes": &row.estimated_minutes,
                ":priority": &row.priority,
                ":category": &row.category,
                ":is_completed": row.is_completed as i64,
                ":completed_at": &row.completed_at,
                ":in_progress": row.in_progress as i64,
                ":worked_minutes": &row.worked_minutes,
                ":recurrence": &row.recurrence,
                ":parent_id": &row.parent_id,
                ":subtask_ids": &row.subtask_ids,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;

        Ok(())
    }

    pub fn update(conn: &Connection, row: &TaskRow) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE tasks SET
                    title = :title,
                    due_at = :due_at,
                    estimated_minutes = :estimated_minutes,
                    priority = :priority,
                    category = :category,
                    is_completed = :is_completed,
                    completed_at = :completed_at,
                    in_progress = :in_progress,
                    worked_minutes = :worked_minutes,
                    recurrence = :recurrence,
                    parent_id = :parent_id,
                    subtask_ids = :subtask_ids,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": &row.id,
                ":title": &row.title,
                ":due_at": &row.due_at,
                ":estimated_minutes": &row.estimated_minutes,
                ":priority": &row.priority,
                ":category": &row.category,
                ":is_completed": row.is_completed as i64,
                ":completed_at": &row.completed_at,
                ":in_progress": row.in_progress as i64,
                ":worked_minutes": &row.worked_minutes,
                ":recurrence": &row.recurrence,
                ":parent_id": &row.parent_id,
                ":subtask_ids": &row.subtask_ids,
                ":updated_at": &row.updated_at,
            },
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }

    pub fn upsert(conn: &Connection, row: &TaskRow) -> AppResult<()> {
        conn.execute(
            UPSERT_SQL,
            named_params! {
                ":id": &row.id,
                ":title": &row.title,
                ":due_at": &row.due_at,
                ":estimated_minutes": &row.estimated_minutes,
                ":priority": &row.priority,
                ":category": &row.category,
                ":is_completed": row.is_completed as i64,
                ":completed_at": &row.completed_at,
                ":in_progress": row.in_progress as i64,
                ":worked_minutes": &row.worked_minutes,
                ":recurrence": &row.recurrence,
                ":parent_id": &row.parent_id,
                ":subtask_ids": &row.subtask_ids,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    /// Missing ids are ignored; returns how many rows were removed.
    pub fn delete(conn: &Connection, id: &str) -> AppResult<usize> {
        let affected = conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        Ok(affected)
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<TaskRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", BASE_SELECT))?;
        let row = stmt
            .query_row([id], |row| TaskRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list_all(conn: &Connection) -> AppResult<Vec<TaskRow>> {
        let mut stmt = conn.prepare(&format!("{} ORDER BY created_at ASC, id ASC", BASE_SELECT))?;
        let rows = stmt
            .query_map([], |row| TaskRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// [`TaskStore`] backed by the `tasks` table.
#[derive(Clone, Debug)]
pub struct SqliteTaskStore {
    db: DbPool,
}

impl SqliteTaskStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn find(&self, id: &str) -> AppResult<Option<Task>> {
        self.db.with_connection(|conn| {
            TaskRepository::find_by_id(conn, id)?
                .map(TaskRow::into_task)
                .transpose()
        })
    }
}

impl TaskStore for SqliteTaskStore {
    fn create(&self, task: &Task) -> AppResult<()> {
        let row = TaskRow::from_task(task)?;
        self.db
            .with_connection(|conn| TaskRepository::insert(conn, &row))
    }

    fn update(&self, task: &Task) -> AppResult<()> {
        let row = TaskRow::from_task(task)?;
        self.db
            .with_connection(|conn| TaskRepository::update(conn, &row))
    }

    fn update_batch(&self, tasks: &[Task]) -> AppResult<()> {
        let rows = tasks
            .iter()
            .map(TaskRow::from_task)
            .collect::<AppResult<Vec<_>>>()?;

        self.db.with_transaction(|conn| {
            for row in &rows {
                TaskRepository::upsert(conn, row)?;
            }
            Ok(())
        })?;

        debug!(target: "app::tasks", count = rows.len(), "task batch written");
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> AppResult<()> {
        let removed = self.db.with_transaction(|conn| {
            let mut removed = 0;
            for id in ids {
                removed += TaskRepository::delete(conn, id)?;
            }
            Ok(removed)
        })?;

        debug!(target: "app::tasks", requested = ids.len(), removed, "tasks deleted");
        Ok(())
    }

    fn list_current(&self) -> AppResult<Vec<Task>> {
        let rows = self.db.with_connection(TaskRepository::list_all)?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }
}

fn parse_timestamp(raw: &str) -> AppResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .map_err(|err| AppError::database(format!("invalid stored timestamp '{raw}': {err}")))
}

fn parse_optional_timestamp(raw: Option<String>) -> AppResult<Option<DateTime<FixedOffset>>> {
    match raw {
        Some(value) if !value.is_empty() => parse_timestamp(&value).map(Some),
        _ => Ok(None),
    }
}

fn serialize_rule(rule: Option<&RecurringRule>) -> AppResult<Option<String>> {
    match rule {
        Some(rule) => Ok(Some(serde_json::to_string(rule)?)),
        None => Ok(None),
    }
}

fn deserialize_rule(raw: Option<String>) -> AppResult<Option<RecurringRule>> {
    match raw {
        Some(value) if !value.is_empty() => Ok(Some(serde_json::from_str(&value)?)),
        _ => Ok(None),
    }
}

fn deserialize_ids(raw: &str) -> AppResult<Vec<String>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(raw)?)
}
