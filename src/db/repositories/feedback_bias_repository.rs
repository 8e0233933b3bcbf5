use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};
use tracing::warn;

use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::feedback::BiasKey;
use crate::services::providers::BiasRepository;

#[derive(Debug, Clone)]
pub struct BiasRow {
    pub bias_key: String,
    pub value: f64,
    pub sample_count: i64,
    pub updated_at: String,
}

impl TryFrom<&Row<'_>> for BiasRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            bias_key: row.get("bias_key")?,
            value: row.get("value")?,
            sample_count: row.get("sample_count")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct FeedbackBiasRepository;

impl FeedbackBiasRepository {
    pub fn get(conn: &Connection, key: &str) -> AppResult<Option<BiasRow>> {
        let mut stmt = conn.prepare(
            "SELECT bias_key, value, sample_count, updated_at FROM feedback_bias WHERE bias_key = ?1",
        )?;
        let row = stmt
            .query_row([key], |row| BiasRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list(conn: &Connection) -> AppResult<Vec<BiasRow>> {
        let mut stmt = conn.prepare(
            "SELECT bias_key, value, sample_count, updated_at FROM feedback_bias ORDER BY bias_key ASC",
        )?;
        let rows = stmt
            .query_map([], |row| BiasRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Stores `value` and bumps the sample counter for the key.
    pub fn upsert(conn: &Connection, key: &str, value: f64) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO feedback_bias (bias_key, value, sample_count, updated_at)
                VALUES (:key, :value, 1, CURRENT_TIMESTAMP)
                ON CONFLICT(bias_key) DO UPDATE SET
                    value = excluded.value,
                    sample_count = feedback_bias.sample_count + 1,
                    updated_at = CURRENT_TIMESTAMP
            "#,
            named_params! {":key": key, ":value": value},
        )?;
        Ok(())
    }
}

/// [`BiasRepository`] backed by the `feedback_bias` table.
#[derive(Clone, Debug)]
pub struct SqliteBiasRepository {
    db: DbPool,
}

impl SqliteBiasRepository {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn sample_count(&self, key: &BiasKey) -> AppResult<i64> {
        let row = self
            .db
            .with_connection(|conn| FeedbackBiasRepository::get(conn, &key.to_string()))?;
        Ok(row.map(|row| row.sample_count).unwrap_or(0))
    }
}

impl BiasRepository for SqliteBiasRepository {
    fn get(&self, key: &BiasKey) -> AppResult<Option<f64>> {
        let row = self
            .db
            .with_connection(|conn| FeedbackBiasRepository::get(conn, &key.to_string()))?;
        Ok(row.map(|row| row.value))
    }

    fn set(&self, key: &BiasKey, value: f64) -> AppResult<()> {
        self.db
            .with_connection(|conn| FeedbackBiasRepository::upsert(conn, &key.to_string(), value))
    }

    fn list(&self) -> AppResult<Vec<(BiasKey, f64)>> {
        let rows = self.db.with_connection(FeedbackBiasRepository::list)?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            match row.bias_key.parse::<BiasKey>() {
                Ok(key) => entries.push((key, row.value)),
                Err(reason) => {
                    warn!(target: "app::feedback", key = %row.bias_key, %reason, "skipping unreadable bias key")
                }
            }
        }
        Ok(entries)
    }
}
