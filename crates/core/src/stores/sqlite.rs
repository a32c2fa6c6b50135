use crate::html::HtmlText;
use crate::traits::{DocumentFetcher, UserDirectory};
use crate::{BenefitRecord, RetrievalError, TimeRange, UserRecord};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Stored timestamps are UTC in this layout.
const STORED_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS article_entries (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL DEFAULT '',
        content_short TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS user_users (
        id INTEGER PRIMARY KEY,
        username TEXT,
        nickname TEXT,
        email TEXT,
        mobile TEXT,
        platform_name TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        last_active_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_user_users_created_at ON user_users (created_at);
    CREATE TABLE IF NOT EXISTS activity_free_subjects (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL,
        subject_id INTEGER NOT NULL,
        subject_free_days INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

/// Relational store holding article bodies, users and benefit grants.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    html: HtmlText,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RetrievalError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            html: HtmlText::new()?,
        })
    }

    pub async fn ensure_schema(&self) -> Result<(), RetrievalError> {
        self.with_connection(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
    }

    async fn with_connection<T, F>(&self, work: F) -> Result<T, RetrievalError>
    where
        F: FnOnce(&Connection) -> Result<T, RetrievalError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| RetrievalError::BackendResponse {
                backend: "sqlite".to_string(),
                details: "connection lock poisoned".to_string(),
            })?;
            work(&guard)
        })
        .await
        .map_err(|error| RetrievalError::BackendResponse {
            backend: "sqlite".to_string(),
            details: error.to_string(),
        })?
    }

    async fn article_column(
        &self,
        column: &'static str,
        document_id: &str,
    ) -> Result<Option<String>, RetrievalError> {
        let document_id = document_id.to_string();
        self.with_connection(move |conn| {
            let value = conn
                .query_row(
                    &format!("SELECT {column} FROM article_entries WHERE id = ?1"),
                    params![document_id],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?
                .flatten();
            Ok(value.filter(|text| !text.trim().is_empty()))
        })
        .await
    }
}

pub fn format_stored_timestamp(value: &DateTime<Utc>) -> String {
    value.format(STORED_TIMESTAMP_FORMAT).to_string()
}

fn stored_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    NaiveDateTime::parse_from_str(&raw, STORED_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}

fn optional_stored_timestamp(
    row: &Row<'_>,
    index: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(index)? {
        Some(raw) if !raw.is_empty() => stored_timestamp(row, index).map(Some),
        _ => Ok(None),
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[async_trait]
impl DocumentFetcher for SqliteStore {
    async fn fetch_full_text(&self, document_id: &str) -> Result<Option<String>, RetrievalError> {
        let Some(html) = self.article_column("content", document_id).await? else {
            return Ok(None);
        };
        let text = self.html.to_text(&html);
        debug!(document_id, chars = text.chars().count(), "fetched full text");
        Ok(Some(text).filter(|text| !text.is_empty()))
    }

    async fn fetch_summary(&self, document_id: &str) -> Result<Option<String>, RetrievalError> {
        self.article_column("content_short", document_id).await
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn users_created_between(
        &self,
        range: &TimeRange,
        limit: usize,
    ) -> Result<Vec<UserRecord>, RetrievalError> {
        let start = format_stored_timestamp(&range.start);
        let end = format_stored_timestamp(&range.end);
        let limit = limit as i64;

        self.with_connection(move |conn| {
            let mut statement = conn.prepare(
                "SELECT id, username, nickname, email, mobile, platform_name, created_at, last_active_at
                 FROM user_users
                 WHERE created_at BETWEEN ?1 AND ?2
                 ORDER BY created_at, id
                 LIMIT ?3",
            )?;
            let users = statement
                .query_map(params![start, end, limit], |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        nickname: row.get(2)?,
                        email: row.get(3)?,
                        mobile: row.get(4)?,
                        platform_name: row.get(5)?,
                        created_at: stored_timestamp(row, 6)?,
                        last_active_at: optional_stored_timestamp(row, 7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
        .await
    }

    async fn benefit_records(
        &self,
        user_ids: &[i64],
        subject_ids: &[i64],
    ) -> Result<Vec<BenefitRecord>, RetrievalError> {
        if user_ids.is_empty() || subject_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, user_id, subject_id, subject_free_days, created_at, updated_at
             FROM activity_free_subjects
             WHERE user_id IN ({}) AND subject_id IN ({})
             ORDER BY id",
            placeholders(user_ids.len()),
            placeholders(subject_ids.len())
        );
        let bound: Vec<i64> = user_ids.iter().chain(subject_ids.iter()).copied().collect();

        self.with_connection(move |conn| {
            let mut statement = conn.prepare(&sql)?;
            let records = statement
                .query_map(params_from_iter(bound.iter()), |row| {
                    Ok(BenefitRecord {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        subject_id: row.get(2)?,
                        subject_free_days: row.get(3)?,
                        created_at: stored_timestamp(row, 4)?,
                        updated_at: stored_timestamp(row, 5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }
}
