use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::memories::{Media, Memory};

const COLUMNS: &str =
    "id, title, message, date, created_by, media_type, media_url, media_public_id, created_at, updated_at";

pub struct Database {
    pub conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        })
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                date TEXT NOT NULL,
                created_by TEXT NOT NULL,
                media_type TEXT,
                media_url TEXT,
                media_public_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_memories_date
             ON memories(date DESC)",
            [],
        )?;

        Ok(())
    }

    pub fn insert_memory(&self, memory: &Memory) -> Result<()> {
        let conn = self.conn.lock();
        let (media_type, media_url, media_public_id) = media_columns(memory);

        conn.execute(
            &format!("INSERT INTO memories ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                memory.id.to_string(),
                memory.title,
                memory.message,
                memory.date.to_rfc3339(),
                memory.created_by.as_str(),
                media_type,
                media_url,
                media_public_id,
                memory.created_at.to_rfc3339(),
                memory.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// All memories, newest `date` first.
    pub fn list_memories(&self) -> Result<Vec<Memory>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM memories ORDER BY date DESC, created_at DESC"
        ))?;
        let rows = stmt.query_map([], StoredRow::read)?;

        let memories = rows
            .map(|row| row?.into_memory())
            .collect::<Result<Vec<_>>>()?;
        Ok(memories)
    }

    pub fn get_memory(&self, id: Uuid) -> Result<Option<Memory>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM memories WHERE id = ?1"),
                params![id.to_string()],
                StoredRow::read,
            )
            .optional()?;

        row.map(StoredRow::into_memory).transpose()
    }

    /// Overwrite every mutable column. Returns false if the row is gone.
    pub fn update_memory(&self, memory: &Memory) -> Result<bool> {
        let conn = self.conn.lock();
        let (media_type, media_url, media_public_id) = media_columns(memory);

        let changed = conn.execute(
            "UPDATE memories
             SET title = ?2, message = ?3, date = ?4, created_by = ?5,
                 media_type = ?6, media_url = ?7, media_public_id = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                memory.id.to_string(),
                memory.title,
                memory.message,
                memory.date.to_rfc3339(),
                memory.created_by.as_str(),
                media_type,
                media_url,
                media_public_id,
                memory.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(changed > 0)
    }

    /// Delete and return the removed memory, if it existed.
    pub fn delete_memory(&self, id: Uuid) -> Result<Option<Memory>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let row = tx
            .query_row(
                &format!("SELECT {COLUMNS} FROM memories WHERE id = ?1"),
                params![id.to_string()],
                StoredRow::read,
            )
            .optional()?;
        if row.is_some() {
            tx.execute("DELETE FROM memories WHERE id = ?1", params![id.to_string()])?;
        }
        tx.commit()?;

        row.map(StoredRow::into_memory).transpose()
    }
}

fn media_columns(memory: &Memory) -> (Option<&'static str>, Option<&str>, Option<&str>) {
    match &memory.media {
        Some(media) => (
            Some(media.kind.as_str()),
            Some(media.url.as_str()),
            Some(media.public_id.as_str()),
        ),
        None => (None, None, None),
    }
}

/// Raw column values, converted outside the rusqlite callback so parse
/// failures carry context.
struct StoredRow {
    id: String,
    title: String,
    message: String,
    date: String,
    created_by: String,
    media_type: Option<String>,
    media_url: Option<String>,
    media_public_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl StoredRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            message: row.get(2)?,
            date: row.get(3)?,
            created_by: row.get(4)?,
            media_type: row.get(5)?,
            media_url: row.get(6)?,
            media_public_id: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_memory(self) -> Result<Memory> {
        let media = match (self.media_type, self.media_url, self.media_public_id) {
            (Some(kind), Some(url), Some(public_id)) => Some(Media {
                kind: kind.parse().map_err(anyhow::Error::msg)?,
                url,
                public_id,
            }),
            _ => None,
        };

        Ok(Memory {
            id: Uuid::parse_str(&self.id).with_context(|| format!("bad memory id {}", self.id))?,
            title: self.title,
            message: self.message,
            date: parse_timestamp(&self.date)?,
            created_by: self.created_by.parse().map_err(anyhow::Error::msg)?,
            media,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp {raw}"))?
        .with_timezone(&Utc))
}
