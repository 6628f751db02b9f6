//! SQL queries for the memory store
//!
//! All functions take validated arguments; id and category validation happens
//! at the `MemoryStore` boundary before anything here runs.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::str::FromStr;

use crate::error::{MnemonError, Result};
use crate::types::{
    new_memory_id, Category, CreateRecordInput, MemoryRecord, UpdateRecordInput,
};

/// Bound on `find_by_category` full scans
pub const CATEGORY_SCAN_CAP: i64 = 100;

/// Encode an f32 vector as a little-endian blob
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decode a little-endian blob back into an f32 vector
pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn parse_timestamp(value: String, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

const RECORD_COLUMNS: &str =
    "id, category, abstract, overview, content, vector, source_session, \
     active_count, created_at, updated_at";

fn map_record(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let category_str: String = row.get(1)?;
    let category = Category::from_str(&category_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let blob: Vec<u8> = row.get(5)?;

    Ok(MemoryRecord {
        id: row.get(0)?,
        category,
        abstract_: row.get(2)?,
        overview: row.get(3)?,
        content: row.get(4)?,
        vector: blob_to_vector(&blob),
        source_session: row.get(6)?,
        active_count: row.get(7)?,
        created_at: parse_timestamp(row.get(8)?, 8)?,
        updated_at: parse_timestamp(row.get(9)?, 9)?,
    })
}

/// Check or pin the store's embedding dimension
///
/// The first open writes the configured dimension into `store_meta`; every
/// later open must match it or fail with `DimensionMismatch`.
pub fn ensure_dimensions(conn: &Connection, configured: usize) -> Result<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'dimensions'",
            [],
            |row| row.get(0),
        )
        .ok();

    match stored {
        Some(value) => {
            let existing: usize = value
                .parse()
                .map_err(|_| MnemonError::Config(format!("corrupt dimension value: {value}")))?;
            if existing != configured {
                return Err(MnemonError::DimensionMismatch {
                    expected: existing,
                    actual: configured,
                });
            }
        }
        None => {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES ('dimensions', ?)",
                params![configured.to_string()],
            )?;
        }
    }

    Ok(())
}

/// Insert a new record, assigning id and timestamps
pub fn insert_record(conn: &Connection, input: &CreateRecordInput) -> Result<MemoryRecord> {
    let now = Utc::now();
    let now_str = now.to_rfc3339();
    let id = new_memory_id();

    conn.execute(
        "INSERT INTO memories (id, category, abstract, overview, content, vector,
                               source_session, active_count, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        params![
            id,
            input.category.as_str(),
            input.abstract_,
            input.overview,
            input.content,
            vector_to_blob(&input.vector),
            input.source_session,
            now_str,
            now_str,
        ],
    )?;

    Ok(MemoryRecord {
        id,
        category: input.category,
        abstract_: input.abstract_.clone(),
        overview: input.overview.clone(),
        content: input.content.clone(),
        vector: input.vector.clone(),
        source_session: input.source_session.clone(),
        active_count: 0,
        created_at: now,
        updated_at: now,
    })
}

/// Fetch a record by id
pub fn get_record(conn: &Connection, id: &str) -> Result<Option<MemoryRecord>> {
    let result = conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM memories WHERE id = ?"),
        params![id],
        map_record,
    );

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Bounded scan of one category, oldest first
pub fn list_by_category(conn: &Connection, category: Category) -> Result<Vec<MemoryRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM memories
         WHERE category = ? ORDER BY created_at ASC LIMIT ?"
    ))?;
    let rows = stmt.query_map(params![category.as_str(), CATEGORY_SCAN_CAP], map_record)?;
    rows.map(|r| r.map_err(Into::into)).collect()
}

/// Bulk read, newest first, capped
pub fn list_all(conn: &Connection, max_limit: i64) -> Result<Vec<MemoryRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM memories ORDER BY created_at DESC LIMIT ?"
    ))?;
    let rows = stmt.query_map(params![max_limit], map_record)?;
    rows.map(|r| r.map_err(Into::into)).collect()
}

/// Load all records the nearest-neighbor scan considers
pub fn list_for_search(conn: &Connection, category: Option<Category>) -> Result<Vec<MemoryRecord>> {
    match category {
        Some(cat) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM memories WHERE category = ?"
            ))?;
            let rows = stmt.query_map(params![cat.as_str()], map_record)?;
            rows.map(|r| r.map_err(Into::into)).collect()
        }
        None => {
            let mut stmt = conn.prepare(&format!("SELECT {RECORD_COLUMNS} FROM memories"))?;
            let rows = stmt.query_map([], map_record)?;
            rows.map(|r| r.map_err(Into::into)).collect()
        }
    }
}

/// Apply a partial update in place, bumping `updated_at`
///
/// No-ops when the id does not exist. `id`, `created_at`, and
/// `source_session` are not expressible in the input type.
pub fn update_record(conn: &Connection, id: &str, input: &UpdateRecordInput) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    let mut updates = vec!["updated_at = ?".to_string()];
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

    if let Some(ref abstract_) = input.abstract_ {
        updates.push("abstract = ?".to_string());
        values.push(Box::new(abstract_.clone()));
    }
    if let Some(ref overview) = input.overview {
        updates.push("overview = ?".to_string());
        values.push(Box::new(overview.clone()));
    }
    if let Some(ref content) = input.content {
        updates.push("content = ?".to_string());
        values.push(Box::new(content.clone()));
    }
    if let Some(ref vector) = input.vector {
        updates.push("vector = ?".to_string());
        values.push(Box::new(vector_to_blob(vector)));
    }

    let sql = format!("UPDATE memories SET {} WHERE id = ?", updates.join(", "));
    values.push(Box::new(id.to_string()));

    let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|b| b.as_ref()).collect();
    conn.execute(&sql, params.as_slice())?;

    Ok(())
}

/// Bump the usage counter and `updated_at` in one statement
pub fn increment_active_count(conn: &Connection, id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE memories SET active_count = active_count + 1, updated_at = ? WHERE id = ?",
        params![now, id],
    )?;
    Ok(())
}
