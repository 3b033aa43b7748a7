// Handles SQLite database operations

use rusqlite::{params, Connection, OptionalExtension, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type Db = Arc<Mutex<Connection>>;

/// A generated document kept on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDocument {
    pub id: i64,
    pub record_id: Option<i64>,
    pub model: String,
    pub outcome: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct NewDocument<'a> {
    pub record_id: Option<i64>,
    pub model: &'a str,
    pub outcome: &'a str,
    pub content: &'a str,
}

// Initialize SQLite Database
pub fn init_db(db_path: &Path) -> anyhow::Result<Db> {
    // Ensure the directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db_path)?;
    create_schema(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT
        )",
        [],
    )?;

    // Local copies of generated documents
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id INTEGER,
            model TEXT NOT NULL,
            outcome TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    Ok(())
}

/// Inserts or updates a configuration key-value pair.
pub fn update_config_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Retrieves a configuration value by key. Returns `None` if the key doesn't exist.
pub fn get_config_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
}

pub fn delete_config_value(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM app_config WHERE key = ?1", [key])?;
    Ok(())
}

// Save generated document
pub async fn save_document(document: &NewDocument<'_>, db: &Db) -> Result<i64> {
    let conn = db.lock().await;

    conn.execute(
        "INSERT INTO documents (record_id, model, outcome, content) VALUES (?1, ?2, ?3, ?4)",
        params![
            document.record_id,
            document.model,
            document.outcome,
            document.content
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn document_from_row(row: &rusqlite::Row<'_>) -> Result<SavedDocument> {
    Ok(SavedDocument {
        id: row.get(0)?,
        record_id: row.get(1)?,
        model: row.get(2)?,
        outcome: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Fetches one saved document, or the most recent one when `id` is `None`.
pub async fn fetch_document(id: Option<i64>, db: &Db) -> Result<Option<SavedDocument>> {
    let conn = db.lock().await;

    match id {
        Some(id) => conn
            .query_row(
                "SELECT id, record_id, model, outcome, content, created_at FROM documents WHERE id = ?1",
                params![id],
                document_from_row,
            )
            .optional(),
        None => conn
            .query_row(
                "SELECT id, record_id, model, outcome, content, created_at FROM documents ORDER BY id DESC LIMIT 1",
                [],
                document_from_row,
            )
            .optional(),
    }
}

pub async fn fetch_documents(db: &Db) -> Result<Vec<SavedDocument>> {
    let conn = db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT id, record_id, model, outcome, content, created_at FROM documents ORDER BY id DESC",
    )?;
    let documents_iter = stmt.query_map([], document_from_row)?;

    let mut documents = Vec::new();
    for document in documents_iter {
        documents.push(document?);
    }

    Ok(documents)
}
