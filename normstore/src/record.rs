//! Generic `Record`/`Store` abstraction used by higher layers that want to
//! persist arbitrary indexed JSON documents in the same SQLite file as the
//! engine's checkpoints (e.g. a deployment layer tracking run metadata).
//!
//! This is infrastructure the checkpoint store itself does not need (its
//! schema is fixed, see [`crate::checkpoint`]), but it is the same
//! `Record`/`Store`/`Filter`/`IndexValue` shape the orchestration layer's
//! domain types lean on for ad-hoc querying.

use std::collections::HashMap;

use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// A value usable in an indexed-field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    String(String),
    Int(i64),
    Bool(bool),
    Float(f64),
}

impl IndexValue {
    fn as_text(&self) -> String {
        match self {
            IndexValue::String(s) => s.clone(),
            IndexValue::Int(i) => i.to_string(),
            IndexValue::Bool(b) => b.to_string(),
            IndexValue::Float(f) => f.to_string(),
        }
    }
}

/// Comparison operator for a `Filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
}

/// A single `field <op> value` predicate evaluated against a record's
/// `indexed_fields()`.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }
}

/// A document that can be persisted in a [`Store`].
pub trait Record: Serialize + DeserializeOwned {
    /// Stable identifier, unique within `collection_name()`.
    fn id(&self) -> &str;

    /// Last-modified timestamp (Unix milliseconds), used for ordering.
    fn updated_at(&self) -> i64;

    /// Table/collection this record type lives in.
    fn collection_name() -> &'static str
    where
        Self: Sized;

    /// Secondary fields exposed for `Store::list` filtering.
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

/// SQLite-backed implementation of `Store` for any `Record` type. Documents
/// are stored as canonical JSON blobs with indexed fields denormalized into
/// a side table for querying.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    fn ensure_tables<R: Record>(&self) -> Result<()> {
        let collection = R::collection_name();
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {collection} (
                id TEXT PRIMARY KEY,
                updated_at INTEGER NOT NULL,
                body TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {collection}_index (
                id TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS {collection}_index_field
                ON {collection}_index(field, value);"
        ))?;
        Ok(())
    }

    /// Insert or replace a record.
    pub fn put<R: Record>(&self, record: &R) -> Result<()> {
        self.ensure_tables::<R>()?;
        let collection = R::collection_name();
        let body = crate::canonical::to_canonical_json(record)?;

        self.conn.execute(
            &format!("INSERT OR REPLACE INTO {collection} (id, updated_at, body) VALUES (?1, ?2, ?3)"),
            params![record.id(), record.updated_at(), body],
        )?;

        self.conn
            .execute(&format!("DELETE FROM {collection}_index WHERE id = ?1"), params![record.id()])?;
        for (field, value) in record.indexed_fields() {
            self.conn.execute(
                &format!("INSERT INTO {collection}_index (id, field, value) VALUES (?1, ?2, ?3)"),
                params![record.id(), field, value.as_text()],
            )?;
        }
        Ok(())
    }

    /// Fetch a single record by id.
    pub fn get<R: Record>(&self, id: &str) -> Result<Option<R>> {
        self.ensure_tables::<R>()?;
        let collection = R::collection_name();
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT body FROM {collection} WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            Ok(Some(crate::canonical::from_canonical_json(&body)?))
        } else {
            Ok(None)
        }
    }

    /// List every record matching all `filters` (AND semantics), ordered by
    /// `updated_at` ascending.
    pub fn list<R: Record>(&self, filters: &[Filter]) -> Result<Vec<R>> {
        self.ensure_tables::<R>()?;
        let collection = R::collection_name();

        let mut query = format!("SELECT id FROM {collection}");
        let mut clauses = Vec::new();
        for (i, filter) in filters.iter().enumerate() {
            let op = match filter.op {
                FilterOp::Eq => "=",
                FilterOp::Ne => "!=",
            };
            clauses.push(format!(
                "id IN (SELECT id FROM {collection}_index WHERE field = '{}' AND value {} '{}')",
                filter.field.replace('\'', "''"),
                op,
                filter.value.as_text().replace('\'', "''"),
            ));
            let _ = i;
        }
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query.push_str(&format!(" ORDER BY (SELECT updated_at FROM {collection} t WHERE t.id = {collection}.id) ASC"));

        let mut stmt = self.conn.prepare(&query)?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(r) = self.get::<R>(&id)? {
                out.push(r);
            }
        }
        Ok(out)
    }

    /// Remove a record.
    pub fn delete<R: Record>(&self, id: &str) -> Result<()> {
        self.ensure_tables::<R>()?;
        let collection = R::collection_name();
        self.conn
            .execute(&format!("DELETE FROM {collection} WHERE id = ?1"), params![id])?;
        self.conn
            .execute(&format!("DELETE FROM {collection}_index WHERE id = ?1"), params![id])?;
        Ok(())
    }
}
