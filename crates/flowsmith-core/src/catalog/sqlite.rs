//! Read-only catalog reader over an existing pieces database
//!
//! Expects the `pieces`, `actions`, `triggers`, `action_properties` and
//! `trigger_properties` tables of the pieces database.
//! Matching is case-insensitive substring matching; queries run on the
//! blocking pool with a fresh read-only connection per call.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};

use super::{CatalogHit, CatalogItem, CatalogLookup, InputField, Operation, OperationKind};
use crate::error::CollaboratorError;

const COLLABORATOR: &str = "catalog";
const MAX_CANDIDATES: usize = 10;

pub struct SqliteCatalog {
    path: PathBuf,
}

impl SqliteCatalog {
    /// Open the catalog at `path`. Fails if the file is missing or is not a
    /// pieces database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = open_read_only(&path)
            .with_context(|| format!("Failed to open catalog {}", path.display()))?;
        let pieces: i64 = conn
            .query_row("SELECT COUNT(*) FROM pieces", [], |row| row.get(0))
            .with_context(|| format!("{} is not a pieces catalog", path.display()))?;
        tracing::info!(path = %path.display(), pieces, "Catalog opened");
        Ok(Self { path })
    }

    fn find_blocking(path: &Path, term: &str) -> rusqlite::Result<Vec<CatalogHit>> {
        let conn = open_read_only(path)?;
        let pattern = format!("%{}%", term.trim().to_lowercase());

        let mut hits = find_operations(&conn, &pattern, "actions", OperationKind::Action)?;
        hits.extend(find_operations(
            &conn,
            &pattern,
            "triggers",
            OperationKind::Trigger,
        )?);
        hits.extend(find_pieces(&conn, &pattern)?);
        Ok(hits)
    }
}

fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// `(piece id, piece fields, operation fields)` for actions or triggers
/// whose name or display name contains the pattern.
fn find_operations(
    conn: &Connection,
    pattern: &str,
    table: &str,
    kind: OperationKind,
) -> rusqlite::Result<Vec<CatalogHit>> {
    let sql = format!(
        "SELECT p.id, p.name, p.display_name,
                (SELECT COUNT(*) FROM actions WHERE piece_id = p.id)
                  + (SELECT COUNT(*) FROM triggers WHERE piece_id = p.id),
                o.id, o.name, o.display_name, COALESCE(o.description, '')
         FROM {table} o
         JOIN pieces p ON o.piece_id = p.id
         WHERE lower(o.display_name) LIKE ?1 OR lower(o.name) LIKE ?1
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![pattern, MAX_CANDIDATES as i64], |row| {
            let item = CatalogItem {
                id: row.get::<_, i64>(0)?.to_string(),
                name: row.get(1)?,
                display_name: row.get(2)?,
                operation_count: row.get::<_, i64>(3)? as usize,
            };
            let op_id: i64 = row.get(4)?;
            let operation = Operation {
                name: row.get(5)?,
                display_name: row.get(6)?,
                kind,
                description: row.get(7)?,
            };
            Ok((item, op_id, operation))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut hits = Vec::with_capacity(rows.len());
    for (item, op_id, operation) in rows {
        let input_fields = operation_inputs(conn, kind, op_id)?;
        hits.push(CatalogHit {
            item,
            operation: Some(operation),
            input_fields,
        });
    }
    Ok(hits)
}

fn find_pieces(conn: &Connection, pattern: &str) -> rusqlite::Result<Vec<CatalogHit>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.display_name,
                (SELECT COUNT(*) FROM actions WHERE piece_id = p.id)
                  + (SELECT COUNT(*) FROM triggers WHERE piece_id = p.id)
         FROM pieces p
         WHERE lower(p.display_name) LIKE ?1 OR lower(p.name) LIKE ?1
         LIMIT ?2",
    )?;
    let hits = stmt
        .query_map(params![pattern, MAX_CANDIDATES as i64], |row| {
            Ok(CatalogHit {
                item: CatalogItem {
                    id: row.get::<_, i64>(0)?.to_string(),
                    name: row.get(1)?,
                    display_name: row.get(2)?,
                    operation_count: row.get::<_, i64>(3)? as usize,
                },
                operation: None,
                input_fields: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hits)
}

fn operation_inputs(
    conn: &Connection,
    kind: OperationKind,
    op_id: i64,
) -> rusqlite::Result<Vec<InputField>> {
    let (table, owner) = match kind {
        OperationKind::Action => ("action_properties", "action_id"),
        OperationKind::Trigger => ("trigger_properties", "trigger_id"),
    };
    let sql = format!(
        "SELECT property_name, COALESCE(property_type, 'unknown'), COALESCE(required, 0),
                COALESCE(description, ''), default_value
         FROM {table}
         WHERE {owner} = ?1
         ORDER BY COALESCE(required, 0) DESC, COALESCE(display_name, property_name)"
    );
    let mut stmt = conn.prepare(&sql)?;
    let fields = stmt
        .query_map([op_id], |row| {
            Ok(InputField {
                name: row.get(0)?,
                field_type: row.get(1)?,
                required: row.get::<_, i64>(2)? != 0,
                description: row.get(3)?,
                default: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(fields)
}

#[async_trait]
impl CatalogLookup for SqliteCatalog {
    async fn find(&self, term: &str) -> Result<Vec<CatalogHit>, CollaboratorError> {
        let path = self.path.clone();
        let term = term.to_string();
        tokio::task::spawn_blocking(move || Self::find_blocking(&path, &term))
            .await
            .map_err(|e| CollaboratorError::unavailable(COLLABORATOR, e))?
            .map_err(|e| CollaboratorError::unavailable(COLLABORATOR, e))
    }
}
