//! Document collections and their SQLite implementation.
//!
//! # Responsibility
//! - Persist entity documents as JSON bodies keyed by `(namespace, collection, doc_id)`.
//! - Evaluate filters, projections and update operators over stored bodies.
//!
//! # Invariants
//! - Reads return documents in insertion order.
//! - `update_by_id` writes the body back only when an operator changed it.
//! - Nothing here decides whether a result is an error; see the service layer.

use super::{ensure_store_ready, RepoError, RepoResult};
use crate::model::entity::EntityId;
use crate::query::{apply_update, Document, Filter, Projection, UpdateOp, ID_FIELD};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::fmt::{Display, Formatter};

const METADATA_NAMESPACE: &str = "mvstore";

/// Collection of one entity kind in the metadata namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Experiments,
    Models,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Self::Experiments => "experiments",
            Self::Models => "models",
        }
    }

    pub fn namespace(self) -> &'static str {
        METADATA_NAMESPACE
    }

    pub fn all() -> [Collection; 2] {
        [Self::Experiments, Self::Models]
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace(), self.name())
    }
}

/// Store acknowledgement for one partial update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Materialized read result, iterated in insertion order.
///
/// Not a streaming cursor: matching runs in memory over the whole collection
/// (or the single row of an `_id` equality filter) before the first item.
#[derive(Debug)]
pub struct Cursor {
    documents: std::vec::IntoIter<Document>,
}

impl Cursor {
    fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents.into_iter(),
        }
    }
}

impl Iterator for Cursor {
    type Item = Document;

    fn next(&mut self) -> Option<Self::Item> {
        self.documents.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

impl ExactSizeIterator for Cursor {}

/// Repository interface for one document collection.
pub trait DocumentRepository {
    fn collection(&self) -> Collection;
    /// Inserts one document; returns the store acknowledgement.
    fn save_one(&self, document: &Document) -> RepoResult<bool>;
    /// Returns every matching document, projected. The whole result is
    /// loaded before it is returned.
    fn get_many(&self, filter: &Filter, projection: &Projection) -> RepoResult<Cursor>;
    /// Returns the first matching document, if any.
    fn get_one(&self, filter: &Filter, projection: &Projection) -> RepoResult<Option<Document>>;
    /// Applies operators to the document with `id`.
    fn update_by_id(&self, id: EntityId, ops: &[UpdateOp]) -> RepoResult<UpdateResult>;
    /// Deletes the document with `id`; returns the deleted count.
    fn delete(&self, id: EntityId) -> RepoResult<usize>;
}

/// SQLite-backed document collection.
pub struct SqliteDocumentRepository<'conn> {
    conn: &'conn Connection,
    collection: Collection,
}

impl<'conn> SqliteDocumentRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection, collection: Collection) -> RepoResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self::bound(conn, collection))
    }

    /// Binds without readiness checks; the caller already verified the store.
    pub(crate) fn bound(conn: &'conn Connection, collection: Collection) -> Self {
        Self { conn, collection }
    }

    fn load(&self, id_hint: Option<&str>) -> RepoResult<Vec<Document>> {
        let mut sql = String::from(
            "SELECT doc_id, body
             FROM documents
             WHERE namespace = ? AND collection = ?",
        );
        let mut bind_values = vec![
            SqlValue::Text(self.collection.namespace().to_string()),
            SqlValue::Text(self.collection.name().to_string()),
        ];
        if let Some(id) = id_hint {
            sql.push_str(" AND doc_id = ?");
            bind_values.push(SqlValue::Text(id.to_string()));
        }
        sql.push_str(" ORDER BY seq ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let doc_id: String = row.get("doc_id")?;
            let body: String = row.get("body")?;
            documents.push(parse_body(&doc_id, &body)?);
        }
        Ok(documents)
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn collection(&self) -> Collection {
        self.collection
    }

    fn save_one(&self, document: &Document) -> RepoResult<bool> {
        let doc_id = document_id(document).ok_or(RepoError::MissingId)?;
        let body = serde_json::to_string(document)?;

        let inserted = self.conn.execute(
            "INSERT INTO documents (namespace, collection, doc_id, body)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                self.collection.namespace(),
                self.collection.name(),
                doc_id,
                body
            ],
        );
        match inserted {
            Ok(changed) => Ok(changed == 1),
            Err(err) => {
                let err = RepoError::from(err);
                if matches!(&err, RepoError::Db(db) if db.is_constraint_violation()) {
                    return Err(RepoError::DuplicateId {
                        collection: self.collection,
                        id: doc_id.to_string(),
                    });
                }
                Err(err)
            }
        }
    }

    fn get_many(&self, filter: &Filter, projection: &Projection) -> RepoResult<Cursor> {
        let documents = self
            .load(id_equality(filter))?
            .into_iter()
            .filter(|document| filter.matches(document))
            .map(|document| projection.apply(document))
            .collect();
        Ok(Cursor::new(documents))
    }

    fn get_one(&self, filter: &Filter, projection: &Projection) -> RepoResult<Option<Document>> {
        Ok(self.get_many(filter, projection)?.next())
    }

    fn update_by_id(&self, id: EntityId, ops: &[UpdateOp]) -> RepoResult<UpdateResult> {
        let doc_id = id.to_string();
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT body
                 FROM documents
                 WHERE namespace = ?1 AND collection = ?2 AND doc_id = ?3;",
                params![self.collection.namespace(), self.collection.name(), doc_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(body) = stored else {
            return Ok(UpdateResult::default());
        };

        let mut document = parse_body(&doc_id, &body)?;
        if !apply_update(&mut document, ops)? {
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: 0,
            });
        }

        let changed = self.conn.execute(
            "UPDATE documents
             SET body = ?4
             WHERE namespace = ?1 AND collection = ?2 AND doc_id = ?3;",
            params![
                self.collection.namespace(),
                self.collection.name(),
                doc_id,
                serde_json::to_string(&document)?
            ],
        )?;
        if changed != 1 {
            return Err(RepoError::Unacknowledged("update_by_id"));
        }

        Ok(UpdateResult {
            matched_count: 1,
            modified_count: 1,
        })
    }

    fn delete(&self, id: EntityId) -> RepoResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM documents
             WHERE namespace = ?1 AND collection = ?2 AND doc_id = ?3;",
            params![
                self.collection.namespace(),
                self.collection.name(),
                id.to_string()
            ],
        )?;
        Ok(deleted)
    }
}

fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

/// Narrows the scan when the filter is a plain identifier match.
fn id_equality(filter: &Filter) -> Option<&str> {
    match filter {
        Filter::Eq { field, value } if field == ID_FIELD => value.as_str(),
        _ => None,
    }
}

fn parse_body(doc_id: &str, body: &str) -> RepoResult<Document> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(RepoError::InvalidData(format!(
            "document `{doc_id}` body is not a JSON object"
        ))),
        Err(err) => Err(RepoError::InvalidData(format!(
            "document `{doc_id}` body is not valid JSON: {err}"
        ))),
    }
}
