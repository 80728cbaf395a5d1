//! SQLite implementation of the [`Store`] trait.
//!
//! Vectors are stored as little-endian `f32` BLOBs and ranked by cosine
//! similarity in Rust. Lexical search runs an FTS5 `MATCH` with `bm25`
//! ranking; display headlines are generated from the matched content with
//! the shared [`headline`] routine.

use std::cmp::Ordering;

use anyhow::Result;
use async_trait::async_trait;
use groundwork_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use groundwork_core::lexical::{headline, HeadlineOptions, LexicalQuery};
use groundwork_core::models::{
    ChunkMetadata, Document, DocumentFilter, InsertOutcome, LexicalHit, NewEmbedding, VectorHit,
};
use groundwork_core::store::{leading_snippet, Store};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::config::Config;
use crate::{db, migrate};

/// Filter clause shared by lexical search and count; each value is bound twice.
const FILTER_SQL: &str = r#"
    AND (? IS NULL OR d.document_type = ?)
    AND (? IS NULL OR d.document_year = ?)
    AND (? IS NULL OR d.document_date >= ?)
    AND (? IS NULL OR d.document_date <= ?)
"#;

macro_rules! bind_filter {
    ($query:expr, $filter:expr) => {
        $query
            .bind($filter.document_type.as_deref())
            .bind($filter.document_type.as_deref())
            .bind($filter.document_year.as_deref())
            .bind($filter.document_year.as_deref())
            .bind($filter.date_from.as_deref())
            .bind($filter.date_from.as_deref())
            .bind($filter.date_to.as_deref())
            .bind($filter.date_to.as_deref())
    };
}

/// SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
    headline: HeadlineOptions,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            headline: HeadlineOptions::default(),
        }
    }

    /// Connect to the configured database and apply migrations.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    fn lexical_hit(&self, row: &SqliteRow, query: &LexicalQuery) -> LexicalHit {
        let content: String = row.get("content");
        let snippet = leading_snippet(&content);
        let highlighted = headline(&content, query, &self.headline);
        LexicalHit {
            id: row.get("id"),
            filename: row.get("filename"),
            document_type: row.get("document_type"),
            document_year: row.get("document_year"),
            document_date: row.get("document_date"),
            headline: if highlighted.is_empty() {
                snippet.clone()
            } else {
                highlighted
            },
            snippet,
            rank: row.get("score"),
        }
    }
}

fn document_from_row(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        filename: row.get("filename"),
        mime_type: row.get("mime_type"),
        document_type: row.get("document_type"),
        document_year: row.get("document_year"),
        document_date: row.get("document_date"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, filename, mime_type, document_type,
                                   document_year, document_date, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                filename = excluded.filename,
                mime_type = excluded.mime_type,
                document_type = excluded.document_type,
                document_year = excluded.document_year,
                document_date = excluded.document_date,
                content = excluded.content
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.owner_id)
        .bind(&doc.filename)
        .bind(&doc.mime_type)
        .bind(&doc.document_type)
        .bind(&doc.document_year)
        .bind(&doc.document_date)
        .bind(&doc.content)
        .bind(doc.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO documents_fts (document_id, owner_id, filename, content) VALUES (?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.owner_id)
        .bind(&doc.filename)
        .bind(&doc.content)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_document(&self, owner_id: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, filename, mime_type, document_type, document_year,
                   document_date, content, created_at
            FROM documents
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(document_from_row))
    }

    async fn delete_document(&self, owner_id: &str, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM documents WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM embedding_sets WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn embedding_ids(&self, document_id: &str) -> Result<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM embeddings WHERE document_id = ? ORDER BY rowid")
                .bind(document_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    async fn insert_embeddings_if_absent(
        &self,
        document_id: &str,
        rows: &[NewEmbedding],
    ) -> Result<InsertOutcome> {
        let now = chrono::Utc::now().timestamp();
        let owner_id = rows.first().map(|r| r.owner_id.as_str()).unwrap_or_default();
        let model = rows.first().map(|r| r.model.as_str()).unwrap_or_default();

        let mut tx = self.pool.begin().await?;

        // The claim row is the unique key; losing the conflict means another
        // writer already owns this document's embedding set.
        let claimed = sqlx::query(
            r#"
            INSERT INTO embedding_sets (document_id, owner_id, model, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(document_id) DO NOTHING
            "#,
        )
        .bind(document_id)
        .bind(owner_id)
        .bind(model)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !claimed {
            let existing: Vec<String> = sqlx::query_scalar(
                "SELECT id FROM embeddings WHERE document_id = ? ORDER BY rowid",
            )
            .bind(document_id)
            .fetch_all(&mut *tx)
            .await?;
            tx.commit().await?;
            debug!(document_id, "embedding set already claimed");
            return Ok(InsertOutcome::Existing(existing));
        }

        for row in rows {
            let metadata_json = serde_json::to_string(&row.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO embeddings (id, owner_id, document_id, content, content_hash,
                                        model, dims, metadata_json, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.owner_id)
            .bind(&row.document_id)
            .bind(&row.content)
            .bind(&row.content_hash)
            .bind(&row.model)
            .bind(row.vector.len() as i64)
            .bind(&metadata_json)
            .bind(vec_to_blob(&row.vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(InsertOutcome::Inserted(
            rows.iter().map(|r| r.id.clone()).collect(),
        ))
    }

    async fn delete_embeddings(&self, document_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM embedding_sets WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(removed)
    }

    async fn vector_search(
        &self,
        owner_id: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.document_id, e.content, e.metadata_json, e.embedding, d.filename
            FROM embeddings e
            LEFT JOIN documents d ON d.id = e.document_id
            WHERE e.owner_id = ?
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<VectorHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let metadata_json: String = row.get("metadata_json");
                VectorHit {
                    embedding_id: row.get("id"),
                    document_id: row.get("document_id"),
                    filename: row.get("filename"),
                    content: row.get("content"),
                    metadata: serde_json::from_str::<ChunkMetadata>(&metadata_json).ok(),
                    similarity: cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        hits.truncate(limit);

        Ok(hits)
    }

    async fn lexical_search(
        &self,
        owner_id: &str,
        query: &LexicalQuery,
        filter: &DocumentFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LexicalHit>> {
        let rows = match query.to_fts5() {
            Some(expr) => {
                let sql = format!(
                    r#"
                    SELECT d.id, d.filename, d.document_type, d.document_year, d.document_date,
                           d.content, -bm25(documents_fts) AS score
                    FROM documents_fts
                    JOIN documents d ON d.id = documents_fts.document_id
                    WHERE documents_fts MATCH ? AND d.owner_id = ?
                    {FILTER_SQL}
                    ORDER BY score DESC, d.id
                    LIMIT ? OFFSET ?
                    "#
                );
                let q = sqlx::query(&sql).bind(expr).bind(owner_id);
                bind_filter!(q, filter)
                    .bind(limit as i64)
                    .bind(offset as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    r#"
                    SELECT d.id, d.filename, d.document_type, d.document_year, d.document_date,
                           d.content, 0.0 AS score
                    FROM documents d
                    WHERE d.owner_id = ?
                    {FILTER_SQL}
                    ORDER BY d.id
                    LIMIT ? OFFSET ?
                    "#
                );
                let q = sqlx::query(&sql).bind(owner_id);
                bind_filter!(q, filter)
                    .bind(limit as i64)
                    .bind(offset as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows.iter().map(|row| self.lexical_hit(row, query)).collect())
    }

    async fn lexical_count(
        &self,
        owner_id: &str,
        query: &LexicalQuery,
        filter: &DocumentFilter,
    ) -> Result<u64> {
        let count: i64 = match query.to_fts5() {
            Some(expr) => {
                let sql = format!(
                    r#"
                    SELECT COUNT(*)
                    FROM documents_fts
                    JOIN documents d ON d.id = documents_fts.document_id
                    WHERE documents_fts MATCH ? AND d.owner_id = ?
                    {FILTER_SQL}
                    "#
                );
                let q = sqlx::query_scalar(&sql).bind(expr).bind(owner_id);
                bind_filter!(q, filter).fetch_one(&self.pool).await?
            }
            None => {
                let sql = format!(
                    "SELECT COUNT(*) FROM documents d WHERE d.owner_id = ? {FILTER_SQL}"
                );
                let q = sqlx::query_scalar(&sql).bind(owner_id);
                bind_filter!(q, filter).fetch_one(&self.pool).await?
            }
        };
        Ok(count as u64)
    }
}
