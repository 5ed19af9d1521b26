//! PostgreSQL-backed document store.
//!
//! Documents live in a single `documents` table keyed by full path, with the
//! body in a JSONB column. Transactions run at `SERIALIZABLE`; serialization
//! failures and deadlocks surface as [`StoreError::Conflict`] so the caller's
//! retry loop can re-run them. Change notifications are published in-process
//! after each successful commit.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tokio::sync::broadcast;

use super::{
    ChangeHub, CollectionPath, Direction, DocPath, Document, FilterOp, Query, ServerClock,
    Store, StoreError, StoreResult, Transaction, Write,
};

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if matches!(
            db.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        ) {
            return StoreError::Conflict;
        }
    }
    StoreError::Database(e)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    hub: ChangeHub,
    clock: Arc<ServerClock>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            hub: ChangeHub::new(),
            clock: Arc::new(ServerClock::new()),
        }
    }
}

async fn fetch_doc<'e, E>(executor: E, path: &DocPath) -> StoreResult<Option<Document>>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query("SELECT data FROM documents WHERE path = $1")
        .bind(path.as_str())
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;

    match row {
        Some(row) => {
            let Json(data): Json<Value> = row.try_get("data").map_err(map_db_error)?;
            Ok(Some(Document {
                path: path.clone(),
                data,
            }))
        }
        None => Ok(None),
    }
}

async fn apply_write(conn: &mut sqlx::PgConnection, write: &Write) -> StoreResult<()> {
    match write {
        Write::Set(path, data) => {
            sqlx::query(
                "INSERT INTO documents (path, collection, data, updated_at)
                 VALUES ($1, $2, $3, now())
                 ON CONFLICT (path) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
            )
            .bind(path.as_str())
            .bind(path.collection().as_str())
            .bind(Json(data))
            .execute(&mut *conn)
            .await
            .map_err(map_db_error)?;
        }
        Write::Update(path, fields) => {
            let result = sqlx::query(
                "UPDATE documents SET data = data || $2, updated_at = now() WHERE path = $1",
            )
            .bind(path.as_str())
            .bind(Json(fields))
            .execute(&mut *conn)
            .await
            .map_err(map_db_error)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(path.to_string()));
            }
        }
        Write::Delete(path) => {
            sqlx::query("DELETE FROM documents WHERE path = $1")
                .bind(path.as_str())
                .execute(&mut *conn)
                .await
                .map_err(map_db_error)?;
        }
    }
    Ok(())
}

fn build_query(query: &Query) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new("SELECT path, data FROM documents WHERE collection = ");
    qb.push_bind(query.collection.as_str());

    for filter in &query.filters {
        qb.push(" AND data -> ");
        qb.push_bind(filter.field.as_str());
        match filter.op {
            FilterOp::Eq => {
                qb.push(" = ");
                qb.push_bind(Json(filter.value.clone()));
            }
            FilterOp::Ne => {
                qb.push(" <> ");
                qb.push_bind(Json(filter.value.clone()));
            }
            FilterOp::ArrayContains => {
                qb.push(" @> ");
                qb.push_bind(Json(Value::Array(vec![filter.value.clone()])));
            }
        }
    }

    if let Some(order) = &query.order_by {
        qb.push(" AND data ? ");
        qb.push_bind(order.field.as_str());
        qb.push(" ORDER BY data -> ");
        qb.push_bind(order.field.as_str());
        qb.push(match order.direction {
            Direction::Asc => " ASC",
            Direction::Desc => " DESC",
        });
        qb.push(", path ASC");
    }

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit as i64);
    }
    qb
}

#[async_trait]
impl Store for PgStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        fetch_doc(&self.pool, path).await
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let mut qb = build_query(query);
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let path: String = row.try_get("path").map_err(map_db_error)?;
            let Json(data): Json<Value> = row.try_get("data").map_err(map_db_error)?;
            docs.push(Document {
                path: DocPath::parse(&path)?,
                data,
            });
        }
        Ok(docs)
    }

    async fn set(&self, path: &DocPath, data: Value) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        apply_write(&mut conn, &Write::Set(path.clone(), data)).await?;
        self.hub.publish(path.collection());
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: Value) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        apply_write(&mut conn, &Write::Update(path.clone(), fields)).await?;
        self.hub.publish(path.collection());
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        apply_write(&mut conn, &Write::Delete(path.clone())).await?;
        self.hub.publish(path.collection());
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        Ok(Box::new(PgTransaction {
            tx,
            hub: self.hub.clone(),
            snapshot: HashMap::new(),
            writes: Vec::new(),
        }))
    }

    fn changes(&self) -> broadcast::Receiver<CollectionPath> {
        self.hub.receiver()
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    hub: ChangeHub,
    snapshot: HashMap<DocPath, Option<Document>>,
    writes: Vec<Write>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn get(&mut self, path: &DocPath) -> StoreResult<Option<Document>> {
        if let Some(doc) = self.snapshot.get(path) {
            return Ok(doc.clone());
        }
        let doc = fetch_doc(&mut *self.tx, path).await?;
        self.snapshot.insert(path.clone(), doc.clone());
        Ok(doc)
    }

    fn set(&mut self, path: DocPath, data: Value) {
        self.writes.push(Write::Set(path, data));
    }

    fn update(&mut self, path: DocPath, fields: Value) {
        self.writes.push(Write::Update(path, fields));
    }

    fn delete(&mut self, path: DocPath) {
        self.writes.push(Write::Delete(path));
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgTransaction {
            mut tx,
            hub,
            writes,
            ..
        } = *self;

        let mut touched = BTreeSet::new();
        for write in &writes {
            // An error here drops `tx`, which rolls it back.
            apply_write(&mut tx, write).await?;
            touched.insert(write.path().collection());
        }
        tx.commit().await.map_err(map_db_error)?;

        for collection in touched {
            hub.publish(collection);
        }
        Ok(())
    }
}
