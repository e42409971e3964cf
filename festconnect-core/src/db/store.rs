//! Record store
//!
//! Typed, indexed storage of the three collections on top of SQLite.
//! Every public [`RecordStore`] method runs as its own logical operation;
//! [`StoreTransaction`] batches several operations into one atomic unit.

use crate::db::schema::CollectionSchema;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Transaction;

/// A value bound into a statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Integer(Option<i64>),
    Text(Option<String>),
    Timestamp(DateTime<Utc>),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(Some(v))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(Some(v as i64))
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(Some(v))
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        SqlValue::Text(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

/// A stored record of one collection
pub trait Record: Sized + Send + Unpin {
    /// Collection this record lives in
    fn schema() -> CollectionSchema;

    /// Primary key value
    fn key(&self) -> i64;

    /// Non-key column values, in `CollectionSchema::value_columns` order
    fn values(&self) -> Vec<SqlValue>;

    fn from_row(row: &SqliteRow) -> Result<Self>;
}

/// A not-yet-stored record for a collection whose keys the store assigns
pub trait Draft: Send + Sync {
    type Record: Record;

    /// Non-key column values, in `CollectionSchema::value_columns` order
    fn values(&self) -> Vec<SqlValue>;
}

/// Handle to the opened store
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a draft; the store assigns and returns the primary key
    pub async fn insert<D: Draft>(&self, draft: &D) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        insert_draft(&mut conn, draft).await
    }

    /// Insert a record with its own key; fails with `Write` if the key exists
    pub async fn insert_with_key<R: Record>(&self, record: &R) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        insert_keyed(&mut conn, record).await
    }

    pub async fn get_all<R: Record>(&self) -> Result<Vec<R>> {
        let mut conn = self.pool.acquire().await?;
        select_all(&mut conn).await
    }

    /// Records whose indexed `column` equals `value`
    pub async fn get_by_index<R: Record>(&self, column: &str, value: SqlValue) -> Result<Vec<R>> {
        let mut conn = self.pool.acquire().await?;
        select_by_index(&mut conn, column, value).await
    }

    pub async fn get<R: Record>(&self, key: i64) -> Result<Option<R>> {
        let mut conn = self.pool.acquire().await?;
        select_one(&mut conn, key).await
    }

    /// Upsert by primary key
    pub async fn put<R: Record>(&self, record: &R) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert(&mut conn, record).await
    }

    /// Start an explicit multi-record transaction
    pub async fn transaction(&self) -> Result<StoreTransaction> {
        let tx = self.pool.begin().await.map_err(Error::write)?;
        Ok(StoreTransaction { tx })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Batched operations; dropped without `commit` they roll back
pub struct StoreTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTransaction {
    pub async fn insert<D: Draft>(&mut self, draft: &D) -> Result<i64> {
        insert_draft(&mut self.tx, draft).await
    }

    pub async fn get_all<R: Record>(&mut self) -> Result<Vec<R>> {
        select_all(&mut self.tx).await
    }

    pub async fn put<R: Record>(&mut self, record: &R) -> Result<()> {
        upsert(&mut self.tx, record).await
    }

    /// Underlying connection, for statements outside the typed collections
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(Error::write)
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value(query: SqliteQuery<'_>, value: SqlValue) -> SqliteQuery<'_> {
    match value {
        SqlValue::Integer(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Timestamp(v) => query.bind(v),
    }
}

fn bind_all(mut query: SqliteQuery<'_>, values: Vec<SqlValue>) -> SqliteQuery<'_> {
    for value in values {
        query = bind_value(query, value);
    }
    query
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn checked_values(schema: &CollectionSchema, values: Vec<SqlValue>) -> Result<Vec<SqlValue>> {
    let expected = schema.value_columns().count();
    if values.len() != expected {
        return Err(Error::InvalidInput(format!(
            "{} expects {} values, got {}",
            schema.name,
            expected,
            values.len()
        )));
    }
    Ok(values)
}

fn value_column_list(schema: &CollectionSchema) -> Vec<&str> {
    schema.value_columns().map(|c| c.name.as_str()).collect()
}

async fn insert_draft<D: Draft>(conn: &mut SqliteConnection, draft: &D) -> Result<i64> {
    let schema = D::Record::schema();
    if !schema.auto_key {
        return Err(Error::InvalidInput(format!(
            "{} does not assign keys; insert a keyed record",
            schema.name
        )));
    }
    let values = checked_values(&schema, draft.values())?;
    let columns = value_column_list(&schema);

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.name,
        columns.join(", "),
        placeholders(columns.len())
    );
    let result = bind_all(sqlx::query(&sql), values)
        .execute(&mut *conn)
        .await
        .map_err(Error::write)?;

    Ok(result.last_insert_rowid())
}

async fn insert_keyed<R: Record>(conn: &mut SqliteConnection, record: &R) -> Result<i64> {
    let schema = R::schema();
    let values = checked_values(&schema, record.values())?;
    let columns = value_column_list(&schema);

    let sql = format!(
        "INSERT INTO {} ({}, {}) VALUES ({})",
        schema.name,
        schema.key,
        columns.join(", "),
        placeholders(columns.len() + 1)
    );
    let query = sqlx::query(&sql).bind(record.key());
    bind_all(query, values)
        .execute(&mut *conn)
        .await
        .map_err(Error::write)?;

    Ok(record.key())
}

async fn upsert<R: Record>(conn: &mut SqliteConnection, record: &R) -> Result<()> {
    let schema = R::schema();
    let values = checked_values(&schema, record.values())?;
    let columns = value_column_list(&schema);
    let updates: Vec<String> = columns
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    let sql = format!(
        "INSERT INTO {} ({}, {}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
        schema.name,
        schema.key,
        columns.join(", "),
        placeholders(columns.len() + 1),
        schema.key,
        updates.join(", ")
    );
    let query = sqlx::query(&sql).bind(record.key());
    bind_all(query, values)
        .execute(&mut *conn)
        .await
        .map_err(Error::write)?;

    Ok(())
}

async fn select_all<R: Record>(conn: &mut SqliteConnection) -> Result<Vec<R>> {
    let schema = R::schema();
    let sql = format!("SELECT * FROM {} ORDER BY {}", schema.name, schema.key);
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    rows.iter().map(R::from_row).collect()
}

async fn select_by_index<R: Record>(
    conn: &mut SqliteConnection,
    column: &str,
    value: SqlValue,
) -> Result<Vec<R>> {
    let schema = R::schema();
    if !schema.has_index(column) {
        return Err(Error::InvalidInput(format!(
            "{} has no index on '{}'",
            schema.name, column
        )));
    }

    let sql = format!(
        "SELECT * FROM {} WHERE {} = ? ORDER BY {}",
        schema.name, column, schema.key
    );
    let rows = bind_value(sqlx::query(&sql), value)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(R::from_row).collect()
}

async fn select_one<R: Record>(conn: &mut SqliteConnection, key: i64) -> Result<Option<R>> {
    let schema = R::schema();
    let sql = format!("SELECT * FROM {} WHERE {} = ?", schema.name, schema.key);
    let row = sqlx::query(&sql).bind(key).fetch_optional(&mut *conn).await?;
    row.as_ref().map(R::from_row).transpose()
}
