//! Declarative collection schemas
//!
//! Each collection (festivals, connections, user profiles) is described once
//! by a [`CollectionSchema`]: its primary key, whether the store assigns keys,
//! its columns and its secondary indexes. The same definition drives table
//! creation on first open and additive synchronisation on later opens.
//!
//! # Initialization phases
//!
//! 1. **CREATE TABLE / INDEX IF NOT EXISTS** - create missing collections
//! 2. **Auto-Sync** - add columns missing from existing tables (this module)
//! 3. **Versioned upgrades** - `migrations.rs`
//!
//! Sync only ever adds. Type or constraint drift is logged and left alone.

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// Column definition with SQL constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,
    /// SQL type (e.g., "TEXT", "INTEGER", "TIMESTAMP")
    pub sql_type: String,
    /// NOT NULL constraint
    pub not_null: bool,
    /// PRIMARY KEY constraint
    pub primary_key: bool,
    /// AUTOINCREMENT on an INTEGER PRIMARY KEY (monotonic, never reused)
    pub auto_increment: bool,
    /// REFERENCES target, e.g. "festivals(id)"
    pub references: Option<String>,
    /// DEFAULT value
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    /// Create new column definition
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            primary_key: false,
            auto_increment: false,
            references: None,
            default_value: None,
        }
    }

    /// Mark column as PRIMARY KEY
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark column as AUTOINCREMENT (implies PRIMARY KEY)
    pub fn auto_increment(mut self) -> Self {
        self.primary_key = true;
        self.auto_increment = true;
        self
    }

    /// Mark column as NOT NULL
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Add a REFERENCES clause
    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.references = Some(target.into());
        self
    }

    /// Set DEFAULT value
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Column clause for CREATE TABLE
    fn create_clause(&self) -> String {
        let mut clause = format!("{} {}", self.name, self.sql_type);
        if self.primary_key {
            clause.push_str(" PRIMARY KEY");
        }
        if self.auto_increment {
            clause.push_str(" AUTOINCREMENT");
        }
        if self.not_null {
            clause.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default_value {
            clause.push_str(&format!(" DEFAULT {}", default));
        }
        if let Some(target) = &self.references {
            clause.push_str(&format!(" REFERENCES {}", target));
        }
        clause
    }
}

/// Schema of one collection
#[derive(Debug, Clone)]
pub struct CollectionSchema {
    /// Table name
    pub name: &'static str,
    /// Primary key column
    pub key: &'static str,
    /// Store assigns keys on insert
    pub auto_key: bool,
    /// All columns, key first; value columns follow in bind order
    pub columns: Vec<ColumnDefinition>,
    /// Columns carrying a secondary (non-unique) index
    pub indexes: Vec<&'static str>,
}

impl CollectionSchema {
    /// Non-key columns in bind order
    pub fn value_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(move |c| c.name != self.key)
    }

    pub fn has_index(&self, column: &str) -> bool {
        self.indexes.iter().any(|i| *i == column)
    }

    pub fn index_name(&self, column: &str) -> String {
        format!("idx_{}_{}", self.name, column)
    }

    pub fn create_table_sql(&self) -> String {
        let clauses: Vec<String> = self.columns.iter().map(|c| c.create_clause()).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            clauses.join(",\n    ")
        )
    }

    pub fn create_index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|column| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                    self.index_name(column),
                    self.name,
                    column
                )
            })
            .collect()
    }
}

/// Create the collection's table and indexes if missing
///
/// Returns true when the table did not exist before.
pub async fn create_collection(pool: &SqlitePool, schema: &CollectionSchema) -> Result<bool> {
    let existed = SchemaIntrospector::table_exists(pool, schema.name).await?;

    sqlx::query(&schema.create_table_sql()).execute(pool).await?;
    for sql in schema.create_index_sql() {
        sqlx::query(&sql).execute(pool).await?;
    }

    if !existed {
        info!("Created collection '{}'", schema.name);
    }
    Ok(!existed)
}

/// Actual column from database introspection (PRAGMA table_info result)
#[derive(Debug, Clone)]
pub struct ActualColumn {
    /// Column ID (position in table)
    pub cid: i32,
    /// Column name
    pub name: String,
    /// SQL type from PRAGMA table_info
    pub type_name: String,
    /// NOT NULL constraint
    pub not_null: bool,
    /// PRIMARY KEY flag
    pub pk: bool,
}

/// Schema drift detected between expected and actual schema
#[derive(Debug, Clone)]
pub enum SchemaDrift {
    /// Column missing from database
    MissingColumn {
        table: String,
        column: ColumnDefinition,
    },
    /// Column type mismatch (cannot auto-fix)
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },
    /// Constraint missing on an existing column (needs a table rebuild)
    ConstraintMismatch {
        table: String,
        column: String,
        constraint: &'static str,
    },
}

/// Schema introspection - read actual database schema
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Read actual columns from a table using PRAGMA table_info, ordered by cid
    pub async fn introspect_table(pool: &SqlitePool, table_name: &str) -> Result<Vec<ActualColumn>> {
        let query = format!("PRAGMA table_info({})", table_name);
        let rows = sqlx::query(&query).fetch_all(pool).await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            columns.push(ActualColumn {
                cid: row.try_get("cid")?,
                name: row.try_get("name")?,
                type_name: row.try_get("type")?,
                not_null: row.try_get::<i32, _>("notnull")? != 0,
                pk: row.try_get::<i32, _>("pk")? != 0,
            });
        }
        columns.sort_by_key(|c| c.cid);

        Ok(columns)
    }

    /// Check if table exists
    pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM sqlite_master
                WHERE type='table' AND name = ?
            )
            "#,
        )
        .bind(table_name)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }
}

/// Compare expected columns to the actual table
pub fn compare_columns(
    table_name: &str,
    expected: &[ColumnDefinition],
    actual: &[ActualColumn],
) -> Vec<SchemaDrift> {
    let mut drift = Vec::new();

    for expected_col in expected {
        match actual.iter().find(|c| c.name == expected_col.name) {
            Some(actual_col) => {
                if !types_compatible(&expected_col.sql_type, &actual_col.type_name) {
                    drift.push(SchemaDrift::TypeMismatch {
                        table: table_name.to_string(),
                        column: expected_col.name.clone(),
                        expected: expected_col.sql_type.clone(),
                        actual: actual_col.type_name.clone(),
                    });
                }
                if expected_col.not_null && !actual_col.not_null {
                    drift.push(SchemaDrift::ConstraintMismatch {
                        table: table_name.to_string(),
                        column: expected_col.name.clone(),
                        constraint: "NOT NULL",
                    });
                }
                if expected_col.primary_key && !actual_col.pk {
                    drift.push(SchemaDrift::ConstraintMismatch {
                        table: table_name.to_string(),
                        column: expected_col.name.clone(),
                        constraint: "PRIMARY KEY",
                    });
                }
            }
            None => drift.push(SchemaDrift::MissingColumn {
                table: table_name.to_string(),
                column: expected_col.clone(),
            }),
        }
    }

    drift
}

/// SQLite type affinity comparison
fn types_compatible(expected: &str, actual: &str) -> bool {
    let exp = expected.to_uppercase();
    let act = actual.to_uppercase();

    if exp == act {
        return true;
    }

    let integer = |t: &str| t.contains("INT");
    let text = |t: &str| t.contains("TEXT") || t.contains("CHAR") || t.contains("CLOB");
    let timestamp = |t: &str| t.contains("TIMESTAMP") || t.contains("DATETIME") || text(t);

    (integer(&exp) && integer(&act))
        || (text(&exp) && text(&act))
        || (exp.contains("TIMESTAMP") && timestamp(&act))
}

/// Add columns missing from an existing collection table
///
/// Returns the number of columns added.
pub async fn sync_collection(pool: &SqlitePool, schema: &CollectionSchema) -> Result<usize> {
    if !SchemaIntrospector::table_exists(pool, schema.name).await? {
        warn!(
            "Collection '{}' does not exist - create_collection must run first",
            schema.name
        );
        return Ok(0);
    }

    let actual = SchemaIntrospector::introspect_table(pool, schema.name).await?;
    let drift = compare_columns(schema.name, &schema.columns, &actual);

    if drift.is_empty() {
        debug!("Schema up to date for '{}'", schema.name);
        return Ok(0);
    }

    let mut added = 0;
    for change in drift {
        match change {
            SchemaDrift::MissingColumn { table, column } => {
                add_column(pool, &table, &column).await?;
                added += 1;
            }
            SchemaDrift::TypeMismatch {
                table,
                column,
                expected,
                actual,
            } => {
                warn!(
                    "Type mismatch in {}.{}: expected '{}', found '{}'. Left unchanged.",
                    table, column, expected, actual
                );
            }
            SchemaDrift::ConstraintMismatch {
                table,
                column,
                constraint,
            } => {
                warn!(
                    "Constraint mismatch in {}.{}: missing '{}'. Left unchanged.",
                    table, column, constraint
                );
            }
        }
    }

    Ok(added)
}

/// Add a missing column via ALTER TABLE ADD COLUMN
///
/// SQLite cannot add PRIMARY KEY columns, and NOT NULL only with a DEFAULT.
async fn add_column(pool: &SqlitePool, table: &str, column: &ColumnDefinition) -> Result<()> {
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        table, column.name, column.sql_type
    );

    if column.primary_key {
        warn!(
            "Cannot add PRIMARY KEY column {}.{} via ALTER TABLE; adding it as a plain column",
            table, column.name
        );
    }

    match (&column.default_value, column.not_null) {
        (Some(default), true) => sql.push_str(&format!(" NOT NULL DEFAULT {}", default)),
        (Some(default), false) => sql.push_str(&format!(" DEFAULT {}", default)),
        (None, true) => warn!(
            "Cannot add NOT NULL column {}.{} without DEFAULT; column will be nullable",
            table, column.name
        ),
        (None, false) => {}
    }

    info!("Adding column {}.{} ({})", table, column.name, column.sql_type);

    match sqlx::query(&sql).execute(pool).await {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            info!("Column {}.{} already present", table, column.name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    fn sample_schema() -> CollectionSchema {
        CollectionSchema {
            name: "samples",
            key: "id",
            auto_key: true,
            columns: vec![
                ColumnDefinition::new("id", "INTEGER").auto_increment(),
                ColumnDefinition::new("owner_id", "INTEGER").not_null(),
                ColumnDefinition::new("label", "TEXT"),
            ],
            indexes: vec!["owner_id"],
        }
    }

    #[test]
    fn test_create_table_sql() {
        let sql = sample_schema().create_table_sql();
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("owner_id INTEGER NOT NULL"));
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS samples"));
    }

    #[test]
    fn test_value_columns_skip_key() {
        let schema = sample_schema();
        let names: Vec<&str> = schema.value_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["owner_id", "label"]);
    }

    #[test]
    fn test_references_clause() {
        let col = ColumnDefinition::new("festival_id", "INTEGER")
            .not_null()
            .references("festivals(id)");
        assert_eq!(
            col.create_clause(),
            "festival_id INTEGER NOT NULL REFERENCES festivals(id)"
        );
    }

    #[test]
    fn test_types_compatible() {
        assert!(types_compatible("TEXT", "text"));
        assert!(types_compatible("INTEGER", "INT"));
        assert!(types_compatible("TIMESTAMP", "DATETIME"));
        assert!(types_compatible("TIMESTAMP", "TEXT"));
        assert!(!types_compatible("TEXT", "INTEGER"));
    }

    #[tokio::test]
    async fn test_create_collection_is_idempotent() {
        let pool = setup_test_db().await;
        let schema = sample_schema();

        assert!(create_collection(&pool, &schema).await.unwrap());
        assert!(!create_collection(&pool, &schema).await.unwrap());

        let index_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='index' AND name='idx_samples_owner_id')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(index_exists);
    }

    #[tokio::test]
    async fn test_sync_adds_missing_column_and_keeps_rows() {
        let pool = setup_test_db().await;

        sqlx::query("CREATE TABLE samples (id INTEGER PRIMARY KEY AUTOINCREMENT, owner_id INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO samples (owner_id) VALUES (7)")
            .execute(&pool)
            .await
            .unwrap();

        let added = sync_collection(&pool, &sample_schema()).await.unwrap();
        assert_eq!(added, 1);

        let columns = SchemaIntrospector::introspect_table(&pool, "samples")
            .await
            .unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[2].name, "label");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM samples")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        assert_eq!(sync_collection(&pool, &sample_schema()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_detect_type_mismatch() {
        let pool = setup_test_db().await;
        sqlx::query("CREATE TABLE samples (id INTEGER PRIMARY KEY, owner_id TEXT NOT NULL, label TEXT)")
            .execute(&pool)
            .await
            .unwrap();

        let actual = SchemaIntrospector::introspect_table(&pool, "samples")
            .await
            .unwrap();
        let drift = compare_columns("samples", &sample_schema().columns, &actual);

        assert_eq!(drift.len(), 1);
        match &drift[0] {
            SchemaDrift::TypeMismatch { column, .. } => assert_eq!(column, "owner_id"),
            other => panic!("Expected TypeMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_constraint_drift() {
        let pool = setup_test_db().await;
        sqlx::query("CREATE TABLE samples (id INTEGER, owner_id INTEGER, label TEXT)")
            .execute(&pool)
            .await
            .unwrap();

        let actual = SchemaIntrospector::introspect_table(&pool, "samples")
            .await
            .unwrap();
        let drift = compare_columns("samples", &sample_schema().columns, &actual);

        let constraints: Vec<(&str, &str)> = drift
            .iter()
            .filter_map(|d| match d {
                SchemaDrift::ConstraintMismatch {
                    column, constraint, ..
                } => Some((column.as_str(), *constraint)),
                _ => None,
            })
            .collect();
        assert_eq!(
            constraints,
            vec![("id", "PRIMARY KEY"), ("owner_id", "NOT NULL")]
        );

        // reported only, never rewritten
        assert_eq!(sync_collection(&pool, &sample_schema()).await.unwrap(), 0);
    }
}
