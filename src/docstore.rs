//! Schema-less JSON document store on top of SQLite.
//!
//! Each collection is a table `(_id TEXT PRIMARY KEY, doc TEXT NOT NULL)`
//! holding one JSON object per row. [`Filter`]s compile to `json_extract`
//! predicates, and secondary indexes are expression indexes over the same
//! `json_extract(doc, '$.path')` text, so SQLite's planner can use them.
//!
//! Collection, index and field names are validated before they are
//! spliced into SQL; every value is bound.

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use cinegraph_core::error::EngineError;

/// Predicate over the documents of one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Value),
    /// Field value is one of the given values.
    In(String, Vec<Value>),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// ASCII case-insensitive substring match on a string field.
    ContainsIgnoreCase(String, String),
    /// Array field has an element equal to the value.
    ArrayContains(String, Value),
    /// Some object in an array has a string field containing `needle`,
    /// ignoring ASCII case (e.g. `cast[].name`).
    ArrayAnyContainsIgnoreCase {
        array: String,
        field: String,
        needle: String,
    },
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(path.to_string(), value.into())
    }

    pub fn is_in<I, V>(path: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In(path.to_string(), values.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone)]
enum Bind {
    Text(String),
    Int(i64),
    Real(f64),
}

fn bind_value(value: &Value) -> Option<Bind> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(Bind::Int(*b as i64)),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => Bind::Int(i),
            None => Bind::Real(n.as_f64().unwrap_or_default()),
        }),
        Value::String(s) => Some(Bind::Text(s.clone())),
        other => Some(Bind::Text(other.to_string())),
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, the only collection and index names accepted.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_identifier(name: &str) -> Result<()> {
    if !is_identifier(name) {
        bail!(EngineError::configuration(format!(
            "invalid collection or index name '{}'",
            name
        )));
    }
    Ok(())
}

fn check_path(path: &str) -> Result<()> {
    let valid = !path.is_empty()
        && !path.starts_with('.')
        && !path.ends_with('.')
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid {
        bail!(EngineError::configuration(format!(
            "invalid document field path '{}'",
            path
        )));
    }
    Ok(())
}

/// The SQL expression for a document field. Index definitions and filters
/// must produce identical text for the planner to match them.
fn field_expr(column: &str, path: &str) -> String {
    format!("json_extract({}, '$.{}')", column, path)
}

fn compile(filter: &Filter, sql: &mut String, binds: &mut Vec<Bind>) -> Result<()> {
    let compare = |path: &str, op: &str, value: &Value, sql: &mut String, binds: &mut Vec<Bind>| -> Result<()> {
        check_path(path)?;
        match bind_value(value) {
            Some(b) => {
                sql.push_str(&format!("{} {} ?", field_expr("doc", path), op));
                binds.push(b);
            }
            None if op == "=" => sql.push_str(&format!("{} IS NULL", field_expr("doc", path))),
            // Ordering against null matches nothing.
            None => sql.push_str("0"),
        }
        Ok(())
    };

    match filter {
        Filter::All => sql.push_str("1"),
        Filter::Eq(p, v) => compare(p, "=", v, sql, binds)?,
        Filter::Gt(p, v) => compare(p, ">", v, sql, binds)?,
        Filter::Gte(p, v) => compare(p, ">=", v, sql, binds)?,
        Filter::Lt(p, v) => compare(p, "<", v, sql, binds)?,
        Filter::Lte(p, v) => compare(p, "<=", v, sql, binds)?,
        Filter::In(p, values) => {
            check_path(p)?;
            sql.push_str(&format!(
                "{} IN (SELECT value FROM json_each(?))",
                field_expr("doc", p)
            ));
            binds.push(Bind::Text(Value::Array(values.clone()).to_string()));
        }
        Filter::ContainsIgnoreCase(p, needle) => {
            check_path(p)?;
            sql.push_str(&format!(
                "instr(lower({}), lower(?)) > 0",
                field_expr("doc", p)
            ));
            binds.push(Bind::Text(needle.clone()));
        }
        Filter::ArrayContains(p, v) => {
            check_path(p)?;
            match bind_value(v) {
                Some(b) => {
                    sql.push_str(&format!(
                        "EXISTS (SELECT 1 FROM json_each(doc, '$.{}') WHERE value = ?)",
                        p
                    ));
                    binds.push(b);
                }
                None => sql.push_str("0"),
            }
        }
        Filter::ArrayAnyContainsIgnoreCase {
            array,
            field,
            needle,
        } => {
            check_path(array)?;
            check_path(field)?;
            sql.push_str(&format!(
                "EXISTS (SELECT 1 FROM json_each(doc, '$.{}') AS el WHERE instr(lower({}), lower(?)) > 0)",
                array,
                field_expr("el.value", field)
            ));
            binds.push(Bind::Text(needle.clone()));
        }
        Filter::And(parts) => {
            if parts.is_empty() {
                sql.push_str("1");
            } else {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" AND ");
                    }
                    sql.push('(');
                    compile(part, sql, binds)?;
                    sql.push(')');
                }
            }
        }
    }
    Ok(())
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn apply_binds<'q>(mut query: SqliteQuery<'q>, binds: Vec<Bind>) -> SqliteQuery<'q> {
    for b in binds {
        query = match b {
            Bind::Text(s) => query.bind(s),
            Bind::Int(i) => query.bind(i),
            Bind::Real(f) => query.bind(f),
        };
    }
    query
}

/// Bytes in use by a SQLite database: `(page_count - freelist_count) *
/// page_size`. Pages freed by a dropped index stop counting without a
/// `VACUUM`.
pub async fn database_bytes(pool: &SqlitePool) -> Result<i64> {
    let pages: i64 = sqlx::query_scalar("PRAGMA page_count").fetch_one(pool).await?;
    let free: i64 = sqlx::query_scalar("PRAGMA freelist_count").fetch_one(pool).await?;
    let size: i64 = sqlx::query_scalar("PRAGMA page_size").fetch_one(pool).await?;
    Ok((pages - free) * size)
}

/// SQLite-backed document store.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Fail with a configuration error naming `name` unless it exists.
    pub async fn require_collection(&self, name: &str) -> Result<()> {
        if !self.collection_exists(name).await? {
            bail!(EngineError::missing("collection", name));
        }
        Ok(())
    }

    pub async fn create_collection(&self, name: &str) -> Result<()> {
        check_identifier(name)?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (_id TEXT PRIMARY KEY, doc TEXT NOT NULL)",
            name
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        check_identifier(name)?;
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", name))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically replace `to` with `from`: drop `to` (if any) and rename
    /// `from` in one transaction.
    pub async fn replace_collection(&self, from: &str, to: &str) -> Result<()> {
        check_identifier(from)?;
        check_identifier(to)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", to))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("ALTER TABLE \"{}\" RENAME TO \"{}\"", from, to))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Insert JSON objects in one transaction. Documents without a string
    /// `_id` receive a UUID v4. Returns the number inserted.
    pub async fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<usize> {
        check_identifier(collection)?;
        let sql = format!("INSERT INTO \"{}\" (_id, doc) VALUES (?, ?)", collection);
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;
        for mut doc in docs {
            let Some(obj) = doc.as_object_mut() else {
                bail!("documents must be JSON objects (collection '{}')", collection);
            };
            let id = match obj.get("_id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    obj.insert("_id".to_string(), Value::String(id.clone()));
                    id
                }
            };
            sqlx::query(&sql)
                .bind(id)
                .bind(doc.to_string())
                .execute(&mut *tx)
                .await?;
            inserted += 1;
        }
        tx.commit().await?;
        debug!(collection, inserted, "inserted documents");
        Ok(inserted)
    }

    /// Serialize and insert typed documents.
    pub async fn insert_all<T: serde::Serialize>(&self, collection: &str, docs: &[T]) -> Result<usize> {
        let values = docs
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.insert_many(collection, values).await
    }

    async fn select_docs(&self, collection: &str, filter: &Filter, tail: &str) -> Result<Vec<Value>> {
        check_identifier(collection)?;
        let mut sql = format!("SELECT doc FROM \"{}\" WHERE ", collection);
        let mut binds = Vec::new();
        compile(filter, &mut sql, &mut binds)?;
        sql.push_str(tail);
        let rows = apply_binds(sqlx::query(&sql), binds)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let text: String = row.get("doc");
                Ok(serde_json::from_str(&text)?)
            })
            .collect()
    }

    /// Documents matching `filter`, in insertion order.
    pub async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        self.select_docs(collection, filter, " ORDER BY rowid").await
    }

    pub async fn find_as<T: DeserializeOwned>(&self, collection: &str, filter: &Filter) -> Result<Vec<T>> {
        self.find(collection, filter)
            .await?
            .into_iter()
            .map(|v| Ok(serde_json::from_value(v)?))
            .collect()
    }

    pub async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        Ok(self
            .select_docs(collection, filter, " ORDER BY rowid LIMIT 1")
            .await?
            .into_iter()
            .next())
    }

    pub async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        check_identifier(collection)?;
        let text: Option<String> =
            sqlx::query_scalar(&format!("SELECT doc FROM \"{}\" WHERE _id = ?", collection))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        text.map(|t| Ok(serde_json::from_str(&t)?)).transpose()
    }

    /// Up to `n` documents matching `filter`, chosen uniformly at random.
    pub async fn sample(&self, collection: &str, filter: &Filter, n: usize) -> Result<Vec<Value>> {
        self.select_docs(collection, filter, &format!(" ORDER BY RANDOM() LIMIT {}", n))
            .await
    }

    /// Distinct values of a field among matching documents (nulls included).
    pub async fn distinct(&self, collection: &str, path: &str, filter: &Filter) -> Result<Vec<Value>> {
        check_identifier(collection)?;
        check_path(path)?;
        let mut sql = format!(
            "SELECT DISTINCT json_quote({}) AS v FROM \"{}\" WHERE ",
            field_expr("doc", path),
            collection
        );
        let mut binds = Vec::new();
        compile(filter, &mut sql, &mut binds)?;
        let rows = apply_binds(sqlx::query(&sql), binds)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let text: String = row.get("v");
                Ok(serde_json::from_str(&text)?)
            })
            .collect()
    }

    pub async fn count(&self, collection: &str, filter: &Filter) -> Result<i64> {
        check_identifier(collection)?;
        let mut sql = format!("SELECT COUNT(*) FROM \"{}\" WHERE ", collection);
        let mut binds = Vec::new();
        compile(filter, &mut sql, &mut binds)?;
        let n: i64 = apply_binds(sqlx::query(&sql), binds)
            .fetch_one(&self.pool)
            .await?
            .get(0);
        Ok(n)
    }

    /// Create an expression index over one or more document fields.
    pub async fn create_index(&self, name: &str, collection: &str, paths: &[&str]) -> Result<()> {
        check_identifier(name)?;
        check_identifier(collection)?;
        if paths.is_empty() {
            bail!("index '{}' needs at least one field", name);
        }
        let mut exprs = Vec::with_capacity(paths.len());
        for p in paths {
            check_path(p)?;
            exprs.push(field_expr("doc", p));
        }
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS \"{}\" ON \"{}\" ({})",
            name,
            collection,
            exprs.join(", ")
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn drop_index(&self, name: &str) -> Result<()> {
        check_identifier(name)?;
        sqlx::query(&format!("DROP INDEX IF EXISTS \"{}\"", name))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn index_exists(&self, name: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Storage footprint of the whole document database.
    pub async fn storage_bytes(&self) -> Result<i64> {
        database_bytes(&self.pool).await
    }

    /// Bytes used by one collection and its indexes.
    ///
    /// Uses the `dbstat` virtual table; when it is unavailable, falls back
    /// to the summed document text length.
    pub async fn collection_bytes(&self, collection: &str) -> Result<i64> {
        check_identifier(collection)?;
        self.require_collection(collection).await?;
        let stat: std::result::Result<Option<i64>, sqlx::Error> = sqlx::query_scalar(
            r#"
            SELECT SUM(pgsize) FROM dbstat
            WHERE name = ?1
               OR name IN (SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1)
            "#,
        )
        .bind(collection)
        .fetch_one(&self.pool)
        .await;
        match stat {
            Ok(bytes) => Ok(bytes.unwrap_or(0)),
            Err(e) => {
                debug!(collection, error = %e, "dbstat unavailable, estimating size");
                let bytes: Option<i64> = sqlx::query_scalar(&format!(
                    "SELECT SUM(length(_id) + length(doc)) FROM \"{}\"",
                    collection
                ))
                .fetch_one(&self.pool)
                .await?;
                Ok(bytes.unwrap_or(0))
            }
        }
    }
}
