//! PostgreSQL document store: one JSONB document per row, keyed by id, with
//! expression indexes for slug, SKU and parent lookups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Object, Pool, PoolConfig, Runtime};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{Json, ToSql};
use tokio_postgres::{NoTls, Row};
use tracing::info;

use crate::category::Category;
use crate::error::{StoreError, StoreResult};
use crate::identity::{CategoryId, ProductId};
use crate::product::{Product, ProductStatus};
use crate::store::{CategoryFilter, CategoryStore, ParentFilter, ProductFilter, ProductStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id  TEXT PRIMARY KEY,
    doc JSONB NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS categories_slug_key ON categories ((doc->>'slug'));
CREATE INDEX IF NOT EXISTS categories_parent_idx ON categories ((doc->>'parent'));

CREATE TABLE IF NOT EXISTS products (
    id  TEXT PRIMARY KEY,
    doc JSONB NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS products_slug_key ON products ((doc->>'slug'));
CREATE UNIQUE INDEX IF NOT EXISTS products_sku_key ON products ((doc->>'sku'));
CREATE INDEX IF NOT EXISTS products_category_idx
    ON products ((doc->>'category'), (doc->>'status'));
"#;

const DETACH_CATEGORY: &str = r#"
UPDATE products SET doc = jsonb_set(
    jsonb_set(
        CASE WHEN doc->>'category' = $1
             THEN jsonb_set(doc, '{category}', 'null'::jsonb)
             ELSE doc END,
        '{subcategories}',
        COALESCE(
            (SELECT jsonb_agg(s) FROM jsonb_array_elements(doc->'subcategories') s
              WHERE s #>> '{}' <> $1),
            '[]'::jsonb)
    ),
    '{updated_at}', $2)
WHERE doc->>'category' = $1 OR doc->'subcategories' ? $1
"#;

/// Pooled PostgreSQL implementation of both store ports.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub async fn connect(url: &str, pool_size: usize) -> StoreResult<Self> {
        let mut cfg = Config::new();
        cfg.url = Some(url.to_string());
        cfg.pool = Some(PoolConfig::new(pool_size.max(1)));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Backend(format!("cannot create pool: {e}")))?;
        let store = Self { pool };
        store.migrate().await?;
        info!("Connected to PostgreSQL document store (pool size {})", pool_size);
        Ok(store)
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        let client = self.client().await?;
        client.batch_execute(SCHEMA).await.map_err(backend)?;
        Ok(())
    }

    async fn client(&self) -> StoreResult<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Backend(format!("pool unavailable: {e}")))
    }

    async fn fetch_one<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> StoreResult<Option<T>> {
        let client = self.client().await?;
        let row = client.query_opt(sql, params).await.map_err(backend)?;
        row.map(|r| decode(&r)).transpose()
    }

    async fn fetch_all<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[String],
    ) -> StoreResult<Vec<T>> {
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let client = self.client().await?;
        let rows = client.query(sql, &refs).await.map_err(backend)?;
        rows.iter().map(decode).collect()
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StoreResult<u64> {
        let client = self.client().await?;
        client.execute(sql, params).await.map_err(write_error)
    }
}

fn decode<T: DeserializeOwned>(row: &Row) -> StoreResult<T> {
    let Json(doc): Json<T> = row.try_get(0).map_err(backend)?;
    Ok(doc)
}

fn backend(e: tokio_postgres::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Unique violations carry the constraint name (`products_sku_key`, ...).
fn write_error(e: tokio_postgres::Error) -> StoreError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        let constraint = e
            .as_db_error()
            .and_then(|db| db.constraint())
            .unwrap_or("unique key");
        return StoreError::Duplicate(constraint.to_string());
    }
    backend(e)
}

/// The serialized (snake_case) form of a unit enum.
fn enum_text<T: Serialize>(value: &T) -> StoreResult<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// Accumulates `doc->>'field' = $n` conditions with text parameters.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    params: Vec<String>,
}

impl Conditions {
    fn eq(&mut self, expr: &str, value: String) {
        self.params.push(value);
        self.clauses.push(format!("{expr} = ${}", self.params.len()));
    }

    fn raw(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn page_sql(skip: usize, limit: Option<usize>) -> String {
    match limit {
        Some(limit) => format!("OFFSET {skip} LIMIT {limit}"),
        None => format!("OFFSET {skip}"),
    }
}

#[async_trait]
impl CategoryStore for PgStore {
    async fn get(&self, id: &CategoryId) -> StoreResult<Option<Category>> {
        self.fetch_one("SELECT doc FROM categories WHERE id = $1", &[&id.as_str()])
            .await
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        self.fetch_one("SELECT doc FROM categories WHERE doc->>'slug' = $1", &[&slug])
            .await
    }

    async fn children(&self, parent: &CategoryId) -> StoreResult<Vec<Category>> {
        self.fetch_all(
            "SELECT doc FROM categories WHERE doc->>'parent' = $1 \
             ORDER BY (doc->>'display_order')::int, doc->>'name'",
            &[parent.to_string()],
        )
        .await
    }

    async fn list(&self, filter: &CategoryFilter) -> StoreResult<Vec<Category>> {
        let mut cond = Conditions::default();
        match &filter.parent {
            ParentFilter::Any => {}
            ParentFilter::Root => cond.raw("doc->>'parent' IS NULL"),
            ParentFilter::Under(id) => cond.eq("doc->>'parent'", id.to_string()),
        }
        if let Some(level) = filter.level {
            cond.eq("doc->>'level'", level.to_string());
        }
        if let Some(status) = &filter.status {
            cond.eq("doc->>'status'", enum_text(status)?);
        }
        if filter.empty_only {
            cond.raw("(doc->'stats'->>'product_count')::bigint = 0");
        }
        let sql = format!(
            "SELECT doc FROM categories {} \
             ORDER BY (doc->>'level')::int, (doc->>'display_order')::int, doc->>'name' {}",
            cond.where_sql(),
            page_sql(filter.skip, filter.limit)
        );
        self.fetch_all(&sql, &cond.params).await
    }

    async fn insert(&self, category: &Category) -> StoreResult<()> {
        self.execute(
            "INSERT INTO categories (id, doc) VALUES ($1, $2)",
            &[&category.id.as_str(), &Json(category)],
        )
        .await?;
        Ok(())
    }

    async fn replace(&self, category: &Category) -> StoreResult<bool> {
        let n = self
            .execute(
                "UPDATE categories SET doc = $2 WHERE id = $1",
                &[&category.id.as_str(), &Json(category)],
            )
            .await?;
        Ok(n > 0)
    }

    async fn set_hierarchy(
        &self,
        id: &CategoryId,
        ancestors: &[CategoryId],
        level: u8,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let n = self
            .execute(
                "UPDATE categories SET doc = jsonb_set(jsonb_set(jsonb_set(doc, \
                 '{ancestors}', $2), '{level}', $3), '{updated_at}', $4) WHERE id = $1",
                &[&id.as_str(), &Json(ancestors), &Json(level), &Json(at)],
            )
            .await?;
        Ok(n > 0)
    }

    async fn set_product_count(
        &self,
        id: &CategoryId,
        count: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let n = self
            .execute(
                "UPDATE categories SET doc = jsonb_set(jsonb_set(doc, \
                 '{stats,product_count}', $2), '{stats,last_updated}', $3) WHERE id = $1",
                &[&id.as_str(), &Json(count), &Json(at)],
            )
            .await?;
        Ok(n > 0)
    }

    async fn delete(&self, id: &CategoryId) -> StoreResult<bool> {
        let n = self
            .execute("DELETE FROM categories WHERE id = $1", &[&id.as_str()])
            .await?;
        Ok(n > 0)
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn get(&self, id: &ProductId) -> StoreResult<Option<Product>> {
        self.fetch_one("SELECT doc FROM products WHERE id = $1", &[&id.as_str()])
            .await
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        self.fetch_one("SELECT doc FROM products WHERE doc->>'slug' = $1", &[&slug])
            .await
    }

    async fn find_by_sku(&self, sku: &str) -> StoreResult<Option<Product>> {
        self.fetch_one("SELECT doc FROM products WHERE doc->>'sku' = $1", &[&sku])
            .await
    }

    async fn list(&self, filter: &ProductFilter) -> StoreResult<Vec<Product>> {
        let mut cond = Conditions::default();
        if let Some(category) = &filter.category {
            cond.eq("doc->>'category'", category.to_string());
        }
        if let Some(status) = &filter.status {
            cond.eq("doc->>'status'", enum_text(status)?);
        }
        if let Some(visibility) = &filter.visibility {
            cond.eq("doc->>'visibility'", enum_text(visibility)?);
        }
        let sql = format!(
            "SELECT doc FROM products {} \
             ORDER BY (doc->>'created_at')::timestamptz DESC, id {}",
            cond.where_sql(),
            page_sql(filter.skip, filter.limit)
        );
        self.fetch_all(&sql, &cond.params).await
    }

    async fn count_published(
        &self,
        category: &CategoryId,
        excluding: Option<&ProductId>,
    ) -> StoreResult<u64> {
        let published = enum_text(&ProductStatus::Published)?;
        let excluding = excluding.map(ProductId::as_str);
        let client = self.client().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM products WHERE doc->>'category' = $1 \
                 AND doc->>'status' = $2 AND ($3::text IS NULL OR id <> $3)",
                &[&category.as_str(), &published, &excluding],
            )
            .await
            .map_err(backend)?;
        let count: i64 = row.try_get(0).map_err(backend)?;
        Ok(count.max(0) as u64)
    }

    async fn insert(&self, product: &Product) -> StoreResult<()> {
        self.execute(
            "INSERT INTO products (id, doc) VALUES ($1, $2)",
            &[&product.id.as_str(), &Json(product)],
        )
        .await?;
        Ok(())
    }

    async fn replace(&self, product: &Product) -> StoreResult<bool> {
        let n = self
            .execute(
                "UPDATE products SET doc = $2 WHERE id = $1",
                &[&product.id.as_str(), &Json(product)],
            )
            .await?;
        Ok(n > 0)
    }

    async fn delete(&self, id: &ProductId) -> StoreResult<bool> {
        let n = self
            .execute("DELETE FROM products WHERE id = $1", &[&id.as_str()])
            .await?;
        Ok(n > 0)
    }

    async fn detach_category(&self, category: &CategoryId) -> StoreResult<u64> {
        self.execute(DETACH_CATEGORY, &[&category.as_str(), &Json(Utc::now())])
            .await
    }
}
