//! PostgreSQL-backed document store.
//!
//! Each collection is one table with a JSONB document column plus the
//! columns the store conditions on (version, stock, filter fields). The
//! conditional stock `UPDATE` and the version-guarded writes are what give
//! the [`Store`] contract its atomicity here.

use async_trait::async_trait;
use common::{OrderId, Page, Paginated, ProductId, UserId};
use model::{Order, Product, User};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{OrderFilter, ProductFilter, Result, Store, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id UUID PRIMARY KEY,
    version BIGINT NOT NULL,
    count_in_stock BIGINT NOT NULL CHECK (count_in_stock >= 0),
    category TEXT NOT NULL,
    brand TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    doc JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_products_category ON products (category);
CREATE INDEX IF NOT EXISTS idx_products_brand ON products (brand);

CREATE TABLE IF NOT EXISTS orders (
    id UUID PRIMARY KEY,
    version BIGINT NOT NULL,
    user_id UUID NOT NULL,
    is_paid BOOLEAN NOT NULL,
    is_delivered BOOLEAN NOT NULL,
    is_canceled BOOLEAN NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    doc JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    version BIGINT NOT NULL,
    email TEXT NOT NULL,
    doc JSONB NOT NULL,
    CONSTRAINT users_email_unique UNIQUE (email)
);
"#;

/// PostgreSQL document store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database and wraps the pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the tables and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::debug!("database schema ensured");
        Ok(())
    }

    fn row_to_doc<T: serde::de::DeserializeOwned>(row: &PgRow) -> Result<T> {
        let doc: serde_json::Value = row.try_get("doc")?;
        Ok(serde_json::from_value(doc)?)
    }
}

fn duplicate_if(e: sqlx::Error, constraint: &str, make: impl FnOnce() -> StoreError) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some(constraint)
    {
        return make();
    }
    StoreError::Database(e)
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let doc = serde_json::to_value(product)?;
        sqlx::query(
            r#"
            INSERT INTO products (id, version, count_in_stock, category, brand, name, created_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.version as i64)
        .bind(product.count_in_stock as i64)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(&product.name)
        .bind(product.created_at)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            duplicate_if(e, "products_pkey", || StoreError::Duplicate {
                collection: "products",
                id: product.id.to_string(),
            })
        })?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT doc FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_doc).transpose()
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<Paginated<Product>> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM products
            WHERE ($1::text IS NULL OR category = $1)
              AND ($2::text IS NULL OR brand = $2)
              AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%')
            "#,
        )
        .bind(filter.category.as_deref())
        .bind(filter.brand.as_deref())
        .bind(filter.keyword.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT doc FROM products
            WHERE ($1::text IS NULL OR category = $1)
              AND ($2::text IS NULL OR brand = $2)
              AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%')
            ORDER BY created_at DESC, id
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.category.as_deref())
        .bind(filter.brand.as_deref())
        .bind(filter.keyword.as_deref())
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(Self::row_to_doc)
            .collect::<Result<Vec<Product>>>()?;
        Ok(Paginated::new(items, page, total as u64))
    }

    async fn put_product(&self, product: &Product) -> Result<Product> {
        let mut updated = product.clone();
        updated.version += 1;
        let doc = serde_json::to_value(&updated)?;

        let result = sqlx::query(
            r#"
            UPDATE products
            SET version = $3, count_in_stock = $4, category = $5, brand = $6, name = $7, doc = $8
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.version as i64)
        .bind(updated.version as i64)
        .bind(updated.count_in_stock as i64)
        .bind(&updated.category)
        .bind(&updated.brand)
        .bind(&updated.name)
        .bind(doc)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
                    .bind(product.id.as_uuid())
                    .fetch_one(&self.pool)
                    .await?;
            return Err(if exists {
                StoreError::VersionConflict {
                    collection: "products",
                    id: product.id.to_string(),
                }
            } else {
                StoreError::NotFound {
                    collection: "products",
                    id: product.id.to_string(),
                }
            });
        }

        Ok(updated)
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<u32> {
        // Single conditional UPDATE; column references on the right-hand
        // side read the pre-update values, so the JSONB mirror stays in
        // sync with the counter and the version column.
        let new_stock: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET count_in_stock = count_in_stock + $2,
                version = version + 1,
                doc = jsonb_set(
                    jsonb_set(doc, '{count_in_stock}', to_jsonb(count_in_stock + $2)),
                    '{version}', to_jsonb(version + 1))
            WHERE id = $1 AND count_in_stock + $2 >= 0
            RETURNING count_in_stock
            "#,
        )
        .bind(id.as_uuid())
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        match new_stock {
            Some(stock) => Ok(stock as u32),
            None => {
                let available: Option<i64> =
                    sqlx::query_scalar("SELECT count_in_stock FROM products WHERE id = $1")
                        .bind(id.as_uuid())
                        .fetch_optional(&self.pool)
                        .await?;
                match available {
                    Some(available) => Err(StoreError::StockConflict {
                        product_id: id,
                        requested: (-delta).max(0) as u32,
                        available: available as u32,
                    }),
                    None => Err(StoreError::NotFound {
                        collection: "products",
                        id: id.to_string(),
                    }),
                }
            }
        }
    }

    async fn product_categories(&self) -> Result<Vec<String>> {
        let categories =
            sqlx::query_scalar("SELECT DISTINCT category FROM products ORDER BY category")
                .fetch_all(&self.pool)
                .await?;
        Ok(categories)
    }

    async fn product_brands(&self) -> Result<Vec<String>> {
        let brands = sqlx::query_scalar("SELECT DISTINCT brand FROM products ORDER BY brand")
            .fetch_all(&self.pool)
            .await?;
        Ok(brands)
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let doc = serde_json::to_value(order)?;
        sqlx::query(
            r#"
            INSERT INTO orders (id, version, user_id, is_paid, is_delivered, is_canceled, created_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.version as i64)
        .bind(order.user.as_uuid())
        .bind(order.is_paid)
        .bind(order.is_delivered)
        .bind(order.is_canceled)
        .bind(order.created_at)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            duplicate_if(e, "orders_pkey", || StoreError::Duplicate {
                collection: "orders",
                id: order.id.to_string(),
            })
        })?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT doc FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_doc).transpose()
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<Paginated<Order>> {
        let user: Option<Uuid> = filter.user.map(|u| u.as_uuid());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::boolean IS NULL OR is_paid = $2)
              AND ($3::boolean IS NULL OR is_delivered = $3)
              AND ($4::boolean IS NULL OR is_canceled = $4)
            "#,
        )
        .bind(user)
        .bind(filter.is_paid)
        .bind(filter.is_delivered)
        .bind(filter.is_canceled)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT doc FROM orders
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::boolean IS NULL OR is_paid = $2)
              AND ($3::boolean IS NULL OR is_delivered = $3)
              AND ($4::boolean IS NULL OR is_canceled = $4)
            ORDER BY created_at DESC, id
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(user)
        .bind(filter.is_paid)
        .bind(filter.is_delivered)
        .bind(filter.is_canceled)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(Self::row_to_doc)
            .collect::<Result<Vec<Order>>>()?;
        Ok(Paginated::new(items, page, total as u64))
    }

    async fn put_order(&self, order: &Order) -> Result<Order> {
        let mut updated = order.clone();
        updated.version += 1;
        let doc = serde_json::to_value(&updated)?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET version = $3, is_paid = $4, is_delivered = $5, is_canceled = $6, doc = $7
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.version as i64)
        .bind(updated.version as i64)
        .bind(updated.is_paid)
        .bind(updated.is_delivered)
        .bind(updated.is_canceled)
        .bind(doc)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
                    .bind(order.id.as_uuid())
                    .fetch_one(&self.pool)
                    .await?;
            return Err(if exists {
                StoreError::VersionConflict {
                    collection: "orders",
                    id: order.id.to_string(),
                }
            } else {
                StoreError::NotFound {
                    collection: "orders",
                    id: order.id.to_string(),
                }
            });
        }

        Ok(updated)
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let doc = serde_json::to_value(user)?;
        sqlx::query("INSERT INTO users (id, version, email, doc) VALUES ($1, $2, $3, $4)")
            .bind(user.id.as_uuid())
            .bind(user.version as i64)
            .bind(&user.email)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                duplicate_if(e, "users_email_unique", || StoreError::DuplicateEmail {
                    email: user.email.clone(),
                })
            })?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT doc FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_doc).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT doc FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_doc).transpose()
    }
}
