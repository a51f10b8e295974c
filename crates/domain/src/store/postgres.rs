use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProductId;
use sqlx::{PgPool, Row, postgres::PgRow};

use super::ProductStore;
use crate::product::validate_price;
use crate::{NewProduct, Product, ProductError, ProductStatus, Result, slugify};

const PRODUCT_COLUMNS: &str =
    "id, name, description, slug, price, image_url, status, created_at, updated_at";

/// PostgreSQL-backed product store.
#[derive(Clone)]
pub struct PostgresProductStore {
    pool: PgPool,
}

impl PostgresProductStore {
    /// Creates a new PostgreSQL product store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<ProductStatus>()
            .map_err(ProductError::Storage)?;

        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            slug: row.try_get("slug")?,
            price: row.try_get("price")?,
            image_url: row.try_get("image_url")?,
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn map_unique_violation(e: sqlx::Error, slug: &str) -> ProductError {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.constraint() == Some("unique_product_slug")
        {
            return ProductError::AlreadyExists(slug.to_string());
        }
        ProductError::Database(e)
    }

    async fn insert(&self, new: &NewProduct, status: ProductStatus) -> Result<Product> {
        new.validate()?;
        let slug = slugify(&new.name);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (name, description, slug, price, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.description)
        .bind(&slug)
        .bind(new.price)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::map_unique_violation(e, &slug))?;

        Self::row_to_product(row)
    }

    /// Runs a guarded `UPDATE ... SET status` and reports the row count.
    async fn transition(
        &self,
        id: ProductId,
        expected: ProductStatus,
        to: ProductStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(to.as_str())
        .bind(id.as_i32())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(%id, %expected, %to, "guarded transition matched no row");
            return Err(ProductError::InvalidState { id, expected });
        }
        Ok(())
    }

    /// Runs a guarded `DELETE` and returns whether a row matched.
    async fn remove(&self, id: ProductId, expected: ProductStatus) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND status = $2")
            .bind(id.as_i32())
            .bind(expected.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    async fn begin_create(&self, product: &NewProduct) -> Result<Product> {
        self.insert(product, ProductStatus::Pending).await
    }

    async fn create_active(&self, product: &NewProduct) -> Result<Product> {
        self.insert(product, ProductStatus::Active).await
    }

    async fn complete_create(&self, id: ProductId) -> Result<()> {
        self.transition(id, ProductStatus::Pending, ProductStatus::Active)
            .await
    }

    async fn rollback_create(&self, id: ProductId) -> Result<()> {
        if self.remove(id, ProductStatus::Pending).await? {
            Ok(())
        } else {
            Err(ProductError::NotFound(id))
        }
    }

    async fn begin_delete(&self, id: ProductId) -> Result<()> {
        self.transition(id, ProductStatus::Active, ProductStatus::Deleting)
            .await
    }

    async fn complete_delete(&self, id: ProductId) -> Result<()> {
        if self.remove(id, ProductStatus::Deleting).await? {
            Ok(())
        } else {
            Err(ProductError::InvalidState {
                id,
                expected: ProductStatus::Deleting,
            })
        }
    }

    async fn rollback_delete(&self, id: ProductId) -> Result<()> {
        self.transition(id, ProductStatus::Deleting, ProductStatus::Active)
            .await
    }

    async fn update(&self, product: &Product) -> Result<Product> {
        validate_price(product.price)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET name = $1, description = $2, slug = $3, price = $4, updated_at = NOW()
            WHERE id = $5
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.slug)
        .bind(product.price)
        .bind(product.id.as_i32())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_unique_violation(e, &product.slug))?
        .ok_or(ProductError::NotFound(product.id))?;

        Self::row_to_product(row)
    }

    async fn update_image_url(&self, id: ProductId, url: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE products SET image_url = $1, updated_at = NOW() WHERE id = $2")
                .bind(url)
                .bind(id.as_i32())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(ProductError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list(&self, status: Option<ProductStatus>) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE $1::TEXT IS NULL OR status = $1
            ORDER BY id ASC
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn find_stale(
        &self,
        statuses: &[ProductStatus],
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Product>> {
        let statuses: Vec<&str> = statuses.iter().map(ProductStatus::as_str).collect();

        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE status = ANY($1) AND updated_at < $2
            ORDER BY updated_at ASC
            "#
        ))
        .bind(&statuses)
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }
}
