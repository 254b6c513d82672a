//! Transactional persistence of parsed batches
//!
//! One transaction per file. The first failing insert rolls the whole batch
//! back, so a file is visible in full or not at all.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};

use crate::error::{IngestError, IngestResult};
use crate::models::{FileCategory, ParsedBatch, SaleOrderHeader, SaleOrderItem, SaleOrderSummary};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist every record of `batch` atomically, returning the count committed
    async fn persist(&self, batch: &ParsedBatch) -> IngestResult<usize>;
}

/// Store backed by the `sale_order_*` tables
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_all(
        tx: &mut Transaction<'_, Postgres>,
        batch: &ParsedBatch,
    ) -> Result<(), (usize, sqlx::Error)> {
        match batch {
            ParsedBatch::Headers(rows) => {
                for (index, row) in rows.iter().enumerate() {
                    insert_header(tx, row).await.map_err(|e| (index, e))?;
                }
            },
            ParsedBatch::Items(rows) => {
                for (index, row) in rows.iter().enumerate() {
                    insert_item(tx, row).await.map_err(|e| (index, e))?;
                }
            },
            ParsedBatch::Summaries(rows) => {
                for (index, row) in rows.iter().enumerate() {
                    insert_summary(tx, row).await.map_err(|e| (index, e))?;
                }
            },
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn persist(&self, batch: &ParsedBatch) -> IngestResult<usize> {
        let category = batch.category();
        if batch.is_empty() {
            debug!(%category, "Empty batch, nothing to persist");
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        if let Err((inserted, source)) = Self::insert_all(&mut tx, batch).await {
            if let Err(e) = tx.rollback().await {
                warn!(%category, "Rollback failed: {}", e);
            }
            return Err(IngestError::Persistence {
                category,
                inserted,
                failed_at: inserted + 1,
                source,
            });
        }

        tx.commit().await?;
        info!(%category, table = category.table(), records = batch.len(), "Committed batch");
        Ok(batch.len())
    }
}

async fn insert_header(
    tx: &mut Transaction<'_, Postgres>,
    row: &SaleOrderHeader,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sale_order_header (
            doc_no, on_date, delivery_date, so_customer_id, customer_name,
            status, territory_code, total_amount, total_vat, remark,
            source_file, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(&row.doc_no)
    .bind(row.on_date)
    .bind(row.delivery_date)
    .bind(&row.so_customer_id)
    .bind(&row.customer_name)
    .bind(&row.status)
    .bind(&row.territory_code)
    .bind(&row.total_amount)
    .bind(&row.total_vat)
    .bind(&row.remark)
    .bind(&row.source_file)
    .bind(row.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_item(
    tx: &mut Transaction<'_, Postgres>,
    row: &SaleOrderItem,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sale_order_item (
            doc_no, item_id, product_code, so_product_id, sku_unit_type_id,
            quantity, price, amount, vat, vat_rate,
            item_type, order_rank, ref_item_id, io_number,
            source_file, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(&row.doc_no)
    .bind(&row.item_id)
    .bind(&row.product_code)
    .bind(&row.so_product_id)
    .bind(&row.sku_unit_type_id)
    .bind(&row.quantity)
    .bind(&row.price)
    .bind(&row.amount)
    .bind(&row.vat)
    .bind(&row.vat_rate)
    .bind(&row.item_type)
    .bind(row.order_rank)
    .bind(&row.ref_item_id)
    .bind(&row.io_number)
    .bind(&row.source_file)
    .bind(row.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_summary(
    tx: &mut Transaction<'_, Postgres>,
    row: &SaleOrderSummary,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sale_order_summary (header_count, item_count, source_file, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(row.header_count)
    .bind(row.item_count)
    .bind(&row.source_file)
    .bind(row.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Rows currently stored for `source_file` in the category's table
pub async fn count_for_source(
    pool: &PgPool,
    category: FileCategory,
    source_file: &str,
) -> IngestResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE source_file = $1", category.table());
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(source_file)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
