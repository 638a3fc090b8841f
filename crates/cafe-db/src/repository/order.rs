//! # Order Repository
//!
//! Orders are stored as whole JSON documents. A handful of fields are
//! copied into columns so the store can filter and order without parsing
//! every document.
//!
//! ## Compare-and-Swap
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Versioned Replace                                    │
//! │                                                                         │
//! │  Cashier A reads order v4          Cashier B reads order v4            │
//! │       │                                 │                               │
//! │       ▼                                 ▼                               │
//! │  UPDATE … WHERE id=? AND version=4  UPDATE … WHERE id=? AND version=4  │
//! │       │                                 │                               │
//! │       ▼                                 ▼                               │
//! │  1 row  → committed as v5           0 rows → lost; reload and retry    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use cafe_core::Order;

#[derive(Debug, FromRow)]
struct DocRow {
    doc: String,
}

/// Repository for the `orders` collection.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by id.
    ///
    /// ## Returns
    /// * `Ok(Some(Order))` - Order found
    /// * `Ok(None)` - No such order (never created, or purged)
    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let row: Option<DocRow> = sqlx::query_as("SELECT doc FROM orders WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| decode(&r.doc)).transpose()
    }

    /// Every order, oldest first.
    pub async fn list(&self) -> DbResult<Vec<Order>> {
        let rows: Vec<DocRow> =
            sqlx::query_as("SELECT doc FROM orders ORDER BY created_at_ms, id")
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(|r| decode(&r.doc)).collect()
    }

    /// Inserts a brand-new order.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - An order with this id exists
    pub async fn insert(&self, order: &Order) -> DbResult<()> {
        debug!(order_id = %order.id, "Inserting order");

        let doc = serde_json::to_string(order)?;
        sqlx::query(
            r#"
            INSERT INTO orders (id, version, status, created_at_ms, updated_at_ms, doc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&order.id)
        .bind(version_column(order.version)?)
        .bind(order.status.as_str())
        .bind(millis(order.created_at))
        .bind(millis(order.updated_at))
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &order.id),
            other => other,
        })?;

        Ok(())
    }

    /// Replaces the stored order only if its version is still
    /// `expected_version`.
    ///
    /// ## Returns
    /// * `Ok(true)` - Committed
    /// * `Ok(false)` - Someone else committed first, or the order is gone
    pub async fn replace(&self, order: &Order, expected_version: u64) -> DbResult<bool> {
        let doc = serde_json::to_string(order)?;
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                version = ?1,
                status = ?2,
                updated_at_ms = ?3,
                doc = ?4
            WHERE id = ?5 AND version = ?6
            "#,
        )
        .bind(version_column(order.version)?)
        .bind(order.status.as_str())
        .bind(millis(order.updated_at))
        .bind(doc)
        .bind(&order.id)
        .bind(version_column(expected_version)?)
        .execute(&self.pool)
        .await?;

        let committed = result.rows_affected() == 1;
        debug!(
            order_id = %order.id,
            expected_version,
            committed,
            "Versioned replace"
        );
        Ok(committed)
    }

    /// Deletes the given orders in one transaction. Unknown ids are skipped.
    ///
    /// ## Returns
    /// Number of orders actually removed.
    pub async fn delete_many(&self, ids: &[String]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for id in ids {
            removed += sqlx::query("DELETE FROM orders WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        debug!(requested = ids.len(), removed, "Deleted orders");
        Ok(removed)
    }

    pub async fn count(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn decode(doc: &str) -> DbResult<Order> {
    Ok(serde_json::from_str(doc)?)
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn version_column(version: u64) -> DbResult<i64> {
    i64::try_from(version).map_err(|_| DbError::Internal(format!("version {version} overflows")))
}

// =============================================================================
// Unit Tests
// =============================================================================
