//! # Tax Repository
//!
//! The café-wide tax registry. Rules keep the order they were added in,
//! which is also the order tax lines appear on a bill.

use rust_decimal::Decimal;
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::debug;

use crate::error::{DbError, DbResult};
use cafe_core::types::Rate;
use cafe_core::TaxRule;

#[derive(Debug, FromRow)]
struct TaxRow {
    id: String,
    name: String,
    percentage: String,
}

impl TryFrom<TaxRow> for TaxRule {
    type Error = DbError;

    fn try_from(row: TaxRow) -> DbResult<TaxRule> {
        Ok(TaxRule {
            id: row.id,
            name: row.name,
            percentage: Rate::from_percentage(Decimal::from_str(&row.percentage)?),
        })
    }
}

/// Repository for the `taxes` collection.
#[derive(Debug, Clone)]
pub struct TaxRepository {
    pool: SqlitePool,
}

impl TaxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TaxRepository { pool }
    }

    /// All rules in insertion order.
    pub async fn list(&self) -> DbResult<Vec<TaxRule>> {
        let rows: Vec<TaxRow> =
            sqlx::query_as("SELECT id, name, percentage FROM taxes ORDER BY position, id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TaxRule::try_from).collect()
    }

    /// Appends a rule after every existing one.
    pub async fn insert(&self, rule: &TaxRule) -> DbResult<()> {
        debug!(tax_id = %rule.id, name = %rule.name, "Inserting tax rule");

        sqlx::query(
            r#"
            INSERT INTO taxes (id, name, percentage, position)
            VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(position), 0) + 1 FROM taxes))
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(rule.percentage.percentage().to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Overwrites name and percentage of an existing rule.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - No rule with that id
    pub async fn update(&self, rule: &TaxRule) -> DbResult<()> {
        let result = sqlx::query("UPDATE taxes SET name = ?2, percentage = ?3 WHERE id = ?1")
            .bind(&rule.id)
            .bind(&rule.name)
            .bind(rule.percentage.percentage().to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TaxRule", &rule.id));
        }
        Ok(())
    }

    /// Removes a rule.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - No rule with that id
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM taxes WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TaxRule", id));
        }
        Ok(())
    }
}
