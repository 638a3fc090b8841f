//! # Menu Repository
//!
//! The catalog orders are placed from. Prices are stored as decimal text
//! and copied into each order line, so editing the menu never changes a
//! placed order.

use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

use crate::error::DbResult;
use cafe_core::{MenuItem, Money};

#[derive(Debug, FromRow)]
struct MenuRow {
    id: String,
    name: String,
    price: String,
    category: String,
    in_stock: bool,
}

impl TryFrom<MenuRow> for MenuItem {
    type Error = crate::DbError;

    fn try_from(row: MenuRow) -> DbResult<MenuItem> {
        Ok(MenuItem {
            id: row.id,
            name: row.name,
            price: Money::from_str(&row.price)?,
            category: row.category,
            in_stock: row.in_stock,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MenuRepository {
    pool: SqlitePool,
}

impl MenuRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MenuRepository { pool }
    }

    /// Whole catalog, grouped by category then name.
    pub async fn list(&self) -> DbResult<Vec<MenuItem>> {
        let rows: Vec<MenuRow> = sqlx::query_as(
            "SELECT id, name, price, category, in_stock FROM menu_items ORDER BY category, name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MenuItem::try_from).collect()
    }

    /// What a customer can order right now.
    pub async fn list_in_stock(&self) -> DbResult<Vec<MenuItem>> {
        let rows: Vec<MenuRow> = sqlx::query_as(
            r#"
            SELECT id, name, price, category, in_stock
            FROM menu_items
            WHERE in_stock = 1
            ORDER BY category, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MenuItem::try_from).collect()
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<MenuItem>> {
        let row: Option<MenuRow> = sqlx::query_as(
            "SELECT id, name, price, category, in_stock FROM menu_items WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MenuItem::try_from).transpose()
    }

    pub async fn insert(&self, item: &MenuItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO menu_items (id, name, price, category, in_stock)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(item.price.amount().to_string())
        .bind(&item.category)
        .bind(item.in_stock)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use cafe_core::OrderLine;

    fn item(id: &str, name: &str, price: Money, in_stock: bool) -> MenuItem {
        MenuItem {
            id: id.to_string(),
            name: name.to_string(),
            price,
            category: "Coffee".to_string(),
            in_stock,
        }
    }

    #[tokio::test]
    async fn test_in_stock_filter_and_snapshot() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().menu();
        repo.insert(&item("latte", "Latte", Money::from_cents(14050), true))
            .await
            .unwrap();
        repo.insert(&item("mocha", "Mocha", Money::from_major(160), false))
            .await
            .unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
        let available = repo.list_in_stock().await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].price, Money::from_cents(14050));

        let mocha = repo.get("mocha").await.unwrap().unwrap();
        assert!(OrderLine::from_menu_item(&mocha, 1).is_err());
        assert!(repo.get("nope").await.unwrap().is_none());
    }
}
