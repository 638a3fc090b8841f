//! # Seed Data Generator
//!
//! Populates a development database with a small café menu and the
//! default tax rules.
//!
//! ## Usage
//! ```bash
//! # Seed ./cafe_dev.db (default)
//! cargo run -p cafe-db --bin cafe-seed
//!
//! # Specify database path
//! cargo run -p cafe-db --bin cafe-seed -- ./data/cafe.db
//! cargo run -p cafe-db --bin cafe-seed -- --db ./data/cafe.db
//! ```
//!
//! Each collection is only seeded while it is empty, so running it twice
//! is harmless.

use cafe_core::types::Rate;
use cafe_core::{MenuItem, Money, TaxRule};
use cafe_db::{Database, DbConfig};
use rust_decimal::Decimal;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// `(id, name, category, price in paise)`
const MENU: &[(&str, &str, &str, i64)] = &[
    ("espresso", "Espresso", "Coffee", 9000),
    ("americano", "Americano", "Coffee", 11000),
    ("cappuccino", "Cappuccino", "Coffee", 14000),
    ("latte", "Café Latte", "Coffee", 15000),
    ("cold-brew", "Cold Brew", "Coffee", 17500),
    ("masala-chai", "Masala Chai", "Tea", 6000),
    ("green-tea", "Green Tea", "Tea", 8000),
    ("croissant", "Butter Croissant", "Bakery", 12000),
    ("banana-bread", "Banana Bread", "Bakery", 9500),
    ("veg-sandwich", "Grilled Veg Sandwich", "Food", 18000),
];

/// `(name, percentage in tenths)`
const TAXES: &[(&str, i64)] = &[("CGST", 25), ("SGST", 25)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cafe=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./cafe_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Café Orders Seed Data Generator");
                println!();
                println!("Usage: cafe-seed [OPTIONS] [DB_PATH]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./cafe_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other if !other.starts_with('-') => db_path = other.to_string(),
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let db = Database::new(DbConfig::new(&db_path)).await?;
    info!(path = %db_path, "Connected, migrations applied");

    if db.menu().count().await? == 0 {
        for (id, name, category, paise) in MENU {
            db.menu()
                .insert(&MenuItem {
                    id: id.to_string(),
                    name: name.to_string(),
                    price: Money::from_cents(*paise),
                    category: category.to_string(),
                    in_stock: true,
                })
                .await?;
        }
        info!(items = MENU.len(), "Seeded menu");
    } else {
        info!("Menu already present, skipping");
    }

    if db.taxes().list().await?.is_empty() {
        for (name, tenths) in TAXES {
            let rule = TaxRule::new(*name, Rate::from_percentage(Decimal::new(*tenths, 1)));
            db.taxes().insert(&rule).await?;
        }
        info!(rules = TAXES.len(), "Seeded tax rules");
    } else {
        info!("Tax rules already present, skipping");
    }

    println!("✓ Seed complete: {}", db_path);
    db.close().await;
    Ok(())
}
