//! # Repository Module
//!
//! One repository per collection. Each is a thin, cloneable wrapper
//! around the pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Collections                                          │
//! │                                                                         │
//! │  OrderHub (cafe-sync)                                                  │
//! │       │                                                                 │
//! │       │  db.orders().replace(&order, expected_version)                 │
//! │       ▼                                                                 │
//! │  OrderRepository                                                       │
//! │  ├── get / list / count                                                │
//! │  ├── insert          (fails on a duplicate id)                         │
//! │  ├── replace         (compare-and-swap on `version`)                   │
//! │  └── delete_many     (explicit purge)                                  │
//! │                                                                         │
//! │  TaxRepository       list · insert · update · delete                   │
//! │  MenuRepository      list · list_in_stock · get · insert               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`OrderRepository`](order::OrderRepository) - Order documents
//! - [`TaxRepository`](tax::TaxRepository) - The tax registry
//! - [`MenuRepository`](menu::MenuRepository) - Menu catalog

pub mod menu;
pub mod order;
pub mod tax;
