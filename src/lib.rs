//! # Pantry Tracker
//!
//! A small pantry inventory: named items with quantities and optional
//! dates, kept in a keyed document collection, searchable by name, with
//! recipe suggestions from a chat-completion API and item labels from an
//! image-classification API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐
//! │   CLI    │   │   HTTP   │
//! │ (pantry) │   │  (axum)  │
//! └────┬─────┘   └────┬─────┘
//!      ▼              │
//! ┌──────────┐        │
//! │   View   │        │
//! │ reducer  │        │
//! └────┬─────┘        │
//!      ▼              ▼
//! ┌─────────────────────────┐     ┌──────────────────┐
//! │        Inventory        │     │ Recipes/Classify │
//! │  read-modify-write+CAS  │     │   (reqwest)      │
//! └────────────┬────────────┘     └──────────────────┘
//!              ▼
//!      ┌───────────────┐
//!      │ DocumentStore │
//!      │ memory/SQLite │
//!      └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pantry init
//! pantry add Eggs --quantity 12 --exp 2025-01-01
//! pantry remove Eggs
//! pantry list --search egg
//! pantry recipes
//! pantry serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Inventory item type and name filter |
//! | [`store`] | Document store trait and backends |
//! | [`inventory`] | Add / remove / list operations |
//! | [`view`] | View state reducer and controller |
//! | [`recipes`] | Chat-completion recipe client |
//! | [`classify`] | Image classification client |
//! | [`capture`] | Image blobs |
//! | [`upstream`] | Shared HTTP retry and API keys |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema setup |

pub mod capture;
pub mod classify;
pub mod config;
pub mod db;
pub mod inventory;
pub mod migrate;
pub mod models;
pub mod recipes;
pub mod server;
pub mod store;
pub mod upstream;
pub mod view;
