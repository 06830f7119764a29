//! # kbsync
//!
//! A content synchronization engine. It pulls themed editorial content from
//! an external knowledge base (or a local vault of markdown files),
//! classifies it, and reconciles it into a local SQLite content store,
//! keeping a ledger of every sync run and every unit it touched.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌─────────────┐   ┌─────────────┐
//! │   ThemeSource    │──▶│    sync     │──▶│ ContentStore│
//! │ KnowledgeClient  │   │  + convert  │   │   SQLite    │
//! │      Vault       │   └─────────────┘   │  + ledger   │
//! └──────────────────┘                     └──────┬──────┘
//!                                                 │
//!                      ┌──────────────────────────┤
//!                      ▼                          ▼
//!                 ┌──────────┐             ┌────────────┐
//!                 │   CLI    │             │  trigger   │
//!                 │ (kbsync) │             │ JSON shapes│
//!                 └──────────┘             └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kbsync init                          # create database
//! kbsync sync --source vault --dry-run # preview a vault import
//! kbsync sync --source api --format M  # import master texts from the API
//! kbsync status
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Library error type |
//! | [`models`] | External and local data types |
//! | [`client`] | Knowledge-base HTTP client |
//! | [`vault`] | Local vault importer |
//! | [`source`] | The `ThemeSource` seam |
//! | [`convert`] | External content → local content |
//! | [`store`] | Content store and sync ledger |
//! | [`sync`] | Sync orchestrator |
//! | [`trigger`] | Validated trigger and status reports |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod client;
pub mod config;
pub mod convert;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod source;
pub mod sources;
pub mod stats;
pub mod store;
pub mod sync;
pub mod trigger;
pub mod vault;
pub mod vault_cmd;
