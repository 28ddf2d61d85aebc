//! # Search Sync
//!
//! Keeps an external search service consistent with the forum's primary
//! store. Five source collections (posts, comments, users, sequences,
//! tags) are mirrored into per-kind indices behind stable aliases.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ Primary store │──▶│   Transformers    │──▶│ Diff engine  │
//! │   (SQLite)    │   │ eligibility+shard │   │ mget+bulk    │
//! └──────────────┘   └──────────────────┘   └──────┬───────┘
//!                                                  │
//!                                                  ▼
//!                                          ┌──────────────┐
//!                                          │Search backend│
//!                                          │ (aliased ix) │
//!                                          └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ssync init all                # create aliased indices
//! ssync sync posts              # full export of one collection
//! ssync sync-one post <id>      # resync a single entity
//! ssync indices                 # status table
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`shard`] | Shard id scheme |
//! | [`convert`] | HTML to plain text |
//! | [`store`] | Primary store access (SQLite) |
//! | [`backend`] | Search backend abstraction |
//! | [`transform`] | Per-kind entity-to-document transformers |
//! | [`diff`] | Change detection before bulk writes |
//! | [`reconcile`] | Shard deletion and tail trimming |
//! | [`sync`] | Full-collection batch synchronizer |
//! | [`incremental`] | Single-entity write-path sync |
//! | [`lifecycle`] | Index creation and zero-downtime migration |
//! | [`status`] | Index status listing |

pub mod backend;
pub mod config;
pub mod convert;
pub mod diff;
pub mod incremental;
pub mod lifecycle;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod shard;
pub mod status;
pub mod store;
pub mod sync;
pub mod transform;
