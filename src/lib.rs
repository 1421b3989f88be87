// ============================================================================
// RolnoDB Library
// ============================================================================

//! Embedded JSON document store.
//!
//! Each collection is one JSON file, held in memory and rewritten atomically
//! on every mutation under a per-file lock. A [`DatabaseManager`] hands out
//! one engine per collection; [`UserStore`] puts a TTL cache in front of the
//! user collection.
//!
//! ```no_run
//! use rolnodb::{DatabaseManager, StoreConfig};
//! use serde_json::json;
//!
//! # async fn run() -> rolnodb::Result<()> {
//! let manager = DatabaseManager::new(StoreConfig::new("data"));
//! let fields = manager.fields().await?;
//! let created = fields
//!     .add(rolnodb::core::types::into_record(json!({"userId": 1, "name": "north"}))?)
//!     .await?;
//! assert_eq!(created["id"], 1);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod manager;
pub mod storage;
pub mod users;

pub use cache::{CacheStatus, CollectionSource, ReadThroughCache};
pub use config::StoreConfig;
pub use core::{DbError, EntityId, Record, Result};
pub use manager::{CollectionKind, DatabaseManager, HealthReport, HealthStatus, StoreBackup};
pub use storage::{
    CollectionShape, CollectionStatus, JsonCollection, LockRegistry, SectionKind,
    ValidationReport, ValidationStatus,
};
pub use users::{CascadeTarget, NewUser, UserStore, cascade_delete};
