//! Collection registry.
//!
//! [`DatabaseManager`] owns exactly one [`JsonCollection`] per collection
//! name, constructing and loading it the first time it is asked for. It is
//! built once by the application and shared by reference; there is no
//! process-global instance.

pub mod backup;
pub mod health;
pub mod registry;

pub use backup::{ReloadSummary, StoreBackup};
pub use health::{HealthReport, HealthStatus, MemoryStats};
pub use registry::CollectionKind;

use crate::config::StoreConfig;
use crate::core::types::now_timestamp;
use crate::core::{DbError, Result};
use crate::storage::{
    CollectionShape, CollectionStatus, JsonCollection, LockRegistry, ValidationReport,
};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// A registered engine and whether its first load has completed.
struct Slot {
    collection: Arc<JsonCollection>,
    loaded: OnceCell<()>,
}

impl Slot {
    fn ready(&self) -> Option<Arc<JsonCollection>> {
        self.loaded
            .initialized()
            .then(|| Arc::clone(&self.collection))
    }
}

pub struct DatabaseManager {
    config: StoreConfig,
    locks: Arc<LockRegistry>,
    instances: Mutex<BTreeMap<String, Arc<Slot>>>,
    started_at: Instant,
}

impl DatabaseManager {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            locks: Arc::new(LockRegistry::new()),
            instances: Mutex::new(BTreeMap::new()),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The engine for a built-in collection, created and loaded on first use.
    pub async fn collection(&self, kind: CollectionKind) -> Result<Arc<JsonCollection>> {
        self.get_or_init(kind.name(), self.config.path_for(kind.file_name()), kind.shape())
            .await
    }

    pub async fn users(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Users).await
    }

    pub async fn financial(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Financial).await
    }

    pub async fn marketplace(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Marketplace).await
    }

    pub async fn feature_flags(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::FeatureFlags).await
    }

    pub async fn fields(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Fields).await
    }

    pub async fn staff(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Staff).await
    }

    pub async fn animals(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Animals).await
    }

    pub async fn assignments(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Assignments).await
    }

    pub async fn messages(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Messages).await
    }

    pub async fn commodities(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Commodities).await
    }

    pub async fn docs(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Docs).await
    }

    pub async fn contacts(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Contacts).await
    }

    pub async fn test(&self) -> Result<Arc<JsonCollection>> {
        self.collection(CollectionKind::Test).await
    }

    /// A collection outside the built-in set. Asking again for the same
    /// name returns the same engine; reusing a name for a different file or
    /// shape is rejected.
    pub async fn custom(
        &self,
        name: &str,
        file_name: &str,
        shape: CollectionShape,
    ) -> Result<Arc<JsonCollection>> {
        self.get_or_init(name, self.config.path_for(file_name), shape)
            .await
    }

    async fn get_or_init(
        &self,
        name: &str,
        path: PathBuf,
        shape: CollectionShape,
    ) -> Result<Arc<JsonCollection>> {
        let slot = {
            let mut instances = self.instances.lock().await;
            match instances.get(name) {
                Some(slot) => {
                    let existing = &slot.collection;
                    if existing.path() != path.as_path() || existing.shape() != &shape {
                        return Err(DbError::Validation(format!(
                            "collection '{}' is already registered for '{}' ({})",
                            name,
                            existing.path().display(),
                            existing.shape()
                        )));
                    }
                    Arc::clone(slot)
                }
                None => {
                    let locks = Arc::clone(&self.locks);
                    let collection = JsonCollection::new(name, path, shape, locks)
                        .with_pretty(self.config.pretty);
                    let slot = Arc::new(Slot {
                        collection: Arc::new(collection),
                        loaded: OnceCell::new(),
                    });
                    instances.insert(name.to_string(), Arc::clone(&slot));
                    slot
                }
            }
        };

        // Loading waits on the file lock, so it runs outside the registry lock.
        slot.loaded
            .get_or_try_init(|| async {
                slot.collection.initialize().await?;
                debug!(
                    collection = name,
                    path = %slot.collection.path().display(),
                    "collection registered"
                );
                Ok::<(), DbError>(())
            })
            .await?;
        Ok(Arc::clone(&slot.collection))
    }

    /// Loads every built-in collection; fails on the first one that cannot
    /// be initialized.
    pub async fn initialize_all(&self) -> Result<()> {
        for kind in CollectionKind::ALL {
            self.collection(kind).await?;
        }
        info!(
            data_dir = %self.config.data_dir.display(),
            collections = CollectionKind::ALL.len(),
            "databases initialized"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Enumeration
    // ------------------------------------------------------------------

    /// Every loaded engine, ordered by name.
    pub async fn instances(&self) -> Vec<(String, Arc<JsonCollection>)> {
        self.instances
            .lock()
            .await
            .iter()
            .filter_map(|(name, slot)| slot.ready().map(|collection| (name.clone(), collection)))
            .collect()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<JsonCollection>> {
        self.instances.lock().await.get(name).and_then(|slot| slot.ready())
    }

    pub async fn instance_count(&self) -> usize {
        self.instances
            .lock()
            .await
            .values()
            .filter(|slot| slot.loaded.initialized())
            .count()
    }

    // ------------------------------------------------------------------
    // Admin surface
    // ------------------------------------------------------------------

    /// Path and in-memory size of every live collection, without touching disk.
    pub async fn status(&self) -> Result<BTreeMap<String, CollectionStatus>> {
        self.instances()
            .await
            .into_iter()
            .map(|(name, collection)| Ok((name, collection.status()?)))
            .collect()
    }

    pub async fn memory_stats(&self) -> MemoryStats {
        let collections_bytes = self
            .instances()
            .await
            .iter()
            .map(|(_, collection)| collection.memory_bytes())
            .sum();
        MemoryStats::sample(collections_bytes)
    }

    /// Validates every live collection. Each result stands alone: a corrupt
    /// or missing file only affects its own entry.
    pub async fn validate_all(&self) -> BTreeMap<String, ValidationReport> {
        let instances = self.instances().await;
        let reports = join_all(instances.iter().map(|(name, collection)| async move {
            let report = collection.validate().await;
            if let Some(error) = &report.error {
                warn!(collection = %name, error = %error, "collection failed validation");
            }
            (name.clone(), report)
        }))
        .await;
        reports.into_iter().collect()
    }

    /// Re-reads every live collection from its file.
    pub async fn reload_all_from_disk(&self) -> ReloadSummary {
        let mut summary = ReloadSummary::default();
        for (name, collection) in self.instances().await {
            summary
                .before
                .insert(name.clone(), collection.count().unwrap_or_default());
            match collection.reload_from_disk().await {
                Ok(()) => {
                    summary
                        .after
                        .insert(name.clone(), collection.count().unwrap_or_default());
                }
                Err(err) => {
                    warn!(collection = %name, error = %err, "reload failed, keeping in-memory value");
                    summary.failed.insert(name, err.to_string());
                }
            }
        }
        info!(
            reloaded = summary.after.len(),
            failed = summary.failed.len(),
            "databases reloaded from disk"
        );
        summary
    }

    pub async fn health_report(&self) -> Result<HealthReport> {
        let database_validation = self.validate_all().await;
        Ok(HealthReport {
            status: health::overall_status(&database_validation),
            timestamp: now_timestamp(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            instances: self.instance_count().await,
            memory: self.memory_stats().await,
            locks: self.locks.stats()?,
            databases: self.status().await?,
            database_validation,
        })
    }

    pub async fn snapshot_all(&self) -> Result<StoreBackup> {
        let mut collections = BTreeMap::new();
        for (name, collection) in self.instances().await {
            collections.insert(name, (*collection.get_all()?).clone());
        }
        Ok(StoreBackup {
            created_at: now_timestamp(),
            collections,
        })
    }

    /// Overwrites each collection named in `backup`. Built-in collections
    /// are created if not yet live; unknown names are reported, not fatal.
    pub async fn restore_all(&self, backup: &StoreBackup) -> BTreeMap<String, ValidationReport> {
        let mut outcomes = BTreeMap::new();
        for (name, value) in &backup.collections {
            let target = match self.get(name).await {
                Some(collection) => Ok(collection),
                None => match CollectionKind::from_name(name) {
                    Some(kind) => self.collection(kind).await,
                    None => Err(DbError::CollectionNotFound(name.clone())),
                },
            };
            let outcome = match target {
                Ok(collection) => collection.replace_all(value.clone()).await,
                Err(err) => Err(err),
            };
            let report = match outcome {
                Ok(()) => ValidationReport::ok(),
                Err(err) => {
                    warn!(collection = %name, error = %err, "restore failed");
                    ValidationReport::error(err.to_string())
                }
            };
            outcomes.insert(name.clone(), report);
        }
        outcomes
    }

    /// Force-releases every file lock. Engines stay registered, so every
    /// accessor keeps returning the same instance.
    pub async fn clear_all(&self) -> Result<()> {
        let released = self.locks.clear_all()?;
        debug!(released, "file locks cleared");
        Ok(())
    }

    /// Process-exit teardown: forgets every engine and releases every lock.
    /// The manager must not be used afterwards; an accessor call would open
    /// a second engine beside any instance a caller still holds.
    pub async fn shutdown(&self) -> Result<()> {
        let dropped = {
            let mut instances = self.instances.lock().await;
            let count = instances.len();
            instances.clear();
            count
        };
        self.locks.clear_all()?;
        info!(collections = dropped, "database manager shut down");
        Ok(())
    }
}
