use crate::storage::{CollectionStatus, LockStats, ValidationReport};
use serde::Serialize;
use std::collections::BTreeMap;
use sysinfo::System;

/// Process memory usage plus the footprint of every loaded collection.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
    pub system_total_bytes: u64,
    pub system_used_bytes: u64,
    /// Sum of the serialized in-memory values of all live collections
    pub collections_bytes: usize,
}

impl MemoryStats {
    /// Samples the current process; fields stay zero where the platform
    /// gives no answer.
    pub fn sample(collections_bytes: usize) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let mut stats = Self {
            system_total_bytes: sys.total_memory(),
            system_used_bytes: sys.used_memory(),
            collections_bytes,
            ..Self::default()
        };

        if let Ok(pid) = sysinfo::get_current_pid() {
            if sys.refresh_process(pid) {
                if let Some(process) = sys.process(pid) {
                    stats.rss_bytes = process.memory();
                    stats.virtual_bytes = process.virtual_memory();
                }
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub instances: usize,
    pub memory: MemoryStats,
    pub locks: LockStats,
    pub databases: BTreeMap<String, CollectionStatus>,
    pub database_validation: BTreeMap<String, ValidationReport>,
}

impl HealthReport {
    /// Names of collections whose validation failed.
    pub fn failing(&self) -> Vec<&str> {
        self.database_validation
            .iter()
            .filter(|(_, report)| !report.is_ok())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

pub(crate) fn overall_status(validation: &BTreeMap<String, ValidationReport>) -> HealthStatus {
    if validation.values().all(ValidationReport::is_ok) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}
