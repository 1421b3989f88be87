use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Point-in-time copy of every live collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreBackup {
    pub created_at: String,
    pub collections: BTreeMap<String, Value>,
}

impl StoreBackup {
    pub fn collection(&self, name: &str) -> Option<&Value> {
        self.collections.get(name)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

/// Entity counts around a forced reload, plus anything that failed to load.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadSummary {
    pub before: BTreeMap<String, usize>,
    pub after: BTreeMap<String, usize>,
    pub failed: BTreeMap<String, String>,
}

impl ReloadSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
