use crate::core::Result;
use crate::storage::JsonCollection;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Anything a [`ReadThroughCache`](super::ReadThroughCache) can fill itself from.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// The full current value of the collection.
    async fn load_all(&self) -> Result<Arc<Value>>;
}

#[async_trait]
impl CollectionSource for JsonCollection {
    async fn load_all(&self) -> Result<Arc<Value>> {
        if !self.is_loaded() {
            self.initialize().await?;
        }
        self.get_all()
    }
}

#[async_trait]
impl<T: CollectionSource + ?Sized> CollectionSource for Arc<T> {
    async fn load_all(&self) -> Result<Arc<Value>> {
        (**self).load_all().await
    }
}
