use super::cascade::{CascadeTarget, cascade_delete};
use crate::cache::{CacheStatus, ReadThroughCache};
use crate::core::types::{
    EntityId, ID_FIELD, into_record, merge_records, next_id, now_timestamp, record_id,
    UPDATED_AT_FIELD, touch_updated_at, validate_entity_id,
};
use crate::core::{DbError, Record, Result};
use crate::manager::DatabaseManager;
use crate::storage::JsonCollection;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

const USER: &str = "user";
const FIELDS: &str = "fields";
const STAFF: &str = "staff";
const ACCOUNTS_SECTION: &str = "accounts";
const DEFAULT_CURRENCY: &str = "ROL";

/// Input for [`UserStore::create_user`].
///
/// The password is stored as given; hashing belongs to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub displayed_name: String,
    pub email: String,
    pub password: String,
    /// Extra fields copied onto the record as-is.
    #[serde(default, flatten)]
    pub additional: Record,
}

/// The user collection behind a read-through cache.
///
/// Every write goes to the engine first and then empties the cache, so a
/// caller never reads back an older list than the one it just wrote.
pub struct UserStore {
    manager: Arc<DatabaseManager>,
    users: Arc<JsonCollection>,
    cache: ReadThroughCache<Arc<JsonCollection>>,
}

impl UserStore {
    pub async fn open(manager: Arc<DatabaseManager>) -> Result<Self> {
        let users = manager.users().await?;
        let cache = ReadThroughCache::new(Arc::clone(&users), manager.config().cache_ttl);
        Ok(Self {
            manager,
            users,
            cache,
        })
    }

    pub fn manager(&self) -> &Arc<DatabaseManager> {
        &self.manager
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// All users, served from the cache while it is fresh.
    pub async fn get_users(&self) -> Result<Arc<Value>> {
        self.cache.get_all().await
    }

    pub async fn find_user(&self, id: EntityId) -> Result<Option<Record>> {
        let id = validate_entity_id(id, USER)?;
        self.users.find_by_id(id)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<Record>> {
        self.users.find_one(|user| str_field(user, "email") == Some(email))
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<Record>> {
        self.users
            .find_one(|user| str_field(user, "username") == Some(username))
    }

    pub async fn find_user_by_internal_id(&self, internal_id: &str) -> Result<Option<Record>> {
        self.users
            .find_one(|user| str_field(user, "internalId") == Some(internal_id))
    }

    pub async fn user_exists_by_email(&self, email: &str) -> Result<bool> {
        Ok(self.find_user_by_email(email).await?.is_some())
    }

    pub async fn user_exists_by_id(&self, id: EntityId) -> Result<bool> {
        Ok(self.find_user(id).await?.is_some())
    }

    pub async fn user_exists_by_username(&self, username: &str) -> Result<bool> {
        Ok(self.find_user_by_username(username).await?.is_some())
    }

    pub async fn user_count(&self) -> Result<usize> {
        Ok(self.get_users().await?.as_array().map_or(0, Vec::len))
    }

    pub async fn active_users(&self) -> Result<Vec<Record>> {
        self.users
            .find(|user| user.get("isActive").and_then(Value::as_bool) == Some(true))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Stores a new active user and opens a financial account for it. The
    /// account is best-effort: failing to create it does not fail the call.
    pub async fn create_user(&self, input: NewUser) -> Result<Record> {
        let mut record = Record::new();
        if let Some(username) = input.username {
            record.insert("username".into(), Value::String(username));
        }
        record.insert("displayedName".into(), Value::String(input.displayed_name));
        record.insert("email".into(), Value::String(input.email));
        record.insert("password".into(), Value::String(input.password));
        record.insert("isActive".into(), Value::Bool(true));
        record.insert("lastLogin".into(), Value::Null);
        record.insert("createdAt".into(), Value::String(now_timestamp()));
        let record = merge_records(record, &input.additional);

        let created = self.users.add(record).await;
        self.cache.invalidate_cache().await;
        let created = created?;

        if let Some(id) = record_id(&created) {
            if let Err(err) = self.ensure_financial_account(id).await {
                warn!(user_id = id, error = %err, "financial account initialization failed");
            }
        }
        debug!(id = ?record_id(&created), "user created");
        Ok(created)
    }

    /// Merges `patch` into the user and stamps `updatedAt`.
    pub async fn update_user(&self, id: EntityId, patch: Record) -> Result<Record> {
        let id = validate_entity_id(id, USER)?;
        let patch = touch_updated_at(patch);
        let updated = self
            .users
            .update_records(
                |user| record_id(user) == Some(id),
                |user| merge_records(user, &patch),
            )
            .await;
        self.cache.invalidate_cache().await;
        updated?
            .into_iter()
            .next()
            .ok_or_else(|| user_not_found(id))
    }

    pub async fn update_last_login(&self, id: EntityId) -> Result<Record> {
        self.update_user(id, patch("lastLogin", Value::String(now_timestamp())))
            .await
    }

    /// Soft delete: the record stays with `isActive: false`.
    pub async fn deactivate_user(&self, id: EntityId) -> Result<Record> {
        self.update_user(id, patch("isActive", Value::Bool(false)))
            .await
    }

    /// Removes the user and everything that belongs to it. Returns the
    /// record as it was before deletion.
    pub async fn delete_user(&self, id: EntityId) -> Result<Record> {
        let id = validate_entity_id(id, USER)?;
        let existing = self.find_user(id).await?.ok_or_else(|| user_not_found(id))?;

        let removed = self.users.remove(|user| record_id(user) == Some(id)).await;
        self.cache.invalidate_cache().await;
        removed?;

        cascade_delete(&self.manager, CascadeTarget::User(id)).await?;
        debug!(id, "user deleted");
        Ok(existing)
    }

    // ------------------------------------------------------------------
    // Nested per-user lists
    // ------------------------------------------------------------------

    pub async fn add_field(&self, user_id: EntityId, field: Record) -> Result<Record> {
        self.add_nested(user_id, FIELDS, field).await
    }

    pub async fn list_fields(&self, user_id: EntityId) -> Result<Vec<Value>> {
        self.list_nested(user_id, FIELDS).await
    }

    pub async fn delete_field(&self, user_id: EntityId, field_id: EntityId) -> Result<bool> {
        self.delete_nested(user_id, FIELDS, field_id).await
    }

    pub async fn add_staff(&self, user_id: EntityId, staff: Record) -> Result<Record> {
        self.add_nested(user_id, STAFF, staff).await
    }

    pub async fn list_staff(&self, user_id: EntityId) -> Result<Vec<Value>> {
        self.list_nested(user_id, STAFF).await
    }

    pub async fn delete_staff(&self, user_id: EntityId, staff_id: EntityId) -> Result<bool> {
        self.delete_nested(user_id, STAFF, staff_id).await
    }

    /// Assigns the entry's id and appends it while the users file is locked,
    /// so concurrent adds for one user never share an id.
    async fn add_nested(&self, user_id: EntityId, list: &str, entry: Record) -> Result<Record> {
        let entry = without_id(entry);
        let mut created = None;
        self.edit_user(user_id, |user| {
            let mut items = nested(user, list);
            let mut record = Record::new();
            record.insert(ID_FIELD.into(), json!(next_id(&items)));
            let record = merge_records(record, &entry);
            items.push(Value::Object(record.clone()));
            user.insert(list.to_string(), Value::Array(items));
            created = Some(record);
        })
        .await?;
        created.ok_or_else(|| user_not_found(user_id))
    }

    async fn list_nested(&self, user_id: EntityId, list: &str) -> Result<Vec<Value>> {
        Ok(self
            .find_user(user_id)
            .await?
            .map(|user| nested(&user, list))
            .unwrap_or_default())
    }

    /// `false` when the user exists but had no entry with that id.
    async fn delete_nested(&self, user_id: EntityId, list: &str, entry_id: EntityId) -> Result<bool> {
        let mut removed = false;
        self.edit_user(user_id, |user| {
            let items = nested(user, list);
            let before = items.len();
            let kept: Vec<Value> = items
                .into_iter()
                .filter(|item| item.get(ID_FIELD).and_then(Value::as_u64) != Some(entry_id))
                .collect();
            removed = kept.len() != before;
            user.insert(list.to_string(), Value::Array(kept));
        })
        .await?;
        Ok(removed)
    }

    /// Applies `edit` to the current user record under the file lock, stamps
    /// `updatedAt` and empties the cache.
    async fn edit_user<E>(&self, user_id: EntityId, mut edit: E) -> Result<Record>
    where
        E: FnMut(&mut Record),
    {
        let user_id = validate_entity_id(user_id, USER)?;
        let stamp = Value::String(now_timestamp());
        let updated = self
            .users
            .update_records(
                |user| record_id(user) == Some(user_id),
                |mut user| {
                    edit(&mut user);
                    user.insert(UPDATED_AT_FIELD.into(), stamp.clone());
                    user
                },
            )
            .await;
        self.cache.invalidate_cache().await;
        updated?
            .into_iter()
            .next()
            .ok_or_else(|| user_not_found(user_id))
    }

    // ------------------------------------------------------------------
    // Cache control
    // ------------------------------------------------------------------

    pub async fn invalidate_cache(&self) {
        self.cache.invalidate_cache().await;
    }

    pub async fn force_refresh_cache(&self) -> Result<Arc<Value>> {
        self.cache.force_refresh_cache().await
    }

    pub async fn cache_status(&self) -> CacheStatus {
        self.cache.cache_status().await
    }

    /// Empties the cache, then tears the manager down.
    pub async fn shutdown(&self) -> Result<()> {
        self.cache.invalidate_cache().await;
        self.manager.shutdown().await
    }

    async fn ensure_financial_account(&self, user_id: EntityId) -> Result<()> {
        let financial = self.manager.financial().await?;
        let accounts = financial.section(ACCOUNTS_SECTION)?;
        let exists = accounts.as_array().is_some_and(|accounts| {
            accounts
                .iter()
                .any(|account| account.get("userId").and_then(Value::as_u64) == Some(user_id))
        });
        if exists {
            return Ok(());
        }

        let now = now_timestamp();
        let account = into_record(json!({
            "userId": user_id,
            "balance": 0,
            "currency": DEFAULT_CURRENCY,
            "createdAt": now,
            "updatedAt": now,
            "transactions": [],
        }))?;
        financial.add_in(ACCOUNTS_SECTION, account).await?;
        debug!(user_id, "financial account initialized");
        Ok(())
    }
}

fn user_not_found(id: EntityId) -> DbError {
    DbError::NotFound(format!("User {} not found", id))
}

fn str_field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

fn patch(key: &str, value: Value) -> Record {
    let mut patch = Record::new();
    patch.insert(key.to_string(), value);
    patch
}

fn nested(user: &Record, list: &str) -> Vec<Value> {
    user.get(list)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn without_id(mut entry: Record) -> Record {
    entry.remove(ID_FIELD);
    entry
}
