// ============================================================================
// JSON collection engine
// ============================================================================

use super::io::{atomic_write, encode, read_json};
use super::lock::LockRegistry;
use super::shape::{CollectionShape, SectionKind};
use crate::core::types::{ID_FIELD, is_protected, next_id, record_id};
use crate::core::{DbError, EntityId, Record, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Ok,
    Error,
}

/// Outcome of [`JsonCollection::validate`]: `{"status": "ok"}` or
/// `{"status": "error", "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            status: ValidationStatus::Ok,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Error,
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ValidationStatus::Ok
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStatus {
    pub name: String,
    pub file_path: PathBuf,
    pub shape: String,
    pub loaded: bool,
    pub entity_count: usize,
    /// Size of the value as encoded in its file
    pub memory_bytes: usize,
}

/// One file-backed collection.
///
/// The in-memory value is an immutable snapshot behind an `Arc`; readers
/// clone the `Arc` and never wait on writers. Mutations run under the file
/// lock from the shared [`LockRegistry`], build the next value from the
/// current snapshot, write it to disk and only then publish it. A failed
/// write therefore leaves the in-memory value untouched.
#[derive(Debug)]
pub struct JsonCollection {
    name: String,
    path: PathBuf,
    shape: CollectionShape,
    pretty: bool,
    locks: Arc<LockRegistry>,
    state: RwLock<Arc<Value>>,
    memory_bytes: AtomicUsize,
    loaded: AtomicBool,
}

impl JsonCollection {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        shape: CollectionShape,
        locks: Arc<LockRegistry>,
    ) -> Self {
        let initial = shape.default_value();
        Self {
            name: name.into(),
            path: path.into(),
            shape,
            pretty: true,
            locks,
            state: RwLock::new(Arc::new(initial)),
            memory_bytes: AtomicUsize::new(0),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shape(&self) -> &CollectionShape {
        &self.shape
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Creates the backing file with the default shape if it is missing,
    /// then loads it. Safe to call repeatedly; never overwrites data.
    pub async fn initialize(&self) -> Result<()> {
        let span = info_span!("collection.initialize", collection = %self.name);
        async {
            let _guard = self.locks.acquire(&self.path).await?;
            self.load_locked().await
        }
        .instrument(span)
        .await
    }

    /// Discards the in-memory value in favour of the current file content.
    pub async fn reload_from_disk(&self) -> Result<()> {
        self.initialize().await
    }

    async fn load_locked(&self) -> Result<()> {
        let (value, bytes) = match read_json(&self.path).await? {
            Some(value) => {
                let value = self.shape.normalize(value);
                self.shape.check(&value).map_err(|err| {
                    DbError::ShapeMismatch(format!("{}: {}", self.path.display(), err))
                })?;
                let bytes = encode(&value, self.pretty)?.len();
                (value, bytes)
            }
            None => {
                if self.is_loaded() {
                    let discarded = self.count()?;
                    if discarded > 0 {
                        warn!(
                            path = %self.path.display(),
                            discarded,
                            "collection file vanished, in-memory records discarded"
                        );
                    }
                }
                let value = self.shape.default_value();
                let bytes = self.persist(&value).await?;
                info!(path = %self.path.display(), "created collection file");
                (value, bytes)
            }
        };
        self.publish(value, bytes)?;
        self.loaded.store(true, Ordering::Release);
        debug!(entities = self.shape.entity_count(&*self.snapshot()?), "collection loaded");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Current committed value. No locking beyond the snapshot swap.
    pub fn get_all(&self) -> Result<Arc<Value>> {
        self.snapshot()
    }

    /// Alias of [`JsonCollection::get_all`].
    pub fn read(&self) -> Result<Arc<Value>> {
        self.snapshot()
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.shape.entity_count(&*self.snapshot()?))
    }

    /// All entities matching `predicate`, in stored order.
    pub fn find<P>(&self, predicate: P) -> Result<Vec<Record>>
    where
        P: Fn(&Record) -> bool,
    {
        let snapshot = self.snapshot()?;
        Ok(self
            .entities(&snapshot)?
            .iter()
            .filter_map(Value::as_object)
            .filter(|record| predicate(*record))
            .cloned()
            .collect())
    }

    /// First entity matching `predicate`, or `None`.
    pub fn find_one<P>(&self, predicate: P) -> Result<Option<Record>>
    where
        P: Fn(&Record) -> bool,
    {
        let snapshot = self.snapshot()?;
        Ok(self
            .entities(&snapshot)?
            .iter()
            .filter_map(Value::as_object)
            .find(|record| predicate(*record))
            .cloned())
    }

    pub fn find_by_id(&self, id: EntityId) -> Result<Option<Record>> {
        self.find_one(|record| record_id(record) == Some(id))
    }

    /// One section of an aggregate-shaped collection.
    pub fn section(&self, name: &str) -> Result<Value> {
        self.require_section(name)?;
        let snapshot = self.snapshot()?;
        Ok(snapshot.get(name).cloned().unwrap_or(Value::Null))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Appends `partial` with `id = max(existing) + 1` and returns the
    /// stored record.
    pub async fn add(&self, partial: Record) -> Result<Record> {
        self.require_array("add")?;
        let created = self
            .mutate("add", move |current| {
                let mut items = current.as_array().cloned().unwrap_or_default();
                let record = with_assigned_id(next_id(&items), partial);
                items.push(Value::Object(record.clone()));
                Ok((Value::Array(items), record))
            })
            .await?;
        debug!(collection = %self.name, id = ?record_id(&created), "record added");
        Ok(created)
    }

    /// Appends to a list section of an aggregate collection with a
    /// section-local id.
    pub async fn add_in(&self, section: &str, partial: Record) -> Result<Record> {
        let kind = self.require_section(section)?;
        if kind != SectionKind::List {
            return Err(DbError::ShapeMismatch(format!(
                "section '{}' of '{}' is not a list",
                section, self.name
            )));
        }
        let section_name = section.to_string();
        self.mutate("add_in", move |current| {
            let mut root = current.as_object().cloned().unwrap_or_default();
            let mut items = root
                .get(&section_name)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let record = with_assigned_id(next_id(&items), partial);
            items.push(Value::Object(record.clone()));
            root.insert(section_name, Value::Array(items));
            Ok((Value::Object(root), record))
        })
        .await
    }

    /// Replaces every entity matching `predicate` with `updater(entity)`.
    /// Returns the updated entities; zero matches is a no-op.
    pub async fn update_records<P, U>(&self, predicate: P, mut updater: U) -> Result<Vec<Record>>
    where
        P: Fn(&Record) -> bool,
        U: FnMut(Record) -> Record,
    {
        self.require_array("update_records")?;
        let name = self.name.clone();
        self.mutate("update_records", move |current| {
            let items = current.as_array().cloned().unwrap_or_default();
            reject_protected(&name, &items, &predicate)?;

            let mut updated = Vec::new();
            let next = items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) if predicate(&record) => {
                        let record = updater(record);
                        updated.push(record.clone());
                        Value::Object(record)
                    }
                    other => other,
                })
                .collect();
            Ok((Value::Array(next), updated))
        })
        .await
    }

    /// Drops every entity matching `predicate`. Returns how many were removed.
    pub async fn remove<P>(&self, predicate: P) -> Result<usize>
    where
        P: Fn(&Record) -> bool,
    {
        self.require_array("remove")?;
        let name = self.name.clone();
        let removed = self
            .mutate("remove", move |current| {
                let items = current.as_array().cloned().unwrap_or_default();
                reject_protected(&name, &items, &predicate)?;

                let before = items.len();
                let kept: Vec<Value> = items
                    .into_iter()
                    .filter(|item| !item.as_object().is_some_and(|record| predicate(record)))
                    .collect();
                let removed = before - kept.len();
                Ok((Value::Array(kept), removed))
            })
            .await?;
        debug!(collection = %self.name, removed, "records removed");
        Ok(removed)
    }

    /// Overwrites the whole value, bypassing predicates and protection.
    pub async fn replace_all(&self, value: Value) -> Result<()> {
        let value = self.shape.normalize(value);
        self.mutate("replace_all", move |_| Ok((value, ())))
            .await
    }

    /// Whole-value transformation under the file lock.
    pub async fn update_with<F>(&self, transform: F) -> Result<()>
    where
        F: FnOnce(Value) -> Value,
    {
        let shape = self.shape.clone();
        self.mutate("update_with", move |current| {
            Ok((shape.normalize(transform(current.clone())), ()))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    /// Re-reads the backing file and checks it against the shape. Never fails;
    /// problems are reported in the result.
    pub async fn validate(&self) -> ValidationReport {
        match read_json(&self.path).await {
            Ok(Some(value)) => match self.shape.check(&self.shape.normalize(value)) {
                Ok(()) => ValidationReport::ok(),
                Err(err) => ValidationReport::error(err.to_string()),
            },
            Ok(None) => ValidationReport::error(format!(
                "backing file '{}' does not exist",
                self.path.display()
            )),
            Err(err) => ValidationReport::error(err.to_string()),
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> Result<CollectionStatus> {
        Ok(CollectionStatus {
            name: self.name.clone(),
            file_path: self.path.clone(),
            shape: self.shape.to_string(),
            loaded: self.is_loaded(),
            entity_count: self.count()?,
            memory_bytes: self.memory_bytes(),
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn snapshot(&self) -> Result<Arc<Value>> {
        Ok(Arc::clone(&*self.state.read()?))
    }

    fn publish(&self, value: Value, bytes: usize) -> Result<()> {
        *self.state.write()? = Arc::new(value);
        self.memory_bytes.store(bytes, Ordering::Relaxed);
        Ok(())
    }

    fn entities<'a>(&self, value: &'a Value) -> Result<&'a Vec<Value>> {
        value.as_array().ok_or_else(|| self.not_array("query"))
    }

    fn require_array(&self, op: &str) -> Result<()> {
        if self.shape.is_array() {
            Ok(())
        } else {
            Err(self.not_array(op))
        }
    }

    fn not_array(&self, op: &str) -> DbError {
        DbError::ShapeMismatch(format!(
            "'{}' needs an array collection but '{}' is {}",
            op, self.name, self.shape
        ))
    }

    fn require_section(&self, name: &str) -> Result<SectionKind> {
        self.shape.section(name).map(|s| s.kind).ok_or_else(|| {
            DbError::ShapeMismatch(format!(
                "collection '{}' ({}) has no section '{}'",
                self.name, self.shape, name
            ))
        })
    }

    async fn persist(&self, value: &Value) -> Result<usize> {
        let bytes = encode(value, self.pretty)?;
        atomic_write(&self.path, &bytes).await?;
        Ok(bytes.len())
    }

    /// Read-current / compute-next / persist / publish, serialized per file.
    async fn mutate<T, F>(&self, op: &'static str, compute: F) -> Result<T>
    where
        F: FnOnce(&Value) -> Result<(Value, T)>,
    {
        let span = info_span!("collection.mutate", collection = %self.name, op);
        async move {
            let _guard = self.locks.acquire(&self.path).await?;
            if !self.is_loaded() {
                self.load_locked().await?;
            }

            let current = self.snapshot()?;
            let (next, output) = compute(&current)?;
            self.shape.check(&next)?;

            match self.persist(&next).await {
                Ok(bytes) => {
                    self.publish(next, bytes)?;
                    Ok(output)
                }
                Err(err) => {
                    error!(error = %err, "persist failed, in-memory value left unchanged");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn with_assigned_id(id: EntityId, partial: Record) -> Record {
    let mut record = Record::with_capacity(partial.len() + 1);
    record.insert(ID_FIELD.to_string(), Value::from(id));
    for (key, value) in partial {
        if key != ID_FIELD {
            record.insert(key, value);
        }
    }
    record
}

fn reject_protected<P>(collection: &str, items: &[Value], predicate: &P) -> Result<()>
where
    P: Fn(&Record) -> bool,
{
    let blocked = items
        .iter()
        .filter_map(Value::as_object)
        .find(|record| is_protected(record) && predicate(*record));
    match blocked {
        Some(record) => Err(DbError::ReadOnly(format!(
            "{} record {} is protected",
            collection,
            record_id(record).map_or_else(|| "?".to_string(), |id| id.to_string())
        ))),
        None => Ok(()),
    }
}
