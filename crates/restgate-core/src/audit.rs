//! Audit log records and the store interface the pipeline writes them to.
//!
//! Every request that passes the activation check produces exactly one
//! [`AuditRecord`]. The record is opened once, patched additively while the
//! request runs and committed once at the end. The same records back rate
//! limiting: the limiter counts recent records for a caller identity.
//!
//! Persistence is external. Adapters implement [`AuditLogStore`];
//! [`MemoryAuditStore`] is a concurrent in-process implementation.

use crate::status::HttpStatus;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opaque handle to an open audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditHandle(Uuid);

impl AuditHandle {
    /// Creates a new time-ordered handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One persisted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Endpoint (controller) name.
    pub controller: String,
    /// Action name.
    pub action: String,
    /// Target entity id, `0` when the request addressed none.
    pub model_id: u64,
    /// Client address.
    pub ip: Option<String>,
    /// When the request arrived.
    pub requested: DateTime<Utc>,
    /// When the response was produced. `None` until finalization.
    pub responded: Option<DateTime<Utc>>,
    /// Final HTTP status.
    pub httpcode: HttpStatus,
    /// Whether the request was rejected by the rate limiter.
    pub ratelimited: bool,
    /// Resolved user name.
    pub username: Option<String>,
    /// Resolved API key.
    pub apikey: Option<String>,
    /// Resolved caller class.
    pub class: Option<String>,
    /// Abort message, if the request was aborted.
    pub error: Option<String>,
    /// Serialized `meta` block (dump mode).
    pub meta: Option<String>,
    /// Serialized normalized input payload (dump mode).
    pub data_in: Option<String>,
    /// Serialized outgoing data (dump mode).
    pub data_out: Option<String>,
}

impl AuditRecord {
    /// Creates the initial record for a request.
    #[must_use]
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
            model_id: 0,
            ip: None,
            requested: Utc::now(),
            responded: None,
            httpcode: HttpStatus::Ok,
            ratelimited: false,
            username: None,
            apikey: None,
            class: None,
            error: None,
            meta: None,
            data_in: None,
            data_out: None,
        }
    }

    /// Applies a patch. Only fields present in the patch change.
    pub fn apply(&mut self, patch: &AuditPatch) {
        if let Some(model_id) = patch.model_id {
            self.model_id = model_id;
        }
        if let Some(ip) = &patch.ip {
            self.ip = Some(ip.clone());
        }
        if let Some(requested) = patch.requested {
            self.requested = requested;
        }
        if let Some(responded) = patch.responded {
            self.responded = Some(responded);
        }
        if let Some(httpcode) = patch.httpcode {
            self.httpcode = httpcode;
        }
        if let Some(ratelimited) = patch.ratelimited {
            self.ratelimited = ratelimited;
        }
        set_text(&mut self.username, patch.username.as_ref());
        set_text(&mut self.apikey, patch.apikey.as_ref());
        set_text(&mut self.class, patch.class.as_ref());
        set_text(&mut self.error, patch.error.as_ref());
        set_text(&mut self.meta, patch.meta.as_ref());
        set_text(&mut self.data_in, patch.data_in.as_ref());
        set_text(&mut self.data_out, patch.data_out.as_ref());
    }

    /// Field names [`AuditRecord::field`] and [`AuditQuery`] accept.
    pub const QUERYABLE_FIELDS: [&str; 9] = [
        "controller",
        "action",
        "model_id",
        "ip",
        "httpcode",
        "username",
        "apikey",
        "class",
        "error",
    ];

    /// Looks up a queryable field by name.
    ///
    /// Returns `None` for unknown field names and `Some(None)` for known
    /// fields that are unset.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Option<String>> {
        let value = match name {
            "controller" => Some(self.controller.clone()),
            "action" => Some(self.action.clone()),
            "model_id" => Some(self.model_id.to_string()),
            "ip" => self.ip.clone(),
            "httpcode" => Some(self.httpcode.code().to_string()),
            "username" => self.username.clone(),
            "apikey" => self.apikey.clone(),
            "class" => self.class.clone(),
            "error" => self.error.clone(),
            _ => return None,
        };
        Some(value)
    }
}

fn set_text(slot: &mut Option<String>, value: Option<&String>) {
    if let Some(value) = value {
        *slot = Some(value.clone());
    }
}

/// An additive update to an [`AuditRecord`].
///
/// `None` means "leave unchanged"; a patch can never clear a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct AuditPatch {
    pub model_id: Option<u64>,
    pub ip: Option<String>,
    pub requested: Option<DateTime<Utc>>,
    pub responded: Option<DateTime<Utc>>,
    pub httpcode: Option<HttpStatus>,
    pub ratelimited: Option<bool>,
    pub username: Option<String>,
    pub apikey: Option<String>,
    pub class: Option<String>,
    pub error: Option<String>,
    pub meta: Option<String>,
    pub data_in: Option<String>,
    pub data_out: Option<String>,
}

impl AuditPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response timestamp.
    #[must_use]
    pub fn responded(mut self, at: DateTime<Utc>) -> Self {
        self.responded = Some(at);
        self
    }

    /// Sets the HTTP status.
    #[must_use]
    pub fn httpcode(mut self, status: HttpStatus) -> Self {
        self.httpcode = Some(status);
        self
    }

    /// Sets the rate-limited flag.
    #[must_use]
    pub fn ratelimited(mut self, limited: bool) -> Self {
        self.ratelimited = Some(limited);
        self
    }

    /// Sets the abort message.
    #[must_use]
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Sets the resolved identity fields.
    #[must_use]
    pub fn identity(
        mut self,
        username: Option<&str>,
        apikey: Option<&str>,
        class: Option<&str>,
    ) -> Self {
        self.username = username.map(str::to_string);
        self.apikey = apikey.map(str::to_string);
        self.class = class.map(str::to_string);
        self
    }

    /// Sets the dump snapshots.
    #[must_use]
    pub fn dump(mut self, meta: String, data_in: String, data_out: String) -> Self {
        self.meta = Some(meta);
        self.data_in = Some(data_in);
        self.data_out = Some(data_out);
        self
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Count query used by the rate limiter.
///
/// Matches records where `field == value` (an unset field matches `None`)
/// and `requested > requested_after`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    /// Record field compared against `value`.
    pub field: String,
    /// Expected value.
    pub value: Option<String>,
    /// Exclusive lower bound on `requested`.
    pub requested_after: DateTime<Utc>,
}

impl AuditQuery {
    /// Evaluates the query against one record.
    pub fn matches(&self, record: &AuditRecord) -> Result<bool, AuditError> {
        let actual = record
            .field(&self.field)
            .ok_or_else(|| AuditError::UnknownField(self.field.clone()))?;
        Ok(record.requested > self.requested_after && actual == self.value)
    }
}

/// Failures reported by an audit store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// The backing store could not be reached.
    #[error("audit store unavailable: {0}")]
    Unavailable(String),

    /// The handle was never opened on this store.
    #[error("unknown audit handle: {0}")]
    UnknownHandle(AuditHandle),

    /// The handle was already committed.
    #[error("audit record {0} already committed")]
    AlreadyCommitted(AuditHandle),

    /// A query referenced a field the record does not have.
    #[error("unknown audit field: {0}")]
    UnknownField(String),
}

/// Storage adapter for audit records.
///
/// Implementations must tolerate concurrent `open`/`merge`/`commit` calls
/// from independent requests and concurrent `count` queries. Counting may
/// be eventually consistent.
pub trait AuditLogStore: Send + Sync + 'static {
    /// Opens a record with its initial fields.
    fn open<'a>(&'a self, record: AuditRecord) -> BoxFuture<'a, Result<AuditHandle, AuditError>>;

    /// Applies a patch to an open record. Last write wins per field.
    fn merge<'a>(
        &'a self,
        handle: AuditHandle,
        patch: AuditPatch,
    ) -> BoxFuture<'a, Result<(), AuditError>>;

    /// Persists an open record. A second commit on the same handle fails
    /// with [`AuditError::AlreadyCommitted`] and never duplicates the record.
    fn commit<'a>(&'a self, handle: AuditHandle) -> BoxFuture<'a, Result<(), AuditError>>;

    /// Counts committed records matching the query.
    fn count<'a>(&'a self, query: AuditQuery) -> BoxFuture<'a, Result<u64, AuditError>>;
}

/// In-memory [`AuditLogStore`].
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    open: DashMap<AuditHandle, AuditRecord>,
    committed_handles: DashSet<AuditHandle>,
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an already-committed record, e.g. history for tests.
    pub fn insert_committed(&self, record: AuditRecord) {
        self.records.write().push(record);
    }

    /// Returns a copy of all committed records.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    /// Number of committed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing was committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records opened but not yet committed.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn missing(&self, handle: AuditHandle) -> AuditError {
        if self.committed_handles.contains(&handle) {
            AuditError::AlreadyCommitted(handle)
        } else {
            AuditError::UnknownHandle(handle)
        }
    }
}

impl AuditLogStore for MemoryAuditStore {
    fn open<'a>(&'a self, record: AuditRecord) -> BoxFuture<'a, Result<AuditHandle, AuditError>> {
        Box::pin(async move {
            let handle = AuditHandle::new();
            self.open.insert(handle, record);
            Ok(handle)
        })
    }

    fn merge<'a>(
        &'a self,
        handle: AuditHandle,
        patch: AuditPatch,
    ) -> BoxFuture<'a, Result<(), AuditError>> {
        Box::pin(async move {
            let mut record = self.open.get_mut(&handle).ok_or_else(|| self.missing(handle))?;
            record.apply(&patch);
            Ok(())
        })
    }

    fn commit<'a>(&'a self, handle: AuditHandle) -> BoxFuture<'a, Result<(), AuditError>> {
        Box::pin(async move {
            let (_, record) = self.open.remove(&handle).ok_or_else(|| self.missing(handle))?;
            self.committed_handles.insert(handle);
            self.records.write().push(record);
            Ok(())
        })
    }

    fn count<'a>(&'a self, query: AuditQuery) -> BoxFuture<'a, Result<u64, AuditError>> {
        Box::pin(async move {
            let records = self.records.read();
            let mut count = 0_u64;
            for record in records.iter() {
                if query.matches(record)? {
                    count += 1;
                }
            }
            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn record_for(apikey: &str, minutes_ago: i64) -> AuditRecord {
        let mut record = AuditRecord::new("Users", "edit");
        record.apikey = Some(apikey.to_string());
        record.requested = Utc::now() - Duration::minutes(minutes_ago);
        record
    }

    #[test]
    fn test_patch_only_touches_present_fields() {
        let mut record = AuditRecord::new("Users", "edit");
        record.apply(&AuditPatch::new().identity(Some("john"), Some("k"), Some("Customer")));
        record.apply(&AuditPatch::new().httpcode(HttpStatus::Forbidden));

        assert_eq!(record.username.as_deref(), Some("john"));
        assert_eq!(record.class.as_deref(), Some("Customer"));
        assert_eq!(record.httpcode, HttpStatus::Forbidden);
        assert!(!record.ratelimited);
    }

    #[test]
    fn test_patch_cannot_clear() {
        let mut record = AuditRecord::new("Users", "edit");
        record.apply(&AuditPatch::new().identity(Some("john"), None, None));
        record.apply(&AuditPatch::new().identity(None, Some("k"), None));
        assert_eq!(record.username.as_deref(), Some("john"));
        assert_eq!(record.apikey.as_deref(), Some("k"));
    }

    #[test]
    fn test_field_lookup() {
        let record = record_for("abc", 0);
        assert_eq!(record.field("apikey"), Some(Some("abc".to_string())));
        assert_eq!(record.field("username"), Some(None));
        assert_eq!(record.field("password"), None);
    }

    #[tokio::test]
    async fn test_open_merge_commit() {
        let store = MemoryAuditStore::new();
        let handle = store.open(AuditRecord::new("Users", "add")).await.unwrap();
        assert_eq!(store.open_count(), 1);

        store
            .merge(handle, AuditPatch::new().httpcode(HttpStatus::BadRequest))
            .await
            .unwrap();
        store.commit(handle).await.unwrap();

        assert_eq!(store.open_count(), 0);
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].httpcode, HttpStatus::BadRequest);
    }

    #[tokio::test]
    async fn test_second_commit_is_rejected_without_duplicate() {
        let store = MemoryAuditStore::new();
        let handle = store.open(AuditRecord::new("Users", "add")).await.unwrap();
        store.commit(handle).await.unwrap();

        let err = store.commit(handle).await.unwrap_err();
        assert_eq!(err, AuditError::AlreadyCommitted(handle));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let store = MemoryAuditStore::new();
        let handle = AuditHandle::new();
        let err = store.merge(handle, AuditPatch::new()).await.unwrap_err();
        assert_eq!(err, AuditError::UnknownHandle(handle));
    }

    #[tokio::test]
    async fn test_count_respects_identity_and_window() {
        let store = MemoryAuditStore::new();
        store.insert_committed(record_for("abc", 5));
        store.insert_committed(record_for("abc", 30));
        store.insert_committed(record_for("abc", 120));
        store.insert_committed(record_for("other", 5));

        let query = AuditQuery {
            field: "apikey".to_string(),
            value: Some("abc".to_string()),
            requested_after: Utc::now() - Duration::hours(1),
        };
        assert_eq!(store.count(query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_count_unknown_field_fails() {
        let store = MemoryAuditStore::new();
        store.insert_committed(record_for("abc", 5));
        let query = AuditQuery {
            field: "password".to_string(),
            value: None,
            requested_after: Utc::now() - Duration::hours(1),
        };
        assert!(matches!(
            store.count(query).await,
            Err(AuditError::UnknownField(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_each_commit_once() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut tasks = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let handle = store.open(record_for(&format!("k{i}"), 0)).await.unwrap();
                store
                    .merge(handle, AuditPatch::new().responded(Utc::now()))
                    .await
                    .unwrap();
                store.commit(handle).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.len(), 32);
        assert_eq!(store.open_count(), 0);
    }
}
