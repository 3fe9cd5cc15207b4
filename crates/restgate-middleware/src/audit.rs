//! The request-scoped audit trail.
//!
//! An [`AuditTrail`] owns the single audit record of one request. It is
//! opened once, patched as stages learn things and committed once when the
//! pipeline finalizes. If the pipeline future is dropped before that, the
//! trail commits best-effort from its `Drop` impl.

use chrono::Utc;
use restgate_core::{AuditError, AuditHandle, AuditLogStore, AuditPatch, AuditRecord};
use std::fmt;
use std::sync::Arc;

/// Request-scoped view of the audit record.
///
/// A local copy of the record is kept in sync with every patch so the
/// pipeline can inspect what it logged even when the store is unreachable.
pub struct AuditTrail {
    store: Option<Arc<dyn AuditLogStore>>,
    handle: Option<AuditHandle>,
    record: Option<AuditRecord>,
    committed: bool,
}

impl fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditTrail")
            .field("store", &self.store.is_some())
            .field("handle", &self.handle)
            .field("record", &self.record)
            .field("committed", &self.committed)
            .finish()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::disabled()
    }
}

impl AuditTrail {
    /// Creates a trail writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self {
            store: Some(store),
            handle: None,
            record: None,
            committed: false,
        }
    }

    /// Creates a trail that keeps the record locally and persists nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            store: None,
            handle: None,
            record: None,
            committed: false,
        }
    }

    /// Returns true if records are persisted.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// The backing store, if any.
    #[must_use]
    pub fn store(&self) -> Option<&Arc<dyn AuditLogStore>> {
        self.store.as_ref()
    }

    /// The store handle, once the record was opened successfully.
    #[must_use]
    pub fn handle(&self) -> Option<AuditHandle> {
        self.handle
    }

    /// The local copy of the record.
    #[must_use]
    pub fn record(&self) -> Option<&AuditRecord> {
        self.record.as_ref()
    }

    /// Returns true once [`commit`](Self::commit) has run.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Opens the record. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the store error if the record could not be opened. The local
    /// copy is kept either way.
    pub async fn open(&mut self, record: AuditRecord) -> Result<(), AuditError> {
        if self.record.is_some() {
            return Ok(());
        }
        self.record = Some(record.clone());

        if let Some(store) = &self.store {
            self.handle = Some(store.open(record).await?);
        }
        Ok(())
    }

    /// Applies a patch locally and forwards it to the store.
    ///
    /// Patches before [`open`](Self::open) are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AlreadyCommitted`] after commit, or the store
    /// error if forwarding failed.
    pub async fn merge(&mut self, patch: AuditPatch) -> Result<(), AuditError> {
        if self.committed {
            return Err(AuditError::AlreadyCommitted(self.handle.unwrap_or_default()));
        }
        let Some(record) = self.record.as_mut() else {
            return Ok(());
        };
        record.apply(&patch);

        match (&self.store, self.handle) {
            (Some(store), Some(handle)) => store.merge(handle, patch).await,
            _ => Ok(()),
        }
    }

    /// Commits the record. Only the first call reaches the store.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AlreadyCommitted`] on a repeated call, or the
    /// store error.
    pub async fn commit(&mut self) -> Result<(), AuditError> {
        if self.committed {
            return Err(AuditError::AlreadyCommitted(self.handle.unwrap_or_default()));
        }
        self.committed = true;

        match (&self.store, self.handle) {
            (Some(store), Some(handle)) => store.commit(handle).await,
            _ => Ok(()),
        }
    }
}

impl Drop for AuditTrail {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let (Some(store), Some(handle)) = (self.store.take(), self.handle) else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(handle = %handle, "Audit record dropped outside a runtime; not committed");
            return;
        };

        tracing::debug!(handle = %handle, "Committing abandoned audit record");
        runtime.spawn(async move {
            let patch = AuditPatch::new().responded(Utc::now());
            if let Err(e) = store.merge(handle, patch).await {
                tracing::warn!(handle = %handle, error = %e, "Failed to finalize abandoned audit record");
            }
            if let Err(e) = store.commit(handle).await {
                tracing::warn!(handle = %handle, error = %e, "Failed to commit abandoned audit record");
                restgate_telemetry::metrics::record_audit_failure("commit");
            }
        });
    }
}
