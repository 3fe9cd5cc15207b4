//! Per-request identification and routing facts supplied by the host.
//!
//! Routing is done by the host application. It attaches a [`RouteInfo`]
//! (and optionally a [`ConnectionInfo`]) to the `http::Request` extensions
//! before handing the request to the pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// # Example
///
/// ```
/// use restgate_core::RequestId;
///
/// let id = RequestId::new();
/// assert_ne!(id, RequestId::new());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new time-ordered request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID, e.g. one propagated in a header.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// The endpoint a request was routed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Endpoint (controller) name, e.g. `Users`.
    pub controller: String,
    /// Action name, e.g. `edit`.
    pub action: String,
    /// Canonical entity name payloads are wrapped under, e.g. `User`.
    pub entity: String,
    /// Addressed entity id, `0` when none.
    pub target_id: u64,
    /// Requested output format extension, e.g. `json`.
    pub extension: Option<String>,
}

impl RouteInfo {
    /// Creates route info with no target id and no extension.
    #[must_use]
    pub fn new(
        controller: impl Into<String>,
        action: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
            entity: entity.into(),
            target_id: 0,
            extension: None,
        }
    }

    /// Sets the addressed entity id.
    #[must_use]
    pub fn with_target_id(mut self, id: u64) -> Self {
        self.target_id = id;
        self
    }

    /// Sets the output format extension.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }
}

/// Transport facts about the connection a request arrived on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Whether the channel is encrypted.
    pub secure: bool,
    /// Client address.
    pub remote_addr: Option<String>,
    /// Local server address.
    pub server_addr: Option<String>,
}

impl ConnectionInfo {
    /// Marks the connection as secure.
    #[must_use]
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Sets the client address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Sets the server address.
    #[must_use]
    pub fn with_server_addr(mut self, addr: impl Into<String>) -> Self {
        self.server_addr = Some(addr.into());
        self
    }
}
