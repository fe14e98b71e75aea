//! Interfaces to the systems a view query talks to.
//!
//! The compiler never opens connections itself. Index discovery, search
//! execution and SQL execution are reached through these traits so callers
//! can plug in their own clients (and tests can plug in fakes).

use async_trait::async_trait;
use std::time::Duration;

/// A failed call to an external system. The upstream message is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", render(.status, .message))]
pub struct BackendError {
    pub status: Option<u16>,
    pub message: String,
}

fn render(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("backend returned {}: {}", code, message),
        None => format!("backend request failed: {}", message),
    }
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// The upstream reports a missing resource (e.g. an expired point-in-time).
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Indices selected by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedIndices {
    pub indices: Vec<String>,
    pub status: u16,
}

/// Maps base types and a time window to physical index names.
#[async_trait]
pub trait IndexResolver: Send + Sync {
    async fn resolve(
        &self,
        base_types: &[String],
        start: i64,
        end: i64,
    ) -> BackendResult<ResolvedIndices>;
}

/// A search against explicit indices.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub indices: Vec<String>,
    pub body: Vec<u8>,
    /// Scroll keep-alive; opens a scroll context when set.
    pub scroll: Option<String>,
}

/// Executes serialized DSL and returns the raw response bytes.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: SearchRequest) -> BackendResult<Vec<u8>>;

    /// Continue a scroll.
    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> BackendResult<Vec<u8>>;

    /// Search inside a point-in-time; the body carries the `pit` clause.
    async fn search_with_pit(&self, body: Vec<u8>) -> BackendResult<Vec<u8>>;

    async fn create_pit(&self, indices: &[String], keep_alive: &str) -> BackendResult<String>;

    async fn count(&self, indices: &[String], body: Vec<u8>) -> BackendResult<u64>;
}

/// A statement for the SQL gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFetch {
    pub sql: String,
    /// Continuation token from a previous page.
    pub next_uri: Option<String>,
    pub limit: usize,
    pub timeout: Duration,
}

/// Executes SQL on the federation gateway and returns the raw response bytes.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    async fn fetch(&self, request: SqlFetch) -> BackendResult<Vec<u8>>;
}
