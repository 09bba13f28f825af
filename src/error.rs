//! # Testkit Errors
//!
//! One error enum per concern. Every error here reports misuse of the testkit
//! itself; nothing is retried automatically and nothing crosses into the
//! hosted entities' own failure handling.

use crate::key::EntityKey;
use std::time::Duration;

/// Errors raised by the mock registry and the call-readiness tracker.
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("{kind} double already registered for key {key}, clear it first")]
    DuplicateRegistration { kind: &'static str, key: EntityKey },
    #[error("active ticket already exists for {scope}/{op} on key {key}")]
    DuplicateTicket {
        scope: String,
        op: &'static str,
        key: EntityKey,
    },
    #[error("verification failed: {0}")]
    Verification(String),
    #[error("no matching call within {0:?}")]
    Timeout(Duration),
    #[error("call tracker dropped before the ticket fired")]
    TrackerGone,
}

/// Silo lifecycle and activation errors.
#[derive(Debug, thiserror::Error)]
pub enum SiloError {
    #[error("silo is not running")]
    NotRunning,
    #[error("silo is already running")]
    AlreadyRunning,
    #[error("entity type {0} is not hosted on this silo")]
    NotHosted(&'static str),
    #[error("activation failed: {0}")]
    Activation(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("host runtime failed to start: {0}")]
    HostRuntime(String),
    #[error("host terminated before completing the dispatched work")]
    HostGone,
}

/// Errors raised by the in-memory storage double.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("etag mismatch for {kind}/{key}: expected {expected}, stored {stored}")]
    EtagMismatch {
        kind: String,
        key: EntityKey,
        expected: String,
        stored: String,
    },
    #[error("state codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Errors raised by the in-memory stream double.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("item codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("stream closed before the expected items arrived")]
    Closed,
}

/// Umbrella error for the cluster fixture's convenience helpers.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error(transparent)]
    Silo(#[from] SiloError),
    #[error(transparent)]
    Mock(#[from] MockError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("no provider named {0} is configured on this fixture")]
    UnknownProvider(String),
}
