//! Runtime-level errors shared by real activations and mock doubles.

/// Errors that can occur when calling an entity.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("actor mailbox closed")]
    Closed,
    #[error("actor dropped response channel")]
    Dropped,
    #[error("no stub installed for {kind}::{op}")]
    Unstubbed { kind: &'static str, op: &'static str },
    #[error("entity error: {0}")]
    Entity(#[source] Box<dyn std::error::Error + Send + Sync>),
}
