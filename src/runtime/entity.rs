//! # ActorEntity Trait
//!
//! Contract for anything the silo can host. An entity names its kind, its call
//! and reply types, and its operation vocabulary; the generic actor loop,
//! factory, and mock registry work against this trait so they are written once
//! for every entity type.
//!
//! # Operation table
//!
//! [`ActorEntity::operations`] enumerates the operation names an entity
//! services and [`ActorEntity::operation`] classifies an incoming call. The
//! testkit builds its operation-id table from these at registration time;
//! there is no signature hashing or other derived identifier anywhere.

use crate::key::EntityKey;
use crate::silo::Services;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait implemented by every entity the silo hosts or the registry mocks.
///
/// Activation is key driven: the factory calls [`ActorEntity::activate`] the
/// first time a key is looked up, then routes every call for that key to the
/// same activation. Dependencies are resolved from the injected [`Services`]
/// map rather than being baked in at construction time.
#[async_trait]
pub trait ActorEntity: Send + Sync + Sized + 'static {
    /// Entity-type name used for storage rows, call tracking, and logging.
    const KIND: &'static str;

    /// The operation message enum handled by this entity.
    type Call: Send + Debug + 'static;

    /// The reply type returned by every operation.
    type Reply: Send + Debug + 'static;

    /// The entity's own error type, boxed into
    /// [`ActorError::Entity`](crate::runtime::ActorError::Entity) by the loop.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Constructs the entity state for a freshly activated key.
    fn activate(key: &EntityKey, services: &Services) -> Result<Self, Self::Error>;

    /// Handles one call. Calls are delivered sequentially per activation.
    async fn handle(
        &mut self,
        call: Self::Call,
        services: &Services,
    ) -> Result<Self::Reply, Self::Error>;

    /// Every operation name this entity services.
    fn operations() -> &'static [&'static str];

    /// The operation name of a concrete call. Must be one of
    /// [`ActorEntity::operations`].
    fn operation(call: &Self::Call) -> &'static str;
}
