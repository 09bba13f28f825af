//! # Host Runtime Surface
//!
//! The minimal actor runtime the testkit hosts and mocks: a typed entity
//! contract ([`ActorEntity`]), a request envelope, a cloneable client, and the
//! sequential actor loop. Entities are key addressed and activated on demand
//! by the silo factory; each activation processes its mailbox one call at a
//! time in its own tokio task.

pub mod actor;
pub mod client;
pub mod entity;
pub mod error;
pub mod message;
pub mod tracing;

pub use actor::EntityActor;
pub use client::EntityClient;
pub use entity::ActorEntity;
pub use error::ActorError;
pub use message::{ActorRequest, Response};
