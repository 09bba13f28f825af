//! # Entity Actor Loop
//!
//! Server half of an activation. Owns the entity state and the receiver end of
//! the mailbox and processes calls strictly in arrival order, so entity code
//! never needs interior locking. Each activation runs in its own tokio task on
//! the silo's host runtime.

use crate::key::EntityKey;
use crate::runtime::client::EntityClient;
use crate::runtime::entity::ActorEntity;
use crate::runtime::error::ActorError;
use crate::runtime::message::ActorRequest;
use crate::silo::Services;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Mailbox capacity for hosted activations.
pub const ACTOR_BUFFER: usize = 32;

/// A running activation of one entity key.
pub struct EntityActor<E: ActorEntity> {
    key: EntityKey,
    entity: E,
    receiver: mpsc::Receiver<ActorRequest<E>>,
}

impl<E: ActorEntity> EntityActor<E> {
    /// Activates the entity for `key` and returns the actor with its client.
    ///
    /// The actor does nothing until [`EntityActor::run`] is spawned.
    pub fn activate(
        key: EntityKey,
        services: &Services,
        buffer: usize,
    ) -> Result<(Self, EntityClient<E>), E::Error> {
        let entity = E::activate(&key, services)?;
        let (sender, receiver) = mpsc::channel(buffer);
        info!(kind = E::KIND, key = %key, "Activated");
        Ok((
            Self {
                key,
                entity,
                receiver,
            },
            EntityClient::new(sender),
        ))
    }

    /// Processes calls until every client handle is dropped.
    pub async fn run(mut self, services: Services) {
        while let Some(request) = self.receiver.recv().await {
            let op = E::operation(&request.call);
            debug!(kind = E::KIND, key = %self.key, op, "Handling call");
            let result = match self.entity.handle(request.call, &services).await {
                Ok(reply) => Ok(reply),
                Err(e) => {
                    warn!(kind = E::KIND, key = %self.key, op, error = %e, "Call failed");
                    Err(ActorError::Entity(Box::new(e)))
                }
            };
            let _ = request.respond_to.send(result);
        }
        debug!(kind = E::KIND, key = %self.key, "Deactivated");
    }
}
