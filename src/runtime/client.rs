//! Typed client half of an entity activation.

use crate::runtime::entity::ActorEntity;
use crate::runtime::error::ActorError;
use crate::runtime::message::ActorRequest;
use tokio::sync::{mpsc, oneshot};

/// Cheaply cloneable handle for sending calls to one entity activation.
///
/// Holds only the sender side of the activation's mailbox. The same type
/// fronts real activations and mock doubles, so code under test cannot tell
/// them apart.
pub struct EntityClient<E: ActorEntity> {
    sender: mpsc::Sender<ActorRequest<E>>,
}

impl<E: ActorEntity> Clone for EntityClient<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E: ActorEntity> EntityClient<E> {
    pub fn new(sender: mpsc::Sender<ActorRequest<E>>) -> Self {
        Self { sender }
    }

    /// Sends one call and awaits its reply.
    pub async fn call(&self, call: E::Call) -> Result<E::Reply, ActorError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ActorRequest { call, respond_to })
            .await
            .map_err(|_| ActorError::Closed)?;
        response.await.map_err(|_| ActorError::Dropped)?
    }
}
