//! Request envelope exchanged between [`EntityClient`](super::EntityClient)
//! and the actor loop.

use crate::runtime::entity::ActorEntity;
use crate::runtime::error::ActorError;
use tokio::sync::oneshot;

/// One-shot response channel carried by every request.
pub type Response<T> = oneshot::Sender<Result<T, ActorError>>;

/// A single call addressed to an entity activation.
#[derive(Debug)]
pub struct ActorRequest<E: ActorEntity> {
    pub call: E::Call,
    pub respond_to: Response<E::Reply>,
}
