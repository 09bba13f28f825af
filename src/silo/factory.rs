//! # Silo Factory
//!
//! The real backing factory: resolves `(entity type, key)` to a client,
//! activating an [`EntityActor`] on the silo's host runtime the first time a
//! key is seen and returning the cached client afterwards.
//!
//! Entity types must be hosted explicitly ([`crate::silo::LocalSiloBuilder::host`]);
//! hosting installs a type-erased activator in a table keyed by `TypeId`.
//! The erased [`ClientFactory`] trait is the seam the mock registry's
//! pass-through rules delegate to.

use crate::error::SiloError;
use crate::key::EntityKey;
use crate::runtime::actor::{EntityActor, ACTOR_BUFFER};
use crate::runtime::{ActorEntity, EntityClient};
use crate::silo::Services;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::debug;

/// Type-erased lookup interface over a backing factory.
///
/// The returned `Arc<dyn Any>` wraps an `EntityClient<E>` for the entity type
/// identified by `entity`; callers that know `E` statically downcast it back.
pub trait ClientFactory: Send + Sync {
    fn resolve(
        &self,
        entity: TypeId,
        kind: &'static str,
        key: &EntityKey,
    ) -> Result<Arc<dyn Any + Send + Sync>, SiloError>;
}

pub(crate) type Activator = Box<
    dyn Fn(&EntityKey, &Services, &Handle) -> Result<Arc<dyn Any + Send + Sync>, SiloError>
        + Send
        + Sync,
>;

/// Builds the activator installed by `LocalSiloBuilder::host::<E>()`.
pub(crate) fn activator_for<E: ActorEntity>() -> Activator {
    Box::new(|key, services, handle| {
        let (actor, client) = EntityActor::<E>::activate(key.clone(), services, ACTOR_BUFFER)
            .map_err(|e| SiloError::Activation(Box::new(e)))?;
        handle.spawn(actor.run(services.clone()));
        Ok(Arc::new(client) as Arc<dyn Any + Send + Sync>)
    })
}

/// On-demand activation catalog bound to one silo.
pub struct SiloFactory {
    services: Services,
    handle: Mutex<Option<Handle>>,
    activators: HashMap<TypeId, (&'static str, Activator)>,
    catalog: Mutex<HashMap<(TypeId, EntityKey), Arc<dyn Any + Send + Sync>>>,
}

impl SiloFactory {
    pub(crate) fn new(
        services: Services,
        activators: HashMap<TypeId, (&'static str, Activator)>,
    ) -> Self {
        Self {
            services,
            handle: Mutex::new(None),
            activators,
            catalog: Mutex::new(HashMap::new()),
        }
    }

    /// Binds the factory to the host runtime; called on silo start.
    pub(crate) fn bind(&self, handle: Handle) {
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Unbinds from the host runtime; called on silo stop.
    pub(crate) fn unbind(&self) {
        *self.handle.lock().unwrap() = None;
        self.catalog.lock().unwrap().clear();
    }

    /// Typed lookup: activates on first use, then returns the cached client.
    pub fn get<E: ActorEntity>(&self, key: &EntityKey) -> Result<EntityClient<E>, SiloError> {
        let erased = self.resolve(TypeId::of::<E>(), E::KIND, key)?;
        let client = erased
            .downcast::<EntityClient<E>>()
            .map_err(|_| SiloError::NotHosted(E::KIND))?;
        Ok((*client).clone())
    }
}

impl ClientFactory for SiloFactory {
    fn resolve(
        &self,
        entity: TypeId,
        kind: &'static str,
        key: &EntityKey,
    ) -> Result<Arc<dyn Any + Send + Sync>, SiloError> {
        let handle = self
            .handle
            .lock()
            .unwrap()
            .clone()
            .ok_or(SiloError::NotRunning)?;

        let mut catalog = self.catalog.lock().unwrap();
        if let Some(client) = catalog.get(&(entity, key.clone())) {
            return Ok(client.clone());
        }

        let (_, activator) = self
            .activators
            .get(&entity)
            .ok_or(SiloError::NotHosted(kind))?;
        let client = activator(key, &self.services, &handle)?;
        catalog.insert((entity, key.clone()), client.clone());
        debug!(kind, key = %key, "Cataloged activation");
        Ok(client)
    }
}
