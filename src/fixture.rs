//! # Cluster Fixture
//!
//! The composition root a test interacts with: builds the call tracker and
//! operation table, constructs the configured storage and stream doubles
//! around them, starts a [`LocalSilo`], and binds a [`FactoryMocker`] to the
//! silo's real factory. The mocker is also registered as a service, so hosted
//! entities resolving collaborators through it transparently receive whatever
//! doubles the test installed.
//!
//! Everything is owned by the fixture instance. Two fixtures running in
//! parallel share nothing, not even call history.

use crate::error::{FixtureError, SiloError, StreamError};
use crate::key::EntityKey;
use crate::mock::FactoryMocker;
use crate::ops::OperationTable;
use crate::runtime::tracing::init_test_tracing;
use crate::runtime::ActorEntity;
use crate::silo::{ClientFactory, LocalSilo, LocalSiloBuilder, Services, SiloConfig, SiloFactory};
use crate::storage::{Etag, MemoryStorage};
use crate::streams::MemoryStreams;
use crate::tracker::{CallTracker, ReadinessTicket};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Name-keyed lookup over the fixture's providers, registered as a service so
/// hosted entities can reach them.
pub struct ProviderRegistry {
    storages: HashMap<String, Arc<MemoryStorage>>,
    streams: HashMap<String, Arc<MemoryStreams>>,
}

impl ProviderRegistry {
    pub fn storage(&self, name: &str) -> Option<Arc<MemoryStorage>> {
        self.storages.get(name).cloned()
    }

    pub fn streams(&self, name: &str) -> Option<Arc<MemoryStreams>> {
        self.streams.get(name).cloned()
    }
}

/// Builder enumerating every recognized fixture option.
pub struct FixtureBuilder {
    silo: LocalSiloBuilder,
    storage_providers: Vec<String>,
    stream_providers: Vec<String>,
    stream_storages: Vec<String>,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self {
            silo: LocalSiloBuilder::new(),
            storage_providers: Vec::new(),
            stream_providers: Vec::new(),
            stream_storages: Vec::new(),
        }
    }

    /// Registers an in-memory storage provider under `name`.
    pub fn storage_provider(mut self, name: impl Into<String>) -> Self {
        self.storage_providers.push(name.into());
        self
    }

    /// Registers an in-memory stream provider under `name`.
    pub fn stream_provider(mut self, name: impl Into<String>) -> Self {
        self.stream_providers.push(name.into());
        self
    }

    /// Registers a storage provider backing stream checkpoints under `name`.
    pub fn stream_storage(mut self, name: impl Into<String>) -> Self {
        self.stream_storages.push(name.into());
        self
    }

    /// Hosts entity type `E` on the silo.
    pub fn host<E: ActorEntity>(mut self) -> Self {
        self.silo = self.silo.host::<E>();
        self
    }

    /// Registers an arbitrary service override.
    pub fn service<T: Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.silo = self.silo.service(service);
        self
    }

    pub fn silo_port(mut self, port: u16) -> Self {
        self.silo = self.silo.silo_port(port);
        self
    }

    pub fn gateway_port(mut self, port: u16) -> Self {
        self.silo = self.silo.gateway_port(port);
        self
    }

    pub fn service_id(mut self, id: Uuid) -> Self {
        self.silo = self.silo.service_id(id);
        self
    }

    pub fn cluster_id(mut self, id: impl Into<String>) -> Self {
        self.silo = self.silo.cluster_id(id);
        self
    }

    /// Builds the providers, starts the silo, and binds the mocker.
    pub fn start(self) -> Result<ClusterFixture, FixtureError> {
        init_test_tracing();

        let ops = Arc::new(OperationTable::new());
        let tracker = Arc::new(CallTracker::new(ops));

        let mut storages = HashMap::new();
        for name in self.storage_providers.iter().chain(&self.stream_storages) {
            storages.insert(
                name.clone(),
                Arc::new(MemoryStorage::new(name.clone(), tracker.clone())),
            );
        }
        let mut streams = HashMap::new();
        for name in &self.stream_providers {
            streams.insert(
                name.clone(),
                Arc::new(MemoryStreams::new(name.clone(), tracker.clone())),
            );
        }

        let registry = Arc::new(ProviderRegistry {
            storages: storages.clone(),
            streams: streams.clone(),
        });
        let silo = self.silo.service(registry).build();

        let factory: Arc<dyn ClientFactory> = silo.factory();
        let mocker = Arc::new(FactoryMocker::new(factory, tracker.clone()));
        silo.services().insert(mocker.clone());

        silo.start()?;
        Ok(ClusterFixture {
            silo,
            mocker,
            tracker,
            storages,
            streams,
        })
    }
}

/// A started local cluster with its mocker and test doubles.
pub struct ClusterFixture {
    silo: LocalSilo,
    mocker: Arc<FactoryMocker>,
    tracker: Arc<CallTracker>,
    storages: HashMap<String, Arc<MemoryStorage>>,
    streams: HashMap<String, Arc<MemoryStreams>>,
}

impl ClusterFixture {
    pub fn builder() -> FixtureBuilder {
        FixtureBuilder::new()
    }

    pub fn config(&self) -> &SiloConfig {
        self.silo.config()
    }

    /// The mock registry bound to this cluster's factory.
    pub fn mock(&self) -> &FactoryMocker {
        &self.mocker
    }

    /// The real backing factory.
    pub fn factory(&self) -> Arc<SiloFactory> {
        self.silo.factory()
    }

    pub fn services(&self) -> Services {
        self.silo.services()
    }

    pub fn tracker(&self) -> &Arc<CallTracker> {
        &self.tracker
    }

    pub fn storage(&self, name: &str) -> Option<Arc<MemoryStorage>> {
        self.storages.get(name).cloned()
    }

    pub fn streams(&self, name: &str) -> Option<Arc<MemoryStreams>> {
        self.streams.get(name).cloned()
    }

    /// Runs `fut` on the silo's host execution context.
    pub async fn dispatch<Fut, T>(&self, fut: Fut) -> Result<T, SiloError>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.silo.dispatch(fut).await
    }

    /// Reads typed state from a named storage provider.
    pub fn get_state<T: DeserializeOwned>(
        &self,
        provider: &str,
        kind: &str,
        key: &EntityKey,
    ) -> Result<Option<(T, Etag)>, FixtureError> {
        let storage = self
            .storage(provider)
            .ok_or_else(|| FixtureError::UnknownProvider(provider.to_string()))?;
        Ok(storage.read(kind, key)?)
    }

    /// Writes typed state into a named storage provider, unconditionally.
    pub fn set_state<T: Serialize>(
        &self,
        provider: &str,
        kind: &str,
        key: &EntityKey,
        state: &T,
    ) -> Result<Etag, FixtureError> {
        let storage = self
            .storage(provider)
            .ok_or_else(|| FixtureError::UnknownProvider(provider.to_string()))?;
        Ok(storage.write(kind, key, state, None)?)
    }

    /// Readiness ticket over a storage provider's operations; see
    /// [`MemoryStorage::await_operation`].
    pub fn await_state_operation(
        &self,
        provider: &str,
        kind: &str,
        key: EntityKey,
        op: &'static str,
        calls: u32,
    ) -> Result<ReadinessTicket, FixtureError> {
        let storage = self
            .storage(provider)
            .ok_or_else(|| FixtureError::UnknownProvider(provider.to_string()))?;
        Ok(storage.await_operation(kind, key, op, calls)?)
    }

    /// Publishes one item through a named stream provider.
    pub fn publish_to_stream<T: Serialize>(
        &self,
        provider: &str,
        stream_id: Uuid,
        namespace: &str,
        item: &T,
    ) -> Result<usize, FixtureError> {
        let streams = self
            .streams(provider)
            .ok_or_else(|| FixtureError::UnknownProvider(provider.to_string()))?;
        Ok(streams.publish(stream_id, namespace, item)?)
    }

    /// Subscribes now and returns a future for the next `count` items; see
    /// [`MemoryStreams::collect`].
    pub fn collect_from_stream<T: DeserializeOwned>(
        &self,
        provider: &str,
        stream_id: Uuid,
        namespace: &str,
        count: usize,
    ) -> Result<impl Future<Output = Result<Vec<T>, StreamError>>, FixtureError> {
        let streams = self
            .streams(provider)
            .ok_or_else(|| FixtureError::UnknownProvider(provider.to_string()))?;
        Ok(streams.collect::<T>(stream_id, namespace, count))
    }

    /// Stops the silo. Also happens implicitly on drop.
    pub fn stop(&self) -> Result<(), SiloError> {
        self.silo.stop()
    }
}
