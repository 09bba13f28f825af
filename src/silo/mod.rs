//! # Local Silo
//!
//! In-process host for entity activations. A [`LocalSilo`] owns a dedicated
//! thread running a current-thread tokio runtime, the host execution context.
//! Activations are spawned onto it and dispatched units of work run on it
//! sequentially, so test code and entity code observe the same cooperative
//! single-logical-thread model and never race each other.
//!
//! Configuration is an explicit builder ([`LocalSiloBuilder`]): ports and
//! cluster identity on [`SiloConfig`], hosted entity types via
//! [`LocalSiloBuilder::host`], and arbitrary service overrides via
//! [`LocalSiloBuilder::service`].

pub mod factory;
pub mod services;

pub use factory::{ClientFactory, SiloFactory};
pub use services::Services;

use crate::error::SiloError;
use crate::runtime::ActorEntity;
use factory::Activator;
use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::info;
use uuid::Uuid;

/// Host configuration recognized by the silo.
///
/// Ports identify the notional silo/gateway endpoints of the local cluster;
/// service and cluster ids namespace its logs. Defaults mirror a freshly
/// generated single-silo cluster.
#[derive(Clone, Debug)]
pub struct SiloConfig {
    pub silo_port: u16,
    pub gateway_port: u16,
    pub service_id: Uuid,
    pub cluster_id: String,
}

impl Default for SiloConfig {
    fn default() -> Self {
        Self {
            silo_port: 11111,
            gateway_port: 30000,
            service_id: Uuid::new_v4(),
            cluster_id: format!("local-{}", Uuid::new_v4().simple()),
        }
    }
}

type DispatchJob = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct HostHandle {
    jobs: mpsc::UnboundedSender<DispatchJob>,
    thread: std::thread::JoinHandle<()>,
}

enum HostState {
    Idle,
    Running(HostHandle),
    Stopped,
}

/// Builder for [`LocalSilo`].
pub struct LocalSiloBuilder {
    config: SiloConfig,
    services: Services,
    activators: HashMap<TypeId, (&'static str, Activator)>,
}

impl Default for LocalSiloBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSiloBuilder {
    pub fn new() -> Self {
        Self {
            config: SiloConfig::default(),
            services: Services::new(),
            activators: HashMap::new(),
        }
    }

    pub fn silo_port(mut self, port: u16) -> Self {
        self.config.silo_port = port;
        self
    }

    pub fn gateway_port(mut self, port: u16) -> Self {
        self.config.gateway_port = port;
        self
    }

    pub fn service_id(mut self, id: Uuid) -> Self {
        self.config.service_id = id;
        self
    }

    pub fn cluster_id(mut self, id: impl Into<String>) -> Self {
        self.config.cluster_id = id.into();
        self
    }

    /// Registers a service override available to every activation.
    pub fn service<T: Send + Sync + 'static>(self, service: Arc<T>) -> Self {
        self.services.insert(service);
        self
    }

    /// Hosts entity type `E`: installs its activator so the factory can
    /// activate it on demand.
    pub fn host<E: ActorEntity>(mut self) -> Self {
        self.activators
            .insert(TypeId::of::<E>(), (E::KIND, factory::activator_for::<E>()));
        self
    }

    pub fn build(self) -> LocalSilo {
        let factory = Arc::new(SiloFactory::new(self.services.clone(), self.activators));
        LocalSilo {
            config: self.config,
            services: self.services,
            factory,
            host: Mutex::new(HostState::Idle),
        }
    }
}

/// A single in-process silo instance.
pub struct LocalSilo {
    config: SiloConfig,
    services: Services,
    factory: Arc<SiloFactory>,
    host: Mutex<HostState>,
}

impl LocalSilo {
    pub fn builder() -> LocalSiloBuilder {
        LocalSiloBuilder::new()
    }

    pub fn config(&self) -> &SiloConfig {
        &self.config
    }

    pub fn services(&self) -> Services {
        self.services.clone()
    }

    /// The real backing factory for this silo.
    pub fn factory(&self) -> Arc<SiloFactory> {
        self.factory.clone()
    }

    /// Starts the host thread and its runtime.
    ///
    /// Fails with [`SiloError::AlreadyRunning`] if the silo is running.
    pub fn start(&self) -> Result<(), SiloError> {
        let mut host = self.host.lock().unwrap();
        if matches!(*host, HostState::Running(_)) {
            return Err(SiloError::AlreadyRunning);
        }

        let (jobs_tx, mut jobs_rx) = mpsc::unbounded_channel::<DispatchJob>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<tokio::runtime::Handle, String>>();

        let thread = std::thread::Builder::new()
            .name(format!("silo-{}", self.config.cluster_id))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(runtime.handle().clone()));
                runtime.block_on(async move {
                    while let Some(job) = jobs_rx.recv().await {
                        job().await;
                    }
                });
            })
            .map_err(|e| SiloError::HostRuntime(e.to_string()))?;

        let handle = match ready_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(SiloError::HostRuntime(e)),
            Err(_) => return Err(SiloError::HostRuntime("host thread died".to_string())),
        };

        self.factory.bind(handle);
        *host = HostState::Running(HostHandle {
            jobs: jobs_tx,
            thread,
        });
        info!(
            silo_port = self.config.silo_port,
            gateway_port = self.config.gateway_port,
            service_id = %self.config.service_id,
            cluster_id = %self.config.cluster_id,
            "Silo started"
        );
        Ok(())
    }

    /// Runs `fut` on the host execution context and returns its output.
    ///
    /// Dispatched units execute sequentially on the host runtime, interleaved
    /// only at await points with the activations running there. Fails with
    /// [`SiloError::NotRunning`] before start or after stop.
    pub async fn dispatch<Fut, T>(&self, fut: Fut) -> Result<T, SiloError>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = {
            let host = self.host.lock().unwrap();
            match &*host {
                HostState::Running(handle) => handle.jobs.clone(),
                _ => return Err(SiloError::NotRunning),
            }
        };
        let (done_tx, done_rx) = oneshot::channel();
        let job: DispatchJob = Box::new(move || {
            Box::pin(async move {
                let _ = done_tx.send(fut.await);
            })
        });
        jobs.send(job).map_err(|_| SiloError::NotRunning)?;
        done_rx.await.map_err(|_| SiloError::HostGone)
    }

    /// Stops the host: drains no further work, evicts activations, joins the
    /// host thread.
    ///
    /// Fails with [`SiloError::NotRunning`] if the silo never started or was
    /// already stopped.
    pub fn stop(&self) -> Result<(), SiloError> {
        let handle = {
            let mut host = self.host.lock().unwrap();
            match std::mem::replace(&mut *host, HostState::Stopped) {
                HostState::Running(handle) => handle,
                other => {
                    *host = other;
                    return Err(SiloError::NotRunning);
                }
            }
        };
        drop(handle.jobs);
        self.factory.unbind();
        let _ = handle.thread.join();
        info!(cluster_id = %self.config.cluster_id, "Silo stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.host.lock().unwrap(), HostState::Running(_))
    }
}

impl Drop for LocalSilo {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
