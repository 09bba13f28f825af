//! # Actor Testkit
//!
//! Test infrastructure for tokio actor systems: an in-process "local silo"
//! host, a keyed-mock registry over the silo's client factory, and in-memory
//! storage and stream test doubles.
//!
//! ## Components
//!
//! - [`fixture::ClusterFixture`] - composition root: builds and starts the
//!   silo, wires the doubles, owns everything for one test.
//! - [`mock::FactoryMocker`] - registers doubles per `(entity type, key)`
//!   identity, intercepts lookups, verifies activation and call history, and
//!   awaits calls with a timeout.
//! - [`tracker::CallTracker`] - counter-based latches that resolve a future
//!   once a configured number of matching calls occurred.
//! - [`silo::LocalSilo`] - the host: a dedicated thread running a
//!   current-thread tokio runtime; `dispatch` marshals test code onto that
//!   same execution context so tests never race the entities they drive.
//! - [`storage::MemoryStorage`] / [`streams::MemoryStreams`] - provider
//!   doubles with operation counting hooked into the tracker.
//!
//! ## A typical test
//!
//! ```rust,ignore
//! let fixture = ClusterFixture::builder()
//!     .storage_provider("store")
//!     .host::<OrderEntity>()
//!     .start()?;
//!
//! let key = EntityKey::primary(Uuid::new_v4());
//! let order = fixture.mock().register::<OrderEntity>(key.clone())?;
//! order.stub("reserve", |_| Ok(OrderReply::Reserved));
//!
//! fixture.dispatch(drive_system_under_test()).await?;
//!
//! fixture.mock().verify_activated::<OrderEntity>(&key, Times::AtLeastOnce)?;
//! fixture.mock().verify_called::<OrderEntity>(&key, "reserve", Times::Exactly(1))?;
//! ```
//!
//! Registries and trackers are plain in-process data structures guarded by
//! mutexes; nothing here performs blocking I/O, and the only cancellation
//! path is the timeout on awaited calls.

pub mod error;
pub mod fixture;
pub mod key;
pub mod mock;
pub mod ops;
pub mod runtime;
pub mod silo;
pub mod storage;
pub mod streams;
pub mod tracker;

pub use error::{FixtureError, MockError, SiloError, StorageError, StreamError};
pub use fixture::ClusterFixture;
pub use key::{EntityKey, KeyId};
pub use mock::{FactoryMocker, MockHandle, RecordedCall, Times};
pub use runtime::{ActorEntity, ActorError, EntityClient};
pub use silo::{LocalSilo, Services, SiloConfig};
pub use storage::MemoryStorage;
pub use streams::MemoryStreams;
pub use tracker::{CallTracker, ReadinessTicket};
