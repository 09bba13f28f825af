//! # Mock Doubles
//!
//! A double is a registry-owned stand-in for one entity key. It is fronted by
//! the same [`EntityClient`] as a real activation: a background task drains
//! the mailbox, records every call, feeds the call tracker, and answers from
//! a per-operation stub table. Operations without a stub answer
//! [`ActorError::Unstubbed`].

use crate::key::EntityKey;
use crate::ops::OpId;
use crate::runtime::message::ActorRequest;
use crate::runtime::{ActorEntity, ActorError, EntityClient};
use crate::tracker::CallTracker;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Mailbox capacity for mock doubles.
const DOUBLE_BUFFER: usize = 100;

/// One observed call on a double.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    /// Operation name, from the entity's operation table.
    pub op: &'static str,
    /// Debug rendering of the call payload, for argument matching.
    pub args: String,
}

/// Append-only invocation history of one double.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<RecordedCall>>,
}

impl CallLog {
    fn record(&self, op: &'static str, args: String) {
        self.calls.lock().unwrap().push(RecordedCall { op, args });
    }

    pub fn snapshot(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matcher: impl Fn(&RecordedCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matcher(c)).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

type StubFn<E> = Box<
    dyn FnMut(<E as ActorEntity>::Call) -> Result<<E as ActorEntity>::Reply, ActorError> + Send,
>;

type StubTable<E> = Arc<Mutex<HashMap<&'static str, StubFn<E>>>>;

/// Handle to a registered double: configure stubs, inspect history, obtain
/// the client.
pub struct MockHandle<E: ActorEntity> {
    key: EntityKey,
    client: EntityClient<E>,
    log: Arc<CallLog>,
    stubs: StubTable<E>,
}

impl<E: ActorEntity> Clone for MockHandle<E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            client: self.client.clone(),
            log: self.log.clone(),
            stubs: self.stubs.clone(),
        }
    }
}

impl<E: ActorEntity> MockHandle<E> {
    /// The key this double was registered under.
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// A client routed at this double.
    pub fn client(&self) -> EntityClient<E> {
        self.client.clone()
    }

    /// Installs (or replaces) the stub answering operation `op`.
    pub fn stub(
        &self,
        op: &'static str,
        f: impl FnMut(E::Call) -> Result<E::Reply, ActorError> + Send + 'static,
    ) -> &Self {
        self.stubs.lock().unwrap().insert(op, Box::new(f));
        self
    }

    /// Snapshot of the calls observed so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.log.snapshot()
    }

    /// Number of observed calls accepted by `matcher`.
    pub fn call_count(&self, matcher: impl Fn(&RecordedCall) -> bool) -> usize {
        self.log.count(matcher)
    }

    pub(crate) fn log_arc(&self) -> Arc<CallLog> {
        self.log.clone()
    }

    /// Erased reset closure stored by the registry; wipes history and stubs.
    pub(crate) fn reset_fn(&self) -> Box<dyn Fn() + Send + Sync> {
        let log = self.log.clone();
        let stubs = self.stubs.clone();
        Box::new(move || {
            log.clear();
            stubs.lock().unwrap().clear();
        })
    }
}

/// Spawns the double's mailbox task and returns its handle.
///
/// `op_ids` is the operation-id table built from `E::operations()` at
/// registration time; operation names outside it are interned lazily so a
/// misdeclared entity still gets tracked.
pub(crate) fn spawn_double<E: ActorEntity>(
    key: EntityKey,
    op_ids: HashMap<&'static str, OpId>,
    tracker: Arc<CallTracker>,
) -> MockHandle<E> {
    let (sender, mut receiver) = mpsc::channel::<ActorRequest<E>>(DOUBLE_BUFFER);
    let log = Arc::new(CallLog::default());
    let stubs: StubTable<E> = Arc::new(Mutex::new(HashMap::new()));

    let task_key = key.clone();
    let task_log = log.clone();
    let task_stubs = stubs.clone();
    tokio::spawn(async move {
        while let Some(request) = receiver.recv().await {
            let op = E::operation(&request.call);
            debug!(kind = E::KIND, key = %task_key, op, "Double called");
            task_log.record(op, format!("{:?}", request.call));

            let op_id = op_ids
                .get(op)
                .copied()
                .unwrap_or_else(|| tracker.operations().intern(op));
            tracker.record(E::KIND, op_id, &task_key);

            let reply = {
                let mut stubs = task_stubs.lock().unwrap();
                match stubs.get_mut(op) {
                    Some(stub) => stub(request.call),
                    None => Err(ActorError::Unstubbed { kind: E::KIND, op }),
                }
            };
            let _ = request.respond_to.send(reply);
        }
    });

    MockHandle {
        key,
        client: EntityClient::new(sender),
        log,
        stubs,
    }
}
