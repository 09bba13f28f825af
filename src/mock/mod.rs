//! # Factory Mocker
//!
//! The keyed capability registry at the center of the testkit. Tests register
//! doubles for `(entity type, key)` identities; code under test resolves
//! clients through [`FactoryMocker::lookup`] and transparently receives the
//! double, a pass-through to the real silo factory, or nothing.
//!
//! ## Dispatch rules
//!
//! Every registration installs a dispatch rule whose pattern is the
//! registration key; unspecified key fields are wildcards. Resolution picks
//! the **most specific** matching rule (ties broken by registration order),
//! so an exact-key double always beats an overlapping wildcard one no matter
//! which was registered first.
//!
//! ## Verification
//!
//! Verification methods are point-in-time assertions over already-recorded
//! history; they never wait or retry. For readiness-style tests use
//! [`FactoryMocker::await_call`], which resolves once a matching call occurs
//! or fails after a timeout.

pub mod double;

pub use double::{CallLog, MockHandle, RecordedCall};

use crate::error::{MockError, SiloError};
use crate::key::EntityKey;
use crate::ops::OperationTable;
use crate::runtime::{ActorEntity, EntityClient};
use crate::silo::ClientFactory;
use crate::tracker::CallTracker;
use double::spawn_double;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// VERIFICATION TIMES
// =============================================================================

/// Expected call-count constraint for verification methods.
#[derive(Clone, Copy, Debug)]
pub enum Times {
    AtLeastOnce,
    AtLeast(usize),
    Exactly(usize),
    Never,
}

impl Times {
    pub fn check(self, observed: usize) -> bool {
        match self {
            Times::AtLeastOnce => observed >= 1,
            Times::AtLeast(n) => observed >= n,
            Times::Exactly(n) => observed == n,
            Times::Never => observed == 0,
        }
    }
}

impl fmt::Display for Times {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Times::AtLeastOnce => write!(f, "at least once"),
            Times::AtLeast(n) => write!(f, "at least {n}"),
            Times::Exactly(n) => write!(f, "exactly {n}"),
            Times::Never => write!(f, "never"),
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

type LookupCallback = Arc<dyn Fn(&EntityKey) + Send + Sync>;

enum RuleTarget {
    Double,
    PassThru,
}

struct Rule {
    pattern: EntityKey,
    target: RuleTarget,
}

struct DoubleEntry {
    handle: Arc<dyn Any + Send + Sync>,
    client: Arc<dyn Any + Send + Sync>,
    reset: Box<dyn Fn() + Send + Sync>,
    on_lookup: Option<LookupCallback>,
}

struct Namespace {
    kind: &'static str,
    rules: Vec<Rule>,
    doubles: HashMap<EntityKey, DoubleEntry>,
    activations: Vec<EntityKey>,
}

impl Namespace {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            rules: Vec::new(),
            doubles: HashMap::new(),
            activations: Vec::new(),
        }
    }
}

/// Registry of mock doubles and dispatch rules, bound to a real backing
/// factory for pass-through resolution.
pub struct FactoryMocker {
    real: Option<Arc<dyn ClientFactory>>,
    tracker: Arc<CallTracker>,
    registry: Mutex<HashMap<TypeId, Namespace>>,
}

impl FactoryMocker {
    /// A mocker bound to a real factory; pass-through rules delegate to it.
    pub fn new(real: Arc<dyn ClientFactory>, tracker: Arc<CallTracker>) -> Self {
        Self {
            real: Some(real),
            tracker,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// A standalone mocker with no backing factory. Pass-through rules
    /// resolve to nothing; everything else behaves identically.
    pub fn detached() -> Self {
        let ops = Arc::new(OperationTable::new());
        Self {
            real: None,
            tracker: Arc::new(CallTracker::new(ops)),
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracker(&self) -> &Arc<CallTracker> {
        &self.tracker
    }

    /// Registers a double for `key` under `E`'s namespace.
    ///
    /// Fails with [`MockError::DuplicateRegistration`] if that exact key
    /// already holds a double; the first registration is left intact.
    pub fn register<E: ActorEntity>(&self, key: EntityKey) -> Result<MockHandle<E>, MockError> {
        self.register_inner::<E>(key, None)
    }

    /// Like [`FactoryMocker::register`], additionally invoking `on_lookup`
    /// with the concrete key every time a lookup resolves to this double.
    pub fn register_with<E: ActorEntity>(
        &self,
        key: EntityKey,
        on_lookup: impl Fn(&EntityKey) + Send + Sync + 'static,
    ) -> Result<MockHandle<E>, MockError> {
        self.register_inner::<E>(key, Some(Arc::new(on_lookup)))
    }

    fn register_inner<E: ActorEntity>(
        &self,
        key: EntityKey,
        on_lookup: Option<LookupCallback>,
    ) -> Result<MockHandle<E>, MockError> {
        let mut registry = self.registry.lock().unwrap();
        let ns = registry
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Namespace::new(E::KIND));
        if ns.doubles.contains_key(&key) {
            return Err(MockError::DuplicateRegistration { kind: E::KIND, key });
        }

        // Operation-id table for this entity, built at registration time.
        let ops = self.tracker.operations();
        let mut op_ids = HashMap::new();
        for &op in E::operations() {
            op_ids.insert(op, ops.intern(op));
        }

        let handle = spawn_double::<E>(key.clone(), op_ids, self.tracker.clone());
        ns.doubles.insert(
            key.clone(),
            DoubleEntry {
                handle: Arc::new(handle.clone()),
                client: Arc::new(handle.client()),
                reset: handle.reset_fn(),
                on_lookup,
            },
        );
        ns.rules.push(Rule {
            pattern: key.clone(),
            target: RuleTarget::Double,
        });
        debug!(kind = E::KIND, key = %key, "Double registered");
        Ok(handle)
    }

    /// Installs a pass-through rule: lookups matching `pattern` with no more
    /// specific double resolve against the real backing factory.
    pub fn pass_through<E: ActorEntity>(&self, pattern: EntityKey) {
        let mut registry = self.registry.lock().unwrap();
        let ns = registry
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Namespace::new(E::KIND));
        debug!(kind = E::KIND, pattern = %pattern, "Pass-through installed");
        ns.rules.push(Rule {
            pattern,
            target: RuleTarget::PassThru,
        });
    }

    /// Resolves a client for `(E, key)`.
    ///
    /// Records the lookup in the activation history, then applies the
    /// most-specific matching dispatch rule. Returns `Ok(None)` when nothing
    /// matches (the unmocked default).
    pub fn lookup<E: ActorEntity>(
        &self,
        key: &EntityKey,
    ) -> Result<Option<EntityClient<E>>, SiloError> {
        enum Hit {
            Double(Arc<dyn Any + Send + Sync>, Option<LookupCallback>),
            Pass,
            Miss,
        }

        let hit = {
            let mut registry = self.registry.lock().unwrap();
            let ns = registry
                .entry(TypeId::of::<E>())
                .or_insert_with(|| Namespace::new(E::KIND));
            ns.activations.push(key.clone());

            let mut best: Option<(usize, u8)> = None;
            for (idx, rule) in ns.rules.iter().enumerate() {
                if rule.pattern.matches(key) {
                    let specificity = rule.pattern.specificity();
                    if best.map_or(true, |(_, s)| specificity > s) {
                        best = Some((idx, specificity));
                    }
                }
            }
            match best {
                None => Hit::Miss,
                Some((idx, _)) => {
                    let rule = &ns.rules[idx];
                    match rule.target {
                        RuleTarget::PassThru => Hit::Pass,
                        RuleTarget::Double => match ns.doubles.get(&rule.pattern) {
                            Some(entry) => {
                                Hit::Double(entry.client.clone(), entry.on_lookup.clone())
                            }
                            None => Hit::Miss,
                        },
                    }
                }
            }
        };

        match hit {
            Hit::Double(client, on_lookup) => {
                debug!(kind = E::KIND, key = %key, "Lookup resolved to double");
                if let Some(callback) = on_lookup {
                    callback(key);
                }
                Ok(client
                    .downcast::<EntityClient<E>>()
                    .ok()
                    .map(|c| (*c).clone()))
            }
            Hit::Pass => {
                let Some(real) = &self.real else {
                    return Ok(None);
                };
                debug!(kind = E::KIND, key = %key, "Lookup passed through");
                let erased = real.resolve(TypeId::of::<E>(), E::KIND, key)?;
                Ok(erased
                    .downcast::<EntityClient<E>>()
                    .ok()
                    .map(|c| (*c).clone()))
            }
            Hit::Miss => Ok(None),
        }
    }

    /// The handle of the double registered under exactly `key`, if any.
    pub fn handle<E: ActorEntity>(&self, key: &EntityKey) -> Option<MockHandle<E>> {
        let registry = self.registry.lock().unwrap();
        let entry = registry.get(&TypeId::of::<E>())?.doubles.get(key)?;
        entry
            .handle
            .clone()
            .downcast::<MockHandle<E>>()
            .ok()
            .map(|h| (*h).clone())
    }

    /// Removes every double registered under `E`, resetting their recorded
    /// history. Pass-through rules and the activation history survive.
    pub fn clear<E: ActorEntity>(&self) {
        let mut registry = self.registry.lock().unwrap();
        if let Some(ns) = registry.get_mut(&TypeId::of::<E>()) {
            for (_, entry) in ns.doubles.drain() {
                (entry.reset)();
            }
            ns.rules
                .retain(|rule| matches!(rule.target, RuleTarget::PassThru));
            debug!(kind = ns.kind, "Doubles cleared");
        }
    }

    /// Removes the double registered under exactly `key`, resetting its
    /// recorded history.
    pub fn clear_key<E: ActorEntity>(&self, key: &EntityKey) {
        let mut registry = self.registry.lock().unwrap();
        if let Some(ns) = registry.get_mut(&TypeId::of::<E>()) {
            if let Some(entry) = ns.doubles.remove(key) {
                (entry.reset)();
                ns.rules.retain(|rule| {
                    matches!(rule.target, RuleTarget::PassThru) || rule.pattern != *key
                });
                debug!(kind = ns.kind, key = %key, "Double cleared");
            }
        }
    }

    /// Asserts on the lookup history for `E`: the number of recorded lookups
    /// matching `pattern` must satisfy `times`.
    pub fn verify_activated<E: ActorEntity>(
        &self,
        pattern: &EntityKey,
        times: Times,
    ) -> Result<(), MockError> {
        let observed = {
            let registry = self.registry.lock().unwrap();
            registry.get(&TypeId::of::<E>()).map_or(0, |ns| {
                ns.activations.iter().filter(|k| pattern.matches(k)).count()
            })
        };
        if times.check(observed) {
            Ok(())
        } else {
            Err(MockError::Verification(format!(
                "{} lookups for key {pattern}: expected {times}, observed {observed}",
                E::KIND
            )))
        }
    }

    /// Asserts on the double's own invocation history: the number of recorded
    /// calls to operation `op` must satisfy `times`.
    pub fn verify_called<E: ActorEntity>(
        &self,
        key: &EntityKey,
        op: &str,
        times: Times,
    ) -> Result<(), MockError> {
        self.verify_called_matching::<E>(key, |call| call.op == op, times)
    }

    /// Asserts on the double's invocation history with an arbitrary matcher
    /// over the recorded operation and arguments.
    pub fn verify_called_matching<E: ActorEntity>(
        &self,
        key: &EntityKey,
        matcher: impl Fn(&RecordedCall) -> bool,
        times: Times,
    ) -> Result<(), MockError> {
        let handle = self.handle::<E>(key).ok_or_else(|| {
            MockError::Verification(format!(
                "no {} double registered for key {key}",
                E::KIND
            ))
        })?;
        let observed = handle.call_count(matcher);
        if times.check(observed) {
            Ok(())
        } else {
            Err(MockError::Verification(format!(
                "{} calls on key {key}: expected {times} matching calls, observed {observed}",
                E::KIND
            )))
        }
    }

    /// Waits until one call to operation `op` occurs on the double registered
    /// under `pattern` (the fully wildcard key when `None`), registering the
    /// double first when it does not exist yet.
    ///
    /// Fails with [`MockError::Timeout`] if no matching call arrives in time.
    pub async fn await_call<E: ActorEntity>(
        &self,
        op: &'static str,
        timeout: Duration,
        pattern: Option<EntityKey>,
    ) -> Result<(), MockError> {
        let pattern = pattern.unwrap_or_else(EntityKey::any);
        let op_id = self.tracker.operations().intern(op);
        let ticket = self.tracker.ticket(E::KIND, op_id, pattern.clone(), 1)?;

        let registered = {
            let registry = self.registry.lock().unwrap();
            registry
                .get(&TypeId::of::<E>())
                .is_some_and(|ns| ns.doubles.contains_key(&pattern))
        };
        if !registered {
            match self.register::<E>(pattern) {
                Ok(_) | Err(MockError::DuplicateRegistration { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        ticket.wait(timeout).await
    }
}
