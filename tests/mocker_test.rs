use actor_testkit::ops::OperationTable;
use actor_testkit::silo::ClientFactory;
use actor_testkit::{
    ActorEntity, CallTracker, EntityKey, FactoryMocker, LocalSilo, MockError, Services, Times,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// --- Test Entity ---

struct Ledger {
    balance: i64,
}

#[derive(Debug)]
enum LedgerCall {
    Deposit(i64),
    Balance,
}

#[derive(Debug, thiserror::Error)]
#[error("ledger error")]
struct LedgerError;

#[async_trait]
impl ActorEntity for Ledger {
    const KIND: &'static str = "Ledger";
    type Call = LedgerCall;
    type Reply = i64;
    type Error = LedgerError;

    fn activate(_key: &EntityKey, _services: &Services) -> Result<Self, LedgerError> {
        Ok(Self { balance: 0 })
    }

    async fn handle(&mut self, call: LedgerCall, _services: &Services) -> Result<i64, LedgerError> {
        match call {
            LedgerCall::Deposit(amount) => {
                self.balance += amount;
                Ok(self.balance)
            }
            LedgerCall::Balance => Ok(self.balance),
        }
    }

    fn operations() -> &'static [&'static str] {
        &["deposit", "balance"]
    }

    fn operation(call: &LedgerCall) -> &'static str {
        match call {
            LedgerCall::Deposit(_) => "deposit",
            LedgerCall::Balance => "balance",
        }
    }
}

// --- Tests ---

#[tokio::test]
async fn lookup_without_registration_resolves_nothing() {
    let mocker = FactoryMocker::detached();
    let key = EntityKey::primary(Uuid::new_v4());
    assert!(mocker.lookup::<Ledger>(&key).unwrap().is_none());

    mocker.register::<Ledger>(EntityKey::any()).unwrap();
    assert!(mocker.lookup::<Ledger>(&key).unwrap().is_some());
}

#[tokio::test]
async fn duplicate_registration_is_rejected_and_first_survives() {
    let mocker = FactoryMocker::detached();
    let key = EntityKey::primary(Uuid::new_v4());

    let first = mocker.register::<Ledger>(key.clone()).unwrap();
    first.stub("balance", |_| Ok(7));

    let second = mocker.register::<Ledger>(key.clone());
    assert!(matches!(
        second,
        Err(MockError::DuplicateRegistration { kind: "Ledger", .. })
    ));

    // The original registration still answers.
    let client = mocker.lookup::<Ledger>(&key).unwrap().unwrap();
    assert_eq!(client.call(LedgerCall::Balance).await.unwrap(), 7);
}

#[tokio::test]
async fn verify_activated_fails_before_lookup_and_counts_exactly() {
    let mocker = FactoryMocker::detached();
    let key = EntityKey::primary(
        "11111111-1111-1111-1111-111111111111"
            .parse::<Uuid>()
            .unwrap(),
    );
    mocker.register::<Ledger>(key.clone()).unwrap();

    assert!(mocker
        .verify_activated::<Ledger>(&key, Times::AtLeastOnce)
        .is_err());

    mocker.lookup::<Ledger>(&key).unwrap();

    mocker
        .verify_activated::<Ledger>(&key, Times::AtLeastOnce)
        .unwrap();
    assert!(matches!(
        mocker.verify_activated::<Ledger>(&key, Times::Exactly(2)),
        Err(MockError::Verification(_))
    ));
}

#[tokio::test]
async fn wildcard_secondary_matches_any_compound_lookup() {
    let mocker = FactoryMocker::detached();
    let id = Uuid::new_v4();

    let handle = mocker.register::<Ledger>(EntityKey::primary(id)).unwrap();
    handle.stub("balance", |_| Ok(1));

    for shard in ["a", "b", "c"] {
        let client = mocker
            .lookup::<Ledger>(&EntityKey::compound(id, shard))
            .unwrap()
            .expect("wildcard secondary should match");
        assert_eq!(client.call(LedgerCall::Balance).await.unwrap(), 1);
    }
    assert!(mocker
        .lookup::<Ledger>(&EntityKey::primary(Uuid::new_v4()))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn most_specific_rule_wins_regardless_of_order() {
    let mocker = FactoryMocker::detached();
    let id = Uuid::new_v4();

    // Wildcard registered first, exact key second; then look up both ways.
    let fallback = mocker.register::<Ledger>(EntityKey::any()).unwrap();
    fallback.stub("balance", |_| Ok(1));
    let exact = mocker.register::<Ledger>(EntityKey::primary(id)).unwrap();
    exact.stub("balance", |_| Ok(2));

    let client = mocker
        .lookup::<Ledger>(&EntityKey::primary(id))
        .unwrap()
        .unwrap();
    assert_eq!(client.call(LedgerCall::Balance).await.unwrap(), 2);

    let client = mocker
        .lookup::<Ledger>(&EntityKey::primary(Uuid::new_v4()))
        .unwrap()
        .unwrap();
    assert_eq!(client.call(LedgerCall::Balance).await.unwrap(), 1);
}

#[tokio::test]
async fn clear_allows_reregistration_and_resets_history() {
    let mocker = FactoryMocker::detached();
    let key = EntityKey::primary(Uuid::new_v4());

    let handle = mocker.register::<Ledger>(key.clone()).unwrap();
    handle.stub("deposit", |_| Ok(0));
    let client = mocker.lookup::<Ledger>(&key).unwrap().unwrap();
    client.call(LedgerCall::Deposit(5)).await.unwrap();
    assert_eq!(handle.call_count(|c| c.op == "deposit"), 1);

    mocker.clear::<Ledger>();
    assert!(handle.calls().is_empty());
    assert!(mocker.handle::<Ledger>(&key).is_none());

    // Same key registers cleanly again.
    mocker.register::<Ledger>(key.clone()).unwrap();
}

#[tokio::test]
async fn clear_key_removes_only_that_double() {
    let mocker = FactoryMocker::detached();
    let keep = EntityKey::primary(Uuid::new_v4());
    let drop_key = EntityKey::primary(Uuid::new_v4());

    mocker.register::<Ledger>(keep.clone()).unwrap();
    mocker.register::<Ledger>(drop_key.clone()).unwrap();

    mocker.clear_key::<Ledger>(&drop_key);
    assert!(mocker.lookup::<Ledger>(&drop_key).unwrap().is_none());
    assert!(mocker.lookup::<Ledger>(&keep).unwrap().is_some());
}

#[tokio::test]
async fn verify_called_inspects_the_doubles_history() {
    let mocker = FactoryMocker::detached();
    let key = EntityKey::primary(Uuid::new_v4());

    let handle = mocker.register::<Ledger>(key.clone()).unwrap();
    handle.stub("deposit", |call| match call {
        LedgerCall::Deposit(amount) => Ok(amount),
        LedgerCall::Balance => Ok(0),
    });

    let client = mocker.lookup::<Ledger>(&key).unwrap().unwrap();
    client.call(LedgerCall::Deposit(42)).await.unwrap();
    client.call(LedgerCall::Deposit(43)).await.unwrap();

    mocker
        .verify_called::<Ledger>(&key, "deposit", Times::Exactly(2))
        .unwrap();
    mocker
        .verify_called::<Ledger>(&key, "balance", Times::Never)
        .unwrap();
    assert!(mocker
        .verify_called::<Ledger>(&key, "deposit", Times::Exactly(3))
        .is_err());
    mocker
        .verify_called_matching::<Ledger>(&key, |c| c.args.contains("42"), Times::Exactly(1))
        .unwrap();
}

#[tokio::test]
async fn lookup_callback_receives_the_concrete_key() {
    let mocker = FactoryMocker::detached();
    let id = Uuid::new_v4();
    let seen: Arc<std::sync::Mutex<Vec<EntityKey>>> = Arc::default();

    let seen_clone = seen.clone();
    mocker
        .register_with::<Ledger>(EntityKey::primary(id), move |key| {
            seen_clone.lock().unwrap().push(key.clone());
        })
        .unwrap();

    mocker
        .lookup::<Ledger>(&EntityKey::compound(id, "shard-3"))
        .unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![EntityKey::compound(id, "shard-3")]);
}

#[tokio::test]
async fn await_call_resolves_when_the_call_arrives() {
    let mocker = Arc::new(FactoryMocker::detached());
    let key = EntityKey::primary(Uuid::new_v4());

    let task_mocker = mocker.clone();
    let task_key = key.clone();
    let caller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let client = task_mocker.lookup::<Ledger>(&task_key).unwrap().unwrap();
        // No stub installed; the call still counts as observed.
        let _ = client.call(LedgerCall::Deposit(1)).await;
    });

    mocker
        .await_call::<Ledger>("deposit", Duration::from_secs(2), Some(key))
        .await
        .unwrap();
    caller.await.unwrap();
}

#[tokio::test]
async fn await_call_times_out_without_a_call() {
    let mocker = FactoryMocker::detached();
    let result = mocker
        .await_call::<Ledger>("balance", Duration::from_millis(30), None)
        .await;
    assert!(matches!(result, Err(MockError::Timeout(_))));
}

#[tokio::test]
async fn pass_through_delegates_to_the_real_factory() {
    let silo = LocalSilo::builder().host::<Ledger>().build();
    silo.start().unwrap();

    let ops = Arc::new(OperationTable::new());
    let factory: Arc<dyn ClientFactory> = silo.factory();
    let mocker = FactoryMocker::new(factory, Arc::new(CallTracker::new(ops)));
    mocker.pass_through::<Ledger>(EntityKey::any());

    // Unmocked keys reach a real activation with real state.
    let real_key = EntityKey::primary(Uuid::new_v4());
    let client = mocker.lookup::<Ledger>(&real_key).unwrap().unwrap();
    assert_eq!(client.call(LedgerCall::Deposit(10)).await.unwrap(), 10);
    assert_eq!(client.call(LedgerCall::Deposit(5)).await.unwrap(), 15);

    // A registered double is more specific than the pass-through rule.
    let mocked_key = EntityKey::primary(Uuid::new_v4());
    let handle = mocker.register::<Ledger>(mocked_key.clone()).unwrap();
    handle.stub("balance", |_| Ok(99));
    let client = mocker.lookup::<Ledger>(&mocked_key).unwrap().unwrap();
    assert_eq!(client.call(LedgerCall::Balance).await.unwrap(), 99);

    silo.stop().unwrap();
}
