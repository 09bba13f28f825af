//! # Call-Readiness Tracker
//!
//! A counter-based latch: tests register a [`ReadinessTicket`] for an
//! `(scope, operation, key)` triple and a required call count, providers and
//! mock doubles report calls through [`CallTracker::record`], and the ticket's
//! future resolves once the count is reached.
//!
//! The tracker is instance scoped. Every harness owns its own tracker and
//! hands it to the providers it constructs, so concurrent harnesses never
//! observe each other's calls.
//!
//! # Concurrency
//!
//! `record` decrements, removes, and takes the completion signal under one
//! lock, so a ticket fires exactly once no matter how many worker threads race
//! the final call. Records that match no active ticket are silent no-ops.

use crate::error::MockError;
use crate::key::EntityKey;
use crate::ops::{OpId, OperationTable};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

struct TicketEntry {
    scope: String,
    op: OpId,
    pattern: EntityKey,
    remaining: u32,
    signal: oneshot::Sender<()>,
}

/// Shared registry of pending readiness tickets.
pub struct CallTracker {
    ops: Arc<OperationTable>,
    tickets: Mutex<Vec<TicketEntry>>,
}

impl CallTracker {
    pub fn new(ops: Arc<OperationTable>) -> Self {
        Self {
            ops,
            tickets: Mutex::new(Vec::new()),
        }
    }

    pub fn operations(&self) -> &Arc<OperationTable> {
        &self.ops
    }

    /// Registers a ticket that fires once `calls` matching calls occurred.
    ///
    /// The key is a pattern: wildcard fields match any recorded key. Fails
    /// with [`MockError::DuplicateTicket`] while a ticket for the same triple
    /// is still pending. `calls` is clamped to at least one.
    pub fn ticket(
        &self,
        scope: impl Into<String>,
        op: OpId,
        pattern: EntityKey,
        calls: u32,
    ) -> Result<ReadinessTicket, MockError> {
        let scope = scope.into();
        let mut tickets = self.tickets.lock().unwrap();
        if tickets
            .iter()
            .any(|t| t.scope == scope && t.op == op && t.pattern == pattern)
        {
            return Err(MockError::DuplicateTicket {
                scope,
                op: self.ops.name(op),
                key: pattern,
            });
        }
        let (signal, rx) = oneshot::channel();
        debug!(scope = %scope, op = self.ops.name(op), key = %pattern, calls, "Ticket created");
        tickets.push(TicketEntry {
            scope,
            op,
            pattern,
            remaining: calls.max(1),
            signal,
        });
        Ok(ReadinessTicket { rx })
    }

    /// Reports one call against the first matching ticket, if any.
    pub fn record(&self, scope: &str, op: OpId, key: &EntityKey) {
        let fired = {
            let mut tickets = self.tickets.lock().unwrap();
            let position = tickets
                .iter()
                .position(|t| t.scope == scope && t.op == op && t.pattern.matches(key));
            match position {
                Some(idx) => {
                    tickets[idx].remaining -= 1;
                    if tickets[idx].remaining == 0 {
                        Some(tickets.swap_remove(idx))
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(ticket) = fired {
            debug!(scope, op = self.ops.name(op), key = %key, "Ticket fired");
            let _ = ticket.signal.send(());
        }
    }

    /// Number of tickets that have not fired yet.
    pub fn pending(&self) -> usize {
        self.tickets.lock().unwrap().len()
    }
}

/// Single-use completion handle returned by [`CallTracker::ticket`].
pub struct ReadinessTicket {
    rx: oneshot::Receiver<()>,
}

impl ReadinessTicket {
    /// Waits for the ticket to fire, failing with [`MockError::Timeout`] once
    /// `timeout` elapses.
    pub async fn wait(self, timeout: Duration) -> Result<(), MockError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(MockError::TrackerGone),
            Err(_) => Err(MockError::Timeout(timeout)),
        }
    }

    /// Non-blocking check; true once the ticket has fired.
    pub fn try_fired(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> Arc<CallTracker> {
        Arc::new(CallTracker::new(Arc::new(OperationTable::new())))
    }

    #[tokio::test]
    async fn fires_after_required_calls() {
        let tracker = tracker();
        let op = tracker.operations().intern("write");
        let key = EntityKey::primary("42");

        let mut ticket = tracker.ticket("Order", op, key.clone(), 3).unwrap();
        tracker.record("Order", op, &key);
        tracker.record("Order", op, &key);
        assert!(!ticket.try_fired());

        tracker.record("Order", op, &key);
        ticket.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(tracker.pending(), 0);

        // Further matching calls are silent no-ops.
        tracker.record("Order", op, &key);
    }

    #[tokio::test]
    async fn duplicate_ticket_is_rejected() {
        let tracker = tracker();
        let op = tracker.operations().intern("read");
        let key = EntityKey::primary("state");

        let _first = tracker.ticket("Doc", op, key.clone(), 1).unwrap();
        let second = tracker.ticket("Doc", op, key.clone(), 1);
        assert!(matches!(second, Err(MockError::DuplicateTicket { .. })));
        assert_eq!(tracker.pending(), 1);
    }

    #[tokio::test]
    async fn mismatched_records_do_not_count() {
        let tracker = tracker();
        let write = tracker.operations().intern("write");
        let read = tracker.operations().intern("read");
        let key = EntityKey::primary("a");

        let mut ticket = tracker.ticket("Doc", write, key.clone(), 1).unwrap();
        tracker.record("Doc", read, &key);
        tracker.record("Other", write, &key);
        tracker.record("Doc", write, &EntityKey::primary("b"));
        assert!(!ticket.try_fired());

        tracker.record("Doc", write, &key);
        ticket.wait(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn wildcard_pattern_matches_any_key() {
        let tracker = tracker();
        let op = tracker.operations().intern("publish");

        let ticket = tracker.ticket("events", op, EntityKey::any(), 2).unwrap();
        tracker.record("events", op, &EntityKey::primary(uuid::Uuid::new_v4()));
        tracker.record("events", op, &EntityKey::primary(uuid::Uuid::new_v4()));
        ticket.wait(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_fire_exactly_once() {
        let tracker = tracker();
        let op = tracker.operations().intern("write");
        let key = EntityKey::primary("hot");

        let ticket = tracker.ticket("Doc", op, key.clone(), 8).unwrap();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let tracker = tracker.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                tracker.record("Doc", op, &key);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        ticket.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn wait_times_out_without_calls() {
        let tracker = tracker();
        let op = tracker.operations().intern("clear");
        let ticket = tracker
            .ticket("Doc", op, EntityKey::primary("x"), 1)
            .unwrap();
        let result = ticket.wait(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(MockError::Timeout(_))));
    }
}
