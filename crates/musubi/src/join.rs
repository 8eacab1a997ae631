//! Accumulator for steps that need several event kinds jointly.

use musubi_core::{Event, EventKind, StepName};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

/// Result of contributing one event to a join.
#[derive(Debug)]
pub enum Contribution<E> {
    /// Stored; the join still misses at least one kind.
    Pending,
    /// The join is complete. Events are ordered as the required kinds.
    Ready(Vec<E>),
    /// The join already fired in this run, or the kind is not required.
    Dropped(E),
}

/// A join that has received some but not all of its kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingJoin {
    /// The joining step.
    pub step: StepName,
    /// Kinds still missing.
    pub missing: Vec<EventKind>,
}

impl fmt::Display for PendingJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let missing: Vec<&str> = self.missing.iter().map(EventKind::as_str).collect();
        write!(f, "{} missing [{}]", self.step, missing.join(", "))
    }
}

struct JoinSlot<E> {
    required: Vec<EventKind>,
    received: HashMap<EventKind, E>,
    fired: bool,
}

/// Per-run buffer of partially satisfied joins.
///
/// Each join fires exactly once per run: the contribution that completes the
/// set takes it out under the same lock acquisition that stored it, so racing
/// contributors can never both observe [`Contribution::Ready`]. A kind that
/// arrives twice before the join fires replaces the earlier event.
///
/// # Examples
///
/// ```
/// use musubi::{Contribution, Event, EventKind, JoinBuffer, StepName};
///
/// #[derive(Debug, Clone)]
/// struct Tagged(EventKind);
///
/// impl Event for Tagged {
///     fn kind(&self) -> EventKind {
///         self.0
///     }
/// }
///
/// let report = EventKind::new("ReportParsed");
/// let rules = EventKind::new("RulesExtracted");
/// let step = StepName::new("validate");
/// let buffer = JoinBuffer::new();
///
/// assert!(matches!(buffer.contribute(&step, &[report, rules], Tagged(rules)), Contribution::Pending));
/// assert!(matches!(buffer.contribute(&step, &[report, rules], Tagged(report)), Contribution::Ready(_)));
/// assert!(matches!(buffer.contribute(&step, &[report, rules], Tagged(report)), Contribution::Dropped(_)));
/// ```
pub struct JoinBuffer<E> {
    slots: Mutex<HashMap<StepName, JoinSlot<E>>>,
}

impl<E> fmt::Debug for JoinBuffer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        f.debug_struct("JoinBuffer")
            .field("steps", &slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<E: Event> Default for JoinBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> JoinBuffer<E> {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Stores `event` for `step` and releases the full set once complete.
    pub fn contribute(&self, step: &StepName, required: &[EventKind], event: E) -> Contribution<E> {
        let kind = event.kind();
        if !required.contains(&kind) {
            return Contribution::Dropped(event);
        }

        let mut slots = self.slots.lock();
        let slot = slots.entry(step.clone()).or_insert_with(|| JoinSlot {
            required: required.to_vec(),
            received: HashMap::new(),
            fired: false,
        });
        if slot.fired {
            return Contribution::Dropped(event);
        }

        slot.received.insert(kind, event);
        if !slot.required.iter().all(|k| slot.received.contains_key(k)) {
            return Contribution::Pending;
        }

        slot.fired = true;
        let mut received = std::mem::take(&mut slot.received);
        let ready = slot
            .required
            .iter()
            .filter_map(|k| received.remove(k))
            .collect();
        Contribution::Ready(ready)
    }

    /// Returns `true` once the step's join has fired in this run.
    pub fn has_fired(&self, step: &str) -> bool {
        self.slots.lock().get(step).is_some_and(|slot| slot.fired)
    }

    /// Returns joins that received some input but have not fired, sorted by step.
    pub fn pending(&self) -> Vec<PendingJoin> {
        let slots = self.slots.lock();
        let mut pending: Vec<PendingJoin> = slots
            .iter()
            .filter(|(_, slot)| !slot.fired)
            .map(|(step, slot)| PendingJoin {
                step: step.clone(),
                missing: slot
                    .required
                    .iter()
                    .filter(|k| !slot.received.contains_key(*k))
                    .copied()
                    .collect(),
            })
            .collect();
        pending.sort_by(|a, b| a.step.cmp(&b.step));
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const A: EventKind = EventKind::new("A");
    const B: EventKind = EventKind::new("B");
    const C: EventKind = EventKind::new("C");

    #[derive(Debug, Clone, PartialEq)]
    struct Tagged(EventKind, u32);

    impl Event for Tagged {
        fn kind(&self) -> EventKind {
            self.0
        }
    }

    #[test]
    fn test_ready_ordered_by_requirement() {
        let buffer = JoinBuffer::new();
        let step = StepName::new("join");
        let required = [A, B, C];

        assert!(matches!(buffer.contribute(&step, &required, Tagged(C, 3)), Contribution::Pending));
        assert!(matches!(buffer.contribute(&step, &required, Tagged(A, 1)), Contribution::Pending));
        match buffer.contribute(&step, &required, Tagged(B, 2)) {
            Contribution::Ready(events) => {
                assert_eq!(events, vec![Tagged(A, 1), Tagged(B, 2), Tagged(C, 3)]);
            }
            other => panic!("expected ready, got {other:?}"),
        }
        assert!(buffer.has_fired("join"));
    }

    #[test]
    fn test_latest_event_of_a_kind_wins() {
        let buffer = JoinBuffer::new();
        let step = StepName::new("join");

        buffer.contribute(&step, &[A, B], Tagged(A, 1));
        buffer.contribute(&step, &[A, B], Tagged(A, 2));
        match buffer.contribute(&step, &[A, B], Tagged(B, 0)) {
            Contribution::Ready(events) => assert_eq!(events[0], Tagged(A, 2)),
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_late_and_foreign_events_dropped() {
        let buffer = JoinBuffer::new();
        let step = StepName::new("join");

        assert!(matches!(buffer.contribute(&step, &[A, B], Tagged(C, 0)), Contribution::Dropped(_)));
        buffer.contribute(&step, &[A, B], Tagged(A, 0));
        buffer.contribute(&step, &[A, B], Tagged(B, 0));
        assert!(matches!(buffer.contribute(&step, &[A, B], Tagged(A, 9)), Contribution::Dropped(Tagged(_, 9))));
    }

    #[test]
    fn test_pending_reports_missing_kinds() {
        let buffer = JoinBuffer::new();
        buffer.contribute(&StepName::new("validate"), &[A, B], Tagged(B, 0));

        let pending = buffer.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].missing, vec![A]);
        assert_eq!(pending[0].to_string(), "validate missing [A]");
    }

    #[test]
    fn test_joins_are_keyed_per_step() {
        let buffer = JoinBuffer::new();
        let first = StepName::new("first");
        let second = StepName::new("second");

        buffer.contribute(&first, &[A, B], Tagged(A, 0));
        assert!(matches!(buffer.contribute(&second, &[A, B], Tagged(B, 0)), Contribution::Pending));
        assert!(matches!(buffer.contribute(&first, &[A, B], Tagged(B, 0)), Contribution::Ready(_)));
        assert!(!buffer.has_fired("second"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_exactly_once_under_concurrent_contributions() {
        let kinds: Vec<EventKind> = ["K0", "K1", "K2", "K3", "K4", "K5"]
            .into_iter()
            .map(EventKind::new)
            .collect();

        for trial in 0..200u32 {
            let buffer = Arc::new(JoinBuffer::new());
            let fired = Arc::new(AtomicUsize::new(0));
            let step = StepName::new("join");
            let mut handles = Vec::new();

            // Every kind is contributed twice to also race duplicates against the pop.
            for (i, kind) in kinds.iter().chain(kinds.iter()).enumerate() {
                let buffer = Arc::clone(&buffer);
                let fired = Arc::clone(&fired);
                let step = step.clone();
                let required = kinds.clone();
                let event = Tagged(*kind, trial * 100 + i as u32);
                handles.push(tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    if let Contribution::Ready(events) = buffer.contribute(&step, &required, event) {
                        assert_eq!(events.len(), required.len());
                        fired.fetch_add(1, Ordering::SeqCst);
                    }
                }));
            }
            for handle in handles {
                handle.await.expect("contributor task");
            }

            assert_eq!(fired.load(Ordering::SeqCst), 1, "trial {trial}");
            assert!(buffer.pending().is_empty());
        }
    }
}
