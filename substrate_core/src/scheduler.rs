//! Lazy due-event scheduler.
//!
//! Every registered entry owns at most one pending event keyed by
//! `(trigger_tick, stable_key, event_id)`. Advancing the scheduler only pops
//! events that have come due, so the work done by [`DueScheduler::advance`]
//! is proportional to the number of due entries and never to the registered
//! population. After an entry is processed it is asked for its next due tick
//! and re-queued (self-rescheduling).
//!
//! Advancing once to `T` leaves the scheduler in the same state as advancing
//! through any non-decreasing sequence of ticks ending at `T`, provided the
//! entries honour the [`DueEntry`] contract.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

pub type Tick = u64;

/// Per-entity behaviour driven by the scheduler.
///
/// `C` is the caller-owned world the entry needs while it is processed.
/// After `process_until(ctx, target)` returns, `next_due` is expected to
/// report a tick later than `target` (or `None`); an entry that keeps
/// reporting ticks at or before the target is processed again within the
/// same advance.
pub trait DueEntry<C: ?Sized = ()> {
    /// Next tick at which this entry wants processing, or `None` if idle.
    fn next_due(&self, now: Tick) -> Option<Tick>;

    /// Catches the entry up through `target`.
    fn process_until(&mut self, ctx: &mut C, target: Tick) -> ProcessStatus;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Ok,
    /// The entry declined to process. It is re-queued no earlier than the
    /// tick after the target.
    Refused,
}

/// Generational handle to a registered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryHandle {
    index: u32,
    generation: u32,
}

impl EntryHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Queue record. Field order is the ordering: trigger tick, then the stable
/// key of the owning entry, then the monotonic event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PendingEvent {
    pub trigger_tick: Tick,
    pub order_key: u64,
    pub event_id: u64,
    pub payload: EntryHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub entry_capacity: usize,
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            entry_capacity: 16_384,
            queue_capacity: 16_384,
        }
    }
}

impl SchedulerConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entry_capacity: capacity,
            queue_capacity: capacity,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("invalid scheduler argument")]
    Invalid,
    #[error("stable key {stable_key} is already registered")]
    Duplicate { stable_key: u64 },
    #[error("scheduler capacity exhausted")]
    Full,
    #[error("entry handle is stale or was never issued")]
    NotFound,
    #[error("cannot advance backwards from tick {current} to {requested}")]
    Backwards { current: Tick, requested: Tick },
    #[error("pending event queue is inconsistent")]
    QueueCorrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Scheduled(Tick),
    /// The entry asked for a tick in the past; it was queued at the
    /// scheduler's current tick instead.
    Clamped { requested: Tick, scheduled: Tick },
    Idle,
}

impl RefreshOutcome {
    pub fn scheduled_tick(&self) -> Option<Tick> {
        match *self {
            RefreshOutcome::Scheduled(tick) => Some(tick),
            RefreshOutcome::Clamped { scheduled, .. } => Some(scheduled),
            RefreshOutcome::Idle => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    pub processed: u32,
    pub refused: u32,
    pub clamped: u32,
    pub stale: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub registered: u64,
    pub unregistered: u64,
    pub processed: u64,
    pub clamped: u64,
    pub stale_events: u64,
}

/// Fixed-period due adapter: due at `anchor`, `anchor + interval`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub anchor: Tick,
    pub interval: Tick,
}

impl Cadence {
    pub fn new(anchor: Tick, interval: Tick) -> Self {
        Self { anchor, interval }
    }

    /// First cadence tick strictly after `tick`.
    pub fn next_after(&self, tick: Tick) -> Tick {
        if tick < self.anchor {
            return self.anchor;
        }
        if self.interval == 0 {
            return tick.saturating_add(1);
        }
        let elapsed = (tick - self.anchor) / self.interval + 1;
        self.anchor.saturating_add(elapsed.saturating_mul(self.interval))
    }

    /// First cadence tick at or after `tick`.
    pub fn next_at_or_after(&self, tick: Tick) -> Tick {
        if tick == 0 {
            return self.anchor;
        }
        self.next_after(tick - 1)
    }
}

#[derive(Debug)]
struct LiveEntry<E> {
    entry: E,
    stable_key: u64,
    pending: Option<PendingEvent>,
}

#[derive(Debug)]
struct EntrySlot<E> {
    generation: u32,
    live: Option<LiveEntry<E>>,
}

#[derive(Debug)]
pub struct DueScheduler<E> {
    slots: Vec<EntrySlot<E>>,
    free: Vec<u32>,
    keys: BTreeMap<u64, EntryHandle>,
    queue: BTreeSet<PendingEvent>,
    config: SchedulerConfig,
    current_tick: Tick,
    next_event_id: u64,
    stats: SchedulerStats,
}

impl<E> DueScheduler<E> {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::starting_at(config, 0)
    }

    pub fn starting_at(config: SchedulerConfig, start_tick: Tick) -> Self {
        Self {
            slots: Vec::with_capacity(config.entry_capacity),
            free: Vec::new(),
            keys: BTreeMap::new(),
            queue: BTreeSet::new(),
            config,
            current_tick: start_tick,
            next_event_id: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Like [`DueScheduler::new`] but rejects a configuration that could
    /// never hold an entry.
    pub fn try_new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        if config.entry_capacity == 0 || config.queue_capacity == 0 {
            return Err(SchedulerError::Invalid);
        }
        Ok(Self::new(config))
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Live entries.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.config.entry_capacity
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn peek_next_due(&self) -> Option<Tick> {
        self.queue.first().map(|event| event.trigger_tick)
    }

    pub fn handle_for_key(&self, stable_key: u64) -> Option<EntryHandle> {
        self.keys.get(&stable_key).copied()
    }

    pub fn entry(&self, handle: EntryHandle) -> Option<&E> {
        self.live(handle).map(|live| &live.entry)
    }

    /// Mutable access to an entry. Call [`DueScheduler::refresh`] afterwards
    /// if the mutation changes when the entry is due.
    pub fn entry_mut(&mut self, handle: EntryHandle) -> Option<&mut E> {
        self.live_mut(handle).map(|live| &mut live.entry)
    }

    pub fn stable_key(&self, handle: EntryHandle) -> Option<u64> {
        self.live(handle).map(|live| live.stable_key)
    }

    /// Tick of the entry's pending event, if any.
    pub fn due_tick(&self, handle: EntryHandle) -> Option<Tick> {
        self.live(handle)
            .and_then(|live| live.pending)
            .map(|event| event.trigger_tick)
    }

    /// Live handles in stable-key order.
    pub fn handles(&self) -> impl Iterator<Item = EntryHandle> + '_ {
        self.keys.values().copied()
    }

    pub fn unregister(&mut self, handle: EntryHandle) -> Result<E, SchedulerError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(SchedulerError::NotFound)?;
        let live = slot.live.take().ok_or(SchedulerError::NotFound)?;
        slot.generation = slot.generation.wrapping_add(1);

        if let Some(event) = live.pending {
            self.queue.remove(&event);
        }
        self.keys.remove(&live.stable_key);
        self.free.push(handle.index);
        self.stats.unregistered += 1;

        debug!(
            target: "substrate::scheduler",
            stable_key = live.stable_key,
            "entry.unregistered"
        );
        Ok(live.entry)
    }

    fn live(&self, handle: EntryHandle) -> Option<&LiveEntry<E>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.live.as_ref())
    }

    fn live_mut(&mut self, handle: EntryHandle) -> Option<&mut LiveEntry<E>> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.live.as_mut())
    }

    fn allocate_slot(&mut self) -> Option<u32> {
        if let Some(index) = self.free.pop() {
            return Some(index);
        }
        if self.slots.len() >= self.config.entry_capacity {
            return None;
        }
        self.slots.push(EntrySlot {
            generation: 0,
            live: None,
        });
        Some((self.slots.len() - 1) as u32)
    }

    fn cancel_pending(&mut self, handle: EntryHandle) {
        let pending = self.live_mut(handle).and_then(|live| live.pending.take());
        if let Some(event) = pending {
            self.queue.remove(&event);
        }
    }

    /// Re-queues `handle` at `due` (already clamped by the caller).
    fn enqueue(&mut self, handle: EntryHandle, due: Tick) -> Result<(), SchedulerError> {
        let event_id = self.next_event_id;
        let live = self.live_mut(handle).ok_or(SchedulerError::NotFound)?;
        let previous = live.pending.take();
        let event = PendingEvent {
            trigger_tick: due,
            order_key: live.stable_key,
            event_id,
            payload: handle,
        };
        if let Some(previous) = previous {
            self.queue.remove(&previous);
        } else if self.queue.len() >= self.config.queue_capacity {
            return Err(SchedulerError::Full);
        }
        self.next_event_id += 1;
        self.queue.insert(event);
        if let Some(live) = self.live_mut(handle) {
            live.pending = Some(event);
        }
        Ok(())
    }
}

impl<E> DueScheduler<E> {
    /// Registers `entry` under a globally unique `stable_key` and queues its
    /// first due tick.
    pub fn register<C: ?Sized>(
        &mut self,
        entry: E,
        stable_key: u64,
    ) -> Result<EntryHandle, SchedulerError>
    where
        E: DueEntry<C>,
    {
        if self.keys.contains_key(&stable_key) {
            return Err(SchedulerError::Duplicate { stable_key });
        }
        let index = self.allocate_slot().ok_or(SchedulerError::Full)?;
        let slot = &mut self.slots[index as usize];
        slot.live = Some(LiveEntry {
            entry,
            stable_key,
            pending: None,
        });
        let handle = EntryHandle {
            index,
            generation: slot.generation,
        };
        self.keys.insert(stable_key, handle);

        if let Err(err) = self.refresh::<C>(handle) {
            // roll back so a failed registration leaves no trace
            if let Some(slot) = self.slots.get_mut(index as usize) {
                slot.live = None;
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.keys.remove(&stable_key);
            self.free.push(index);
            return Err(err);
        }

        self.stats.registered += 1;
        debug!(
            target: "substrate::scheduler",
            stable_key,
            due = ?self.due_tick(handle),
            "entry.registered"
        );
        Ok(handle)
    }

    /// Re-derives the entry's next due tick and re-queues it.
    pub fn refresh<C: ?Sized>(
        &mut self,
        handle: EntryHandle,
    ) -> Result<RefreshOutcome, SchedulerError>
    where
        E: DueEntry<C>,
    {
        let now = self.current_tick;
        let live = self.live(handle).ok_or(SchedulerError::NotFound)?;
        let Some(requested) = <E as DueEntry<C>>::next_due(&live.entry, now) else {
            self.cancel_pending(handle);
            return Ok(RefreshOutcome::Idle);
        };

        if requested < now {
            self.enqueue(handle, now)?;
            self.stats.clamped += 1;
            warn!(
                target: "substrate::scheduler",
                stable_key = ?self.stable_key(handle),
                requested,
                scheduled = now,
                "refresh.clamped_backwards"
            );
            return Ok(RefreshOutcome::Clamped {
                requested,
                scheduled: now,
            });
        }

        self.enqueue(handle, requested)?;
        Ok(RefreshOutcome::Scheduled(requested))
    }

    /// Processes every entry due at or before `target`, in
    /// `(due tick, stable key)` order, then moves the clock to `target`.
    pub fn advance<C: ?Sized>(
        &mut self,
        ctx: &mut C,
        target: Tick,
    ) -> Result<AdvanceReport, SchedulerError>
    where
        E: DueEntry<C>,
    {
        if target < self.current_tick {
            return Err(SchedulerError::Backwards {
                current: self.current_tick,
                requested: target,
            });
        }

        let mut report = AdvanceReport::default();
        while let Some(event) = self.queue.first().copied() {
            if event.trigger_tick > target {
                break;
            }
            if self.queue.pop_first() != Some(event) {
                return Err(SchedulerError::QueueCorrupted);
            }

            let handle = event.payload;
            let tracked = self
                .live(handle)
                .and_then(|live| live.pending)
                .map(|pending| pending.event_id);
            if tracked != Some(event.event_id) {
                report.stale += 1;
                self.stats.stale_events += 1;
                continue;
            }

            let Some(live) = self.live_mut(handle) else {
                return Err(SchedulerError::QueueCorrupted);
            };
            live.pending = None;
            trace!(
                target: "substrate::scheduler",
                stable_key = live.stable_key,
                due = event.trigger_tick,
                target,
                "entry.process"
            );
            let status = live.entry.process_until(ctx, target);
            report.processed += 1;
            self.stats.processed += 1;

            let requeued = match status {
                ProcessStatus::Ok => self.refresh::<C>(handle),
                ProcessStatus::Refused => {
                    report.refused += 1;
                    self.defer_refused::<C>(handle, target)
                }
            };
            match requeued {
                Ok(RefreshOutcome::Clamped { .. }) => report.clamped += 1,
                Ok(_) => {}
                // the popped event freed a queue slot, so neither can happen
                Err(SchedulerError::Full) | Err(SchedulerError::NotFound) => {
                    return Err(SchedulerError::QueueCorrupted)
                }
                Err(err) => return Err(err),
            }
        }

        self.current_tick = target;
        if report.processed > 0 {
            debug!(
                target: "substrate::scheduler",
                tick = target,
                processed = report.processed,
                refused = report.refused,
                clamped = report.clamped,
                pending = self.queue.len(),
                "advance.completed"
            );
        }
        Ok(report)
    }

    /// Re-queues an entry that refused at `target` strictly after it, so the
    /// same advance cannot pick it up again.
    fn defer_refused<C: ?Sized>(
        &mut self,
        handle: EntryHandle,
        target: Tick,
    ) -> Result<RefreshOutcome, SchedulerError>
    where
        E: DueEntry<C>,
    {
        let live = self.live(handle).ok_or(SchedulerError::NotFound)?;
        let stable_key = live.stable_key;
        let requested = <E as DueEntry<C>>::next_due(&live.entry, self.current_tick);
        match requested {
            Some(requested) if requested > target => {
                self.enqueue(handle, requested)?;
                Ok(RefreshOutcome::Scheduled(requested))
            }
            Some(requested) => {
                let Some(scheduled) = target.checked_add(1) else {
                    self.cancel_pending(handle);
                    return Ok(RefreshOutcome::Idle);
                };
                self.enqueue(handle, scheduled)?;
                self.stats.clamped += 1;
                debug!(
                    target: "substrate::scheduler",
                    stable_key,
                    requested,
                    scheduled,
                    "refused.deferred"
                );
                Ok(RefreshOutcome::Clamped {
                    requested,
                    scheduled,
                })
            }
            None => {
                self.cancel_pending(handle);
                Ok(RefreshOutcome::Idle)
            }
        }
    }

    /// [`DueScheduler::advance`] for entries that need no context.
    pub fn advance_to(&mut self, target: Tick) -> Result<AdvanceReport, SchedulerError>
    where
        E: DueEntry,
    {
        self.advance(&mut (), target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fires every `interval` ticks, recording the targets it was run with.
    #[derive(Debug, Clone)]
    struct Ticker {
        id: u64,
        cadence: Cadence,
        next: Option<Tick>,
        runs: u32,
    }

    impl Ticker {
        fn new(id: u64, anchor: Tick, interval: Tick) -> Self {
            Self {
                id,
                cadence: Cadence::new(anchor, interval),
                next: Some(anchor),
                runs: 0,
            }
        }

        fn idle(id: u64) -> Self {
            Self {
                id,
                cadence: Cadence::new(0, 1),
                next: None,
                runs: 0,
            }
        }
    }

    impl DueEntry<Vec<u64>> for Ticker {
        fn next_due(&self, _now: Tick) -> Option<Tick> {
            self.next
        }

        fn process_until(&mut self, log: &mut Vec<u64>, target: Tick) -> ProcessStatus {
            while let Some(due) = self.next {
                if due > target {
                    break;
                }
                self.runs += 1;
                log.push(self.id);
                self.next = Some(self.cadence.next_after(due));
            }
            ProcessStatus::Ok
        }
    }

    fn scheduler() -> DueScheduler<Ticker> {
        DueScheduler::new(SchedulerConfig::with_capacity(64))
    }

    #[test]
    fn duplicate_stable_key_is_rejected() {
        let mut sched = scheduler();
        sched
            .register::<Vec<u64>>(Ticker::new(1, 5, 5), 1)
            .expect("first registration");
        let err = sched
            .register::<Vec<u64>>(Ticker::new(2, 5, 5), 1)
            .unwrap_err();
        assert_eq!(err, SchedulerError::Duplicate { stable_key: 1 });
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn zero_capacity_config_is_invalid() {
        let err = DueScheduler::<Ticker>::try_new(SchedulerConfig::with_capacity(0)).unwrap_err();
        assert_eq!(err, SchedulerError::Invalid);
        assert!(DueScheduler::<Ticker>::try_new(SchedulerConfig::default()).is_ok());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut sched = DueScheduler::new(SchedulerConfig::with_capacity(2));
        sched.register::<Vec<u64>>(Ticker::idle(1), 1).unwrap();
        sched.register::<Vec<u64>>(Ticker::idle(2), 2).unwrap();
        let err = sched.register::<Vec<u64>>(Ticker::idle(3), 3).unwrap_err();
        assert_eq!(err, SchedulerError::Full);
    }

    #[test]
    fn queue_capacity_failure_rolls_back_registration() {
        let mut sched = DueScheduler::new(SchedulerConfig {
            entry_capacity: 4,
            queue_capacity: 1,
        });
        sched.register::<Vec<u64>>(Ticker::new(1, 3, 3), 1).unwrap();
        let err = sched.register::<Vec<u64>>(Ticker::new(2, 3, 3), 2).unwrap_err();
        assert_eq!(err, SchedulerError::Full);
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.pending_len(), 1);
        assert!(sched.handle_for_key(2).is_none());
    }

    #[test]
    fn equal_due_ticks_run_in_stable_key_order() {
        let mut sched = scheduler();
        for key in [30u64, 10, 20] {
            sched.register::<Vec<u64>>(Ticker::new(key, 4, 100), key).unwrap();
        }
        let mut log = Vec::new();
        let report = sched.advance(&mut log, 4).unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(log, vec![10, 20, 30]);
    }

    #[test]
    fn advance_rejects_backwards_target() {
        let mut sched = scheduler();
        let mut log = Vec::new();
        sched.advance(&mut log, 10).unwrap();
        let err = sched.advance(&mut log, 9).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::Backwards {
                current: 10,
                requested: 9
            }
        );
        assert_eq!(sched.current_tick(), 10);
    }

    #[test]
    fn stale_handle_is_not_found_after_unregister() {
        let mut sched = scheduler();
        let handle = sched.register::<Vec<u64>>(Ticker::new(1, 2, 2), 1).unwrap();
        let entry = sched.unregister(handle).unwrap();
        assert_eq!(entry.id, 1);
        assert_eq!(sched.unregister(handle).unwrap_err(), SchedulerError::NotFound);
        assert_eq!(
            sched.refresh::<Vec<u64>>(handle).unwrap_err(),
            SchedulerError::NotFound
        );

        // the slot is reused under a new generation
        let reused = sched.register::<Vec<u64>>(Ticker::new(2, 2, 2), 2).unwrap();
        assert_eq!(reused.index(), handle.index());
        assert_ne!(reused.generation(), handle.generation());
        assert!(sched.entry(handle).is_none());
    }

    #[test]
    fn refresh_clamps_past_due_ticks() {
        let mut sched = scheduler();
        let mut log = Vec::new();
        sched.advance(&mut log, 50).unwrap();
        let handle = sched.register::<Vec<u64>>(Ticker::idle(9), 9).unwrap();

        sched.entry_mut(handle).unwrap().next = Some(12);
        let outcome = sched.refresh::<Vec<u64>>(handle).unwrap();
        assert_eq!(
            outcome,
            RefreshOutcome::Clamped {
                requested: 12,
                scheduled: 50
            }
        );
        assert_eq!(sched.due_tick(handle), Some(50));
        assert_eq!(sched.pending_len(), 1);
    }

    #[test]
    fn refresh_to_idle_cancels_pending_event() {
        let mut sched = scheduler();
        let handle = sched.register::<Vec<u64>>(Ticker::new(1, 7, 7), 1).unwrap();
        assert_eq!(sched.pending_len(), 1);
        sched.entry_mut(handle).unwrap().next = None;
        assert_eq!(
            sched.refresh::<Vec<u64>>(handle).unwrap(),
            RefreshOutcome::Idle
        );
        assert_eq!(sched.pending_len(), 0);
        assert_eq!(sched.due_tick(handle), None);
    }

    #[test]
    fn cadence_steps_past_the_given_tick() {
        let cadence = Cadence::new(5, 3);
        assert_eq!(cadence.next_after(0), 5);
        assert_eq!(cadence.next_after(5), 8);
        assert_eq!(cadence.next_after(9), 11);
        assert_eq!(cadence.next_at_or_after(8), 8);
        assert_eq!(cadence.next_at_or_after(0), 5);
    }

    #[test]
    fn self_rescheduling_catches_up_in_one_call() {
        let mut sched = scheduler();
        let handle = sched.register::<Vec<u64>>(Ticker::new(1, 2, 2), 1).unwrap();
        let mut log = Vec::new();
        let report = sched.advance(&mut log, 9).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(sched.entry(handle).unwrap().runs, 4);
        assert_eq!(sched.due_tick(handle), Some(10));
    }

    /// Refuses every call without moving its due tick.
    #[derive(Debug)]
    struct Stubborn {
        due: Tick,
        calls: u32,
    }

    impl DueEntry for Stubborn {
        fn next_due(&self, _now: Tick) -> Option<Tick> {
            Some(self.due)
        }

        fn process_until(&mut self, _ctx: &mut (), _target: Tick) -> ProcessStatus {
            self.calls += 1;
            ProcessStatus::Refused
        }
    }

    #[test]
    fn refusing_entry_is_deferred_past_the_target() {
        let mut sched = DueScheduler::new(SchedulerConfig::with_capacity(4));
        let handle = sched
            .register::<()>(Stubborn { due: 5, calls: 0 }, 1)
            .unwrap();

        let report = sched.advance_to(5).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.refused, 1);
        assert_eq!(report.clamped, 1);
        assert_eq!(sched.entry(handle).unwrap().calls, 1);
        assert_eq!(sched.due_tick(handle), Some(6));

        // retried once per advance, never twice within one
        let report = sched.advance_to(8).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(sched.entry(handle).unwrap().calls, 2);
        assert_eq!(sched.due_tick(handle), Some(9));
    }
}
