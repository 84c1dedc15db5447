//! Bevy wiring: one turn advances the simulation tick and pumps the due
//! scheduler up to it.

use std::marker::PhantomData;

use bevy::prelude::*;
use tracing::{trace, warn};

use crate::config::SubstrateConfig;
use crate::metrics::{collect_metrics, SubstrateMetrics};
use crate::scheduler::{
    AdvanceReport, DueEntry, DueScheduler, EntryHandle, SchedulerConfig, SchedulerError, Tick,
};

#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationTick(pub Tick);

/// Due scheduler owned by the world, plus the outcome of the last pump.
#[derive(Debug)]
pub struct DueSchedulerResource<E> {
    scheduler: DueScheduler<E>,
    last_report: AdvanceReport,
    last_error: Option<SchedulerError>,
    error_count: u64,
}

impl<E: Send + Sync + 'static> Resource for DueSchedulerResource<E> {}

impl<E> DueSchedulerResource<E> {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            scheduler: DueScheduler::new(config),
            last_report: AdvanceReport::default(),
            last_error: None,
            error_count: 0,
        }
    }

    pub fn scheduler(&self) -> &DueScheduler<E> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut DueScheduler<E> {
        &mut self.scheduler
    }

    pub fn last_report(&self) -> AdvanceReport {
        self.last_report
    }

    pub fn last_error(&self) -> Option<SchedulerError> {
        self.last_error
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }
}

impl<E: DueEntry> DueSchedulerResource<E> {
    pub fn register(&mut self, entry: E, stable_key: u64) -> Result<EntryHandle, SchedulerError> {
        self.scheduler.register::<()>(entry, stable_key)
    }

    fn pump(&mut self, target: Tick) {
        match self.scheduler.advance_to(target) {
            Ok(report) => {
                self.last_report = report;
                self.last_error = None;
            }
            Err(err) => {
                warn!(
                    target: "substrate::app",
                    tick = target,
                    error = %err,
                    "scheduler.pump_failed"
                );
                self.last_report = AdvanceReport::default();
                self.last_error = Some(err);
                self.error_count += 1;
            }
        }
    }
}

pub fn advance_tick(mut tick: ResMut<SimulationTick>) {
    tick.0 += 1;
}

pub fn pump_due_scheduler<E>(tick: Res<SimulationTick>, mut due: ResMut<DueSchedulerResource<E>>)
where
    E: DueEntry + Send + Sync + 'static,
{
    due.pump(tick.0);
    trace!(
        target: "substrate::app",
        tick = tick.0,
        processed = due.last_report().processed,
        "scheduler.pumped"
    );
}

/// Installs a [`DueSchedulerResource<E>`] and the per-turn system chain
/// `advance_tick → pump_due_scheduler → collect_metrics`.
pub struct DueSchedulerPlugin<E> {
    config: SchedulerConfig,
    _entries: PhantomData<fn() -> E>,
}

impl<E> DueSchedulerPlugin<E> {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            _entries: PhantomData,
        }
    }
}

impl<E> Plugin for DueSchedulerPlugin<E>
where
    E: DueEntry + Send + Sync + 'static,
{
    fn build(&self, app: &mut App) {
        app.insert_resource(DueSchedulerResource::<E>::new(self.config))
            .init_resource::<SimulationTick>()
            .init_resource::<SubstrateMetrics>()
            .add_systems(
                Update,
                (
                    advance_tick,
                    pump_due_scheduler::<E>,
                    collect_metrics::<E>,
                )
                    .chain(),
            );
    }
}

/// Construct a headless Bevy [`App`] driving a due scheduler of `E`.
pub fn build_headless_app<E>(config: &SubstrateConfig) -> App
where
    E: DueEntry + Send + Sync + 'static,
{
    let mut app = App::new();
    app.insert_resource(config.clone())
        .add_plugins(MinimalPlugins)
        .add_plugins(DueSchedulerPlugin::<E>::new(config.scheduler()));
    app
}

/// Execute a single turn: tick increment, scheduler pump, metrics.
pub fn run_turn(app: &mut App) {
    app.update();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Cadence, ProcessStatus};

    #[derive(Debug)]
    struct Beacon {
        cadence: Cadence,
        next: Option<Tick>,
        fired: u32,
    }

    impl DueEntry for Beacon {
        fn next_due(&self, _now: Tick) -> Option<Tick> {
            self.next
        }

        fn process_until(&mut self, _ctx: &mut (), target: Tick) -> ProcessStatus {
            while let Some(due) = self.next.filter(|due| *due <= target) {
                self.fired += 1;
                self.next = Some(self.cadence.next_after(due));
            }
            ProcessStatus::Ok
        }
    }

    #[test]
    fn turns_pump_due_entries() {
        let mut app = build_headless_app::<Beacon>(&SubstrateConfig::default());
        let handle = app
            .world
            .resource_mut::<DueSchedulerResource<Beacon>>()
            .register(
                Beacon {
                    cadence: Cadence::new(2, 2),
                    next: Some(2),
                    fired: 0,
                },
                1,
            )
            .expect("register");

        for _ in 0..5 {
            run_turn(&mut app);
        }

        assert_eq!(app.world.resource::<SimulationTick>().0, 5);
        let due = app.world.resource::<DueSchedulerResource<Beacon>>();
        let beacon = due.scheduler().entry(handle).expect("entry");
        assert_eq!(beacon.fired, 2);
        assert_eq!(due.scheduler().due_tick(handle), Some(6));

        let metrics = app.world.resource::<SubstrateMetrics>();
        assert_eq!(metrics.turn, 5);
        assert_eq!(metrics.processed_total, 2);
        assert_eq!(metrics.registered, 1);
        assert_eq!(metrics.scheduler_errors, 0);
    }
}
