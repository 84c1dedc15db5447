use bevy::prelude::*;

use crate::app::{DueSchedulerResource, SimulationTick};
use crate::scheduler::{DueEntry, Tick};

#[derive(Resource, Default, Debug, Clone, PartialEq, Eq)]
pub struct SubstrateMetrics {
    pub turn: u64,
    pub tick: Tick,
    pub registered: usize,
    pub pending: usize,
    pub processed_last: u32,
    pub refused_last: u32,
    pub clamped_last: u32,
    pub processed_total: u64,
    pub stale_events: u64,
    pub scheduler_errors: u64,
}

pub fn collect_metrics<E>(
    tick: Res<SimulationTick>,
    due: Res<DueSchedulerResource<E>>,
    mut metrics: ResMut<SubstrateMetrics>,
) where
    E: DueEntry + Send + Sync + 'static,
{
    metrics.turn += 1;
    metrics.tick = tick.0;

    let scheduler = due.scheduler();
    let stats = scheduler.stats();
    metrics.registered = scheduler.len();
    metrics.pending = scheduler.pending_len();
    metrics.processed_total = stats.processed;
    metrics.stale_events = stats.stale_events;

    let report = due.last_report();
    metrics.processed_last = report.processed;
    metrics.refused_last = report.refused;
    metrics.clamped_last = report.clamped;
    metrics.scheduler_errors = due.error_count();
}
