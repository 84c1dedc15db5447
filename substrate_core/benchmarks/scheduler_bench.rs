use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use substrate_core::{Cadence, DueEntry, DueScheduler, ProcessStatus, SchedulerConfig, Tick};

struct Sleeper {
    cadence: Cadence,
    next: Option<Tick>,
}

impl DueEntry for Sleeper {
    fn next_due(&self, _now: Tick) -> Option<Tick> {
        self.next
    }

    fn process_until(&mut self, _ctx: &mut (), target: Tick) -> ProcessStatus {
        while let Some(due) = self.next.filter(|due| *due <= target) {
            self.next = Some(self.cadence.next_after(due));
        }
        ProcessStatus::Ok
    }
}

/// Mostly idle population: one entry in `population` wakes every tick.
fn populated(population: u64) -> DueScheduler<Sleeper> {
    let mut scheduler = DueScheduler::new(SchedulerConfig::with_capacity(population as usize));
    for key in 0..population {
        let interval = if key == 0 { 1 } else { 1_000_000 };
        let entry = Sleeper {
            cadence: Cadence::new(interval, interval),
            next: Some(interval),
        };
        if scheduler.register::<()>(entry, key).is_err() {
            break;
        }
    }
    scheduler
}

fn bench_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_advance");

    for population in [1_000u64, 10_000, 100_000] {
        group.bench_with_input(
            BenchmarkId::new("idle_population", population),
            &population,
            |b, &population| {
                b.iter_batched(
                    || populated(population),
                    |mut scheduler| {
                        for tick in 1..=64 {
                            let _ = scheduler.advance_to(tick);
                        }
                    },
                    BatchSize::LargeInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(scheduler_benches, bench_advance);
criterion_main!(scheduler_benches);
