use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aggrelay::batch::PacketBatch;
use aggrelay::config::CoordinatorConfig;
use aggrelay::coordinator::{ControlRequest, Coordinator};
use aggrelay::io::mpmc::MpmcChannel;
use aggrelay::prelude::{BaseRx, BaseTx, Report, ReportInfo, SnapshotBox, Ticker};

const BATCH_SIZE: usize = 64;

struct DrainReport {
    name: String,
    packets: u64,
}

impl Report<u64> for DrainReport {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> ReportInfo {
        ReportInfo {
            time_window: Duration::from_secs(60),
            tick_count: 60,
        }
    }

    fn ticks_init(&mut self, _now: Instant) {}

    fn tick_now(&mut self, _now: Instant) {}

    fn add_multi(&mut self, packets: &[u64]) {
        self.packets += black_box(packets.len() as u64);
    }

    fn get_snapshot(&self) -> SnapshotBox {
        Box::new(self.packets)
    }
}

/// Push `batches` through a coordinator with `hosts` live hosts and wait
/// until every host has drained everything.
fn run_fanout(hosts: usize, batches: u64) -> Duration {
    let ticker = Arc::new(Ticker::new());
    let conf = CoordinatorConfig {
        input_capacity: Some(4096),
        host_batch_capacity: Some(batches as usize + 1),
        ..Default::default()
    };
    let mut coordinator = Coordinator::<u64>::new(conf, ticker);
    coordinator.startup().unwrap();

    for i in 0..hosts {
        let resp = coordinator
            .request(ControlRequest::AddReport(Box::new(DrainReport {
                name: format!("bench-{i}"),
                packets: 0,
            })))
            .unwrap();
        assert!(resp.is_ok());
    }

    let payload: Vec<u64> = (0..BATCH_SIZE as u64).collect();
    let expected = batches * BATCH_SIZE as u64;

    let start = Instant::now();
    for _ in 0..batches {
        let batch = PacketBatch::shared(payload.clone());
        while coordinator.input_tx().try_send(batch.clone()).is_err() {
            std::hint::spin_loop();
        }
    }

    // Quiesce: every host has ingested every packet.
    loop {
        let (mut done_tx, mut done_rx) = MpmcChannel::bounded::<bool>(1);
        let resp = coordinator
            .request(ControlRequest::Call(Box::new(move |registry| {
                let done = registry
                    .names()
                    .iter()
                    .all(|name| match registry.get(name) {
                        Some(host) => host.counters().packets_received() >= expected,
                        None => false,
                    });
                let _ = done_tx.try_send(done);
                Ok(())
            })))
            .unwrap();
        assert!(resp.is_ok());
        if done_rx.try_recv().unwrap_or(false) {
            break;
        }
    }
    let elapsed = start.elapsed();

    coordinator.shutdown().unwrap();
    elapsed
}

pub fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinator_fanout");

    for &hosts in &[1usize, 4, 16] {
        group.bench_function(BenchmarkId::from_parameter(hosts), |b| {
            b.iter_custom(|n| {
                let mut total = Duration::ZERO;
                for _ in 0..n {
                    total += run_fanout(hosts, 512);
                }
                total
            });
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(3))
        .sample_size(10);
    targets = bench_fanout
}
criterion_main!(benches);
