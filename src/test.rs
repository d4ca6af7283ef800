#[cfg(test)]
mod tests {
    use crate::batch::PacketBatch;
    use crate::config::CoordinatorConfig;
    use crate::coordinator::{ControlRequest, ControlResponse, Coordinator};
    use crate::io::base::{BaseRx, BaseTx};
    use crate::io::mpmc::MpmcChannel;
    use crate::report::{Report, ReportInfo, SnapshotBox};
    use crate::state::RunState;
    use crate::ticker::Ticker;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct TestSnapshot {
        packet_count: usize,
        sum: u64,
        ticks: u64,
    }

    /// Lets a test pin the worker inside `add_multi` until released.
    #[derive(Clone, Default)]
    struct Gate {
        entered: Arc<AtomicBool>,
        release: Arc<AtomicBool>,
    }

    impl Gate {
        fn hold(&self) {
            self.entered.store(true, Ordering::Release);
            while !self.release.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
        }

        fn wait_entered(&self, timeout: Duration) -> bool {
            let deadline = Instant::now() + timeout;
            while !self.entered.load(Ordering::Acquire) {
                if Instant::now() > deadline {
                    return false;
                }
                thread::sleep(Duration::from_millis(1));
            }
            true
        }

        fn open(&self) {
            self.release.store(true, Ordering::Release);
        }
    }

    struct SummingReport {
        name: String,
        info: ReportInfo,
        sum: u64,
        packet_count: usize,
        ticks: u64,
        last_tick: Option<Instant>,
        gate: Option<Gate>,
    }

    impl SummingReport {
        fn new(name: &str) -> Self {
            Self::with_window(name, Duration::from_secs(1), 10)
        }

        fn with_window(name: &str, time_window: Duration, tick_count: u32) -> Self {
            Self {
                name: name.to_string(),
                info: ReportInfo {
                    time_window,
                    tick_count,
                },
                sum: 0,
                packet_count: 0,
                ticks: 0,
                last_tick: None,
                gate: None,
            }
        }

        fn gated(name: &str, gate: Gate) -> Self {
            let mut report = Self::new(name);
            report.gate = Some(gate);
            report
        }
    }

    impl Report<u64> for SummingReport {
        fn name(&self) -> &str {
            &self.name
        }

        fn info(&self) -> ReportInfo {
            self.info
        }

        fn ticks_init(&mut self, now: Instant) {
            self.last_tick = Some(now);
        }

        fn tick_now(&mut self, now: Instant) {
            if let Some(last) = self.last_tick {
                assert!(now >= last, "tick timestamps must be non-decreasing");
            }
            self.last_tick = Some(now);
            self.ticks += 1;
        }

        fn add_multi(&mut self, packets: &[u64]) {
            if let Some(gate) = &self.gate {
                gate.hold();
            }
            self.packet_count += packets.len();
            self.sum += packets.iter().sum::<u64>();
        }

        fn get_snapshot(&self) -> SnapshotBox {
            Box::new(TestSnapshot {
                packet_count: self.packet_count,
                sum: self.sum,
                ticks: self.ticks,
            })
        }
    }

    fn test_coordinator(host_batch_capacity: usize) -> (Coordinator<u64>, Arc<Ticker>) {
        let ticker = Arc::new(Ticker::new());
        let conf = CoordinatorConfig {
            host_batch_capacity: Some(host_batch_capacity),
            tick_period_ms: Some(100),
            ..Default::default()
        };
        let mut coordinator = Coordinator::new(conf, ticker.clone());
        coordinator.startup().expect("coordinator startup");
        (coordinator, ticker)
    }

    fn add_report(coordinator: &Coordinator<u64>, report: SummingReport) -> ControlResponse {
        coordinator
            .request(ControlRequest::AddReport(Box::new(report)))
            .expect("request failed")
    }

    fn push_batch(coordinator: &mut Coordinator<u64>, packets: Vec<u64>) {
        coordinator
            .input_tx()
            .try_send(PacketBatch::shared(packets))
            .expect("input queue full");
    }

    fn snapshot_of(coordinator: &Coordinator<u64>, name: &str) -> TestSnapshot {
        let resp = coordinator
            .request(ControlRequest::GetReportSnapshot(name.to_string()))
            .expect("request failed");
        let snapshot = resp.into_snapshot().expect("expected a snapshot response");
        *snapshot
            .downcast::<TestSnapshot>()
            .expect("snapshot payload type")
    }

    /// (packets_received, batches_dropped) of one host, read through an
    /// ad-hoc registry callback.
    fn host_stats(coordinator: &Coordinator<u64>, name: &str) -> (u64, u64) {
        let (mut stats_tx, mut stats_rx) = MpmcChannel::bounded::<(u64, u64)>(1);
        let lookup = name.to_string();

        let resp = coordinator
            .request(ControlRequest::Call(Box::new(move |registry| {
                let host = registry
                    .get(&lookup)
                    .ok_or_else(|| anyhow!("unknown report: {lookup}"))?;
                let _ = stats_tx.try_send((
                    host.counters().packets_received(),
                    host.counters().batches_dropped(),
                ));
                Ok(())
            })))
            .expect("request failed");
        assert!(resp.is_ok(), "stats callback failed: {:?}", resp.message());

        stats_rx.try_recv().expect("stats callback did not run")
    }

    fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !check() {
            if Instant::now() > deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    #[test]
    fn empty_fanout_drops_batches_silently() {
        // With no hosts, batches vanish and shutdown is clean.
        let (mut coordinator, _ticker) = test_coordinator(8);

        push_batch(&mut coordinator, vec![1, 2, 3]);
        push_batch(&mut coordinator, vec![4]);
        thread::sleep(Duration::from_millis(50));

        coordinator.shutdown().unwrap();
        assert_eq!(coordinator.state(), RunState::Stopped);
    }

    #[test]
    fn single_host_receives_all_packets() {
        // A single host sees exactly the pushed packets.
        let (mut coordinator, _ticker) = test_coordinator(8);

        assert!(add_report(&coordinator, SummingReport::new("traffic")).is_ok());

        push_batch(&mut coordinator, vec![1, 2, 3]);
        push_batch(&mut coordinator, vec![10, 20, 30, 40, 50]);

        assert!(wait_until(Duration::from_secs(2), || {
            host_stats(&coordinator, "traffic").0 == 8
        }));

        let snapshot = snapshot_of(&coordinator, "traffic");
        assert_eq!(snapshot.packet_count, 8);
        assert_eq!(snapshot.sum, 156);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn duplicate_add_is_rejected() {
        // A second add under the same name errors; the first host keeps
        // working.
        let (mut coordinator, _ticker) = test_coordinator(8);

        assert!(add_report(&coordinator, SummingReport::new("dup")).is_ok());

        let resp = add_report(&coordinator, SummingReport::new("dup"));
        assert!(resp.is_error());
        assert!(resp.message().unwrap().contains("dup"));

        push_batch(&mut coordinator, vec![7, 7]);
        assert!(wait_until(Duration::from_secs(2), || {
            host_stats(&coordinator, "dup").0 == 2
        }));
        assert_eq!(snapshot_of(&coordinator, "dup").packet_count, 2);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn delete_unknown_report_errors_and_coordinator_survives() {
        // An unknown delete gets a descriptive error; coordinator stays up.
        let (mut coordinator, _ticker) = test_coordinator(8);

        let resp = coordinator
            .request(ControlRequest::DeleteReport("nope".to_string()))
            .unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.message().unwrap(), "unknown report: nope");

        assert!(add_report(&coordinator, SummingReport::new("alive")).is_ok());
        coordinator.shutdown().unwrap();
    }

    #[test]
    fn slow_host_drops_exactly_the_overflow() {
        // With the worker pinned inside add_multi, K batches queue and the
        // overflow drops and is counted; nothing crashes.
        const K: usize = 4;
        let (mut coordinator, _ticker) = test_coordinator(K);

        let gate = Gate::default();
        assert!(add_report(&coordinator, SummingReport::gated("slow", gate.clone())).is_ok());

        // First batch: the worker pops it and blocks inside the report.
        push_batch(&mut coordinator, vec![100]);
        assert!(gate.wait_entered(Duration::from_secs(2)), "worker never ingested");

        // Fill the queue, then overflow it.
        for i in 0..K as u64 {
            push_batch(&mut coordinator, vec![i]);
        }
        for i in 0..5u64 {
            push_batch(&mut coordinator, vec![1000 + i]);
        }

        assert!(wait_until(Duration::from_secs(2), || {
            host_stats(&coordinator, "slow").1 == 5
        }));

        gate.open();
        assert!(wait_until(Duration::from_secs(2), || {
            host_stats(&coordinator, "slow").0 == (1 + K) as u64
        }));

        let (received, dropped) = host_stats(&coordinator, "slow");
        assert_eq!(received, (1 + K) as u64);
        assert_eq!(dropped, 5);
        assert_eq!(snapshot_of(&coordinator, "slow").packet_count, 1 + K);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn shutdown_joins_all_hosts_and_frees_ticker_names() {
        // All worker threads join before shutdown() returns, and the host
        // names are immediately reusable at the ticker.
        let (mut coordinator, ticker) = test_coordinator(8);

        for name in ["r1", "r2", "r3"] {
            assert!(add_report(&coordinator, SummingReport::new(name)).is_ok());
        }
        assert_eq!(ticker.subscription_count(), 4); // 3 hosts + coordinator

        coordinator.shutdown().unwrap();
        assert_eq!(coordinator.state(), RunState::Stopped);
        assert_eq!(ticker.subscription_count(), 0);

        for (index, name) in ["r1", "r2", "r3"].iter().enumerate() {
            let sub_name = format!("rh/{index}/{name}");
            let chan = ticker
                .subscribe(Duration::from_millis(50), &sub_name)
                .expect("host ticker name should be free after shutdown");
            ticker.unsubscribe(chan).unwrap();
        }
    }

    #[test]
    fn registry_tracks_adds_and_deletes() {
        let (mut coordinator, _ticker) = test_coordinator(8);

        for name in ["a", "b", "c"] {
            assert!(add_report(&coordinator, SummingReport::new(name)).is_ok());
        }
        assert!(coordinator
            .request(ControlRequest::DeleteReport("b".to_string()))
            .unwrap()
            .is_ok());

        let (mut names_tx, mut names_rx) = MpmcChannel::bounded::<Vec<String>>(1);
        let resp = coordinator
            .request(ControlRequest::Call(Box::new(move |registry| {
                anyhow::ensure!(registry.len() == 2, "expected 2 hosts, got {}", registry.len());
                anyhow::ensure!(!registry.is_empty());
                anyhow::ensure!(registry.contains("a") && !registry.contains("b"));
                let mut names = registry.names();
                names.sort();
                let _ = names_tx.try_send(names);
                Ok(())
            })))
            .unwrap();
        assert!(resp.is_ok());
        assert_eq!(names_rx.try_recv().unwrap(), vec!["a", "c"]);

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn call_errors_become_error_responses() {
        let (mut coordinator, _ticker) = test_coordinator(8);

        let resp = coordinator
            .request(ControlRequest::Call(Box::new(|_registry| {
                Err(anyhow!("inspection blew up"))
            })))
            .unwrap();
        assert!(resp.is_error());
        assert!(resp.message().unwrap().contains("inspection blew up"));

        // The loop survives a failing callback.
        assert!(add_report(&coordinator, SummingReport::new("after")).is_ok());
        coordinator.shutdown().unwrap();
    }

    #[test]
    fn host_ticks_at_configured_cadence() {
        // time_window=1s, tick_count=10 => ~100ms ticks.
        let (mut coordinator, _ticker) = test_coordinator(8);

        assert!(add_report(
            &coordinator,
            SummingReport::with_window("cadence", Duration::from_secs(1), 10),
        )
        .is_ok());

        thread::sleep(Duration::from_millis(550));
        let snapshot = snapshot_of(&coordinator, "cadence");
        assert!(
            (2..=8).contains(&snapshot.ticks),
            "expected ~5 ticks, got {}",
            snapshot.ticks
        );

        coordinator.shutdown().unwrap();
    }

    #[test]
    fn request_requires_running_coordinator() {
        let ticker = Arc::new(Ticker::new());
        let coordinator = Coordinator::<u64>::new(CoordinatorConfig::default(), ticker);

        let err = coordinator
            .request(ControlRequest::DeleteReport("x".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("not running"));
    }

    #[test]
    fn startup_twice_fails() {
        let ticker = Arc::new(Ticker::new());
        let mut coordinator = Coordinator::<u64>::new(CoordinatorConfig::default(), ticker);

        coordinator.startup().unwrap();
        let err = coordinator.startup().unwrap_err();
        assert!(err.to_string().contains("already started"));

        coordinator.shutdown().unwrap();

        // Stopped is terminal.
        assert!(coordinator.startup().is_err());
        assert!(coordinator
            .request(ControlRequest::DeleteReport("x".to_string()))
            .is_err());
    }
}
