use crate::batch::BatchRef;
use crate::io::base::{BaseRx, BaseTx};
use crate::io::idle::IdleWait;
use crate::io::mpmc::{MpmcChannel, MpmcReceiver, MpmcSender};
use crate::io::spsc::{SpscQueue, SpscReceiver, SpscSender};
use crate::report::{Report, ReportCallFn};
use crate::state::RunState;
use crate::ticker::{TickChan, Ticker};
use crate::utils::{CancelToken, HealthFlag};
use anyhow::{anyhow, bail, Context, Result};
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Per-host wiring derived by the coordinator from its own config and the
/// host index. Names are deterministic so a run is reproducible.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Host name, also the ticker subscription name: `rh/<i>/<report-name>`.
    pub name: String,
    /// Worker thread name: `rh/<i>`.
    pub thread_name: String,
    /// Capacity of the inbound batch queue, in batch references.
    pub batch_capacity: usize,
}

/// Shared ingest counters of one host. Written by the host worker and the
/// dispatch path, readable from anywhere.
#[derive(Debug, Default)]
pub struct HostCounters {
    packets_received: CachePadded<AtomicU64>,
    batches_dropped: CachePadded<AtomicU64>,
}

impl HostCounters {
    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    pub fn batches_dropped(&self) -> u64 {
        self.batches_dropped.load(Ordering::Relaxed)
    }

    fn add_received(&self, n: u64) {
        self.packets_received.fetch_add(n, Ordering::Relaxed);
    }

    fn add_dropped(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

struct HostCall<P> {
    func: ReportCallFn<P>,
    reply_tx: MpmcSender<Result<()>>,
}

struct ShutdownRequest {
    reply_tx: MpmcSender<()>,
}

struct WorkerChannels<P> {
    batch_rx: SpscReceiver<BatchRef<P>>,
    call_rx: MpmcReceiver<HostCall<P>>,
    shutdown_rx: MpmcReceiver<ShutdownRequest>,
}

/// Supervisor of one report: owns its worker thread, its bounded inbound
/// queue and its control channels.
///
/// All access to the report happens on the worker thread; outsiders ship
/// callbacks in through [`call_with_report`](Self::call_with_report)
/// instead of taking locks.
pub struct ReportHost<P> {
    conf: HostConfig,
    ticker: Arc<Ticker>,
    state: RunState,
    batch_tx: SpscSender<BatchRef<P>>,
    call_tx: MpmcSender<HostCall<P>>,
    shutdown_tx: MpmcSender<ShutdownRequest>,
    seed: Option<WorkerChannels<P>>,
    counters: Arc<HostCounters>,
    health: HealthFlag,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl<P: Send + Sync + 'static> ReportHost<P> {
    /// Bind the host's channels. The worker does not exist until
    /// [`startup`](Self::startup).
    pub fn new(conf: HostConfig, ticker: Arc<Ticker>) -> Self {
        let (batch_tx, batch_rx) = SpscQueue::bounded(conf.batch_capacity);
        let (call_tx, call_rx) = MpmcChannel::bounded(1);
        let (shutdown_tx, shutdown_rx) = MpmcChannel::bounded(1);

        Self {
            conf,
            ticker,
            state: RunState::Created,
            batch_tx,
            call_tx,
            shutdown_tx,
            seed: Some(WorkerChannels {
                batch_rx,
                call_rx,
                shutdown_rx,
            }),
            counters: Arc::new(HostCounters::default()),
            health: HealthFlag::new(false),
            cancel: CancelToken::new_root(),
            handle: None,
        }
    }

    /// Take ownership of the report and start the worker thread.
    ///
    /// Subscribes to the ticker at `time_window / tick_count` under the
    /// host name; the report's tick state is initialized on the worker
    /// thread before any other delivery.
    pub fn startup(&mut self, report: Box<dyn Report<P>>) -> Result<()> {
        if self.state != RunState::Created {
            bail!("report host {} is already started", self.conf.name);
        }

        let info = report.info();
        let interval = info
            .tick_interval()
            .ok_or_else(|| anyhow!("report {}: tick_count must be non-zero", report.name()))?;

        let tick_chan = self
            .ticker
            .subscribe(interval, &self.conf.name)
            .with_context(|| format!("report host {} startup", self.conf.name))?;

        let seed = match self.seed.take() {
            Some(seed) => seed,
            None => bail!("report host {}: worker channels already consumed", self.conf.name),
        };

        let spawned = thread::Builder::new().name(self.conf.thread_name.clone()).spawn({
            let worker = HostWorker {
                name: self.conf.name.clone(),
                report,
                tick_chan,
                chans: seed,
                counters: self.counters.clone(),
                ticker: self.ticker.clone(),
            };
            let health = self.health.clone();

            move || {
                health.up();
                worker.run();
                health.down();
            }
        });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = RunState::Running;
                Ok(())
            }
            Err(e) => {
                // The subscription was created above; free the name so a
                // retry under the same host name can succeed.
                self.ticker.release(&self.conf.name);
                Err(anyhow!(
                    "report host {}: failed to spawn worker thread: {e}",
                    self.conf.name
                ))
            }
        }
    }

    /// Non-blocking enqueue of a shared batch.
    ///
    /// A full queue drops the batch and bumps the drop counter; the
    /// dispatch path must never stall on one slow host, so there is no
    /// error to return.
    pub fn process_batch(&mut self, batch: BatchRef<P>) {
        let count = batch.packet_count();
        if self.batch_tx.try_send(batch).is_err() {
            self.counters.add_dropped();
            crate::warn_throttled!(
                Duration::from_secs(1),
                "[{}] inbound queue full, dropped batch of {} packets",
                self.conf.name,
                count
            );
        }
    }

    /// Run `func` against the report on its worker thread and wait for the
    /// result.
    pub fn call_with_report(&mut self, func: ReportCallFn<P>) -> Result<()> {
        if self.state != RunState::Running {
            bail!("report host {} is not running", self.conf.name);
        }

        let (reply_tx, mut reply_rx) = MpmcChannel::bounded::<Result<()>>(1);
        self.call_tx
            .try_send(HostCall { func, reply_tx })
            .map_err(|e| anyhow!("report host {}: control send failed: {e}", self.conf.name))?;

        reply_rx
            .recv(&self.cancel, None)
            .map_err(|e| anyhow!("report host {}: control reply lost: {e}", self.conf.name))?
    }

    /// Signal the worker, wait for its acknowledgement, then join the
    /// thread. After this returns the ticker subscription under the host
    /// name has been released.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state != RunState::Running {
            bail!(
                "report host {} is not running (state: {})",
                self.conf.name,
                self.state
            );
        }
        self.state = RunState::Stopping;

        let (reply_tx, mut reply_rx) = MpmcChannel::bounded::<()>(1);
        self.shutdown_tx
            .try_send(ShutdownRequest { reply_tx })
            .map_err(|e| anyhow!("report host {}: shutdown send failed: {e}", self.conf.name))?;

        reply_rx
            .recv(&self.cancel, None)
            .map_err(|e| anyhow!("report host {}: shutdown ack lost: {e}", self.conf.name))?;

        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("report host {}: worker thread panicked", self.conf.name))?;
        }

        self.state = RunState::Stopped;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.conf.name
    }

    pub fn counters(&self) -> &HostCounters {
        &self.counters
    }

    /// Whether the worker loop is currently alive.
    pub fn is_healthy(&self) -> bool {
        self.health.get()
    }

    pub fn state(&self) -> RunState {
        self.state
    }
}

struct HostWorker<P> {
    name: String,
    report: Box<dyn Report<P>>,
    tick_chan: TickChan,
    chans: WorkerChannels<P>,
    counters: Arc<HostCounters>,
    ticker: Arc<Ticker>,
}

impl<P: Send + Sync + 'static> HostWorker<P> {
    fn run(mut self) {
        tracing::debug!("[{}] worker started", self.name);
        self.report.ticks_init(Instant::now());

        let mut idle = IdleWait::new();
        let mut stop = false;

        while !stop {
            let mut progress = false;

            if let Ok(now) = self.tick_chan.try_recv() {
                self.report.tick_now(now);
                progress = true;
            }

            if let Ok(batch) = self.chans.batch_rx.try_recv() {
                self.counters.add_received(batch.packet_count() as u64);
                self.report.add_multi(batch.packets());
                progress = true;
            }

            if let Ok(call) = self.chans.call_rx.try_recv() {
                let HostCall { func, mut reply_tx } = call;
                let result = func(self.report.as_mut());
                let _ = reply_tx.try_send(result);
                progress = true;
            }

            if let Ok(req) = self.chans.shutdown_rx.try_recv() {
                let ShutdownRequest { mut reply_tx } = req;
                let _ = reply_tx.try_send(());
                stop = true;
                progress = true;
            }

            if progress {
                idle.reset();
            } else {
                idle.wait();
            }
        }

        // Free the subscription before the thread ends so the caller's
        // join guarantees the name is reusable.
        let HostWorker {
            name,
            tick_chan,
            ticker,
            ..
        } = self;
        if let Err(err) = ticker.unsubscribe(tick_chan) {
            tracing::warn!("[{name}] ticker unsubscribe failed: {err:#}");
        }
        tracing::debug!("[{name}] worker stopped");
    }
}
