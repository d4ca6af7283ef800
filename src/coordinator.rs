use crate::batch::BatchRef;
use crate::config::CoordinatorConfig;
use crate::host::{HostConfig, ReportHost};
use crate::io::base::{BaseRx, BaseTx};
use crate::io::idle::IdleWait;
use crate::io::mpmc::{MpmcChannel, MpmcReceiver, MpmcSender};
use crate::io::spsc::{SpscQueue, SpscReceiver, SpscSender};
use crate::report::{Report, SnapshotBox};
use crate::state::RunState;
use crate::ticker::{TickChan, Ticker};
use crate::utils::CancelToken;
use anyhow::{anyhow, bail, Result};
use std::collections::hash_map;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Outcome tag of a generic control response.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ControlStatus {
    Ok,
    Error,
}

/// Reply to one control request. Exactly one per request.
#[derive(Debug)]
pub enum ControlResponse {
    Generic {
        status: ControlStatus,
        message: Option<String>,
    },
    Snapshot(SnapshotBox),
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self::Generic {
            status: ControlStatus::Ok,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Generic {
            status: ControlStatus::Error,
            message: Some(message.into()),
        }
    }

    /// True for a generic OK (a snapshot reply is not "generic ok").
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            Self::Generic {
                status: ControlStatus::Ok,
                ..
            }
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Generic {
                status: ControlStatus::Error,
                ..
            }
        )
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Generic { message, .. } => message.as_deref(),
            Self::Snapshot(_) => None,
        }
    }

    pub fn into_snapshot(self) -> Option<SnapshotBox> {
        match self {
            Self::Snapshot(snapshot) => Some(snapshot),
            Self::Generic { .. } => None,
        }
    }
}

/// Callback executed on the coordinator worker thread with exclusive access
/// to the host registry.
pub type RegistryCallFn<P> = Box<dyn FnOnce(&mut Registry<P>) -> Result<()> + Send>;

/// A control-plane request, one reply each.
pub enum ControlRequest<P> {
    /// Run an ad-hoc callback against the registry.
    Call(RegistryCallFn<P>),
    /// Stop every host, then the coordinator itself.
    Shutdown,
    /// Create a host for the report and register it under the report name.
    AddReport(Box<dyn Report<P>>),
    /// Shut the named host down and remove it.
    DeleteReport(String),
    /// Extract a snapshot from the named report.
    GetReportSnapshot(String),
}

struct ControlEnvelope<P> {
    req: ControlRequest<P>,
    reply_tx: MpmcSender<ControlResponse>,
}

/// Report-name → host map. Owned and mutated exclusively by the coordinator
/// worker thread; the control channel is the synchronization, not a lock.
pub struct Registry<P> {
    hosts: HashMap<String, ReportHost<P>>,
}

impl<P: Send + Sync + 'static> Registry<P> {
    fn new() -> Self {
        Self {
            hosts: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn contains(&self, report_name: &str) -> bool {
        self.hosts.contains_key(report_name)
    }

    /// Registered report names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.hosts.keys().cloned().collect()
    }

    pub fn get(&self, report_name: &str) -> Option<&ReportHost<P>> {
        self.hosts.get(report_name)
    }

    pub fn get_mut(&mut self, report_name: &str) -> Option<&mut ReportHost<P>> {
        self.hosts.get_mut(report_name)
    }

    fn insert(&mut self, report_name: String, host: ReportHost<P>) {
        self.hosts.insert(report_name, host);
    }

    fn remove(&mut self, report_name: &str) -> Option<ReportHost<P>> {
        self.hosts.remove(report_name)
    }

    fn iter_mut(&mut self) -> hash_map::IterMut<'_, String, ReportHost<P>> {
        self.hosts.iter_mut()
    }

    fn drain(&mut self) -> hash_map::Drain<'_, String, ReportHost<P>> {
        self.hosts.drain()
    }
}

/// Owner of the report-host population.
///
/// Runs one worker thread multiplexing the upstream batch feed, the control
/// channel and a periodic wake-up tick. Every inbound batch is fanned out
/// to every registered host by reference; all registry mutation flows
/// through [`request`](Self::request).
pub struct Coordinator<P: Send + Sync + 'static> {
    conf: CoordinatorConfig,
    ticker: Arc<Ticker>,
    state: RunState,
    control_tx: MpmcSender<ControlEnvelope<P>>,
    input_tx: SpscSender<BatchRef<P>>,
    seed: Option<WorkerChannels<P>>,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

struct WorkerChannels<P> {
    control_rx: MpmcReceiver<ControlEnvelope<P>>,
    input_rx: SpscReceiver<BatchRef<P>>,
}

impl<P: Send + Sync + 'static> Coordinator<P> {
    /// Bind the control and inbound endpoints. The worker thread does not
    /// exist until [`startup`](Self::startup).
    pub fn new(conf: CoordinatorConfig, ticker: Arc<Ticker>) -> Self {
        let (control_tx, control_rx) = MpmcChannel::bounded(conf.control_capacity());
        let (input_tx, input_rx) = SpscQueue::bounded(conf.input_capacity());

        Self {
            conf,
            ticker,
            state: RunState::Created,
            control_tx,
            input_tx,
            seed: Some(WorkerChannels {
                control_rx,
                input_rx,
            }),
            cancel: CancelToken::new_root(),
            handle: None,
        }
    }

    /// Spawn the coordinator worker thread. Fails if already started.
    pub fn startup(&mut self) -> Result<()> {
        if self.state != RunState::Created {
            bail!("coordinator is already started (state: {})", self.state);
        }

        let seed = match self.seed.take() {
            Some(seed) => seed,
            None => bail!("coordinator worker channels already consumed"),
        };

        let tick_chan = self
            .ticker
            .subscribe(self.conf.tick_period(), "coordinator")?;

        let spawned = thread::Builder::new().name("coordinator".to_string()).spawn({
            let worker = CoordinatorWorker {
                conf: self.conf.clone(),
                registry: Registry::new(),
                ticker: self.ticker.clone(),
                tick_chan,
                control_rx: seed.control_rx,
                input_rx: seed.input_rx,
                next_host_index: 0,
            };

            move || worker.run()
        });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = RunState::Running;
                tracing::info!("[coordinator] started");
                Ok(())
            }
            Err(e) => {
                self.ticker.release("coordinator");
                Err(anyhow!("coordinator: failed to spawn worker thread: {e}"))
            }
        }
    }

    /// Upstream data endpoint: push shared batches here.
    pub fn input_tx(&mut self) -> &mut SpscSender<BatchRef<P>> {
        &mut self.input_tx
    }

    /// Synchronous control entry point: one request, one reply.
    pub fn request(&self, req: ControlRequest<P>) -> Result<ControlResponse> {
        if self.state != RunState::Running {
            bail!("coordinator is not running (state: {})", self.state);
        }

        let (reply_tx, mut reply_rx) = MpmcChannel::bounded::<ControlResponse>(1);
        let mut control_tx = self.control_tx.clone();

        control_tx
            .send(ControlEnvelope { req, reply_tx }, &self.cancel, None)
            .map_err(|e| anyhow!("coordinator: control send failed: {e}"))?;

        reply_rx
            .recv(&self.cancel, None)
            .map_err(|e| anyhow!("coordinator: control reply lost: {e}"))
    }

    /// Shut every host down, stop the worker loop and join its thread.
    pub fn shutdown(&mut self) -> Result<()> {
        let resp = self.request(ControlRequest::Shutdown)?;
        if let ControlResponse::Generic {
            status: ControlStatus::Error,
            message,
        } = &resp
        {
            bail!(
                "coordinator shutdown refused: {}",
                message.as_deref().unwrap_or("unknown error")
            );
        }
        self.state = RunState::Stopping;

        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("coordinator worker thread panicked"))?;
        }

        self.state = RunState::Stopped;
        tracing::info!("[coordinator] stopped");
        Ok(())
    }

    pub fn state(&self) -> RunState {
        self.state
    }
}

impl<P: Send + Sync + 'static> Drop for Coordinator<P> {
    fn drop(&mut self) {
        // Best effort: a coordinator dropped while running still signals
        // its worker so host threads and ticker subscriptions wind down.
        if self.state == RunState::Running {
            let (reply_tx, _reply_rx) = MpmcChannel::bounded::<ControlResponse>(1);
            let mut control_tx = self.control_tx.clone();
            let _ = control_tx.try_send(ControlEnvelope {
                req: ControlRequest::Shutdown,
                reply_tx,
            });
        }
    }
}

struct CoordinatorWorker<P> {
    conf: CoordinatorConfig,
    registry: Registry<P>,
    ticker: Arc<Ticker>,
    tick_chan: TickChan,
    control_rx: MpmcReceiver<ControlEnvelope<P>>,
    input_rx: SpscReceiver<BatchRef<P>>,
    next_host_index: u64,
}

impl<P: Send + Sync + 'static> CoordinatorWorker<P> {
    fn run(mut self) {
        let mut idle = IdleWait::new();
        let mut stop = false;

        while !stop {
            let mut progress = false;

            // Periodic wake-up; the tick itself carries no work.
            if self.tick_chan.try_recv().is_ok() {
                progress = true;
            }

            if let Ok(batch) = self.input_rx.try_recv() {
                self.dispatch(batch);
                for batch in self.input_rx.drain(self.conf.max_dispatch_per_iter() - 1) {
                    self.dispatch(batch);
                }
                progress = true;
            }

            if let Ok(envelope) = self.control_rx.try_recv() {
                stop = self.handle_control(envelope);
                progress = true;
            }

            if progress {
                idle.reset();
            } else {
                idle.wait();
            }
        }

        let CoordinatorWorker {
            ticker, tick_chan, ..
        } = self;
        if let Err(err) = ticker.unsubscribe(tick_chan) {
            tracing::warn!("[coordinator] ticker unsubscribe failed: {err:#}");
        }
    }

    /// Relay one shared batch to every host, in registry iteration order.
    /// Hosts that cannot keep up drop and count; nothing here blocks.
    fn dispatch(&mut self, batch: BatchRef<P>) {
        for (_, host) in self.registry.iter_mut() {
            host.process_batch(batch.clone());
        }
    }

    /// Single choke point: every handler failure becomes an ERROR reply and
    /// the loop keeps running. Returns `true` when the loop must exit.
    fn handle_control(&mut self, envelope: ControlEnvelope<P>) -> bool {
        let ControlEnvelope { req, mut reply_tx } = envelope;
        let mut stop = false;

        let resp = match self.handle_request(req, &mut stop) {
            Ok(resp) => resp,
            Err(err) => ControlResponse::error(format!("{err:#}")),
        };

        let _ = reply_tx.try_send(resp);
        stop
    }

    fn handle_request(
        &mut self,
        req: ControlRequest<P>,
        stop: &mut bool,
    ) -> Result<ControlResponse> {
        match req {
            ControlRequest::Call(func) => {
                func(&mut self.registry)?;
                Ok(ControlResponse::ok())
            }

            ControlRequest::Shutdown => {
                for (name, mut host) in self.registry.drain() {
                    if let Err(err) = host.shutdown() {
                        tracing::error!("[coordinator] host {name} shutdown failed: {err:#}");
                    }
                }
                *stop = true;
                Ok(ControlResponse::ok())
            }

            ControlRequest::AddReport(report) => {
                let report_name = report.name().to_string();
                if self.registry.contains(&report_name) {
                    bail!("report already exists: {report_name}");
                }

                let index = self.next_host_index;
                self.next_host_index += 1;

                let host_conf = HostConfig {
                    name: format!("rh/{index}/{report_name}"),
                    thread_name: format!("rh/{index}"),
                    batch_capacity: self.conf.host_batch_capacity(),
                };

                let mut host = ReportHost::new(host_conf, self.ticker.clone());
                host.startup(report)?;

                tracing::info!("[coordinator] report {report_name} added as {}", host.name());
                self.registry.insert(report_name, host);
                Ok(ControlResponse::ok())
            }

            ControlRequest::DeleteReport(report_name) => {
                let host = self
                    .registry
                    .get_mut(&report_name)
                    .ok_or_else(|| anyhow!("unknown report: {report_name}"))?;

                // Shut down first, erase second: a host whose shutdown
                // failed stays in the registry where it is still visible
                // and retryable.
                host.shutdown()?;
                self.registry.remove(&report_name);

                tracing::info!("[coordinator] report {report_name} deleted");
                Ok(ControlResponse::ok())
            }

            ControlRequest::GetReportSnapshot(report_name) => {
                let host = self
                    .registry
                    .get_mut(&report_name)
                    .ok_or_else(|| anyhow!("unknown report: {report_name}"))?;

                let (mut slot_tx, mut slot_rx) = MpmcChannel::bounded::<SnapshotBox>(1);
                host.call_with_report(Box::new(move |report| {
                    let _ = slot_tx.try_send(report.get_snapshot());
                    Ok(())
                }))?;

                let snapshot = slot_rx
                    .try_recv()
                    .map_err(|_| anyhow!("report {report_name} produced no snapshot"))?;
                Ok(ControlResponse::Snapshot(snapshot))
            }
        }
    }
}
