use std::any::Any;
use std::time::{Duration, Instant};

/// Static parameters a report exposes at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportInfo {
    /// Total aggregation window the report keeps.
    pub time_window: Duration,
    /// Number of ticks the window is divided into.
    pub tick_count: u32,
}

impl ReportInfo {
    /// Tick delivery interval, `None` when `tick_count` is zero.
    pub fn tick_interval(&self) -> Option<Duration> {
        if self.tick_count == 0 {
            return None;
        }
        Some(self.time_window / self.tick_count)
    }
}

/// Opaque snapshot payload, produced by a report and owned by the caller.
pub type SnapshotBox = Box<dyn Any + Send>;

/// Callback shipped into a host worker via `call_with_report`.
///
/// Runs on the worker thread with exclusive access to the report; this is
/// the only way anything outside that thread touches it.
pub type ReportCallFn<P> = Box<dyn FnOnce(&mut dyn Report<P>) -> anyhow::Result<()> + Send>;

/// Capability contract the core requires from an aggregation report.
///
/// The core never looks inside: it delivers ticks and packet slices on the
/// host worker thread and extracts snapshots on demand. Apart from `info`
/// (called once, before the worker exists), every method runs on the
/// owning host's worker thread.
pub trait Report<P>: Send + 'static {
    /// Registry key. Must be unique among live reports.
    fn name(&self) -> &str;

    /// Window parameters; read once at host startup.
    fn info(&self) -> ReportInfo;

    /// One-time tick-state initialization, before any other delivery.
    fn ticks_init(&mut self, now: Instant);

    /// Periodic tick; `now` is monotonically non-decreasing.
    fn tick_now(&mut self, now: Instant);

    /// Ingest a batch of packets.
    fn add_multi(&mut self, packets: &[P]);

    /// Produce a point-in-time snapshot.
    fn get_snapshot(&self) -> SnapshotBox;
}
