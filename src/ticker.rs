use crate::error::{RecvError, TryRecvError};
use crate::io::base::{BaseRx, BaseTx};
use crate::io::mpmc::{MpmcChannel, MpmcReceiver};
use crate::utils::CancelToken;
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Periodic timestamp source shared by the coordinator and every report
/// host.
///
/// Each subscription owns a named delivery thread. Names must be unique
/// among live subscriptions; `unsubscribe` joins the thread and frees the
/// name so a host recreated under the same name can subscribe again.
pub struct Ticker {
    subs: Mutex<HashMap<String, Subscription>>,
}

struct Subscription {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

/// Receiving half of one ticker subscription.
///
/// The channel is bounded to a single slot: if the subscriber falls behind,
/// pending ticks coalesce instead of piling up.
#[derive(Debug)]
pub struct TickChan {
    name: String,
    interval: Duration,
    rx: MpmcReceiver<Instant>,
}

impl TickChan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl BaseRx for TickChan {
    type EventType = Instant;

    #[inline]
    fn try_recv(&mut self) -> Result<Instant, TryRecvError> {
        self.rx.try_recv()
    }

    fn recv(&mut self, cancel: &CancelToken, timeout: Option<Duration>) -> Result<Instant, RecvError> {
        self.rx.recv(cancel, timeout)
    }
}

impl Ticker {
    pub fn new() -> Self {
        Self {
            subs: Mutex::new(HashMap::new()),
        }
    }

    /// Start a subscription delivering a monotonic timestamp every
    /// `interval` under a process-unique `name`.
    pub fn subscribe(&self, interval: Duration, name: &str) -> Result<TickChan> {
        if interval.is_zero() {
            bail!("ticker {name}: interval must be non-zero");
        }

        let mut subs = self.subs.lock().unwrap();
        if subs.contains_key(name) {
            bail!("ticker subscription already exists: {name}");
        }

        let (tx, rx) = MpmcChannel::bounded::<Instant>(1);
        let cancel = CancelToken::new_root();

        let handle = thread::Builder::new()
            .name(format!("ticker/{name}"))
            .spawn({
                let cancel = cancel.clone();
                let mut tx = tx;
                move || {
                    while cancel.sleep_cancellable(interval) {
                        // A full slot means the subscriber still holds an
                        // undelivered tick; coalesce.
                        let _ = tx.try_send(Instant::now());
                    }
                }
            })
            .map_err(|e| anyhow!("ticker {name}: failed to spawn delivery thread: {e}"))?;

        subs.insert(name.to_string(), Subscription { cancel, handle });

        Ok(TickChan {
            name: name.to_string(),
            interval,
            rx,
        })
    }

    /// Stop a subscription, join its thread and free its name.
    pub fn unsubscribe(&self, chan: TickChan) -> Result<()> {
        let sub = self.subs.lock().unwrap().remove(&chan.name);
        let Some(sub) = sub else {
            bail!("unknown ticker subscription: {}", chan.name);
        };

        sub.cancel.cancel();
        sub.handle
            .join()
            .map_err(|_| anyhow!("ticker thread panicked: {}", chan.name))?;
        Ok(())
    }

    /// Best-effort teardown by name, for cleanup paths that no longer hold
    /// the channel half.
    pub(crate) fn release(&self, name: &str) {
        let sub = self.subs.lock().unwrap().remove(name);
        if let Some(sub) = sub {
            sub.cancel.cancel();
            let _ = sub.handle.join();
        }
    }

    /// Whether a live subscription holds `name`.
    pub fn has_subscription(&self, name: &str) -> bool {
        self.subs.lock().unwrap().contains_key(name)
    }

    pub fn subscription_count(&self) -> usize {
        self.subs.lock().unwrap().len()
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        let subs = std::mem::take(&mut *self.subs.lock().unwrap());
        for (_, sub) in &subs {
            sub.cancel.cancel();
        }
        for (name, sub) in subs {
            if sub.handle.join().is_err() {
                tracing::error!("[ticker] delivery thread {name} panicked");
            }
        }
    }
}
