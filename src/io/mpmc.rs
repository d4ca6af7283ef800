use crate::error::{RecvError, SendError, TryRecvError};
use crate::io::base::{BaseRx, BaseTx};
use crate::io::idle::IdleWait;
use crate::utils::CancelToken;
use crossbeam::channel as cbchan;
use std::time::{Duration, Instant};

/// Multi-producer multi-consumer channel on crossbeam.
///
/// Used for everything on the control plane: request envelopes, per-call
/// reply channels, tick delivery and shutdown signals.
pub struct MpmcChannel;

impl MpmcChannel {
    #[inline]
    pub fn bounded<T: Send + 'static>(capacity: usize) -> (MpmcSender<T>, MpmcReceiver<T>) {
        let (tx, rx) = cbchan::bounded::<T>(capacity);
        (MpmcSender { tx }, MpmcReceiver { rx })
    }
}

pub struct MpmcSender<T> {
    tx: cbchan::Sender<T>,
}

// Hand-rolled so cloning does not demand `T: Clone`; the underlying
// crossbeam halves are shareable for any payload.
impl<T> Clone for MpmcSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> BaseTx for MpmcSender<T> {
    type EventType = T;

    #[inline]
    fn try_send(&mut self, msg: T) -> Result<(), SendError<T>> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(cbchan::TrySendError::Full(v)) => Err(SendError::full(Some(v))),
            Err(cbchan::TrySendError::Disconnected(v)) => Err(SendError::closed(Some(v))),
        }
    }

    fn send(
        &mut self,
        mut msg: T,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<(), SendError<T>> {
        let start = Instant::now();
        let mut idle = IdleWait::new();

        loop {
            if cancel.is_cancelled() {
                return Err(SendError::cancelled(Some(msg)));
            }
            if let Some(t) = timeout {
                if start.elapsed() >= t {
                    return Err(SendError::timeout(Some(msg)));
                }
            }

            match self.tx.try_send(msg) {
                Ok(()) => return Ok(()),
                Err(cbchan::TrySendError::Full(v)) => {
                    msg = v;
                    idle.wait();
                }
                Err(cbchan::TrySendError::Disconnected(v)) => {
                    return Err(SendError::closed(Some(v)));
                }
            }
        }
    }
}

pub struct MpmcReceiver<T> {
    rx: cbchan::Receiver<T>,
}

impl<T> std::fmt::Debug for MpmcReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpmcReceiver").finish_non_exhaustive()
    }
}

impl<T> Clone for MpmcReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T: Send + 'static> BaseRx for MpmcReceiver<T> {
    type EventType = T;

    #[inline]
    fn try_recv(&mut self) -> Result<T, TryRecvError> {
        match self.rx.try_recv() {
            Ok(v) => Ok(v),
            Err(cbchan::TryRecvError::Empty) => Err(TryRecvError::Empty),
            Err(cbchan::TryRecvError::Disconnected) => Err(TryRecvError::Disconnected),
        }
    }

    fn recv(&mut self, cancel: &CancelToken, timeout: Option<Duration>) -> Result<T, RecvError> {
        let start = Instant::now();
        let mut idle = IdleWait::new();

        loop {
            if cancel.is_cancelled() {
                return Err(RecvError::Cancelled);
            }
            if let Some(t) = timeout {
                if start.elapsed() >= t {
                    return Err(RecvError::Timeout);
                }
            }

            match self.rx.try_recv() {
                Ok(v) => return Ok(v),
                Err(cbchan::TryRecvError::Empty) => idle.wait(),
                Err(cbchan::TryRecvError::Disconnected) => return Err(RecvError::Disconnected),
            }
        }
    }
}
