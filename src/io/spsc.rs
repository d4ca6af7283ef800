use crate::error::{RecvError, SendError, TryRecvError};
use crate::io::base::{BaseRx, BaseTx};
use crate::io::idle::IdleWait;
use crate::utils::CancelToken;
use ringbuf::consumer::Consumer;
use ringbuf::producer::Producer;
use ringbuf::traits::{Observer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::time::{Duration, Instant};

/// Single-producer single-consumer queue on a heap ring buffer.
///
/// This is the data path: the upstream feed into the coordinator and each
/// host's inbound batch queue have exactly one producer and one consumer,
/// so they skip the MPMC machinery.
pub struct SpscQueue;

impl SpscQueue {
    pub fn bounded<T: Send + 'static>(capacity: usize) -> (SpscSender<T>, SpscReceiver<T>) {
        let rb = HeapRb::<T>::new(capacity.max(1));
        let (prod, cons) = rb.split();

        (SpscSender { prod }, SpscReceiver { cons })
    }
}

pub struct SpscSender<T> {
    prod: HeapProd<T>,
}

impl<T> SpscSender<T> {
    /// Total slot count of the ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.prod.capacity().get()
    }
}

impl<T: Send + 'static> BaseTx for SpscSender<T> {
    type EventType = T;

    #[inline]
    fn try_send(&mut self, msg: T) -> Result<(), SendError<T>> {
        self.prod.try_push(msg).map_err(|v| SendError::full(Some(v)))
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

            match self.prod.try_push(msg) {
                Ok(()) => return Ok(()),
                Err(v) => {
                    msg = v;
                    idle.wait();
                }
            }
        }
    }
}

pub struct SpscReceiver<T> {
    cons: HeapCons<T>,
}

impl<T: Send + 'static> BaseRx for SpscReceiver<T> {
    type EventType = T;

    #[inline]
    fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.cons.try_pop().ok_or(TryRecvError::Empty)
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

            match self.cons.try_pop() {
                Some(v) => return Ok(v),
                None => idle.wait(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let (mut tx, mut rx) = SpscQueue::bounded::<u32>(4);
        for i in 0..4 {
            tx.try_send(i).unwrap();
        }
        for i in 0..4 {
            assert_eq!(rx.try_recv().unwrap(), i);
        }
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn bounded_rejects_overflow() {
        let (mut tx, mut rx) = SpscQueue::bounded::<u32>(2);
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        let err = tx.try_send(3).unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.value, Some(3));

        // Space frees up as the consumer drains.
        assert_eq!(rx.try_recv().unwrap(), 1);
        tx.try_send(3).unwrap();
    }

    #[test]
    fn capacity_is_at_least_requested() {
        let (tx, _rx) = SpscQueue::bounded::<u32>(8);
        assert!(tx.capacity() >= 8);
    }
}
