use crate::error::{RecvError, SendError, TryRecvError};
use crate::utils::CancelToken;
use std::time::Duration;

/// Base trait for sending typed messages.
///
/// Implemented by channel senders (TX half). The coordinator and the report
/// hosts are written against this trait, not against a concrete transport.
pub trait BaseTx: Send + 'static {
    /// Message type carried by this transport.
    type EventType: Send + 'static;

    /// Non-blocking send. Returns `Err` if the channel is full or closed.
    fn try_send(&mut self, msg: Self::EventType) -> Result<(), SendError<Self::EventType>>;

    /// Cooperative send with optional timeout and cancellation.
    fn send(
        &mut self,
        msg: Self::EventType,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<(), SendError<Self::EventType>>;
}

/// Base trait for receiving typed messages.
///
/// Implemented by channel receivers (RX half).
pub trait BaseRx: Send + 'static {
    /// Message type carried by this transport.
    type EventType: Send + 'static;

    /// Non-blocking receive. `Empty` if nothing is queued, `Disconnected`
    /// if every sender is gone.
    fn try_recv(&mut self) -> Result<Self::EventType, TryRecvError>;

    /// Cooperative receive with optional timeout and cancellation.
    fn recv(
        &mut self,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<Self::EventType, RecvError>;

    /// Drain up to `max` queued messages without blocking.
    fn drain(&mut self, max: usize) -> Vec<Self::EventType> {
        let mut out = Vec::with_capacity(max.min(64));

        for _ in 0..max {
            match self.try_recv() {
                Ok(msg) => out.push(msg),
                Err(_) => break,
            }
        }
        out
    }
}
