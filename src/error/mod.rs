use std::{error::Error, fmt};

const ERR_MSG_QUEUE_FULL: &str = "queue is full";
const ERR_MSG_TRANSPORT_CLOSED: &str = "transport is closed";
const ERR_MSG_TIMEOUT: &str = "operation timed out";
const ERR_MSG_DISCONNECTED: &str = "channel disconnected";
const ERR_MSG_CANCELLED: &str = "operation cancelled";

/// Why a send did not complete.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SendFailReason {
    Timeout,
    Cancelled,
    Full,
    Closed,
}

impl fmt::Display for SendFailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendFailReason::Timeout => write!(f, "{ERR_MSG_TIMEOUT}"),
            SendFailReason::Cancelled => write!(f, "{ERR_MSG_CANCELLED}"),
            SendFailReason::Full => write!(f, "{ERR_MSG_QUEUE_FULL}"),
            SendFailReason::Closed => write!(f, "{ERR_MSG_TRANSPORT_CLOSED}"),
        }
    }
}

/// Failed send. Carries the rejected value back to the caller so it can be
/// retried or accounted for instead of silently destroyed.
#[derive(Debug)]
pub struct SendError<T> {
    pub value: Option<T>,
    pub reason: SendFailReason,
}

impl<T> SendError<T> {
    pub fn full(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Full,
        }
    }

    pub fn closed(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Closed,
        }
    }

    pub fn cancelled(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Cancelled,
        }
    }

    pub fn timeout(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Timeout,
        }
    }

    /// True when the channel was full at the time of the attempt.
    pub fn is_full(&self) -> bool {
        self.reason == SendFailReason::Full
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl<T: fmt::Debug> Error for SendError<T> {}

/// Non-blocking receive outcome.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TryRecvError {
    Empty,
    Disconnected,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => write!(f, "channel is empty"),
            TryRecvError::Disconnected => write!(f, "{ERR_MSG_DISCONNECTED}"),
        }
    }
}

impl Error for TryRecvError {}

/// Blocking/cooperative receive failure.
#[derive(Debug)]
pub enum RecvError {
    Timeout,
    Disconnected,
    Cancelled,
}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvError::Timeout => write!(f, "{ERR_MSG_TIMEOUT}"),
            RecvError::Disconnected => write!(f, "{ERR_MSG_DISCONNECTED}"),
            RecvError::Cancelled => write!(f, "{ERR_MSG_CANCELLED}"),
        }
    }
}

impl Error for RecvError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_error_keeps_value() {
        let err = SendError::full(Some(42u32));
        assert!(err.is_full());
        assert_eq!(err.value, Some(42));
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            SendError::<()>::closed(None).to_string(),
            "transport is closed"
        );
        assert_eq!(RecvError::Timeout.to_string(), "operation timed out");
        assert_eq!(TryRecvError::Empty.to_string(), "channel is empty");
    }
}
