use std::fmt;

/// Lifecycle of a coordinator or report host.
///
/// `startup` moves Created to Running; a shutdown request moves Running to
/// Stopping and, once the worker has joined, Stopped. Nothing leaves
/// Stopped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Created => "created",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
            RunState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}
