pub use crate::batch::{BatchRef, PacketBatch};
pub use crate::config::CoordinatorConfig;
pub use crate::coordinator::{
    ControlRequest, ControlResponse, ControlStatus, Coordinator, Registry,
};
pub use crate::error::{RecvError, SendError, TryRecvError};
pub use crate::host::{HostConfig, HostCounters, ReportHost};
pub use crate::io::base::{BaseRx, BaseTx};
pub use crate::report::{Report, ReportCallFn, ReportInfo, SnapshotBox};
pub use crate::state::RunState;
pub use crate::ticker::{TickChan, Ticker};
pub use crate::utils::{CancelToken, HealthFlag};
