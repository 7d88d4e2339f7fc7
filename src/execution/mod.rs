// Order execution, trade lifecycle and the cycle loop
pub mod executor;
pub mod lifecycle;
pub mod orchestrator;

pub use executor::{DryRunExecutor, EntryOrder, OrderAck, OrderError, OrderExecutor};
pub use lifecycle::{
    composite_score, CycleReport, CycleStatus, LifecycleConfig, LifecycleEngine,
    ScanSnapshot,
};
pub use orchestrator::{Orchestrator, SessionSummary};
