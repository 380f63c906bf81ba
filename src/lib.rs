//! Real-time cognitive kernel: a fixed-budget memory pool, a tensor-backed
//! hypergraph store, and an echo-state-network scheduler behind one explicit
//! context object.

pub mod clock;
pub mod config;
pub mod event_bus;
pub mod hgfs;
pub mod kernel;
pub mod kmem;
pub mod reservoir;
pub mod scheduler;
pub mod sync;
pub mod tensor;

pub use clock::KernelClock;
pub use config::{KernelConfig, ReservoirConfig, SpectralScaling};
pub use event_bus::{EventBuilder, EventBus, EventKind, KernelEvent};
pub use hgfs::{EdgeId, EdgeOutcome, EdgeType, Hgfs, HgfsError, HgfsNode, NodeAlloc, NodeHandle};
pub use kernel::{EchoKernel, KernelError, KernelStats, ShutdownReport, TickReport};
pub use kmem::{MemoryPool, PoolError, PoolRegion, PoolStats};
pub use reservoir::Reservoir;
pub use scheduler::{
    DtesnScheduler, QueueDiscipline, QueuePolicy, SchedulerError, SchedulerStats, Task, TaskId,
    TaskState, TickOutcome,
};
pub use sync::{SpinLock, SyncError};
pub use tensor::{ArenaStats, Tensor, TensorArena, TensorError, TensorShape};
