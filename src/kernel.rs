use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::clock::KernelClock;
use crate::config::{KernelConfig, ReservoirConfig};
use crate::event_bus::{EventBuilder, EventBus, EventKind, KernelEvent};
use crate::hgfs::{EdgeOutcome, EdgeType, Hgfs, HgfsError, NodeAlloc, NodeHandle};
use crate::kmem::{MemoryPool, PoolError, PoolRegion};
use crate::scheduler::{DtesnScheduler, QueuePolicy, SchedulerError, Task, TaskId};
use crate::tensor::{TensorArena, TensorError};

#[derive(Debug, Error, PartialEq)]
pub enum KernelError {
    #[error("kernel context not initialized")]
    NotInitialized,
    #[error("scheduler is already initialized")]
    AlreadyInitialized,
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error(transparent)]
    Hgfs(#[from] HgfsError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Aggregate kernel counters, published in the shutdown event and available
/// on demand.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct KernelStats {
    pub total_ticks: u64,
    pub context_switches: u64,
    pub avg_tick_ns: f64,
    pub max_tick_ns: u64,
    pub total_allocations: u64,
    pub total_frees: u64,
    pub avg_alloc_ns: f64,
    pub max_alloc_ns: u64,
    pub alloc_budget_overruns: u64,
    pub memory_used: usize,
    pub memory_peak: usize,
    pub active_tasks: u32,
    pub peak_tasks: u32,
    pub total_edges: u64,
    pub adjacency_skips: u64,
    pub depth_clamps: u64,
    pub membrane_depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub selected: Option<TaskId>,
    pub context_switch: bool,
    pub scored: usize,
    pub duration_ns: u64,
}

#[derive(Debug)]
pub struct ShutdownReport {
    pub released_tasks: Vec<Task>,
    pub stats: KernelStats,
}

const KERNEL_TASK: TaskId = TaskId::new(0);

/// The cognitive kernel context. Owns every subsystem; there is no global
/// state, so independent kernels can coexist in one process.
#[derive(Debug)]
pub struct EchoKernel {
    config: KernelConfig,
    stats: KernelStats,
    clock: KernelClock,
    events: EventBus,
    kmem: MemoryPool,
    tensors: TensorArena,
    hgfs: Hgfs,
    sched: Option<DtesnScheduler>,
    rng: StdRng,
    next_task_id: u64,
    shut_down: bool,
}

impl EchoKernel {
    /// Bring up the memory pool, tensor arena, and hypergraph. The scheduler
    /// is initialized separately so callers can pick a reservoir topology.
    pub fn boot(config: KernelConfig) -> Result<Self, KernelError> {
        let kmem = MemoryPool::init(config.memory_pool_size, config.max_alloc_ns)?;
        let mut tensors = TensorArena::new(config.tensor_arena_elems);
        let hgfs = Hgfs::new(&mut tensors, config.max_atoms, config.max_membrane_depth)?;
        let rng = StdRng::seed_from_u64(config.seed);

        let mut kernel = Self {
            stats: KernelStats {
                membrane_depth: config.max_membrane_depth,
                ..KernelStats::default()
            },
            clock: KernelClock::new(),
            events: EventBus::new(),
            kmem,
            tensors,
            hgfs,
            sched: None,
            rng,
            next_task_id: 1,
            shut_down: false,
            config,
        };
        kernel.events.publish(
            &mut kernel.clock,
            EventBuilder::new(KERNEL_TASK, EventKind::KernelInitialized).detail(json!({
                "pool_size": kernel.config.memory_pool_size,
                "tensor_arena_elems": kernel.config.tensor_arena_elems,
                "max_atoms": kernel.config.max_atoms,
            })),
        );
        Ok(kernel)
    }

    /// Mint a task with the next kernel-wide id. Ids start at 1 and never
    /// recycle.
    pub fn allocate_task(&mut self, sti: i32, lti: i32) -> Task {
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;
        Task::new(id, sti, lti)
    }

    pub fn scheduler_init(&mut self, config: Option<ReservoirConfig>) -> Result<(), KernelError> {
        self.scheduler_init_with_policy(config, QueuePolicy::default())
    }

    pub fn scheduler_init_with_policy(
        &mut self,
        config: Option<ReservoirConfig>,
        policy: QueuePolicy,
    ) -> Result<(), KernelError> {
        self.ensure_live()?;
        if self.sched.is_some() {
            return Err(KernelError::AlreadyInitialized);
        }
        let config = config.unwrap_or_default();
        let sched = DtesnScheduler::new(&mut self.tensors, &config, policy, &mut self.rng)?;
        self.sched = Some(sched);
        self.events.publish(
            &mut self.clock,
            EventBuilder::new(KERNEL_TASK, EventKind::SchedulerInitialized).detail(json!({
                "reservoir_size": config.size,
                "input_dim": config.input_dim,
                "output_dim": config.output_dim,
            })),
        );
        Ok(())
    }

    pub fn scheduler_enqueue(&mut self, task: Task) -> Result<(), KernelError> {
        self.ensure_live()?;
        let sched = self
            .sched
            .as_mut()
            .ok_or(KernelError::NotInitialized)?;
        let id = task.id;
        let sti = task.sti;
        sched.enqueue(task);

        self.stats.active_tasks += 1;
        if self.stats.active_tasks > self.stats.peak_tasks {
            self.stats.peak_tasks = self.stats.active_tasks;
        }
        self.events.publish(
            &mut self.clock,
            EventBuilder::new(id, EventKind::TaskEnqueued).detail(json!({ "sti": sti })),
        );
        Ok(())
    }

    /// Run one scheduling decision. Under real-time mode a tick that overruns
    /// its budget is an error; the instrumentation and events are recorded
    /// either way.
    pub fn scheduler_tick(&mut self) -> Result<TickReport, KernelError> {
        self.ensure_live()?;
        let max_tasks = self.config.max_tasks;
        let sched = self
            .sched
            .as_mut()
            .ok_or(KernelError::NotInitialized)?;
        let outcome = sched.tick(max_tasks);
        let sched_stats = sched.stats();

        self.stats.total_ticks = sched_stats.tick_count;
        self.stats.context_switches = sched_stats.context_switches;
        self.stats.avg_tick_ns = sched_stats.avg_tick_ns;
        self.stats.max_tick_ns = sched_stats.max_tick_ns;

        let report = TickReport {
            tick: sched_stats.tick_count,
            selected: outcome.selected,
            context_switch: outcome.context_switch,
            scored: outcome.scored,
            duration_ns: outcome.duration_ns,
        };

        let event_task = outcome.selected.unwrap_or(KERNEL_TASK);
        self.events.publish(
            &mut self.clock,
            EventBuilder::new(event_task, EventKind::Tick).detail(json!({
                "tick": report.tick,
                "scored": report.scored,
                "duration_ns": report.duration_ns,
            })),
        );
        if outcome.context_switch {
            self.events.publish(
                &mut self.clock,
                EventBuilder::new(event_task, EventKind::ContextSwitch)
                    .detail(json!({ "tick": report.tick })),
            );
        }

        if outcome.duration_ns > self.config.max_tick_ns {
            self.events.publish(
                &mut self.clock,
                EventBuilder::new(event_task, EventKind::TickBudgetExceeded).detail(json!({
                    "duration_ns": outcome.duration_ns,
                    "budget_ns": self.config.max_tick_ns,
                })),
            );
            if self.config.enable_realtime {
                return Err(KernelError::Scheduler(SchedulerError::TickBudgetExceeded {
                    duration_ns: outcome.duration_ns,
                    budget_ns: self.config.max_tick_ns,
                }));
            }
        }

        Ok(report)
    }

    pub fn hgfs_alloc(&mut self, size: usize, depth: u32) -> Result<NodeAlloc, KernelError> {
        self.ensure_live()?;
        let alloc = self.hgfs.alloc(&mut self.tensors, size, depth)?;
        self.events.publish(
            &mut self.clock,
            EventBuilder::new(KERNEL_TASK, EventKind::NodeAllocated).detail(json!({
                "handle": alloc.handle.raw(),
                "size": size,
                "depth": alloc.depth,
                "tensor_backed": alloc.tensor_backed,
            })),
        );
        if alloc.depth_clamped {
            self.stats.depth_clamps = self.hgfs.depth_clamps();
            self.events.publish(
                &mut self.clock,
                EventBuilder::new(KERNEL_TASK, EventKind::DepthClamped).detail(json!({
                    "handle": alloc.handle.raw(),
                    "requested": depth,
                    "clamped_to": alloc.depth,
                })),
            );
        }
        Ok(alloc)
    }

    pub fn hgfs_free(&mut self, handle: NodeHandle) -> Result<(), KernelError> {
        self.ensure_live()?;
        self.hgfs.free(&mut self.tensors, handle)?;
        self.events.publish(
            &mut self.clock,
            EventBuilder::new(KERNEL_TASK, EventKind::NodeFreed)
                .detail(json!({ "handle": handle.raw() })),
        );
        Ok(())
    }

    pub fn hgfs_edge(
        &mut self,
        src: NodeHandle,
        dst: NodeHandle,
        edge_type: EdgeType,
    ) -> Result<EdgeOutcome, KernelError> {
        self.ensure_live()?;
        let outcome = self.hgfs.edge(src, dst, edge_type)?;
        self.stats.total_edges += 1;
        self.events.publish(
            &mut self.clock,
            EventBuilder::new(KERNEL_TASK, EventKind::EdgeCreated).detail(json!({
                "edge_id": outcome.id.raw(),
                "src": src.raw(),
                "dst": dst.raw(),
                "edge_type": edge_type.as_str(),
            })),
        );
        if !outcome.adjacency_set {
            self.stats.adjacency_skips = self.hgfs.adjacency_skips();
            self.events.publish(
                &mut self.clock,
                EventBuilder::new(KERNEL_TASK, EventKind::AdjacencySkipped).detail(json!({
                    "edge_id": outcome.id.raw(),
                    "src": src.raw(),
                    "dst": dst.raw(),
                })),
            );
        }
        Ok(outcome)
    }

    pub fn kmem_alloc(&mut self, size: usize) -> Result<PoolRegion, KernelError> {
        self.ensure_live()?;
        match self.kmem.alloc(size) {
            Ok(region) => {
                self.mirror_pool_stats();
                Ok(region)
            }
            Err(err) => {
                self.events.publish(
                    &mut self.clock,
                    EventBuilder::new(KERNEL_TASK, EventKind::AllocationDenied).detail(json!({
                        "requested": size,
                        "error": err.to_string(),
                    })),
                );
                Err(err.into())
            }
        }
    }

    pub fn kmem_free(&mut self, region: PoolRegion) -> Result<(), KernelError> {
        self.ensure_live()?;
        self.kmem.free(region);
        self.mirror_pool_stats();
        Ok(())
    }

    /// Configure the membrane hierarchy depth used for clamping. Requests
    /// past the boot-time maximum are themselves clamped and reported.
    pub fn init_membrane_regions(&mut self, max_depth: u32) -> Result<u32, KernelError> {
        self.ensure_live()?;
        let boot_max = self.config.max_membrane_depth;
        let effective = max_depth.min(boot_max);
        self.stats.membrane_depth = effective;
        self.events.publish(
            &mut self.clock,
            EventBuilder::new(KERNEL_TASK, EventKind::MembraneRegions)
                .detail(json!({ "depth": effective })),
        );
        if effective != max_depth {
            self.events.publish(
                &mut self.clock,
                EventBuilder::new(KERNEL_TASK, EventKind::DepthClamped).detail(json!({
                    "requested": max_depth,
                    "clamped_to": effective,
                })),
            );
        }
        Ok(effective)
    }

    /// One-shot teardown. Remaining tasks are handed back to the caller;
    /// every subsequent mutating call fails. Stats and queued events remain
    /// readable.
    pub fn shutdown(&mut self) -> Result<ShutdownReport, KernelError> {
        self.ensure_live()?;
        self.shut_down = true;

        let released_tasks = match self.sched.take() {
            Some(sched) => sched.shutdown(&mut self.tensors),
            None => Vec::new(),
        };
        self.stats.active_tasks = 0;
        self.mirror_pool_stats();
        self.stats.adjacency_skips = self.hgfs.adjacency_skips();
        self.stats.depth_clamps = self.hgfs.depth_clamps();

        let stats = self.stats;
        self.events.publish(
            &mut self.clock,
            EventBuilder::new(KERNEL_TASK, EventKind::Shutdown).detail(json!({
                "released_tasks": released_tasks.len(),
                "stats": stats,
            })),
        );
        Ok(ShutdownReport {
            released_tasks,
            stats,
        })
    }

    pub fn drain_events(&mut self) -> Vec<KernelEvent> {
        self.events.drain()
    }

    pub fn stats(&self) -> KernelStats {
        let pool = self.kmem.stats();
        let mut stats = self.stats;
        stats.total_allocations = pool.allocations;
        stats.total_frees = pool.frees;
        stats.avg_alloc_ns = pool.avg_alloc_ns;
        stats.max_alloc_ns = pool.max_alloc_ns;
        stats.alloc_budget_overruns = pool.budget_overruns;
        stats.memory_used = pool.used;
        stats.memory_peak = pool.peak;
        stats.adjacency_skips = self.hgfs.adjacency_skips();
        stats.depth_clamps = self.hgfs.depth_clamps();
        stats
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn hgfs(&self) -> &Hgfs {
        &self.hgfs
    }

    pub fn scheduler(&self) -> Option<&DtesnScheduler> {
        self.sched.as_ref()
    }

    fn mirror_pool_stats(&mut self) {
        let pool = self.kmem.stats();
        self.stats.total_allocations = pool.allocations;
        self.stats.total_frees = pool.frees;
        self.stats.avg_alloc_ns = pool.avg_alloc_ns;
        self.stats.max_alloc_ns = pool.max_alloc_ns;
        self.stats.alloc_budget_overruns = pool.budget_overruns;
        self.stats.memory_used = pool.used;
        self.stats.memory_peak = pool.peak;
    }

    fn ensure_live(&self) -> Result<(), KernelError> {
        if self.shut_down {
            return Err(KernelError::NotInitialized);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> KernelConfig {
        KernelConfig {
            memory_pool_size: 4096,
            tensor_arena_elems: 16_384,
            max_atoms: 16,
            max_membrane_depth: 8,
            seed: 11,
            ..KernelConfig::default()
        }
    }

    fn small_reservoir() -> ReservoirConfig {
        ReservoirConfig {
            size: 16,
            input_dim: 8,
            output_dim: 4,
            ..ReservoirConfig::default()
        }
    }

    #[test]
    fn boot_publishes_an_initialization_event() {
        let mut kernel = EchoKernel::boot(small_config()).expect("boot");
        let events = kernel.drain_events();
        assert_eq!(events[0].kind, EventKind::KernelInitialized);
    }

    #[test]
    fn double_scheduler_init_is_rejected() {
        let mut kernel = EchoKernel::boot(small_config()).expect("boot");
        kernel
            .scheduler_init(Some(small_reservoir()))
            .expect("first init");
        assert_eq!(
            kernel.scheduler_init(Some(small_reservoir())),
            Err(KernelError::AlreadyInitialized)
        );
    }

    #[test]
    fn tick_without_scheduler_fails() {
        let mut kernel = EchoKernel::boot(small_config()).expect("boot");
        assert!(matches!(
            kernel.scheduler_tick(),
            Err(KernelError::NotInitialized)
        ));
    }

    #[test]
    fn full_lifecycle_returns_tasks_and_rejects_further_calls() {
        let mut kernel = EchoKernel::boot(small_config()).expect("boot");
        kernel
            .scheduler_init(Some(small_reservoir()))
            .expect("scheduler init");

        let a = kernel.allocate_task(10_000, 0);
        let b = kernel.allocate_task(0, 500);
        assert_eq!(a.id.raw(), 1);
        assert_eq!(b.id.raw(), 2);
        kernel.scheduler_enqueue(a).expect("enqueue a");
        kernel.scheduler_enqueue(b).expect("enqueue b");

        let report = kernel.scheduler_tick().expect("tick");
        assert_eq!(report.tick, 1);
        assert!(report.selected.is_some());

        let shutdown = kernel.shutdown().expect("shutdown");
        assert_eq!(shutdown.released_tasks.len(), 2);
        assert_eq!(shutdown.stats.total_ticks, 1);

        assert_eq!(kernel.scheduler_tick(), Err(KernelError::NotInitialized));
        assert_eq!(kernel.kmem_alloc(8), Err(KernelError::NotInitialized));
        assert_eq!(kernel.shutdown().err(), Some(KernelError::NotInitialized));

        // Events stay readable after shutdown.
        let events = kernel.drain_events();
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::Shutdown));
    }

    #[test]
    fn realtime_mode_turns_budget_overruns_into_errors() {
        let config = KernelConfig {
            max_tick_ns: 0,
            enable_realtime: true,
            ..small_config()
        };
        let mut kernel = EchoKernel::boot(config).expect("boot");
        kernel
            .scheduler_init(Some(small_reservoir()))
            .expect("scheduler init");
        let task = kernel.allocate_task(1_000, 0);
        kernel.scheduler_enqueue(task).expect("enqueue");

        let err = kernel.scheduler_tick().expect_err("zero budget overruns");
        assert!(matches!(
            err,
            KernelError::Scheduler(SchedulerError::TickBudgetExceeded { budget_ns: 0, .. })
        ));
        // Stats and events are recorded before the error is raised.
        assert_eq!(kernel.stats().total_ticks, 1);
        let events = kernel.drain_events();
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::TickBudgetExceeded));
    }

    #[test]
    fn pool_failures_emit_a_denial_event() {
        let mut kernel = EchoKernel::boot(small_config()).expect("boot");
        kernel.kmem_alloc(4096).expect("fills the pool");
        assert!(matches!(
            kernel.kmem_alloc(1),
            Err(KernelError::Pool(PoolError::OutOfMemory { .. }))
        ));
        let events = kernel.drain_events();
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::AllocationDenied));
    }

    #[test]
    fn membrane_depth_requests_are_clamped() {
        let mut kernel = EchoKernel::boot(small_config()).expect("boot");
        assert_eq!(kernel.init_membrane_regions(4).expect("within bounds"), 4);
        assert_eq!(kernel.init_membrane_regions(100).expect("clamped"), 8);
        let events = kernel.drain_events();
        assert!(events.iter().any(|e| e.kind == EventKind::DepthClamped));
    }

    #[test]
    fn hgfs_operations_flow_through_the_kernel() {
        let mut kernel = EchoKernel::boot(small_config()).expect("boot");
        let a = kernel.hgfs_alloc(64, 2).expect("alloc a");
        let b = kernel.hgfs_alloc(64, 2).expect("alloc b");
        let edge = kernel
            .hgfs_edge(a.handle, b.handle, EdgeType::Causal)
            .expect("edge");
        assert!(edge.adjacency_set);
        assert_eq!(kernel.stats().total_edges, 1);

        kernel.hgfs_free(a.handle).expect("free");
        assert!(matches!(
            kernel.hgfs_free(a.handle),
            Err(KernelError::Hgfs(HgfsError::UnknownNode(_)))
        ));
    }
}
