use std::collections::VecDeque;
use std::time::Instant;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ReservoirConfig;
use crate::reservoir::Reservoir;
use crate::tensor::{TensorArena, TensorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Ready,
    Running,
    Waiting,
    Sleeping,
    Zombie,
}

/// A schedulable cognitive task. Attention values (short- and long-term
/// importance) bias reservoir-driven selection; `sti / 1000` is added
/// directly to the readout score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    pub sti: i32,
    pub lti: i32,
    pub payload: serde_json::Value,
    pub wake_time: u64,
}

impl Task {
    pub fn new(id: TaskId, sti: i32, lti: i32) -> Self {
        Self {
            id,
            state: TaskState::Ready,
            sti,
            lti,
            payload: serde_json::Value::Null,
            wake_time: 0,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_wake_time(mut self, wake_time: u64) -> Self {
        self.wake_time = wake_time;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueDiscipline {
    /// Newest ready task is scanned first.
    Lifo,
    /// Oldest ready task is scanned first.
    Fifo,
}

/// How candidates are drawn from the ready queue each tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueuePolicy {
    pub discipline: QueueDiscipline,
    /// How many ready tasks are scored per tick; `None` uses the reservoir
    /// output dimension.
    pub scan_bound: Option<usize>,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            discipline: QueueDiscipline::Lifo,
            scan_bound: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SchedulerStats {
    pub tick_count: u64,
    pub context_switches: u64,
    pub last_tick_ns: u64,
    pub avg_tick_ns: f64,
    pub max_tick_ns: u64,
}

/// What one tick decided.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TickOutcome {
    pub selected: Option<TaskId>,
    pub context_switch: bool,
    pub scored: usize,
    pub duration_ns: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("tick overran its budget ({duration_ns}ns > {budget_ns}ns)")]
    TickBudgetExceeded { duration_ns: u64, budget_ns: u64 },
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Reservoir-driven scheduler. Every tick the ready queue is summarized into
/// an input vector, pushed through the echo-state reservoir, and the readout
/// scores (plus attention bias) pick the next task to run.
#[derive(Debug)]
pub struct DtesnScheduler {
    reservoir: Reservoir,
    ready: VecDeque<Task>,
    waiting: VecDeque<Task>,
    current: Option<TaskId>,
    policy: QueuePolicy,
    stats: SchedulerStats,
    input: Vec<f32>,
    output: Vec<f32>,
}

impl DtesnScheduler {
    pub fn new(
        arena: &mut TensorArena,
        config: &ReservoirConfig,
        policy: QueuePolicy,
        rng: &mut StdRng,
    ) -> Result<Self, SchedulerError> {
        let reservoir = Reservoir::init(arena, config, rng)?;
        let input = vec![0.0; reservoir.input_dim()];
        let output = vec![0.0; reservoir.output_dim()];
        Ok(Self {
            reservoir,
            ready: VecDeque::new(),
            waiting: VecDeque::new(),
            current: None,
            policy,
            stats: SchedulerStats::default(),
            input,
            output,
        })
    }

    /// Admit a task to the ready queue. Under LIFO the newest task lands at
    /// the scan front.
    pub fn enqueue(&mut self, mut task: Task) {
        task.state = TaskState::Ready;
        match self.policy.discipline {
            QueueDiscipline::Lifo => self.ready.push_front(task),
            QueueDiscipline::Fifo => self.ready.push_back(task),
        }
    }

    /// One scheduling decision. Scores up to the policy's scan bound of ready
    /// tasks and hands the CPU to the strict maximum; ties keep the earliest
    /// scanned candidate, and an empty queue leaves the current task in
    /// place.
    pub fn tick(&mut self, max_tasks: u32) -> TickOutcome {
        let start = Instant::now();

        self.build_input(max_tasks);
        self.stats.tick_count += 1;
        let input = std::mem::take(&mut self.input);
        self.reservoir.update(&input);
        self.input = input;
        self.reservoir.readout(&mut self.output);

        let scan_bound = self
            .policy
            .scan_bound
            .unwrap_or(self.reservoir.output_dim());
        let mut selected: Option<TaskId> = None;
        let mut best = f32::NEG_INFINITY;
        let mut scored = 0usize;
        for (i, task) in self.ready.iter().take(scan_bound).enumerate() {
            let gain = self.output.get(i).copied().unwrap_or(0.0);
            let priority = gain + task.sti as f32 / 1000.0;
            scored += 1;
            if priority > best {
                best = priority;
                selected = Some(task.id);
            }
        }

        let context_switch = selected.is_some() && selected != self.current;
        if context_switch {
            if let Some(previous) = self.current {
                if let Some(task) = self.ready.iter_mut().find(|t| t.id == previous) {
                    task.state = TaskState::Ready;
                }
            }
            if let Some(next) = selected {
                if let Some(task) = self.ready.iter_mut().find(|t| t.id == next) {
                    task.state = TaskState::Running;
                }
            }
            self.current = selected;
            self.stats.context_switches += 1;
        }

        let duration_ns = start.elapsed().as_nanos() as u64;
        self.stats.last_tick_ns = duration_ns;
        if duration_ns > self.stats.max_tick_ns {
            self.stats.max_tick_ns = duration_ns;
        }
        self.stats.avg_tick_ns +=
            (duration_ns as f64 - self.stats.avg_tick_ns) / self.stats.tick_count as f64;

        TickOutcome {
            selected: self.current,
            context_switch,
            scored,
            duration_ns,
        }
    }

    /// Move the current task out of the ready queue into the waiting queue.
    pub fn block_current(&mut self) -> Option<TaskId> {
        let current = self.current.take()?;
        let pos = self.ready.iter().position(|t| t.id == current)?;
        let mut task = self.ready.remove(pos)?;
        task.state = TaskState::Waiting;
        self.waiting.push_back(task);
        Some(current)
    }

    /// Wake every waiting task whose wake time has passed.
    pub fn wake_ready(&mut self, now: u64) -> usize {
        let mut woken = 0;
        let mut still_waiting = VecDeque::new();
        while let Some(task) = self.waiting.pop_front() {
            if task.wake_time <= now {
                self.enqueue(task);
                woken += 1;
            } else {
                still_waiting.push_back(task);
            }
        }
        self.waiting = still_waiting;
        woken
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn reservoir_state(&self) -> &[f32] {
        self.reservoir.state()
    }

    /// Tear down, returning every task still owned by the scheduler.
    pub fn shutdown(self, arena: &mut TensorArena) -> Vec<Task> {
        self.reservoir.release(arena);
        let mut tasks: Vec<Task> = self.ready.into_iter().collect();
        tasks.extend(self.waiting);
        tasks
    }

    fn build_input(&mut self, max_tasks: u32) {
        for slot in self.input.iter_mut() {
            *slot = 0.0;
        }
        let max_tasks = max_tasks.max(1) as f32;
        if let Some(slot) = self.input.get_mut(0) {
            *slot = self.ready.len() as f32 / max_tasks;
        }
        if let Some(slot) = self.input.get_mut(1) {
            *slot = self.stats.tick_count as f32 / 1000.0;
        }
        if let Some(current) = self.current {
            if let Some(task) = self.ready.iter().find(|t| t.id == current) {
                if let Some(slot) = self.input.get_mut(2) {
                    *slot = task.sti as f32 / 1000.0;
                }
                if let Some(slot) = self.input.get_mut(3) {
                    *slot = task.lti as f32 / 1000.0;
                }
            }
        }
    }
}
