use std::collections::VecDeque;

use serde::Serialize;
use serde_json::json;

use crate::clock::KernelClock;
use crate::scheduler::TaskId;

/// Structured kernel event. `task_id` 0 denotes a kernel-level event with no
/// associated task.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KernelEvent {
    pub task_id: TaskId,
    pub kind: EventKind,
    pub detail: serde_json::Value,
    pub timestamp: u64,
}

impl KernelEvent {
    pub fn to_json(&self) -> serde_json::Value {
        let mut base = json!({
            "task_id": self.task_id.raw(),
            "timestamp": self.timestamp,
            "kind": self.kind.as_str(),
            "detail": self.detail,
        });

        if let EventKind::Custom(label) = &self.kind {
            if let serde_json::Value::Object(ref mut map) = base {
                map.insert("label".into(), serde_json::Value::String(label.clone()));
            }
        }

        base
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum EventKind {
    KernelInitialized,
    SchedulerInitialized,
    Tick,
    ContextSwitch,
    TaskEnqueued,
    NodeAllocated,
    NodeFreed,
    EdgeCreated,
    AdjacencySkipped,
    DepthClamped,
    AllocationDenied,
    TickBudgetExceeded,
    MembraneRegions,
    Shutdown,
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::KernelInitialized => "kernel_initialized",
            EventKind::SchedulerInitialized => "scheduler_initialized",
            EventKind::Tick => "tick",
            EventKind::ContextSwitch => "context_switch",
            EventKind::TaskEnqueued => "task_enqueued",
            EventKind::NodeAllocated => "node_allocated",
            EventKind::NodeFreed => "node_freed",
            EventKind::EdgeCreated => "edge_created",
            EventKind::AdjacencySkipped => "adjacency_skipped",
            EventKind::DepthClamped => "depth_clamped",
            EventKind::AllocationDenied => "allocation_denied",
            EventKind::TickBudgetExceeded => "tick_budget_exceeded",
            EventKind::MembraneRegions => "membrane_regions",
            EventKind::Shutdown => "shutdown",
            EventKind::Custom(_) => "custom",
        }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    queue: VecDeque<KernelEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, clock: &mut KernelClock, event: EventBuilder) {
        let timestamp = clock.tick();
        self.queue.push_back(event.into_event(timestamp));
    }

    pub fn drain(&mut self) -> Vec<KernelEvent> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

pub struct EventBuilder {
    task_id: TaskId,
    kind: EventKind,
    detail: serde_json::Value,
}

impl EventBuilder {
    pub fn new(task_id: TaskId, kind: EventKind) -> Self {
        Self {
            task_id,
            kind,
            detail: serde_json::Value::Null,
        }
    }

    pub fn detail(mut self, value: impl Serialize) -> Self {
        self.detail = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self
    }

    fn into_event(self, timestamp: u64) -> KernelEvent {
        KernelEvent {
            task_id: self.task_id,
            kind: self.kind,
            detail: self.detail,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn a_tick_trace_drains_in_publication_order() {
        let mut bus = EventBus::new();
        let mut clock = KernelClock::new();
        let selected = TaskId::new(3);

        bus.publish(
            &mut clock,
            EventBuilder::new(selected, EventKind::Tick).detail(json!({"tick": 1, "scored": 2})),
        );
        bus.publish(
            &mut clock,
            EventBuilder::new(selected, EventKind::ContextSwitch).detail(json!({"tick": 1})),
        );
        bus.publish(
            &mut clock,
            EventBuilder::new(TaskId::new(0), EventKind::AdjacencySkipped)
                .detail(json!({"src": 9000, "dst": 1})),
        );
        assert_eq!(bus.len(), 3);

        let events = bus.drain();
        assert_eq!(events[0].kind, EventKind::Tick);
        assert_eq!(events[1].kind, EventKind::ContextSwitch);
        assert_eq!(events[2].kind, EventKind::AdjacencySkipped);
        assert!(events[0].timestamp < events[1].timestamp);
        assert!(events[1].timestamp < events[2].timestamp);
        assert_eq!(events[2].detail["src"], 9000);
        assert!(bus.is_empty());
    }

    #[test]
    fn log_lines_name_the_kind_and_keep_custom_labels() {
        let mut bus = EventBus::new();
        let mut clock = KernelClock::new();

        bus.publish(
            &mut clock,
            EventBuilder::new(TaskId::new(0), EventKind::DepthClamped)
                .detail(json!({"requested": 40, "clamped_to": 16})),
        );
        bus.publish(
            &mut clock,
            EventBuilder::new(TaskId::new(5), EventKind::Custom("attention_decay".into())),
        );

        let events = bus.drain();
        let clamp = events[0].to_json();
        assert_eq!(clamp["kind"], "depth_clamped");
        assert_eq!(clamp["task_id"], 0);
        assert_eq!(clamp["detail"]["clamped_to"], 16);
        assert!(clamp.get("label").is_none());

        let custom = events[1].to_json();
        assert_eq!(custom["kind"], "custom");
        assert_eq!(custom["label"], "attention_decay");
        assert_eq!(custom["detail"], serde_json::Value::Null);
    }
}
