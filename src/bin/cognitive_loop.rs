use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::{env, process};

use echo_kernel::{
    EchoKernel, EdgeType, EventKind, KernelConfig, KernelEvent, NodeHandle, ReservoirConfig,
};
use serde::Deserialize;
use serde_json::Value;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let config_path = args.next().ok_or_else(
        || "missing configuration path. usage: cognitive_loop <config> [events.jsonl]",
    )?;
    let output_path = args.next().map(PathBuf::from);

    let file = File::open(&config_path)?;
    let reader = BufReader::new(file);
    let config: LoopConfig = serde_json::from_reader(reader)?;

    let mut kernel = EchoKernel::boot(config.kernel)?;

    let mut handles: Vec<NodeHandle> = Vec::new();
    for node in &config.nodes {
        let alloc = kernel.hgfs_alloc(node.size, node.depth)?;
        handles.push(alloc.handle);
    }
    for edge in &config.edges {
        let src = *handles
            .get(edge.src)
            .ok_or_else(|| format!("edge source index {} out of range", edge.src))?;
        let dst = *handles
            .get(edge.dst)
            .ok_or_else(|| format!("edge destination index {} out of range", edge.dst))?;
        kernel.hgfs_edge(src, dst, edge.edge_type)?;
    }

    kernel.scheduler_init(Some(config.reservoir))?;
    for spec in config.tasks {
        let task = kernel
            .allocate_task(spec.sti, spec.lti)
            .with_payload(spec.payload);
        kernel.scheduler_enqueue(task)?;
    }

    for _ in 0..config.cycles {
        kernel.scheduler_tick()?;
    }

    let report = kernel.shutdown()?;
    let events = kernel.drain_events();

    if let Some(path) = output_path {
        write_events(&events, path)?;
    }

    print_summary(&events, report.released_tasks.len(), &report.stats);

    Ok(())
}

fn write_events(events: &[KernelEvent], path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);

    for event in events {
        let line = serde_json::to_string(&event.to_json())?;
        writeln!(writer, "{}", line)?;
    }

    writer.flush()?;
    Ok(())
}

fn print_summary(events: &[KernelEvent], released_tasks: usize, stats: &echo_kernel::KernelStats) {
    println!("Cognitive loop summary:");
    println!("  ticks: {}", stats.total_ticks);
    println!("  context switches: {}", stats.context_switches);
    println!("  avg tick ns: {:.1}", stats.avg_tick_ns);
    println!("  max tick ns: {}", stats.max_tick_ns);
    println!("  memory used: {} / peak {}", stats.memory_used, stats.memory_peak);
    println!("  edges created: {}", stats.total_edges);
    println!("  adjacency skips: {}", stats.adjacency_skips);
    println!("  depth clamps: {}", stats.depth_clamps);
    println!("  tasks released at shutdown: {released_tasks}");
    println!("  total events: {}", events.len());

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for event in events {
        let key = match &event.kind {
            EventKind::Custom(label) => format!("custom({label})"),
            other => other.as_str().to_string(),
        };
        *counts.entry(key).or_default() += 1;
    }
    for (kind, count) in counts {
        println!("    {kind}: {count}");
    }
}

#[derive(Debug, Deserialize)]
struct LoopConfig {
    #[serde(default)]
    kernel: KernelConfig,
    #[serde(default)]
    reservoir: ReservoirConfig,
    #[serde(default)]
    cycles: u64,
    #[serde(default)]
    tasks: Vec<TaskSpec>,
    #[serde(default)]
    nodes: Vec<NodeSpec>,
    #[serde(default)]
    edges: Vec<EdgeSpec>,
}

#[derive(Debug, Deserialize)]
struct TaskSpec {
    sti: i32,
    #[serde(default)]
    lti: i32,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct NodeSpec {
    size: usize,
    #[serde(default)]
    depth: u32,
}

#[derive(Debug, Deserialize)]
struct EdgeSpec {
    src: usize,
    dst: usize,
    edge_type: EdgeType,
}
