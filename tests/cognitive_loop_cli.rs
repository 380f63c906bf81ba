use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use serde_json::json;

fn write_config() -> PathBuf {
    let mut path = std::env::temp_dir();
    let unique = format!("echo_kernel_loop_config_{}.json", std::process::id());
    path.push(unique);

    let config = json!({
        "kernel": {
            "memory_pool_size": 65536,
            "tensor_arena_elems": 16384,
            "max_atoms": 16,
            "max_membrane_depth": 8,
            "seed": 7
        },
        "reservoir": {
            "size": 16,
            "input_dim": 8,
            "output_dim": 4
        },
        "cycles": 3,
        "tasks": [
            {"sti": 40000, "payload": {"goal": "perceive"}},
            {"sti": 1000, "lti": 500, "payload": {"goal": "consolidate"}}
        ],
        "nodes": [
            {"size": 64, "depth": 1},
            {"size": 64, "depth": 2}
        ],
        "edges": [
            {"src": 0, "dst": 1, "edge_type": "inheritance"}
        ]
    });

    let mut file = fs::File::create(&path).expect("create config");
    write!(file, "{}", serde_json::to_string_pretty(&config).unwrap()).expect("write config");
    path
}

#[test]
fn cognitive_loop_runs_from_config() {
    let config_path = write_config();
    let mut events_path = std::env::temp_dir();
    events_path.push(format!(
        "echo_kernel_loop_events_{}_.jsonl",
        std::process::id()
    ));

    let exe = env!("CARGO_BIN_EXE_cognitive_loop");
    let output = Command::new(exe)
        .arg(&config_path)
        .arg(&events_path)
        .output()
        .expect("run cognitive loop");

    fs::remove_file(&config_path).ok();

    assert!(
        output.status.success(),
        "cognitive loop failed: {:?}",
        output
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout utf8");
    assert!(stdout.contains("Cognitive loop summary"));
    assert!(stdout.contains("ticks: 3"));
    assert!(stdout.contains("edges created: 1"));

    let event_log = fs::read_to_string(&events_path).expect("read events");
    fs::remove_file(&events_path).ok();
    assert!(event_log.contains("\"kind\":\"tick\""));
    assert!(event_log.contains("\"kind\":\"edge_created\""));
    assert!(event_log.contains("\"kind\":\"shutdown\""));
}
