//! DAP adapter wire tests against a scripted debugger backend.

mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use aliceserver::debugger::Event;
use aliceserver::session::TargetConfig;

use common::{frame_msg, run_dap, run_dap_raw, MockDebugger};

fn initialize_request(seq: i64) -> Value {
    json!({
        "seq": seq,
        "type": "request",
        "command": "initialize",
        "arguments": {"adapterId": "test"}
    })
}

#[test]
fn test_initialize_negotiates_capabilities() {
    let messages = run_dap(
        &[initialize_request(1)],
        Arc::new(MockDebugger::new()),
        TargetConfig::default(),
    );

    assert_eq!(messages.len(), 1);
    let response = &messages[0];
    assert_eq!(response["seq"], 1);
    assert_eq!(response["request_seq"], 1);
    assert_eq!(response["type"], "response");
    assert_eq!(response["success"], true);
    assert_eq!(response["command"], "initialize");
    assert_eq!(
        response["body"],
        json!({
            "supportTerminateDebuggee": true,
            "supportsConfigurationDoneRequest": true,
            "supportsTerminateRequest": true,
        })
    );
}

#[test]
fn test_attach_missing_pid() {
    let messages = run_dap(
        &[
            initialize_request(1),
            json!({"seq": 2, "type": "request", "command": "attach", "arguments": {}}),
        ],
        Arc::new(MockDebugger::new()),
        TargetConfig::default(),
    );

    assert_eq!(messages.len(), 2);
    let response = &messages[1];
    assert_eq!(response["request_seq"], 2);
    assert_eq!(response["success"], false);
    let error = response["body"]["error"].as_str().unwrap();
    assert!(error.contains("pid"), "error text: {error:?}");
}

#[test]
fn test_server_seq_strictly_increases_from_one() {
    let debugger = Arc::new(MockDebugger::new().with_events([Event::Exited { exit_code: 0 }]));
    let messages = run_dap(
        &[
            initialize_request(1),
            json!({"seq": 2, "type": "request", "command": "configurationDone"}),
            json!({"seq": 3, "type": "request", "command": "launch",
                   "arguments": {"path": "/bin/true"}}),
            json!({"seq": 4, "type": "request", "command": "disconnect", "arguments": {}}),
        ],
        debugger,
        TargetConfig::default(),
    );

    let seqs: Vec<i64> = messages.iter().map(|m| m["seq"].as_i64().unwrap()).collect();
    assert_eq!(seqs[0], 1);
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "seqs: {seqs:?}");

    // every response echoes its request seq
    for message in &messages {
        if message["type"] == "response" {
            assert!(message["request_seq"].as_i64().unwrap() >= 1);
        }
    }
}

#[test]
fn test_commands_rejected_before_initialize() {
    let messages = run_dap(
        &[json!({"seq": 1, "type": "request", "command": "launch",
                 "arguments": {"path": "/bin/true"}})],
        Arc::new(MockDebugger::new()),
        TargetConfig::default(),
    );

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["success"], false);
    let error = messages[0]["body"]["error"].as_str().unwrap();
    assert!(error.contains("initialize"), "error text: {error:?}");
}

#[test]
fn test_reinitialize_rejected() {
    let messages = run_dap(
        &[initialize_request(1), initialize_request(2)],
        Arc::new(MockDebugger::new()),
        TargetConfig::default(),
    );

    assert_eq!(messages[1]["success"], false);
    let error = messages[1]["body"]["error"].as_str().unwrap();
    assert!(error.contains("initialize received twice"), "{error:?}");
}

#[test]
fn test_unknown_path_format_rejected() {
    let messages = run_dap(
        &[json!({"seq": 1, "type": "request", "command": "initialize",
                 "arguments": {"pathFormat": "windows"}})],
        Arc::new(MockDebugger::new()),
        TargetConfig::default(),
    );

    assert_eq!(messages[0]["success"], false);
    let error = messages[0]["body"]["error"].as_str().unwrap();
    assert!(error.contains("pathFormat"), "{error:?}");
}

#[test]
fn test_launch_missing_path() {
    let messages = run_dap(
        &[
            initialize_request(1),
            json!({"seq": 2, "type": "request", "command": "launch", "arguments": {}}),
        ],
        Arc::new(MockDebugger::new()),
        TargetConfig::default(),
    );

    assert_eq!(messages[1]["success"], false);
    let error = messages[1]["body"]["error"].as_str().unwrap();
    assert!(error.contains("path"), "{error:?}");
}

#[test]
fn test_launch_reports_exit_event() {
    let debugger = Arc::new(MockDebugger::new().with_events([Event::Exited { exit_code: 3 }]));
    let messages = run_dap(
        &[
            initialize_request(1),
            json!({"seq": 2, "type": "request", "command": "launch",
                   "arguments": {"path": "/bin/false", "args": ["-x"]}}),
        ],
        debugger.clone(),
        TargetConfig::default(),
    );

    let launch_response = messages
        .iter()
        .find(|m| m["type"] == "response" && m["command"] == "launch")
        .expect("launch response");
    assert_eq!(launch_response["success"], true);
    assert!(launch_response.get("body").is_none());

    let exited = messages
        .iter()
        .find(|m| m["type"] == "event" && m["event"] == "exited")
        .expect("exited event");
    assert_eq!(exited["body"], json!({"exitCode": 3}));

    assert!(
        debugger.calls().iter().any(|c| c == "launch /bin/false [-x]"),
        "{:?}",
        debugger.calls()
    );
}

#[test]
fn test_continue_requires_thread_id() {
    let messages = run_dap(
        &[
            initialize_request(1),
            json!({"seq": 2, "type": "request", "command": "continue", "arguments": {}}),
        ],
        Arc::new(MockDebugger::new()),
        TargetConfig::default(),
    );

    assert_eq!(messages[1]["success"], false);
    let error = messages[1]["body"]["error"].as_str().unwrap();
    assert!(error.contains("threadId"), "{error:?}");
}

#[test]
fn test_unknown_command_rejected() {
    let messages = run_dap(
        &[
            initialize_request(1),
            json!({"seq": 2, "type": "request", "command": "restartFrame", "arguments": {}}),
        ],
        Arc::new(MockDebugger::new()),
        TargetConfig::default(),
    );

    assert_eq!(messages[1]["success"], false);
    assert_eq!(
        messages[1]["body"]["error"],
        json!("Unknown request: \"restartFrame\"")
    );
}

#[test]
fn test_malformed_header_answered_at_envelope_level() {
    let mut input = Vec::new();
    input.extend_from_slice(b"X-Unknown: 1\r\n");
    input.extend_from_slice(&frame_msg(&initialize_request(1)));

    let messages = run_dap_raw(input, Arc::new(MockDebugger::new()), TargetConfig::default());

    assert_eq!(messages[0]["success"], false);
    assert_eq!(messages[0]["request_seq"], 0);
    let error = messages[0]["body"]["error"].as_str().unwrap();
    assert!(error.contains("framing"), "{error:?}");

    // the stream recovers and serves the next request
    assert_eq!(messages[1]["command"], "initialize");
    assert_eq!(messages[1]["success"], true);
}

#[test]
fn test_non_request_messages_ignored() {
    let messages = run_dap(
        &[
            json!({"seq": 1, "type": "event", "event": "noise"}),
            initialize_request(2),
        ],
        Arc::new(MockDebugger::new()),
        TargetConfig::default(),
    );

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["command"], "initialize");
    assert_eq!(messages[0]["request_seq"], 2);
}
