//! End-to-end tests against real Python workers
//!
//! All tests share one embedded interpreter. Each uses its own `Bridge` and
//! its own worker module so they can run in parallel.

mod common;

use common::Worker;
use httpy::{Bridge, ErrorKind, MarshalError, BridgeError, Request, RouteTable};
use std::sync::Arc;
use std::thread;

const HANDLERS: &str = r#"
import json
import time

STATE = {"init_calls": 0}

def go_init():
    STATE["init_calls"] += 1
    return {"/a": ["GET"], "/b": ["GET", "POST"]}

def init_none():
    return None

def init_tuple_values():
    return {"/t": ("GET", "HEAD"), "/skip": None}

def init_list():
    return ["/a"]

def init_raises():
    raise RuntimeError("no database")

def init_bad_values():
    return {"/a": "GET"}

def init_quits():
    import sys
    sys.exit(4)

def created(method, path, params, query, headers, body):
    return 201, "created", {"X-Id": ["42"]}

def ready(method, path, params, query, headers, body):
    return 200, "ready after %d init" % STATE["init_calls"], None

def boom(method, path, params, query, headers, body):
    raise ValueError("boom")

def raw(method, path, params, query, headers, body):
    return 200, b"\x00\xffraw", None

def echo(method, path, params, query, headers, body):
    return 200, json.dumps({
        "method": method,
        "path": path,
        "params": params,
        "query": query,
        "headers": headers,
        "body": body,
        "value_types": sorted({type(v).__name__ for d in (params, query, headers) for v in d.values()}),
    }), {"Content-Type": ["application/json"]}

def sleepy(method, path, params, query, headers, body):
    time.sleep(float(headers.get("X-Sleep", ["0"])[0]))
    return 200, headers["X-Token"][0], {"X-Token": headers["X-Token"]}

def v1(method, path, params, query, headers, body):
    return 200, "v1", None

def v2(method, path, params, query, headers, body):
    return 200, "v2", None

def not_a_tuple(method, path, params, query, headers, body):
    return "oops"

def short_tuple(method, path, params, query, headers, body):
    return 200, "x"

def str_status(method, path, params, query, headers, body):
    return "200", "x", {}

def bool_status(method, path, params, query, headers, body):
    return True, "x", {}

def tiny_status(method, path, params, query, headers, body):
    return 42, "x", {}

def int_body(method, path, params, query, headers, body):
    return 200, 7, {}

def bare_str_header(method, path, params, query, headers, body):
    return 200, "x", {"X-One": "single"}

def int_header_item(method, path, params, query, headers, body):
    return 200, "x", {"X-One": ["ok", 1]}

def list_headers(method, path, params, query, headers, body):
    return 200, "x", [("X-One", ["a"])]

def quits(method, path, params, query, headers, body):
    import sys
    sys.exit(3)

NOT_CALLABLE = 3
"#;

fn ready_bridge(worker: &Worker, function: &str) -> Bridge {
    let bridge = Bridge::new();
    bridge
        .initialize_with(&worker.config(function))
        .expect("initialize");
    bridge
}

fn malformed(worker: &Worker, function: &str) -> MarshalError {
    let bridge = ready_bridge(worker, function);
    match bridge.invoke(&Request::new("GET", "/")) {
        Err(BridgeError::MalformedResult { source, .. }) => source,
        other => panic!("{function}: expected a malformed result, got {other:?}"),
    }
}

#[test]
fn test_init_returns_route_table() {
    let worker = Worker::new(HANDLERS);
    let bridge = Bridge::new();

    let routes = bridge
        .initialize_with(&worker.config_with_init("go_init", "created"))
        .unwrap();

    let expected: RouteTable = [
        ("/a".to_string(), vec!["GET".to_string()]),
        ("/b".to_string(), vec!["GET".to_string(), "POST".to_string()]),
    ]
    .into_iter()
    .collect();
    assert_eq!(routes, expected);
    assert!(bridge.is_initialized());
}

#[test]
fn test_init_variants() {
    let worker = Worker::new(HANDLERS);
    let bridge = Bridge::new();

    let routes = bridge
        .initialize_with(&worker.config_with_init("init_none", "created"))
        .unwrap();
    assert!(routes.is_empty());

    let routes = bridge
        .initialize_with(&worker.config_with_init("init_tuple_values", "created"))
        .unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes["/t"], vec!["GET".to_string(), "HEAD".to_string()]);
}

#[test]
fn test_init_failures() {
    let worker = Worker::new(HANDLERS);

    for init in ["init_raises", "init_list", "init_bad_values"] {
        let bridge = Bridge::new();
        let err = bridge
            .initialize_with(&worker.config_with_init(init, "created"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Initialization, "{init}: {err}");
        assert!(!bridge.is_initialized(), "{init}");
    }

    let err = Bridge::new()
        .initialize_with(&worker.config_with_init("init_raises", "created"))
        .unwrap_err();
    assert!(err.to_string().contains("RuntimeError: no database"), "{err}");
}

#[test]
fn test_init_runs_before_handler_in_same_module() {
    let worker = Worker::new(HANDLERS);
    let bridge = Bridge::new();
    bridge
        .initialize_with(&worker.config_with_init("go_init", "ready"))
        .unwrap();

    let resp = bridge.invoke(&Request::new("GET", "/")).unwrap();
    assert_eq!(resp.text(), Some("ready after 1 init"));
}

#[test]
fn test_handler_response() {
    let worker = Worker::new(HANDLERS);
    let bridge = ready_bridge(&worker, "created");

    let resp = bridge.invoke(&Request::new("POST", "/things").with_body("{}")).unwrap();
    assert_eq!(resp.status, 201);
    assert_eq!(resp.body, b"created");
    assert_eq!(resp.headers.len(), 1);
    assert_eq!(resp.headers["X-Id"], vec!["42".to_string()]);
    assert_eq!(resp.header("x-id"), Some("42"));
}

#[test]
fn test_bytes_body_passes_through() {
    let worker = Worker::new(HANDLERS);
    let bridge = ready_bridge(&worker, "raw");

    let resp = bridge.invoke(&Request::new("GET", "/raw")).unwrap();
    assert_eq!(resp.body, b"\x00\xffraw".to_vec());
    assert!(resp.text().is_none());
    assert!(resp.headers.is_empty());
}

#[test]
fn test_request_reaches_python_intact() {
    let worker = Worker::new(HANDLERS);
    let bridge = ready_bridge(&worker, "echo");

    let request = Request::new("PUT", "/hello/world")
        .with_param("target", "world")
        .with_query("tag", "a")
        .with_query("tag", "b")
        .with_header("X-Sleep", "0")
        .with_body("héllo");
    let resp = bridge.invoke(&request).unwrap();
    assert_eq!(resp.header("content-type"), Some("application/json"));

    let echoed: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(echoed["method"], "PUT");
    assert_eq!(echoed["path"], "/hello/world");
    assert_eq!(echoed["params"], serde_json::json!({"target": ["world"]}));
    assert_eq!(echoed["query"], serde_json::json!({"tag": ["a", "b"]}));
    assert_eq!(echoed["headers"], serde_json::json!({"X-Sleep": ["0"]}));
    assert_eq!(echoed["body"], "héllo");
    assert_eq!(echoed["value_types"], serde_json::json!(["list"]));
}

#[test]
fn test_empty_maps_arrive_as_empty_dicts() {
    let worker = Worker::new(HANDLERS);
    let bridge = ready_bridge(&worker, "echo");

    let resp = bridge.invoke(&Request::new("GET", "/")).unwrap();
    let echoed: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    for key in ["params", "query", "headers"] {
        assert_eq!(echoed[key], serde_json::json!({}), "{key}");
    }
    assert_eq!(echoed["body"], "");
}

#[test]
fn test_handler_exception_is_reported_and_recovered() {
    let worker = Worker::new(HANDLERS);
    let bridge = ready_bridge(&worker, "boom");

    let err = bridge.invoke(&Request::new("GET", "/boom")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exception);
    assert_eq!(err.status(), 500);
    assert!(err.to_string().contains("ValueError: boom"), "{err}");

    // The interpreter is left usable
    bridge.initialize_with(&worker.config("created")).unwrap();
    let resp = bridge.invoke(&Request::new("GET", "/")).unwrap();
    assert_eq!(resp.status, 201);
}

#[test]
fn test_sys_exit_in_handler_is_an_exception() {
    let worker = Worker::new(HANDLERS);
    let bridge = Bridge::new();
    bridge
        .initialize_with(&worker.config("quits").with_tracebacks(true))
        .unwrap();

    let err = bridge.invoke(&Request::new("GET", "/quit")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exception);
    assert_eq!(err.status(), 500);
    assert!(err.to_string().contains("SystemExit"), "{err}");
    assert_eq!(bridge.stats().exceptions, 1);

    // Still alive and serving
    bridge.initialize_with(&worker.config("v1")).unwrap();
    assert_eq!(bridge.invoke(&Request::new("GET", "/")).unwrap().body, b"v1");
}

#[test]
fn test_sys_exit_in_init_is_an_init_failure() {
    let worker = Worker::new(HANDLERS);
    let bridge = Bridge::new();

    let err = bridge
        .initialize_with(&worker.config_with_init("init_quits", "v1").with_tracebacks(true))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Initialization);
    assert!(err.to_string().contains("SystemExit"), "{err}");
    assert!(!bridge.is_initialized());
}

#[test]
fn test_malformed_results() {
    let worker = Worker::new(HANDLERS);

    assert!(matches!(malformed(&worker, "not_a_tuple"), MarshalError::NotATriple { .. }));
    assert!(matches!(malformed(&worker, "short_tuple"), MarshalError::NotATriple { .. }));
    assert!(matches!(malformed(&worker, "str_status"), MarshalError::InvalidStatus { .. }));
    assert!(matches!(malformed(&worker, "bool_status"), MarshalError::InvalidStatus { .. }));
    assert_eq!(malformed(&worker, "tiny_status"), MarshalError::StatusOutOfRange(42));
    assert!(matches!(malformed(&worker, "int_body"), MarshalError::InvalidBody { .. }));
    assert!(matches!(malformed(&worker, "list_headers"), MarshalError::NotADict { .. }));
    assert!(matches!(
        malformed(&worker, "bare_str_header"),
        MarshalError::InvalidValues { ref key, .. } if key == "X-One"
    ));
    assert!(matches!(
        malformed(&worker, "int_header_item"),
        MarshalError::InvalidItem { index: 1, .. }
    ));
}

#[test]
fn test_resolution_errors() {
    let worker = Worker::new(HANDLERS);
    let bridge = Bridge::new();

    let err = bridge
        .initialize("", "", "httpy_no_such_module_anywhere", "handle")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert!(matches!(err, BridgeError::ModuleNotFound { .. }));

    let err = bridge.initialize_with(&worker.config("no_such_function")).unwrap_err();
    assert!(matches!(err, BridgeError::FunctionNotFound { .. }));

    let err = bridge.initialize_with(&worker.config("NOT_CALLABLE")).unwrap_err();
    assert!(matches!(err, BridgeError::NotCallable { .. }));
    assert_eq!(err.kind(), ErrorKind::Resolution);

    let err = bridge
        .initialize_with(&worker.config("created").with_init("httpy_no_such_init_module", "go_init"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);

    assert!(!bridge.is_initialized());
}

#[test]
fn test_reinitialize_replaces_handler() {
    let worker = Worker::new(HANDLERS);
    let bridge = ready_bridge(&worker, "v1");
    assert_eq!(bridge.invoke(&Request::new("GET", "/")).unwrap().body, b"v1");

    bridge.initialize_with(&worker.config("v2")).unwrap();
    assert_eq!(bridge.invoke(&Request::new("GET", "/")).unwrap().body, b"v2");

    // A failed re-initialize keeps the previous handler
    assert!(bridge.initialize_with(&worker.config("missing")).is_err());
    assert_eq!(bridge.invoke(&Request::new("GET", "/")).unwrap().body, b"v2");
}

#[test]
fn test_concurrent_requests_get_their_own_responses() {
    let worker = Worker::new(HANDLERS);
    let bridge = Arc::new(ready_bridge(&worker, "sleepy"));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                let token = format!("token-{i}");
                let request = Request::new("GET", "/sleep")
                    .with_header("X-Sleep", "0.02")
                    .with_header("X-Token", token.clone());
                let resp = bridge.invoke(&request).unwrap();
                (token, resp)
            })
        })
        .collect();

    for handle in handles {
        let (token, resp) = handle.join().unwrap();
        assert_eq!(resp.text(), Some(token.as_str()));
        assert_eq!(resp.header("X-Token"), Some(token.as_str()));
    }
    assert_eq!(bridge.stats().requests, 8);
    assert_eq!(bridge.stats().failures(), 0);
}

#[tokio::test]
async fn test_invoke_async() {
    let worker = Worker::new(HANDLERS);
    let bridge = Arc::new(ready_bridge(&worker, "sleepy"));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                let request = Request::new("GET", "/")
                    .with_header("X-Sleep", "0.01")
                    .with_header("X-Token", format!("async-{i}"));
                bridge.invoke_async(request).await
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        let resp = task.await.unwrap().unwrap();
        assert_eq!(resp.text(), Some(format!("async-{i}").as_str()));
    }
}

#[tokio::test]
async fn test_invoke_async_before_initialize() {
    let bridge = Arc::new(Bridge::new());
    let err = bridge.invoke_async(Request::new("GET", "/")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInitialized);
}

#[test]
fn test_stats() {
    let worker = Worker::new(HANDLERS);
    let bridge = Bridge::new();
    let _ = bridge.invoke(&Request::new("GET", "/"));

    bridge.initialize_with(&worker.config("v1")).unwrap();
    bridge.invoke(&Request::new("GET", "/")).unwrap();
    bridge.invoke(&Request::new("GET", "/")).unwrap();

    bridge.initialize_with(&worker.config("boom")).unwrap();
    let _ = bridge.invoke(&Request::new("GET", "/"));

    bridge.initialize_with(&worker.config("short_tuple")).unwrap();
    let _ = bridge.invoke(&Request::new("GET", "/"));

    let stats = bridge.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.requests, 4);
    assert_eq!(stats.exceptions, 1);
    assert_eq!(stats.malformed_results, 1);
    assert_eq!(stats.failures(), 2);
}

#[test]
fn test_global_bridge() {
    let worker = Worker::new(HANDLERS);

    let routes = httpy::init_with(&worker.config_with_init("go_init", "created")).unwrap();
    assert_eq!(routes.len(), 2);
    assert!(httpy::global().is_initialized());

    let resp = httpy::request(&Request::new("GET", "/a")).unwrap();
    assert_eq!(resp.status, 201);
}
