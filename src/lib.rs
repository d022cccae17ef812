//! httpy - dispatch HTTP requests to a Python worker running in an embedded
//! interpreter.
//!
//! The host server owns sockets and routing. For each request it hands the
//! method, path, parameters, headers and body to a Python function and gets
//! back `(status, body, headers)`.
//!
//! ```ignore
//! let routes = httpy::init("worker", "go_init", "worker", "go_request")?;
//! let resp = httpy::request(&httpy::Request::new("GET", "/ping"))?;
//! assert_eq!(resp.status, 200);
//! ```
//!
//! The Python side must look like:
//!
//! ```python
//! def go_init():                      # optional
//!     return {"/ping": ["GET"]}
//!
//! def go_request(method, path, params, query, headers, body):
//!     return 200, "pong", {"Content-Type": ["text/plain"]}
//! ```

pub mod bridge;
pub mod config;
pub mod errors;
pub mod interpreter;
pub mod logging;
pub mod marshal;
pub mod metrics;
pub mod types;

pub use bridge::Bridge;
pub use config::{HttpyConfig, LoggingSection, PythonConfig};
pub use errors::{BridgeError, ConfigError, ErrorKind, MarshalError};
pub use logging::{init_dev_logging, init_logging, LogConfig, LogFormat, LogOutput};
pub use metrics::BridgeStats;
pub use types::{MultiMap, Request, Response, RouteTable};

use once_cell::sync::Lazy;
use std::sync::Arc;

static GLOBAL: Lazy<Arc<Bridge>> = Lazy::new(|| Arc::new(Bridge::new()));

/// The process-wide bridge behind `init` and `request`
pub fn global() -> &'static Arc<Bridge> {
    &GLOBAL
}

/// Initialize the process-wide bridge. Must be called before `request`.
///
/// `init_module`/`init_function` are optional (pass `""`); the returned route
/// table is whatever the init function returned.
pub fn init(
    init_module: &str,
    init_function: &str,
    request_module: &str,
    request_function: &str,
) -> Result<RouteTable, BridgeError> {
    GLOBAL.initialize(init_module, init_function, request_module, request_function)
}

/// Initialize the process-wide bridge from a `[python]` config section
pub fn init_with(config: &PythonConfig) -> Result<RouteTable, BridgeError> {
    GLOBAL.initialize_with(config)
}

/// Dispatch one request through the process-wide bridge
pub fn request(request: &Request) -> Result<Response, BridgeError> {
    GLOBAL.invoke(request)
}

/// Async variant of `request`
pub async fn request_async(request: Request) -> Result<Response, BridgeError> {
    GLOBAL.invoke_async(request).await
}
