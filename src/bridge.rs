//! Process-wide bridge context: initialization and per-request invocation
//!
//! A `Bridge` owns the resolved request handler. `initialize` writes it,
//! `invoke` only reads it. Invocation clones the handler out of the lock and
//! drops the lock before touching the interpreter, so `initialize` (which
//! holds the execution lock while it stores a new handler) can never
//! deadlock against a request in flight.

use parking_lot::RwLock;
use pyo3::exceptions::PySystemExit;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyTuple};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::PythonConfig;
use crate::errors::{BridgeError, MarshalError};
use crate::interpreter::{self, with_execution_lock};
use crate::marshal::{body_bytes, dict_into_map, map_to_dict, sequence_items, status_code, type_name};
use crate::metrics::{BridgeStats, Counters};
use crate::types::{Request, Response, RouteTable};

/// The resolved request callable and how to treat its failures
struct Handler {
    callable: Py<PyAny>,
    /// `module.function`, for diagnostics
    target: String,
    print_tracebacks: bool,
}

pub struct Bridge {
    handler: RwLock<Option<Arc<Handler>>>,
    counters: Counters,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge {
    /// An uninitialized bridge; every `invoke` fails until `initialize` succeeds
    pub fn new() -> Self {
        Self {
            handler: RwLock::new(None),
            counters: Counters::new(),
        }
    }

    /// Start the interpreter, run the optional init callable, and resolve the
    /// request handler.
    ///
    /// `init_module`/`init_function` are optional (pass `""` to skip);
    /// `request_module`/`request_function` are required.
    pub fn initialize(
        &self,
        init_module: &str,
        init_function: &str,
        request_module: &str,
        request_function: &str,
    ) -> Result<RouteTable, BridgeError> {
        let mut config = PythonConfig::new(request_module, request_function);
        if !init_module.is_empty() && !init_function.is_empty() {
            config = config.with_init(init_module, init_function);
        }
        self.initialize_with(&config)
    }

    /// Same as `initialize`, driven by a `[python]` config section
    #[instrument(name = "initialize", skip_all, fields(handler = %config.request_target()))]
    pub fn initialize_with(&self, config: &PythonConfig) -> Result<RouteTable, BridgeError> {
        config.validate()?;
        interpreter::ensure_started()?;

        with_execution_lock(|py| -> Result<RouteTable, BridgeError> {
            interpreter::extend_sys_path(py, &config.python_path)?;

            let mut routes = RouteTable::new();
            let mut init_module = None;

            if let Some((module_name, function_name)) = config.init_target() {
                let module = interpreter::import_module(py, module_name)?;
                let init = interpreter::resolve_callable(module, function_name)?;
                routes = run_init(py, init, module_name, function_name, config.print_tracebacks)?;
                init_module = Some((module_name, module));
            }

            let request_module = match init_module {
                Some((name, module)) if name == config.request_module => module,
                _ => interpreter::import_module(py, &config.request_module)?,
            };
            let callable = interpreter::resolve_callable(request_module, &config.request_function)?;

            let handler = Arc::new(Handler {
                callable,
                target: config.request_target(),
                print_tracebacks: config.print_tracebacks,
            });
            // Any previous handler is released here, with the lock held
            *self.handler.write() = Some(handler);

            info!(routes = routes.len(), "python handler ready");
            Ok(routes)
        })
    }

    /// Whether a handler has been resolved
    pub fn is_initialized(&self) -> bool {
        self.handler.read().is_some()
    }

    /// Dispatch one request to the Python handler on the calling thread.
    pub fn invoke(&self, request: &Request) -> Result<Response, BridgeError> {
        let Some(handler) = self.handler.read().clone() else {
            self.counters.record_rejected();
            return Err(BridgeError::NotInitialized);
        };

        self.counters.record_request();
        let started = Instant::now();

        let result = with_execution_lock(|py| call_handler(py, &handler, request));

        match &result {
            Ok(response) => debug!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                elapsed_us = started.elapsed().as_micros() as u64,
                "python request handled"
            ),
            Err(err) => {
                self.record_failure(err);
                warn!(
                    method = %request.method,
                    path = %request.path,
                    error = %err,
                    "python request failed"
                );
            }
        }

        result
    }

    /// `invoke` for async callers.
    ///
    /// The whole lock scope runs on one blocking thread, so a task never holds
    /// the execution lock across an `.await`.
    pub async fn invoke_async(self: &Arc<Self>, request: Request) -> Result<Response, BridgeError> {
        let bridge = Arc::clone(self);
        interpreter::pinned(move || bridge.invoke(&request)).await?
    }

    pub fn stats(&self) -> BridgeStats {
        self.counters.snapshot()
    }

    fn record_failure(&self, err: &BridgeError) {
        match err {
            BridgeError::MalformedResult { .. } => self.counters.record_malformed(),
            BridgeError::Arguments { .. } => self.counters.record_argument_failure(),
            _ => self.counters.record_exception(),
        }
    }
}

/// Call the init callable and read back its route table.
fn run_init(
    py: Python<'_>,
    init: Py<PyAny>,
    module: &str,
    function: &str,
    print_tracebacks: bool,
) -> Result<RouteTable, BridgeError> {
    let failure = |message: String| BridgeError::InitFailure {
        module: module.to_string(),
        function: function.to_string(),
        message,
    };

    let out = init.call0(py).map_err(|err| failure(describe(py, err, print_tracebacks)))?;
    let out = out.as_ref(py);

    if out.is_none() {
        return Ok(RouteTable::new());
    }

    let dict = out.downcast::<PyDict>().map_err(|_| {
        failure(
            MarshalError::NotADict {
                found: type_name(out),
            }
            .to_string(),
        )
    })?;

    dict_into_map(py, dict.into()).map_err(|e| failure(e.to_string()))
}

fn call_handler(py: Python<'_>, handler: &Handler, request: &Request) -> Result<Response, BridgeError> {
    let marshal_failed = |err: PyErr| BridgeError::Arguments {
        target: handler.target.clone(),
        source: err.into(),
    };

    let path_params = map_to_dict(py, &request.path_params).map_err(marshal_failed)?;
    let query = map_to_dict(py, &request.query).map_err(marshal_failed)?;
    let headers = map_to_dict(py, &request.headers).map_err(marshal_failed)?;

    let args = PyTuple::new(
        py,
        [
            request.method.to_object(py),
            request.path.to_object(py),
            path_params.to_object(py),
            query.to_object(py),
            headers.to_object(py),
            request.body.to_object(py),
        ],
    );

    let out = handler.callable.call1(py, args).map_err(|err| BridgeError::Exception {
        target: handler.target.clone(),
        message: describe(py, err, handler.print_tracebacks),
    })?;

    read_response(py, out).map_err(|source| BridgeError::MalformedResult {
        target: handler.target.clone(),
        source,
    })
}

/// Unpack `(status, body, headers)`; `None` headers mean no headers.
fn read_response(py: Python<'_>, out: PyObject) -> Result<Response, MarshalError> {
    let out = out.into_ref(py);
    let items = match sequence_items(out) {
        Some(items) if items.len() == 3 => items,
        _ => {
            return Err(MarshalError::NotATriple {
                found: type_name(out),
            })
        }
    };

    let status = status_code(items[0])?;
    let body = body_bytes(items[1])?;
    let headers = if items[2].is_none() {
        Default::default()
    } else {
        let dict = items[2].downcast::<PyDict>().map_err(|_| MarshalError::NotADict {
            found: type_name(items[2]),
        })?;
        dict_into_map(py, dict.into())?
    };

    Ok(Response { status, body, headers })
}

/// Render a Python exception as `Type: message`, printing the traceback first
/// if asked. Either way the error indicator is left clear.
///
/// `SystemExit` is never printed: CPython's printer exits the process on it.
fn describe(py: Python<'_>, err: PyErr, print_traceback: bool) -> String {
    let message = err.to_string();
    if err.is_instance_of::<PySystemExit>(py) {
        warn!(exception = %message, "python code called sys.exit; ignoring");
    } else if print_traceback {
        err.print(py);
    }
    message
}
