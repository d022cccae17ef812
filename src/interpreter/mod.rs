//! Embedded interpreter lifecycle
//!
//! The interpreter is started at most once per process and never finalized:
//! tearing CPython down after other threads have touched it is not supported.
//! Everything else here resolves modules and callables by name.

pub mod lock;

use once_cell::sync::OnceCell;
use pyo3::prelude::*;
use pyo3::types::{PyList, PyModule};
use std::path::Path;
use tracing::{debug, info};

use crate::errors::BridgeError;
pub use lock::{pinned, with_execution_lock};

static STARTED: OnceCell<()> = OnceCell::new();

/// Start the interpreter if nobody has yet and confirm it can run threads.
///
/// Safe to call from many threads; only the first call does any work.
pub fn ensure_started() -> Result<(), BridgeError> {
    STARTED.get_or_try_init(start).map(|_| ())
}

/// Whether this process has a live interpreter
pub fn is_started() -> bool {
    // SAFETY: Py_IsInitialized only reads interpreter state and may be called
    // at any time, with or without the GIL.
    unsafe { pyo3::ffi::Py_IsInitialized() != 0 }
}

fn start() -> Result<(), BridgeError> {
    // Initializes (if needed) and releases the GIL from this thread, so any
    // thread may acquire it afterwards.
    pyo3::prepare_freethreaded_python();

    if !is_started() {
        return Err(BridgeError::Startup(
            "interpreter reports itself uninitialized".to_string(),
        ));
    }

    let version = with_execution_lock(|py| {
        py.import("threading")
            .map(|_| py.version().to_string())
            .map_err(|e| BridgeError::Startup(format!("thread support unavailable: {e}")))
    })?;

    info!(version = %version, "embedded python started");
    Ok(())
}

/// Prepend `dirs` to `sys.path`, skipping entries already present.
pub fn extend_sys_path<P: AsRef<Path>>(py: Python<'_>, dirs: &[P]) -> Result<(), BridgeError> {
    if dirs.is_empty() {
        return Ok(());
    }

    let update = || -> PyResult<()> {
        let sys_path = py.import("sys")?.getattr("path")?.downcast::<PyList>()?;
        for dir in dirs.iter().rev() {
            let dir = dir.as_ref().to_string_lossy();
            if !sys_path.contains(&*dir)? {
                debug!(dir = %dir, "adding to sys.path");
                sys_path.insert(0, &*dir)?;
            }
        }
        py.import("importlib")?.call_method0("invalidate_caches")?;
        Ok(())
    };

    update().map_err(|e| BridgeError::Startup(format!("failed to update sys.path: {e}")))
}

/// Import a module by its dotted name.
pub fn import_module<'py>(py: Python<'py>, name: &str) -> Result<&'py PyModule, BridgeError> {
    PyModule::import(py, name).map_err(|e| BridgeError::ModuleNotFound {
        module: name.to_string(),
        message: e.to_string(),
    })
}

/// Look up `function` on `module` and make sure it can be called.
pub fn resolve_callable(module: &PyModule, function: &str) -> Result<Py<PyAny>, BridgeError> {
    let module_name = module.name().unwrap_or("<unknown>").to_string();

    let attr = module
        .getattr(function)
        .map_err(|_| BridgeError::FunctionNotFound {
            module: module_name.clone(),
            function: function.to_string(),
        })?;

    if !attr.is_callable() {
        return Err(BridgeError::NotCallable {
            module: module_name,
            function: function.to_string(),
        });
    }

    Ok(attr.into())
}
