//! Scoped access to the interpreter's global execution lock
//!
//! The GIL is thread-affine: whichever OS thread acquires it must be the one
//! that releases it. Both helpers here make that structural:
//!
//! - `with_execution_lock` runs a synchronous closure with the GIL held on
//!   the calling thread. The `Python<'py>` token cannot escape the closure,
//!   is `!Send`, and the closure cannot `.await`, so nothing can migrate
//!   between acquire and release. The guard is released on normal return,
//!   on `Err`, and while unwinding from a panic.
//! - `pinned` is for async callers. It moves a whole lock scope onto one
//!   blocking thread so a tokio task never holds the GIL across a yield.

use pyo3::Python;
use tracing::trace_span;

use crate::errors::BridgeError;

/// Run `f` with the execution lock held on the current OS thread.
///
/// The interpreter must already be started (`interpreter::ensure_started`).
pub fn with_execution_lock<F, R>(f: F) -> R
where
    F: for<'py> FnOnce(Python<'py>) -> R,
{
    let _span = trace_span!("execution_lock").entered();
    Python::with_gil(f)
}

/// Run `f` on a dedicated blocking thread and wait for it.
///
/// `f` typically acquires the execution lock itself; everything from acquire
/// to release happens on that one thread.
pub async fn pinned<F, R>(f: F) -> Result<R, BridgeError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BridgeError::Worker(e.to_string()))
}
