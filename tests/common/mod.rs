//! Python worker fixtures for integration tests
//!
//! Each fixture writes a module with a unique name into its own temp
//! directory, so tests sharing the one interpreter never see each other's
//! code in `sys.modules`.

#![allow(dead_code)]

use httpy::PythonConfig;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

pub struct Worker {
    pub module: String,
    // Kept alive so the module file stays importable
    dir: TempDir,
}

impl Worker {
    /// Write `source` as a fresh module
    pub fn new(source: &str) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
        let module = format!("httpy_worker_{}_{}", std::process::id(), id);
        let dir = tempfile::tempdir().expect("create worker dir");
        fs::write(dir.path().join(format!("{module}.py")), source).expect("write worker module");
        Self { module, dir }
    }

    /// Config for `function` in this module, tracebacks silenced
    pub fn config(&self, function: &str) -> PythonConfig {
        PythonConfig::new(&self.module, function)
            .with_python_path(self.dir.path())
            .with_tracebacks(false)
    }

    /// Same as `config`, with an init callable from this module
    pub fn config_with_init(&self, init: &str, function: &str) -> PythonConfig {
        self.config(function).with_init(&self.module, init)
    }
}
