//! Shared tokio runtime behind the synchronous store API.
//!
//! Every network [`StoreHandle`](crate::store::StoreHandle) is synchronous
//! from the caller's side; the socket work runs here and the calling thread
//! waits on it through [`block_on`].

use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::Runtime;

/// Overrides the worker thread count when set to a positive integer.
pub const THREADS_ENV: &str = "MULTISTORE_RUNTIME_THREADS";

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// The process-wide runtime, built on first use.
pub fn get_runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all().thread_name("multistore-rt");

        if let Some(n) = std::env::var(THREADS_ENV)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            builder.worker_threads(n);
        }

        match builder.build() {
            Ok(rt) => rt,
            // Nothing can run without it, and OnceLock has no fallible init.
            Err(e) => panic!("multistore: failed to start tokio runtime: {e}"),
        }
    })
}

/// Run `future` to completion on the shared runtime.
///
/// Panics if called from inside an async context.
pub fn block_on<F: Future>(future: F) -> F::Output {
    get_runtime().block_on(future)
}

/// Spawn a background task on the shared runtime.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    get_runtime().spawn(future)
}

// ── Tests ──────────────────────────────────────────────────────────
