//! Filesystem work moved off the async executor.

use std::io;

/// Run `work` on tokio's blocking pool.
///
/// A panicked or cancelled task surfaces as an `io::Error`.
pub(crate) async fn run_blocking<T, F>(work: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(io::Error::other)?
}
