use anyhow::Result;

/// Tracking runs on a single thread. All mutations go through one event loop anyway.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
