use anyhow::Result;

/// Everything in shiftclock runs on one thread. Network calls and the elapsed-time ticker are
/// cooperative tasks on this runtime.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
