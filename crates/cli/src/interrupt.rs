//! Ctrl-C handling. The first interrupt cancels the batch; the rewrite in
//! flight is aborted and publishes nothing. A second interrupt exits at once.

use std::thread;

use anyhow::{Context, Result};
use remover::CancellationToken;
use tracing::warn;

/// Exit status a shell reports for SIGINT.
const INTERRUPTED: i32 = 130;

/// Starts a watcher thread that cancels `token` on Ctrl-C.
pub fn cancel_on_interrupt(token: CancellationToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start the signal runtime")?;
    thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || runtime.block_on(watch(token)))
        .context("cannot start the interrupt watcher")?;
    Ok(())
}

async fn watch(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        return;
    }
    warn!("interrupted, abandoning the batch; press Ctrl-C again to exit immediately");
    token.cancel();
    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(INTERRUPTED);
    }
}
