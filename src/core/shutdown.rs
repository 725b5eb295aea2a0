//! OS termination signals for [`Orchestrator::run_until_signal`](crate::Orchestrator::run_until_signal).
//!
//! Unix: SIGINT, SIGTERM (systemd stop), SIGQUIT. Elsewhere: Ctrl-C only.

use std::io;

/// Completes on the first termination signal and returns its name.
#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Completes on Ctrl-C and returns its name.
#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
