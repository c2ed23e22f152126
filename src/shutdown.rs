use std::io;

use log::info;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

/// Runs `stop` once the process receives SIGTERM. The handler is installed
/// before this returns, so a SIGTERM arriving afterwards no longer kills the
/// process outright.
pub fn on_terminate<F>(stop: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        if terminate.recv().await.is_some() {
            info!("Received SIGTERM, stopping");
            stop();
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::process::Command;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn sigterm_runs_the_stop_callback() {
        let (stopped, stopped_rx) = oneshot::channel();
        let listener = on_terminate(move || {
            let _ = stopped.send(());
        })
        .unwrap();

        let status = Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), stopped_rx)
            .await
            .unwrap()
            .unwrap();
        listener.await.unwrap();
    }
}
