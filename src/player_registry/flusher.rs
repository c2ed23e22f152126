use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use crate::player_registry::PlayerRegistry;

/// Cheap handle used by command handlers to request a flush.
#[derive(Clone)]
pub struct FlushHandle {
    notify: Arc<Notify>,
}

impl FlushHandle {
    pub fn request(&self) {
        self.notify.notify_one();
    }
}

/// Background task that writes the registry to disk once writes have been
/// quiet for `debounce`, and one final time on shutdown.
pub struct Flusher {
    handle: FlushHandle,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub fn spawn_flusher<R>(registry: Arc<Mutex<R>>, debounce: Duration) -> Flusher
where
    R: PlayerRegistry + Send + 'static,
{
    let notify = Arc::new(Notify::new());
    let (shutdown, mut shutdown_rx) = oneshot::channel();

    let task = tokio::spawn({
        let notify = notify.clone();
        async move {
            loop {
                tokio::select! {
                    _ = notify.notified() => {}
                    _ = &mut shutdown_rx => break,
                }

                // Keep extending the window while writes keep coming.
                loop {
                    tokio::select! {
                        _ = notify.notified() => continue,
                        _ = tokio::time::sleep(debounce) => break,
                        _ = &mut shutdown_rx => {
                            flush_now(&registry).await;
                            return;
                        }
                    }
                }
                flush_now(&registry).await;
            }
            flush_now(&registry).await;
        }
    });

    Flusher {
        handle: FlushHandle { notify },
        shutdown,
        task,
    }
}

/// Disk I/O runs on the blocking pool so runtime workers stay free.
async fn flush_now<R>(registry: &Arc<Mutex<R>>)
where
    R: PlayerRegistry + Send + 'static,
{
    let registry = registry.clone();
    let flushed = tokio::task::spawn_blocking(move || {
        registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    })
    .await;

    match flushed {
        Ok(Ok(())) => debug!("Player registry flushed"),
        Ok(Err(e)) => error!("Failed to save player registry: {e}"),
        Err(e) => error!("Player registry flush panicked: {e}"),
    }
}

impl Flusher {
    pub fn handle(&self) -> FlushHandle {
        self.handle.clone()
    }

    /// Stops the task after a final flush.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("Registry flusher stopped abnormally: {e}");
        }
    }
}
