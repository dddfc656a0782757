//! The outer polling loop shared by `import` and `apply`.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::apply::Applier;
use crate::import::Importer;

/// One scheduling tick of a command.
#[async_trait]
pub trait Process: Send {
    async fn process(&mut self) -> Result<()>;
}

#[async_trait]
impl Process for Importer {
    async fn process(&mut self) -> Result<()> {
        self.import().await
    }
}

#[async_trait]
impl Process for Applier {
    async fn process(&mut self) -> Result<()> {
        self.apply().await
    }
}

/// Run `process` once, or forever with `polling_interval` between ticks in
/// server mode. A shutdown signal ends the loop successfully at any
/// suspension point.
pub async fn run<P: Process + ?Sized>(
    process: &mut P,
    server: bool,
    polling_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            Ok(()) = shutdown.recv() => {
                info!("Received shutdown signal");
                return Ok(());
            }
            result = process.process() => {
                if let Err(e) = result {
                    error!("{e:#}");
                    return Err(e);
                }
            }
        }

        if !server {
            return Ok(());
        }

        tokio::select! {
            Ok(()) = shutdown.recv() => {
                info!("Received shutdown signal");
                return Ok(());
            }
            _ = tokio::time::sleep(polling_interval) => {}
        }
    }
}

/// Sets up a shutdown signal handler for Ctrl-C and SIGTERM
pub fn setup_shutdown_handler() -> broadcast::Receiver<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => {
                let _ = shutdown_tx.send(());
            }
            Err(e) => warn!("Failed to install signal handler: {e}"),
        }
    });

    shutdown_rx
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Counter {
        n_processed: usize,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl Process for Counter {
        async fn process(&mut self) -> Result<()> {
            self.n_processed += 1;
            if Some(self.n_processed) == self.fail_at {
                return Err(anyhow!("broken"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_single_tick() {
        let (_tx, rx) = broadcast::channel(1);
        let mut counter = Counter {
            n_processed: 0,
            fail_at: None,
        };
        run(&mut counter, false, Duration::from_secs(60), rx)
            .await
            .unwrap();
        assert_eq!(counter.n_processed, 1);
    }

    #[tokio::test]
    async fn test_server_stops_on_error() {
        let (_tx, rx) = broadcast::channel(1);
        let mut counter = Counter {
            n_processed: 0,
            fail_at: Some(3),
        };
        let error = run(&mut counter, true, Duration::from_millis(1), rx)
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "broken");
        assert_eq!(counter.n_processed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_stops_on_shutdown() {
        let (tx, rx) = broadcast::channel(1);
        let mut counter = Counter {
            n_processed: 0,
            fail_at: None,
        };
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            tx.send(()).unwrap();
        });
        run(&mut counter, true, Duration::from_secs(60), rx)
            .await
            .unwrap();
        stopper.await.unwrap();
        assert_eq!(counter.n_processed, 3);
    }

    #[tokio::test]
    async fn test_closed_shutdown_channel_is_not_a_signal() {
        let (tx, rx) = broadcast::channel::<()>(1);
        drop(tx);
        let mut counter = Counter {
            n_processed: 0,
            fail_at: None,
        };
        run(&mut counter, false, Duration::from_secs(60), rx)
            .await
            .unwrap();
        assert_eq!(counter.n_processed, 1);
    }
}
