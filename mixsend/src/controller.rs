use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use anyhow::Context;
use mixsend_common::{Config, Signal, internal};
use mixsend_delivery::{
    CircuitRotation, FlushReport, Mailer, RotationMarker, TransportStatus, flush,
};
use tokio::{
    sync::broadcast,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error};

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Waits for Ctrl+C or SIGTERM, then broadcasts [`Signal::Shutdown`].
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed or nobody is
/// listening for the shutdown.
pub async fn shutdown_on_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

/// Owns the mailer and the circuit rotation task for one process.
pub struct Mixsend {
    config: Arc<Config>,
    mailer: Mailer,
    rotation: CircuitRotation,
}

impl Mixsend {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let marker = Arc::new(RotationMarker::new());

        Self {
            mailer: Mailer::new(Arc::clone(&config), Arc::clone(&marker)),
            rotation: CircuitRotation::new(&config.tor, marker),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub const fn rotation(&self) -> &CircuitRotation {
        &self.rotation
    }

    /// Validates the anonymizing transport.
    ///
    /// # Errors
    ///
    /// Fails when the transport is required and its proxy is unreachable.
    pub async fn check(&self) -> anyhow::Result<TransportStatus> {
        Ok(self.mailer.validate_transport().await?)
    }

    /// Validates the transport, then flushes the pool once.
    ///
    /// # Errors
    ///
    /// Fails when validation fails or the pool directory cannot be read.
    pub async fn send(&self) -> anyhow::Result<FlushReport> {
        self.check().await?;
        self.flush().await
    }

    async fn flush(&self) -> anyhow::Result<FlushReport> {
        let directory = &self.config.pool.directory;
        flush(&self.mailer, directory)
            .await
            .with_context(|| format!("Failed to read pool directory {}", directory.display()))
    }

    /// Flushes the pool every `every` until `shutdown` delivers
    /// [`Signal::Shutdown`].
    ///
    /// Circuit rotation runs for as long as this does, whenever the
    /// anonymizing transport is in use.
    ///
    /// # Errors
    ///
    /// Fails only when startup validation fails. Errors during a flush are
    /// logged and the next flush goes ahead.
    pub async fn serve(
        &self,
        every: Duration,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> anyhow::Result<()> {
        let status = self.check().await?;
        if status != TransportStatus::Disabled {
            self.rotation.start();
        }

        internal!(
            level = INFO,
            "Controller running, flushing {} every {:?}",
            self.config.pool.directory.display(),
            every
        );

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        error!("Pool flush failed: {e:#}");
                    }
                }
                signal = shutdown.recv() => {
                    match signal {
                        Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
                        Err(e) => debug!("Received: {e:?}"),
                    }
                }
            }
        }

        internal!(level = INFO, "Shutting down...");
        self.rotation.stop().await;

        Ok(())
    }
}
