//! Periodic circuit rotation.
//!
//! Tor isolates streams whose SOCKS5 credentials differ (`IsolateSOCKSAuth`,
//! on by default). Each rotation bumps an epoch that new dials present as
//! their SOCKS5 username and password, so the proxy builds fresh circuits for
//! them while sessions already in flight keep their existing circuit.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use mixsend_common::{Signal, config::TorConfig};
use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

/// SOCKS5 username presented while rotation is active.
pub const ISOLATION_USERNAME: &str = "mixsend";

/// Shared record of the current circuit epoch.
#[derive(Debug, Default)]
pub struct RotationMarker {
    epoch: AtomicU64,
    last_rotation: AtomicI64,
    active: AtomicBool,
}

impl RotationMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// When the last rotation happened, if any has.
    pub fn last_rotation(&self) -> Option<DateTime<Utc>> {
        match self.last_rotation.load(Ordering::Acquire) {
            0 => None,
            secs => DateTime::from_timestamp(secs, 0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Moves to the next epoch and returns it.
    pub fn advance(&self) -> u64 {
        self.last_rotation
            .store(Utc::now().timestamp(), Ordering::Release);
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// SOCKS5 username and password for a new dial.
    ///
    /// `None` while rotation is inactive, so dials use the proxy's default
    /// circuit selection.
    pub fn socks_credentials(&self) -> Option<(String, String)> {
        self.is_active().then(|| {
            (
                ISOLATION_USERNAME.to_string(),
                format!("circuit-{}", self.epoch()),
            )
        })
    }
}

struct Running {
    shutdown: broadcast::Sender<Signal>,
    handle: JoinHandle<()>,
}

/// Owns the background task that advances the [`RotationMarker`].
pub struct CircuitRotation {
    interval: Option<Duration>,
    marker: Arc<RotationMarker>,
    running: Mutex<Option<Running>>,
}

impl CircuitRotation {
    pub fn new(tor: &TorConfig, marker: Arc<RotationMarker>) -> Self {
        Self {
            interval: tor.rotation_interval(),
            marker,
            running: Mutex::new(None),
        }
    }

    pub fn marker(&self) -> &Arc<RotationMarker> {
        &self.marker
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawns the rotation task on the current runtime.
    ///
    /// Does nothing when rotation is disabled or already running. The first
    /// rotation happens one full interval after starting.
    pub fn start(&self) {
        let Some(interval) = self.interval else {
            debug!("Circuit rotation disabled");
            return;
        };

        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }

        let (shutdown, mut receiver) = broadcast::channel(1);
        let marker = Arc::clone(&self.marker);
        marker.set_active(true);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let epoch = marker.advance();
                        info!(epoch, "Performing periodic circuit reset");
                    }
                    signal = receiver.recv() => {
                        if !matches!(signal, Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed)) {
                            continue;
                        }
                        debug!("Circuit rotation stopping");
                        break;
                    }
                }
            }
        });

        info!(
            minutes = interval.as_secs() / 60,
            "Circuit reset scheduled"
        );
        *running = Some(Running { shutdown, handle });
    }

    /// Stops the rotation task and waits for it to exit.
    ///
    /// Does nothing when the task is not running. In-flight sessions are not
    /// affected.
    pub async fn stop(&self) {
        let Some(Running { shutdown, handle }) = self.running.lock().take() else {
            return;
        };

        self.marker.set_active(false);
        let _ = shutdown.send(Signal::Shutdown);

        if let Err(e) = handle.await {
            warn!("Circuit rotation task ended abnormally: {e}");
        }
    }
}

impl Drop for CircuitRotation {
    fn drop(&mut self) {
        if let Some(Running { handle, .. }) = self.running.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotating(mins: u64) -> TorConfig {
        TorConfig {
            enabled: true,
            circuit_reset_mins: mins,
            ..TorConfig::default()
        }
    }

    #[test]
    fn test_marker_credentials_follow_epoch() {
        let marker = RotationMarker::new();
        assert_eq!(marker.socks_credentials(), None);
        assert_eq!(marker.last_rotation(), None);

        marker.set_active(true);
        assert_eq!(
            marker.socks_credentials(),
            Some(("mixsend".to_string(), "circuit-0".to_string()))
        );

        assert_eq!(marker.advance(), 1);
        assert_eq!(
            marker.socks_credentials(),
            Some(("mixsend".to_string(), "circuit-1".to_string()))
        );
        assert!(marker.last_rotation().is_some());
    }

    #[tokio::test]
    async fn test_disabled_rotation_is_noop() {
        let marker = Arc::new(RotationMarker::new());

        let rotation = CircuitRotation::new(&TorConfig::default(), Arc::clone(&marker));
        rotation.start();
        assert!(!rotation.is_running());
        rotation.stop().await;

        let rotation = CircuitRotation::new(&rotating(0), Arc::clone(&marker));
        rotation.start();
        assert!(!rotation.is_running());
        assert!(!marker.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_advances_each_interval() {
        let marker = Arc::new(RotationMarker::new());
        let rotation = CircuitRotation::new(&rotating(10), Arc::clone(&marker));

        rotation.start();
        rotation.start();
        assert!(rotation.is_running());
        assert!(marker.is_active());

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(marker.epoch(), 0);

        tokio::time::sleep(Duration::from_secs(6 * 60)).await;
        assert_eq!(marker.epoch(), 1);

        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        assert_eq!(marker.epoch(), 2);

        rotation.stop().await;
        rotation.stop().await;
        assert!(!rotation.is_running());
        assert!(!marker.is_active());

        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        assert_eq!(marker.epoch(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let marker = Arc::new(RotationMarker::new());
        let rotation = CircuitRotation::new(&rotating(1), Arc::clone(&marker));

        rotation.start();
        rotation.stop().await;
        rotation.start();
        assert!(rotation.is_running());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(marker.epoch(), 1);
        rotation.stop().await;
    }
}
