//! Nonce authority — single-use challenge tokens with coarse periodic expiry.
//!
//! Every outstanding token lives in one in-memory registry guarded by a mutex.
//! `issue`, `consume` and the background sweep all take the same lock, so a
//! token can be consumed at most once even when requests race on it.
//!
//! Expiry is deliberately coarse: each sweep tick clears the whole registry and
//! starts a new epoch. A token issued just before a tick therefore lives for
//! almost no time at all.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Random bytes per token (128 bits of entropy, 32 hex chars).
const NONCE_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum NonceError {
    #[error("Randomness source failed: {0}")]
    Randomness(#[from] getrandom::Error),
}

#[derive(Debug, Default)]
struct Registry {
    outstanding: HashSet<String>,
    /// Number of sweeps applied so far.
    epoch: u64,
}

impl Registry {
    fn sweep(&mut self) -> usize {
        let cleared = self.outstanding.len();
        self.outstanding.clear();
        self.epoch += 1;
        cleared
    }
}

struct SweepTask {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Issues and tracks outstanding challenge tokens.
///
/// Construct one per process and share it behind an `Arc`. The expiry sweep is
/// not running until [`NonceAuthority::start`] is called.
pub struct NonceAuthority {
    registry: Arc<Mutex<Registry>>,
    sweep_interval: Option<Duration>,
    sweep: Mutex<Option<SweepTask>>,
}

impl NonceAuthority {
    /// Create an authority that clears the registry every `sweep_interval`
    /// once started. `None` disables the sweep entirely.
    pub fn new(sweep_interval: Option<Duration>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            sweep_interval,
            sweep: Mutex::new(None),
        }
    }

    /// Generate a fresh token and record it as outstanding.
    pub fn issue(&self) -> Result<String, NonceError> {
        loop {
            let mut bytes = [0u8; NONCE_BYTES];
            getrandom::getrandom(&mut bytes)?;
            let nonce = hex::encode(bytes);

            if self.registry().outstanding.insert(nonce.clone()) {
                tracing::debug!(nonce_prefix = &nonce[..8], "Issued nonce");
                return Ok(nonce);
            }
        }
    }

    /// Atomically remove `nonce` from the registry.
    ///
    /// Returns `true` only for the single caller that removed an outstanding
    /// token. Unknown, already consumed and swept tokens all yield `false`.
    pub fn consume(&self, nonce: &str) -> bool {
        self.registry().outstanding.remove(nonce)
    }

    /// Whether `nonce` is outstanding, without consuming it.
    pub fn contains(&self, nonce: &str) -> bool {
        self.registry().outstanding.contains(nonce)
    }

    /// Number of outstanding tokens.
    pub fn size(&self) -> usize {
        self.registry().outstanding.len()
    }

    /// Number of sweeps applied since construction.
    pub fn epoch(&self) -> u64 {
        self.registry().epoch
    }

    /// Invalidate every outstanding token immediately. Returns how many were
    /// dropped.
    pub fn clear(&self) -> usize {
        self.registry().sweep()
    }

    /// Start the background sweep. Must be called from within a Tokio runtime.
    ///
    /// Calling `start` on an authority whose sweep is disabled or already
    /// running does nothing.
    pub fn start(&self) {
        let Some(interval) = self.sweep_interval else {
            tracing::info!("Nonce sweep disabled");
            return;
        };

        let mut sweep = self.sweep.lock().unwrap_or_else(PoisonError::into_inner);
        if sweep.is_some() {
            tracing::warn!("Nonce sweep already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_sweep(
            Arc::clone(&self.registry),
            interval,
            shutdown.clone(),
        ));
        *sweep = Some(SweepTask { shutdown, handle });
    }

    /// Stop the background sweep, wait for it to exit, and drop every
    /// outstanding token.
    pub async fn shutdown(&self) {
        let task = self
            .sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(task) = task {
            task.shutdown.cancel();
            if let Err(e) = task.handle.await {
                tracing::error!(error = %e, "Nonce sweep task failed");
            }
        }

        let dropped = self.clear();
        tracing::info!(dropped, "Nonce authority shut down");
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NonceAuthority {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Drop for NonceAuthority {
    fn drop(&mut self) {
        let sweep = self.sweep.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = sweep.take() {
            task.shutdown.cancel();
        }
    }
}

/// Clear the registry every `interval` until `shutdown` fires. The first sweep
/// happens one full interval after start.
async fn run_sweep(registry: Arc<Mutex<Registry>>, interval: Duration, shutdown: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Nonce sweep starting");

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (cleared, epoch) = {
                    let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
                    let cleared = registry.sweep();
                    (cleared, registry.epoch)
                };
                tracing::debug!(cleared, epoch, "Swept outstanding nonces");
            }
            _ = shutdown.cancelled() => {
                tracing::info!("Nonce sweep shutting down");
                return;
            }
        }
    }
}
