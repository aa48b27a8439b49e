//! Per-symbol tick scheduling.
//!
//! One task per symbol issues ticks at a fixed period. All ticks come from
//! that single task, so they are strictly serialized: a slow or blocked tick
//! delays the next one instead of overlapping it. The first tick fires
//! immediately on spawn. Cancellation is observed between ticks; an
//! in-flight tick always finishes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::bot::Bot;

pub struct TickDriver {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TickDriver {
    pub fn spawn(symbol: String, core: Arc<Mutex<Bot>>, period: Duration) -> Self {
        let (shutdown, mut observed) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = observed.changed() => {
                        if changed.is_err() || *observed.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let mut bot = core.lock().await;
                        if let Err(e) = bot.tick().await {
                            error!(%symbol, error = %e, "tick failed");
                        }
                    }
                }
            }

            debug!(%symbol, "tick loop exited");
        });

        Self { shutdown, handle }
    }

    /// Cancel future ticks immediately. An in-flight tick finishes on its
    /// own.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the loop task to wind down.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
