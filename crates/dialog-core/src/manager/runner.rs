//! Async driver for an [`Engine`]
//!
//! The loop wakes on the fifo's notify handle (an event was queued) or on the
//! timer tick, evaluates timers, drains the fifo and goes back to sleep. It
//! exits when the shutdown flag becomes `true` or its sender is dropped.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use tokio::sync::watch;
//! use sipstate_dialog_core::config::EngineConfig;
//! use sipstate_dialog_core::manager::{run_engine_loop, Engine};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (engine, mut events) = Engine::new(EngineConfig::default())?;
//! let engine = Arc::new(Mutex::new(engine));
//! let (stop, shutdown) = watch::channel(false);
//!
//! let runner = tokio::spawn(run_engine_loop(engine.clone(), shutdown));
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! #   break;
//! }
//! stop.send(true)?;
//! runner.await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::Engine;

/// Drive `engine` until shutdown
pub async fn run_engine_loop(engine: Arc<Mutex<Engine>>, mut shutdown: watch::Receiver<bool>) {
    let (waker, tick) = {
        let engine = engine.lock();
        (engine.waker(), engine.config().timer_tick())
    };
    let mut ticker = time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(?tick, "Engine loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = waker.notified() => {}
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    debug!("Shutdown sender dropped");
                    break;
                }
                continue;
            }
        }

        let now = Instant::now();
        let mut engine = engine.lock();
        let fired = engine.timers_execute(now);
        let processed = engine.execute_at(now);
        if fired > 0 || processed > 0 {
            trace!(fired, processed, "Engine cycle");
        }
    }
    info!("Engine loop stopped");
}
