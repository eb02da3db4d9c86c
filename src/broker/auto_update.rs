//! Background auto-update driver: a single dedicated thread that ticks the
//! broker at a configured cadence, holding the broker's state mutex for the
//! duration of each `on_bar` call so strategy-facing calls serialize
//! cleanly against it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::domain::{Bar, Symbol};

use super::Broker;

/// Supplies the next bar to the auto-update driver. Implemented by the
/// embedding caller (a live feed or a backtest driver), analogous to an
/// exchange client handing bars to the broker.
pub trait BarSource: Send + Sync + 'static {
    fn next_bar(&self, symbol: &Symbol) -> Option<Bar>;
}

/// Handle returned by `Broker::start_auto_update`. Dropping it without
/// calling `stop` leaves the driver thread running detached; `stop` is the
/// supported teardown path and always joins before returning.
pub struct AutoUpdateHandle {
    stop_flag: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl AutoUpdateHandle {
    pub fn stop(mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Fetches the next bar on a helper thread and gives up after `timeout`,
/// turning a stuck or slow data source into a skipped tick instead of a
/// stuck driver thread.
fn fetch_with_timeout(
    source: &Arc<dyn BarSource>,
    symbol: &Symbol,
    timeout: Duration,
) -> Option<Bar> {
    let (tx, rx) = mpsc::channel();
    let source = Arc::clone(source);
    let symbol = symbol.clone();
    thread::spawn(move || {
        let bar = source.next_bar(&symbol);
        let _ = tx.send(bar);
    });
    rx.recv_timeout(timeout).ok().flatten()
}

pub(super) fn spawn(
    broker: Arc<Broker>,
    source: Arc<dyn BarSource>,
    symbol: Symbol,
    interval: Duration,
) -> AutoUpdateHandle {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let thread_stop_flag = Arc::clone(&stop_flag);

    let join_handle = thread::spawn(move || {
        while !thread_stop_flag.load(Ordering::SeqCst) {
            let tick_start = std::time::Instant::now();

            match fetch_with_timeout(&source, &symbol, interval) {
                Some(bar) => broker.on_bar(&symbol, &bar, Utc::now()),
                None => warn!(symbol = %symbol, "auto-update tick skipped: bar source timed out or returned nothing"),
            }

            const POLL_STEP: Duration = Duration::from_millis(20);
            while !thread_stop_flag.load(Ordering::SeqCst) {
                let elapsed = tick_start.elapsed();
                if elapsed >= interval {
                    break;
                }
                thread::sleep(POLL_STEP.min(interval - elapsed));
            }
        }
        debug!("auto-update driver thread exiting");
    });

    AutoUpdateHandle {
        stop_flag,
        join_handle: Some(join_handle),
    }
}
