//! Background image flushing on a fixed interval.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::database::DbShared;

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

/// Worker that flushes a handle's dirty image to the durable store on an
/// interval, so an idle tab's writes reach persistence without an explicit
/// `sync()` call. Stopping joins the thread.
pub(crate) struct AutoSyncWorker {
    signal: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl AutoSyncWorker {
    pub(crate) fn start(shared: Arc<DbShared>, interval: Duration) -> Self {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let thread = thread::Builder::new()
            .name(format!("datasync-autosync-{}", shared.name()))
            .spawn(move || loop {
                {
                    let mut stopped = thread_signal.stopped.lock();
                    if *stopped {
                        break;
                    }
                    thread_signal.cv.wait_for(&mut stopped, interval);
                    if *stopped {
                        break;
                    }
                }
                if shared.dirty_writes().load(Ordering::Acquire) > 0 {
                    if let Err(e) = shared.locked_flush() {
                        warn!("auto-sync flush for '{}' failed: {}", shared.name(), e);
                    }
                }
            })
            .ok();
        if thread.is_none() {
            warn!("failed to spawn auto-sync worker; falling back to explicit sync");
        }
        Self {
            signal,
            thread,
        }
    }

    fn stop(&mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.cv.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for AutoSyncWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
