use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use datasync_types::ContextId;

use crate::registry::ElectionRegistry;

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

/// Background lease renewal for a leading participant.
///
/// Renews through [`ElectionRegistry::heartbeat`] on the configured cadence
/// and exits on its own when the holder is displaced. Stopping joins the
/// thread, so no renewal can land after `stop` returns.
pub(crate) struct HeartbeatHandle {
    signal: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    pub(crate) fn start(
        registry: Arc<ElectionRegistry>,
        db_name: String,
        ctx: ContextId,
        interval: Duration,
    ) -> Self {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let thread = thread::Builder::new()
            .name(format!("datasync-heartbeat-{db_name}"))
            .spawn(move || {
                loop {
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
                    if !registry.heartbeat(&db_name, &ctx) {
                        debug!("{} displaced from '{}', heartbeat exiting", ctx, db_name);
                        break;
                    }
                }
            });
        match thread {
            Ok(thread) => Self {
                signal,
                thread: Some(thread),
            },
            Err(e) => {
                // Without renewal the lease will lapse and another context
                // takes over; degraded but not incorrect.
                warn!("failed to spawn heartbeat thread: {}", e);
                Self {
                    signal,
                    thread: None,
                }
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub(crate) fn stop(&mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.cv.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
