use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Shutdown state machine
///
/// States:
/// 1. Running - normal operation
/// 2. Draining - listeners closed, in-flight requests finishing
/// 3. Terminated - everything stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Draining,
    Terminated,
}

/// Coordinates graceful shutdown across server tasks.
#[derive(Debug)]
pub struct Shutdown {
    state: watch::Sender<State>,
    drain_timeout: Duration,
}

impl Shutdown {
    pub fn new(drain_timeout: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(State::Running);
        Arc::new(Self { state, drain_timeout })
    }

    /// Get current state
    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == State::Running
    }

    /// Start draining (called on SIGTERM/SIGINT)
    pub fn start_drain(&self) {
        let started = self.state.send_if_modified(|state| {
            if *state == State::Running {
                *state = State::Draining;
                true
            } else {
                false
            }
        });

        if started {
            info!(
                drain_timeout_secs = self.drain_timeout.as_secs(),
                "starting graceful shutdown drain"
            );
        }
    }

    /// Complete shutdown
    pub fn terminate(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == State::Terminated {
                false
            } else {
                *state = State::Terminated;
                true
            }
        });

        if changed {
            info!("shutdown complete");
        }
    }

    /// Resolves once draining starts. Owns its receiver, so it can be handed
    /// to a spawned server.
    pub fn signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            // A dropped sender also means shutdown.
            let _ = rx.wait_for(|state| *state != State::Running).await;
        }
    }
}
