//! Signal delivery backends.
//!
//! A [`SignalSource`] owns the process-level disposition of each signal and
//! a single bounded event stream that the router's dispatch loop consumes.
//! The stream has capacity 1: a busy loop back-pressures the forwarders
//! instead of queueing signals.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{Signal, SignalError};

/// What happens to a signal when it reaches the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Forward to the event stream.
    Deliver,
    /// Drop silently.
    Discard,
    /// Run the platform default action.
    Default,
}

/// Backend that installs signal dispositions and produces signal events.
pub trait SignalSource: Send + Sync + 'static {
    /// Routes `signal` to the event stream.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Subscribe`] if the platform handler cannot be
    /// installed, or [`SignalError::NoRuntime`] if the backend needs a Tokio
    /// runtime and none is current.
    fn subscribe(&self, signal: Signal) -> Result<(), SignalError>;

    /// Discards `signal` at the process level.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    fn ignore(&self, signal: Signal) -> Result<(), SignalError>;

    /// Restores the platform default action for `signal`.
    fn reset(&self, signal: Signal);

    /// Current disposition of `signal`.
    fn disposition(&self, signal: Signal) -> Disposition;

    /// Takes the event stream. Returns `None` once it has been taken.
    fn take_events(&self) -> Option<mpsc::Receiver<Signal>>;
}

// ---------------------------------------------------------------------------
// Shared disposition table
// ---------------------------------------------------------------------------

/// Disposition table and event channel shared by both backends.
struct Dispatch {
    dispositions: Mutex<HashMap<Signal, Disposition>>,
    tx: mpsc::Sender<Signal>,
    rx: Mutex<Option<mpsc::Receiver<Signal>>>,
}

impl Dispatch {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            dispositions: Mutex::new(HashMap::new()),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    fn set(&self, signal: Signal, disposition: Disposition) {
        self.dispositions.lock().insert(signal, disposition);
    }

    fn get(&self, signal: Signal) -> Disposition {
        self.dispositions
            .lock()
            .get(&signal)
            .copied()
            .unwrap_or(Disposition::Default)
    }

    fn take(&self) -> Option<mpsc::Receiver<Signal>> {
        self.rx.lock().take()
    }

    /// Forwards one delivered signal. Returns `false` if the signal
    /// requires the platform default action.
    async fn forward(&self, signal: Signal) -> bool {
        match self.get(signal) {
            Disposition::Deliver => {
                if self.tx.send(signal).await.is_err() {
                    debug!(%signal, "signal dropped, dispatch loop has exited");
                }
                true
            }
            Disposition::Discard => {
                trace!(%signal, "signal discarded");
                true
            }
            Disposition::Default => false,
        }
    }
}

// ---------------------------------------------------------------------------
// OsSignalSource
// ---------------------------------------------------------------------------

/// Signal source backed by the operating system.
///
/// The first `subscribe` or `ignore` of a signal spawns a forwarding task on
/// the current Tokio runtime, and fails with [`SignalError::NoRuntime`] when
/// called outside one. Tokio never uninstalls its handler, so the
/// default action after [`reset`](SignalSource::reset) is emulated with
/// [`signal_hook::low_level::emulate_default_handler`]. A signal that was
/// never subscribed or ignored keeps its untouched OS disposition.
pub struct OsSignalSource {
    dispatch: Arc<Dispatch>,
    installed: Mutex<HashSet<Signal>>,
}

impl OsSignalSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dispatch: Arc::new(Dispatch::new()),
            installed: Mutex::new(HashSet::new()),
        }
    }

    /// Installs the forwarding task for `signal` if not already running.
    fn ensure_installed(&self, signal: Signal) -> Result<(), SignalError> {
        use tokio::signal::unix::{signal as os_signal, SignalKind};

        let mut installed = self.installed.lock();
        if installed.contains(&signal) {
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|_| SignalError::NoRuntime { signal })?;
        let raw = signal.as_raw();
        let mut stream = {
            let _entered = runtime.enter();
            os_signal(SignalKind::from_raw(raw))
                .map_err(|source| SignalError::Subscribe { signal, source })?
        };
        let dispatch = Arc::clone(&self.dispatch);
        runtime.spawn(async move {
            while stream.recv().await.is_some() {
                if dispatch.forward(signal).await {
                    continue;
                }
                debug!(%signal, "running default action");
                if let Err(e) = signal_hook::low_level::emulate_default_handler(raw) {
                    warn!(%signal, error = %e, "failed to run default action");
                }
            }
        });

        installed.insert(signal);
        debug!(%signal, "OS signal handler installed");
        Ok(())
    }
}

impl Default for OsSignalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for OsSignalSource {
    fn subscribe(&self, signal: Signal) -> Result<(), SignalError> {
        self.ensure_installed(signal)?;
        self.dispatch.set(signal, Disposition::Deliver);
        Ok(())
    }

    fn ignore(&self, signal: Signal) -> Result<(), SignalError> {
        self.ensure_installed(signal)?;
        self.dispatch.set(signal, Disposition::Discard);
        Ok(())
    }

    fn reset(&self, signal: Signal) {
        self.dispatch.set(signal, Disposition::Default);
    }

    fn disposition(&self, signal: Signal) -> Disposition {
        self.dispatch.get(signal)
    }

    fn take_events(&self) -> Option<mpsc::Receiver<Signal>> {
        self.dispatch.take()
    }
}

// ---------------------------------------------------------------------------
// ManualSignalSource
// ---------------------------------------------------------------------------

/// In-process signal source.
///
/// [`deliver`](Self::deliver) applies the same disposition rules as the OS
/// path. Signals whose disposition is `Default` are recorded instead of
/// running the platform action.
pub struct ManualSignalSource {
    dispatch: Dispatch,
    defaulted: Mutex<Vec<Signal>>,
}

impl ManualSignalSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dispatch: Dispatch::new(),
            defaulted: Mutex::new(Vec::new()),
        }
    }

    /// Delivers `signal` as if the process had received it.
    pub async fn deliver(&self, signal: Signal) {
        if !self.dispatch.forward(signal).await {
            self.defaulted.lock().push(signal);
        }
    }

    /// Signals delivered while their disposition was `Default`.
    #[must_use]
    pub fn defaulted(&self) -> Vec<Signal> {
        self.defaulted.lock().clone()
    }
}

impl Default for ManualSignalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for ManualSignalSource {
    fn subscribe(&self, signal: Signal) -> Result<(), SignalError> {
        self.dispatch.set(signal, Disposition::Deliver);
        Ok(())
    }

    fn ignore(&self, signal: Signal) -> Result<(), SignalError> {
        self.dispatch.set(signal, Disposition::Discard);
        Ok(())
    }

    fn reset(&self, signal: Signal) {
        self.dispatch.set(signal, Disposition::Default);
    }

    fn disposition(&self, signal: Signal) -> Disposition {
        self.dispatch.get(signal)
    }

    fn take_events(&self) -> Option<mpsc::Receiver<Signal>> {
        self.dispatch.take()
    }
}
