//! Signal router lifecycle component.
//!
//! The router owns a handler table and an ignore set, both behind one
//! reader-writer lock. Its start hook takes the source's event stream and
//! launches a single dispatch loop that runs until the shared Context is shut
//! down. Handlers run synchronously inside the loop under the read lock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use conductor_core::{Context, Dependency, Lifecycle, Provide, Resolver, ServiceInfo};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::source::{OsSignalSource, SignalSource};
use super::{Signal, SignalError};

/// Callback invoked on the dispatch loop for each delivered signal.
///
/// Handlers run under the router's read lock, which is not re-entrant once a
/// writer is queued. A handler must not call any method of its own router:
/// [`SignalRouter::handle`], [`SignalRouter::reset`], [`SignalRouter::ignore`],
/// [`SignalRouter::is_handled`] and [`SignalRouter::is_ignored`] can all
/// deadlock.
pub type SignalHandler = Arc<dyn Fn(Signal) + Send + Sync>;

#[derive(Default)]
struct RouterState {
    handlers: HashMap<Signal, SignalHandler>,
    ignored: HashSet<Signal>,
}

/// Routes process signals to registered handlers.
///
/// For every signal, at most one of "handled" or "ignored" holds.
pub struct SignalRouter {
    info: ServiceInfo,
    ctx: Arc<Context>,
    source: Arc<dyn SignalSource>,
    state: Arc<RwLock<RouterState>>,
    running: Arc<AtomicBool>,
}

impl SignalRouter {
    /// Creates a router reading from `source`. The router is not enrolled in
    /// `ctx`; [`Provide::provide`] enrolls it during composition.
    #[must_use]
    pub fn new(ctx: Arc<Context>, source: Arc<dyn SignalSource>) -> Self {
        Self {
            info: ServiceInfo::new("signal-router"),
            ctx,
            source,
            state: Arc::new(RwLock::new(RouterState::default())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers `handler` for `signal`, replacing any previous handler and
    /// clearing ignore status.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Subscribe`] if the source cannot route the
    /// signal; the router is left unchanged.
    pub fn handle<F>(&self, signal: Signal, handler: F) -> Result<(), SignalError>
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        let mut state = self.state.write();
        self.source.subscribe(signal)?;
        state.ignored.remove(&signal);
        state.handlers.insert(signal, Arc::new(handler));
        debug!(%signal, "signal handler registered");
        Ok(())
    }

    /// Removes any handler or ignore status and restores the default action.
    pub fn reset(&self, signal: Signal) {
        let mut state = self.state.write();
        self.source.reset(signal);
        state.handlers.remove(&signal);
        state.ignored.remove(&signal);
        debug!(%signal, "signal reset to default");
    }

    /// Discards `signal`, removing any registered handler.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Subscribe`] if the source cannot install the
    /// discarding handler; the router is left unchanged.
    pub fn ignore(&self, signal: Signal) -> Result<(), SignalError> {
        let mut state = self.state.write();
        self.source.ignore(signal)?;
        state.handlers.remove(&signal);
        state.ignored.insert(signal);
        debug!(%signal, "signal ignored");
        Ok(())
    }

    #[must_use]
    pub fn is_handled(&self, signal: Signal) -> bool {
        self.state.read().handlers.contains_key(&signal)
    }

    #[must_use]
    pub fn is_ignored(&self, signal: Signal) -> bool {
        self.state.read().ignored.contains(&signal)
    }

    #[must_use]
    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }
}

#[async_trait]
impl Lifecycle for SignalRouter {
    fn name(&self) -> &str {
        self.info.name()
    }

    async fn start(&self) -> anyhow::Result<()> {
        let events = self.source.take_events().ok_or(SignalError::AlreadyRunning)?;
        self.running.store(true, Ordering::SeqCst);
        tokio::spawn(dispatch_loop(
            events,
            self.ctx.token(),
            Arc::clone(&self.state),
            Arc::clone(&self.running),
        ));
        info!(id = %self.info.id(), "signal dispatch loop started");
        Ok(())
    }

    /// Shuts the Context down without waiting for the loop to exit.
    async fn stop(&self) -> anyhow::Result<()> {
        self.ctx.shutdown();
        Ok(())
    }

    fn health(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Provide for SignalRouter {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<Context>()]
    }

    fn provide(resolver: &Resolver) -> anyhow::Result<Arc<Self>> {
        let ctx = resolver.resolve::<Context>()?;
        let router = Arc::new(Self::new(Arc::clone(&ctx), Arc::new(OsSignalSource::new())));
        ctx.add_lifecycle(Arc::clone(&router) as Arc<dyn Lifecycle>)?;
        Ok(router)
    }
}

async fn dispatch_loop(
    mut events: mpsc::Receiver<Signal>,
    mut token: conductor_core::ShutdownToken,
    state: Arc<RwLock<RouterState>>,
    running: Arc<AtomicBool>,
) {
    let _running = RunningGuard(running);
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            event = events.recv() => match event {
                Some(signal) => dispatch(&state, signal),
                None => break,
            },
        }
    }
    debug!("signal dispatch loop exited");
}

/// Clears the router's running flag when the dispatch loop ends, including
/// by a panicking handler.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
        if std::thread::panicking() {
            warn!("signal dispatch loop terminated by a panicking handler");
        }
    }
}

fn dispatch(state: &RwLock<RouterState>, signal: Signal) {
    let state = state.read();
    match state.handlers.get(&signal) {
        Some(handler) => {
            debug!(%signal, "dispatching signal");
            handler(signal);
        }
        None => debug!(%signal, "no handler for signal"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use conductor_core::Group;
    use parking_lot::Mutex;

    use super::*;
    use crate::signal::{Disposition, ManualSignalSource};

    fn manual_router() -> (Group, Arc<ManualSignalSource>, Arc<SignalRouter>) {
        let group = Group::root("signals");
        let source = Arc::new(ManualSignalSource::new());
        let router = Arc::new(SignalRouter::new(
            Arc::clone(group.context()),
            Arc::clone(&source) as Arc<dyn SignalSource>,
        ));
        group
            .context()
            .add_lifecycle(Arc::clone(&router) as Arc<dyn Lifecycle>)
            .unwrap();
        (group, source, router)
    }

    async fn wait_until(predicate: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !predicate() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition should become true");
    }

    #[test]
    fn handle_and_ignore_are_mutually_exclusive() {
        let (_group, source, router) = manual_router();

        router.ignore(Signal::Hangup).unwrap();
        assert!(router.is_ignored(Signal::Hangup));
        assert!(!router.is_handled(Signal::Hangup));
        assert_eq!(source.disposition(Signal::Hangup), Disposition::Discard);

        router.handle(Signal::Hangup, |_| {}).unwrap();
        assert!(router.is_handled(Signal::Hangup));
        assert!(!router.is_ignored(Signal::Hangup));
        assert_eq!(source.disposition(Signal::Hangup), Disposition::Deliver);

        router.ignore(Signal::Hangup).unwrap();
        assert!(!router.is_handled(Signal::Hangup));
    }

    #[test]
    fn reset_clears_handler_and_ignore_status() {
        let (_group, source, router) = manual_router();
        router.handle(Signal::User1, |_| {}).unwrap();
        router.ignore(Signal::User2).unwrap();

        router.reset(Signal::User1);
        router.reset(Signal::User2);

        assert!(!router.is_handled(Signal::User1));
        assert!(!router.is_ignored(Signal::User2));
        assert_eq!(source.disposition(Signal::User1), Disposition::Default);
        assert_eq!(source.disposition(Signal::User2), Disposition::Default);
    }

    #[test]
    fn os_router_outside_runtime_reports_error() {
        let group = Group::root("signals");
        let router = SignalRouter::new(
            Arc::clone(group.context()),
            Arc::new(OsSignalSource::new()),
        );

        let err = router.handle(Signal::User2, |_| {}).unwrap_err();
        assert!(matches!(err, SignalError::NoRuntime { signal: Signal::User2 }));
        assert!(matches!(
            router.ignore(Signal::User2),
            Err(SignalError::NoRuntime { .. })
        ));
        assert!(!router.is_handled(Signal::User2));
        assert!(!router.is_ignored(Signal::User2));
    }

    #[test]
    fn unrouted_signal_keeps_default_disposition() {
        let (_group, source, router) = manual_router();
        assert!(!router.is_handled(Signal::Terminate));
        assert!(!router.is_ignored(Signal::Terminate));
        assert_eq!(source.disposition(Signal::Terminate), Disposition::Default);
    }

    #[tokio::test]
    async fn handler_invoked_once_per_delivery() {
        let (group, source, router) = manual_router();
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);
        router
            .handle(Signal::User1, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        group.start().await.unwrap();
        assert!(router.health());

        source.deliver(Signal::User1).await;
        source.deliver(Signal::User1).await;
        wait_until(|| count.load(Ordering::SeqCst) == 2).await;

        group.stop().await.unwrap();
        wait_until(|| !router.health()).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handler_receives_delivered_signal() {
        let (group, source, router) = manual_router();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);
        router
            .handle(Signal::Hangup, move |signal| log.lock().push(signal))
            .unwrap();
        router
            .handle(Signal::Terminate, {
                let log = Arc::clone(&received);
                move |signal| log.lock().push(signal)
            })
            .unwrap();

        group.start().await.unwrap();
        source.deliver(Signal::Hangup).await;
        source.deliver(Signal::Terminate).await;
        wait_until(|| received.lock().len() == 2).await;

        assert_eq!(*received.lock(), vec![Signal::Hangup, Signal::Terminate]);
        group.stop().await.unwrap();
    }

    #[tokio::test]
    async fn reset_signal_is_no_longer_dispatched() {
        let (group, source, router) = manual_router();
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);
        router
            .handle(Signal::User2, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        group.start().await.unwrap();

        router.reset(Signal::User2);
        source.deliver(Signal::User2).await;

        assert_eq!(source.defaulted(), vec![Signal::User2]);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        group.stop().await.unwrap();
    }

    #[tokio::test]
    async fn loop_stops_dispatching_after_shutdown() {
        let (group, source, router) = manual_router();
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);
        router
            .handle(Signal::User1, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        group.start().await.unwrap();

        group.context().shutdown();
        wait_until(|| !router.health()).await;

        // The loop dropped the event stream on exit.
        source.deliver(Signal::User1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicking_handler_clears_health() {
        let (group, source, router) = manual_router();
        router
            .handle(Signal::User1, |_| panic!("handler failed"))
            .unwrap();
        group.start().await.unwrap();
        assert!(group.is_healthy());

        source.deliver(Signal::User1).await;
        wait_until(|| !router.health()).await;
        assert!(!group.is_healthy());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let (group, _source, router) = manual_router();
        group.start().await.unwrap();

        let err = router.start().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SignalError>(),
            Some(SignalError::AlreadyRunning)
        ));
        group.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_returns_before_loop_exits() {
        let (group, _source, router) = manual_router();
        group.start().await.unwrap();

        router.stop().await.unwrap();
        assert!(group.context().is_shutdown());
        wait_until(|| !router.health()).await;
    }

    #[tokio::test]
    async fn provided_router_enrolls_in_context() {
        let group = Group::root("root");
        group.add_service::<SignalRouter>().unwrap();
        group.compose().unwrap();

        let router = group.resolve::<SignalRouter>().unwrap();
        assert_eq!(group.context().len(), 1);
        assert_eq!(group.context().states()[0].0, router.name());
    }
}
