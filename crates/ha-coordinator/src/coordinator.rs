//! Coordinator: one periodic refresh cycle per device
//!
//! Refresh lifecycle:
//!
//! ```text
//! timer tick / request_refresh()
//!     → in flight? join the pending refresh
//!     → otherwise spawn fetch → store Snapshot → clear in-flight → notify listeners
//! ```
//!
//! The fetch runs on its own task, so it finishes (and notifies) even when
//! every caller awaiting it has been dropped.
//!
//! The timer only runs while at least one listener is registered, and every
//! completed refresh pushes the next tick a full interval out.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{ListenerId, Listeners, SetupError, Snapshot, UpdateError, VendorClient};

/// Refresh interval used when the configuration does not set one
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// Window after an on-demand refresh during which further requests are
/// folded into one trailing refresh
pub const REQUEST_REFRESH_DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

/// Consecutive failures after which the coordinator warns that the device is
/// unreachable
pub const UNAVAILABLE_AFTER_FAILURES: u32 = 3;

/// Static settings for one coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Name used in logs (usually the integration or device name)
    pub name: String,
    pub update_interval: Duration,
    /// Upper bound on a single vendor fetch
    pub request_timeout: Option<Duration>,
    /// Cooldown for [`Coordinator::request_debounced_refresh`]; zero
    /// disables debouncing
    pub request_refresh_cooldown: Duration,
}

impl CoordinatorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            request_timeout: None,
            request_refresh_cooldown: REQUEST_REFRESH_DEFAULT_COOLDOWN,
        }
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_request_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.request_refresh_cooldown = cooldown;
        self
    }

    /// Check the settings a coordinator cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.update_interval.is_zero() {
            return Err("update_interval must be greater than zero".to_string());
        }
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err("request_timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

type SharedSnapshot<T> = Arc<Snapshot<T>>;
type RefreshFuture<T> = Shared<BoxFuture<'static, SharedSnapshot<T>>>;

struct RefreshTimer {
    cancel: CancellationToken,
    /// Signalled on every refresh completion to restart the wait
    reschedule: Arc<Notify>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Cooldown {
    active: bool,
    /// A request arrived during the window
    pending: bool,
}

struct Inner<C: VendorClient> {
    config: CoordinatorConfig,
    client: Arc<C>,
    snapshot: watch::Sender<Option<SharedSnapshot<C::Data>>>,
    in_flight: Mutex<Option<RefreshFuture<C::Data>>>,
    listeners: Listeners,
    timer: Mutex<Option<RefreshTimer>>,
    /// Cancelled at teardown; every timer token is a child of it
    shutdown: CancellationToken,
    torn_down: AtomicBool,
    /// Set when an auth failure stopped the timer
    polling_halted: AtomicBool,
    cooldown: Mutex<Cooldown>,
}

/// Owner of one device's periodically refreshed state
///
/// `Coordinator` is a cheap handle; clones share the same state. Pass a
/// clone to every entity adapter that reads from the device.
pub struct Coordinator<C: VendorClient> {
    inner: Arc<Inner<C>>,
}

impl<C: VendorClient> Clone for Coordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: VendorClient> Coordinator<C> {
    /// Create an idle coordinator: no data, and no timer until a listener
    /// is added
    pub fn new(config: CoordinatorConfig, client: C) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                config,
                client: Arc::new(client),
                snapshot,
                in_flight: Mutex::new(None),
                listeners: Listeners::new(),
                timer: Mutex::new(None),
                shutdown: CancellationToken::new(),
                torn_down: AtomicBool::new(false),
                polling_halted: AtomicBool::new(false),
                cooldown: Mutex::new(Cooldown::default()),
            }),
        }
    }

    /// Create a coordinator, run its first refresh and enable polling
    ///
    /// If the configuration is unusable or the first refresh fails, the
    /// client is closed, no timer is started and the failure is returned so
    /// the host can report a setup failure.
    #[instrument(skip(config, client), fields(coordinator = %config.name))]
    pub async fn setup(config: CoordinatorConfig, client: C) -> Result<Self, SetupError> {
        if let Err(reason) = config.validate() {
            let err = SetupError::InvalidConfig {
                name: config.name.clone(),
                reason,
            };
            warn!(error = %err, "Setup rejected");
            client.close().await;
            return Err(err);
        }
        let coordinator = Self::new(config, client);

        let snapshot = coordinator.request_refresh().await;
        if let Some(err) = snapshot.error() {
            let err = SetupError::from_first_refresh(coordinator.name(), err.clone());
            warn!(error = %err, "Setup failed, first refresh did not succeed");
            coordinator.teardown().await;
            return Err(err);
        }

        coordinator.start_polling();
        info!(interval = ?coordinator.update_interval(), "Coordinator set up");
        Ok(coordinator)
    }

    /// Clear an auth halt and arm the timer if anyone is listening
    pub fn start_polling(&self) {
        self.inner.polling_halted.store(false, Ordering::SeqCst);
        self.inner.update_schedule();
    }

    /// Refresh now, or join the refresh already in flight
    ///
    /// Concurrent callers share one vendor call and receive the same
    /// snapshot. Fetch failures are returned inside the snapshot, never as
    /// an error. After teardown no vendor call is made and the last snapshot
    /// is returned.
    pub async fn request_refresh(&self) -> SharedSnapshot<C::Data> {
        let refresh = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.as_ref() {
                Some(pending) => {
                    trace!(coordinator = %self.name(), "Joining in-flight refresh");
                    pending.clone()
                }
                None => {
                    if self.inner.shutdown.is_cancelled() {
                        debug!(coordinator = %self.name(), "Refresh requested after teardown");
                        return self.inner.current_or_failure(UpdateError::ShutDown);
                    }
                    let pending = self.inner.spawn_refresh();
                    *in_flight = Some(pending.clone());
                    pending
                }
            }
        };
        refresh.await
    }

    /// Refresh on behalf of a user or entity "update now" request
    ///
    /// The first request runs immediately and opens a cooldown window.
    /// Requests made during the window return at once and are folded into
    /// one refresh when the window ends, which then opens a new window.
    pub async fn request_debounced_refresh(&self) {
        if !self.inner.enter_cooldown() {
            trace!(coordinator = %self.name(), "Refresh request queued until cooldown ends");
            return;
        }
        self.request_refresh().await;
    }

    /// Stop polling and release the vendor client
    ///
    /// Cancels the timer and waits for its task to exit, lets a refresh that
    /// is already in flight finish, drops every listener and closes the
    /// client. Calling it again is a no-op.
    #[instrument(skip(self), fields(coordinator = %self.name()))]
    pub async fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.cancel();

        let timer = self.inner.timer.lock().take();
        if let Some(timer) = timer {
            timer.cancel.cancel();
            if let Err(err) = timer.task.await {
                warn!(error = %err, "Refresh timer task ended abnormally");
            }
        }

        let pending = self.inner.in_flight.lock().clone();
        if let Some(pending) = pending {
            debug!("Waiting for in-flight refresh before releasing client");
            pending.await;
        }

        self.inner.listeners.clear();
        self.inner.client.close().await;
        info!("Coordinator torn down");
    }

    /// Register a callback run after every refresh, successful or not
    ///
    /// The first listener arms the periodic timer.
    pub fn add_listener(&self, callback: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let id = self.inner.listeners.add(callback);
        self.inner.update_schedule();
        id
    }

    /// Deregister a callback; once this returns it is never invoked again
    ///
    /// Removing the last listener stops the periodic timer.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.inner.listeners.remove(id);
        if removed {
            self.inner.update_schedule();
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// The most recent snapshot, if any refresh has completed
    pub fn last_snapshot(&self) -> Option<SharedSnapshot<C::Data>> {
        self.inner.snapshot.borrow().clone()
    }

    /// Watch snapshot replacements from async code
    pub fn subscribe(&self) -> watch::Receiver<Option<SharedSnapshot<C::Data>>> {
        self.inner.snapshot.subscribe()
    }

    /// Whether the latest refresh succeeded; false before the first one
    pub fn last_update_success(&self) -> bool {
        self.last_snapshot().is_some_and(|s| s.is_success())
    }

    /// Entities are available exactly when the latest refresh succeeded
    pub fn available(&self) -> bool {
        self.last_update_success()
    }

    /// A copy of the latest payload; `None` before the first refresh or
    /// after a failed one
    pub fn data(&self) -> Option<C::Data>
    where
        C::Data: Clone,
    {
        self.last_snapshot().and_then(|s| s.payload().cloned())
    }

    pub fn last_error(&self) -> Option<UpdateError> {
        self.last_snapshot().and_then(|s| s.error().cloned())
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.last_snapshot().map_or(0, |s| s.consecutive_failures())
    }

    pub fn in_flight(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Whether the periodic timer is armed
    pub fn is_polling(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .is_some_and(|t| !t.cancel.is_cancelled())
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn update_interval(&self) -> Duration {
        self.inner.config.update_interval
    }

    /// The vendor client, for forwarding commands
    pub fn client(&self) -> &Arc<C> {
        &self.inner.client
    }
}

impl<C: VendorClient> Inner<C> {
    fn spawn_refresh(self: &Arc<Self>) -> RefreshFuture<C::Data> {
        let task = tokio::spawn(Arc::clone(self).refresh());
        let inner = Arc::clone(self);

        async move {
            match task.await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    // The task died before it could store a snapshot or
                    // clear the in-flight marker
                    error!(coordinator = %inner.config.name, error = %err, "Refresh task aborted");
                    inner.in_flight.lock().take();
                    inner.current_or_failure(UpdateError::Unexpected(err.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn refresh(self: Arc<Self>) -> SharedSnapshot<C::Data> {
        let name = self.config.name.as_str();
        let started = Instant::now();
        let result = self.fetch().await;
        let elapsed = started.elapsed();

        let previous = self.snapshot.borrow().clone();
        let was_success = previous.as_ref().map_or(true, |s| s.is_success());

        let snapshot = match result {
            Ok(data) => {
                if !was_success {
                    info!(coordinator = %name, "Fetching {} data recovered", name);
                }
                Snapshot::success(data, elapsed)
            }
            Err(err) => {
                let failures = previous.as_ref().map_or(0, |s| s.consecutive_failures()) + 1;
                if was_success {
                    error!(coordinator = %name, error = %err, "Error fetching {} data", name);
                }
                if failures == UNAVAILABLE_AFTER_FAILURES {
                    warn!(
                        coordinator = %name,
                        failures,
                        "Device unreachable for {} consecutive refreshes", failures
                    );
                }
                Snapshot::failure(err, failures, elapsed)
            }
        };
        debug!(
            coordinator = %name,
            success = snapshot.is_success(),
            "Finished fetching {} data in {:.3} seconds",
            name,
            elapsed.as_secs_f64()
        );

        let snapshot = Arc::new(snapshot);
        self.snapshot.send_replace(Some(Arc::clone(&snapshot)));

        // Decided while still in flight, so a later refresh sees the outcome
        match snapshot.error() {
            Some(err) if err.is_auth_failure() => self.halt_polling(),
            None if self.polling_halted.swap(false, Ordering::SeqCst) => {
                info!(coordinator = %name, "Credentials accepted again, resuming polling");
                self.update_schedule();
            }
            _ => {}
        }
        if let Some(timer) = self.timer.lock().as_ref() {
            timer.reschedule.notify_one();
        }
        self.in_flight.lock().take();

        self.listeners.notify();
        snapshot
    }

    async fn fetch(&self) -> Result<C::Data, UpdateError> {
        let fetch = AssertUnwindSafe(self.client.fetch_state()).catch_unwind();

        let outcome = match self.config.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(UpdateError::Timeout),
            },
            None => fetch.await,
        };

        match outcome {
            Ok(result) => result,
            Err(panic) => Err(UpdateError::Unexpected(panic_message(panic.as_ref()))),
        }
    }

    /// Arm or disarm the timer: it runs while listeners exist, polling is
    /// not halted and the coordinator is live
    fn update_schedule(self: &Arc<Self>) {
        let mut timer = self.timer.lock();
        let armed = timer.as_ref().is_some_and(|t| !t.cancel.is_cancelled());
        // Checked under the timer lock; teardown cancels before taking it
        let wanted = !self.shutdown.is_cancelled()
            && !self.polling_halted.load(Ordering::SeqCst)
            && !self.listeners.is_empty();

        match (armed, wanted) {
            (false, true) => {
                let interval = self.config.update_interval;
                if interval.is_zero() {
                    error!(coordinator = %self.config.name, "Update interval is zero, not polling");
                    return;
                }
                let cancel = self.shutdown.child_token();
                let reschedule = Arc::new(Notify::new());
                let task = tokio::spawn(refresh_interval_task(
                    Arc::downgrade(self),
                    interval,
                    cancel.clone(),
                    Arc::clone(&reschedule),
                ));
                *timer = Some(RefreshTimer {
                    cancel,
                    reschedule,
                    task,
                });
                debug!(coordinator = %self.config.name, interval = ?interval, "Refresh timer armed");
            }
            (true, false) => {
                if let Some(timer) = timer.as_ref() {
                    timer.cancel.cancel();
                }
                debug!(coordinator = %self.config.name, "Refresh timer disarmed");
            }
            _ => {}
        }
    }

    /// Open a cooldown window; false when one is already open and the
    /// request was queued instead
    fn enter_cooldown(self: &Arc<Self>) -> bool {
        let period = self.config.request_refresh_cooldown;
        if period.is_zero() || self.shutdown.is_cancelled() {
            return true;
        }

        let mut cooldown = self.cooldown.lock();
        if cooldown.active {
            cooldown.pending = true;
            return false;
        }
        cooldown.active = true;
        cooldown.pending = false;
        tokio::spawn(cooldown_task(
            Arc::downgrade(self),
            period,
            self.shutdown.clone(),
        ));
        true
    }

    /// Stop the timer without waiting for its task; the task may be the one
    /// awaiting the refresh that called this
    fn halt_polling(&self) {
        let timer = self.timer.lock();
        self.polling_halted.store(true, Ordering::SeqCst);
        if let Some(timer) = timer.as_ref() {
            timer.cancel.cancel();
        }
        warn!(
            coordinator = %self.config.name,
            "Authentication rejected, polling stopped until a refresh succeeds"
        );
    }

    fn current_or_failure(&self, error: UpdateError) -> SharedSnapshot<C::Data> {
        self.snapshot
            .borrow()
            .clone()
            .unwrap_or_else(|| Arc::new(Snapshot::failure(error, 0, Duration::ZERO)))
    }
}

impl<C: VendorClient> Drop for Inner<C> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn refresh_interval_task<C: VendorClient>(
    inner: Weak<Inner<C>>,
    period: Duration,
    cancel: CancellationToken,
    reschedule: Arc<Notify>,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = reschedule.notified() => trace!("Refresh completed, restarting interval"),
            () = tokio::time::sleep(period) => {
                let Some(inner) = inner.upgrade() else { break };
                Coordinator { inner }.request_refresh().await;
            }
        }
    }
    trace!("Refresh timer stopped");
}

async fn cooldown_task<C: VendorClient>(
    inner: Weak<Inner<C>>,
    period: Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(period) => {}
        }
        let Some(inner) = inner.upgrade() else { return };
        let run = {
            let mut cooldown = inner.cooldown.lock();
            if cooldown.pending {
                cooldown.pending = false;
            } else {
                cooldown.active = false;
            }
            cooldown.active
        };
        if !run {
            return;
        }
        debug!(coordinator = %inner.config.name, "Running refresh queued during cooldown");
        Coordinator { inner }.request_refresh().await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "fetch panicked".to_string()
    }
}
