//! Network reachability.
//!
//! [`ConnectivityProbe`] answers "are we online right now" through an
//! injected [`ReachabilityCheck`] and fans state changes out to any number of
//! listeners. A failing check counts as offline and is never returned as an
//! error.

use crate::logging::SharedSink;
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;

const TARGET: &str = "nutriplanner_ai::connectivity";

/// Well-known endpoints used by [`HttpReachability::with_defaults`]
pub const DEFAULT_PROBE_URLS: [&str; 3] = [
    "https://www.google.com",
    "https://www.cloudflare.com",
    "https://httpbin.org/status/200",
];

/// One point-in-time reachability check
#[async_trait]
pub trait ReachabilityCheck: Send + Sync {
    async fn check(&self) -> Result<bool>;
}

/// Check that always reports online. Used when no platform check is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait]
impl ReachabilityCheck for AlwaysOnline {
    async fn check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Sends `HEAD` to each URL in turn; the first success status means online.
#[derive(Debug, Clone)]
pub struct HttpReachability {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl HttpReachability {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, urls })
    }

    /// [`DEFAULT_PROBE_URLS`] with a 5 second timeout
    pub fn with_defaults() -> Result<Self> {
        Self::new(
            DEFAULT_PROBE_URLS.iter().map(|url| url.to_string()).collect(),
            Duration::from_secs(5),
        )
    }
}

#[async_trait]
impl ReachabilityCheck for HttpReachability {
    async fn check(&self) -> Result<bool> {
        for url in &self.urls {
            match self.client.head(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(true),
                Ok(_) => continue,
                Err(err) if err.is_timeout() || err.is_connect() => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(false)
    }
}

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
    last_state: Option<bool>,
}

/// Shared reachability probe.
///
/// Clone it freely; clones share listeners and the last published state.
#[derive(Clone)]
pub struct ConnectivityProbe {
    check: Arc<dyn ReachabilityCheck>,
    sink: SharedSink,
    listeners: Arc<Mutex<Listeners>>,
    state_tx: Arc<watch::Sender<Option<bool>>>,
}

impl std::fmt::Debug for ConnectivityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityProbe")
            .field("listeners", &self.listener_count())
            .field("last_state", &self.last_state())
            .finish()
    }
}

impl ConnectivityProbe {
    pub fn new(check: Arc<dyn ReachabilityCheck>, sink: SharedSink) -> Self {
        let (state_tx, _) = watch::channel(None);
        Self {
            check,
            sink,
            listeners: Arc::new(Mutex::new(Listeners::default())),
            state_tx: Arc::new(state_tx),
        }
    }

    /// Probe that never reports offline
    pub fn always_online(sink: SharedSink) -> Self {
        Self::new(Arc::new(AlwaysOnline), sink)
    }

    /// Point-in-time check. Check failures are logged and reported as offline.
    pub async fn is_online(&self) -> bool {
        match self.check.check().await {
            Ok(online) => online,
            Err(err) => {
                self.sink
                    .warn(TARGET, &format!("Reachability check failed, assuming offline: {err}"));
                false
            }
        }
    }

    /// Run the check and publish its result to listeners.
    pub async fn refresh(&self) -> bool {
        let online = self.is_online().await;
        self.publish(online);
        online
    }

    /// Register a listener for state changes.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped or [`Subscription::unsubscribe`] is called.
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut guard = lock(&self.listeners);
        let id = guard.next_id;
        guard.next_id += 1;
        guard.entries.push((id, Arc::new(listener)));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Report a new reachability state.
    ///
    /// Repeats of the last published state are dropped. Every listener
    /// registered at the time of the call has run when this returns.
    pub fn publish(&self, online: bool) {
        let snapshot: Vec<Listener> = {
            let mut guard = lock(&self.listeners);
            if guard.last_state == Some(online) {
                return;
            }
            guard.last_state = Some(online);
            guard.entries.iter().map(|(_, listener)| listener.clone()).collect()
        };

        self.sink.info(
            TARGET,
            if online { "Network reachable" } else { "Network unreachable" },
        );

        for listener in snapshot {
            listener(online);
        }
        self.state_tx.send_replace(Some(online));
    }

    /// Stream of states published after this call.
    pub fn watch(&self) -> impl Stream<Item = bool> + Send + 'static {
        WatchStream::from_changes(self.state_tx.subscribe()).filter_map(|state| state)
    }

    /// Last published state, if any
    pub fn last_state(&self) -> Option<bool> {
        lock(&self.listeners).last_state
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).entries.len()
    }
}

/// Handle returned by [`ConnectivityProbe::on_change`]
#[must_use = "dropping the subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            // The listener is dropped after the lock is released; it may own
            // other subscriptions.
            let removed = {
                let mut guard = lock(&listeners);
                guard
                    .entries
                    .iter()
                    .position(|(id, _)| *id == self.id)
                    .map(|index| guard.entries.remove(index))
            };
            drop(removed);
        }
    }
}

fn lock(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
