//! Polling watcher turning catalog snapshots into endpoint updates.
//!
//! A [`Watcher`] polls its [`Query`] for one service name and compares every
//! result with the previous one:
//!
//! 1. Executes the query
//! 2. Emits an [`Operation::Add`] for every address not seen before, then an
//!    [`Operation::Delete`] for every address that went away
//! 3. Publishes the new result as its cache, which the
//!    [`Resolver`](crate::Resolver) reads for reverse lookups
//! 4. Waits one poll interval and starts over while nothing changed
//!
//! Polling only makes progress while a caller is awaiting [`Watcher::next`];
//! the watcher never spawns tasks of its own.
//!
//! Only the set of addresses is compared. An endpoint whose identity changes
//! while its address stays registered is not reported, and the cache keeps
//! the identity from the poll that last changed the address set.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::Stream;
use tokio::sync::{Mutex, Notify};

use crate::entry::Entry;
use crate::error::Result;
use crate::query::Query;

/// Kind of endpoint change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// The endpoint appeared.
    Add,
    /// The endpoint went away.
    Delete,
}

/// A single endpoint change.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Update {
    /// What happened to the endpoint.
    pub op: Operation,

    /// `host:port` address of the endpoint.
    pub address: String,
}

impl Update {
    /// Creates an [`Operation::Add`] update.
    #[must_use]
    pub fn add(address: impl Into<String>) -> Self {
        Self {
            op: Operation::Add,
            address: address.into(),
        }
    }

    /// Creates an [`Operation::Delete`] update.
    #[must_use]
    pub fn delete(address: impl Into<String>) -> Self {
        Self {
            op: Operation::Delete,
            address: address.into(),
        }
    }
}

type Cache = BTreeMap<String, Entry>;

/// Watches the endpoints of one service.
pub struct Watcher {
    service: String,
    query: Arc<dyn Query>,
    poll_interval: Duration,
    cache: ArcSwap<Cache>,
    running: AtomicBool,
    stopped: Notify,
    // Held for a whole `next` call so that poll cycles never overlap.
    cycle: Mutex<()>,
}

impl Watcher {
    /// Creates a running watcher for `service`.
    #[must_use]
    pub fn new(service: impl Into<String>, query: Arc<dyn Query>, poll_interval: Duration) -> Self {
        Self {
            service: service.into(),
            query,
            poll_interval,
            cache: ArcSwap::from_pointee(Cache::new()),
            running: AtomicBool::new(true),
            stopped: Notify::new(),
            cycle: Mutex::new(()),
        }
    }

    /// Returns the watched service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the time waited between unchanged polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether the watcher has not been closed yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Waits for the next change of the endpoint set.
    ///
    /// The first successful poll reports every endpoint as added. Later calls
    /// keep polling until the set of addresses differs from the cached one.
    /// All additions come first, in query order, followed by all deletions.
    ///
    /// Returns an empty list once the watcher is closed; callers should stop
    /// calling `next` at that point.
    ///
    /// # Errors
    ///
    /// Returns the query error of a failed poll. The watcher keeps running
    /// and the next call polls again.
    pub async fn next(&self) -> Result<Vec<Update>> {
        let _cycle = self.cycle.lock().await;

        while self.is_running() {
            let entries = self.query.execute(&self.service, None).await?;
            let (updates, cache) = diff(&self.cache.load(), entries);

            if !updates.is_empty() {
                self.cache.store(Arc::new(cache));

                for update in &updates {
                    let action = match update.op {
                        Operation::Add => "adding",
                        Operation::Delete => "removing",
                    };
                    tracing::debug!("{action} endpoint: {}", update.address);
                }

                tracing::debug!(
                    "Consul discovery: {} endpoints for {}",
                    self.cache.load().len(),
                    self.service
                );

                return Ok(updates);
            }

            // Elapsed and woken alike lead back to the running check.
            let _ = tokio::time::timeout(self.poll_interval, self.stopped.notified()).await;
        }

        Ok(Vec::new())
    }

    /// Stops the watcher.
    ///
    /// A pending [`next`](Self::next) returns an empty list once its current
    /// catalog call, if any, completes. Closing twice is harmless.
    pub fn close(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            tracing::debug!("closing watcher for {}", self.service);
            self.stopped.notify_one();
        }
    }

    /// Returns the cached entry for `address`, if any.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<Entry> {
        self.cache.load().get(address).cloned()
    }

    /// Returns a snapshot of every cached entry, ordered by address.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.cache.load().values().cloned().collect()
    }

    /// Turns the watcher into a stream of update batches.
    ///
    /// Each item is the result of one [`next`](Self::next) call. The stream
    /// ends when the watcher is closed.
    pub fn updates(self: Arc<Self>) -> impl Stream<Item = Result<Vec<Update>>> + Send {
        futures::stream::unfold(self, |watcher| async move {
            match watcher.next().await {
                Ok(updates) if updates.is_empty() => None,
                result => Some((result, watcher)),
            }
        })
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("service", &self.service)
            .field("poll_interval", &self.poll_interval)
            .field("running", &self.is_running())
            .field("endpoints", &self.cache.load().len())
            .finish_non_exhaustive()
    }
}

/// Compares a poll result with the cache.
///
/// Returns the updates and the cache to publish if there are any.
fn diff(cache: &Cache, entries: Vec<Entry>) -> (Vec<Update>, Cache) {
    let mut updates = Vec::new();
    let mut next = Cache::new();

    for entry in entries {
        if next.contains_key(&entry.address) {
            continue;
        }

        if !cache.contains_key(&entry.address) {
            updates.push(Update::add(entry.address.clone()));
        }

        next.insert(entry.address.clone(), entry);
    }

    for address in cache.keys() {
        if !next.contains_key(address) {
            updates.push(Update::delete(address.clone()));
        }
    }

    (updates, next)
}
