//! Feeding Consul endpoint changes to a tonic balance channel.
//!
//! [`discover`] spawns a task that owns one [`Watcher`] from the [`Resolver`].
//! Each call to [`Watcher::next`] polls the catalog, and every add or delete
//! it reports becomes a `Change::Insert` or `Change::Remove` keyed by address.
//! A failed poll is logged and retried after the configured error backoff.
//! The task ends once the watcher is closed or the receiving side of the
//! channel is dropped.
//!
//! See the crate documentation for a complete setup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tonic::transport::Endpoint;
use tonic::transport::channel::Change;

use crate::entry::Entry;
use crate::resolver::Resolver;
use crate::watcher::{Operation, Update, Watcher};

/// Configuration for feeding one service into a balance channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// The service name (or prepared query) to resolve.
    pub service_name: String,

    /// Time to wait after a failed poll before polling again.
    /// If `None`, uses the resolver's poll interval.
    pub error_backoff: Option<Duration>,
}

impl DiscoveryConfig {
    /// Creates a new discovery configuration.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            error_backoff: None,
        }
    }

    /// Sets an explicit wait after failed polls.
    #[must_use]
    pub fn error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = Some(error_backoff);
        self
    }
}

/// Starts watching a service and sends changes to the provided sender.
///
/// This function spawns a background task that resolves the service through
/// `resolver` and sends `Change` events keyed by endpoint address. Failed
/// polls are logged and retried; the balance channel keeps its current
/// endpoints meanwhile. The task ends when the watcher is closed or the
/// receiving side of `tx` is dropped, in which case the watcher is closed.
///
/// # Arguments
///
/// * `resolver` - Resolver owning the service watcher
/// * `config` - Discovery configuration specifying the service to watch
/// * `tx` - Sender for endpoint changes (from `Channel::balance_channel()`)
/// * `build` - Function to build an `Endpoint` from a discovered [`Entry`]
pub fn discover<F>(
    resolver: Arc<Resolver>,
    config: DiscoveryConfig,
    tx: Sender<Change<String, Endpoint>>,
    build: F,
) -> JoinHandle<()>
where
    F: Fn(&Entry) -> Endpoint + Send + 'static,
{
    tokio::spawn(async move {
        discovery_loop(tx, &resolver, config, build).await;
    })
}

/// Background task that polls the watcher and sends endpoint changes.
async fn discovery_loop<F>(
    tx: Sender<Change<String, Endpoint>>,
    resolver: &Resolver,
    config: DiscoveryConfig,
    build: F,
) where
    F: Fn(&Entry) -> Endpoint,
{
    let watcher = resolver.resolve(&config.service_name);
    let backoff = config
        .error_backoff
        .unwrap_or_else(|| watcher.poll_interval());

    tracing::debug!("Starting Consul endpoint watch for {}", config.service_name);

    loop {
        let updates = match watcher.next().await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!("Consul discovery for {} failed: {e}", config.service_name);
                tokio::time::sleep(backoff).await;
                continue;
            }
        };

        if updates.is_empty() {
            tracing::debug!("watcher for {} closed", config.service_name);
            return;
        }

        for change in process_updates(updates, &watcher, &build) {
            if tx.send(change).await.is_err() {
                tracing::warn!("channel closed, stopping Consul watcher");
                watcher.close();
                return;
            }
        }
    }
}

/// Maps watcher updates to balance channel changes.
///
/// This function is extracted to enable unit testing of the update mapping.
fn process_updates<F>(
    updates: Vec<Update>,
    watcher: &Watcher,
    build: &F,
) -> Vec<Change<String, Endpoint>>
where
    F: Fn(&Entry) -> Endpoint,
{
    updates
        .into_iter()
        .filter_map(|update| match update.op {
            Operation::Add => {
                let entry = watcher.get(&update.address)?;
                Some(Change::Insert(update.address, build(&entry)))
            }

            Operation::Delete => Some(Change::Remove(update.address)),
        })
        .collect()
}
