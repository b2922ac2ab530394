//! Per-service watcher registry with reverse address lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[cfg(feature = "consul")]
use crate::catalog::{ConsulClient, ConsulConfig};
use crate::entry::{Entry, StaticResolver};
use crate::error::{Error, Result};
use crate::query::Query;
#[cfg(feature = "consul")]
use crate::query::{CatalogQuery, PreparedQuery, ServiceQuery};
use crate::watcher::Watcher;

/// Poll interval used unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for a [`Resolver`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Time each watcher waits between polls that found no change.
    pub poll_interval: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ResolverConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Creates one [`Watcher`] per service name and answers reverse lookups
/// across all of them.
///
/// The reverse lookup is what a secure dialer uses: the load balancer only
/// hands it an address, and the resolver finds the identity that was
/// discovered along with it.
pub struct Resolver {
    query: Arc<dyn Query>,
    config: ResolverConfig,
    watchers: Mutex<HashMap<String, Arc<Watcher>>>,
}

impl Resolver {
    /// Creates a resolver over `query` with the default poll interval.
    #[must_use]
    pub fn new(query: Arc<dyn Query>) -> Self {
        Self::with_config(query, ResolverConfig::default())
    }

    /// Creates a resolver over `query`.
    #[must_use]
    pub fn with_config(query: Arc<dyn Query>, config: ResolverConfig) -> Self {
        Self {
            query,
            config,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a resolver looking up passing service instances in Consul.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CatalogQuery`] if the Consul client cannot be built.
    #[cfg(feature = "consul")]
    pub fn service_query(consul: ConsulConfig, config: ResolverConfig) -> Result<Self> {
        let client = Arc::new(ConsulClient::new(consul)?);
        let query = CatalogQuery::from(ServiceQuery::new(client, false));
        Ok(Self::with_config(Arc::new(query), config))
    }

    /// Creates a resolver looking up Connect endpoints in Consul.
    ///
    /// Every discovered entry carries the identity to expect from the peer;
    /// see [`static_resolver`](Self::static_resolver).
    ///
    /// # Errors
    ///
    /// Returns [`Error::CatalogQuery`] if the Consul client cannot be built.
    #[cfg(feature = "consul")]
    pub fn connect_service_query(consul: ConsulConfig, config: ResolverConfig) -> Result<Self> {
        let client = Arc::new(ConsulClient::new(consul)?);
        let query = CatalogQuery::from(ServiceQuery::new(client, true));
        Ok(Self::with_config(Arc::new(query), config))
    }

    /// Creates a resolver executing Consul prepared queries, the resolved
    /// names being query IDs or names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CatalogQuery`] if the Consul client cannot be built.
    #[cfg(feature = "consul")]
    pub fn prepared_query(consul: ConsulConfig, config: ResolverConfig) -> Result<Self> {
        let client = Arc::new(ConsulClient::new(consul)?);
        let query = CatalogQuery::from(PreparedQuery::new(client));
        Ok(Self::with_config(Arc::new(query), config))
    }

    /// Returns the resolver configuration.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn watchers(&self) -> MutexGuard<'_, HashMap<String, Arc<Watcher>>> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the watcher for `service`, creating it on first use.
    ///
    /// A service keeps the same watcher for the lifetime of the resolver,
    /// even after it has been closed.
    pub fn resolve(&self, service: &str) -> Arc<Watcher> {
        self.watchers()
            .entry(service.to_string())
            .or_insert_with(|| {
                tracing::debug!("creating watcher for {service}");
                Arc::new(Watcher::new(
                    service,
                    self.query.clone(),
                    self.config.poll_interval,
                ))
            })
            .clone()
    }

    /// Returns the names of all resolved services.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        self.watchers().keys().cloned().collect()
    }

    /// Finds the cached entry for `address` among all watchers.
    ///
    /// If several services share the address, any one of their entries may
    /// be returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AddressNotFound`] if no watcher knows the address.
    pub fn reverse_lookup(&self, address: &str) -> Result<Entry> {
        let watchers: Vec<Arc<Watcher>> = self.watchers().values().cloned().collect();

        watchers
            .iter()
            .find_map(|w| w.get(address))
            .ok_or_else(|| Error::AddressNotFound(address.to_string()))
    }

    /// Returns what a secure dialer needs to connect to `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AddressNotFound`] if no watcher knows the address.
    pub fn static_resolver(&self, address: &str) -> Result<StaticResolver> {
        self.reverse_lookup(address).map(StaticResolver::from)
    }

    /// Closes every watcher created so far.
    pub fn close(&self) {
        for watcher in self.watchers().values() {
            watcher.close();
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .field("services", &self.services())
            .finish_non_exhaustive()
    }
}
