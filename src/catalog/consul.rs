//! [`Catalog`] implementation over the Consul agent HTTP API.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;

use super::{CaRootList, Catalog, PreparedQueryResponse, QueryOptions, ServiceEntry};
use crate::error::{Error, Result};

const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8500";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Connection settings for a Consul agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsulConfig {
    /// Agent address, with or without a scheme (`127.0.0.1:8500`).
    pub address: String,

    /// Default ACL token, overridden by [`QueryOptions::token`].
    pub token: Option<String>,

    /// Default datacenter, overridden by [`QueryOptions::datacenter`].
    pub datacenter: Option<String>,

    /// Timeout for each catalog request.
    pub timeout: Duration,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}

impl ConsulConfig {
    /// Creates a configuration for the agent at `address`.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: None,
            datacenter: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Reads the configuration from the standard Consul environment variables.
    ///
    /// - `CONSUL_HTTP_ADDR`: agent address (default: `http://127.0.0.1:8500`)
    /// - `CONSUL_HTTP_TOKEN`: ACL token
    /// - `CONSUL_DATACENTER`: datacenter to query
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let mut config = match non_empty("CONSUL_HTTP_ADDR") {
            Some(address) => Self::new(address),
            None => Self::default(),
        };
        config.token = non_empty("CONSUL_HTTP_TOKEN");
        config.datacenter = non_empty("CONSUL_DATACENTER");
        config
    }

    /// Sets the default ACL token.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the default datacenter.
    #[must_use]
    pub fn datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        }
    }
}

/// Consul agent client.
#[derive(Clone, Debug)]
pub struct ConsulClient {
    config: ConsulConfig,
    base_url: Url,
    http: reqwest::Client,
}

impl ConsulClient {
    /// Creates a client for the configured agent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CatalogQuery`] if the agent address is not a valid
    /// base URL or the HTTP client cannot be built.
    pub fn new(config: ConsulConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url()).map_err(Error::catalog)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::catalog(format!(
                "invalid Consul address {}",
                config.address
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::catalog)?;

        Ok(Self {
            config,
            base_url,
            http,
        })
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ConsulConfig {
        &self.config
    }

    // Names are pushed as single path segments, so `/`, `?` and `#` in a
    // service or query name are escaped instead of changing the request.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }

        url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        params: &[(&str, &str)],
        options: Option<&QueryOptions>,
    ) -> Result<T> {
        let url = self.url(segments);
        tracing::trace!("GET {url}");

        let mut request = self.http.get(url).query(params);

        let datacenter = options
            .and_then(|o| o.datacenter.as_deref())
            .or(self.config.datacenter.as_deref());
        if let Some(dc) = datacenter {
            request = request.query(&[("dc", dc)]);
        }

        let token = options
            .and_then(|o| o.token.as_deref())
            .or(self.config.token.as_deref());
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(Error::catalog)?;

        response.json::<T>().await.map_err(Error::catalog)
    }
}

#[async_trait]
impl Catalog for ConsulClient {
    async fn health_service(
        &self,
        service: &str,
        connect: bool,
        passing_only: bool,
        options: Option<&QueryOptions>,
    ) -> Result<Vec<ServiceEntry>> {
        let kind = if connect { "connect" } else { "service" };
        let params: &[(&str, &str)] = if passing_only { &[("passing", "1")] } else { &[] };

        self.get(&["v1", "health", kind, service], params, options)
            .await
    }

    async fn execute_prepared_query(
        &self,
        query: &str,
        options: Option<&QueryOptions>,
    ) -> Result<PreparedQueryResponse> {
        self.get(&["v1", "query", query, "execute"], &[], options)
            .await
    }

    async fn connect_ca_roots(&self, options: Option<&QueryOptions>) -> Result<CaRootList> {
        self.get(&["v1", "agent", "connect", "ca", "roots"], &[], options)
            .await
    }
}
