//! The service catalog collaborator.
//!
//! Discovery only needs three read operations from the catalog: a
//! health-filtered service lookup, prepared query execution, and the Connect
//! CA roots (for the trust domain). They are captured by the [`Catalog`]
//! trait so the queries can run against Consul or against any other backend
//! speaking the same record shapes.
//!
//! The record types mirror the JSON returned by the Consul agent API and
//! deserialize from it directly.

#[cfg(feature = "consul")]
mod consul;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

#[cfg(feature = "consul")]
pub use consul::{ConsulClient, ConsulConfig};

/// Per-request options passed through to the catalog.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Datacenter to query instead of the agent's own.
    pub datacenter: Option<String>,

    /// ACL token to use instead of the client's default.
    pub token: Option<String>,
}

impl QueryOptions {
    /// Sets the datacenter to query.
    #[must_use]
    pub fn datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    /// Sets the ACL token.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// A catalog node hosting a service instance.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct Node {
    /// Node name.
    pub node: String,

    /// Node address, used when the service does not declare its own.
    pub address: String,

    /// Datacenter the node belongs to.
    pub datacenter: String,
}

/// Sidecar proxy settings of a service registration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceProxy {
    /// The service this proxy fronts.
    pub destination_service_name: String,
}

/// Connect settings of a service registration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceConnect {
    /// The service speaks Connect itself, without a sidecar.
    pub native: bool,
}

/// A service registration as reported by the catalog.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct AgentService {
    /// Service instance ID.
    #[serde(rename = "ID")]
    pub id: String,

    /// Service name.
    pub service: String,

    /// Service address, may be empty.
    pub address: String,

    /// Service port.
    pub port: u16,

    /// Proxy settings, present for Connect sidecar proxies.
    pub proxy: Option<ServiceProxy>,

    /// Connect settings, present for Connect-aware services.
    pub connect: Option<ServiceConnect>,
}

/// One service instance together with the node it runs on.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceEntry {
    /// Hosting node.
    pub node: Node,

    /// Service registration.
    pub service: AgentService,
}

impl ServiceEntry {
    /// Returns the `host:port` address to dial.
    ///
    /// The service address is preferred; the node address is used when the
    /// service was registered without one.
    #[must_use]
    pub fn address(&self) -> String {
        let host = if self.service.address.is_empty() {
            &self.node.address
        } else {
            &self.service.address
        };

        format!("{host}:{}", self.service.port)
    }
}

/// Result of executing a prepared query.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PreparedQueryResponse {
    /// Name of the service the query resolved to.
    pub service: String,

    /// Datacenter the results came from.
    pub datacenter: String,

    /// Matching service instances.
    pub nodes: Vec<ServiceEntry>,
}

/// Connect CA roots, of which only the trust domain is used.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct CaRootList {
    /// Trust domain of the Connect CA.
    pub trust_domain: String,
}

/// Read access to a service catalog.
///
/// Implementations report every failure as [`Error::CatalogQuery`](crate::Error::CatalogQuery)
/// and never retry; retrying is left to the watcher's poll loop.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Looks up the instances of `service`.
    ///
    /// With `connect` set, the lookup targets the Connect-capable instances
    /// (sidecar proxies and native services) instead of the plain service.
    async fn health_service(
        &self,
        service: &str,
        connect: bool,
        passing_only: bool,
        options: Option<&QueryOptions>,
    ) -> Result<Vec<ServiceEntry>>;

    /// Executes the prepared query with the given ID or name.
    async fn execute_prepared_query(
        &self,
        query: &str,
        options: Option<&QueryOptions>,
    ) -> Result<PreparedQueryResponse>;

    /// Fetches the Connect CA roots.
    async fn connect_ca_roots(&self, options: Option<&QueryOptions>) -> Result<CaRootList>;
}
