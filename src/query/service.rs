use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::Query;
use crate::catalog::{Catalog, QueryOptions, ServiceEntry};
use crate::entry::{Entry, SpiffeId};
use crate::error::{Error, Result};

/// Resolves endpoints from the health-checked service catalog.
///
/// Only instances passing their health checks are returned. When created for
/// Connect, the lookup returns the Connect-capable instances (sidecar proxies
/// and native services) and every entry carries the identity to expect from
/// the peer.
pub struct ServiceQuery {
    catalog: Arc<dyn Catalog>,
    connect: bool,
    // Fetched on first use and kept for the lifetime of the query. Left unset
    // when the fetch fails so that the next poll tries again.
    trust_domain: OnceCell<String>,
}

impl ServiceQuery {
    /// Creates a service lookup over `catalog`, Connect-aware if `connect` is set.
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>, connect: bool) -> Self {
        Self {
            catalog,
            connect,
            trust_domain: OnceCell::new(),
        }
    }

    /// Whether this query looks up Connect endpoints.
    #[must_use]
    pub fn is_connect(&self) -> bool {
        self.connect
    }

    async fn trust_domain(&self) -> Result<&str> {
        let trust_domain = self
            .trust_domain
            .get_or_try_init(|| async {
                let roots = self
                    .catalog
                    .connect_ca_roots(None)
                    .await
                    .map_err(|e| Error::TrustDomainUnavailable(Box::new(e)))?;

                if roots.trust_domain.is_empty() {
                    return Err(Error::TrustDomainUnavailable(Box::new(Error::catalog(
                        "CA roots carry no trust domain",
                    ))));
                }

                tracing::debug!("using Connect trust domain {}", roots.trust_domain);
                Ok(roots.trust_domain)
            })
            .await?;

        Ok(trust_domain.as_str())
    }

    async fn identity(&self, record: &ServiceEntry) -> Result<SpiffeId> {
        let native = record.service.connect.as_ref().is_some_and(|c| c.native);
        let service = if native {
            record.service.service.as_str()
        } else {
            record
                .service
                .proxy
                .as_ref()
                .map_or("", |p| p.destination_service_name.as_str())
        };

        if service.is_empty() {
            return Err(Error::InvalidCatalogRecord {
                service: record.service.service.clone(),
            });
        }

        let host = self.trust_domain().await?;
        Ok(SpiffeId::service(host, &record.node.datacenter, service))
    }
}

impl fmt::Debug for ServiceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceQuery")
            .field("catalog", &"<dyn Catalog>")
            .field("connect", &self.connect)
            .field("trust_domain", &self.trust_domain.get())
            .finish()
    }
}

#[async_trait]
impl Query for ServiceQuery {
    async fn execute(&self, name: &str, options: Option<&QueryOptions>) -> Result<Vec<Entry>> {
        let records = self
            .catalog
            .health_service(name, self.connect, true, options)
            .await?;

        let mut entries = Vec::with_capacity(records.len());
        for record in &records {
            let mut entry = Entry::new(record.address());
            if self.connect {
                entry.identity = Some(self.identity(record).await?);
            }

            entries.push(entry);
        }

        Ok(entries)
    }
}
