//! Discovery strategies turning a service name into endpoints.
//!
//! Two strategies are provided:
//!
//! - [`ServiceQuery`] looks up the passing instances of a service, optionally
//!   through Consul Connect, in which case each endpoint carries the
//!   [`SpiffeId`](crate::SpiffeId) to expect when dialing it.
//! - [`PreparedQuery`] executes a prepared query by ID or name.
//!
//! [`CatalogQuery`] picks one of them at setup time and is what the
//! resolver's convenience constructors use. Any other [`Query`]
//! implementation can be handed to a [`Resolver`](crate::Resolver) as well.

mod prepared;
mod service;

use async_trait::async_trait;

use crate::catalog::QueryOptions;
use crate::entry::Entry;
use crate::error::Result;

pub use prepared::PreparedQuery;
pub use service::ServiceQuery;

/// A way of listing the current endpoints of a service.
#[async_trait]
pub trait Query: Send + Sync {
    /// Returns the endpoints currently registered under `name`.
    ///
    /// The result is complete or an error; it is empty, not an error, when
    /// nothing matches. Catalog failures are returned as they are, without
    /// retrying.
    async fn execute(&self, name: &str, options: Option<&QueryOptions>) -> Result<Vec<Entry>>;
}

/// The built-in discovery strategies.
#[derive(Debug)]
pub enum CatalogQuery {
    /// Health-checked service lookup.
    Service(ServiceQuery),
    /// Prepared query execution.
    Prepared(PreparedQuery),
}

impl From<ServiceQuery> for CatalogQuery {
    fn from(query: ServiceQuery) -> Self {
        Self::Service(query)
    }
}

impl From<PreparedQuery> for CatalogQuery {
    fn from(query: PreparedQuery) -> Self {
        Self::Prepared(query)
    }
}

#[async_trait]
impl Query for CatalogQuery {
    async fn execute(&self, name: &str, options: Option<&QueryOptions>) -> Result<Vec<Entry>> {
        match self {
            Self::Service(query) => query.execute(name, options).await,
            Self::Prepared(query) => query.execute(name, options).await,
        }
    }
}
