use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::Query;
use crate::catalog::{Catalog, QueryOptions};
use crate::entry::Entry;
use crate::error::Result;

/// Resolves endpoints by executing a prepared query.
///
/// The name passed to [`Query::execute`] is the query ID or name. Prepared
/// queries never carry Connect identities.
#[derive(Clone)]
pub struct PreparedQuery {
    catalog: Arc<dyn Catalog>,
}

impl PreparedQuery {
    /// Creates a prepared query strategy over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

impl fmt::Debug for PreparedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedQuery")
            .field("catalog", &"<dyn Catalog>")
            .finish()
    }
}

#[async_trait]
impl Query for PreparedQuery {
    async fn execute(&self, name: &str, options: Option<&QueryOptions>) -> Result<Vec<Entry>> {
        let response = self.catalog.execute_prepared_query(name, options).await?;

        Ok(response
            .nodes
            .iter()
            .map(|node| Entry::new(node.address()))
            .collect())
    }
}
