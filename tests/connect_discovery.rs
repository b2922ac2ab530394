//! End-to-end discovery through the public API against an in-memory catalog.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tonic_lb_consul::catalog::{
    AgentService, CaRootList, Node, PreparedQueryResponse, ServiceConnect, ServiceEntry,
    ServiceProxy,
};
use tonic_lb_consul::{
    Catalog, CatalogQuery, Error, Operation, PreparedQuery, QueryOptions, Resolver,
    ResolverConfig, Result, ServiceQuery, Update,
};

#[derive(Default)]
struct InMemoryCatalog {
    instances: Mutex<Vec<ServiceEntry>>,
}

impl InMemoryCatalog {
    fn set(&self, instances: Vec<ServiceEntry>) {
        *self.instances.lock().unwrap() = instances;
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn health_service(
        &self,
        _service: &str,
        _connect: bool,
        _passing_only: bool,
        _options: Option<&QueryOptions>,
    ) -> Result<Vec<ServiceEntry>> {
        Ok(self.instances.lock().unwrap().clone())
    }

    async fn execute_prepared_query(
        &self,
        query: &str,
        _options: Option<&QueryOptions>,
    ) -> Result<PreparedQueryResponse> {
        Ok(PreparedQueryResponse {
            service: query.to_string(),
            datacenter: "dc1".to_string(),
            nodes: self.instances.lock().unwrap().clone(),
        })
    }

    async fn connect_ca_roots(&self, _options: Option<&QueryOptions>) -> Result<CaRootList> {
        Ok(CaRootList {
            trust_domain: "example.com".to_string(),
        })
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn sidecar(address: &str, port: u16, destination: &str) -> ServiceEntry {
    ServiceEntry {
        node: Node {
            node: "node-1".to_string(),
            address: "10.0.0.1".to_string(),
            datacenter: "dc1".to_string(),
        },
        service: AgentService {
            service: format!("{destination}-sidecar-proxy"),
            address: address.to_string(),
            port,
            proxy: Some(ServiceProxy {
                destination_service_name: destination.to_string(),
            }),
            connect: Some(ServiceConnect { native: false }),
            ..Default::default()
        },
    }
}

fn resolver_over(query: CatalogQuery) -> Resolver {
    Resolver::with_config(
        Arc::new(query),
        ResolverConfig::new().poll_interval(Duration::from_millis(1)),
    )
}

#[tokio::test]
async fn connect_endpoints_can_be_dialed_securely() {
    init_tracing();
    let catalog = Arc::new(InMemoryCatalog::default());
    catalog.set(vec![sidecar("", 21000, "payments"), sidecar("10.0.1.7", 21000, "payments")]);
    let resolver = resolver_over(ServiceQuery::new(catalog.clone(), true).into());
    let watcher = resolver.resolve("payments");

    let updates = watcher.next().await.unwrap();
    assert_eq!(
        updates,
        vec![Update::add("10.0.0.1:21000"), Update::add("10.0.1.7:21000")]
    );

    for update in &updates {
        let target = resolver.static_resolver(&update.address).unwrap();
        assert_eq!(target.addr, update.address);
        assert_eq!(
            target.cert_uri.unwrap().uri(),
            "spiffe://example.com/ns/default/dc/dc1/svc/payments"
        );
    }

    catalog.set(vec![sidecar("10.0.1.7", 21000, "payments")]);
    let updates = watcher.next().await.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].op, Operation::Delete);

    let err = resolver.static_resolver("10.0.0.1:21000").unwrap_err();
    assert!(matches!(err, Error::AddressNotFound(_)));

    resolver.close();
    assert!(watcher.next().await.unwrap().is_empty());
}

#[tokio::test]
async fn prepared_query_endpoints_have_no_identity() {
    init_tracing();
    let catalog = Arc::new(InMemoryCatalog::default());
    catalog.set(vec![sidecar("localhost", 9090, "payments")]);
    let resolver = resolver_over(PreparedQuery::new(catalog).into());

    let updates = resolver.resolve("q1").next().await.unwrap();

    assert_eq!(updates, vec![Update::add("localhost:9090")]);
    let entry = resolver.reverse_lookup("localhost:9090").unwrap();
    assert!(entry.identity.is_none());
}
