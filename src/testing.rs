//! In-memory catalog and query doubles shared by the unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::catalog::{
    AgentService, CaRootList, Catalog, Node, PreparedQueryResponse, QueryOptions, ServiceEntry,
};
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::query::Query;

/// A recorded `health_service` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct HealthCall {
    pub service: String,
    pub connect: bool,
    pub passing_only: bool,
}

/// Catalog returning whatever the test last stored.
pub(crate) struct FakeCatalog {
    services: Mutex<std::result::Result<Vec<ServiceEntry>, String>>,
    prepared: Mutex<std::result::Result<Vec<ServiceEntry>, String>>,
    trust_domain: Mutex<std::result::Result<String, String>>,
    health_calls: Mutex<Vec<HealthCall>>,
    prepared_calls: Mutex<Vec<String>>,
    ca_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            services: Mutex::new(Ok(Vec::new())),
            prepared: Mutex::new(Ok(Vec::new())),
            trust_domain: Mutex::new(Ok("abc.com".to_string())),
            health_calls: Mutex::new(Vec::new()),
            prepared_calls: Mutex::new(Vec::new()),
            ca_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_services(&self, entries: Vec<ServiceEntry>) {
        *self.services.lock().unwrap() = Ok(entries);
    }

    pub fn fail_services(&self, message: &str) {
        *self.services.lock().unwrap() = Err(message.to_string());
    }

    pub fn set_prepared(&self, entries: Vec<ServiceEntry>) {
        *self.prepared.lock().unwrap() = Ok(entries);
    }

    pub fn fail_prepared(&self, message: &str) {
        *self.prepared.lock().unwrap() = Err(message.to_string());
    }

    pub fn set_trust_domain(&self, trust_domain: &str) {
        *self.trust_domain.lock().unwrap() = Ok(trust_domain.to_string());
    }

    pub fn fail_trust_domain(&self, message: &str) {
        *self.trust_domain.lock().unwrap() = Err(message.to_string());
    }

    pub fn health_calls(&self) -> Vec<HealthCall> {
        self.health_calls.lock().unwrap().clone()
    }

    pub fn prepared_calls(&self) -> Vec<String> {
        self.prepared_calls.lock().unwrap().clone()
    }

    pub fn ca_calls(&self) -> usize {
        self.ca_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn health_service(
        &self,
        service: &str,
        connect: bool,
        passing_only: bool,
        _options: Option<&QueryOptions>,
    ) -> Result<Vec<ServiceEntry>> {
        self.health_calls.lock().unwrap().push(HealthCall {
            service: service.to_string(),
            connect,
            passing_only,
        });

        self.services.lock().unwrap().clone().map_err(Error::catalog)
    }

    async fn execute_prepared_query(
        &self,
        query: &str,
        _options: Option<&QueryOptions>,
    ) -> Result<PreparedQueryResponse> {
        self.prepared_calls.lock().unwrap().push(query.to_string());

        let nodes = self.prepared.lock().unwrap().clone().map_err(Error::catalog)?;
        Ok(PreparedQueryResponse {
            service: query.to_string(),
            nodes,
            ..Default::default()
        })
    }

    async fn connect_ca_roots(&self, _options: Option<&QueryOptions>) -> Result<CaRootList> {
        self.ca_calls.fetch_add(1, Ordering::SeqCst);

        let trust_domain = self.trust_domain.lock().unwrap().clone().map_err(Error::catalog)?;
        Ok(CaRootList { trust_domain })
    }
}

/// Builds a catalog record with a service address and port.
pub(crate) fn make_service_entry(address: &str, port: u16) -> ServiceEntry {
    ServiceEntry {
        node: Node {
            datacenter: "dc1".to_string(),
            ..Default::default()
        },
        service: AgentService {
            address: address.to_string(),
            port,
            ..Default::default()
        },
    }
}

/// Query returning whatever the test last stored, counting calls.
pub(crate) struct ScriptedQuery {
    result: Mutex<std::result::Result<Vec<Entry>, String>>,
    calls: AtomicUsize,
}

impl ScriptedQuery {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            result: Mutex::new(Ok(entries)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, entries: Vec<Entry>) {
        *self.result.lock().unwrap() = Ok(entries);
    }

    pub fn fail(&self, message: &str) {
        *self.result.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Query for ScriptedQuery {
    async fn execute(&self, _name: &str, _options: Option<&QueryOptions>) -> Result<Vec<Entry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().unwrap().clone().map_err(Error::catalog)
    }
}

/// Builds plain entries from addresses.
pub(crate) fn entries(addresses: &[&str]) -> Vec<Entry> {
    addresses.iter().map(|a| Entry::new(*a)).collect()
}
