//! Discovered endpoints and their Connect identities.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Namespace used for every Connect identity.
pub const DEFAULT_NAMESPACE: &str = "default";

/// SPIFFE identity of a Connect service, used as the expected peer
/// certificate URI when dialing it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpiffeId {
    /// Trust domain of the Connect CA.
    pub host: String,

    /// Service namespace.
    pub namespace: String,

    /// Datacenter the service runs in.
    pub datacenter: String,

    /// Logical service name.
    pub service: String,
}

impl SpiffeId {
    /// Creates a service identity in the default namespace.
    #[must_use]
    pub fn service(
        host: impl Into<String>,
        datacenter: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            datacenter: datacenter.into(),
            service: service.into(),
        }
    }

    /// Renders the `spiffe://` URI expected in the peer certificate.
    #[must_use]
    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "spiffe://{}/ns/{}/dc/{}/svc/{}",
            self.host, self.namespace, self.datacenter, self.service
        )
    }
}

/// A discovered endpoint.
///
/// Entries are keyed by address: two entries with the same address are the
/// same endpoint, whatever their identity.
#[derive(Clone, Debug)]
pub struct Entry {
    /// `host:port` address of the endpoint.
    pub address: String,

    /// Connect identity, only set by Connect-aware queries.
    pub identity: Option<SpiffeId>,
}

impl Entry {
    /// Creates an entry without an identity.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            identity: None,
        }
    }

    /// Attaches a Connect identity.
    #[must_use]
    pub fn with_identity(mut self, identity: SpiffeId) -> Self {
        self.identity = Some(identity);
        self
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

/// What a secure dialer needs to connect to one endpoint: where to dial and
/// which certificate URI to expect from the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticResolver {
    /// Address to dial.
    pub addr: String,

    /// Expected peer identity, if the endpoint was discovered through Connect.
    pub cert_uri: Option<SpiffeId>,
}

impl StaticResolver {
    /// Returns the address to dial and the SPIFFE identity the peer must present.
    ///
    /// A TLS dialer connects to the address and verifies the server certificate's
    /// URI SAN against the identity. Without an identity, only the address is
    /// known and the connection cannot be authenticated through Connect.
    #[must_use]
    pub fn resolve(&self) -> (&str, Option<&SpiffeId>) {
        (&self.addr, self.cert_uri.as_ref())
    }
}

impl From<Entry> for StaticResolver {
    fn from(entry: Entry) -> Self {
        Self {
            addr: entry.address,
            cert_uri: entry.identity,
        }
    }
}
