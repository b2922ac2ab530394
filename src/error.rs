//! Error types for catalog discovery.

/// Boxed error returned by catalog backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The catalog backend call failed.
    #[error("catalog query failed: {0}")]
    CatalogQuery(#[source] BoxError),

    /// A Connect catalog record carries no service name to build an identity from.
    #[error("not a valid connect service: {service:?}")]
    InvalidCatalogRecord {
        /// Name of the catalog service the record was returned for.
        service: String,
    },

    /// The Connect trust domain could not be fetched from the catalog.
    #[error("trust domain unavailable: {0}")]
    TrustDomainUnavailable(#[source] Box<Error>),

    /// No registered watcher knows the address.
    #[error("unable to resolve address {0}")]
    AddressNotFound(String),
}

impl Error {
    /// Create a catalog query error from any backend failure.
    #[must_use]
    pub fn catalog<E: Into<BoxError>>(err: E) -> Self {
        Self::CatalogQuery(err.into())
    }
}
