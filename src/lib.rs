#![deny(missing_docs)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Consul endpoint discovery for [Tonic](https://docs.rs/tonic) gRPC load balancing.
//!
//! A client-side load balancer needs to know every live address of a service.
//! This crate polls the Consul catalog for a service, turns each snapshot into
//! the minimal list of added and removed endpoints, and feeds them to a
//! user-provided Tonic balance channel.
//!
//! # Features
//!
//! - **Health-checked lookup**: Only instances passing their checks are used
//! - **Prepared queries**: Resolve endpoints through a stored Consul query
//! - **Consul Connect**: Every endpoint carries the SPIFFE identity to verify
//!   when dialing it over mutual TLS
//! - **User-controlled channels**: You create the channel and endpoints however you want
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tonic::transport::{Channel, Endpoint};
//! use tonic_lb_consul::{ConsulConfig, DiscoveryConfig, Resolver, ResolverConfig, discover};
//!
//! // Create your own balance channel
//! let (channel, tx) = Channel::balance_channel::<String>(1024);
//!
//! // One resolver serves any number of services
//! let resolver = Arc::new(Resolver::service_query(
//!     ConsulConfig::from_env(),
//!     ResolverConfig::new().poll_interval(Duration::from_secs(10)),
//! )?);
//!
//! // Start discovery - build function returns Endpoint for each entry
//! discover(resolver, DiscoveryConfig::new("my-grpc-service"), tx, |entry| {
//!     Endpoint::from_shared(format!("http://{}", entry.address))
//!         .unwrap()
//!         .connect_timeout(Duration::from_secs(5))
//! });
//!
//! // Use with your generated gRPC client
//! // let client = MyServiceClient::new(channel);
//! ```
//!
//! Without the balance channel, drive a [`Watcher`] yourself:
//!
//! ```ignore
//! let watcher = resolver.resolve("my-grpc-service");
//! loop {
//!     let updates = watcher.next().await?;
//!     if updates.is_empty() {
//!         break; // closed
//!     }
//!     // apply updates
//! }
//! ```
//!
//! For Connect, build the resolver with [`Resolver::connect_service_query`]
//! and ask [`Resolver::static_resolver`] for the certificate URI to expect
//! when dialing an address received from the watcher.

pub mod catalog;
mod discovery;
mod entry;
mod error;
pub mod query;
mod resolver;
mod watcher;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, QueryOptions};
#[cfg(feature = "consul")]
pub use catalog::{ConsulClient, ConsulConfig};
pub use discovery::{DiscoveryConfig, discover};
pub use entry::{DEFAULT_NAMESPACE, Entry, SpiffeId, StaticResolver};
pub use error::{BoxError, Error, Result};
pub use query::{CatalogQuery, PreparedQuery, Query, ServiceQuery};
pub use resolver::{DEFAULT_POLL_INTERVAL, Resolver, ResolverConfig};
pub use watcher::{Operation, Update, Watcher};
