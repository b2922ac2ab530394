//! Watches a Consul service and logs endpoint changes as they happen.
//!
//! # Environment Variables
//!
//! - `CONSUL_HTTP_ADDR`: Consul agent address (default: http://127.0.0.1:8500)
//! - `CONSUL_HTTP_TOKEN`: ACL token (optional)
//! - `SERVICE_NAME`: service to watch (default: greeter-server)
//! - `USE_CONNECT`: set to `true` to discover Connect endpoints and their identities
//! - `POLL_INTERVAL_SECS`: seconds between unchanged polls (default: 10)

use std::env;
use std::time::Duration;

use tonic_lb_consul::{ConsulConfig, Operation, Resolver, ResolverConfig};
use tracing::{Level, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    // Read configuration from environment
    let service_name = env::var("SERVICE_NAME").unwrap_or_else(|_| "greeter-server".to_string());
    let use_connect = env::var("USE_CONNECT").is_ok_and(|v| v == "true");
    let poll_interval: u64 = env::var("POLL_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let consul = ConsulConfig::from_env();
    info!("Consul agent: {}", consul.address);
    info!("Service: {service_name}");
    info!("Connect: {use_connect}");

    let config = ResolverConfig::new().poll_interval(Duration::from_secs(poll_interval));
    let resolver = if use_connect {
        Resolver::connect_service_query(consul, config)?
    } else {
        Resolver::service_query(consul, config)?
    };

    let watcher = resolver.resolve(&service_name);

    loop {
        let updates = tokio::select! {
            result = watcher.next() => result,
            _ = tokio::signal::ctrl_c() => {
                resolver.close();
                break;
            }
        };

        let updates = match updates {
            Ok(updates) if updates.is_empty() => break,
            Ok(updates) => updates,
            Err(e) => {
                warn!("poll failed: {e}");
                tokio::time::sleep(watcher.poll_interval()).await;
                continue;
            }
        };

        for update in updates {
            match update.op {
                Operation::Add => match resolver.static_resolver(&update.address) {
                    Ok(target) => match target.cert_uri {
                        Some(uri) => info!("+ {} ({uri})", target.addr),
                        None => info!("+ {}", target.addr),
                    },
                    Err(e) => warn!("{e}"),
                },
                Operation::Delete => info!("- {}", update.address),
            }
        }

        info!("{} endpoints for {service_name}", watcher.entries().len());
    }

    info!("watcher closed");
    Ok(())
}
