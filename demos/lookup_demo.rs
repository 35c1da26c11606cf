//! Lookup Demo
//!
//! Wires configuration, logging, the two-tier cache and the telemetry
//! emitter together and serves a handful of simulated lookups.
//!
//! Redis and Kafka are optional: without them the cache runs local-only and
//! the emitter settles into degraded mode.
//!
//! Usage:
//! ```bash
//! REDIS_URL=redis://localhost:6379/0 KAFKA_BOOTSTRAP_SERVERS=localhost:9092 \
//!     cargo run --example lookup_demo
//! ```

use citycode_core::telemetry::Metadata;
use citycode_core::{
    cache_key, logging, CacheCoordinator, Emitter, RedisCache, ServiceConfig,
};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Stand-in for the relational city table
fn city_table() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("paris", "FR"),
        ("berlin", "DE"),
        ("madrid", "ES"),
        ("tokyo", "JP"),
        ("lima", "PE"),
        ("oslo", "NO"),
    ])
}

async fn query_country_code(
    table: &HashMap<&'static str, &'static str>,
    city: &str,
) -> anyhow::Result<Option<String>> {
    // simulated database round-trip
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok(table.get(city.to_lowercase().as_str()).map(|code| code.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    logging::init_logging(&config.log.level);

    info!("=== City Lookup Demo ===");
    info!(
        "Redis: {} | Kafka: {:?} (topic {})",
        config.remote.url, config.telemetry.bootstrap_servers, config.telemetry.topic
    );

    let remote = Arc::new(RedisCache::new(config.remote.clone())?);
    let cache = CacheCoordinator::new(config.cache.clone(), remote, config.remote.default_ttl)?;
    cache.initialize().await;

    let emitter = Emitter::kafka(config.telemetry.clone())?;
    let mut startup = Metadata::new();
    startup.insert("cache_max_size".to_string(), config.cache.max_size.into());
    startup.insert("cache_ttl_secs".to_string(), config.cache.ttl.as_secs().into());
    emitter.record_startup(startup);

    let table = city_table();
    let requests = ["Paris", "Berlin", "paris", "Atlantis", "Tokyo", "PARIS", "Berlin"];

    for city in requests {
        let started = Instant::now();
        let key = cache_key("city", city);
        let loaded = Cell::new(false);

        let result = cache
            .get_or_load(&key, || {
                loaded.set(true);
                query_country_code(&table, city)
            })
            .await;
        let cached = !loaded.get();

        let status = match &result {
            Ok(Some(code)) => {
                info!("{} -> {} (cache hit: {})", city, code, cached);
                200
            }
            Ok(None) => {
                info!("{} -> not found", city);
                404
            }
            Err(e) => {
                warn!("{} -> lookup failed: {}", city, e);
                emitter.record_error("DatabaseError", &e.to_string());
                500
            }
        };

        emitter.record_request(city, started.elapsed(), cached, status);
    }

    let stats = cache.stats();
    info!("\n--- Cache Statistics ---");
    info!("Local: {}", stats.local);
    info!(
        "Local hits: {} | Remote hits: {} | Misses: {}",
        stats.local_hits, stats.remote_hits, stats.misses
    );
    info!("Remote backend: {} (connected: {})", stats.remote_backend, stats.remote_connected);

    let health = cache.health().await;
    info!("Cache health: {} | remote: {:?}", health.status, health.remote_info);

    emitter.record_shutdown();
    // give the worker a moment to flush before closing
    tokio::time::sleep(Duration::from_millis(500)).await;

    let metrics = emitter.metrics();
    info!("\n--- Telemetry ---");
    info!(
        "State: {} | delivered: {} | dropped: {} | queued: {}",
        metrics.state,
        metrics.delivered,
        metrics.total_dropped(),
        metrics.queue_len
    );

    if let Err(e) = emitter.close().await {
        warn!("Telemetry shutdown: {}", e);
    }
    cache.close().await;

    info!("=== Demo Complete ===");
    Ok(())
}
