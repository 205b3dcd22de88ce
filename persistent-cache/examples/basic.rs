//! Basic cache example
//!
//! Stores, reads, enumerates and clears entries in a local Elasticsearch.
//!
//! Usage:
//!   cargo run --example basic

use persistent_cache::{CacheConfig, CacheStore};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = CacheConfig::new("http://localhost:9200")
        .with_index("persistent_cache_example")
        .with_refresh_on_write(true);
    let store = CacheStore::new(config)?;

    if !store.is_available().await {
        eprintln!("Elasticsearch at http://localhost:9200 is not available");
        return Ok(());
    }

    store.clear().await?;

    println!("1. Saving 'greeting'");
    store.save("greeting", "Hello, cache!", None).await?;
    let entry = store.lookup::<_, String>("greeting").await?;
    println!("   {:?}\n", entry);

    println!("2. Saving a structured value with a fixed timestamp");
    store
        .save("profile:1", json!({"name": "Ada", "langs": ["en", "fr"]}), Some("2026-01-01 00:00:00 +0000"))
        .await?;
    let entry = store.lookup::<_, serde_json::Value>("profile:1").await?;
    println!("   {:?}\n", entry);

    println!("3. Enumerating");
    println!("   size = {}", store.size().await?);
    for (i, page) in store.keys().await?.iter().enumerate() {
        println!("   page {}: {:?}", i, page);
    }

    println!("\n4. Deleting and clearing");
    store.delete("greeting").await?;
    println!("   'greeting' present: {}", store.contains("greeting").await?);
    store.clear().await?;
    println!("   size after clear = {}", store.size().await?);

    Ok(())
}
