//! Seed the data queue from a JSON file
//!
//! Usage: publish-records <records.json> [queue]
//!
//! The file must hold a JSON array; each element is published as one message.
//! The queue defaults to DATA_QUEUE_NAME.

use anyhow::{bail, Context};
use data_processor_service::services::BrokerGateway;
use data_processor_service::Config;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage:");
        eprintln!("  publish-records <records.json> [queue]");
        std::process::exit(1);
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    let path = &args[1];
    let queue = args.get(2).cloned().unwrap_or(config.queue_name);

    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    let records: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("{path} is not valid JSON"))?;
    let Some(records) = records.as_array() else {
        bail!("{path} must contain a JSON array");
    };

    let broker = BrokerGateway::connect(&config.rabbitmq_url).await?;
    broker.declare(&queue).await?;

    for record in records {
        broker.publish(&queue, &serde_json::to_vec(record)?).await?;
    }
    broker.close().await?;

    println!("Published {} records to {}", records.len(), queue);
    Ok(())
}
