use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::RngCore;
use tokio::runtime::Builder;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

mod cli;
mod trace;

use allocator::IdentityAllocator;
use cli::Parser;
use config::Config;
use nats_backend::{InstanceIdentity, NatsClient, NatsLockStore, NatsRegistry};
use registry::ServiceRegistry;

fn main() -> Result<()> {
    // parses from cli or environment var
    let config = cli::Config::parse();
    trace::init(&config.log)?;
    debug!(?config);

    let mut builder = Builder::new_multi_thread();
    // configure thread name & enable IO/time
    builder.thread_name(&config.thread_name).enable_all();
    // default num threads will be num logical CPUs
    if let Some(num) = config.threads {
        builder.worker_threads(num);
    }
    let rt = builder.build()?;

    rt.block_on(async move {
        if let Err(err) = start(config).await {
            error!(?err, "exited with error");
            std::process::exit(1);
        }
        debug!("exiting...");
    });

    Ok(())
}

async fn start(config: cli::Config) -> Result<()> {
    let cfg = Config::parse(&config.config_path)?;
    let instance_id = config
        .instance_id
        .clone()
        .unwrap_or_else(|| generated_instance_id(&cfg.allocator.service));
    info!(
        service = %cfg.allocator.service,
        %instance_id,
        participants = cfg.allocator.services.len(),
        "starting identity allocation"
    );

    let client = NatsClient::new(cfg.nats.clone());
    client.connect().await.context("NATS connection failed")?;

    let registry = Arc::new(NatsRegistry::new(
        client.clone(),
        InstanceIdentity {
            service: cfg.allocator.service.clone(),
            instance_id,
            address: config.address.clone(),
        },
        cfg.nats.instances_bucket.clone(),
        cfg.nats.instance_ttl,
    ));
    let locks = Arc::new(NatsLockStore::new(
        client.clone(),
        cfg.nats.locks_bucket.clone(),
        cfg.allocator.lock_ttl,
    ));

    let alloc = IdentityAllocator::new(Arc::clone(&registry), locks, cfg.allocator.clone());

    // allocation path: any failure here aborts startup before registration
    let pair = alloc.allocate().await.context("identity allocation failed")?;
    alloc
        .publish(&pair)
        .await
        .context("failed to stage identity metadata")?;

    // lock release happens in the background once the metadata is visible
    let _release = alloc.spawn_release(pair);

    // metadata is staged, now become discoverable
    registry
        .register()
        .await
        .context("instance registration failed")?;

    // export the pair to the downstream ID generator. Other tasks are not
    // reading the environment at this point.
    unsafe {
        std::env::set_var("ROOM_ID", pair.room.to_string());
        std::env::set_var("NODE_ID", pair.node.to_string());
    }
    println!("ROOM_ID={} NODE_ID={}", pair.room, pair.node);
    info!(room = pair.room, node = pair.node, "identity pair assigned");

    let heartbeat = tokio::spawn(heartbeat_loop(
        Arc::clone(&registry),
        cfg.nats.heartbeat_interval,
    ));

    signal::ctrl_c().await?;
    info!("shutdown signal received");
    heartbeat.abort();
    if let Err(err) = registry.deregister().await {
        warn!(%err, "failed to deregister, instance record will age out");
    }
    client.disconnect().await;
    Ok(())
}

fn generated_instance_id(service: &str) -> String {
    format!("{service}-{:08x}", rand::thread_rng().next_u32())
}

/// Keep our instance record from aging out of the registry bucket.
async fn heartbeat_loop(registry: Arc<NatsRegistry>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = registry.heartbeat().await {
            warn!(%err, "instance heartbeat failed");
        }
    }
}
