use lecx_core::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// Fetches one shard; slow shards are abandoned when the request deadline passes
async fn fetch_shard(ctx: Arc<AnnotatedContext>, shard: u64) {
    let logger = ctx.logger().with("shard", &json!(shard));
    let latency = Duration::from_millis(50 * shard);

    tokio::select! {
        _ = ctx.done().wait() => {
            logger.warn("shard abandoned");
            ctx.add_error(anyhow::anyhow!("shard {shard}: {}", ctx.err().unwrap_or(ContextError::Canceled)));
        }
        _ = tokio::time::sleep(latency) => {
            if shard % 4 == 0 {
                ctx.add_error(anyhow::anyhow!("shard {shard}: checksum mismatch"));
                return;
            }
            ctx.set_value(format!("shard_{shard}_rows"), shard * 100, false);
            logger.debug("shard fetched");
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    let config = HandlerConfigBuilder::new().min_level(Level::DEBUG).build();
    let logger = Logger::new(Arc::new(TracingHandler::new(config)));

    let (base, _cancel) = with_timeout(Arc::new(Background), Duration::from_millis(275));
    let ctx = Arc::new(AnnotatedContext::with_base(base, logger));
    ctx.set_value("request_id", uuid::Uuid::new_v4().to_string(), true);
    ctx.set_value("route", "/reports", true);

    ctx.logger().info("request started");

    let shards: Vec<_> = (1..=8)
        .map(|shard| tokio::spawn(fetch_shard(ctx.clone(), shard)))
        .collect();
    for shard in shards {
        if let Err(err) = shard.await {
            ctx.add_error(err);
        }
    }

    let logger = ctx.logger();
    while let Some(err) = ctx.take_error() {
        logger.error(format!("{err:#}"));
    }
    let fetched = ctx
        .get_values()
        .keys()
        .filter(|key| key.starts_with("shard_"))
        .count();
    logger.info(format!("request finished with {fetched} shards"));
}
