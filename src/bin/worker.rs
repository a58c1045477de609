//! dialog-sync worker - JetStream consumer for migration work
//!
//! Runs alongside the service. Pulls partition messages and walks each
//! partition with bounded concurrency, publishing one notification per
//! instance back onto the stream. Pulls those notifications and reconciles
//! them through a retrying pipeline, parking the ones it gives up on.
//!
//! Usage:
//!   dialog-sync-worker --nats-url nats://localhost:4222 --mongodb-uri mongodb://localhost:27017
//!
//! Environment variables:
//!   NATS_URL - NATS server URL (default: nats://127.0.0.1:4222)
//!   MONGODB_URI - MongoDB connection URI (default: mongodb://localhost:27017)
//!   ORIGIN_URL, DIALOG_URL, APP_BASE_URL - upstream services
//!   MAX_CONCURRENT_PARTITIONS - partitions walked at once (default: 4)
//!   CONSUMERS - notification consumers (default: 8)

use clap::Parser;
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use dialog_sync::{
    checkpoint::{MongoCheckpointStore, PartitionCheckpointStore},
    clients::{DialogService, HttpDialogService, HttpOriginStore, OriginStore},
    config::{LogArgs, MongoArgs, NatsArgs, RetryArgs, UpstreamArgs},
    db::MongoClient,
    logging,
    migration::{NatsNotificationSink, NotificationSink, PartitionMessage, PartitionRunner},
    model::{Partition, SyncNotification},
    nats::{
        consume, AckOnSuccess, Delivery, NatsClient, ParkingSink, NOTIFICATION_CONSUMER,
        NOTIFICATION_SUBJECT, PARTITION_CONSUMER, PARTITION_SUBJECT,
    },
    pipeline::{BoundedPipeline, FailureMode, ItemHandler, PipelineConfig},
    reconcile::{DialogBuilder, DialogReconciler},
    streamer::ChangeCursorStreamer,
    SyncError,
};

/// Progress acks keep a long partition from being redelivered mid-run
const PROGRESS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "dialog-sync-worker")]
#[command(about = "JetStream worker for dialog-sync migrations")]
#[command(version)]
struct WorkerArgs {
    /// Unique worker ID
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    node_id: Uuid,

    #[command(flatten)]
    upstream: UpstreamArgs,

    #[command(flatten)]
    nats: NatsArgs,

    #[command(flatten)]
    mongo: MongoArgs,

    #[command(flatten)]
    retry: RetryArgs,

    #[command(flatten)]
    logging: LogArgs,

    /// Number of pipeline consumers reconciling notifications
    #[arg(long, env = "CONSUMERS", default_value = "8")]
    consumers: usize,

    /// Page size requested from the origin store
    #[arg(long, env = "PAGE_SIZE", default_value = "100")]
    page_size: usize,

    /// Persist a partition checkpoint after this many instances
    #[arg(long, env = "CHECKPOINT_EVERY", default_value = "100")]
    checkpoint_every: u64,

    /// Partitions walked at the same time
    #[arg(long, env = "MAX_CONCURRENT_PARTITIONS", default_value = "4")]
    max_concurrent_partitions: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let args = WorkerArgs::parse();
    logging::init(&args.logging.log_level, &args.logging.log_format);

    if let Err(e) = args.upstream.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Starting dialog-sync worker {}", args.node_id);
    info!("  NATS: {}", args.nats.nats_url);
    info!("  MongoDB: {}", args.mongo.mongodb_uri);
    info!("  Max concurrent partitions: {}", args.max_concurrent_partitions);

    let cancel = CancellationToken::new();
    let timeout = args.upstream.request_timeout();
    let origin: Arc<dyn OriginStore> =
        Arc::new(HttpOriginStore::new(&args.upstream.origin_url, timeout)?);
    let dialogs: Arc<dyn DialogService> =
        Arc::new(HttpDialogService::new(&args.upstream.dialog_url, timeout)?);

    let mongo = MongoClient::new(&args.mongo.mongodb_uri, &args.mongo.mongodb_db).await?;
    let checkpoints: Arc<dyn PartitionCheckpointStore> =
        Arc::new(MongoCheckpointStore::new(&mongo).await?);

    let client = NatsClient::new(&args.nats, &format!("dialog-sync-worker-{}", args.node_id)).await?;
    client.ensure_stream().await?;

    // Partitions
    let sink: Arc<dyn NotificationSink> = Arc::new(NatsNotificationSink::new(client.clone()));
    let runner = Arc::new(PartitionRunner::new(
        ChangeCursorStreamer::new(Arc::clone(&origin), args.page_size),
        checkpoints,
        sink,
        args.retry.partition_policy(),
        args.checkpoint_every,
    ));
    let partitions = client
        .pull_consumer(
            PARTITION_CONSUMER,
            PARTITION_SUBJECT,
            args.max_concurrent_partitions.max(1),
        )
        .await?;
    let partition_task = tokio::spawn(run_partitions(
        partitions,
        runner,
        args.max_concurrent_partitions,
        cancel.clone(),
    ));

    // Notifications
    let reconciler: Arc<dyn ItemHandler<SyncNotification>> = Arc::new(DialogReconciler::new(
        origin,
        dialogs,
        DialogBuilder::new(args.upstream.app_base_url.clone()),
    ));
    let pipeline = BoundedPipeline::start(
        PipelineConfig {
            name: "notifications".to_string(),
            consumers: args.consumers,
            capacity: args.consumers.max(1) * 2,
        },
        Arc::new(AckOnSuccess::new(reconciler)),
        FailureMode::Retry {
            policy: args.retry.delivery_policy(),
            dead_letters: Arc::new(ParkingSink::new(client.clone(), args.node_id.to_string())),
        },
        cancel.clone(),
    );
    let notifications = client
        .pull_consumer(NOTIFICATION_CONSUMER, NOTIFICATION_SUBJECT, args.consumers.max(1) * 4)
        .await?;
    let publisher = pipeline.publisher();
    let notification_task = tokio::spawn(consume(
        notifications,
        args.consumers.max(1),
        cancel.clone(),
        move |delivery: Delivery<SyncNotification>| {
            let publisher = publisher.clone();
            async move {
                if let Err(e) = publisher.publish(delivery).await {
                    warn!(error = %e, "Pipeline closed, delivery left for redelivery");
                }
            }
        },
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    cancel.cancel();

    if let Err(e) = partition_task.await {
        error!("Partition loop failed: {}", e);
    }
    if let Err(e) = notification_task.await {
        error!("Notification loop failed: {}", e);
    }
    pipeline.shutdown().await;

    info!("dialog-sync worker stopped");
    Ok(())
}

/// Walk partitions as they arrive, at most `max_concurrent` at a time
async fn run_partitions(
    consumer: async_nats::jetstream::consumer::PullConsumer,
    runner: Arc<PartitionRunner>,
    max_concurrent: usize,
    cancel: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let in_flight: Arc<DashSet<Partition>> = Arc::new(DashSet::new());
    let tasks = Arc::new(tokio::sync::Mutex::new(JoinSet::new()));

    let loop_tasks = Arc::clone(&tasks);
    let loop_cancel = cancel.clone();
    consume(
        consumer,
        1,
        cancel.clone(),
        move |delivery: Delivery<PartitionMessage>| {
            let permits = Arc::clone(&permits);
            let in_flight = Arc::clone(&in_flight);
            let runner = Arc::clone(&runner);
            let tasks = Arc::clone(&loop_tasks);
            let cancel = loop_cancel.clone();
            async move {
                let partition = delivery.payload.partition.clone();
                // Redelivery of a partition this worker is still walking
                if !in_flight.insert(partition.clone()) {
                    if let Err(e) = delivery.in_progress().await {
                        warn!(partition = %partition, error = %e, "Progress ack failed");
                    }
                    return;
                }

                let permit = tokio::select! {
                    _ = cancel.cancelled() => None,
                    permit = permits.acquire_owned() => permit.ok(),
                };
                let Some(permit) = permit else {
                    in_flight.remove(&partition);
                    return;
                };

                tasks.lock().await.spawn(async move {
                    run_partition(&runner, &delivery, &cancel).await;
                    in_flight.remove(&partition);
                    drop(permit);
                });
            }
        },
    )
    .await;

    let mut tasks = std::mem::take(&mut *tasks.lock().await);
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Partition task failed: {}", e);
        }
    }
}

async fn run_partition(
    runner: &PartitionRunner,
    delivery: &Delivery<PartitionMessage>,
    cancel: &CancellationToken,
) {
    let partition = &delivery.payload.partition;
    let run = runner.run(&delivery.payload, cancel);
    tokio::pin!(run);

    let mut progress = tokio::time::interval(PROGRESS_INTERVAL);
    progress.tick().await;
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            _ = progress.tick() => {
                if let Err(e) = delivery.in_progress().await {
                    warn!(partition = %partition, error = %e, "Progress ack failed");
                }
            }
        }
    };

    let settled = match result {
        Ok(checkpoint) => {
            info!(
                partition = %partition,
                total_count = checkpoint.total_count,
                "Partition complete"
            );
            delivery.ack().await
        }
        // Another worker picks it up from the checkpoint
        Err(SyncError::Cancelled) => delivery.nak(None).await,
        Err(e) => {
            error!(
                partition = %partition,
                error = %e,
                "Partition abandoned, rerun with force to retry"
            );
            delivery.ack().await
        }
    };
    if let Err(e) = settled {
        warn!(partition = %partition, error = %e, "Failed to settle partition message");
    }
}
