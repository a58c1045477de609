//! dialog-sync - control surface, live discovery and migration scheduling

use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dialog_sync::{
    checkpoint::{InMemoryCheckpointStore, MongoCheckpointStore, PartitionCheckpointStore},
    clients::{DialogService, HttpDialogService, HttpOriginStore, OrganizationCache, OriginStore},
    config::Args,
    db::MongoClient,
    live::LiveSync,
    logging,
    migration::{
        LocalDispatcher, MigrationScheduler, NatsPartitionDispatcher, NotificationSink,
        PartitionDispatcher, PartitionRunner,
    },
    model::SyncNotification,
    nats::NatsClient,
    pipeline::{BoundedPipeline, FailureMode, PauseRegistry, PipelineConfig, Publisher},
    reconcile::{DialogBuilder, DialogReconciler},
    server::{self, AppState},
    streamer::ChangeCursorStreamer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init(&args.logging.log_level, &args.logging.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  dialog-sync");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Origin store: {}", args.upstream.origin_url);
    info!("Dialog service: {}", args.upstream.dialog_url);
    info!("NATS: {}", args.nats.nats_url);
    info!("MongoDB: {}", args.mongo.mongodb_uri);
    info!("Consumers: {}", args.consumers);
    info!("Live sync: {}", args.live_sync_enabled);
    info!("======================================");

    let timeout = args.upstream.request_timeout();
    let origin: Arc<dyn OriginStore> =
        Arc::new(HttpOriginStore::new(&args.upstream.origin_url, timeout)?);
    let dialogs: Arc<dyn DialogService> =
        Arc::new(HttpDialogService::new(&args.upstream.dialog_url, timeout)?);
    let organizations = Arc::new(OrganizationCache::new(Arc::clone(&origin)));

    let reconciler = Arc::new(DialogReconciler::new(
        Arc::clone(&origin),
        dialogs,
        DialogBuilder::new(args.upstream.app_base_url.clone()),
    ));

    // The pipeline drains on shutdown, so it gets its own token
    let pipeline = BoundedPipeline::start(
        PipelineConfig {
            name: "reconcile".to_string(),
            consumers: args.consumers,
            capacity: args.queue_capacity,
        },
        reconciler,
        FailureMode::LogAndContinue,
        CancellationToken::new(),
    );
    let publisher = pipeline.publisher();

    let cancel = CancellationToken::new();
    let pauses = PauseRegistry::new();
    let streamer = ChangeCursorStreamer::new(Arc::clone(&origin), args.page_size);

    let checkpoints: Arc<dyn PartitionCheckpointStore> = match connect_checkpoints(&args).await {
        Ok(store) => store,
        Err(e) if args.dev_mode => {
            warn!("MongoDB unavailable (dev mode, using in-memory checkpoints): {}", e);
            Arc::new(InMemoryCheckpointStore::new())
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let mut local_dispatcher = None;
    let dispatcher: Arc<dyn PartitionDispatcher> = match connect_dispatcher(&args).await {
        Ok(dispatcher) => dispatcher,
        Err(e) if args.dev_mode => {
            warn!("NATS unavailable (dev mode, running partitions in-process): {}", e);
            let local = Arc::new(local_partitions(
                &args,
                streamer.clone(),
                Arc::clone(&checkpoints),
                publisher.clone(),
                cancel.clone(),
            ));
            let dispatcher: Arc<dyn PartitionDispatcher> = local.clone();
            local_dispatcher = Some(local);
            dispatcher
        }
        Err(e) => {
            error!("NATS connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let scheduler = Arc::new(MigrationScheduler::new(
        Arc::clone(&organizations),
        checkpoints,
        dispatcher,
    ));

    let mut live_tasks = JoinSet::new();
    if args.live_sync_enabled {
        let live = LiveSync::new(
            streamer,
            pauses.clone(),
            publisher.clone(),
            args.poll_schedule().map_err(anyhow::Error::msg)?,
            args.retry.partition_policy(),
            args.forward_buffer,
        );
        match organizations.get().await {
            Ok(snapshot) => {
                info!(organizations = snapshot.orgs.len(), "Starting live discovery");
                live_tasks = live.spawn_all(snapshot.orgs.iter().cloned(), &cancel);
            }
            Err(e) => warn!("Could not load organizations, live discovery disabled: {}", e),
        }
    }

    let state = Arc::new(AppState::new(
        args.clone(),
        pauses,
        publisher,
        pipeline.stats(),
        scheduler,
    ));
    let server_task = tokio::spawn(server::run(state, cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    cancel.cancel();

    while let Some(joined) = live_tasks.join_next().await {
        if let Err(e) = joined {
            error!("Live discovery task failed: {}", e);
        }
    }
    if let Some(local) = local_dispatcher {
        local.join_all().await;
    }
    match server_task.await {
        Ok(Err(e)) => error!("Server error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    pipeline.shutdown().await;

    info!("dialog-sync stopped");
    Ok(())
}

async fn connect_checkpoints(args: &Args) -> dialog_sync::Result<Arc<dyn PartitionCheckpointStore>> {
    let client = MongoClient::new(&args.mongo.mongodb_uri, &args.mongo.mongodb_db).await?;
    info!("MongoDB connected successfully");
    Ok(Arc::new(MongoCheckpointStore::new(&client).await?))
}

async fn connect_dispatcher(args: &Args) -> dialog_sync::Result<Arc<dyn PartitionDispatcher>> {
    let client = NatsClient::new(&args.nats, "dialog-sync").await?;
    client.ensure_stream().await?;
    Ok(Arc::new(NatsPartitionDispatcher::new(client)))
}

fn local_partitions(
    args: &Args,
    streamer: ChangeCursorStreamer,
    checkpoints: Arc<dyn PartitionCheckpointStore>,
    publisher: Publisher<SyncNotification>,
    cancel: CancellationToken,
) -> LocalDispatcher {
    let sink: Arc<dyn NotificationSink> = Arc::new(publisher);
    let runner = PartitionRunner::new(
        streamer,
        checkpoints,
        sink,
        args.retry.partition_policy(),
        args.checkpoint_every,
    );
    LocalDispatcher::new(Arc::new(runner), args.max_concurrent_partitions, cancel)
}
