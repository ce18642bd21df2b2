mod config;

use agent_runner::Runner;
use anyhow::Context;
use common::domain::DeadLetterProducer;
use common::http::{HttpDeviceGroupResolver, HttpRuleSource, JsonHttpClient};
use common::nats::{NatsClient, NatsDeadLetterProducer};
use common::postgres::{PostgresDocumentStore, StorageConfig};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::ServiceConfig;
use std::sync::Arc;
use std::time::Duration;
use streaming_agent::{
    AlarmGenerator, DeviceGroupCache, MessageOrchestrator, RecordNormalizer, RulesEvaluation,
    StorageFailurePolicy, StorageWriter, StreamingAgent,
};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    // Initialize configuration and tracing
    let config = match ServiceConfig::from_env().and_then(|cfg| cfg.validate().map(|_| cfg)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (tracing + OpenTelemetry for traces and logs)
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&config.telemetry())
    {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        stream = %config.nats_stream,
        partitions = config.partition_count,
        consumer_group = %config.consumer_group,
        otel_enabled = config.otel_enabled,
        "Starting streaming agent"
    );
    debug!("Configuration: {:?}", config);

    // Initialize shared dependencies
    let nats_client = match initialize_nats(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize NATS: {:#}", e);
            std::process::exit(1);
        }
    };

    let orchestrator = match build_orchestrator(&config, &nats_client).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Failed to initialize message pipeline: {:#}", e);
            std::process::exit(1);
        }
    };

    // A failed first load starts with no rules; the periodic reload recovers.
    if let Err(e) = orchestrator.reload().await {
        error!(error = %e, "Initial rule load failed, starting with an empty rule set");
    }

    let agent = StreamingAgent::new(
        config.streaming_agent(),
        nats_client.create_partition_connector(),
        orchestrator,
    );

    let runner = Runner::new()
        .with_processes(agent.into_runner_processes())
        .with_closer(move || {
            Box::pin(async move {
                info!("Running cleanup tasks...");
                if let Ok(client) = Arc::try_unwrap(nats_client) {
                    client.close().await;
                }

                // Shutdown telemetry and flush pending traces and logs
                shutdown_telemetry(telemetry_providers);

                info!("Cleanup complete");
                Ok(())
            })
        })
        .with_closer_timeout(Duration::from_secs(10))
        .with_shutdown_timeout(Duration::from_secs(config.shutdown_timeout_secs));

    // Run the service
    runner.run().await;
}

async fn initialize_nats(config: &ServiceConfig) -> anyhow::Result<Arc<NatsClient>> {
    info!("Initializing NATS...");
    let nats_client = Arc::new(
        NatsClient::connect(
            &config.nats_url,
            Duration::from_secs(config.startup_timeout_secs),
        )
        .await?,
    );

    nats_client
        .ensure_stream(&config.nats_stream, "Partitioned device telemetry")
        .await?;
    if config.storage_failure_policy()? == StorageFailurePolicy::DeadLetter {
        nats_client
            .ensure_stream(&config.dead_letter_stream, "Documents the store rejected")
            .await?;
    }

    Ok(nats_client)
}

async fn build_orchestrator(
    config: &ServiceConfig,
    nats_client: &NatsClient,
) -> anyhow::Result<Arc<MessageOrchestrator>> {
    let http_client = JsonHttpClient::new(Duration::from_secs(config.http_timeout_secs))?;
    let rule_source = Arc::new(HttpRuleSource::new(http_client.clone(), &config.rules_url));
    let group_resolver = Arc::new(HttpDeviceGroupResolver::new(
        http_client,
        &config.device_groups_url,
        &config.devices_url,
    ));
    let group_cache = Arc::new(DeviceGroupCache::new(
        group_resolver,
        Duration::from_secs(config.group_cache_ttl_secs),
    ));

    let policy = config.storage_failure_policy()?;
    let dead_letter: Option<Arc<dyn DeadLetterProducer>> =
        (policy == StorageFailurePolicy::DeadLetter).then(|| {
            Arc::new(NatsDeadLetterProducer::new(
                nats_client.create_publisher_client(),
                config.dead_letter_stream.clone(),
            )) as Arc<dyn DeadLetterProducer>
        });

    info!("Initializing document storage...");
    let records = open_storage_writer(
        "messages",
        &config.messages_storage(),
        policy.clone(),
        dead_letter.clone(),
    )
    .await?;
    let alarms =
        open_storage_writer("alarms", &config.alarms_storage(), policy, dead_letter).await?;

    Ok(Arc::new(MessageOrchestrator::new(
        RecordNormalizer::new(),
        records,
        RulesEvaluation::new(group_cache),
        AlarmGenerator::new(alarms),
        rule_source,
    )))
}

async fn open_storage_writer(
    kind: &str,
    storage: &StorageConfig,
    policy: StorageFailurePolicy,
    dead_letter: Option<Arc<dyn DeadLetterProducer>>,
) -> anyhow::Result<Arc<StorageWriter>> {
    let store = Arc::new(PostgresDocumentStore::from_config(storage)?);
    let writer = StorageWriter::new(kind, store, policy, dead_letter)?;
    writer
        .open()
        .await
        .with_context(|| format!("failed to open {kind} storage"))?;
    Ok(Arc::new(writer))
}
