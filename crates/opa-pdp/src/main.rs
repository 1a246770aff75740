//! opa-pdp: OPA policy decision point agent.
//!
//! Startup order: configuration, telemetry, policy engine client, HTTP
//! server, Kafka consumer and producer, registration, consumption loop.
//! Registration failure is fatal; a consumer that cannot connect is not.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use opa_pdp::api::{auth::ApiCredentials, AppState};
use opa_pdp::config::{AgentConfig, OPA_REQUEST_TIMEOUT};
use opa_pdp::consumer::run_consumer;
use opa_pdp::evaluator::{OpaRestEvaluator, PolicyEvaluator};
use opa_pdp::identity::PdpIdentity;
use opa_pdp::lifecycle::Lifecycle;
use opa_pdp::publisher::KafkaStatusSender;
use opa_pdp::shutdown::{shutdown, wait_for_signal};
use opa_pdp::transport::{KafkaConsumer, KafkaProducer, MessageSink, MessageSource};
use opa_pdp::{server, PdpAgent};
use opa_pdp_telemetry::{log_startup, Telemetry, SERVICE_NAME};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ExitCode {
    let config = AgentConfig::parse();
    if let Err(e) = config.validate() {
        eprintln!("error: {}", e);
        return ExitCode::from(2);
    }

    let telemetry = match Telemetry::init(config.telemetry()) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(config, telemetry).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("opa-pdp exited with error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(config: AgentConfig, telemetry: Telemetry) -> anyhow::Result<()> {
    let identity = Arc::new(PdpIdentity::new(&config.pdp_group));
    let lifecycle = Arc::new(Lifecycle::new());
    let metrics = telemetry.metrics();

    log_startup!(
        service = SERVICE_NAME,
        version = env!("CARGO_PKG_VERSION"),
        pdp_name = %identity.name(),
        pdp_group = %identity.group(),
        "starting PDP agent"
    );

    let evaluator: Arc<dyn PolicyEvaluator> = Arc::new(
        OpaRestEvaluator::new(&config.opa_url, OPA_REQUEST_TIMEOUT)
            .context("failed to initialise policy engine client")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = server::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let http = tokio::spawn(server::serve(
        listener,
        AppState {
            identity: Arc::clone(&identity),
            lifecycle: Arc::clone(&lifecycle),
            evaluator,
            metrics: Arc::clone(&metrics),
            credentials: ApiCredentials::new(&config.api_user, &config.api_password),
        },
        shutdown_rx.clone(),
    ));

    let kafka = config.kafka_settings();

    let consumer: Option<Arc<dyn MessageSource>> = match KafkaConsumer::connect(&kafka).await {
        Ok(c) => Some(Arc::new(c)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to create Kafka consumer, PAP commands will not be received");
            None
        }
    };

    let producer: Arc<dyn MessageSink> = Arc::new(
        KafkaProducer::connect(&kafka)
            .await
            .context("failed to create Kafka producer")?,
    );

    let agent = Arc::new(PdpAgent::new(
        Arc::clone(&identity),
        Arc::clone(&lifecycle),
        Arc::new(KafkaStatusSender::new(Arc::clone(&producer), &kafka.topic)),
        Arc::clone(&metrics),
        &kafka.topic,
    ));

    if !agent.register().await {
        let _ = shutdown_tx.send(true);
        if let Some(consumer) = &consumer {
            consumer.close().await;
        }
        producer.close().await;
        anyhow::bail!("failed to register PDP with PAP");
    }

    let consumer_task = consumer.as_ref().map(|source| {
        tokio::spawn(run_consumer(
            Arc::clone(source),
            Arc::clone(&agent),
            config.read_timeout(),
            shutdown_rx.clone(),
        ))
    });

    match wait_for_signal().await {
        Ok(signal) => tracing::info!(signal, "received termination signal"),
        Err(e) => tracing::error!(error = %e, "failed to listen for signals, shutting down"),
    }

    shutdown(
        &shutdown_tx,
        consumer.as_ref(),
        &agent,
        config.shutdown_grace(),
    )
    .await;

    if let Some(task) = consumer_task {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "consumer task ended abnormally");
        }
    }
    producer.close().await;

    match http.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e).context("HTTP server failed"),
        Err(e) => Err(e).context("HTTP server task panicked"),
    }
}
