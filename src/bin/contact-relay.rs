//! Standalone contact relay: HTTP ingress plus an in-process queue consumer.
//!
//! ```bash
//! RESEND_API_KEY=re_xxx TURNSTILE_SECRET_KEY=0x... RUST_LOG=info contact-relay
//! ```

use contact_relay::prelude::*;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Messages taken from the queue per batch.
const BATCH_SIZE: usize = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RelayConfig::from_env()?;
    tracing::info!(
        version = contact_relay::VERSION,
        bind_addr = %config.bind_addr,
        providers = config.providers.iter().filter(|p| p.enabled).count(),
        turnstile = config.turnstile.is_some(),
        signing = config.ingress.signing_secret.is_some(),
        "Starting contact relay"
    );

    let queue = MemoryQueue::with_backoff(config.queue_backoff);
    // Exhausted messages are parked here and reported on shutdown.
    let dead_letters = MemoryQueue::new();
    let state = ContactState::from_config(&config, Arc::new(queue.clone()))?;
    let consumer =
        EmailQueueConsumer::from_config(&config).with_dead_letter(Arc::new(dead_letters.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = tokio::spawn(run_consumer(
        consumer,
        queue,
        dead_letters,
        shutdown_rx.clone(),
    ));

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    let mut server_shutdown = shutdown_rx;
    let server = axum::serve(listener, contact_router(state)).with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    server.await?;
    worker.await?;
    tracing::info!("Contact relay stopped");
    Ok(())
}

async fn run_consumer(
    consumer: EmailQueueConsumer,
    queue: MemoryQueue,
    dead_letters: MemoryQueue,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let batch = tokio::select! {
            batch = queue.receive(BATCH_SIZE) => batch,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };
        consumer.process_batch(batch).await;
    }

    let pending = queue.pending_len();
    if pending > 0 {
        tracing::warn!(pending, "Stopping with undelivered messages in the in-memory queue");
    }
    for envelope in dead_letters.pending() {
        tracing::error!(
            id = %envelope.id,
            message_type = envelope.message_type.as_str(),
            retry_count = envelope.retry_count,
            payload = %envelope.data,
            "Undelivered dead-lettered message"
        );
    }
}
